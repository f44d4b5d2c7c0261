//! Classification of transport errors as retryable vs. terminal
//! (§4.7 step 7: "a reconnectable error (network codes: abnormal-close,
//! reset, refused, aborted, pipe, timed-out, cancelled) re-enter the
//! loop; any other error terminates the iterator").

use tokio_tungstenite::tungstenite::Error as WsError;

/// Whether `err` (raised while connecting or reading) should trigger a
/// reconnect attempt rather than ending the subscription.
pub fn is_reconnectable(err: &WsError) -> bool {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Io(io_err) => matches!(
            io_err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}
