//! Service-auth error subcodes (§4.4: "All failures are a single error
//! kind (`AuthRequired`) with distinguishing subcodes").

use xrpc_types::XrpcErrorKind;

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ServiceAuthError {
    #[error("bad jwt: malformed token")]
    BadJwt,

    #[error("bad jwt: disallowed typ {0:?}")]
    BadJwtType(String),

    #[error("jwt expired")]
    JwtExpired,

    #[error("bad jwt audience: expected {expected}, got {actual}")]
    BadJwtAudience { expected: String, actual: String },

    #[error("bad jwt lexicon method: {0}")]
    BadJwtLexiconMethod(String),

    #[error("bad jwt signature")]
    BadJwtSignature,

    #[error("invalid signing key")]
    InvalidKey,

    #[error("unsupported key codec: {0}")]
    UnsupportedCodec(u64),

    #[error("signing key resolution failed: {0}")]
    ResolverFailed(String),
}

impl ServiceAuthError {
    /// All service-auth subcodes map to the single `AuthRequired` wire
    /// kind (§4.4), carrying the subcode's message.
    pub fn into_xrpc(self) -> XrpcErrorKind {
        XrpcErrorKind::AuthRequired {
            message: Some(self.to_string()),
        }
    }
}
