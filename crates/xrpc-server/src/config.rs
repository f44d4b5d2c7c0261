//! Explicit, construction-time dispatcher configuration (§0 "Configuration").
//!
//! There is no file or environment loader here by design: the embedding
//! application builds one of these and passes it to [`crate::Dispatcher`].

use std::sync::Arc;

use http::HeaderMap;
use xrpc_types::XrpcErrorKind;

/// A hook that may translate an unrecognized handler error into a specific
/// [`XrpcErrorKind`] before the default conversion runs (§4.8 "errorParser").
pub type ErrorParser =
    Arc<dyn Fn(&(dyn std::error::Error + Send + Sync)) -> Option<XrpcErrorKind> + Send + Sync>;

/// A predicate that, when true for a request's headers, skips rate limiting
/// entirely (§4.5 "Bypass").
pub type RateLimitBypass = Arc<dyn Fn(&HeaderMap) -> bool + Send + Sync>;

#[derive(Clone, bon::Builder)]
#[builder(start_fn = new)]
pub struct DispatcherConfig {
    /// Default blob size limit in bytes for procedures with unbounded
    /// (`*/*`) input, unless a method overrides it (§4.2, §8 scenario 8).
    #[builder(default = 5_000_000)]
    pub blob_limit: u64,

    /// Whether handler output is validated against the lexicon's response
    /// schema before being serialized (§4.8 item 5).
    #[builder(default = true)]
    pub response_validation: bool,

    pub error_parser: Option<ErrorParser>,

    pub rate_limit_bypass: Option<RateLimitBypass>,
}

impl DispatcherConfig {
    pub fn is_bypassed(&self, headers: &HeaderMap) -> bool {
        self.rate_limit_bypass
            .as_ref()
            .is_some_and(|bypass| bypass(headers))
    }

    /// Run the configured `errorParser`, guarding against a panicking hook
    /// the same way the dispatcher guards handler panics (§4.8
    /// "errorParser decision").
    pub fn parse_error(&self, err: &(dyn std::error::Error + Send + Sync)) -> Option<XrpcErrorKind> {
        let parser = self.error_parser.as_ref()?;
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| parser(err)))
            .unwrap_or(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = DispatcherConfig::new().build();
        assert_eq!(config.blob_limit, 5_000_000);
        assert!(config.response_validation);
        assert!(config.error_parser.is_none());
    }

    #[test]
    fn panicking_error_parser_is_contained() {
        let config = DispatcherConfig::new()
            .error_parser(Arc::new(|_: &(dyn std::error::Error + Send + Sync)| {
                panic!("misbehaving hook")
            }))
            .build();
        let err = std::io::Error::other("boom");
        assert_eq!(config.parse_error(&err), None);
    }
}
