//! Shared data model and error taxonomy for the XRPC dispatch engine: the
//! NSID parser (C1), the parameter and body codec (C2), and the lexicon
//! registry/validator seam that every other crate in this workspace builds
//! on top of.

pub mod body;
pub mod error;
pub mod lexicon;
pub mod nsid;
pub mod output;
pub mod params;

pub use body::{ContentEncoding, DeclaredEncoding};
pub use error::XrpcErrorKind;
pub use lexicon::{LexiconRegistry, LexiconValidator, MethodDef, MethodKind, PermissiveValidator};
pub use nsid::{Nsid, parse_xrpc_path};
pub use output::{
    HandlerInput, HandlerOutput, RequestContext, ResetRouteRateLimits,
    no_op_reset_route_rate_limits,
};
pub use params::{ArrayItemType, ParamPrimitive, ParamType, ParamValue, Params};
