//! Service-auth JWT creation, verification and Multikey decoding (§4.4).

pub mod error;
pub mod jwt;
pub mod keypair;

pub use error::ServiceAuthError;
pub use jwt::{create, verify, CreateParams, ServiceAuthClaims, VerifyParams};
pub use keypair::{K256Keypair, KeyCodec, Keypair, P256Keypair, PublicKey, SigningKeyResolver};
