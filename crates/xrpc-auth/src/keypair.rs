//! Multikey decoding and the signing/verification key abstractions (§4.4,
//! supplementing the external "cryptographic primitives" collaborator
//! named in §1 with a concrete, pluggable shape).

use k256::ecdsa::{Signature as K256Signature, SigningKey as K256SigningKey, VerifyingKey as K256VerifyingKey};
use p256::ecdsa::{Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use signature::{Signer, Verifier};

use crate::error::ServiceAuthError;

/// Known multicodec key codecs for Multikey public keys (ES256 / ES256K).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCodec {
    P256,
    Secp256k1,
}

/// A public key decoded from a Multikey `publicKeyMultibase` string, or
/// constructed directly from a [`Keypair`].
#[derive(Debug, Clone)]
pub enum PublicKey {
    P256(P256VerifyingKey),
    K256(K256VerifyingKey),
}

impl PublicKey {
    /// Decode a Multikey public key from a multibase-encoded string. Only
    /// the two codecs the JWT `alg` values this engine recognizes
    /// (`ES256`, `ES256K`) require: `0x1200` (p256-pub), `0xE7`
    /// (secp256k1-pub).
    pub fn decode_multikey(multibase_str: &str) -> Result<Self, ServiceAuthError> {
        let (_base, data) =
            multibase::decode(multibase_str).map_err(|_| ServiceAuthError::InvalidKey)?;
        let (code, offset) = decode_uvarint(&data).ok_or(ServiceAuthError::InvalidKey)?;
        let bytes = &data[offset..];
        match code {
            0x1200 => Ok(PublicKey::P256(
                P256VerifyingKey::from_sec1_bytes(bytes).map_err(|_| ServiceAuthError::InvalidKey)?,
            )),
            0xE7 => Ok(PublicKey::K256(
                K256VerifyingKey::from_sec1_bytes(bytes).map_err(|_| ServiceAuthError::InvalidKey)?,
            )),
            other => Err(ServiceAuthError::UnsupportedCodec(other)),
        }
    }

    pub fn alg(&self) -> &'static str {
        match self {
            PublicKey::P256(_) => "ES256",
            PublicKey::K256(_) => "ES256K",
        }
    }

    pub fn verify(&self, signing_input: &[u8], signature: &[u8]) -> Result<(), ServiceAuthError> {
        match self {
            PublicKey::P256(key) => {
                let sig = P256Signature::from_slice(signature)
                    .map_err(|_| ServiceAuthError::BadJwtSignature)?;
                key.verify(signing_input, &sig)
                    .map_err(|_| ServiceAuthError::BadJwtSignature)
            }
            PublicKey::K256(key) => {
                let sig = K256Signature::from_slice(signature)
                    .map_err(|_| ServiceAuthError::BadJwtSignature)?;
                key.verify(signing_input, &sig)
                    .map_err(|_| ServiceAuthError::BadJwtSignature)
            }
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PublicKey::P256(a), PublicKey::P256(b)) => a == b,
            (PublicKey::K256(a), PublicKey::K256(b)) => a == b,
            _ => false,
        }
    }
}

fn decode_uvarint(data: &[u8]) -> Option<(u64, usize)> {
    let mut x: u64 = 0;
    let mut s: u32 = 0;
    for (i, b) in data.iter().copied().enumerate() {
        if b < 0x80 {
            if i > 9 || (i == 9 && b > 1) {
                return None;
            }
            return Some((x | ((b as u64) << s), i + 1));
        }
        x |= ((b & 0x7F) as u64) << s;
        s += 7;
    }
    None
}

/// A local signing key, the creation-side counterpart of [`PublicKey`]
/// (§4.4 "Create"). Implementations wrap a P-256 or secp256k1 signing key.
pub trait Keypair: Send + Sync {
    /// The JWT header `alg` value for this key (`ES256` or `ES256K`).
    fn alg(&self) -> &'static str;
    /// Sign the exact bytes of `base64url(header) + "." + base64url(payload)`.
    fn sign(&self, signing_input: &[u8]) -> Vec<u8>;
    /// The public key counterpart, as would be resolved out of a DID document.
    fn public_key(&self) -> PublicKey;
}

pub struct P256Keypair(P256SigningKey);

impl P256Keypair {
    pub fn new(signing_key: P256SigningKey) -> Self {
        Self(signing_key)
    }

    pub fn generate(rng: &mut impl rand::RngCore) -> Self {
        Self(P256SigningKey::random(rng))
    }
}

impl Keypair for P256Keypair {
    fn alg(&self) -> &'static str {
        "ES256"
    }

    fn sign(&self, signing_input: &[u8]) -> Vec<u8> {
        let sig: P256Signature = self.0.sign(signing_input);
        sig.to_vec()
    }

    fn public_key(&self) -> PublicKey {
        PublicKey::P256(*self.0.verifying_key())
    }
}

pub struct K256Keypair(K256SigningKey);

impl K256Keypair {
    pub fn new(signing_key: K256SigningKey) -> Self {
        Self(signing_key)
    }

    pub fn generate(rng: &mut impl rand::RngCore) -> Self {
        Self(K256SigningKey::random(rng))
    }
}

impl Keypair for K256Keypair {
    fn alg(&self) -> &'static str {
        "ES256K"
    }

    fn sign(&self, signing_input: &[u8]) -> Vec<u8> {
        let sig: K256Signature = self.0.sign(signing_input);
        sig.to_vec()
    }

    fn public_key(&self) -> PublicKey {
        PublicKey::K256(*self.0.verifying_key())
    }
}

/// The external "fetch the signing key for this issuer" collaborator
/// (§4.4 "Verify" step 7, `getSigningKey`). Typically backed by DID
/// resolution, which is out of scope for this engine.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait SigningKeyResolver {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolve the current signing key for `iss`. When `force_refresh` is
    /// true the resolver must bypass any cache and re-fetch.
    fn get_signing_key(
        &self,
        iss: &str,
        force_refresh: bool,
    ) -> impl std::future::Future<Output = Result<PublicKey, Self::Error>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multikey(code: u64, key: &[u8]) -> String {
        fn enc(mut x: u64) -> Vec<u8> {
            let mut v = Vec::new();
            while x >= 0x80 {
                v.push(((x as u8) & 0x7F) | 0x80);
                x >>= 7;
            }
            v.push(x as u8);
            v
        }
        let mut buf = enc(code);
        buf.extend_from_slice(key);
        multibase::encode(multibase::Base::Base58Btc, buf)
    }

    #[test]
    fn p256_keypair_public_key_round_trips_through_multikey() {
        let mut rng = rand::rng();
        let kp = P256Keypair::generate(&mut rng);
        let pk = kp.public_key();
        let PublicKey::P256(vk) = &pk else {
            panic!("expected p256")
        };
        let encoded = multikey(0x1200, &vk.to_sec1_bytes());
        let decoded = PublicKey::decode_multikey(&encoded).unwrap();
        assert_eq!(decoded, pk);
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let mut rng = rand::rng();
        let kp = P256Keypair::generate(&mut rng);
        let msg = b"header.payload";
        let sig = kp.sign(msg);
        assert!(kp.public_key().verify(msg, &sig).is_ok());
    }

    #[test]
    fn unsupported_codec_is_rejected() {
        let encoded = multikey(0xED, &[0u8; 32]);
        let err = PublicKey::decode_multikey(&encoded).unwrap_err();
        assert!(matches!(err, ServiceAuthError::UnsupportedCodec(0xED)));
    }
}
