//! JWT creation and verification (§4.4).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::ServiceAuthError;
use crate::keypair::{Keypair, PublicKey, SigningKeyResolver};

const DISALLOWED_TYPES: [&str; 3] = ["at+jwt", "refresh+jwt", "dpop+jwt"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtHeader {
    pub typ: String,
    pub alg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAuthClaims {
    pub iat: i64,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lxm: Option<String>,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Inputs to [`create`] (§4.4 "Create"). `lxm: None` omits the field
/// entirely; passing an explicit empty-but-present value is the caller's
/// job if they want `lxm` present-but-empty (not a case this engine forces).
pub struct CreateParams<'a> {
    pub iss: &'a str,
    pub aud: &'a str,
    pub lxm: Option<&'a str>,
    /// Token lifetime in seconds; defaults to 60 per §4.4.
    pub exp_in_seconds: Option<i64>,
    pub now: i64,
}

/// Create a service-auth JWT signed with `keypair` (§4.4 "Create").
pub fn create(params: CreateParams<'_>, keypair: &dyn Keypair) -> String {
    let header = JwtHeader {
        typ: "JWT".to_string(),
        alg: keypair.alg().to_string(),
    };
    let exp = params.now + params.exp_in_seconds.unwrap_or(60);
    let claims = ServiceAuthClaims {
        iat: params.now,
        iss: params.iss.to_string(),
        aud: params.aud.to_string(),
        exp,
        lxm: params.lxm.map(str::to_string),
        jti: random_jti(),
        nonce: None,
    };

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header always serializes"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims always serialize"));
    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature = keypair.sign(signing_input.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(signature);

    format!("{signing_input}.{signature_b64}")
}

fn random_jti() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Inputs to [`verify`] (§4.4 "Verify").
pub struct VerifyParams<'a> {
    /// Expected audience DID (`ownDid`); `None` skips the audience check.
    pub own_did: Option<&'a str>,
    /// Expected lexicon method NSID; `None` skips the binding check.
    pub expected_lxm: Option<&'a str>,
    pub now: i64,
}

/// Verify a service-auth JWT against `resolver` (§4.4 "Verify"), retrying
/// with `force_refresh = true` exactly once, and only if the refreshed key
/// actually differs from the first one (§4.4 step 7).
pub async fn verify<R: SigningKeyResolver>(
    token: &str,
    params: VerifyParams<'_>,
    resolver: &R,
) -> Result<ServiceAuthClaims, ServiceAuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(ServiceAuthError::BadJwt);
    }

    let header_buf = URL_SAFE_NO_PAD.decode(parts[0]).map_err(|_| ServiceAuthError::BadJwt)?;
    let payload_buf = URL_SAFE_NO_PAD.decode(parts[1]).map_err(|_| ServiceAuthError::BadJwt)?;
    let signature = URL_SAFE_NO_PAD.decode(parts[2]).map_err(|_| ServiceAuthError::BadJwt)?;

    let header: JwtHeader = serde_json::from_slice(&header_buf).map_err(|_| ServiceAuthError::BadJwt)?;
    if DISALLOWED_TYPES.contains(&header.typ.as_str()) {
        return Err(ServiceAuthError::BadJwtType(header.typ));
    }

    let claims: ServiceAuthClaims =
        serde_json::from_slice(&payload_buf).map_err(|_| ServiceAuthError::BadJwt)?;

    if params.now > claims.exp {
        return Err(ServiceAuthError::JwtExpired);
    }

    if let Some(own_did) = params.own_did {
        if claims.aud != own_did {
            return Err(ServiceAuthError::BadJwtAudience {
                expected: own_did.to_string(),
                actual: claims.aud.clone(),
            });
        }
    }

    if let Some(expected_lxm) = params.expected_lxm {
        match &claims.lxm {
            None => {
                return Err(ServiceAuthError::BadJwtLexiconMethod(format!(
                    "missing lxm, expected {expected_lxm}"
                )));
            }
            Some(actual) if actual != expected_lxm => {
                return Err(ServiceAuthError::BadJwtLexiconMethod(format!(
                    "bad lxm: expected {expected_lxm}, got {actual}"
                )));
            }
            Some(_) => {}
        }
    }

    let signing_input_len = parts[0].len() + 1 + parts[1].len();
    let signing_input = &token.as_bytes()[..signing_input_len];

    let first_key = resolver
        .get_signing_key(&claims.iss, false)
        .await
        .map_err(|e| ServiceAuthError::ResolverFailed(e.to_string()))?;

    if first_key.verify(signing_input, &signature).is_ok() {
        return Ok(claims);
    }

    let refreshed_key = resolver
        .get_signing_key(&claims.iss, true)
        .await
        .map_err(|e| ServiceAuthError::ResolverFailed(e.to_string()))?;

    if keys_equal(&first_key, &refreshed_key) {
        // key did not change on refresh: the first verification failure stands.
        return Err(ServiceAuthError::BadJwtSignature);
    }

    refreshed_key
        .verify(signing_input, &signature)
        .map_err(|_| ServiceAuthError::BadJwtSignature)?;

    Ok(claims)
}

fn keys_equal(a: &PublicKey, b: &PublicKey) -> bool {
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::P256Keypair;
    use std::convert::Infallible;

    struct FixedResolver(PublicKey);

    impl SigningKeyResolver for FixedResolver {
        type Error = Infallible;

        async fn get_signing_key(
            &self,
            _iss: &str,
            _force_refresh: bool,
        ) -> Result<PublicKey, Self::Error> {
            Ok(self.0.clone())
        }
    }

    struct RotatingResolver {
        old: PublicKey,
        new: PublicKey,
    }

    impl SigningKeyResolver for RotatingResolver {
        type Error = Infallible;

        async fn get_signing_key(
            &self,
            _iss: &str,
            force_refresh: bool,
        ) -> Result<PublicKey, Self::Error> {
            if force_refresh {
                Ok(self.new.clone())
            } else {
                Ok(self.old.clone())
            }
        }
    }

    #[tokio::test]
    async fn create_then_verify_round_trips() {
        let mut rng = rand::rng();
        let kp = P256Keypair::generate(&mut rng);
        let now = 1_000_000;
        let token = create(
            CreateParams {
                iss: "did:plc:alice",
                aud: "did:web:service.example",
                lxm: Some("com.example.doThing"),
                exp_in_seconds: None,
                now,
            },
            &kp,
        );

        let resolver = FixedResolver(kp.public_key());
        let claims = verify(
            &token,
            VerifyParams {
                own_did: Some("did:web:service.example"),
                expected_lxm: Some("com.example.doThing"),
                now: now + 1,
            },
            &resolver,
        )
        .await
        .unwrap();

        assert_eq!(claims.iss, "did:plc:alice");
        assert_eq!(claims.lxm.as_deref(), Some("com.example.doThing"));
    }

    #[tokio::test]
    async fn expired_token_always_fails_with_expiry_error() {
        let mut rng = rand::rng();
        let kp = P256Keypair::generate(&mut rng);
        let now = 1_000_000;
        let token = create(
            CreateParams {
                iss: "did:plc:alice",
                aud: "did:web:service.example",
                lxm: None,
                exp_in_seconds: Some(10),
                now,
            },
            &kp,
        );

        let resolver = FixedResolver(kp.public_key());
        let err = verify(
            &token,
            VerifyParams {
                own_did: None,
                expected_lxm: None,
                now: now + 11,
            },
            &resolver,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceAuthError::JwtExpired));
    }

    #[tokio::test]
    async fn wrong_audience_is_rejected() {
        let mut rng = rand::rng();
        let kp = P256Keypair::generate(&mut rng);
        let now = 1_000_000;
        let token = create(
            CreateParams {
                iss: "did:plc:alice",
                aud: "did:web:service.example",
                lxm: None,
                exp_in_seconds: None,
                now,
            },
            &kp,
        );

        let resolver = FixedResolver(kp.public_key());
        let err = verify(
            &token,
            VerifyParams {
                own_did: Some("did:web:other.example"),
                expected_lxm: None,
                now,
            },
            &resolver,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceAuthError::BadJwtAudience { .. }));
    }

    #[tokio::test]
    async fn missing_lxm_is_distinguished_from_mismatched_lxm() {
        let mut rng = rand::rng();
        let kp = P256Keypair::generate(&mut rng);
        let now = 1_000_000;
        let token = create(
            CreateParams {
                iss: "did:plc:alice",
                aud: "did:web:service.example",
                lxm: None,
                exp_in_seconds: None,
                now,
            },
            &kp,
        );

        let resolver = FixedResolver(kp.public_key());
        let err = verify(
            &token,
            VerifyParams {
                own_did: None,
                expected_lxm: Some("com.example.doThing"),
                now,
            },
            &resolver,
        )
        .await
        .unwrap_err();

        match err {
            ServiceAuthError::BadJwtLexiconMethod(msg) => assert!(msg.contains("missing")),
            other => panic!("expected BadJwtLexiconMethod, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rotated_key_is_retried_once_with_force_refresh() {
        let mut rng = rand::rng();
        let old_kp = P256Keypair::generate(&mut rng);
        let new_kp = P256Keypair::generate(&mut rng);
        let now = 1_000_000;
        // token is signed with the NEW key, but the resolver's cached
        // (non-refreshed) key is still the OLD one.
        let token = create(
            CreateParams {
                iss: "did:plc:alice",
                aud: "did:web:service.example",
                lxm: None,
                exp_in_seconds: None,
                now,
            },
            &new_kp,
        );

        let resolver = RotatingResolver {
            old: old_kp.public_key(),
            new: new_kp.public_key(),
        };

        let claims = verify(
            &token,
            VerifyParams {
                own_did: None,
                expected_lxm: None,
                now,
            },
            &resolver,
        )
        .await
        .unwrap();

        assert_eq!(claims.iss, "did:plc:alice");
    }

    #[tokio::test]
    async fn unchanged_key_on_refresh_fails_signature() {
        let mut rng = rand::rng();
        let signing_kp = P256Keypair::generate(&mut rng);
        let wrong_kp = P256Keypair::generate(&mut rng);
        let now = 1_000_000;
        let token = create(
            CreateParams {
                iss: "did:plc:alice",
                aud: "did:web:service.example",
                lxm: None,
                exp_in_seconds: None,
                now,
            },
            &signing_kp,
        );

        // resolver always returns the wrong key, refresh or not: key "does
        // not change" on refresh, so verification must not retry forever.
        let resolver = FixedResolver(wrong_kp.public_key());
        let err = verify(
            &token,
            VerifyParams {
                own_did: None,
                expected_lxm: None,
                now,
            },
            &resolver,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceAuthError::BadJwtSignature));
    }

    #[tokio::test]
    async fn disallowed_typ_is_rejected() {
        let mut rng = rand::rng();
        let kp = P256Keypair::generate(&mut rng);
        let header = JwtHeader {
            typ: "at+jwt".to_string(),
            alg: kp.alg().to_string(),
        };
        let claims = ServiceAuthClaims {
            iat: 0,
            iss: "did:plc:alice".into(),
            aud: "did:web:service.example".into(),
            exp: 1_000_000_000,
            lxm: None,
            jti: random_jti(),
            nonce: None,
        };
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let signing_input = format!("{header_b64}.{payload_b64}");
        let sig = kp.sign(signing_input.as_bytes());
        let token = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(sig));

        let resolver = FixedResolver(kp.public_key());
        let err = verify(
            &token,
            VerifyParams {
                own_did: None,
                expected_lxm: None,
                now: 0,
            },
            &resolver,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceAuthError::BadJwtType(_)));
    }

    #[test]
    fn malformed_token_is_rejected() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let mut rng = rand::rng();
        let kp = P256Keypair::generate(&mut rng);
        let resolver = FixedResolver(kp.public_key());
        let err = rt
            .block_on(verify(
                "not-a-jwt",
                VerifyParams {
                    own_did: None,
                    expected_lxm: None,
                    now: 0,
                },
                &resolver,
            ))
            .unwrap_err();
        assert!(matches!(err, ServiceAuthError::BadJwt));
    }
}
