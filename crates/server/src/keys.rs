//! Signing key management.
//!
//! The provider signs ID and access tokens with a single RSA key. The public
//! half is published as a JWK set; verification resolves keys by `kid` from
//! that same set, so extra verification-only keys can be appended during a
//! rotation.

use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header,
    jwk::{
        AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
        RSAKeyParameters, RSAKeyType,
    },
};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey},
    traits::PublicKeyParts,
};
use serde::Serialize;

use crate::config::OidcConfig;
use crate::error::KeyError;

const MIN_MODULUS_BYTES: usize = 256;

/// Where to find the signing key and which `kid` to publish it under.
#[derive(Clone, Debug)]
pub struct KeyConfig {
    pub kid: String,
    pub private_key_path: PathBuf,
    pub public_key_path: Option<PathBuf>,
}

impl From<&OidcConfig> for KeyConfig {
    fn from(cfg: &OidcConfig) -> Self {
        Self {
            kid: cfg.kid.clone(),
            private_key_path: cfg.private_key_path.clone(),
            public_key_path: cfg.public_key_path.clone(),
        }
    }
}

pub struct KeyManager {
    kid: String,
    encoding_key: EncodingKey,
    jwks: JwkSet,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("kid", &self.kid)
            .field("encoding_key", &"<EncodingKey>")
            .field("jwks_keys", &self.jwks.keys.len())
            .finish()
    }
}

fn read_pem(path: &Path) -> Result<String, KeyError> {
    std::fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, KeyError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| KeyError::Malformed {
            kind: "private",
            reason: e.to_string(),
        })
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, KeyError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| KeyError::Malformed {
            kind: "public",
            reason: e.to_string(),
        })
}

/// JWK for an RSA public key, with `n` and `e` base64url encoded without padding.
fn rsa_jwk(kid: &str, public: &RsaPublicKey) -> Jwk {
    Jwk {
        common: CommonParameters {
            public_key_use: Some(PublicKeyUse::Signature),
            key_algorithm: Some(KeyAlgorithm::RS256),
            key_id: Some(kid.to_string()),
            ..Default::default()
        },
        algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
            key_type: RSAKeyType::RSA,
            n: URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        }),
    }
}

impl KeyManager {
    /// Load the signing key from disk. Any failure here is fatal for the binary.
    pub fn load(cfg: &KeyConfig) -> Result<Self, KeyError> {
        let private_pem = read_pem(&cfg.private_key_path)?;
        let public_pem = match &cfg.public_key_path {
            Some(path) => Some(read_pem(path)?),
            None => None,
        };
        Self::from_pem(&cfg.kid, &private_pem, public_pem.as_deref())
    }

    pub fn from_pem(kid: &str, private_pem: &str, public_pem: Option<&str>) -> Result<Self, KeyError> {
        let private = parse_private_key(private_pem)?;
        if private.size() < MIN_MODULUS_BYTES {
            return Err(KeyError::TooShort {
                bits: private.size() * 8,
            });
        }
        let public = RsaPublicKey::from(&private);
        if let Some(pem) = public_pem {
            if parse_public_key(pem)? != public {
                return Err(KeyError::Mismatch);
            }
        }

        let encoding_key =
            EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(|e| KeyError::Malformed {
                kind: "private",
                reason: e.to_string(),
            })?;

        tracing::info!(kid, bits = private.size() * 8, "loaded RSA signing key");
        Ok(Self {
            kid: kid.to_string(),
            encoding_key,
            jwks: JwkSet {
                keys: vec![rsa_jwk(kid, &public)],
            },
        })
    }

    /// Publish an additional verification-only key (e.g. the previous key
    /// during a rotation).
    pub fn add_verification_key(&mut self, kid: &str, public_pem: &str) -> Result<(), KeyError> {
        let public = parse_public_key(public_pem)?;
        if public.size() < MIN_MODULUS_BYTES {
            return Err(KeyError::TooShort {
                bits: public.size() * 8,
            });
        }
        self.jwks.keys.retain(|k| k.common.key_id.as_deref() != Some(kid));
        self.jwks.keys.push(rsa_jwk(kid, &public));
        Ok(())
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn signing_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn jwks(&self) -> &JwkSet {
        &self.jwks
    }

    /// Verification key for `kid`, if the JWKS publishes one.
    pub fn decoding_key(&self, kid: &str) -> Option<DecodingKey> {
        let jwk = self.jwks.find(kid)?;
        DecodingKey::from_jwk(jwk).ok()
    }

    /// Sign `claims` as an RS256 JWT carrying this key's `kid`.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, KeyError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        Ok(jsonwebtoken::encode(&header, claims, &self.encoding_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{Validation, decode, decode_header};
    use serde::Deserialize;

    const PRIVATE: &str = include_str!("../tests/fixtures/private.pem");
    const PRIVATE_PKCS1: &str = include_str!("../tests/fixtures/private_pkcs1.pem");
    const PUBLIC: &str = include_str!("../tests/fixtures/public.pem");
    const OTHER_PUBLIC: &str = include_str!("../tests/fixtures/other_public.pem");
    const SHORT: &str = include_str!("../tests/fixtures/short_private.pem");

    #[derive(Debug, Serialize, Deserialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    #[test]
    fn jwks_exposes_rsa_signing_key() {
        let km = KeyManager::from_pem("kid-1", PRIVATE, Some(PUBLIC)).expect("load key");
        let json = serde_json::to_value(km.jwks()).unwrap();
        let key = &json["keys"][0];
        assert_eq!(key["kty"], "RSA");
        assert_eq!(key["alg"], "RS256");
        assert_eq!(key["use"], "sig");
        assert_eq!(key["kid"], "kid-1");
        let n = key["n"].as_str().unwrap();
        assert!(!n.contains('=') && !n.contains('+') && !n.contains('/'));
        assert_eq!(key["e"], "AQAB");
    }

    #[test]
    fn pkcs1_private_key_is_accepted() {
        let pkcs8 = KeyManager::from_pem("k", PRIVATE, None).unwrap();
        let pkcs1 = KeyManager::from_pem("k", PRIVATE_PKCS1, None).unwrap();
        assert_eq!(
            serde_json::to_value(pkcs8.jwks()).unwrap(),
            serde_json::to_value(pkcs1.jwks()).unwrap()
        );
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let err = KeyManager::from_pem("k", PRIVATE, Some(OTHER_PUBLIC)).unwrap_err();
        assert!(matches!(err, KeyError::Mismatch));
    }

    #[test]
    fn short_key_is_rejected() {
        let err = KeyManager::from_pem("k", SHORT, None).unwrap_err();
        assert!(matches!(err, KeyError::TooShort { bits: 1024 }));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = KeyManager::from_pem("k", "not a key", None).unwrap_err();
        assert!(matches!(err, KeyError::Malformed { kind: "private", .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let cfg = KeyConfig {
            kid: "k".into(),
            private_key_path: PathBuf::from("does/not/exist.pem"),
            public_key_path: None,
        };
        assert!(matches!(KeyManager::load(&cfg), Err(KeyError::Io { .. })));
    }

    #[test]
    fn signed_token_verifies_with_published_key() {
        let km = KeyManager::from_pem("kid-1", PRIVATE, None).unwrap();
        let token = km
            .sign(&Claims {
                sub: "alice".into(),
                exp: time::OffsetDateTime::now_utc().unix_timestamp() + 60,
            })
            .unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("kid-1"));
        assert_eq!(header.alg, Algorithm::RS256);

        let key = km.decoding_key("kid-1").expect("kid resolves");
        let data = decode::<Claims>(&token, &key, &Validation::new(Algorithm::RS256)).unwrap();
        assert_eq!(data.claims.sub, "alice");

        assert!(km.decoding_key("unknown").is_none());
    }

    #[test]
    fn verification_keys_can_be_appended() {
        let mut km = KeyManager::from_pem("current", PRIVATE, None).unwrap();
        km.add_verification_key("previous", OTHER_PUBLIC).unwrap();
        assert_eq!(km.jwks().keys.len(), 2);
        assert!(km.decoding_key("previous").is_some());
        assert_eq!(km.kid(), "current");
    }

    #[test]
    fn debug_hides_key_material() {
        let km = KeyManager::from_pem("kid-1", PRIVATE, None).unwrap();
        let dbg = format!("{km:?}");
        assert!(dbg.contains("kid-1"));
        assert!(!dbg.contains("BEGIN"));
    }
}
