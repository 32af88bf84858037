use crate::error::TokenError;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

const PROVISIONING_TTL_SECONDS: i64 = 86_400;
const ASSERTION_TTL_SECONDS: i64 = 600;

/// The kind of bearer token minted by [`TokenService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Provisioning,
    Assertion,
}

/// The claims a caller asks [`TokenService::sign`] to mint; `iat`/`exp` are
/// injected by `sign`, never supplied by the caller.
#[derive(Debug, Clone)]
pub struct ClaimsInput {
    pub local_id: String,
    pub license_id: String,
    pub token_type: TokenType,
}

/// The claims carried by a signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub local_id: String,
    pub license_id: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Mints and verifies EdDSA bearer tokens against the root keypair.
///
/// The encoding/decoding keys are derived once at construction and cached for
/// the life of the service; the root key is never re-read from disk.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    /// Builds a service from the root keypair's PEM encodings.
    ///
    /// # Errors
    /// Returns [`TokenError::Invalid`] if either PEM cannot be parsed as an
    /// Ed25519 key.
    pub fn new(private_key_pem: &str, public_key_pem: &str) -> Result<Self, TokenError> {
        let encoding_key = EncodingKey::from_ed_pem(private_key_pem.as_bytes())
            .map_err(|e| TokenError::Invalid { message: e.to_string().into(), context: None })?;
        let decoding_key = DecodingKey::from_ed_pem(public_key_pem.as_bytes())
            .map_err(|e| TokenError::Invalid { message: e.to_string().into(), context: None })?;
        Ok(Self { encoding_key, decoding_key })
    }

    /// Signs `claims`, injecting `iat`/`exp` and serializing to a compact JWS.
    ///
    /// # Errors
    /// Returns [`TokenError::Invalid`] if encoding fails.
    pub fn sign(&self, claims: ClaimsInput, ttl_seconds: i64) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let exp = now + ttl_seconds;
        let full = Claims {
            local_id: claims.local_id,
            license_id: claims.license_id,
            token_type: claims.token_type,
            iat: now,
            exp,
        };
        encode(&Header::new(Algorithm::EdDSA), &full, &self.encoding_key)
            .map_err(|e| TokenError::Invalid { message: e.to_string().into(), context: None })
    }

    /// Verifies a compact JWS and returns its claims.
    ///
    /// # Errors
    /// Returns [`TokenError::Invalid`] on signature mismatch,
    /// [`TokenError::Expired`] on a stale `exp`, or [`TokenError::Malformed`]
    /// if the token cannot be parsed.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::EdDSA);
        decode::<Claims>(token, &self.decoding_key, &validation).map(|data| data.claims).map_err(classify)
    }

    /// Issues a provisioning token, valid for 24 hours.
    ///
    /// # Errors
    /// See [`TokenService::sign`].
    pub fn issue_provisioning(&self, local_id: &str, license_id: &str) -> Result<String, TokenError> {
        self.sign(
            ClaimsInput {
                local_id: local_id.to_owned(),
                license_id: license_id.to_owned(),
                token_type: TokenType::Provisioning,
            },
            PROVISIONING_TTL_SECONDS,
        )
    }

    /// Issues an assertion token, valid for 10 minutes.
    ///
    /// # Errors
    /// See [`TokenService::sign`].
    pub fn issue_assertion(&self, local_id: &str, license_id: &str) -> Result<String, TokenError> {
        self.sign(
            ClaimsInput {
                local_id: local_id.to_owned(),
                license_id: license_id.to_owned(),
                token_type: TokenType::Assertion,
            },
            ASSERTION_TTL_SECONDS,
        )
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => {
            TokenError::Expired { message: "token exp has passed".into(), context: None }
        }
        ErrorKind::Json(_) | ErrorKind::Utf8(_) | ErrorKind::Base64(_) | ErrorKind::InvalidToken => {
            TokenError::Malformed { source: err, context: None }
        }
        _ => TokenError::Invalid { message: err.to_string().into(), context: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
    use ed25519_dalek::pkcs8::spki::EncodePublicKey;
    use ed25519_dalek::pkcs8::EncodePrivateKey;
    use rand::rngs::OsRng;

    fn service() -> TokenService {
        let signing_key = SigningKey::generate(&mut OsRng);
        let private_pem = signing_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = signing_key.verifying_key().to_public_key_pem(LineEnding::LF).unwrap();
        TokenService::new(&private_pem, &public_pem).unwrap()
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let service = service();
        let token = service.issue_provisioning("LOCAL-ABCDEF", "license:acme").unwrap();
        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.local_id, "LOCAL-ABCDEF");
        assert_eq!(claims.token_type, TokenType::Provisioning);
    }

    #[test]
    fn verify_rejects_token_from_a_different_key() {
        let service_a = service();
        let service_b = service();
        let token = service_a.issue_assertion("LOCAL-ABCDEF", "license:acme").unwrap();
        let err = service_b.verify(&token).unwrap_err();
        assert!(matches!(err, TokenError::Invalid { .. }));
    }

    #[test]
    fn verify_rejects_an_expired_token() {
        let service = service();
        let token = service
            .sign(
                ClaimsInput {
                    local_id: "LOCAL-ABCDEF".into(),
                    license_id: "license:acme".into(),
                    token_type: TokenType::Provisioning,
                },
                -1,
            )
            .unwrap();
        let err = service.verify(&token).unwrap_err();
        assert!(matches!(err, TokenError::Expired { .. }));
    }
}
