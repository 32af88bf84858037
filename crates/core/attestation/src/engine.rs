use crate::error::{AttestationError, TokenError};
use crate::nonce::NonceService;
use crate::token::{ClaimsInput, TokenService, TokenType};
use centra_licensing::{Client, License, LicenseStatus, LicenseStore, LicensingError, LocalStore, Quota, UsageKind};
use ed25519_dalek::pkcs8::spki::DecodePublicKey;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Response of [`AttestationEngine::provision`].
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionResult {
    pub local_id: String,
    pub license_id: String,
    pub central_pubkey: String,
    pub provisioning_jwt: String,
}

/// Response of [`AttestationEngine::request_challenge`].
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeResult {
    pub nonce: String,
}

/// Response of [`AttestationEngine::submit_assertion`].
#[derive(Debug, Clone, Serialize)]
pub struct AssertionResult {
    pub assertion_jwt: String,
    pub usage: Quota,
    pub remaining: Quota,
}

/// The fields signed as part of a [`LicenseConfig`] export, in isolation from
/// the `signature` field itself.
#[derive(Serialize)]
struct LicenseConfigPayload {
    license_id: String,
    client: Client,
    limits: Quota,
    expiry: DateTime<Utc>,
    status: LicenseStatus,
    issued_at: DateTime<Utc>,
    central_pubkey: String,
}

/// A signed, self-contained snapshot of a license, handed to an operator for
/// out-of-band distribution.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseConfig {
    pub license_id: String,
    pub client: Client,
    pub limits: Quota,
    pub expiry: DateTime<Utc>,
    pub status: LicenseStatus,
    pub issued_at: DateTime<Utc>,
    pub central_pubkey: String,
    pub signature: String,
}

struct Inner {
    tokens: TokenService,
    nonces: NonceService,
    licenses: LicenseStore,
    locals: LocalStore,
    root_signing_key: SigningKey,
    central_public_key_pem: String,
}

/// Orchestrates `Provision`, `RequestChallenge` and `SubmitAssertion` against
/// the root keypair and the license/local stores.
///
/// Cheaply cloneable: the root key material and store handles are loaded once
/// and shared across every clone.
#[derive(Clone)]
pub struct AttestationEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AttestationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationEngine").finish_non_exhaustive()
    }
}

impl AttestationEngine {
    /// Builds an engine from the root keypair's PEM encodings and the two stores.
    ///
    /// # Errors
    /// Returns [`AttestationError::Token`] if either PEM cannot be parsed.
    pub fn new(
        private_key_pem: &str,
        public_key_pem: &str,
        licenses: LicenseStore,
        locals: LocalStore,
    ) -> Result<Self, AttestationError> {
        let tokens = TokenService::new(private_key_pem, public_key_pem).map_err(wrap_token)?;
        let root_signing_key = SigningKey::from_pkcs8_pem(private_key_pem).map_err(|e| AttestationError::Internal {
            message: e.to_string().into(),
            context: Some("parsing root signing key for detached signatures".into()),
        })?;
        Ok(Self {
            inner: Arc::new(Inner {
                tokens,
                nonces: NonceService,
                licenses,
                locals,
                root_signing_key,
                central_public_key_pem: public_key_pem.to_owned(),
            }),
        })
    }

    /// Builds a signed, out-of-band snapshot of `license` for export.
    ///
    /// The signature covers the canonical (sorted-key, compact) JSON bytes of
    /// every field except `signature` itself.
    ///
    /// # Errors
    /// Returns [`AttestationError::Internal`] if canonicalization fails.
    pub fn export_license_config(&self, license: &License) -> Result<LicenseConfig, AttestationError> {
        let payload = LicenseConfigPayload {
            license_id: license.id.clone(),
            client: license.client.clone(),
            limits: license.limits,
            expiry: license.expiry,
            status: license.status,
            issued_at: Utc::now(),
            central_pubkey: self.inner.central_public_key_pem.clone(),
        };
        let canonical = canonical_bytes(&payload)?;
        let signature = self.inner.root_signing_key.sign(&canonical);

        Ok(LicenseConfig {
            license_id: payload.license_id,
            client: payload.client,
            limits: payload.limits,
            expiry: payload.expiry,
            status: payload.status,
            issued_at: payload.issued_at,
            central_pubkey: payload.central_pubkey,
            signature: STANDARD.encode(signature.to_bytes()),
        })
    }

    /// Registers a new local server under `license_id` and issues it a
    /// provisioning token.
    ///
    /// # Errors
    /// Returns [`AttestationError::Licensing`] if the license does not exist
    /// or is not active, [`AttestationError::KeyMalformed`] if
    /// `local_pubkey_pem` is not a valid Ed25519 public key, or
    /// [`AttestationError::Token`] if token issuance fails.
    #[instrument(skip(self, local_pubkey_pem))]
    pub async fn provision(
        &self,
        license_id: &str,
        local_pubkey_pem: &str,
        machine_uuid: Option<String>,
    ) -> Result<ProvisionResult, AttestationError> {
        self.require_active_license(license_id).await?;

        VerifyingKey::from_public_key_pem(local_pubkey_pem)
            .map_err(|e| AttestationError::KeyMalformed { message: e.to_string().into(), context: None })?;

        let local_id = generate_local_id();

        self.inner
            .locals
            .create(license_id, &local_id, local_pubkey_pem, machine_uuid)
            .await
            .map_err(wrap_licensing)?;

        let provisioning_jwt = self.inner.tokens.issue_provisioning(&local_id, license_id).map_err(wrap_token)?;

        Ok(ProvisionResult {
            local_id,
            license_id: license_id.to_owned(),
            central_pubkey: self.inner.central_public_key_pem.clone(),
            provisioning_jwt,
        })
    }

    /// Issues a fresh one-shot nonce for an already-provisioned local.
    ///
    /// # Errors
    /// Returns [`AttestationError::TokenMismatch`] if the provisioning token
    /// does not match `local_id`/`license_id`, or [`AttestationError::Licensing`]
    /// (nested `LocalNotFound`) if the pair is not bound.
    #[instrument(skip(self, provisioning_jwt))]
    pub async fn request_challenge(
        &self,
        license_id: &str,
        local_id: &str,
        provisioning_jwt: &str,
    ) -> Result<ChallengeResult, AttestationError> {
        self.verify_provisioning(provisioning_jwt, local_id, license_id)?;

        let nonce = self.inner.nonces.random_nonce(32);
        self.inner.locals.set_nonce(local_id, license_id, &nonce).await.map_err(wrap_licensing)?;

        Ok(ChallengeResult { nonce })
    }

    /// Verifies a signed nonce, optionally consumes one unit of usage, and
    /// mints an assertion token.
    ///
    /// Consumes usage before clearing the nonce; if the nonce has already
    /// been consumed by a concurrent request, the usage increment is rolled
    /// back. See the module-level ordering note.
    ///
    /// # Errors
    /// Returns [`AttestationError::TokenMismatch`], [`AttestationError::NonceInvalid`],
    /// [`AttestationError::SignatureInvalid`], or [`AttestationError::Licensing`]
    /// (nested `LicenseInactive`/`LicenseExpired`/`LimitExhausted`) depending on
    /// where verification fails.
    #[instrument(skip(self, provisioning_jwt, signed_nonce_b64))]
    pub async fn submit_assertion(
        &self,
        license_id: &str,
        local_id: &str,
        provisioning_jwt: &str,
        nonce: &str,
        signed_nonce_b64: &str,
        usage_type: Option<UsageKind>,
    ) -> Result<AssertionResult, AttestationError> {
        self.verify_provisioning(provisioning_jwt, local_id, license_id)?;

        let local = self
            .inner
            .locals
            .get_by_local_id(local_id)
            .await
            .map_err(wrap_licensing)?
            .ok_or_else(nonce_invalid)?;

        if local.license_id != license_id || local.nonce.as_deref() != Some(nonce) {
            return Err(nonce_invalid());
        }

        verify_signed_nonce(&local.public_key, nonce, signed_nonce_b64)?;

        let consumed = match usage_type {
            Some(kind) => Some(self.inner.licenses.try_consume_usage(license_id, kind).await.map_err(wrap_licensing)?),
            None => None,
        };

        let cleared = self.inner.locals.take_nonce(local_id, nonce).await.map_err(wrap_licensing)?;
        if !cleared {
            if let Some(kind) = usage_type {
                if let Err(source) = self.inner.licenses.decrement_usage(license_id, kind).await {
                    tracing::error!(%source, "usage rollback failed after a replayed nonce");
                }
            }
            return Err(nonce_invalid());
        }

        let license = match consumed {
            Some(license) => license,
            None => self
                .inner
                .licenses
                .get(license_id)
                .await
                .map_err(wrap_licensing)?
                .ok_or_else(|| wrap_licensing(license_invalid(license_id)))?,
        };

        let assertion_jwt = self.inner.tokens.issue_assertion(local_id, license_id).map_err(wrap_token)?;

        Ok(AssertionResult { assertion_jwt, usage: license.usage, remaining: license.remaining() })
    }

    async fn require_active_license(&self, license_id: &str) -> Result<(), AttestationError> {
        let license = self.inner.licenses.get(license_id).await.map_err(wrap_licensing)?;
        match license {
            Some(license) if license.status == LicenseStatus::Active => Ok(()),
            _ => Err(wrap_licensing(license_invalid(license_id))),
        }
    }

    fn verify_provisioning(
        &self,
        token: &str,
        local_id: &str,
        license_id: &str,
    ) -> Result<(), AttestationError> {
        let claims = self.inner.tokens.verify(token).map_err(wrap_token)?;
        if claims.token_type != TokenType::Provisioning
            || claims.local_id != local_id
            || claims.license_id != license_id
        {
            return Err(AttestationError::TokenMismatch {
                message: "provisioning token does not match the requested local/license".into(),
                context: None,
            });
        }
        Ok(())
    }
}

fn canonical_bytes(payload: &LicenseConfigPayload) -> Result<Vec<u8>, AttestationError> {
    let value = serde_json::to_value(payload).map_err(|e| AttestationError::Internal {
        message: e.to_string().into(),
        context: Some("canonicalizing license config payload".into()),
    })?;
    serde_json::to_vec(&value).map_err(|e| AttestationError::Internal {
        message: e.to_string().into(),
        context: Some("serializing canonical license config bytes".into()),
    })
}

fn generate_local_id() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("LOCAL-{}", &raw[..6])
}

fn verify_signed_nonce(public_key_pem: &str, nonce: &str, signed_nonce_b64: &str) -> Result<(), AttestationError> {
    let trimmed = signed_nonce_b64.trim_end_matches('=');
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|e| AttestationError::SignatureInvalid { message: format!("invalid base64: {e}").into(), context: None })?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| AttestationError::SignatureInvalid { message: e.to_string().into(), context: None })?;
    let verifying_key = VerifyingKey::from_public_key_pem(public_key_pem)
        .map_err(|e| AttestationError::KeyMalformed { message: e.to_string().into(), context: None })?;

    verifying_key
        .verify_strict(nonce.as_bytes(), &signature)
        .map_err(|e| AttestationError::SignatureInvalid { message: e.to_string().into(), context: None })
}

fn nonce_invalid() -> AttestationError {
    AttestationError::NonceInvalid { message: "no outstanding nonce matches the supplied value".into(), context: None }
}

fn license_invalid(license_id: &str) -> LicensingError {
    LicensingError::LicenseInvalid { message: format!("license {license_id} is not active").into(), context: None }
}

const fn wrap_token(source: TokenError) -> AttestationError {
    AttestationError::Token { source, context: None }
}

const fn wrap_licensing(source: LicensingError) -> AttestationError {
    AttestationError::Licensing { source, context: None }
}
