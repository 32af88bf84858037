//! Request/response DTOs and handlers for the attestation and license endpoints.

use crate::error::ApiError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use centra_attestation::AttestationEngine;
use centra_derive::{api_handler, api_model};
use centra_domain::constants::{ATTESTATION_TAG, LICENSE_TAG};
use centra_kernel::security::resource::ResourceGuard;
use centra_licensing::{Client, LicenseStatus, LicenseStore, Quota, UsageKind};
use chrono::{DateTime, Utc};

#[api_model(rename_all = "snake_case")]
pub(super) struct ProvisionRequest {
    /// The license this local is being enrolled under.
    license_id: String,
    /// The local's Ed25519 public key, `SubjectPublicKeyInfo`/PEM encoded.
    local_pubkey: String,
    /// Opaque, informational only; not used as a binding constraint.
    machine_uuid: Option<String>,
}

#[api_model(rename_all = "snake_case")]
pub(super) struct ProvisionResponse {
    local_id: String,
    license_id: String,
    central_pubkey: String,
    provisioning_jwt: String,
}

#[api_handler(
    post,
    path = "/local/provision/",
    request_body = ProvisionRequest,
    responses(
        (status = CREATED, description = "Local enrolled", body = ProvisionResponse),
        (status = BAD_REQUEST, description = "Validation failed or key malformed"),
        (status = NOT_FOUND, description = "License does not exist or is not active"),
    ),
    tag = ATTESTATION_TAG,
)]
pub(super) async fn provision_handler(
    State(engine): State<AttestationEngine>,
    Json(req): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<ProvisionResponse>), ApiError> {
    let result = engine.provision(&req.license_id, &req.local_pubkey, req.machine_uuid).await?;

    Ok((
        StatusCode::CREATED,
        Json(ProvisionResponse {
            local_id: result.local_id,
            license_id: result.license_id,
            central_pubkey: result.central_pubkey,
            provisioning_jwt: result.provisioning_jwt,
        }),
    ))
}

#[api_model(rename_all = "snake_case")]
pub(super) struct ChallengeRequest {
    license_id: String,
    local_id: String,
    provisioning_jwt: String,
}

#[api_model(rename_all = "snake_case")]
pub(super) struct ChallengeResponse {
    nonce: String,
}

#[api_handler(
    post,
    path = "/local/challenge/",
    request_body = ChallengeRequest,
    responses(
        (status = OK, description = "Fresh nonce issued", body = ChallengeResponse),
        (status = BAD_REQUEST, description = "Provisioning token malformed or expired"),
        (status = FORBIDDEN, description = "Provisioning token does not match the request"),
    ),
    tag = ATTESTATION_TAG,
)]
pub(super) async fn challenge_handler(
    State(engine): State<AttestationEngine>,
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let result = engine.request_challenge(&req.license_id, &req.local_id, &req.provisioning_jwt).await?;

    Ok(Json(ChallengeResponse { nonce: result.nonce }))
}

#[api_model(rename_all = "snake_case")]
pub(super) struct AssertionRequest {
    license_id: String,
    local_id: String,
    provisioning_jwt: String,
    nonce: String,
    signed_nonce: String,
    usage_type: Option<UsageKind>,
}

#[api_model(rename_all = "snake_case")]
pub(super) struct AssertionResponse {
    assertion_jwt: String,
    usage: Quota,
    remaining: Quota,
}

#[api_handler(
    post,
    path = "/local/assertion/",
    request_body = AssertionRequest,
    responses(
        (status = OK, description = "Assertion issued", body = AssertionResponse),
        (status = BAD_REQUEST, description = "Validation failed"),
        (status = FORBIDDEN, description = "Token, nonce or signature invalid, or limit exhausted"),
        (status = NOT_FOUND, description = "Local not found"),
    ),
    tag = ATTESTATION_TAG,
)]
pub(super) async fn assertion_handler(
    State(engine): State<AttestationEngine>,
    Json(req): Json<AssertionRequest>,
) -> Result<Json<AssertionResponse>, ApiError> {
    let result = engine
        .submit_assertion(
            &req.license_id,
            &req.local_id,
            &req.provisioning_jwt,
            &req.nonce,
            &req.signed_nonce,
            req.usage_type,
        )
        .await?;

    Ok(Json(AssertionResponse {
        assertion_jwt: result.assertion_jwt,
        usage: result.usage,
        remaining: result.remaining,
    }))
}

#[api_model(rename_all = "snake_case")]
pub(super) struct LicenseView {
    id: String,
    client: Client,
    limits: Quota,
    usage: Quota,
    remaining: Quota,
    expiry: DateTime<Utc>,
    status: LicenseStatus,
}

#[api_handler(
    get,
    path = "/licenses/{id}",
    params(("id" = String, Path, description = "License id")),
    responses(
        (status = OK, description = "License usage/limits/status snapshot", body = LicenseView),
        (status = NOT_FOUND, description = "License does not exist"),
    ),
    tag = LICENSE_TAG,
)]
pub(super) async fn get_license_handler(
    State(licenses): State<LicenseStore>,
    Path(id): Path<String>,
) -> Result<Json<LicenseView>, ApiError> {
    // Rejects a path id scoped to a different table (e.g. a `local:` id
    // presented where a `license:` id is expected) before it ever reaches storage.
    let id = ResourceGuard::verify(&id, "license").map_err(|e| {
        ApiError::from(centra_attestation::AttestationError::ValidationFailed {
            message: e.to_string().into(),
            context: None,
        })
    })?;

    let license = licenses
        .get(&id)
        .await?
        .ok_or_else(|| centra_licensing::LicensingError::LicenseInvalid {
            message: format!("license {id} does not exist").into(),
            context: None,
        })?;

    Ok(Json(LicenseView {
        id: license.id,
        client: license.client,
        limits: license.limits,
        usage: license.usage,
        remaining: license.remaining(),
        expiry: license.expiry,
        status: license.status,
    }))
}
