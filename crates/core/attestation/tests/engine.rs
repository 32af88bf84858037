use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use centra_attestation::{AttestationEngine, AttestationError, ClaimsInput, TokenService, TokenType};
use centra_database::Database;
use centra_licensing::{LicenseStatus, LicenseStore, LocalStore, Quota, UsageKind};
use chrono::{Duration, Utc};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::spki::EncodePublicKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;

struct Harness {
    engine: AttestationEngine,
    licenses: LicenseStore,
    root_private_pem: String,
    root_public_pem: String,
}

async fn harness() -> Harness {
    let db = Database::builder().url("mem://").session("test_ns", "test_db").init().await.unwrap();
    let licenses = LicenseStore::new(db.clone());
    let locals = LocalStore::new(db);

    let root = SigningKey::generate(&mut OsRng);
    let root_private_pem = root.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
    let root_public_pem = root.verifying_key().to_public_key_pem(LineEnding::LF).unwrap();

    let engine = AttestationEngine::new(&root_private_pem, &root_public_pem, licenses.clone(), locals).unwrap();

    Harness { engine, licenses, root_private_pem, root_public_pem }
}

fn local_keypair() -> (SigningKey, String) {
    let key = SigningKey::generate(&mut OsRng);
    let pem = key.verifying_key().to_public_key_pem(LineEnding::LF).unwrap();
    (key, pem)
}

fn sign_nonce(key: &SigningKey, nonce: &str) -> String {
    let signature = key.sign(nonce.as_bytes());
    URL_SAFE_NO_PAD.encode(signature.to_bytes())
}

#[tokio::test]
async fn happy_path_scan_event_exhausts_the_limit() {
    let h = harness().await;
    let license = h
        .licenses
        .create("acme", "ops@acme.test", Quota { scans: 2, users: 1 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();

    let (key, pubkey_pem) = local_keypair();
    let provision = h.engine.provision(&license.id, &pubkey_pem, None).await.unwrap();

    for expected_scans in [1_i64, 2] {
        let challenge = h
            .engine
            .request_challenge(&license.id, &provision.local_id, &provision.provisioning_jwt)
            .await
            .unwrap();
        let signed = sign_nonce(&key, &challenge.nonce);
        let assertion = h
            .engine
            .submit_assertion(
                &license.id,
                &provision.local_id,
                &provision.provisioning_jwt,
                &challenge.nonce,
                &signed,
                Some(UsageKind::Scan),
            )
            .await
            .unwrap();
        assert_eq!(assertion.usage.scans, expected_scans);
        assert_eq!(assertion.remaining.scans, 2 - expected_scans);
    }

    let challenge =
        h.engine.request_challenge(&license.id, &provision.local_id, &provision.provisioning_jwt).await.unwrap();
    let signed = sign_nonce(&key, &challenge.nonce);
    let err = h
        .engine
        .submit_assertion(
            &license.id,
            &provision.local_id,
            &provision.provisioning_jwt,
            &challenge.nonce,
            &signed,
            Some(UsageKind::Scan),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AttestationError::Licensing { source: centra_licensing::LicensingError::LimitExhausted { .. }, .. }
    ));
}

#[tokio::test]
async fn replay_of_the_same_nonce_is_rejected() {
    let h = harness().await;
    let license = h
        .licenses
        .create("acme", "ops@acme.test", Quota { scans: 2, users: 1 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();
    let (key, pubkey_pem) = local_keypair();
    let provision = h.engine.provision(&license.id, &pubkey_pem, None).await.unwrap();
    let challenge =
        h.engine.request_challenge(&license.id, &provision.local_id, &provision.provisioning_jwt).await.unwrap();
    let signed = sign_nonce(&key, &challenge.nonce);

    h.engine
        .submit_assertion(
            &license.id,
            &provision.local_id,
            &provision.provisioning_jwt,
            &challenge.nonce,
            &signed,
            Some(UsageKind::Scan),
        )
        .await
        .unwrap();

    let err = h
        .engine
        .submit_assertion(
            &license.id,
            &provision.local_id,
            &provision.provisioning_jwt,
            &challenge.nonce,
            &signed,
            Some(UsageKind::Scan),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AttestationError::NonceInvalid { .. }));

    let refreshed = h.licenses.get(&license.id).await.unwrap().unwrap();
    assert_eq!(refreshed.usage.scans, 1);
}

#[tokio::test]
async fn wrong_signer_fails_signature_verification() {
    let h = harness().await;
    let license = h
        .licenses
        .create("acme", "ops@acme.test", Quota { scans: 2, users: 1 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();
    let (_key, pubkey_pem) = local_keypair();
    let (other_key, _) = local_keypair();
    let provision = h.engine.provision(&license.id, &pubkey_pem, None).await.unwrap();
    let challenge =
        h.engine.request_challenge(&license.id, &provision.local_id, &provision.provisioning_jwt).await.unwrap();
    let signed = sign_nonce(&other_key, &challenge.nonce);

    let err = h
        .engine
        .submit_assertion(
            &license.id,
            &provision.local_id,
            &provision.provisioning_jwt,
            &challenge.nonce,
            &signed,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AttestationError::SignatureInvalid { .. }));

    let refreshed = h.licenses.get(&license.id).await.unwrap().unwrap();
    assert_eq!(refreshed.usage.scans, 0);
}

#[tokio::test]
async fn provisioning_token_is_bound_to_its_own_license() {
    let h = harness().await;
    let license_a = h
        .licenses
        .create("acme", "ops@acme.test", Quota { scans: 2, users: 1 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();
    let license_b = h
        .licenses
        .create("globex", "ops@globex.test", Quota { scans: 2, users: 1 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();
    let (_key, pubkey_pem) = local_keypair();
    let provision = h.engine.provision(&license_a.id, &pubkey_pem, None).await.unwrap();

    let err = h
        .engine
        .request_challenge(&license_b.id, &provision.local_id, &provision.provisioning_jwt)
        .await
        .unwrap_err();
    assert!(matches!(err, AttestationError::TokenMismatch { .. }));
}

#[tokio::test]
async fn revoked_license_rejects_assertions() {
    let h = harness().await;
    let license = h
        .licenses
        .create("acme", "ops@acme.test", Quota { scans: 2, users: 1 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();
    let (key, pubkey_pem) = local_keypair();
    let provision = h.engine.provision(&license.id, &pubkey_pem, None).await.unwrap();
    let challenge =
        h.engine.request_challenge(&license.id, &provision.local_id, &provision.provisioning_jwt).await.unwrap();
    let signed = sign_nonce(&key, &challenge.nonce);

    h.licenses.set_status(&license.id, LicenseStatus::Revoked).await.unwrap();

    let err = h
        .engine
        .submit_assertion(
            &license.id,
            &provision.local_id,
            &provision.provisioning_jwt,
            &challenge.nonce,
            &signed,
            Some(UsageKind::Scan),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AttestationError::Licensing { source: centra_licensing::LicensingError::LicenseInactive { .. }, .. }
    ));

    let refreshed = h.licenses.get(&license.id).await.unwrap().unwrap();
    assert_eq!(refreshed.usage.scans, 0);
}

#[tokio::test]
async fn expired_provisioning_token_is_rejected() {
    let h = harness().await;
    let license = h
        .licenses
        .create("acme", "ops@acme.test", Quota { scans: 2, users: 1 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();
    let (_key, pubkey_pem) = local_keypair();
    let provision = h.engine.provision(&license.id, &pubkey_pem, None).await.unwrap();

    let tokens = TokenService::new(&h.root_private_pem, &h.root_public_pem).unwrap();
    let stale = tokens
        .sign(
            ClaimsInput {
                local_id: provision.local_id.clone(),
                license_id: license.id.clone(),
                token_type: TokenType::Provisioning,
            },
            -1,
        )
        .unwrap();

    let err = h.engine.request_challenge(&license.id, &provision.local_id, &stale).await.unwrap_err();
    assert!(matches!(
        err,
        AttestationError::Token { source: centra_attestation::TokenError::Expired { .. }, .. }
    ));
}
