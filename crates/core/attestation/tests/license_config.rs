use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use centra_attestation::AttestationEngine;
use centra_database::Database;
use centra_licensing::{LicenseStore, LocalStore, Quota};
use chrono::{Duration, Utc};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::spki::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{Signature, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde_json::json;

#[tokio::test]
async fn exported_license_config_signature_verifies_against_its_own_canonical_bytes() {
    let db = Database::builder().url("mem://").session("test_ns", "test_db").init().await.unwrap();
    let licenses = LicenseStore::new(db.clone());
    let locals = LocalStore::new(db);

    let root = SigningKey::generate(&mut OsRng);
    let private_pem = root.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
    let public_pem = root.verifying_key().to_public_key_pem(LineEnding::LF).unwrap();
    let engine = AttestationEngine::new(&private_pem, &public_pem, licenses.clone(), locals).unwrap();

    let license = licenses
        .create("acme", "ops@acme.test", Quota { scans: 10, users: 2 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();

    let exported = engine.export_license_config(&license).unwrap();
    assert_eq!(exported.license_id, license.id);
    assert_eq!(exported.central_pubkey, public_pem);

    // Recompute the canonical bytes the same way a third-party verifier would:
    // every field except `signature`, as sorted-key compact JSON.
    let canonical = json!({
        "license_id": exported.license_id,
        "client": exported.client,
        "limits": exported.limits,
        "expiry": exported.expiry,
        "status": exported.status,
        "issued_at": exported.issued_at,
        "central_pubkey": exported.central_pubkey,
    });
    let canonical_bytes = serde_json::to_vec(&canonical).unwrap();

    let verifying_key = VerifyingKey::from_public_key_pem(&exported.central_pubkey).unwrap();
    let sig_bytes = STANDARD.decode(&exported.signature).unwrap();
    let signature = Signature::from_slice(&sig_bytes).unwrap();

    verifying_key.verify(&canonical_bytes, &signature).unwrap();
}
