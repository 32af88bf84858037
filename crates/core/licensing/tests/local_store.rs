use centra_database::Database;
use centra_licensing::{LicenseStore, LocalStore, Quota};
use chrono::{Duration, Utc};

async fn test_db() -> Database {
    Database::builder().url("mem://").session("test_ns", "test_db").init().await.unwrap()
}

#[tokio::test]
async fn create_rejects_duplicate_local_id() {
    let db = test_db().await;
    let licenses = LicenseStore::new(db.clone());
    let locals = LocalStore::new(db);

    let license = licenses
        .create("acme", "ops@acme.test", Quota { scans: 10, users: 2 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();

    locals.create(&license.id, "LOCAL-ABCDEF", "pem-key", None).await.unwrap();

    let err = locals.create(&license.id, "LOCAL-ABCDEF", "other-key", None).await.unwrap_err();
    assert!(matches!(err, centra_licensing::LicensingError::LocalAlreadyExists { .. }));
}

#[tokio::test]
async fn take_nonce_is_single_use() {
    let db = test_db().await;
    let licenses = LicenseStore::new(db.clone());
    let locals = LocalStore::new(db);

    let license = licenses
        .create("acme", "ops@acme.test", Quota { scans: 10, users: 2 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();
    locals.create(&license.id, "LOCAL-ABCDEF", "pem-key", None).await.unwrap();

    locals.set_nonce("LOCAL-ABCDEF", &license.id, "nonce-1").await.unwrap();

    assert!(locals.take_nonce("LOCAL-ABCDEF", "nonce-1").await.unwrap());
    assert!(!locals.take_nonce("LOCAL-ABCDEF", "nonce-1").await.unwrap());
}

#[tokio::test]
async fn set_nonce_fails_for_unbound_pair() {
    let db = test_db().await;
    let licenses = LicenseStore::new(db.clone());
    let locals = LocalStore::new(db);

    let license = licenses
        .create("acme", "ops@acme.test", Quota { scans: 10, users: 2 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();

    let err = locals.set_nonce("LOCAL-GHOST", &license.id, "nonce-1").await.unwrap_err();
    assert!(matches!(err, centra_licensing::LicensingError::LocalNotFound { .. }));
}
