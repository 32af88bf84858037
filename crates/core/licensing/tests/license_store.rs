use centra_database::Database;
use centra_licensing::{LicenseStatus, LicenseStore, Quota, UsageKind};
use chrono::{Duration, Utc};

async fn test_db() -> Database {
    Database::builder().url("mem://").session("test_ns", "test_db").init().await.unwrap()
}

#[tokio::test]
async fn create_rejects_past_expiry() {
    let store = LicenseStore::new(test_db().await);
    let err = store
        .create("acme", "ops@acme.test", Quota { scans: 10, users: 2 }, Utc::now() - Duration::days(1))
        .await
        .unwrap_err();
    assert!(matches!(err, centra_licensing::LicensingError::ValidationFailed { .. }));
}

#[tokio::test]
async fn try_consume_usage_increments_and_caps() {
    let store = LicenseStore::new(test_db().await);
    let license = store
        .create("acme", "ops@acme.test", Quota { scans: 2, users: 1 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();

    let updated = store.try_consume_usage(&license.id, UsageKind::Scan).await.unwrap();
    assert_eq!(updated.usage.scans, 1);

    let updated = store.try_consume_usage(&license.id, UsageKind::Scan).await.unwrap();
    assert_eq!(updated.usage.scans, 2);

    let err = store.try_consume_usage(&license.id, UsageKind::Scan).await.unwrap_err();
    assert!(matches!(err, centra_licensing::LicensingError::LimitExhausted { .. }));
}

#[tokio::test]
async fn try_consume_usage_rejects_inactive_license() {
    let store = LicenseStore::new(test_db().await);
    let license = store
        .create("acme", "ops@acme.test", Quota { scans: 2, users: 1 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();

    store.set_status(&license.id, LicenseStatus::Revoked).await.unwrap();

    let err = store.try_consume_usage(&license.id, UsageKind::Scan).await.unwrap_err();
    assert!(matches!(err, centra_licensing::LicensingError::LicenseInactive { .. }));
}

#[tokio::test]
async fn decrement_usage_floors_at_zero() {
    let store = LicenseStore::new(test_db().await);
    let license = store
        .create("acme", "ops@acme.test", Quota { scans: 2, users: 1 }, Utc::now() + Duration::days(365))
        .await
        .unwrap();

    store.decrement_usage(&license.id, UsageKind::Scan).await.unwrap();
    let refreshed = store.get(&license.id).await.unwrap().unwrap();
    assert_eq!(refreshed.usage.scans, 0);
}
