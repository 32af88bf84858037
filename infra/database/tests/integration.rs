use centra_database::*;

#[tokio::test]
async fn connect_in_memory_and_health_check() {
    let db = Database::builder()
        .url("mem://")
        .session("test_ns", "test_db")
        .init()
        .await
        .expect("connect to mem://");

    db.health().await.expect("health check");
}

#[tokio::test]
async fn missing_parameters_fail_validation() {
    let err = Database::builder().init().await.unwrap_err();
    assert!(matches!(err, DatabaseError::Validation { .. }));
}

#[tokio::test]
async fn migrations_create_license_and_local_tables() {
    let db = Database::builder()
        .url("mem://")
        .session("test_ns", "test_db")
        .init()
        .await
        .expect("connect to mem://");

    let mut response = db.query("INFO FOR DB").await.expect("info for db");
    let info: surrealdb::Value = response.take(0).expect("take info");
    let rendered = format!("{info:?}");
    assert!(rendered.contains("license"));
    assert!(rendered.contains("local"));
}
