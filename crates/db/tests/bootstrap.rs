mod common;

/// Full bootstrap test: connect, migrate, verify schema.
#[tokio::test]
async fn test_full_bootstrap() {
    let pool = common::test_pool().await;

    avicast_db::health_check(&pool).await.unwrap();

    let tables = [
        "uploaded_images",
        "detection_results",
        "detection_overrides",
        "census_observations",
        "census_allocations",
    ];

    for table in tables {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, 0, "{table} should start empty");
    }
}

/// Migrations are idempotent when run twice on the same database.
#[tokio::test]
async fn test_migrations_rerun_cleanly() {
    let pool = common::test_pool().await;
    avicast_db::run_migrations(&pool).await.unwrap();
}

/// Foreign keys are enforced on every connection.
#[tokio::test]
async fn test_foreign_keys_enforced() {
    let pool = common::test_pool().await;
    let result = sqlx::query(
        "INSERT INTO detection_results (image_id, detections, decision, created_at, updated_at)
         VALUES (999, '[]', 'pending', '2025-03-01T08:00:00Z', '2025-03-01T08:00:00Z')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "orphan detection result must be rejected");
}
