use crate::Database;
use chrono::{TimeZone, Utc};
use sociwave_core::{AppConfig, ConfigStore, CoreError, DatabaseError, Rule, RuleStore, StatsSink};
use std::env;

async fn setup_test_db() -> Database {
    let db_path = env::temp_dir().join(format!("test_sociwave_{}.db", uuid::Uuid::new_v4()));
    let db_url = format!("sqlite://{}", db_path.display());

    let mut db = Database::new(db_url);
    db.connect()
        .await
        .expect("Failed to connect to test database");
    db.run_migrations().await.expect("Failed to run migrations");

    db
}

#[tokio::test]
async fn test_database_connection_and_migrations() {
    let db = setup_test_db().await;

    // Migrations are idempotent
    db.run_migrations().await.expect("Failed to re-run migrations");
    let stats = db.load_stats().await.unwrap().unwrap();
    assert_eq!(stats.total_checks, 0);
    assert!(stats.last_check_time.is_none());
}

#[tokio::test]
async fn test_unconnected_database_reports_error() {
    let db = Database::new("sqlite::memory:".to_string());
    let result = db.get_setting("anything").await;
    assert!(matches!(
        result,
        Err(CoreError::Database(DatabaseError::ConnectionFailed { .. }))
    ));
}

#[tokio::test]
async fn test_basic_functionality() {
    let db = setup_test_db().await;

    db.save_setting("test_key", "test_value")
        .await
        .expect("Failed to save setting");
    let value = db
        .get_setting("test_key")
        .await
        .expect("Failed to get setting");
    assert_eq!(value, Some("test_value".to_string()));

    db.save_setting("test_key", "updated").await.unwrap();
    assert_eq!(
        db.get_setting("test_key").await.unwrap(),
        Some("updated".to_string())
    );
    assert_eq!(db.get_setting("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_config_round_trip() {
    let db = setup_test_db().await;
    assert!(db.load_config().await.unwrap().is_none());

    let mut config = AppConfig::new("token".to_string(), "1234".to_string());
    config.reels_limit = 10;
    config.use_mock_data = true;
    db.save_config(&config).await.unwrap();

    assert_eq!(db.load_config().await.unwrap(), Some(config));
    assert_eq!(
        db.get_setting("pageId").await.unwrap(),
        Some("1234".to_string())
    );
}

#[tokio::test]
async fn test_partial_config_uses_defaults() {
    let db = setup_test_db().await;
    db.save_setting("accessToken", "token").await.unwrap();
    db.save_setting("pageId", "1234").await.unwrap();

    let config = db.load_config().await.unwrap().unwrap();
    assert_eq!(config.api_version, "v20.0");
    assert_eq!(config.comments_limit, 100);
    assert!(!config.use_mock_data);
    assert!(config.is_valid());
}

#[tokio::test]
async fn test_corrupt_config_value() {
    let db = setup_test_db().await;
    db.save_setting("pageId", "1234").await.unwrap();
    db.save_setting("reelsLimit", "lots").await.unwrap();

    let result = db.load_config().await;
    assert!(matches!(
        result,
        Err(CoreError::Database(DatabaseError::CorruptRecord { .. }))
    ));
}

#[tokio::test]
async fn test_rule_storage() {
    let db = setup_test_db().await;

    let rule = Rule::new("reel-1", "Thanks for asking!")
        .with_match_words(["price", "cost"])
        .with_inbox_message("Here is the price list");
    db.save_rule(&rule).await.unwrap();
    db.save_rule(&Rule::new("reel-2", "Hi").disabled())
        .await
        .unwrap();

    let rules = db.load_rules().await.unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules["reel-1"], rule);
    assert!(!rules["reel-2"].enabled);

    let updated = Rule::new("reel-1", "Updated reply");
    db.save_rule(&updated).await.unwrap();
    assert_eq!(db.load_rules().await.unwrap()["reel-1"], updated);

    db.delete_rule("reel-1").await.unwrap();
    db.delete_rule("never-existed").await.unwrap();
    let rules = db.load_rules().await.unwrap();
    assert_eq!(rules.len(), 1);
    assert!(rules.contains_key("reel-2"));
}

#[tokio::test]
async fn test_stats_recording() {
    let db = setup_test_db().await;
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

    db.record_check(at, Some(("GATEWAY_RATE_LIMITED", "Rate limit exceeded")))
        .await
        .unwrap();
    db.record_reply().await.unwrap();
    db.record_reply().await.unwrap();
    db.record_private_reply().await.unwrap();

    let stats = db.load_stats().await.unwrap().unwrap();
    assert_eq!(stats.total_checks, 1);
    assert_eq!(stats.total_replies, 2);
    assert_eq!(stats.total_private_replies, 1);
    assert_eq!(stats.last_check_time, Some(at));
    assert_eq!(stats.last_error_code.as_deref(), Some("GATEWAY_RATE_LIMITED"));

    db.record_check(at, None).await.unwrap();
    let stats = db.load_stats().await.unwrap().unwrap();
    assert_eq!(stats.total_checks, 2);
    assert!(stats.last_error.is_none());
    assert!(stats.last_error_code.is_none());
    assert_eq!(db.load_last_check().await.unwrap(), Some(at));
}

#[tokio::test]
async fn test_open_helper() {
    let db_path = env::temp_dir().join(format!("test_sociwave_{}.db", uuid::Uuid::new_v4()));
    let db = Database::open(format!("sqlite://{}", db_path.display()))
        .await
        .unwrap();
    assert!(db.load_rules().await.unwrap().is_empty());
    db.close().await;
    let _ = std::fs::remove_file(db_path);
}
