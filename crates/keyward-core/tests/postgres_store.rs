//! PostgreSQL store integration tests
//!
//! Note: These tests require a running PostgreSQL instance.
//! Set DATABASE_URL and run: cargo test -p keyward-core -- --ignored

use chrono::{Duration, Utc};
use keyward_core::{
    Database, DatabaseConfig, NewUser, PgDatabase, RefreshToken, Role, StoreError,
};
use uuid::Uuid;

async fn connect() -> PgDatabase {
    let mut config = DatabaseConfig::default();
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.postgres_url = url;
    }
    let db = PgDatabase::connect(&config).await.expect("connect");
    db.migrate().await.expect("migrate");
    db
}

fn unique_email() -> String {
    format!("pg-{}@example.com", Uuid::new_v4())
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        password_hash: "$argon2id$v=19$placeholder".to_string(),
        first_name: "Pg".to_string(),
        last_name: "Tester".to_string(),
        role: Role::User,
        enabled: true,
        created_at: Utc::now(),
    }
}

fn token_for(user_id: Uuid, value: &str) -> RefreshToken {
    let now = Utc::now();
    RefreshToken {
        id: Uuid::new_v4(),
        token: value.to_string(),
        user_id,
        issued_at: now,
        expires_at: now + Duration::days(1),
        revoked: false,
    }
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_user_and_token_roundtrip() {
    let db = connect().await;
    let email = unique_email();
    let value = Uuid::new_v4().to_string();

    let mut tx = db.begin().await.unwrap();
    let user = tx.save_user(new_user(&email)).await.unwrap();
    tx.save_token(&token_for(user.id, &value)).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = db.begin().await.unwrap();
    let found = tx.find_by_email(&email).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.role, Role::User);
    let token = tx.find_by_token(&value).await.unwrap().unwrap();
    assert_eq!(token.user_id, user.id);
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_duplicate_token_keeps_transaction_usable() {
    let db = connect().await;
    let value = Uuid::new_v4().to_string();

    let mut tx = db.begin().await.unwrap();
    let user = tx.save_user(new_user(&unique_email())).await.unwrap();
    tx.save_token(&token_for(user.id, &value)).await.unwrap();

    let err = tx.save_token(&token_for(user.id, &value)).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateToken));

    // the savepoint rollback leaves the outer transaction intact
    let retry = Uuid::new_v4().to_string();
    tx.save_token(&token_for(user.id, &retry)).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = db.begin().await.unwrap();
    assert!(tx.find_by_token(&retry).await.unwrap().is_some());
    assert_eq!(tx.delete_all_for(user.id).await.unwrap(), 2);
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_uncommitted_changes_are_discarded() {
    let db = connect().await;
    let email = unique_email();

    {
        let mut tx = db.begin().await.unwrap();
        tx.save_user(new_user(&email)).await.unwrap();
    }

    let mut tx = db.begin().await.unwrap();
    assert!(!tx.exists_by_email(&email).await.unwrap());
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_duplicate_email_rejected() {
    let db = connect().await;
    let email = unique_email();

    let mut tx = db.begin().await.unwrap();
    tx.save_user(new_user(&email)).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = db.begin().await.unwrap();
    let err = tx.save_user(new_user(&email)).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateEmail));
}
