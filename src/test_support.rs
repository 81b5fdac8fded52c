//! Fixtures shared by the unit tests.

use std::{path::PathBuf, str::FromStr};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::{auth::TokenKeys, db, AppState};

pub const TEST_SECRET: &str = "test-signing-secret";

/// A private in-memory database, migrated and seeded with the default
/// administrator. The pool is pinned to a single connection that never
/// expires, since every new in-memory connection would be a fresh database.
pub async fn test_pool() -> SqlitePool {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(opts)
        .await
        .expect("in-memory pool");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    db::seed_admin(&pool).await.expect("seed admin");
    pool
}

pub fn test_keys() -> TokenKeys {
    TokenKeys::new(TEST_SECRET, None)
}

pub async fn test_state() -> AppState {
    AppState {
        db_pool: test_pool().await,
        tokens: test_keys(),
        static_dir: PathBuf::from("target/no-static-dir"),
    }
}
