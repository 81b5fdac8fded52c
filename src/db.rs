use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use crate::{
    errors::AppError,
    structs::{Admin, Stats, User, UserSummary},
    utils::{burn_dummy_verification, hash_password, verify_password},
};

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@casamanager.com";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Tables holding per-user rows, in erasure order.
const OWNED_TABLES: [&str; 4] = ["expenses", "documents", "notes", "checklist"];

pub fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .read_only(false)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new().connect_with(opts).await?;
    sqlx::migrate!().run(&pool).await?;
    log::info!("Database migrated successfully");
    Ok(pool)
}

pub async fn create_user(pool: &SqlitePool, username: &str, password: &str) -> Result<User, AppError> {
    let pwd_hash = hash_password(password)?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, pwd_hash, created_at) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(username)
    .bind(pwd_hash)
    .bind(timestamp())
    .fetch_one(pool)
    .await
    .map_err(|e| match e.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            AppError::Conflict("username already exists".to_owned())
        }
        _ => AppError::DatabaseError(e),
    })?;
    log::info!("User created: {} (id {})", user.username, user.id);
    Ok(user)
}

pub async fn get_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, AppError> {
    Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

async fn get_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>, AppError> {
    Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?)
}

async fn get_admin_by_username(pool: &SqlitePool, username: &str) -> Result<Option<Admin>, AppError> {
    Ok(sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?)
}

pub async fn get_admin_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Admin>, AppError> {
    Ok(sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Unknown usernames and wrong passwords both come back as the same
/// `Unauthorized` error.
pub async fn verify_user_credentials(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<User, AppError> {
    match get_user_by_username(pool, username).await? {
        Some(user) if verify_password(password, &user.pwd_hash)? => Ok(user),
        Some(_) => Err(AppError::unauthorized("invalid credentials")),
        None => {
            burn_dummy_verification(password);
            Err(AppError::unauthorized("invalid credentials"))
        }
    }
}

pub async fn verify_admin_credentials(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<Admin, AppError> {
    match get_admin_by_username(pool, username).await? {
        Some(admin) if verify_password(password, &admin.pwd_hash)? => Ok(admin),
        Some(_) => Err(AppError::unauthorized("invalid admin credentials")),
        None => {
            burn_dummy_verification(password);
            Err(AppError::unauthorized("invalid admin credentials"))
        }
    }
}

async fn set_user_password(pool: &SqlitePool, id: i64, password: &str) -> Result<bool, AppError> {
    let pwd_hash = hash_password(password)?;
    let affected = sqlx::query("UPDATE users SET pwd_hash = $1 WHERE id = $2")
        .bind(pwd_hash)
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

/// Self-service change: the current password must verify before anything is
/// written.
pub async fn change_user_password(
    pool: &SqlitePool,
    id: i64,
    current: &str,
    new: &str,
) -> Result<(), AppError> {
    let user = get_user_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    if !verify_password(current, &user.pwd_hash)? {
        log::warn!("Current password verification failed for user ID: {}", id);
        return Err(AppError::unauthorized("current password is incorrect"));
    }
    if !set_user_password(pool, id, new).await? {
        return Err(AppError::not_found("user not found"));
    }
    log::info!("Password changed for user {}", user.username);
    Ok(())
}

pub async fn change_admin_password(
    pool: &SqlitePool,
    id: i64,
    current: &str,
    new: &str,
) -> Result<(), AppError> {
    let admin = get_admin_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("admin not found"))?;
    if !verify_password(current, &admin.pwd_hash)? {
        log::warn!("Current password verification failed for admin ID: {}", id);
        return Err(AppError::unauthorized("current password is incorrect"));
    }
    sqlx::query("UPDATE admins SET pwd_hash = $1 WHERE id = $2")
        .bind(hash_password(new)?)
        .bind(id)
        .execute(pool)
        .await?;
    log::info!("Admin {} changed their password", admin.username);
    Ok(())
}

/// Administrative reset; the target's current password is not consulted.
pub async fn force_reset_password(
    pool: &SqlitePool,
    user_id: i64,
    new: &str,
) -> Result<(), AppError> {
    if !set_user_password(pool, user_id, new).await? {
        return Err(AppError::not_found("user not found"));
    }
    Ok(())
}

/// Creates the default administrator unless one already exists. Returns
/// whether a row was inserted.
pub async fn seed_admin(pool: &SqlitePool) -> Result<bool, AppError> {
    let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admins")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Ok(false);
    }
    sqlx::query("INSERT INTO admins (username, email, pwd_hash, created_at) VALUES ($1, $2, $3, $4)")
        .bind(DEFAULT_ADMIN_USERNAME)
        .bind(DEFAULT_ADMIN_EMAIL)
        .bind(hash_password(DEFAULT_ADMIN_PASSWORD)?)
        .bind(timestamp())
        .execute(pool)
        .await?;
    log::warn!(
        "Default admin account created ({}/{}); change its password",
        DEFAULT_ADMIN_USERNAME,
        DEFAULT_ADMIN_PASSWORD
    );
    Ok(true)
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<UserSummary>, AppError> {
    Ok(sqlx::query_as::<_, UserSummary>(
        "SELECT id, username, created_at FROM users ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?)
}

async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// All counts must succeed; they are not taken at a single instant.
pub async fn aggregate_stats(pool: &SqlitePool) -> Result<Stats, AppError> {
    let (total_users, total_expenses, total_documents, total_notes, total_checklist_items) = tokio::try_join!(
        count_rows(pool, "users"),
        count_rows(pool, "expenses"),
        count_rows(pool, "documents"),
        count_rows(pool, "notes"),
        count_rows(pool, "checklist"),
    )?;
    Ok(Stats {
        total_users,
        total_expenses,
        total_documents,
        total_notes,
        total_checklist_items,
    })
}

/// Removes a user and everything they own in one transaction. When the user
/// row does not exist the transaction is rolled back and nothing changes.
pub async fn erase_user(pool: &SqlitePool, user_id: i64) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let mut removed = Vec::with_capacity(OWNED_TABLES.len());
    for table in OWNED_TABLES {
        let affected = sqlx::query(&format!("DELETE FROM {table} WHERE user_id = $1"))
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        removed.push(format!("{table}={affected}"));
    }

    let affected = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if affected == 0 {
        tx.rollback().await?;
        return Err(AppError::not_found("user not found"));
    }

    tx.commit().await?;
    log::info!("User {} erased ({})", user_id, removed.join(", "));
    Ok(())
}
