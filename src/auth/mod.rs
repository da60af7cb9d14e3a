pub mod session;

use rusqlite::{params, OptionalExtension};

use crate::error::{AppError, AppResult};
use crate::state::DbPool;

/// Create a user with a bcrypt-hashed password. Returns the new user id.
pub fn create_user(pool: &DbPool, username: &str, password: &str) -> AppResult<String> {
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))?;

    let conn = pool.get()?;
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, username, password_hash) VALUES (?1, ?2, ?3)",
        params![id, username, hash],
    )?;
    Ok(id)
}

/// Check a username/password pair. Returns the user id on success,
/// None on unknown user or bad password.
pub fn verify_credentials(
    pool: &DbPool,
    username: &str,
    password: &str,
) -> AppResult<Option<String>> {
    let conn = pool.get()?;
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?1",
            params![username],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, hash)) = row else {
        return Ok(None);
    };

    let ok = bcrypt::verify(password, &hash)
        .map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))?;
    Ok(ok.then_some(id))
}
