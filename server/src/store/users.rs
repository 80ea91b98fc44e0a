use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use super::StoreError;
use crate::db::models::User;
use crate::db::DbPool;

const CODE_LENGTH: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CODE_ATTEMPTS: usize = 10;

/// Generate a 6-character uppercase alphanumeric pairing code.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..CODE_CHARSET.len());
            CODE_CHARSET[idx] as char
        })
        .collect()
}

/// Create an anonymous user with a fresh unique pairing code.
pub fn create_user(db: &DbPool) -> Result<User, StoreError> {
    let conn = db.lock().map_err(|_| StoreError::Lock)?;

    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_code();
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE code = ?1)",
            [&code],
            |row| row.get(0),
        )?;
        if taken {
            continue;
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            code,
            created_at: Utc::now().to_rfc3339(),
        };
        conn.execute(
            "INSERT INTO users (id, code, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![user.id, user.code, user.created_at],
        )?;
        return Ok(user);
    }

    Err(StoreError::Conflict("failed to generate a unique code"))
}
