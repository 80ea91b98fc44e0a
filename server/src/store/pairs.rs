use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use super::StoreError;
use crate::db::models::Pair;
use crate::db::DbPool;

fn read_pair(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pair> {
    Ok(Pair {
        id: row.get(0)?,
        user_a_id: row.get(1)?,
        user_b_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn pair_for_user(conn: &Connection, user_id: &str) -> Result<Option<Pair>, StoreError> {
    let pair = conn
        .query_row(
            "SELECT id, user_a_id, user_b_id, created_at FROM pairs
             WHERE user_a_id = ?1 OR user_b_id = ?1 LIMIT 1",
            [user_id],
            read_pair,
        )
        .optional()?;
    Ok(pair)
}

/// Pair `user_id` with the owner of `partner_code`.
///
/// The membership checks and the insert run in one transaction so two
/// concurrent requests cannot both pair the same user.
pub fn create_pair(db: &DbPool, user_id: &str, partner_code: &str) -> Result<Pair, StoreError> {
    let mut conn = db.lock().map_err(|_| StoreError::Lock)?;
    let tx = conn.transaction()?;

    let partner_id: String = tx
        .query_row("SELECT id FROM users WHERE code = ?1", [partner_code], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or(StoreError::NotFound("partner not found"))?;

    if partner_id == user_id {
        return Err(StoreError::Conflict("cannot create pair with yourself"));
    }
    if pair_for_user(&tx, user_id)?.is_some() {
        return Err(StoreError::Conflict("user is already in a pair"));
    }
    if pair_for_user(&tx, &partner_id)?.is_some() {
        return Err(StoreError::Conflict("partner is already in a pair"));
    }

    let (user_a_id, user_b_id) = if user_id < partner_id.as_str() {
        (user_id.to_string(), partner_id)
    } else {
        (partner_id, user_id.to_string())
    };

    let pair = Pair {
        id: Uuid::new_v4().to_string(),
        user_a_id,
        user_b_id,
        created_at: Utc::now().to_rfc3339(),
    };
    tx.execute(
        "INSERT INTO pairs (id, user_a_id, user_b_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![pair.id, pair.user_a_id, pair.user_b_id, pair.created_at],
    )?;
    tx.commit()?;

    Ok(pair)
}

pub fn get_by_user(db: &DbPool, user_id: &str) -> Result<Option<Pair>, StoreError> {
    let conn = db.lock().map_err(|_| StoreError::Lock)?;
    pair_for_user(&conn, user_id)
}

/// Dissolve a pair on behalf of one of its members. Returns the deleted pair.
pub fn delete_pair(db: &DbPool, pair_id: &str, user_id: &str) -> Result<Pair, StoreError> {
    let conn = db.lock().map_err(|_| StoreError::Lock)?;

    let pair = conn
        .query_row(
            "SELECT id, user_a_id, user_b_id, created_at FROM pairs WHERE id = ?1",
            [pair_id],
            read_pair,
        )
        .optional()?
        .ok_or(StoreError::NotFound("pair not found"))?;

    if !pair.has_member(user_id) {
        return Err(StoreError::Forbidden("user is not a member of this pair"));
    }

    let deleted = conn.execute("DELETE FROM pairs WHERE id = ?1", [pair_id])?;
    if deleted == 0 {
        return Err(StoreError::NotFound("pair not found"));
    }

    Ok(pair)
}
