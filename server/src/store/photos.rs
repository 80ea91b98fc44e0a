use super::StoreError;
use crate::db::models::Photo;
use crate::db::DbPool;

pub fn create_photo(db: &DbPool, photo: &Photo) -> Result<(), StoreError> {
    let conn = db.lock().map_err(|_| StoreError::Lock)?;
    conn.execute(
        "INSERT INTO photos (id, pair_id, user_id, s3_url, taken_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            photo.id,
            photo.pair_id,
            photo.user_id,
            photo.s3_url,
            photo.taken_at,
            photo.created_at,
        ],
    )?;
    Ok(())
}

/// Set the final object URL of a photo uploaded by `user_id`.
pub fn update_url(db: &DbPool, user_id: &str, photo_id: &str, url: &str) -> Result<(), StoreError> {
    let conn = db.lock().map_err(|_| StoreError::Lock)?;
    let updated = conn.execute(
        "UPDATE photos SET s3_url = ?1 WHERE id = ?2 AND user_id = ?3",
        rusqlite::params![url, photo_id, user_id],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound("photo not found"));
    }
    Ok(())
}

/// Page through a pair's photos, newest first. Returns the page and the total count.
pub fn list_for_pair(
    db: &DbPool,
    pair_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Photo>, i64), StoreError> {
    let conn = db.lock().map_err(|_| StoreError::Lock)?;

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM photos WHERE pair_id = ?1",
        [pair_id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, pair_id, user_id, s3_url, taken_at, created_at FROM photos
         WHERE pair_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
    )?;
    let photos = stmt
        .query_map(rusqlite::params![pair_id, limit, offset], |row| {
            Ok(Photo {
                id: row.get(0)?,
                pair_id: row.get(1)?,
                user_id: row.get(2)?,
                s3_url: row.get(3)?,
                taken_at: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((photos, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use crate::store::pairs::create_pair;
    use crate::store::users::create_user;

    fn photo(id: &str, pair_id: &str, user_id: &str, created_at: &str) -> Photo {
        Photo {
            id: id.to_string(),
            pair_id: pair_id.to_string(),
            user_id: user_id.to_string(),
            s3_url: format!("https://bucket.example/{}/{}.jpg", pair_id, id),
            taken_at: created_at.to_string(),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_update_url_scoped_to_uploader() {
        let db = init_memory_db().unwrap();
        let alice = create_user(&db).unwrap();
        let bob = create_user(&db).unwrap();
        let pair = create_pair(&db, &alice.id, &bob.code).unwrap();
        create_photo(&db, &photo("ph1", &pair.id, &alice.id, "2024-01-15T10:40:00Z")).unwrap();

        assert!(matches!(
            update_url(&db, &bob.id, "ph1", "https://cdn/x.jpg"),
            Err(StoreError::NotFound(_))
        ));
        update_url(&db, &alice.id, "ph1", "https://cdn/x.jpg").unwrap();

        let (photos, total) = list_for_pair(&db, &pair.id, 10, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(photos[0].s3_url, "https://cdn/x.jpg");
    }

    #[test]
    fn test_list_for_pair_pages_newest_first() {
        let db = init_memory_db().unwrap();
        let alice = create_user(&db).unwrap();
        let bob = create_user(&db).unwrap();
        let pair = create_pair(&db, &alice.id, &bob.code).unwrap();
        create_photo(&db, &photo("old", &pair.id, &alice.id, "2024-01-01T00:00:00Z")).unwrap();
        create_photo(&db, &photo("mid", &pair.id, &bob.id, "2024-01-02T00:00:00Z")).unwrap();
        create_photo(&db, &photo("new", &pair.id, &alice.id, "2024-01-03T00:00:00Z")).unwrap();

        let (page, total) = list_for_pair(&db, &pair.id, 2, 0).unwrap();
        assert_eq!(total, 3);
        let ids: Vec<_> = page.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);

        let (page, _) = list_for_pair(&db, &pair.id, 2, 2).unwrap();
        assert_eq!(page[0].id, "old");
    }
}
