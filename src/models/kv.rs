use rusqlite::params;

use crate::db::DbPool;

/// Whole-record client storage. Each key holds one serialized record that is
/// always replaced wholesale (no partial field updates) so old and new
/// schema versions never interleave inside a single blob.
pub struct Kv;

pub const ENTITLEMENT: &str = "entitlement";
pub const PENDING_IMAGE: &str = "pending_image";
pub const LAST_CREATION: &str = "last_creation";
pub const LAST_SESSION_EMAIL: &str = "last_session_email";

impl Kv {
    pub fn get(pool: &DbPool, key: &str) -> Option<String> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .ok()
    }

    pub fn set(pool: &DbPool, key: &str, value: &str) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = CURRENT_TIMESTAMP",
            params![key, value],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn delete(pool: &DbPool, key: &str) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
