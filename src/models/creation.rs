use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::models::kv::{self, Kv};
use crate::models::settings::Setting;

/// Locally cached pointer to a previously generated portrait. Feeds the
/// "my creations" gallery; upstream preview URLs expire after a day, so
/// stale rows are filtered out on read.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Creation {
    pub id: i64,
    pub image_id: String,
    pub preview_url: String,
    pub purchased: bool,
    pub created_at: NaiveDateTime,
}

impl Creation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Creation {
            id: row.get("id")?,
            image_id: row.get("image_id")?,
            preview_url: row.get("preview_url")?,
            purchased: row.get::<_, i64>("purchased")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    /// Insert a new entry and prune the log down to the configured maximum,
    /// oldest first. Also refreshes the last-creation pointer.
    pub fn record(pool: &DbPool, image_id: &str, preview_url: &str) -> Result<i64, String> {
        let max = Setting::get_i64_or(pool, "creations_max_entries", 10);
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO creations (image_id, preview_url) VALUES (?1, ?2)",
            params![image_id, preview_url],
        )
        .map_err(|e| e.to_string())?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "DELETE FROM creations WHERE id NOT IN
             (SELECT id FROM creations ORDER BY created_at DESC, id DESC LIMIT ?1)",
            params![max],
        )
        .map_err(|e| e.to_string())?;
        Kv::set(pool, kv::LAST_CREATION, image_id)?;
        Ok(id)
    }

    /// Entries still within the freshness window, newest first.
    pub fn list_valid(pool: &DbPool) -> Vec<Self> {
        let ttl = Setting::get_i64_or(pool, "creations_ttl_hours", 24);
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT * FROM creations
             WHERE created_at >= datetime('now', ?1)
             ORDER BY created_at DESC, id DESC",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![format!("-{} hours", ttl)], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn find_by_image_id(pool: &DbPool, image_id: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM creations WHERE image_id = ?1",
            params![image_id],
            Self::from_row,
        )
        .ok()
    }

    pub fn mark_purchased(pool: &DbPool, image_id: &str) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE creations SET purchased = 1 WHERE image_id = ?1",
            params![image_id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn count(pool: &DbPool) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row("SELECT COUNT(*) FROM creations", [], |row| row.get(0))
            .unwrap_or(0)
    }

    /// Image id of the most recent creation, for the resume affordance.
    pub fn last_pointer(pool: &DbPool) -> Option<String> {
        Kv::get(pool, kv::LAST_CREATION)
    }
}
