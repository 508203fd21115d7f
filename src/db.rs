use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn init_pool() -> Result<DbPool, Box<dyn std::error::Error>> {
    let manager = SqliteConnectionManager::file("studio/db/engine.db");
    let pool = Pool::builder().max_size(10).build(manager)?;

    // Enable WAL mode for better concurrent read performance
    let conn = pool.get()?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        -- Engine settings (endpoints, tier sizes, quality factors, flags)
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Whole-record client storage: entitlement blob, pending image,
        -- last-creation and last-session pointers
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Locally cached pointers to generated portraits (gallery log)
        CREATE TABLE IF NOT EXISTS creations (
            id INTEGER PRIMARY KEY,
            image_id TEXT NOT NULL,
            preview_url TEXT NOT NULL,
            purchased INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_creations_created ON creations(created_at);
        ",
    )?;

    Ok(())
}

pub fn seed_defaults(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    let defaults: Vec<(&str, &str)> = vec![
        // Collaborator endpoints
        ("api_base_url", "https://api.furever.studio"),
        ("api_timeout_secs", "120"),
        ("api_session_timeout_secs", "15"),
        // Entitlement tiers
        ("ledger_free_tier", "3"),
        ("ledger_purchase_bonus", "2"),
        ("ledger_bonus_clicks_enabled", "true"),
        ("ledger_bonus_click_threshold", "6"),
        ("ledger_bonus_increment", "3"),
        ("ledger_bonus_cap", "12"),
        // Generation flow
        ("flow_email_before_generation", "false"),
        ("flow_result_window_mins", "15"),
        ("flow_phrase_rotation_secs", "5"),
        ("flow_phrase_fade_secs", "1"),
        // Upload pipeline
        ("upload_max_dimension", "2048"),
        ("upload_jpeg_quality", "82"),
        ("upload_passthrough_bytes", "3500000"),
        ("upload_max_bytes", "20971520"),
        ("upload_allowed_types", "jpg,jpeg,png,gif,bmp,webp"),
        // Tribute compositor
        ("tribute_name_font", "studio/assets/fonts/tribute-serif-bold.ttf"),
        ("tribute_quote_font", "studio/assets/fonts/tribute-serif-italic.ttf"),
        ("tribute_renders_path", "studio/renders/"),
        // Gallery log
        ("creations_max_entries", "10"),
        ("creations_ttl_hours", "24"),
        // Session broker
        ("broker_freshness_mins", "60"),
    ];

    for (key, value) in defaults {
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }

    Ok(())
}
