use log::{error, info, warn};
use std::fs;
use std::path::Path;
use std::process;

/// Required directories that will be created if missing
const REQUIRED_DIRS: &[&str] = &[
    "studio",
    "studio/db",
    "studio/renders",
    "studio/assets",
    "studio/assets/fonts",
];

/// Tribute fonts — the compositor falls back to plain images without them
const TRIBUTE_FONTS: &[&str] = &[
    "studio/assets/fonts/tribute-serif-bold.ttf",
    "studio/assets/fonts/tribute-serif-italic.ttf",
];

/// Run all boot checks. Call this before the engine is constructed.
/// Creates missing directories, warns about missing fonts, and aborts if
/// the data root cannot be made usable.
pub fn run() {
    info!("Furever engine boot check starting...");

    let mut warnings = 0u32;
    let mut errors = 0u32;

    // ── 1. Directories ─────────────────────────────────
    for dir in REQUIRED_DIRS {
        let path = Path::new(dir);
        if !path.exists() {
            match fs::create_dir_all(path) {
                Ok(_) => info!("  Created directory: {}", dir),
                Err(e) => {
                    error!("  FAILED to create directory {}: {}", dir, e);
                    errors += 1;
                }
            }
        }
    }

    // ── 2. Tribute fonts ───────────────────────────────
    for file in TRIBUTE_FONTS {
        if !Path::new(file).exists() {
            warn!(
                "  Missing tribute font: {} (memorial portraits will skip the text overlay)",
                file
            );
            warnings += 1;
        }
    }

    // ── 3. Database directory writable ─────────────────
    let db_dir = Path::new("studio/db");
    if db_dir.exists() {
        let test_file = db_dir.join(".write_test");
        match fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                error!("  Database directory not writable: {}", e);
                errors += 1;
            }
        }
    }

    // ── 4. Renders directory writable ──────────────────
    let renders_dir = Path::new("studio/renders");
    if renders_dir.exists() {
        let test_file = renders_dir.join(".write_test");
        match fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                warn!(
                    "  Renders directory not writable: {} (tribute renders won't be cached)",
                    e
                );
                warnings += 1;
            }
        }
    }

    // ── Summary ────────────────────────────────────────
    if errors > 0 {
        error!(
            "Boot check FAILED: {} error(s), {} warning(s). Aborting.",
            errors, warnings
        );
        process::exit(1);
    }

    if warnings > 0 {
        warn!(
            "Boot check passed with {} warning(s). Some features may not work correctly.",
            warnings
        );
    } else {
        info!("Boot check passed. All systems go.");
    }
}
