use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "universe.yaml";
pub const APPS_DIR: &str = "apps";
pub const DEFINITION_FILE: &str = "definition.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn apps_dir(root: &Path) -> PathBuf {
    root.join(APPS_DIR)
}

/// "AutoBooker Calendar" -> "autobooker_calendar"
pub fn app_dir_name(app_name: &str) -> String {
    app_name.trim().to_lowercase().replace(' ', "_")
}

pub fn definition_path(apps_dir: &Path, app_name: &str) -> PathBuf {
    apps_dir.join(app_dir_name(app_name)).join(DEFINITION_FILE)
}
