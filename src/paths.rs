//! Config-file location.
//!
//! Resolution order: an explicit `--config` path wins; a `config.yaml` in
//! the working directory supports `cargo run` development; otherwise the
//! platform config directory (`~/.config/faderdeck` or `%APPDATA%`
//! equivalent) is used and created on demand.

use std::path::PathBuf;

/// Directory name under the platform config dir.
const APP_NAME: &str = "faderdeck";

/// Resolve the configuration file path.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    let cwd_config = PathBuf::from("config.yaml");
    if cwd_config.exists() {
        return cwd_config;
    }

    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    let dir = base.join(APP_NAME);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("[paths] Could not create {}: {}", dir.display(), e);
        return cwd_config;
    }
    dir.join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let path = config_path(Some("/tmp/custom.yaml"));
        assert_eq!(path, PathBuf::from("/tmp/custom.yaml"));
    }
}
