use std::ffi::OsString;
use std::path::{Path, PathBuf};

const DATA_DIR_ENV: &str = "TORERO_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "/home/admin/data";
const DATABASE_FILE: &str = "torero_ui.db";
const CONFIG_FILE: &str = "torero_ui.json";

pub const DEFAULT_TORERO_PATH: &str = "/usr/local/bin/torero";
const ORIGINAL_SUFFIX: &str = ".orig";
const INSTALL_MARKER: &str = ".torero-capture-installed";

/// Base directory for the database, config file and `@`-relative paths.
pub fn data_dir() -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_DATA_DIR),
    }
}

pub fn default_database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Resolves `@`-notation against the data directory; other paths are kept as given.
pub fn resolve_data_path(data_dir: &Path, path: &str) -> PathBuf {
    match path.strip_prefix('@') {
        Some(relative) => data_dir.join(relative.trim_start_matches('/')),
        None => PathBuf::from(path),
    }
}

/// Where the real binary is kept once the wrapper replaces `target`.
pub fn original_binary_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("torero"));
    name.push(ORIGINAL_SUFFIX);
    target.with_file_name(name)
}

pub fn install_marker_for(target: &Path) -> PathBuf {
    target.with_file_name(INSTALL_MARKER)
}

pub fn default_real_binary() -> PathBuf {
    original_binary_for(Path::new(DEFAULT_TORERO_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_paths_resolve_under_data_dir() {
        let base = Path::new("/srv/data");
        assert_eq!(
            resolve_data_path(base, "@inputs/vpc.yaml"),
            PathBuf::from("/srv/data/inputs/vpc.yaml")
        );
        assert_eq!(
            resolve_data_path(base, "/etc/vars.json"),
            PathBuf::from("/etc/vars.json")
        );
    }

    #[test]
    fn install_locations_sit_next_to_target() {
        let target = Path::new("/usr/local/bin/torero");
        assert_eq!(
            original_binary_for(target),
            PathBuf::from("/usr/local/bin/torero.orig")
        );
        assert_eq!(
            install_marker_for(target),
            PathBuf::from("/usr/local/bin/.torero-capture-installed")
        );
    }
}
