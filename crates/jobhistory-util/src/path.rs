//! Path utilities.
//!
//! Locations of the jobhistory configuration and data directories, plus the
//! component check used wherever a caller-supplied name becomes a path.

use std::path::PathBuf;

/// Get the jobhistory configuration directory.
///
/// This follows XDG conventions on Linux/macOS:
/// - `$XDG_CONFIG_HOME/jobhistory` if set
/// - `~/.config/jobhistory` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("jobhistory"))
}

/// Get the jobhistory data directory.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("jobhistory"))
}

/// Default location of the history root when none is configured.
pub fn default_history_root() -> PathBuf {
    data_dir()
        .map(|p| p.join("config-history"))
        .unwrap_or_else(|| PathBuf::from("config-history"))
}

/// Check that a single name can be used as one path component.
///
/// Rejects empty names, `.`/`..`, and anything containing a separator, so a
/// joined path can never escape its base directory.
pub fn is_safe_component(component: &str) -> bool {
    !(component.is_empty()
        || component == "."
        || component == ".."
        || component.contains('/')
        || component.contains('\\')
        || component.contains('\0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        let dir = config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("jobhistory"));
    }

    #[test]
    fn test_default_history_root() {
        assert!(default_history_root().ends_with("config-history"));
    }

    #[test]
    fn test_is_safe_component() {
        assert!(is_safe_component("Test1"));
        assert!(is_safe_component("my job.v2"));
        assert!(!is_safe_component(""));
        assert!(!is_safe_component(".."));
        assert!(!is_safe_component("."));
        assert!(!is_safe_component("a/b"));
        assert!(!is_safe_component("a\\b"));
    }
}
