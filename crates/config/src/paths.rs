//! Path utilities

use std::path::{Path, PathBuf};

/// Home directory, or the working directory when none is known
fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Data directory (~/.reagent)
pub fn data_dir() -> PathBuf {
    home().join(".reagent")
}

/// Configuration file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Default conversation storage
pub fn conversations_dir() -> PathBuf {
    data_dir().join("conversations")
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        return home().join(rest);
    }
    if path == "~" {
        return home();
    }
    PathBuf::from(path)
}

/// Ensure directory exists
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/var/data"), PathBuf::from("/var/data"));
        assert_eq!(expand_home("relative/dir"), PathBuf::from("relative/dir"));
        assert!(expand_home("~/x").ends_with("x"));
        assert!(!expand_home("~/x").starts_with("~"));
        assert_eq!(expand_home("~"), home());
    }

    #[test]
    fn test_layout() {
        assert_eq!(config_path().parent(), Some(data_dir().as_path()));
        assert!(conversations_dir().starts_with(data_dir()));
    }
}
