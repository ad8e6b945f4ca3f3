use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub database: Database,
    pub collection: CollectionSource,
    #[serde(default)]
    pub status: StatusConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        toml::from_str(&contents).with_context(|| "failed to parse config TOML")
    }

    /// Directory for progress-status files: the explicit override if set,
    /// otherwise next to the database file, otherwise the current directory.
    pub fn status_dir(&self) -> PathBuf {
        if let Some(dir) = &self.status.dir {
            return dir.clone();
        }
        self.database
            .path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    #[serde(default)]
    pub in_memory: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CollectionSource {
    /// The collection root: the top-level directory of the audio library.
    pub root: PathBuf,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub ignored_dirs: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StatusConfig {
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_config_toml() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
in_memory = true

[collection]
root = "/home/user/Music"
follow_symlinks = true
ignored_dirs = ["/home/user/Music/samples"]
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(cfg.version, 1);
        assert!(cfg.database.in_memory);
        assert_eq!(cfg.collection.root, PathBuf::from("/home/user/Music"));
        assert!(cfg.collection.follow_symlinks);
        assert_eq!(
            cfg.collection.ignored_dirs,
            vec![PathBuf::from("/home/user/Music/samples")]
        );

        Ok(())
    }

    #[test]
    fn test_parse_file_database_config() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
in_memory = false
path = "/tmp/tunedex.db"

[collection]
root = "/home/user/Music"
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert!(!cfg.database.in_memory);
        assert_eq!(cfg.database.path, Some(PathBuf::from("/tmp/tunedex.db")));
        assert!(!cfg.collection.follow_symlinks);

        Ok(())
    }

    #[test]
    fn status_dir_defaults_next_to_database() {
        let cfg: Config = toml::from_str(
            r#"
version = 1

[database]
path = "/var/lib/tunedex/index.db"

[collection]
root = "/music"
"#,
        )
        .unwrap();

        assert_eq!(cfg.status_dir(), PathBuf::from("/var/lib/tunedex"));
    }

    #[test]
    fn status_dir_override_wins() {
        let cfg: Config = toml::from_str(
            r#"
version = 1

[database]
path = "/var/lib/tunedex/index.db"

[collection]
root = "/music"

[status]
dir = "/run/tunedex"
"#,
        )
        .unwrap();

        assert_eq!(cfg.status_dir(), PathBuf::from("/run/tunedex"));
    }
}
