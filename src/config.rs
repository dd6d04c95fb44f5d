//! Optional TOML configuration file.
//!
//! Every field is optional; command-line flags take precedence and built-in
//! defaults fill whatever neither provides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub application: Option<String>,
    /// Program file sent along with every query.
    pub src: Option<PathBuf>,
    pub iconify_previous: Option<bool>,
    pub max_answers: Option<usize>,
    pub chunk: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub log_file: Option<PathBuf>,
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pengine-runners").join("config.toml"))
}

/// Load `explicit`, or the default location if it exists. A missing explicit
/// file is an error; a missing default file is not.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(FileConfig::default()),
        },
    };
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let cfg: FileConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded configuration");
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_all_fields() {
        let cfg: FileConfig = toml::from_str(
            r#"
            server = "https://swish.example.org"
            application = "swish"
            src = "family.pl"
            iconify_previous = false
            max_answers = 3
            chunk = 2
            timeout = "45s"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.as_deref(), Some("https://swish.example.org"));
        assert_eq!(cfg.iconify_previous, Some(false));
        assert_eq!(cfg.max_answers, Some(3));
        assert_eq!(cfg.timeout, Some(Duration::from_secs(45)));
        assert_eq!(cfg.log_file, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = \"red\"").is_err());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "application = \"example\"").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.application.as_deref(), Some("example"));
    }

    #[test]
    fn missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
