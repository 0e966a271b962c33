//! Runtime configuration: defaults, then an optional TOML file, then
//! `DATAMONEY_*` environment variables. CLI flags are applied last by the
//! binaries.

use crate::period::WeekPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite stream database
    pub db_path: PathBuf,
    /// Weekly layout used for both sides of a comparison
    pub week_policy: WeekPolicy,
    /// Listen address for the API server
    pub bind_addr: String,
    /// Months of history kept by `make-demo`
    pub demo_months: u32,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_path: PathBuf::from("datamoney_demo.db"),
            week_policy: WeekPolicy::default(),
            bind_addr: "0.0.0.0:3000".to_string(),
            demo_months: 12,
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse configuration TOML")
    }

    /// Load `path` if given, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml_str(&text)?
            }
            None => AppConfig::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`.
    ///
    /// # Environment Variables
    /// - `DATAMONEY_DB`: database path
    /// - `DATAMONEY_WEEK_POLICY`: `calendar` | `trailing`
    /// - `DATAMONEY_BIND`: server listen address
    /// - `DATAMONEY_DEMO_MONTHS`: months kept by `make-demo`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("DATAMONEY_DB") {
            self.db_path = PathBuf::from(db);
        }
        if let Some(policy) = lookup("DATAMONEY_WEEK_POLICY") {
            self.week_policy = policy.parse::<WeekPolicy>().context("DATAMONEY_WEEK_POLICY")?;
        }
        if let Some(bind) = lookup("DATAMONEY_BIND") {
            self.bind_addr = bind;
        }
        if let Some(months) = lookup("DATAMONEY_DEMO_MONTHS") {
            self.demo_months = months
                .trim()
                .parse()
                .context("DATAMONEY_DEMO_MONTHS must be a whole number")?;
        }
        Ok(())
    }
}

/// Install the global tracing subscriber, writing to stderr.
/// `RUST_LOG` wins over `default_filter`.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            db_path = "/data/datamoney.db"
            week_policy = "trailing-7-days"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/data/datamoney.db"));
        assert_eq!(config.week_policy, WeekPolicy::Trailing7Days);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.demo_months, 12);
    }

    #[test]
    fn test_unknown_week_policy_in_toml_fails() {
        assert!(AppConfig::from_toml_str("week_policy = \"biweekly\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATAMONEY_DB", "other.db"),
            ("DATAMONEY_WEEK_POLICY", "trailing"),
            ("DATAMONEY_DEMO_MONTHS", " 6 "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.db_path, PathBuf::from("other.db"));
        assert_eq!(config.week_policy, WeekPolicy::Trailing7Days);
        assert_eq!(config.demo_months, 6);
        assert_eq!(config.bind_addr, AppConfig::default().bind_addr);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "DATAMONEY_DEMO_MONTHS").then(|| "a dozen".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datamoney.toml");
        std::fs::write(&path, "bind_addr = \"127.0.0.1:8080\"\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        if std::env::var("DATAMONEY_BIND").is_err() {
            assert_eq!(config.bind_addr, "127.0.0.1:8080");
        }
        assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
