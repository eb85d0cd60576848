use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub backup_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub pg_dump_bin: PathBuf,
    pub psql_bin: PathBuf,
    /// `None` lets a tool run for as long as it likes.
    pub tool_timeout: Option<Duration>,
    /// Number of newest archives to keep; `None` keeps all of them.
    pub archive_retention: Option<usize>,
    pub backup_schedule: Option<String>,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .context("DATABASE_URL is not set")?;

        let port = match lookup("PORT") {
            Some(v) => v
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT: {v}"))?,
            None => DEFAULT_PORT,
        };

        let tool_timeout_secs = match lookup("TOOL_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("Invalid TOOL_TIMEOUT_SECS: {v}"))?,
            None => DEFAULT_TOOL_TIMEOUT_SECS,
        };

        let archive_retention = match lookup("ARCHIVE_RETENTION") {
            Some(v) => Some(
                v.parse::<usize>()
                    .with_context(|| format!("Invalid ARCHIVE_RETENTION: {v}"))?,
            ),
            None => None,
        };

        Ok(Self {
            port,
            database_url,
            backup_dir: PathBuf::from(lookup("BACKUP_DIR").unwrap_or_else(|| "./backups".into())),
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("backup-util-uploads")),
            pg_dump_bin: PathBuf::from(lookup("PG_DUMP_BIN").unwrap_or_else(|| "pg_dump".into())),
            psql_bin: PathBuf::from(lookup("PSQL_BIN").unwrap_or_else(|| "psql".into())),
            tool_timeout: (tool_timeout_secs > 0).then(|| Duration::from_secs(tool_timeout_secs)),
            archive_retention: archive_retention.filter(|n| *n > 0),
            backup_schedule: lookup("BACKUP_SCHEDULE").filter(|v| !v.trim().is_empty()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_database_url_fails() {
        let result = AppConfig::from_lookup(lookup_from(&[("PORT", "8080")]));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_blank_database_url_fails() {
        assert!(AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "  ")])).is_err());
    }

    #[test]
    fn test_defaults() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/app")]))
                .unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.backup_dir, PathBuf::from("./backups"));
        assert_eq!(config.pg_dump_bin, PathBuf::from("pg_dump"));
        assert_eq!(config.psql_bin, PathBuf::from("psql"));
        assert_eq!(config.tool_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(config.archive_retention, None);
        assert_eq!(config.backup_schedule, None);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("PORT", "9000"),
            ("BACKUP_DIR", "/srv/backups"),
            ("TOOL_TIMEOUT_SECS", "0"),
            ("ARCHIVE_RETENTION", "5"),
            ("BACKUP_SCHEDULE", "0 0 3 * * *"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.backup_dir, PathBuf::from("/srv/backups"));
        assert_eq!(config.tool_timeout, None);
        assert_eq!(config.archive_retention, Some(5));
        assert_eq!(config.backup_schedule.as_deref(), Some("0 0 3 * * *"));
    }

    #[test]
    fn test_zero_retention_keeps_everything() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("ARCHIVE_RETENTION", "0"),
        ]))
        .unwrap();
        assert_eq!(config.archive_retention, None);
    }

    #[test]
    fn test_invalid_timeout_fails() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("TOOL_TIMEOUT_SECS", "soon"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_port_fails() {
        for port in ["abc", "70000", "-1"] {
            let result = AppConfig::from_lookup(lookup_from(&[
                ("DATABASE_URL", "postgres://localhost/app"),
                ("PORT", port),
            ]));
            let err = result.unwrap_err().to_string();
            assert!(err.contains("PORT"), "{port}: {err}");
        }
    }
}
