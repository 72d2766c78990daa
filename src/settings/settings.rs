use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub ledger: Ledger,
    pub cache: Cache,
    pub http: Http,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: u64,
    pub grace_period_secs: u64,
    #[serde(default = "default_session_limit")]
    pub session_limit_per_user: u64,
}

#[derive(Debug, Deserialize)]
pub struct Ledger {
    pub backend: String, // "memory" or "mysql"
    #[serde(default)]
    pub dsn: String,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Cache {
    pub backend: String, // "memory" or "redis"
    #[serde(default)]
    pub dsn: String,
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub cert_path: String,
    pub key_path: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

fn default_session_limit() -> u64 {
    5
}

fn default_deadline_ms() -> u64 {
    2_000
}

fn default_cache_prefix() -> String {
    "auth".to_string()
}

fn default_purge_interval_secs() -> u64 {
    60
}

impl Settings {
    /// Rejects values the rotation engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        // concurrent refreshes of one token rely on the loser landing in grace
        if self.auth.grace_period_secs == 0 {
            return Err(anyhow!("auth.grace_period_secs must be at least 1"));
        }
        if self.auth.access_ttl_secs == 0 {
            return Err(anyhow!("auth.access_ttl_secs must be at least 1"));
        }
        if self.auth.session_limit_per_user == 0 {
            return Err(anyhow!("auth.session_limit_per_user must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;
    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const MINIMAL: &str = r#"
[auth]
issuer = "rotation.auth"
audience = "api-client"
access_ttl_secs = 3600
grace_period_secs = 30

[ledger]
backend = "memory"

[cache]
backend = "memory"

[http]
cert_path = "cert.pem"
key_path = "key.pem"
address = "127.0.0.1:8443"

[log]
filter = "info"
"#;

    fn from_toml(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn optional_fields_fall_back_to_defaults() {
        let settings = from_toml(MINIMAL);
        settings.validate().unwrap();

        assert_eq!(settings.auth.session_limit_per_user, 5);
        assert_eq!(settings.ledger.deadline_ms, 2_000);
        assert_eq!(settings.cache.prefix, "auth");
        assert_eq!(settings.cache.purge_interval_secs, 60);
    }

    #[test]
    fn zero_grace_period_is_rejected() {
        let settings = from_toml(&MINIMAL.replace("grace_period_secs = 30", "grace_period_secs = 0"));
        assert!(settings.validate().is_err());
    }
}
