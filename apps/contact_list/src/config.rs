use std::{
    fs, io,
    path::Path,
    time::Duration,
};

use anyhow::{bail, Context};
use client_core::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_USERS_ENDPOINT};
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const CONFIG_FILE: &str = "contact_list.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub endpoint: String,
    pub request_timeout_secs: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_USERS_ENDPOINT.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn endpoint_url(&self) -> anyhow::Result<Url> {
        let url = Url::parse(self.endpoint.trim())
            .with_context(|| format!("invalid users endpoint '{}'", self.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!(
                "users endpoint must use http or https, got '{}'",
                url.scheme()
            );
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    endpoint: Option<String>,
    request_timeout_secs: Option<u64>,
    log_filter: Option<String>,
}

/// Defaults, then the config file, then environment overrides.
///
/// A missing default config file is fine; a missing explicit one is an error.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    let path = config_path.unwrap_or(Path::new(CONFIG_FILE));

    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound && config_path.is_none() => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.endpoint {
        settings.endpoint = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    Ok(())
}

/// Returns the variables that were set but could not be used.
fn apply_env(
    settings: &mut Settings,
    var: impl Fn(&str) -> Option<String>,
) -> Vec<&'static str> {
    let mut rejected = Vec::new();

    if let Some(v) = var("USERS_ENDPOINT") {
        settings.endpoint = v;
    }
    if let Some(v) = var("APP__USERS_ENDPOINT") {
        settings.endpoint = v;
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        match v.trim().parse::<u64>() {
            Ok(parsed) => settings.request_timeout_secs = parsed,
            Err(err) => {
                warn!(
                    value = %v,
                    error = %err,
                    keeping = settings.request_timeout_secs,
                    "ignoring unparsable APP__REQUEST_TIMEOUT_SECS"
                );
                rejected.push("APP__REQUEST_TIMEOUT_SECS");
            }
        }
    }

    if let Some(v) = var("RUST_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    rejected
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_public_users_endpoint() {
        let settings = Settings::default();
        assert_eq!(
            settings.endpoint_url().expect("url").as_str(),
            "https://jsonplaceholder.typicode.com/users"
        );
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn file_values_override_defaults() {
        let mut settings = Settings::default();
        apply_file(
            &mut settings,
            "endpoint = \"http://localhost:9000/users\"\nrequest_timeout_secs = 3\n",
        )
        .expect("parse");

        assert_eq!(settings.endpoint, "http://localhost:9000/users");
        assert_eq!(settings.request_timeout_secs, 3);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let mut settings = Settings::default();
        assert!(apply_file(&mut settings, "endpont = \"typo\"").is_err());
    }

    #[test]
    fn prefixed_env_wins_over_plain_env() {
        let mut settings = Settings::default();
        let rejected = apply_env(
            &mut settings,
            env_from(&[
                ("USERS_ENDPOINT", "http://plain/users"),
                ("APP__USERS_ENDPOINT", "http://prefixed/users"),
                ("RUST_LOG", "debug"),
            ]),
        );

        assert!(rejected.is_empty());
        assert_eq!(settings.endpoint, "http://prefixed/users");
        assert_eq!(settings.log_filter, "debug");
    }

    #[test]
    fn unparsable_timeout_env_is_reported_and_ignored() {
        let mut settings = Settings::default();
        let rejected = apply_env(
            &mut settings,
            env_from(&[("APP__REQUEST_TIMEOUT_SECS", "ten")]),
        );

        assert_eq!(rejected, ["APP__REQUEST_TIMEOUT_SECS"]);
        assert_eq!(settings.request_timeout_secs, 10);
    }

    #[test]
    fn timeout_env_overrides_default() {
        let mut settings = Settings::default();
        let rejected = apply_env(
            &mut settings,
            env_from(&[("APP__REQUEST_TIMEOUT_SECS", " 30 ")]),
        );

        assert!(rejected.is_empty());
        assert_eq!(settings.request_timeout_secs, 30);
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let settings = Settings {
            endpoint: "ftp://example.com/users".into(),
            ..Settings::default()
        };
        assert!(settings.endpoint_url().is_err());
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let settings = Settings {
            request_timeout_secs: 0,
            ..Settings::default()
        };
        assert_eq!(settings.request_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn explicit_missing_config_file_is_an_error() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("contact_list_missing_{suffix}.toml"));

        assert!(load_settings(Some(&path)).is_err());
    }

    #[test]
    fn reads_explicit_config_file() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("contact_list_config_{suffix}.toml"));
        fs::write(&path, "request_timeout_secs = 42\n").expect("write config");

        let settings = load_settings(Some(&path)).expect("load");
        fs::remove_file(&path).expect("cleanup");

        assert_eq!(settings.request_timeout_secs, 42);
    }
}
