use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::info;

use crate::error::ConfigError;
use crate::probe::ProxyConfig;

pub const DEFAULT_ONION_URL: &str = "http://your-domain-here.onion";
pub const DEFAULT_TOR_PROXY: &str = "socks5h://127.0.0.1:9050";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub onion_url: String,
    /// `None` probes the target directly instead of through a proxy.
    pub proxy: Option<ProxyConfig>,
    pub port: u16,
    pub cors_origin: String,
    pub cache_duration: Duration,
    pub probe_timeout: Duration,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
    pub trust_forwarded_for: bool,
    pub static_dir: PathBuf,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let proxy_raw: String = try_load(&lookup, "TOR_PROXY", DEFAULT_TOR_PROXY)?;
        let proxy = match proxy_raw.trim() {
            "" | "none" | "direct" => None,
            raw => Some(raw.parse::<ProxyConfig>()?),
        };

        let config = Self {
            onion_url: try_load(&lookup, "ONION_URL", DEFAULT_ONION_URL)?,
            proxy,
            port: try_load(&lookup, "PORT", "3000")?,
            cors_origin: try_load(&lookup, "CORS_ORIGIN", "*")?,
            cache_duration: millis(&lookup, "CACHE_DURATION_MS", "30000")?,
            probe_timeout: positive_millis(&lookup, "PROBE_TIMEOUT_MS", "10000")?,
            rate_limit_window: positive_millis(&lookup, "RATE_LIMIT_WINDOW_MS", "60000")?,
            rate_limit_max_requests: try_load(&lookup, "RATE_LIMIT_MAX_REQUESTS", "10")?,
            trust_forwarded_for: flag(&lookup, "TRUST_FORWARDED_FOR", false)?,
            static_dir: PathBuf::from(try_load::<String, _>(&lookup, "STATIC_DIR", "public")?),
        };

        if config.rate_limit_max_requests == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_MAX_REQUESTS",
                value: "0".into(),
                reason: "must allow at least one request".into(),
            });
        }

        Ok(config)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            onion_url: DEFAULT_ONION_URL.to_string(),
            proxy: DEFAULT_TOR_PROXY.parse().ok(),
            port: 3000,
            cors_origin: "*".to_string(),
            cache_duration: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max_requests: 10,
            trust_forwarded_for: false,
            static_dir: PathBuf::from("public"),
        }
    }
}

fn try_load<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

fn millis<F>(lookup: &F, key: &'static str, default: &str) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: u64 = try_load(lookup, key, default)?;
    if i64::try_from(value).is_err() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: format!("must be at most {} milliseconds", i64::MAX),
        });
    }
    Ok(Duration::from_millis(value))
}

fn positive_millis<F>(lookup: &F, key: &'static str, default: &str) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = millis(lookup, key, default)?;
    if value.is_zero() {
        return Err(ConfigError::Invalid {
            key,
            value: "0".into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

fn flag<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "expected true or false".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProxyScheme;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_reference_deployment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.onion_url, DEFAULT_ONION_URL);
        assert_eq!(config.port, 3000);
        assert_eq!(config.cors_origin, "*");
        assert_eq!(config.cache_duration, Duration::from_secs(30));
        assert_eq!(config.probe_timeout, Duration::from_secs(10));
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.rate_limit_max_requests, 10);
        assert!(!config.trust_forwarded_for);

        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.scheme, ProxyScheme::Socks5h);
        assert_eq!(proxy.port, 9050);
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("ONION_URL", "http://abc123xyz456.onion/submit"),
            ("TOR_PROXY", "socks5://10.0.0.2:9150"),
            ("PORT", "8080"),
            ("CACHE_DURATION_MS", "5000"),
            ("RATE_LIMIT_MAX_REQUESTS", "3"),
            ("TRUST_FORWARDED_FOR", "yes"),
            ("STATIC_DIR", "/srv/site"),
        ])
        .unwrap();

        assert_eq!(config.onion_url, "http://abc123xyz456.onion/submit");
        assert_eq!(config.proxy.unwrap().host, "10.0.0.2");
        assert_eq!(config.port, 8080);
        assert_eq!(config.cache_duration, Duration::from_secs(5));
        assert_eq!(config.rate_limit_max_requests, 3);
        assert!(config.trust_forwarded_for);
        assert_eq!(config.static_dir, PathBuf::from("/srv/site"));
    }

    #[test]
    fn proxy_can_be_disabled() {
        assert!(load(&[("TOR_PROXY", "none")]).unwrap().proxy.is_none());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
        assert!(matches!(
            load(&[("PROBE_TIMEOUT_MS", "0")]),
            Err(ConfigError::Invalid { key: "PROBE_TIMEOUT_MS", .. })
        ));
        assert!(matches!(
            load(&[("RATE_LIMIT_MAX_REQUESTS", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            load(&[("TOR_PROXY", "gopher://x:1")]),
            Err(ConfigError::Proxy(_))
        ));
        assert!(load(&[("TRUST_FORWARDED_FOR", "maybe")]).is_err());
    }

    #[test]
    fn oversized_window_is_rejected() {
        assert!(matches!(
            load(&[("RATE_LIMIT_WINDOW_MS", "18446744073709551615")]),
            Err(ConfigError::Invalid { key: "RATE_LIMIT_WINDOW_MS", .. })
        ));
        let largest = i64::MAX.to_string();
        let config = load(&[("RATE_LIMIT_WINDOW_MS", largest.as_str())]).unwrap();
        assert_eq!(config.rate_limit_window.as_millis(), i64::MAX as u128);
    }
}
