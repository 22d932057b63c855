use crate::error::{Result, RotatorError};
use crate::gateway::Credentials;
use crate::models::RegionSet;
use std::env;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Rotation configuration
    pub rotator: RotatorConfig,
    /// Gateway provider credentials and endpoint
    pub aws: AwsConfig,
    /// Local relay server configuration
    pub relay: RelayConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct RotatorConfig {
    /// Normalised target origin
    pub target: String,
    /// Regions to create endpoints in
    pub regions: RegionSet,
    /// Delay between deletion attempts while throttled, in seconds (default: 5)
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub credentials: Credentials,
    /// Control plane base URL used for every region instead of the regional one
    pub gateway_endpoint: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Host to bind to (default: 127.0.0.1)
    pub host: String,
    /// Port for the relay server (default: 8000)
    pub port: u16,
    /// Upstream request timeout in seconds
    pub request_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            rotator: RotatorConfig {
                target: normalize_target(&require_env("ROTATOR_TARGET")?)?,
                regions: RegionSet::parse(&get_env_or("ROTATOR_REGIONS", ""))?,
                retry_delay_secs: get_env_or("ROTATOR_RETRY_DELAY_SECS", "5")
                    .parse()
                    .map_err(|_| {
                        RotatorError::InvalidConfig(
                            "ROTATOR_RETRY_DELAY_SECS must be a valid number".into(),
                        )
                    })?,
            },
            aws: AwsConfig {
                credentials: parse_credentials()?,
                gateway_endpoint: parse_gateway_endpoint()?,
            },
            relay: RelayConfig {
                host: get_env_or("RELAY_HOST", "127.0.0.1"),
                port: get_env_or("RELAY_PORT", "8000").parse().map_err(|_| {
                    RotatorError::InvalidConfig("RELAY_PORT must be a valid port number".into())
                })?,
                request_timeout: get_env_or("RELAY_REQUEST_TIMEOUT", "30")
                    .parse()
                    .unwrap_or(30),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the relay server address
    pub fn relay_addr(&self) -> String {
        format!("{}:{}", self.relay.host, self.relay.port)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.rotator.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.relay.request_timeout)
    }
}

/// Reduce a target to `scheme://host[:port]`, defaulting the scheme to https
pub fn normalize_target(input: &str) -> Result<String> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(RotatorError::InvalidTarget("target must not be empty".into()));
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| RotatorError::InvalidTarget(format!("{}: {}", raw, e)))?;

    let scheme = url.scheme().to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(RotatorError::InvalidTarget(format!(
            "{}: unsupported scheme {}",
            raw, scheme
        )));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| RotatorError::InvalidTarget(format!("{}: missing host", raw)))?;

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", scheme, host, port),
        None => format!("{}://{}", scheme, host),
    })
}

fn parse_credentials() -> Result<Credentials> {
    let credentials = Credentials::new(
        require_env("AWS_ACCESS_KEY_ID")?,
        require_env("AWS_SECRET_ACCESS_KEY")?,
    );

    Ok(match env::var("AWS_SESSION_TOKEN") {
        Ok(token) if !token.trim().is_empty() => credentials.with_session_token(token.trim()),
        _ => credentials,
    })
}

fn parse_gateway_endpoint() -> Result<Option<Url>> {
    let raw = env::var("ROTATOR_GATEWAY_ENDPOINT").unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let url = Url::parse(raw).map_err(|e| {
        RotatorError::InvalidConfig(format!("ROTATOR_GATEWAY_ENDPOINT must be a valid URL: {}", e))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(RotatorError::InvalidConfig(format!(
            "ROTATOR_GATEWAY_ENDPOINT has unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(RotatorError::InvalidConfig(
            "ROTATOR_GATEWAY_ENDPOINT must include a host".into(),
        ));
    }

    Ok(Some(url))
}

/// Get a required, non-empty environment variable
fn require_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(RotatorError::MissingEnvVar(key.to_string())),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_REGIONS, EXTRA_REGIONS};
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "ROTATOR_TARGET",
        "ROTATOR_REGIONS",
        "ROTATOR_GATEWAY_ENDPOINT",
        "ROTATOR_RETRY_DELAY_SECS",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_SESSION_TOKEN",
        "RELAY_HOST",
        "RELAY_PORT",
        "RELAY_REQUEST_TIMEOUT",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    fn set_required() {
        env::set_var("ROTATOR_TARGET", "example.com");
        env::set_var("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE");
        env::set_var("AWS_SECRET_ACCESS_KEY", "secret");
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);
        set_required();

        let config = Config::from_env().unwrap();

        assert_eq!(config.rotator.target, "https://example.com");
        assert_eq!(config.rotator.regions.as_slice(), DEFAULT_REGIONS);
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.aws.credentials.access_key_id, "AKIDEXAMPLE");
        assert!(config.aws.credentials.session_token.is_none());
        assert!(config.aws.gateway_endpoint.is_none());
        assert_eq!(config.relay_addr(), "127.0.0.1:8000");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, "pretty");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);
        set_required();

        env::set_var("ROTATOR_TARGET", "http://api.example.com:8080/v1/users");
        env::set_var("ROTATOR_REGIONS", "extra");
        env::set_var("ROTATOR_GATEWAY_ENDPOINT", "http://localhost:4566");
        env::set_var("ROTATOR_RETRY_DELAY_SECS", "1");
        env::set_var("AWS_SESSION_TOKEN", "session");
        env::set_var("RELAY_HOST", "0.0.0.0");
        env::set_var("RELAY_PORT", "9000");
        env::set_var("LOG_FORMAT", "json");

        let config = Config::from_env().unwrap();

        assert_eq!(config.rotator.target, "http://api.example.com:8080");
        assert_eq!(config.rotator.regions.as_slice(), EXTRA_REGIONS);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(
            config.aws.credentials.session_token.as_deref(),
            Some("session")
        );
        assert_eq!(
            config.aws.gateway_endpoint.as_ref().map(|u| u.as_str()),
            Some("http://localhost:4566/")
        );
        assert_eq!(config.relay_addr(), "0.0.0.0:9000");
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_config_from_env_region_list() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);
        set_required();

        env::set_var("ROTATOR_REGIONS", "eu-west-1, us-east-1,eu-west-1");
        let config = Config::from_env().unwrap();
        assert_eq!(
            config.rotator.regions.as_slice(),
            &["eu-west-1".to_string(), "us-east-1".to_string()]
        );

        env::set_var("ROTATOR_REGIONS", "eu-west-1,mars-north-1");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RotatorError::InvalidRegion(_)));
    }

    #[test]
    fn test_config_from_env_missing_target() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);
        set_required();

        env::remove_var("ROTATOR_TARGET");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RotatorError::MissingEnvVar(ref k) if k == "ROTATOR_TARGET"));
    }

    #[test]
    fn test_config_from_env_missing_credentials() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);
        set_required();

        env::set_var("AWS_SECRET_ACCESS_KEY", "  ");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RotatorError::MissingEnvVar(ref k) if k == "AWS_SECRET_ACCESS_KEY"));
    }

    #[test]
    fn test_config_from_env_invalid_port() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);
        set_required();

        env::set_var("RELAY_PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RotatorError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_gateway_endpoint() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);
        set_required();

        env::set_var("ROTATOR_GATEWAY_ENDPOINT", "ftp://localhost");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RotatorError::InvalidConfig(_)));
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("example.com").unwrap(), "https://example.com");
        assert_eq!(
            normalize_target("http://example.com").unwrap(),
            "http://example.com"
        );
        assert_eq!(
            normalize_target(" https://user:pw@example.com:8443/path?q=1#frag ").unwrap(),
            "https://example.com:8443"
        );
        assert_eq!(
            normalize_target("https://example.com:443").unwrap(),
            "https://example.com"
        );
        assert_eq!(normalize_target("HTTP://Example.COM").unwrap(), "http://example.com");
    }

    #[test]
    fn test_normalize_target_rejects_garbage() {
        assert!(matches!(
            normalize_target(""),
            Err(RotatorError::InvalidTarget(_))
        ));
        assert!(matches!(
            normalize_target("ftp://example.com"),
            Err(RotatorError::InvalidTarget(_))
        ));
        assert!(matches!(
            normalize_target("https://"),
            Err(RotatorError::InvalidTarget(_))
        ));
    }
}
