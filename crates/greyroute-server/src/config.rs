use greyroute_routing::RefresherConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// JSON strategy document; the embedded demo strategy is served when unset
    #[serde(default)]
    pub strategy_file: Option<PathBuf>,

    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Reload as soon as the strategy file changes instead of waiting for the next tick
    #[serde(default = "default_false")]
    pub watch_strategy_file: bool,

    /// `host:port` that receives non-grey traffic
    #[serde(default = "default_upstream")]
    pub default_upstream: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            strategy_file: None,
            refresh_interval_secs: default_refresh_interval_secs(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            watch_strategy_file: false,
            default_upstream: default_upstream(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        // Server settings
        if let Ok(val) = std::env::var("GREYROUTE_HOST") {
            self.host = val;
        }

        if let Ok(val) = std::env::var("GREYROUTE_PORT")
            && let Ok(port) = val.parse::<u16>()
        {
            self.port = port;
        }

        if let Ok(val) = std::env::var("GREYROUTE_DEFAULT_UPSTREAM") {
            self.default_upstream = val;
        }

        // Strategy settings
        if let Ok(val) = std::env::var("GREYROUTE_STRATEGY_FILE") {
            self.strategy_file = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("GREYROUTE_REFRESH_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            self.refresh_interval_secs = secs;
        }

        if let Ok(val) = std::env::var("GREYROUTE_FETCH_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            self.fetch_timeout_ms = ms;
        }

        // Logging settings
        if let Ok(val) = std::env::var("GREYROUTE_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    pub fn refresher_config(&self) -> RefresherConfig {
        RefresherConfig::new(Duration::from_secs(self.refresh_interval_secs))
            .with_fetch_timeout(Duration::from_millis(self.fetch_timeout_ms))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_refresh_interval_secs() -> u64 {
    5
}

fn default_fetch_timeout_ms() -> u64 {
    3000
}

fn default_upstream() -> String {
    "127.0.0.1:8083".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_false() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert!(config.strategy_file.is_none());
        assert_eq!(config.default_upstream, "127.0.0.1:8083");

        let refresher = config.refresher_config();
        assert_eq!(refresher.interval, Duration::from_secs(5));
        assert_eq!(refresher.fetch_timeout, Duration::from_millis(3000));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "port: 9090\nstrategy_file: /etc/greyroute/strategy.json\nrefresh_interval_secs: 1\nlogging:\n  level: debug"
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(
            config.strategy_file,
            Some(PathBuf::from("/etc/greyroute/strategy.json"))
        );
        assert_eq!(config.refresh_interval_secs, 1);
        assert_eq!(config.logging.level, "debug");
        // Unset fields fall back to defaults
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.fetch_timeout_ms, 3000);
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "host = \"0.0.0.0\"\nwatch_strategy_file = true\ndefault_upstream = \"10.0.0.1:80\""
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.watch_strategy_file);
        assert_eq!(config.default_upstream, "10.0.0.1:80");
    }

    #[test]
    #[serial]
    fn test_merge_env() {
        unsafe {
            std::env::set_var("GREYROUTE_PORT", "7070");
            std::env::set_var("GREYROUTE_FETCH_TIMEOUT_MS", "not-a-number");
            std::env::set_var("GREYROUTE_STRATEGY_FILE", "/tmp/strategy.json");
        }

        let mut config = ServerConfig::default();
        config.merge_env();

        unsafe {
            std::env::remove_var("GREYROUTE_PORT");
            std::env::remove_var("GREYROUTE_FETCH_TIMEOUT_MS");
            std::env::remove_var("GREYROUTE_STRATEGY_FILE");
        }

        assert_eq!(config.port, 7070);
        // Unparseable values are ignored
        assert_eq!(config.fetch_timeout_ms, 3000);
        assert_eq!(
            config.strategy_file,
            Some(PathBuf::from("/tmp/strategy.json"))
        );
    }
}
