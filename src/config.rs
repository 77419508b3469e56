use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

/// Server settings read from a TOML file. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,

    pub static_root: PathBuf,
    /// 0: no cache headers, 1: cache headers, 2: also honour `If-Modified-Since`.
    pub cache_level: u8,
    pub max_upgrade_frame_len: usize,
    /// Spawn one task per connection instead of serving them one at a time.
    pub threaded: bool,

    #[serde(deserialize_with = "deserialize_duration")]
    pub read_timeout: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub write_timeout: Duration,

    pub max_line_size: usize,
    pub max_body_size: usize,

    pub server_name: String,
    pub not_found_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 80,

            static_root: PathBuf::from("www"),
            cache_level: 0,
            max_upgrade_frame_len: 1024,
            threaded: true,

            read_timeout: Duration::from_secs(4),
            write_timeout: Duration::from_secs(4),

            max_line_size: 2048,
            max_body_size: 64 * 1024,

            server_name: concat!("microserver/", env!("CARGO_PKG_VERSION")).to_string(),
            not_found_url: None,
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read config, using defaults");
                return ServerConfig::default();
            }
        };

        match Self::from_toml_str(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "invalid config, using defaults");
                ServerConfig::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(serde::de::Error::custom(format!(
            "invalid duration {} (expected seconds >= 0)",
            secs
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ServerConfig::from_toml_str(
            "port = 8080\n\
             cache_level = 2\n\
             read_timeout = 1.5\n\
             not_found_url = \"/\"\n",
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cache_level, 2);
        assert_eq!(config.read_timeout, Duration::from_millis(1500));
        assert_eq!(config.write_timeout, Duration::from_secs(4));
        assert_eq!(config.not_found_url.as_deref(), Some("/"));
        assert_eq!(config.max_upgrade_frame_len, 1024);
        assert!(config.threaded);
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServerConfig::from_toml_str("read_timeout = -1.0").is_err());
        assert!(ServerConfig::from_toml_str("port = \"eighty\"").is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::from_file(dir.path().join("absent.toml"));
        assert_eq!(config.port, 80);
        assert_eq!(config.static_root, PathBuf::from("www"));
    }
}
