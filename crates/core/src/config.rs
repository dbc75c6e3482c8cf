use std::env;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GlbError, Result};

pub const DEFAULT_LIBRARY_NAME: &str = "glbtrace";

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub listen_addr: String,
    pub api_key: Option<String>,
    pub dataset: Option<String>,
    pub sink_endpoint: String,
    pub sink_protocol: String,
    pub sink_compression: String,
    pub sink_headers: Vec<(String, String)>,
    pub sink_timeout: Duration,
    pub sink_batch_size: usize,
    pub sink_flush_interval: Duration,
    pub sink_queue_capacity: usize,
    pub library_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            api_key: None,
            dataset: None,
            sink_endpoint: "https://api.honeycomb.io".to_string(),
            sink_protocol: "http/protobuf".to_string(),
            sink_compression: "none".to_string(),
            sink_headers: Vec::new(),
            sink_timeout: Duration::from_secs(10),
            sink_batch_size: 512,
            sink_flush_interval: Duration::from_secs(1),
            sink_queue_capacity: 4096,
            library_name: DEFAULT_LIBRARY_NAME.to_string(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("dataset", &self.dataset)
            .field("sink_endpoint", &self.sink_endpoint)
            .field("sink_protocol", &self.sink_protocol)
            .field("sink_compression", &self.sink_compression)
            .field("sink_headers", &self.sink_headers.len())
            .field("sink_timeout", &self.sink_timeout)
            .field("sink_batch_size", &self.sink_batch_size)
            .field("sink_flush_interval", &self.sink_flush_interval)
            .field("sink_queue_capacity", &self.sink_queue_capacity)
            .field("library_name", &self.library_name)
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    /// The service refuses to start without credentials for the backend.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(GlbError::Config(
                "api key is missing (set HONEYCOMB_APIKEY)".to_string(),
            ));
        }
        if self.dataset.as_deref().is_none_or(str::is_empty) {
            return Err(GlbError::Config(
                "dataset is missing (set HONEYCOMB_DATASET)".to_string(),
            ));
        }
        if self.sink_endpoint.trim().is_empty() {
            return Err(GlbError::Config("sink endpoint cannot be empty".to_string()));
        }
        if self.sink_batch_size == 0 || self.sink_queue_capacity == 0 {
            return Err(GlbError::Config(
                "sink batch size and queue capacity must be positive".to_string(),
            ));
        }
        if self.sink_flush_interval.is_zero() {
            return Err(GlbError::Config(
                "sink flush interval must be positive".to_string(),
            ));
        }
        self.listen_socket_addr()?;
        Ok(())
    }

    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            GlbError::Config(format!("bad listen_addr {}: {e}", self.listen_addr))
        })
    }

    /// Headers sent with every export: backend credentials first, then any
    /// extra configured headers.
    pub fn export_headers(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.sink_headers.len() + 2);
        if let Some(key) = &self.api_key {
            out.push(("x-honeycomb-team".to_string(), key.clone()));
        }
        if let Some(dataset) = &self.dataset {
            out.push(("x-honeycomb-dataset".to_string(), dataset.clone()));
        }
        out.extend(self.sink_headers.iter().cloned());
        out
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    listen_addr: Option<String>,
    port: Option<u16>,
    api_key: Option<String>,
    dataset: Option<String>,
    sink_endpoint: Option<String>,
    sink_protocol: Option<String>,
    sink_compression: Option<String>,
    sink_headers: Option<String>,
    sink_timeout: Option<String>,
    sink_batch_size: Option<usize>,
    sink_flush_interval: Option<String>,
    sink_queue_capacity: Option<usize>,
    library_name: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("GLBTRACE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("glbtrace/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| GlbError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed = parse_file_overrides(&raw)
        .map_err(|e| GlbError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn parse_file_overrides(raw: &str) -> std::result::Result<ConfigOverrides, toml::de::Error> {
    toml::from_str(raw)
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    let port = match env::var("PORT") {
        Ok(v) => Some(v.parse::<u16>().map_err(|e| {
            GlbError::Config(format!("bad PORT in environment: {e} (value={v})"))
        })?),
        Err(_) => None,
    };
    let sink_batch_size = match env::var("GLBTRACE_SINK_BATCH_SIZE") {
        Ok(v) => Some(v.parse::<usize>().map_err(|e| {
            GlbError::Config(format!("bad GLBTRACE_SINK_BATCH_SIZE in environment: {e}"))
        })?),
        Err(_) => None,
    };

    Ok(ConfigOverrides {
        listen_addr: env::var("GLBTRACE_LISTEN_ADDR").ok(),
        port,
        api_key: env::var("HONEYCOMB_APIKEY").ok(),
        dataset: env::var("HONEYCOMB_DATASET").ok(),
        sink_endpoint: env::var("GLBTRACE_SINK_ENDPOINT").ok(),
        sink_protocol: env::var("GLBTRACE_SINK_PROTOCOL").ok(),
        sink_compression: env::var("GLBTRACE_SINK_COMPRESSION").ok(),
        sink_headers: env::var("GLBTRACE_SINK_HEADERS").ok(),
        sink_timeout: env::var("GLBTRACE_SINK_TIMEOUT").ok(),
        sink_batch_size,
        sink_flush_interval: env::var("GLBTRACE_SINK_FLUSH_INTERVAL").ok(),
        sink_queue_capacity: None,
        library_name: None,
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    // An explicit address wins over the bare port Cloud Run hands us.
    if let Some(port) = overrides.port {
        cfg.listen_addr = format!("0.0.0.0:{port}");
    }
    if let Some(v) = overrides.listen_addr {
        cfg.listen_addr = v;
    }
    if let Some(v) = overrides.api_key {
        cfg.api_key = Some(v);
    }
    if let Some(v) = overrides.dataset {
        cfg.dataset = Some(v);
    }
    if let Some(v) = overrides.sink_endpoint {
        cfg.sink_endpoint = v;
    }
    if let Some(v) = overrides.sink_protocol {
        cfg.sink_protocol = v;
    }
    if let Some(v) = overrides.sink_compression {
        cfg.sink_compression = v;
    }
    if let Some(v) = overrides.sink_headers {
        cfg.sink_headers = parse_sink_headers(&v).map_err(|e| {
            GlbError::Config(format!("bad sink_headers in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.sink_timeout {
        cfg.sink_timeout = humantime::parse_duration(&v).map_err(|e| {
            GlbError::Config(format!("bad sink_timeout in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.sink_batch_size {
        cfg.sink_batch_size = v;
    }
    if let Some(v) = overrides.sink_flush_interval {
        cfg.sink_flush_interval = humantime::parse_duration(&v).map_err(|e| {
            GlbError::Config(format!(
                "bad sink_flush_interval in {source}: {e} (value={v})"
            ))
        })?;
    }
    if let Some(v) = overrides.sink_queue_capacity {
        cfg.sink_queue_capacity = v;
    }
    if let Some(v) = overrides.library_name {
        cfg.library_name = v;
    }
    Ok(())
}

fn parse_sink_headers(raw: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(GlbError::Config(
                "header entries must use key=value syntax".to_string(),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(GlbError::Config("header key cannot be empty".to_string()));
        }
        out.push((key.to_string(), value.trim().to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            api_key: Some("key".into()),
            dataset: Some("glb".into()),
            ..Config::default()
        }
    }

    #[test]
    fn default_listens_on_8080() {
        let cfg = Config::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.library_name, DEFAULT_LIBRARY_NAME);
        assert_eq!(cfg.sink_protocol, "http/protobuf");
    }

    #[test]
    fn validate_requires_credentials() {
        assert!(valid().validate().is_ok());

        let missing_key = Config {
            api_key: None,
            ..valid()
        };
        assert!(matches!(missing_key.validate(), Err(GlbError::Config(_))));

        let empty_dataset = Config {
            dataset: Some(String::new()),
            ..valid()
        };
        assert!(empty_dataset.validate().is_err());

        let bad_addr = Config {
            listen_addr: "nowhere".into(),
            ..valid()
        };
        assert!(bad_addr.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_flush_interval() {
        let cfg = Config {
            sink_flush_interval: Duration::ZERO,
            ..valid()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("flush interval"), "{err}");

        let mut cfg = valid();
        let overrides = ConfigOverrides {
            sink_flush_interval: Some("0s".into()),
            ..ConfigOverrides::default()
        };
        apply_overrides(&mut cfg, overrides, "environment").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let cfg = Config {
            api_key: Some("super-secret".into()),
            ..Config::default()
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn export_headers_lead_with_credentials() {
        let cfg = Config {
            sink_headers: vec![("x-extra".into(), "1".into())],
            ..valid()
        };
        assert_eq!(
            cfg.export_headers(),
            vec![
                ("x-honeycomb-team".to_string(), "key".to_string()),
                ("x-honeycomb-dataset".to_string(), "glb".to_string()),
                ("x-extra".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn port_override_rewrites_listen_addr() {
        let mut cfg = Config::default();
        let overrides = ConfigOverrides {
            port: Some(9090),
            ..ConfigOverrides::default()
        };
        apply_overrides(&mut cfg, overrides, "environment").unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:9090");

        let overrides = ConfigOverrides {
            port: Some(9090),
            listen_addr: Some("127.0.0.1:7000".into()),
            ..ConfigOverrides::default()
        };
        apply_overrides(&mut cfg, overrides, "environment").unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:7000");
    }

    #[test]
    fn parse_sink_headers_rejects_bad_entries() {
        assert!(parse_sink_headers("x-tenant").is_err());
        assert!(parse_sink_headers("=dev").is_err());
        assert!(parse_sink_headers(" , ").unwrap().is_empty());
    }

    #[test]
    fn file_overrides_update_sink_fields() {
        let raw = r#"
            dataset = "glb-requests"
            sink_endpoint = "http://127.0.0.1:4317"
            sink_protocol = "grpc"
            sink_compression = "gzip"
            sink_headers = "x-tenant=dev,authorization=Bearer token"
            sink_timeout = "3s"
            sink_flush_interval = "250ms"
            sink_queue_capacity = 16
            library_name = "glb-to-otlp"
        "#;
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, parse_file_overrides(raw).unwrap(), "config file").unwrap();

        assert_eq!(cfg.dataset.as_deref(), Some("glb-requests"));
        assert_eq!(cfg.sink_endpoint, "http://127.0.0.1:4317");
        assert_eq!(cfg.sink_protocol, "grpc");
        assert_eq!(cfg.sink_compression, "gzip");
        assert_eq!(
            cfg.sink_headers,
            vec![
                ("x-tenant".to_string(), "dev".to_string()),
                ("authorization".to_string(), "Bearer token".to_string())
            ]
        );
        assert_eq!(cfg.sink_timeout, Duration::from_secs(3));
        assert_eq!(cfg.sink_flush_interval, Duration::from_millis(250));
        assert_eq!(cfg.sink_queue_capacity, 16);
        assert_eq!(cfg.library_name, "glb-to-otlp");
    }

    #[test]
    fn bad_timeout_names_its_source() {
        let mut cfg = Config::default();
        let overrides = ConfigOverrides {
            sink_timeout: Some("later".into()),
            ..ConfigOverrides::default()
        };
        let err = apply_overrides(&mut cfg, overrides, "config file").unwrap_err();
        assert!(err.to_string().contains("config file"));
    }
}
