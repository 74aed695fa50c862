use anyhow::Context;
use serde::{Deserialize, Serialize};
use skywatch_common::NoradId;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub static CONFIG: OnceLock<AppConfig> = OnceLock::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    /// Objects served by the API, in display order
    #[serde(default = "default_satellites")]
    pub satellites: Vec<SatelliteConfig>,

    /// Element sources, tried in this order
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one element file per object
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_element_ttl_minutes")]
    pub element_ttl_minutes: u64,

    #[serde(default = "default_result_ttl_seconds")]
    pub result_ttl_seconds: u64,

    /// Background refresh interval, 0 disables it
    #[serde(default = "default_prefetch_interval_minutes")]
    pub prefetch_interval_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,

    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SatelliteConfig {
    /// Short key used in URLs and responses ("iss")
    pub key: String,
    pub label: String,
    pub norad_id: NoradId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// CelesTrak GP query by catalog number
    Celestrak {
        #[serde(default = "default_celestrak_url")]
        url: String,
    },
    /// JSON TLE API addressed as `{url}/{norad_id}`
    TleApi {
        #[serde(default = "default_tle_api_url")]
        url: String,
    },
    /// Bulk element text (plain or HTML) scanned for the catalog number
    Bulletin {
        #[serde(default = "default_bulletin_url")]
        url: String,
    },
}

/// Clamp bounds for one numeric request parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
    pub default: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub const fn new(min: T, max: T, default: T) -> Self {
        Self { min, max, default }
    }

    /// Clamp a supplied value into range; absent or NaN values take the default.
    pub fn clamp(&self, value: Option<T>) -> T {
        match value {
            Some(v) if v.partial_cmp(&v).is_some() => {
                if v < self.min {
                    self.min
                } else if v > self.max {
                    self.max
                } else {
                    v
                }
            }
            _ => self.default,
        }
    }

    fn is_consistent(&self) -> bool {
        self.min <= self.default && self.default <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_minutes")]
    pub minutes: Bounds<i64>,

    #[serde(default = "default_step_sec")]
    pub step_sec: Bounds<i64>,

    #[serde(default = "default_hours")]
    pub hours: Bounds<i64>,

    #[serde(default = "default_limit")]
    pub limit: Bounds<i64>,

    #[serde(default = "default_min_el")]
    pub min_el: Bounds<f64>,

    #[serde(default = "default_elev")]
    pub elev: Bounds<f64>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_element_ttl_minutes() -> u64 {
    180
}

fn default_result_ttl_seconds() -> u64 {
    30
}

fn default_prefetch_interval_minutes() -> u64 {
    60
}

fn default_connect_timeout_seconds() -> u64 {
    5
}

fn default_request_timeout_seconds() -> u64 {
    20
}

fn default_user_agent() -> String {
    concat!("skywatch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_celestrak_url() -> String {
    "https://celestrak.org/NORAD/elements/gp.php".to_string()
}

fn default_tle_api_url() -> String {
    "https://tle.ivanstanojevic.me/api/tle".to_string()
}

fn default_bulletin_url() -> String {
    "https://celestrak.org/NORAD/elements/stations.txt".to_string()
}

fn default_satellites() -> Vec<SatelliteConfig> {
    vec![
        SatelliteConfig {
            key: "iss".to_string(),
            label: "ISS".to_string(),
            norad_id: 25544,
        },
        SatelliteConfig {
            key: "tiangong".to_string(),
            label: "Tiangong".to_string(),
            norad_id: 48274,
        },
    ]
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::Celestrak { url: default_celestrak_url() },
        SourceConfig::TleApi { url: default_tle_api_url() },
        SourceConfig::Bulletin { url: default_bulletin_url() },
    ]
}

fn default_minutes() -> Bounds<i64> {
    Bounds::new(5, 180, 90)
}

fn default_step_sec() -> Bounds<i64> {
    Bounds::new(5, 300, 60)
}

fn default_hours() -> Bounds<i64> {
    Bounds::new(1, 168, 48)
}

fn default_limit() -> Bounds<i64> {
    Bounds::new(1, 20, 5)
}

fn default_min_el() -> Bounds<f64> {
    Bounds::new(0.0, 90.0, 10.0)
}

fn default_elev() -> Bounds<f64> {
    Bounds::new(-500.0, 9000.0, 0.0)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            element_ttl_minutes: default_element_ttl_minutes(),
            result_ttl_seconds: default_result_ttl_seconds(),
            prefetch_interval_minutes: default_prefetch_interval_minutes(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            minutes: default_minutes(),
            step_sec: default_step_sec(),
            hours: default_hours(),
            limit: default_limit(),
            min_el: default_min_el(),
            elev: default_elev(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
            limits: LimitsConfig::default(),
            satellites: default_satellites(),
            sources: default_sources(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the request handlers cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.satellites.is_empty() {
            anyhow::bail!("at least one [[satellites]] entry is required");
        }
        if self.sources.is_empty() {
            anyhow::bail!("at least one [[sources]] entry is required");
        }
        for (i, sat) in self.satellites.iter().enumerate() {
            if self.satellites[..i].iter().any(|other| other.key == sat.key) {
                anyhow::bail!("duplicate satellite key '{}'", sat.key);
            }
        }

        let limits = &self.limits;
        for (name, bounds) in [
            ("minutes", &limits.minutes),
            ("step_sec", &limits.step_sec),
            ("hours", &limits.hours),
            ("limit", &limits.limit),
        ] {
            if bounds.min < 1 || !bounds.is_consistent() {
                anyhow::bail!("limits.{} must satisfy 1 <= min <= default <= max", name);
            }
        }
        if !limits.min_el.is_consistent() || !limits.elev.is_consistent() {
            anyhow::bail!("limits.min_el and limits.elev must satisfy min <= default <= max");
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn satellite(&self, key: &str) -> Option<&SatelliteConfig> {
        self.satellites.iter().find(|sat| sat.key == key)
    }
}

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// The file was missing; built-in defaults are in effect
    Defaults(PathBuf),
}

/// Read `path`, falling back to the built-in defaults when it is missing.
///
/// Nothing is logged here: this runs before logging is initialised, so the
/// caller reports the origin once the subscriber is up.
pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<(AppConfig, ConfigOrigin)> {
    let path = path.as_ref();
    if path.exists() {
        Ok((AppConfig::from_file(path)?, ConfigOrigin::File(path.to_path_buf())))
    } else {
        Ok((AppConfig::default(), ConfigOrigin::Defaults(path.to_path_buf())))
    }
}

/// Load the configuration once for the whole process.
pub fn read_config(path: impl AsRef<Path>) -> anyhow::Result<(&'static AppConfig, ConfigOrigin)> {
    let (config, origin) = load_or_default(path)?;
    Ok((CONFIG.get_or_init(|| config), origin))
}
