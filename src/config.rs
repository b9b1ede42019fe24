//! Configuration file support for RBN Filter.
//!
//! Loads settings from `~/.config/rbn-filter/config.toml` on Linux
//! (or platform-appropriate location on other OSes). Command-line flags are
//! applied on top by the binary, then [`Config::validate`] runs once.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{FeedConfig, RBN_HOST, RBN_PORT_CW};
use crate::filter::{FilterConfig, Selector};
use crate::logging::DEFAULT_LOG_LEVEL;
use crate::membership::DEFAULT_MEMBER_QUERY;
use crate::qrz::QRZ_URL;
use crate::spot::{Band, Mode};

/// Placeholder call sign that must be replaced before connecting.
pub const PLACEHOLDER_CALLSIGN: &str = "N0CALL";

/// Filter criteria as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub bands: Vec<Band>,
    pub modes: Vec<Mode>,
    pub min_wpm: u16,
    pub max_wpm: u16,
    pub de_cq_zones: Selector<u8>,
    pub dx_cq_zones: Selector<u8>,
    pub de_itu_zones: Selector<u8>,
    pub dx_itu_zones: Selector<u8>,
    pub de_grids: Selector<String>,
    pub dx_grids: Selector<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        let defaults = FilterConfig::default();
        Self {
            bands: defaults.bands,
            modes: Mode::KNOWN.to_vec(),
            min_wpm: defaults.min_wpm,
            max_wpm: defaults.max_wpm,
            de_cq_zones: Selector::All,
            dx_cq_zones: Selector::All,
            de_itu_zones: Selector::All,
            dx_itu_zones: Selector::All,
            de_grids: Selector::All,
            dx_grids: Selector::All,
        }
    }
}

/// QRZ.com credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QrzConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub url: String,
}

impl Default for QrzConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            url: QRZ_URL.to_string(),
        }
    }
}

/// Local station store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store file; defaults to the platform data directory.
    pub path: Option<PathBuf>,

    /// Start from an empty store instead of the saved one.
    pub fresh: bool,
}

/// A SQLite database of club members.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteSource {
    pub path: PathBuf,

    #[serde(default = "default_member_query")]
    pub query: String,
}

fn default_member_query() -> String {
    DEFAULT_MEMBER_QUERY.to_string()
}

/// Friend and club list sources.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    pub files: Vec<PathBuf>,
    pub sqlite: Option<SqliteSource>,
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Callsign to use for RBN login.
    pub callsign: String,

    /// RBN server hostname.
    pub host: String,

    /// RBN server port.
    pub port: u16,

    /// Connection timeout in seconds.
    pub connect_timeout: u64,

    /// Seconds to wait for the login prompt.
    pub prompt_timeout: u64,

    /// Seconds to wait for the welcome banner.
    pub welcome_timeout: u64,

    /// Read timeout in seconds.
    pub read_timeout: u64,

    /// Seconds between reconnection attempts.
    pub reconnect_delay: u64,

    /// Whether to automatically reconnect on disconnect.
    pub reconnect: bool,

    /// Home latitude for distances.
    pub latitude: Option<f64>,

    /// Home longitude for distances.
    pub longitude: Option<f64>,

    pub log_level: String,

    /// Optional diagnostic log file.
    pub log_file: Option<PathBuf>,

    pub filter: FilterSettings,
    pub qrz: QrzConfig,
    pub cache: CacheConfig,
    pub membership: MembershipConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            callsign: PLACEHOLDER_CALLSIGN.to_string(),
            host: RBN_HOST.to_string(),
            port: RBN_PORT_CW,
            connect_timeout: 10,
            prompt_timeout: 30,
            welcome_timeout: 20,
            read_timeout: 300,
            reconnect_delay: 5,
            reconnect: true,
            latitude: None,
            longitude: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
            filter: FilterSettings::default(),
            qrz: QrzConfig::default(),
            cache: CacheConfig::default(),
            membership: MembershipConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rbn-filter/config.toml"))
    }

    /// Validate the settings and build the filter criteria.
    pub fn validate(&self) -> Result<FilterConfig> {
        let callsign = self.callsign.trim();
        if callsign.is_empty() || callsign.eq_ignore_ascii_case(PLACEHOLDER_CALLSIGN) {
            bail!("A call sign is required (set `callsign` or pass --callsign)");
        }
        if self.qrz.username.as_deref().is_none_or(str::is_empty)
            || self.qrz.password.as_deref().is_none_or(str::is_empty)
        {
            bail!("QRZ credentials are required (set [qrz] or QRZ_USERNAME/QRZ_PASSWORD)");
        }
        if let Some(lat) = self.latitude
            && !(-90.0..=90.0).contains(&lat)
        {
            bail!("latitude {} is outside -90..90", lat);
        }
        if let Some(lon) = self.longitude
            && !(-180.0..=180.0).contains(&lon)
        {
            bail!("longitude {} is outside -180..180", lon);
        }

        let f = &self.filter;
        FilterConfig {
            bands: f.bands.clone(),
            modes: f.modes.iter().copied().collect(),
            min_wpm: f.min_wpm,
            max_wpm: f.max_wpm,
            de_cq_zones: f.de_cq_zones.clone(),
            dx_cq_zones: f.dx_cq_zones.clone(),
            de_itu_zones: f.de_itu_zones.clone(),
            dx_itu_zones: f.dx_itu_zones.clone(),
            de_grids: f.de_grids.clone(),
            dx_grids: f.dx_grids.clone(),
            friends: Default::default(),
        }
        .validated()
        .map_err(|e| anyhow::anyhow!("Invalid filter: {}", e))
    }

    /// Home coordinates, when both are set.
    pub fn home(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Connection settings for the feed client.
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            host: self.host.clone(),
            port: self.port,
            callsign: self.callsign.trim().to_string(),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            prompt_timeout: Duration::from_secs(self.prompt_timeout),
            welcome_timeout: Duration::from_secs(self.welcome_timeout),
            read_timeout: Duration::from_secs(self.read_timeout),
            auto_reconnect: self.reconnect,
            reconnect_delay: Duration::from_secs(self.reconnect_delay),
        }
    }

    /// Station store location.
    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(path) => resolve_home_path(path),
            None => dirs::data_dir()
                .map(|p| p.join("rbn-filter/stations.jsonl"))
                .context("No data directory available for the station store"),
        }
    }

    /// Membership list files with relative paths resolved.
    pub fn membership_files(&self) -> Result<Vec<PathBuf>> {
        self.membership
            .files
            .iter()
            .map(|p| resolve_home_path(p))
            .collect()
    }

    /// The club database and its query, if configured.
    pub fn membership_database(&self) -> Result<Option<(PathBuf, String)>> {
        self.membership
            .sqlite
            .as_ref()
            .map(|db| Ok((resolve_home_path(&db.path)?, db.query.clone())))
            .transpose()
    }
}

/// Resolve `~/` and relative paths against the home directory.
pub fn resolve_home_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let home = dirs::home_dir().context("No home directory to resolve relative paths against")?;
    Ok(match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => home.join(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            callsign: "W1AW".to_string(),
            qrz: QrzConfig {
                username: Some("w1aw".to_string()),
                password: Some("secret".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.callsign, "N0CALL");
        assert_eq!(config.host, RBN_HOST);
        assert_eq!(config.port, RBN_PORT_CW);
        assert!(config.reconnect);
        assert_eq!(config.welcome_timeout, 20);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.filter.bands.len(), 11);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            callsign = "W6JSV"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.callsign, "W6JSV");
        // Other fields should use defaults
        assert_eq!(config.host, RBN_HOST);
        assert_eq!(config.port, RBN_PORT_CW);
        assert_eq!(config.qrz.url, QRZ_URL);
        assert!(config.filter.dx_cq_zones.is_all());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            callsign = "W6JSV"
            host = "custom.server.net"
            port = 7001
            connect_timeout = 60
            read_timeout = 180
            reconnect = false
            latitude = 41.7
            longitude = -72.7
            log_file = "rbn.log"

            [filter]
            bands = ["20m", "40m"]
            modes = ["CW"]
            min_wpm = 15
            max_wpm = 30
            dx_cq_zones = [3, 4, 5]
            de_grids = ["fn", "EN"]

            [qrz]
            username = "w6jsv"
            password = "hunter2"

            [cache]
            path = "/var/lib/rbn/stations.json"
            fresh = true

            [membership]
            files = ["clubs/licw.txt"]
            sqlite = { path = "SKCCData_DB.sql" }
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.host, "custom.server.net");
        assert_eq!(config.port, 7001);
        assert!(!config.reconnect);
        assert_eq!(config.home(), Some((41.7, -72.7)));
        assert_eq!(config.log_file, Some(PathBuf::from("rbn.log")));
        assert_eq!(config.filter.bands, vec![Band::M20, Band::M40]);
        assert_eq!(config.filter.modes, vec![Mode::Cw]);
        assert!(!config.filter.dx_cq_zones.is_all());
        assert!(config.cache.fresh);
        assert_eq!(
            config.cache_path().unwrap(),
            PathBuf::from("/var/lib/rbn/stations.json")
        );
        let sqlite = config.membership.sqlite.as_ref().unwrap();
        assert_eq!(sqlite.query, DEFAULT_MEMBER_QUERY);

        let filter = config.validate().unwrap();
        assert_eq!(filter.min_wpm, 15);
        assert!(filter.de_grids.matches(Some(&"FN".to_string())));
    }

    #[test]
    fn test_unknown_band_is_rejected() {
        let toml = r#"
            [filter]
            bands = ["21m"]
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_validate_requires_callsign() {
        let config = Config {
            callsign: "N0CALL".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_qrz_credentials() {
        let mut config = valid();
        config.qrz.password = None;
        assert!(config.validate().is_err());

        config.qrz.password = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = valid();
        config.latitude = Some(91.0);
        assert!(config.validate().is_err());

        let mut config = valid();
        config.filter.min_wpm = 40;
        config.filter.max_wpm = 20;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.filter.de_cq_zones = Selector::Only([41].into_iter().collect());
        assert!(config.validate().is_err());

        let mut config = valid();
        config.filter.dx_itu_zones = Selector::Only([90].into_iter().collect());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feed_config_conversion() {
        let feed = valid().feed_config();
        assert_eq!(feed.callsign, "W1AW");
        assert_eq!(feed.connect_timeout, Duration::from_secs(10));
        assert_eq!(feed.welcome_timeout, Duration::from_secs(20));
        assert!(feed.auto_reconnect);
    }

    #[test]
    fn test_resolve_home_path() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            resolve_home_path(Path::new("clubs/licw.txt")).unwrap(),
            home.join("clubs/licw.txt")
        );
        assert_eq!(
            resolve_home_path(Path::new("~/stations.json")).unwrap(),
            home.join("stations.json")
        );
        assert_eq!(
            resolve_home_path(Path::new("/tmp/x.txt")).unwrap(),
            PathBuf::from("/tmp/x.txt")
        );
    }

    #[test]
    fn test_modes_any_case() {
        let config: Config = toml::from_str(
            r#"
            [filter]
            modes = ["cw", "Rtty", "FT8"]
            "#,
        )
        .unwrap();
        assert_eq!(config.filter.modes, vec![Mode::Cw, Mode::Rtty, Mode::Ft8]);
        assert!(toml::from_str::<Config>("[filter]\nmodes = [\"jt65\"]").is_err());
    }
}
