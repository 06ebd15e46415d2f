//! Configuration management for the stampit service
use std::net::IpAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use serde::Deserialize;
use url::Url;

use crate::config::error::StampitConfigError;
use crate::config::serialization::duration_seconds_deserializer;
use crate::config::serialization::url_deserializer_option;
use crate::config::serialization::url_deserializer_vec;

mod error;
mod serialization;

pub use error::StampitConfigError as Error;

/// The configuration compiled into the binary. Files and the environment
/// are layered on top of it.
pub const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// Trait for validating configuration values.
trait Validatable {
    /// Validate the configuration values.
    fn validate(&self, cfg: &Settings) -> Result<(), ConfigError>;
}

/// Top-level configuration for the service
#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Calendar submission configuration
    pub stamp: StampConfig,
    /// Per-client request limits for stamping
    pub rate_limit: RateLimitConfig,
    /// Ledger file locations
    pub ledger: LedgerConfig,
    /// Block header sources
    pub bitcoin: BitcoinConfig,
    /// Widget embedding origins
    pub cors: CorsConfig,
}

/// HTTP server configuration
#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind
    pub host: IpAddr,
    /// Port to bind
    pub port: u16,
}

/// Calendar submission configuration
#[derive(Deserialize, Clone, Debug)]
pub struct StampConfig {
    /// Calendars digests are submitted to. Also the whitelist of calendars
    /// contacted when upgrading receipts.
    #[serde(deserialize_with = "url_deserializer_vec")]
    pub calendars: Vec<Url>,
    /// The number of calendars that must accept a digest.
    pub min_calendar_responses: usize,
    /// Timeout of a single calendar request.
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub timeout: Duration,
}

impl Validatable for StampConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if self.calendars.is_empty() {
            return Err(ConfigError::Message(StampitConfigError::NoCalendars.to_string()));
        }
        if self.min_calendar_responses == 0 || self.min_calendar_responses > self.calendars.len() {
            let err = StampitConfigError::MinResponsesOutOfRange(
                self.min_calendar_responses,
                self.calendars.len(),
            );
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.timeout.is_zero() {
            let err = StampitConfigError::ZeroDurationForbidden("stamp.timeout");
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// Per-client request limits for stamping
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Length of the long window
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub window: Duration,
    /// Requests allowed in the long window
    pub window_limit: usize,
    /// Length of the burst window
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub burst_window: Duration,
    /// Requests allowed in the burst window
    pub burst_limit: usize,
}

impl Validatable for RateLimitConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        let durations = [
            ("rate_limit.window", self.window),
            ("rate_limit.burst_window", self.burst_window),
        ];
        for (name, duration) in durations {
            if duration.is_zero() {
                let err = StampitConfigError::ZeroDurationForbidden(name);
                return Err(ConfigError::Message(err.to_string()));
            }
        }

        let limits = [
            ("rate_limit.window_limit", self.window_limit),
            ("rate_limit.burst_limit", self.burst_limit),
        ];
        for (name, limit) in limits {
            if limit == 0 {
                let err = StampitConfigError::ZeroLimitForbidden(name);
                return Err(ConfigError::Message(err.to_string()));
            }
        }
        Ok(())
    }
}

/// Ledger file locations
#[derive(Deserialize, Clone, Debug)]
pub struct LedgerConfig {
    /// The ledger JSON file
    pub path: PathBuf,
    /// Directory receipt URLs are resolved against
    pub public_dir: PathBuf,
    /// Directory receipts created through the API are stored in
    pub receipts_dir: PathBuf,
}

/// Block header sources
#[derive(Deserialize, Clone, Debug)]
pub struct BitcoinConfig {
    /// Esplora API base URL
    #[serde(default, deserialize_with = "url_deserializer_option")]
    pub esplora_url: Option<Url>,
    /// Bitcoin-core RPC endpoint, credentials included
    #[serde(default, deserialize_with = "url_deserializer_option")]
    pub rpc_endpoint: Option<Url>,
    /// Timeout of a single header request
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub timeout: Duration,
}

impl Validatable for BitcoinConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if self.esplora_url.is_some() && self.rpc_endpoint.is_some() {
            let err = StampitConfigError::ConflictingHeaderSources;
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.timeout.is_zero() {
            let err = StampitConfigError::ZeroDurationForbidden("bitcoin.timeout");
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// Widget embedding origins
#[derive(Deserialize, Clone, Debug)]
pub struct CorsConfig {
    /// Origins allowed to call the API from a browser
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    /// Check a single origin: https, a host, nothing else.
    pub fn validate_origin(origin: &str) -> Result<(), StampitConfigError> {
        if origin.contains('*') {
            return Err(StampitConfigError::WildcardOrigin);
        }

        let url = Url::parse(origin)?;
        if url.scheme() != "https" {
            return Err(StampitConfigError::InsecureOrigin(origin.to_string()));
        }

        let bare = url.host_str().is_some()
            && url.username().is_empty()
            && url.password().is_none()
            && url.query().is_none()
            && url.fragment().is_none()
            && url.path() == "/"
            && !origin.ends_with('/');
        if !bare {
            return Err(StampitConfigError::OriginNotBare(origin.to_string()));
        }
        Ok(())
    }
}

impl Validatable for CorsConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        for origin in &self.allowed_origins {
            Self::validate_origin(origin).map_err(|err| ConfigError::Message(err.to_string()))?;
        }
        Ok(())
    }
}

impl Settings {
    /// Initializing the global config first with the compiled in defaults,
    /// then with the optional config file and finally with the environment.
    ///
    /// The environment variables are prefixed with `STAMPIT_` and the nested
    /// fields are separated with double underscores. For example, the path
    /// `stamp.min_calendar_responses` is parsed as following:
    ///
    /// ```text
    /// STAMPIT_STAMP__MIN_CALENDAR_RESPONSES
    /// ^^^^^^^ ^^^^^  ^^^^^^^^^^^^^^^^^^^^^^
    ///    │   ^  │  ^^          │
    ///    │   │  │  │           └ The `min_calendar_responses` field of `stamp`
    ///    │   │  │  └ separator("__")
    ///    │   │  └ The `stamp` field of the root object (`Settings`)
    ///    │   └ prefix_separator("_")
    ///    └ with_prefix("STAMPIT")
    /// ```
    pub fn new(config_path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        let env = Environment::with_prefix("STAMPIT")
            .separator("__")
            .list_separator(",")
            .try_parsing(true)
            .with_list_parse_key("stamp.calendars")
            .with_list_parse_key("cors.allowed_origins")
            .prefix_separator("_");

        let mut cfg_builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(path) = config_path {
            cfg_builder = cfg_builder.add_source(File::from(path.as_ref()));
        }
        cfg_builder = cfg_builder.add_source(env);

        let cfg = cfg_builder.build()?;

        let settings: Settings = cfg.try_deserialize()?;

        settings.validate()?;

        Ok(settings)
    }

    /// Perform validation on the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.stamp.validate(self)?;
        self.rate_limit.validate(self)?;
        self.bitcoin.validate(self)?;
        self.cors.validate(self)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use test_case::test_case;

    use super::*;
    use crate::testing::clear_env;

    fn settings_from_toml(contents: &str) -> Result<Settings, ConfigError> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        Settings::new(Some(file.path()))
    }

    #[test]
    fn default_config_toml_loads() {
        clear_env();

        let settings = Settings::new_from_default_config().unwrap();

        assert_eq!(settings.stamp.calendars.len(), 5);
        assert_eq!(settings.stamp.min_calendar_responses, 2);
        assert_eq!(
            settings.rate_limit,
            RateLimitConfig {
                window: Duration::from_secs(60),
                window_limit: 60,
                burst_window: Duration::from_secs(10),
                burst_limit: 15,
            }
        );
        assert_eq!(settings.ledger.path, PathBuf::from("./data/ledger.json"));
        assert!(settings.bitcoin.esplora_url.is_none());
        assert!(settings.cors.allowed_origins.is_empty());
    }

    #[test]
    fn environment_overrides_defaults() {
        clear_env();

        std::env::set_var("STAMPIT_SERVER__PORT", "8080");
        std::env::set_var(
            "STAMPIT_STAMP__CALENDARS",
            "https://a.pool.opentimestamps.org,https://b.pool.opentimestamps.org",
        );
        std::env::set_var("STAMPIT_BITCOIN__ESPLORA_URL", "https://blockstream.info/api/");

        let settings = Settings::new_from_default_config();
        clear_env();
        let settings = settings.unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(
            settings.stamp.calendars,
            vec![
                Url::parse("https://a.pool.opentimestamps.org").unwrap(),
                Url::parse("https://b.pool.opentimestamps.org").unwrap(),
            ]
        );
        assert_eq!(
            settings.bitcoin.esplora_url,
            Some(Url::parse("https://blockstream.info/api/").unwrap())
        );
    }

    #[test]
    fn file_overrides_defaults() {
        let settings = settings_from_toml(
            r#"
            [ledger]
            path = "/srv/ledger.json"
            public_dir = "/srv/public"
            receipts_dir = "/srv/receipts"

            [cors]
            allowed_origins = ["https://widget.example.org"]
            "#,
        )
        .unwrap();

        assert_eq!(settings.ledger.public_dir, PathBuf::from("/srv/public"));
        assert_eq!(settings.cors.allowed_origins, vec!["https://widget.example.org"]);
    }

    #[test_case("[stamp]\nmin_calendar_responses = 0"; "no calendar responses required")]
    #[test_case("[stamp]\nmin_calendar_responses = 6"; "more responses than calendars")]
    #[test_case("[stamp]\ncalendars = []"; "no calendars")]
    #[test_case("[stamp]\ntimeout = 0"; "zero stamp timeout")]
    #[test_case("[rate_limit]\nburst_limit = 0"; "zero burst limit")]
    #[test_case("[rate_limit]\nwindow = 0"; "zero window")]
    #[test_case("[cors]\nallowed_origins = [\"*\"]"; "wildcard origin")]
    #[test_case("[cors]\nallowed_origins = [\"http://widget.example.org\"]"; "insecure origin")]
    #[test_case("[bitcoin]\nesplora_url = \"https://blockstream.info/api/\"\nrpc_endpoint = \"http://u:p@localhost:8332\""; "two header sources")]
    fn invalid_config_is_rejected(contents: &str) {
        assert!(matches!(settings_from_toml(contents), Err(ConfigError::Message(_))));
    }

    #[test_case("https://widget.example.org" => true; "bare https origin")]
    #[test_case("https://widget.example.org:8443" => true; "origin with port")]
    #[test_case("https://widget.example.org/" => false; "trailing slash")]
    #[test_case("https://widget.example.org/embed" => false; "path")]
    #[test_case("https://*.example.org" => false; "wildcard subdomain")]
    #[test_case("http://widget.example.org" => false; "plain http")]
    #[test_case("widget.example.org" => false; "no scheme")]
    fn origin_validation(origin: &str) -> bool {
        CorsConfig::validate_origin(origin).is_ok()
    }
}
