use crate::date::WeekStart;
use crate::errors::Error;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_PATH: &str = "data/checkin.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Local {
        data_path: PathBuf,
    },
    Remote {
        url: String,
        api_key: String,
        session_path: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub backend: BackendConfig,
    pub week_start: WeekStart,
    pub seed_sample_data: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("PORT must be a port number, got '{value}'")))?,
            None => DEFAULT_PORT,
        };

        let backend = match var("APP_BACKEND").as_deref().map(str::trim) {
            None | Some("local") => BackendConfig::Local {
                data_path: resolve_data_path(var("APP_DATA_PATH")),
            },
            Some("remote") => BackendConfig::Remote {
                url: var("APP_REMOTE_URL")
                    .map(|url| url.trim().trim_end_matches('/').to_string())
                    .ok_or_else(|| Error::Config("APP_REMOTE_URL is required".into()))?,
                api_key: var("APP_REMOTE_KEY")
                    .ok_or_else(|| Error::Config("APP_REMOTE_KEY is required".into()))?,
                session_path: var("APP_SESSION_PATH").map(PathBuf::from),
            },
            Some(other) => {
                return Err(Error::Config(format!(
                    "APP_BACKEND must be 'local' or 'remote', got '{other}'"
                )));
            }
        };

        let week_start = match var("APP_WEEK_START") {
            Some(value) => value.parse()?,
            None => WeekStart::default(),
        };

        let seed_sample_data = match var("APP_SEED_SAMPLE_DATA") {
            Some(value) => parse_flag("APP_SEED_SAMPLE_DATA", &value)?,
            None => false,
        };

        Ok(Self {
            port,
            backend,
            week_start,
            seed_sample_data,
        })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.backend, BackendConfig::Remote { .. })
    }
}

pub fn resolve_data_path(value: Option<String>) -> PathBuf {
    match value {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(DEFAULT_DATA_PATH),
    }
}

/// Log filter from `RUST_LOG`, or `info` when it is unset or unparsable.
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key} must be true or false, got '{value}'"))),
    }
}
