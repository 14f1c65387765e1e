extern crate anyhow;
extern crate chrono_tz;
extern crate serde;
extern crate serde_json;
extern crate serde_with;

use anyhow::Context;
use crate::result;
use serde_with::{DisplayFromStr, DurationMilliSeconds, serde_as};

pub const DEFAULT_LIMIT: usize = 8;

const DEFAULT_UPDATE_INTERVAL_MS: u64 = 20 * 1000;
const DEFAULT_STATUS_UPDATE_INTERVAL_MS: u64 = 60 * 60 * 1000;

const TFL_API_BASE: &str = "https://api.tfl.gov.uk";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    All,
    Inbound,
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Direction::All => write!(f, "all"),
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> result::TubeTimesResult<Direction> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Direction::All),
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            other => Err(result::make_error(&format!(
                "Invalid direction '{}', expected all|inbound|outbound", other))),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub title: String,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub update_interval: std::time::Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub status_update_interval: std::time::Duration,

    // Comma-joined for several lines, e.g. "central,piccadilly".
    pub line_id: String,
    pub stop_point_id: String,
    pub direction: Direction,

    // Kept signed so that a bad value in the file survives parsing and gets coerced.
    pub limit: Option<i64>,

    #[serde_as(as = "DisplayFromStr")]
    pub timezone: chrono_tz::Tz,
}

impl Default for Config {
    fn default() -> Config {
        return Config{
            title: "Tube Times".to_string(),
            update_interval: std::time::Duration::from_millis(DEFAULT_UPDATE_INTERVAL_MS),
            status_update_interval: std::time::Duration::from_millis(DEFAULT_STATUS_UPDATE_INTERVAL_MS),
            line_id: "central".to_string(),
            stop_point_id: "940GZZLUOXC".to_string(),
            direction: Direction::All,
            limit: Some(DEFAULT_LIMIT as i64),
            timezone: chrono_tz::Europe::London,
        };
    }
}

impl Config {
    /// The number of arrivals to show. Non-positive or missing limits fall back to the default.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(limit) if limit >= 1 => limit as usize,
            _ => DEFAULT_LIMIT,
        }
    }

    /// Rewrites `limit` in place so later readers never see an invalid value.
    pub fn coerce_limit(&mut self) {
        let limit = self.effective_limit();
        if self.limit != Some(limit as i64) {
            warn!("Invalid limit {:?}, falling back to {}", self.limit, limit);
            self.limit = Some(limit as i64);
        }
    }

    /// A zero interval would make the timers spin, so it is replaced by the default.
    pub fn coerce_intervals(&mut self) {
        if self.update_interval.as_millis() == 0 {
            warn!("Invalid updateInterval {:?}, falling back to {}ms",
                  self.update_interval, DEFAULT_UPDATE_INTERVAL_MS);
            self.update_interval = std::time::Duration::from_millis(DEFAULT_UPDATE_INTERVAL_MS);
        }
        if self.status_update_interval.as_millis() == 0 {
            warn!("Invalid statusUpdateInterval {:?}, falling back to {}ms",
                  self.status_update_interval, DEFAULT_STATUS_UPDATE_INTERVAL_MS);
            self.status_update_interval = std::time::Duration::from_millis(DEFAULT_STATUS_UPDATE_INTERVAL_MS);
        }
    }

    pub fn arrivals_url(&self) -> String {
        return format!("{}/Line/{}/Arrivals/{}?direction={}",
                       TFL_API_BASE, self.line_id, self.stop_point_id, self.direction);
    }

    pub fn status_url(&self) -> String {
        return format!("{}/Line/{}/Status", TFL_API_BASE, self.line_id);
    }
}

pub fn config_from_str(raw_json: &str) -> result::TubeTimesResult<Config> {
    let config: Config = serde_json::from_str(raw_json)
        .with_context(|| format!("while parsing config"))?;
    return Ok(config);
}

pub fn config_from_file<P: AsRef<std::path::Path>>(path: P) -> result::TubeTimesResult<Config> {
    let debug_path = path.as_ref().to_str().map(|x| x.to_string());
    let raw_json = std::fs::read_to_string(path)
        .with_context(|| format!("Opening config from '{:?}'", debug_path))?;
    return config_from_str(&raw_json);
}
