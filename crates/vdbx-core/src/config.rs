//! Engine configuration shared by every execution context
//!
//! Values come from YAML and can be overridden through `VDBX_*` environment
//! variables.

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ContextError, EngineError};

pub const ENV_BATCH_SIZE: &str = "VDBX_PROCESSOR_BATCH_SIZE";
pub const ENV_TIME_ZONE: &str = "VDBX_SERVER_TIME_ZONE";

pub const DEFAULT_BATCH_SIZE: usize = 256;

static PROCESS_TIME_ZONE: Lazy<ServerTimeZone> = Lazy::new(|| {
    std::env::var(ENV_TIME_ZONE)
        .ok()
        .and_then(|id| match ServerTimeZone::parse(&id) {
            Ok(tz) => Some(tz),
            Err(err) => {
                tracing::warn!(%err, "ignoring {}", ENV_TIME_ZONE);
                None
            }
        })
        .unwrap_or_else(ServerTimeZone::local)
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    /// IANA region such as `Europe/Berlin`
    Region(Tz),
    Fixed(FixedOffset),
    /// Host zone, resolved at each instant
    Local,
}

/// Time zone the server evaluates date/time functions in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerTimeZone {
    id: String,
    zone: Zone,
}

impl ServerTimeZone {
    pub fn utc() -> Self {
        Self {
            id: "UTC".to_string(),
            zone: Zone::Fixed(Utc.fix()),
        }
    }

    /// The host zone, following its daylight saving changes
    pub fn local() -> Self {
        Self {
            id: "local".to_string(),
            zone: Zone::Local,
        }
    }

    /// Process-wide default, `VDBX_SERVER_TIME_ZONE` or the host zone
    pub fn process_default() -> Self {
        PROCESS_TIME_ZONE.clone()
    }

    /// Accepts `UTC`, `GMT`, `Z`, `local`, IANA region ids such as
    /// `America/New_York`, and offsets such as `+02:00`, `-0530`, `UTC+3`.
    pub fn parse(id: &str) -> Result<Self, ContextError> {
        let trimmed = id.trim();
        let invalid = || ContextError::InvalidTimeZone(id.to_string());

        let upper = trimmed.to_ascii_uppercase();
        match upper.as_str() {
            "UTC" | "GMT" | "Z" => {
                return Ok(Self {
                    id: upper.clone(),
                    zone: Zone::Fixed(Utc.fix()),
                })
            }
            "LOCAL" => return Ok(Self::local()),
            _ => {}
        }

        if let Ok(tz) = trimmed.parse::<Tz>() {
            return Ok(Self {
                id: trimmed.to_string(),
                zone: Zone::Region(tz),
            });
        }

        let offset = parse_offset(&upper).ok_or_else(invalid)?;
        Ok(Self {
            id: trimmed.to_string(),
            zone: Zone::Fixed(offset),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Offset from UTC in effect at `instant`
    pub fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        let naive = instant.naive_utc();
        match self.zone {
            Zone::Region(tz) => tz.offset_from_utc_datetime(&naive).fix(),
            Zone::Fixed(offset) => offset,
            Zone::Local => Local.offset_from_utc_datetime(&naive).fix(),
        }
    }

    pub fn current_offset(&self) -> FixedOffset {
        self.offset_at(Utc::now())
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.to_server_time(Utc::now())
    }

    pub fn to_server_time(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset_at(instant))
    }
}

/// `+hh:mm`, `-hhmm`, `+h`, optionally after a `UTC`/`GMT` prefix
fn parse_offset(upper: &str) -> Option<FixedOffset> {
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(upper);

    let (sign, digits) = match rest.as_bytes().first() {
        Some(b'+') => (1, &rest[1..]),
        Some(b'-') => (-1, &rest[1..]),
        _ => return None,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }

    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 18 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl Default for ServerTimeZone {
    fn default() -> Self {
        Self::process_default()
    }
}

impl fmt::Display for ServerTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl TryFrom<String> for ServerTimeZone {
    type Error = ContextError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::parse(&id)
    }
}

impl From<ServerTimeZone> for String {
    fn from(tz: ServerTimeZone) -> Self {
        tz.id
    }
}

/// Settings applied to every context the request layer builds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nominal target rows per batch
    pub processor_batch_size: usize,

    /// Zone id; the process default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time_zone: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            processor_batch_size: DEFAULT_BATCH_SIZE,
            server_time_zone: None,
        }
    }
}

impl EngineConfig {
    /// Load config from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, EngineError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, EngineError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `VDBX_*` overrides looked up through `lookup`
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            self.processor_batch_size = raw
                .trim()
                .parse()
                .map_err(|_| EngineError::Config(format!("{} is not a number: {:?}", ENV_BATCH_SIZE, raw)))?;
        }
        if let Some(raw) = lookup(ENV_TIME_ZONE) {
            self.server_time_zone = Some(raw);
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.processor_batch_size == 0 {
            return Err(ContextError::InvalidBatchSize(0).into());
        }
        self.time_zone()?;
        Ok(())
    }

    pub fn time_zone(&self) -> Result<ServerTimeZone, ContextError> {
        match &self.server_time_zone {
            Some(id) => ServerTimeZone::parse(id),
            None => Ok(ServerTimeZone::process_default()),
        }
    }
}
