use serde::{Deserialize, Serialize};

use crate::error::{DispenserError, Result};

pub type EntryId = String;
pub type MessageId = u64;

const SECS_PER_HOUR: f64 = 3600.0;

/// One generated address under management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailEntry {
    pub address: String,
    pub created_at: i64,         // epoch seconds
    pub expires_at: Option<i64>, // None = manual deletion only
    #[serde(default)]
    pub message_count: u32,
}

impl EmailEntry {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 4] = [
        TimeUnit::Minutes,
        TimeUnit::Hours,
        TimeUnit::Days,
        TimeUnit::Weeks,
    ];

    pub fn hours_per_unit(self) -> f64 {
        match self {
            TimeUnit::Minutes => 1.0 / 60.0,
            TimeUnit::Hours => 1.0,
            TimeUnit::Days => 24.0,
            TimeUnit::Weeks => 168.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
            TimeUnit::Weeks => "weeks",
        }
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = DispenserError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "min" | "mins" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hour" | "hours" => Ok(TimeUnit::Hours),
            "d" | "day" | "days" => Ok(TimeUnit::Days),
            "w" | "week" | "weeks" => Ok(TimeUnit::Weeks),
            other => Err(DispenserError::InvalidPolicy(format!(
                "unknown time unit '{other}'"
            ))),
        }
    }
}

/// Expiration choice made when an address is committed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExpirationPolicy {
    Never,
    Hours(f64),
    Custom { magnitude: f64, unit: TimeUnit },
}

impl ExpirationPolicy {
    /// Preset durations offered by the policy dialog, in hours.
    pub const PRESET_HOURS: [f64; 6] = [1.0, 6.0, 12.0, 24.0, 72.0, 168.0];

    /// Parses a user-entered custom magnitude.
    pub fn custom(magnitude: &str, unit: TimeUnit) -> Result<Self> {
        let magnitude: f64 = magnitude.trim().parse().map_err(|_| {
            DispenserError::InvalidPolicy(format!("'{}' is not a number", magnitude.trim()))
        })?;
        let policy = ExpirationPolicy::Custom { magnitude, unit };
        policy.lifetime_secs()?;
        Ok(policy)
    }

    /// Policy for a configured default, where 0 hours means never.
    pub fn from_default_hours(hours: f64) -> Self {
        if hours == 0.0 {
            ExpirationPolicy::Never
        } else {
            ExpirationPolicy::Hours(hours)
        }
    }

    /// Lifetime in whole seconds, `None` for never.
    pub fn lifetime_secs(&self) -> Result<Option<i64>> {
        let hours = match *self {
            ExpirationPolicy::Never => return Ok(None),
            ExpirationPolicy::Hours(h) => h,
            ExpirationPolicy::Custom { magnitude, unit } => magnitude * unit.hours_per_unit(),
        };
        if !hours.is_finite() || hours <= 0.0 {
            return Err(DispenserError::InvalidPolicy(format!(
                "duration must be a positive number, got {hours}"
            )));
        }
        let secs = (hours * SECS_PER_HOUR).round();
        if secs < 1.0 {
            return Err(DispenserError::InvalidPolicy(
                "duration must be at least one second".into(),
            ));
        }
        if secs > i64::MAX as f64 / 2.0 {
            return Err(DispenserError::InvalidPolicy("duration is too large".into()));
        }
        Ok(Some(secs as i64))
    }

    /// Absolute expiry stamp for an entry committed at `now`.
    pub fn expires_at(&self, now: i64) -> Result<Option<i64>> {
        Ok(self.lifetime_secs()?.map(|secs| now.saturating_add(secs)))
    }
}

/// Time left before an entry expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Infinite,
    /// May be zero or negative: expired but not yet swept.
    Seconds(i64),
}

impl Remaining {
    pub fn is_expired(&self) -> bool {
        matches!(self, Remaining::Seconds(s) if *s <= 0)
    }

    pub fn as_hours(&self) -> Option<f64> {
        match self {
            Remaining::Infinite => None,
            Remaining::Seconds(s) => Some(*s as f64 / SECS_PER_HOUR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: MessageId,
    pub from: String,
    pub subject: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub from: String,
    pub subject: String,
    pub date: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub text_body: Option<String>,
    #[serde(default)]
    pub html_body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            id: self.id,
            from: self.from.clone(),
            subject: self.subject.clone(),
            date: self.date.clone(),
        }
    }
}

/// An (address, message) pair a notification click routes back to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpenTarget {
    pub address: String,
    pub message_id: MessageId,
}

impl OpenTarget {
    /// Parses the `address#id` form used on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        let (address, id) = s.rsplit_once('#')?;
        if address.is_empty() {
            return None;
        }
        Some(Self {
            address: address.to_string(),
            message_id: id.parse().ok()?,
        })
    }
}

impl std::fmt::Display for OpenTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.address, self.message_id)
    }
}
