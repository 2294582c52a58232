use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::AppError;

/// Pool record as stored by the Pool API. The password is write-only and never
/// comes back, so it has no field here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub name: String,
    #[serde(default)]
    pub creator_address: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub usage_cap: f64,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub sponsor_info: String,
    /// Server-maintained ledger; values arrive as numbers or numeric strings.
    #[serde(default)]
    pub usage: BTreeMap<String, serde_json::Value>,
}

impl Pool {
    pub fn status_at(&self, now: DateTime<Utc>) -> PoolStatus {
        if now > self.end_time {
            PoolStatus::Ended
        } else {
            PoolStatus::Active
        }
    }

    pub fn status(&self) -> PoolStatus {
        self.status_at(Utc::now())
    }

    pub fn total_usage(&self) -> f64 {
        self.usage.values().map(usage_amount).sum()
    }
}

fn usage_amount(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolStatus {
    Active,
    Ended,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolStatus::Active => f.write_str("Active"),
            PoolStatus::Ended => f.write_str("Ended"),
        }
    }
}

/// Pool password. Kept out of `Debug` output so it never reaches the logs.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PoolPassword(String);

impl PoolPassword {
    /// Empty or whitespace-only input yields `None`.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PoolPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PoolPassword(***)")
    }
}

/// Body of `POST /create-pool`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    pub name: String,
    pub password: PoolPassword,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub usage_cap: f64,
    pub whitelist: Vec<String>,
    pub creator_address: String,
    pub sponsor_info: String,
}

/// Sparse body of `PATCH /pool/{id}/edit`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor_info: Option<String>,
}

impl PoolUpdate {
    pub fn is_empty(&self) -> bool {
        *self == PoolUpdate::default()
    }

    /// Apply the patch to a cached record, mirroring what the server does.
    pub fn apply_to(&self, pool: &Pool) -> Pool {
        let mut next = pool.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(start) = self.start_time {
            next.start_time = start;
        }
        if let Some(end) = self.end_time {
            next.end_time = end;
        }
        if let Some(cap) = self.usage_cap {
            next.usage_cap = cap;
        }
        if let Some(whitelist) = &self.whitelist {
            next.whitelist = whitelist.clone();
        }
        if let Some(info) = &self.sponsor_info {
            next.sponsor_info = info.clone();
        }
        next
    }
}

/// A pool plus the data fetched alongside it for display.
#[derive(Debug, Clone, Serialize)]
pub struct PoolCard {
    pub id: String,
    pub pool: Pool,
    pub balance: f64,
    pub status: PoolStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolOverview {
    pub pools: Vec<PoolCard>,
    pub total: usize,
    pub active: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolDetails {
    pub id: String,
    pub pool: Pool,
    pub balance: f64,
    pub status: PoolStatus,
    pub total_usage: f64,
}

/// Pool listed to a prospective member. The server only promises a name and
/// sponsor details here; the time window is shown when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePool {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sponsor_info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailablePoolCard {
    pub id: String,
    #[serde(flatten)]
    pub pool: AvailablePool,
}

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse an instant typed by the user. RFC 3339 input keeps its offset; a bare
/// `datetime-local` style value is read in the local timezone.
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>, AppError> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| {
                    AppError::Validation(format!("'{input}' does not exist in the local timezone"))
                });
        }
    }
    Err(AppError::Validation(format!("Invalid date/time: '{input}'")))
}

/// Render an instant for humans, in local time.
pub fn format_display_time(instant: &DateTime<Utc>) -> String {
    instant
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}
