use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::RefreshError;

/// Element id the station page reserves for the weather image.
pub const DEFAULT_ELEMENT_ID: &str = "weatherImage";

/// Refresh interval used when none is configured.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;

/// Station token taken from the page address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    /// Take the last `/`-delimited segment of `address`, verbatim.
    ///
    /// Nothing is validated or stripped: `http://host/view/station42/` yields
    /// an empty id and a trailing query string stays part of the token.
    pub fn from_address(address: &str) -> Self {
        let segment = match address.rfind('/') {
            Some(idx) => &address[idx + 1..],
            None => address,
        };
        StationId(segment.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Station-scoped image URL carrying a throwaway `rand` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshUrl {
    station_id: StationId,
    rand: u64,
}

impl RefreshUrl {
    pub fn new(station_id: StationId, rand: u64) -> Self {
        RefreshUrl { station_id, rand }
    }

    pub fn station_id(&self) -> &StationId {
        &self.station_id
    }

    /// Path part shared by every URL of a station, up to and including `rand=`.
    pub fn prefix(station_id: &StationId) -> String {
        format!("/station/{}?rand=", station_id)
    }
}

impl fmt::Display for RefreshUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::prefix(&self.station_id), self.rand)
    }
}

/// How the `rand` parameter is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheBusting {
    /// Random value per assignment
    #[default]
    Random,
    /// Monotonic counter, deterministic across runs
    Counter,
}

/// Refresher configuration, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefresherConfig {
    pub element_id: String,
    /// Delay between refresh ticks in milliseconds
    pub refresh_interval_ms: u64,
    pub cache_busting: CacheBusting,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        RefresherConfig {
            element_id: DEFAULT_ELEMENT_ID.to_string(),
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            cache_busting: CacheBusting::default(),
        }
    }
}

impl RefresherConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn validate(&self) -> Result<(), RefreshError> {
        if self.element_id.is_empty() {
            return Err(RefreshError::EmptyElementId);
        }
        if self.refresh_interval_ms == 0 {
            return Err(RefreshError::InvalidInterval {
                interval_ms: self.refresh_interval_ms,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefresherPhase {
    /// Initial source assigned, no tick yet
    Initialized,
    Ticking,
    Stopped,
}

/// Point-in-time view of a refresher, served by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefresherSnapshot {
    pub station_id: StationId,
    pub element_id: String,
    pub element_found: bool,
    pub phase: RefresherPhase,
    pub running: bool,
    pub tick_count: u64,
    pub current_source: Option<String>,
    pub refresh_interval_ms: u64,
}
