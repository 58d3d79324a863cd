use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vehicle/user id that owns a record; the only fan-out key
pub type OwnerId = i64;

/// Identifier assigned by the store on commit
pub type RecordId = i64;

/// Errors raised while turning raw bytes into a valid record
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Unknown road state: {0}")]
    UnknownRoadState(String),
}

/// Road surface classification produced upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoadState {
    Normal,
    Pothole,
    Bump,
}

impl RoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoadState::Normal => "normal",
            RoadState::Pothole => "pothole",
            RoadState::Bump => "bump",
        }
    }
}

impl fmt::Display for RoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoadState {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(RoadState::Normal),
            "pothole" => Ok(RoadState::Pothole),
            "bump" => Ok(RoadState::Bump),
            other => Err(RecordError::UnknownRoadState(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accelerometer {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gps {
    pub latitude: f64,
    pub longitude: f64,
}

/// Raw sample as aggregated by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentData {
    pub user_id: OwnerId,
    pub accelerometer: Accelerometer,
    pub gps: Gps,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Classified telemetry unit carried through the whole pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub road_state: RoadState,
    pub agent_data: AgentData,
}

impl Record {
    pub fn new(
        road_state: RoadState,
        user_id: OwnerId,
        accelerometer: Accelerometer,
        gps: Gps,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            road_state,
            agent_data: AgentData {
                user_id,
                accelerometer,
                gps,
                timestamp,
            },
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.agent_data.user_id
    }

    /// Check coordinate ranges
    pub fn validate(&self) -> Result<(), RecordError> {
        let Gps {
            latitude,
            longitude,
        } = self.agent_data.gps;

        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(RecordError::OutOfRange {
                field: "latitude",
                value: latitude,
            });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(RecordError::OutOfRange {
                field: "longitude",
                value: longitude,
            });
        }
        Ok(())
    }

    /// Deserialize and validate a payload
    pub fn parse(bytes: &[u8]) -> Result<Self, RecordError> {
        let record: Record = serde_json::from_slice(bytes)?;
        record.validate()?;
        Ok(record)
    }

    pub fn from_entry(entry: &QueueEntry) -> Result<Self, RecordError> {
        Self::parse(entry.as_str().as_bytes())
    }

    pub fn to_entry(&self) -> Result<QueueEntry, RecordError> {
        Ok(QueueEntry(serde_json::to_string(self)?))
    }
}

/// A record after the store committed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: RecordId,
    pub road_state: RoadState,
    pub user_id: OwnerId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn from_record(id: RecordId, record: &Record) -> Self {
        let data = &record.agent_data;
        Self {
            id,
            road_state: record.road_state,
            user_id: data.user_id,
            x: data.accelerometer.x,
            y: data.accelerometer.y,
            z: data.accelerometer.z,
            latitude: data.gps.latitude,
            longitude: data.gps.longitude,
            timestamp: data.timestamp,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.user_id
    }

    pub fn to_record(&self) -> Record {
        Record::new(
            self.road_state,
            self.user_id,
            Accelerometer {
                x: self.x,
                y: self.y,
                z: self.z,
            },
            Gps {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            self.timestamp,
        )
    }
}

/// Opaque serialized record held in the shared buffer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueEntry(String);

impl QueueEntry {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for QueueEntry {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Parse RFC 3339, falling back to naive ISO 8601 read as UTC.
/// Agents emit naive timestamps without an offset.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}
