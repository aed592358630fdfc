//! Google Latitude style location feed
//!
//! Expected body:
//! ```json
//! {"data": {"items": [
//!     {"latitude": 37.77, "longitude": -122.41, "timestampMs": "1300000000000", "accuracy": 20}
//! ]}}
//! ```
//! Items arrive newest first. `timestampMs` may be a string or an integer.

use crate::domain::{Event, LatLng, Path};
use crate::io::error::{IngestError, Result};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
pub struct LatitudeFeed {
    pub data: LatitudeData,
}

#[derive(Debug, Deserialize)]
pub struct LatitudeData {
    #[serde(default)]
    pub items: Vec<LatitudeItem>,
}

#[derive(Debug, Deserialize)]
pub struct LatitudeItem {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "timestampMs", deserialize_with = "deserialize_timestamp_ms")]
    pub timestamp_ms: TimestampMs,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

/// Raw `timestampMs` value as it appeared on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampMs {
    Text(String),
    Millis(i64),
}

fn deserialize_timestamp_ms<'de, D>(deserializer: D) -> std::result::Result<TimestampMs, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = TimestampMs;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer millisecond timestamp")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<TimestampMs, E>
        where
            E: de::Error,
        {
            Ok(TimestampMs::Text(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> std::result::Result<TimestampMs, E>
        where
            E: de::Error,
        {
            Ok(TimestampMs::Text(value))
        }

        fn visit_u64<E>(self, value: u64) -> std::result::Result<TimestampMs, E>
        where
            E: de::Error,
        {
            i64::try_from(value)
                .map(TimestampMs::Millis)
                .map_err(|_| E::custom(format!("timestamp {value} out of range")))
        }

        fn visit_i64<E>(self, value: i64) -> std::result::Result<TimestampMs, E>
        where
            E: de::Error,
        {
            Ok(TimestampMs::Millis(value))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

impl TimestampMs {
    fn millis(&self) -> std::result::Result<i64, String> {
        match self {
            TimestampMs::Millis(ms) => Ok(*ms),
            TimestampMs::Text(s) => {
                s.trim().parse::<i64>().map_err(|e| format!("timestampMs {s:?}: {e}"))
            }
        }
    }
}

impl LatitudeItem {
    /// Validate the raw item into an event
    fn to_event(&self, index: usize) -> Result<Event> {
        let invalid = |reason: String| IngestError::InvalidRecord { index, reason };

        let location = LatLng::new(self.latitude, self.longitude);
        if !location.is_valid() {
            return Err(invalid(format!("location {location} out of range")));
        }

        let millis = self.timestamp_ms.millis().map_err(invalid)?;
        if millis < 0 {
            return Err(invalid(format!("negative timestampMs {millis}")));
        }

        let mut event = Event::new(millis as f64 / 1000.0, location);
        if let Some(accuracy) = self.accuracy {
            if !accuracy.is_finite() || accuracy < 0.0 {
                return Err(invalid(format!("accuracy {accuracy} must be a non-negative number")));
            }
            event = event.with_accuracy(accuracy);
        }
        Ok(event)
    }
}

impl LatitudeFeed {
    /// Validate every item and build a time-ordered path
    pub fn into_path(self) -> Result<Path> {
        let mut events = self
            .data
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| item.to_event(index))
            .collect::<Result<Vec<_>>>()?;
        // newest first on the wire
        events.reverse();
        Ok(Path::from_events(events))
    }
}

/// Parse a feed body into a path
pub fn parse_feed(body: &[u8]) -> Result<Path> {
    let feed: LatitudeFeed = serde_json::from_slice(body)?;
    feed.into_path()
}
