//! KML `gx:Track` ingestion
//!
//! A track is a list of `<when>` timestamps followed by the same number of
//! `<gx:coord>` entries ("lon lat [alt]"). The n-th `when` pairs with the
//! n-th `gx:coord`.

use crate::domain::{Event, LatLng, Path};
use crate::io::error::{IngestError, Result};
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

#[derive(Clone, Copy, PartialEq)]
enum Capture {
    None,
    When,
    Coord,
}

/// Parse a KML document into a path
pub fn parse_kml(input: &[u8]) -> Result<Path> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();

    let mut whens: Vec<String> = Vec::new();
    let mut coords: Vec<String> = Vec::new();
    let mut capture = Capture::None;
    let mut text = String::new();

    loop {
        let event = match reader.read_event_into(&mut buf)? {
            XmlEvent::Eof => break,
            event => event.into_owned(),
        };

        match event {
            XmlEvent::Start(ref e) => {
                capture = match e.name().as_ref() {
                    b"when" => Capture::When,
                    b"gx:coord" => Capture::Coord,
                    _ => Capture::None,
                };
                text.clear();
            }
            XmlEvent::Text(ref e) if capture != Capture::None => {
                let unescaped = e.unescape().map_err(|e| IngestError::Xml(e.into()))?;
                text.push_str(&unescaped);
            }
            XmlEvent::End(_) => {
                match capture {
                    Capture::When => whens.push(text.trim().to_string()),
                    Capture::Coord => coords.push(text.trim().to_string()),
                    Capture::None => {}
                }
                capture = Capture::None;
            }
            _ => {}
        }

        buf.clear();
    }

    if whens.len() != coords.len() {
        warn!(whens = %whens.len(), coords = %coords.len(), "kml_track_count_mismatch");
    }

    let events = whens
        .iter()
        .zip(coords.iter())
        .map(|(when, coord)| Ok(Event::new(parse_when(when)?, parse_coord(coord)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Path::from_events(events))
}

/// RFC 3339 timestamp to epoch seconds; a missing offset is read as UTC
fn parse_when(value: &str) -> Result<f64> {
    let parsed = OffsetDateTime::parse(value, &Rfc3339)
        .or_else(|first| OffsetDateTime::parse(&format!("{value}Z"), &Rfc3339).map_err(|_| first))
        .map_err(|e| IngestError::InvalidTime { value: value.to_string(), reason: e.to_string() })?;
    Ok(parsed.unix_timestamp() as f64 + parsed.nanosecond() as f64 / 1e9)
}

/// "lon lat [alt]" separated by whitespace or commas
fn parse_coord(value: &str) -> Result<LatLng> {
    let invalid = || IngestError::InvalidCoordinate(value.to_string());

    let parts: Vec<f64> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().map_err(|_| invalid()))
        .collect::<Result<_>>()?;

    match parts.as_slice() {
        [lng, lat] | [lng, lat, _] => {
            let location = LatLng::new(*lat, *lng);
            if location.is_valid() {
                Ok(location)
            } else {
                Err(invalid())
            }
        }
        _ => Err(invalid()),
    }
}
