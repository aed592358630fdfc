//! Location samples and the motion metrics computed from their neighbors

use crate::domain::geodesy;
use crate::domain::path::Path;
use crate::domain::types::{LatLng, Result, TrajectoryError};
use time::OffsetDateTime;

/// A single timestamped, located sample
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Seconds since the Unix epoch
    pub epoch: f64,
    pub location: LatLng,
    /// Measurement uncertainty as reported by the source, if any
    pub accuracy: Option<f64>,
}

impl Event {
    #[inline]
    pub fn new(epoch: f64, location: LatLng) -> Self {
        Self { epoch, location, accuracy: None }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Great-circle distance to another event in kilometers
    #[inline]
    pub fn distance_to(&self, other: &Event) -> f64 {
        geodesy::distance_km(self.location, other.location)
    }

    /// Timestamp as a UTC date-time, `None` if the epoch is not representable
    pub fn datetime(&self) -> Option<OffsetDateTime> {
        if !self.epoch.is_finite() {
            return None;
        }
        let nanos = (self.epoch * 1e9).round();
        if nanos.abs() >= i128::MAX as f64 {
            return None;
        }
        OffsetDateTime::from_unix_timestamp_nanos(nanos as i128).ok()
    }

    /// Bearing towards another event in degrees, normalized to `[0, 360)`
    #[inline]
    pub fn heading_to(&self, other: &Event) -> f64 {
        geodesy::initial_bearing_deg(self.location, other.location)
    }
}

/// An event seen through its owning path
///
/// Stands in for a back-reference: the index locates the event inside the
/// path's storage, so neighbor lookups stay valid for as long as the borrow.
#[derive(Debug, Clone, Copy)]
pub struct EventRef<'a> {
    path: &'a Path,
    index: usize,
}

impl<'a> EventRef<'a> {
    pub(crate) fn new(path: &'a Path, index: usize) -> Self {
        Self { path, index }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn event(&self) -> &'a Event {
        &self.path.events()[self.index]
    }

    #[inline]
    pub fn epoch(&self) -> f64 {
        self.event().epoch
    }

    #[inline]
    pub fn location(&self) -> LatLng {
        self.event().location
    }

    #[inline]
    pub fn distance_to(&self, other: &Event) -> f64 {
        self.event().distance_to(other)
    }

    /// Event at a signed offset from this one in path order
    pub fn neighbor(&self, offset: isize) -> Result<EventRef<'a>> {
        let len = self.path.len();
        self.index
            .checked_add_signed(offset)
            .filter(|&i| i < len)
            .map(|i| EventRef::new(self.path, i))
            .ok_or(TrajectoryError::OutOfRange { index: self.index, offset, len })
    }

    /// Speed in km/h relative to the event at `offset` (usually -1)
    ///
    /// Signed by elapsed time, so a later neighbor (positive offset) gives a
    /// negative speed. Returns 0 when both events share a timestamp.
    pub fn speed(&self, offset: isize) -> Result<f64> {
        let other = self.neighbor(offset)?;
        let delta_secs = self.epoch() - other.epoch();
        if delta_secs == 0.0 {
            return Ok(0.0);
        }
        Ok(self.distance_to(other.event()) / (delta_secs / 3600.0))
    }

    /// Bearing towards the next event in degrees
    pub fn heading(&self) -> Result<f64> {
        let next = self.neighbor(1)?;
        Ok(self.event().heading_to(next.event()))
    }

    /// Seconds spent within `threshold_km` of this event
    ///
    /// Expands backward and forward from this event over the contiguous run of
    /// samples closer than the threshold, and returns the time spanned by that
    /// run. A run of a single sample spans 0 seconds.
    pub fn time_near(&self, threshold_km: f64) -> f64 {
        let events = self.path.events();
        let here = self.event();
        let is_near = |e: &Event| here.distance_to(e) < threshold_km;

        let mut first = None;
        for i in (0..self.index).rev() {
            if !is_near(&events[i]) {
                break;
            }
            first = Some(i);
        }

        let mut last = None;
        for (i, e) in events.iter().enumerate().skip(self.index) {
            if !is_near(e) {
                break;
            }
            last = Some(i);
        }

        // the forward walk starts at this event, so `last` is None only for a
        // non-positive threshold, where nothing counts as near
        let lo = first.unwrap_or(self.index);
        match last {
            Some(hi) if hi > lo => events[hi].epoch - events[lo].epoch,
            _ => 0.0,
        }
    }
}
