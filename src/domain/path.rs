//! Time-ordered trajectories
//!
//! A `Path` owns its events and keeps them sorted by epoch on every
//! insertion, so neighbor lookups, interpolation and distance aggregation can
//! rely on temporal order without re-sorting.

use crate::domain::event::{Event, EventRef};
use crate::domain::types::{LatLng, Result, TrajectoryError};

/// Default resampling interval in seconds
pub const DEFAULT_RESOLUTION_SECS: f64 = 60.0;

/// Upper bound on events produced by one resample or sampling call
pub const MAX_GENERATED_EVENTS: usize = 10_000_000;

#[inline]
fn check_epoch(epoch: f64) -> Result<()> {
    if epoch.is_finite() {
        Ok(())
    } else {
        Err(TrajectoryError::InvalidEpoch(epoch))
    }
}

/// An ordered collection of events representing a trajectory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    events: Vec<Event>,
}

impl Path {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Build a path from a batch of events, ordering them by time
    ///
    /// Events with identical epochs keep their relative order.
    pub fn from_events(events: Vec<Event>) -> Self {
        let mut path = Self { events };
        path.sort();
        path
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Stable sort by epoch. A no-op on an already ordered path.
    pub fn sort(&mut self) {
        if self.events.windows(2).any(|w| w[0].epoch > w[1].epoch) {
            self.events.sort_by(|a, b| a.epoch.total_cmp(&b.epoch));
        }
    }

    /// Create an event and place it in time order
    pub fn create_event(
        &mut self,
        epoch: f64,
        location: LatLng,
        accuracy: Option<f64>,
    ) -> Result<usize> {
        self.append_event(Event { epoch, location, accuracy })
    }

    /// Take ownership of an event and place it in time order
    ///
    /// Lands after any events sharing its epoch. Returns the index it was
    /// stored at.
    pub fn append_event(&mut self, event: Event) -> Result<usize> {
        check_epoch(event.epoch)?;
        let index = self.events.partition_point(|e| e.epoch <= event.epoch);
        self.events.insert(index, event);
        Ok(index)
    }

    /// Insert an event at an explicit index
    ///
    /// The index must keep the path ordered by time.
    pub fn insert_event(&mut self, index: usize, event: Event) -> Result<()> {
        check_epoch(event.epoch)?;
        let len = self.events.len();
        if index > len {
            return Err(TrajectoryError::IndexOutOfBounds { index, len });
        }
        let after_prev = index == 0 || self.events[index - 1].epoch <= event.epoch;
        let before_next = index == len || event.epoch <= self.events[index].epoch;
        if !(after_prev && before_next) {
            return Err(TrajectoryError::OutOfOrder { index, epoch: event.epoch });
        }
        self.events.insert(index, event);
        Ok(())
    }

    /// View of the event at `index`
    pub fn event(&self, index: usize) -> Result<EventRef<'_>> {
        if index < self.events.len() {
            Ok(EventRef::new(self, index))
        } else {
            Err(TrajectoryError::IndexOutOfBounds { index, len: self.events.len() })
        }
    }

    /// Find an event owned by this path
    ///
    /// Fails with `Detached` if the event is not stored in this path.
    pub fn locate(&self, event: &Event) -> Result<EventRef<'_>> {
        // the owned event is the one at the same address
        if let Some(index) = self.events.iter().position(|e| std::ptr::eq(e, event)) {
            return Ok(EventRef::new(self, index));
        }
        Err(TrajectoryError::Detached)
    }

    /// Views of every event in time order
    pub fn iter_refs(&self) -> impl Iterator<Item = EventRef<'_>> {
        (0..self.events.len()).map(move |i| EventRef::new(self, i))
    }

    pub fn start(&self) -> Result<&Event> {
        self.events.first().ok_or(TrajectoryError::EmptyPath)
    }

    pub fn end(&self) -> Result<&Event> {
        self.events.last().ok_or(TrajectoryError::EmptyPath)
    }

    /// Seconds between the first and last event
    pub fn duration(&self) -> Result<f64> {
        Ok(self.end()?.epoch - self.start()?.epoch)
    }

    /// Straight-line displacement between the first and last event (km)
    pub fn distance(&self) -> Result<f64> {
        Ok(self.start()?.distance_to(self.end()?))
    }

    /// Total length along the path (km)
    ///
    /// Sums every hop, so GPS jitter while stationary inflates the result.
    pub fn distance_traveled(&self) -> f64 {
        self.events.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
    }

    /// Mean speed in km/h over every event that has a predecessor
    pub fn average_speed(&self) -> Result<f64> {
        if self.events.is_empty() {
            return Err(TrajectoryError::EmptyPath);
        }
        if self.events.len() == 1 {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for event in self.iter_refs().skip(1) {
            total += event.speed(-1)?;
        }
        Ok(total / (self.events.len() - 1) as f64)
    }

    /// Interpolated event at an arbitrary timestamp, detached from the path
    pub fn at_time(&self, epoch: f64) -> Result<Event> {
        check_epoch(epoch)?;
        if let Some(hit) = self.events.iter().find(|e| e.epoch == epoch) {
            return Ok(Event::new(epoch, hit.location));
        }

        let (before, after) = self.bracket(epoch)?;
        let span = after.epoch - before.epoch;
        if span == 0.0 {
            return Err(TrajectoryError::DegenerateBracket { epoch });
        }
        let fraction = (epoch - before.epoch) / span;

        let lat = before.location.lat + (after.location.lat - before.location.lat) * fraction;
        let lng = before.location.lng + (after.location.lng - before.location.lng) * fraction;
        Ok(Event::new(epoch, LatLng::new(lat, lng)))
    }

    /// Interpolate an event at `epoch` and store it in time order
    pub fn insert_at_time(&mut self, epoch: f64) -> Result<Event> {
        let event = self.at_time(epoch)?;
        self.append_event(event.clone())?;
        Ok(event)
    }

    /// Pair of events used to interpolate at `epoch`
    fn bracket(&self, epoch: f64) -> Result<(&Event, &Event)> {
        let n = self.events.len();
        if n < 2 {
            return Err(TrajectoryError::InsufficientEvents { needed: 2, found: n });
        }
        let events = &self.events;

        if epoch < events[0].epoch {
            return Ok((&events[0], &events[1]));
        }
        if epoch >= events[n - 1].epoch {
            return Ok((&events[n - 2], &events[n - 1]));
        }

        // skip over pairs that sit on the same spot; if the whole tail is a
        // single spot the final pair is used
        let first_after = events.partition_point(|e| e.epoch <= epoch).max(1);
        let mut pair = (first_after - 1, first_after);
        for i in first_after..n {
            pair = (i - 1, i);
            if events[i - 1].location != events[i].location {
                break;
            }
        }
        Ok((&events[pair.0], &events[pair.1]))
    }

    /// Resample the path at fixed intervals over `[start, end)`
    ///
    /// Produces `ceil(duration / resolution)` events. Paths with fewer than two
    /// events resample to an empty path. Fails with `TooManySamples` rather
    /// than produce more than `MAX_GENERATED_EVENTS`.
    pub fn interpolate(&self, resolution: f64) -> Result<Path> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(TrajectoryError::InvalidResolution(resolution));
        }
        if self.events.len() < 2 {
            return Ok(Path::new());
        }

        let start = self.start()?.epoch;
        let requested = (self.duration()? / resolution).ceil();
        if !requested.is_finite() || requested > MAX_GENERATED_EVENTS as f64 {
            return Err(TrajectoryError::TooManySamples { requested, max: MAX_GENERATED_EVENTS });
        }
        let steps = requested as usize;
        let mut events = Vec::with_capacity(steps);
        for i in 0..steps {
            events.push(self.at_time(start + i as f64 * resolution)?);
        }
        Ok(Path { events })
    }

    /// Interpolate `count` samples spaced `spacing` seconds apart around
    /// `center`, inserting each one into this path
    pub fn sample_path(&mut self, center: f64, count: usize, spacing: f64) -> Result<Vec<Event>> {
        if count > MAX_GENERATED_EVENTS {
            return Err(TrajectoryError::TooManySamples {
                requested: count as f64,
                max: MAX_GENERATED_EVENTS,
            });
        }
        let start = center - spacing * (count / 2) as f64;
        let mut samples = Vec::with_capacity(count);
        for i in 0..count {
            samples.push(self.insert_at_time(start + i as f64 * spacing)?);
        }
        Ok(samples)
    }
}

impl FromIterator<Event> for Path {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self::from_events(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_of(samples: &[(f64, f64, f64)]) -> Path {
        samples
            .iter()
            .map(|&(epoch, lat, lng)| Event::new(epoch, LatLng::new(lat, lng)))
            .collect()
    }

    fn epochs(path: &Path) -> Vec<f64> {
        path.events().iter().map(|e| e.epoch).collect()
    }

    fn assert_near(actual: LatLng, expected: LatLng) {
        assert!(
            (actual.lat - expected.lat).abs() < 1e-9 && (actual.lng - expected.lng).abs() < 1e-9,
            "{actual} != {expected}"
        );
    }

    #[test]
    fn test_from_events_sorts() {
        let path = path_of(&[(30.0, 0.0, 0.0), (10.0, 0.0, 0.0), (20.0, 0.0, 0.0)]);
        assert_eq!(epochs(&path), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_sort_is_stable() {
        let path = path_of(&[(10.0, 1.0, 0.0), (5.0, 0.0, 0.0), (10.0, 2.0, 0.0)]);
        let lats: Vec<f64> = path.events().iter().map(|e| e.location.lat).collect();
        assert_eq!(lats, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_append_keeps_order() {
        let mut path = Path::new();
        assert_eq!(path.create_event(20.0, LatLng::new(0.0, 0.0), None), Ok(0));
        assert_eq!(path.create_event(10.0, LatLng::new(0.0, 0.0), Some(3.0)), Ok(0));
        assert_eq!(path.append_event(Event::new(15.0, LatLng::new(0.0, 0.0))), Ok(1));
        assert_eq!(path.append_event(Event::new(20.0, LatLng::new(1.0, 0.0))), Ok(3));
        assert_eq!(epochs(&path), vec![10.0, 15.0, 20.0, 20.0]);
        assert_eq!(path.events()[0].accuracy, Some(3.0));
        assert_eq!(path.events()[3].location.lat, 1.0);
    }

    #[test]
    fn test_insert_event_validates_position() {
        let mut path = path_of(&[(0.0, 0.0, 0.0), (20.0, 0.0, 0.0)]);
        path.insert_event(1, Event::new(10.0, LatLng::new(0.0, 0.0))).unwrap();
        assert_eq!(epochs(&path), vec![0.0, 10.0, 20.0]);

        assert_eq!(
            path.insert_event(0, Event::new(15.0, LatLng::new(0.0, 0.0))),
            Err(TrajectoryError::OutOfOrder { index: 0, epoch: 15.0 })
        );
        assert_eq!(
            path.insert_event(9, Event::new(30.0, LatLng::new(0.0, 0.0))),
            Err(TrajectoryError::IndexOutOfBounds { index: 9, len: 3 })
        );
        path.insert_event(3, Event::new(30.0, LatLng::new(0.0, 0.0))).unwrap();
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn test_non_finite_epochs_are_rejected() {
        let mut path = path_of(&[(0.0, 0.0, 0.0), (20.0, 0.0, 1.0)]);
        assert!(matches!(
            path.create_event(f64::NAN, LatLng::new(0.0, 0.0), None),
            Err(TrajectoryError::InvalidEpoch(e)) if e.is_nan()
        ));
        assert_eq!(
            path.append_event(Event::new(f64::INFINITY, LatLng::new(0.0, 0.0))),
            Err(TrajectoryError::InvalidEpoch(f64::INFINITY))
        );
        assert!(matches!(
            path.insert_event(1, Event::new(f64::NAN, LatLng::new(0.0, 0.0))),
            Err(TrajectoryError::InvalidEpoch(_))
        ));
        assert!(matches!(path.at_time(f64::NAN), Err(TrajectoryError::InvalidEpoch(_))));
        assert!(path.insert_at_time(f64::NEG_INFINITY).is_err());
        // nothing was stored
        assert_eq!(epochs(&path), vec![0.0, 20.0]);
    }

    #[test]
    fn test_event_index_out_of_bounds() {
        let path = path_of(&[(0.0, 0.0, 0.0)]);
        assert_eq!(
            path.event(1).unwrap_err(),
            TrajectoryError::IndexOutOfBounds { index: 1, len: 1 }
        );
    }

    #[test]
    fn test_locate_attached_and_detached() {
        let path = path_of(&[(0.0, 0.0, 0.0), (10.0, 0.0, 1.0)]);
        let owned = &path.events()[1];
        assert_eq!(path.locate(owned).unwrap().index(), 1);

        let copy = owned.clone();
        assert_eq!(path.locate(&copy).unwrap_err(), TrajectoryError::Detached);
    }

    #[test]
    fn test_empty_path_accessors() {
        let path = Path::new();
        assert_eq!(path.start().unwrap_err(), TrajectoryError::EmptyPath);
        assert_eq!(path.end().unwrap_err(), TrajectoryError::EmptyPath);
        assert_eq!(path.duration().unwrap_err(), TrajectoryError::EmptyPath);
        assert_eq!(path.distance().unwrap_err(), TrajectoryError::EmptyPath);
        assert_eq!(path.average_speed().unwrap_err(), TrajectoryError::EmptyPath);
        assert_eq!(path.distance_traveled(), 0.0);
    }

    #[test]
    fn test_distance_vs_traveled() {
        // out and back: displacement is zero, traveled is not
        let path = path_of(&[(0.0, 0.0, 0.0), (60.0, 0.0, 0.01), (120.0, 0.0, 0.0)]);
        assert!(path.distance().unwrap() < 1e-9);
        assert!((path.distance_traveled() - 2.0 * 1.1119).abs() < 0.01);
        assert!(path.distance().unwrap() <= path.distance_traveled());
    }

    #[test]
    fn test_collinear_distance_equals_traveled() {
        let path = path_of(&[(0.0, 0.0, 0.0), (60.0, 0.0, 0.01), (120.0, 0.0, 0.02)]);
        assert!((path.distance().unwrap() - path.distance_traveled()).abs() < 1e-9);
    }

    #[test]
    fn test_duration() {
        let path = path_of(&[(100.0, 0.0, 0.0), (400.0, 0.0, 0.0)]);
        assert_eq!(path.duration().unwrap(), 300.0);
    }

    #[test]
    fn test_average_speed() {
        let path = path_of(&[(0.0, 0.0, 0.0), (3600.0, 0.0, 1.0), (3600.0, 0.0, 2.0)]);
        // second hop has zero duration and counts as 0 km/h
        let avg = path.average_speed().unwrap();
        assert!((avg - 111.19 / 2.0).abs() < 0.1, "got {avg}");

        let single = path_of(&[(0.0, 0.0, 0.0)]);
        assert_eq!(single.average_speed().unwrap(), 0.0);
    }

    #[test]
    fn test_at_time_midpoint() {
        let path = path_of(&[(0.0, 0.0, 0.0), (100.0, 0.0, 1.0)]);
        let event = path.at_time(50.0).unwrap();
        assert_eq!(event.epoch, 50.0);
        assert_eq!(event.location, LatLng::new(0.0, 0.5));
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_at_time_existing_epochs_are_exact() {
        let path = path_of(&[
            (0.0, 0.0, 0.0),
            (10.0, 0.0, 0.0),
            (20.0, 1.0, 1.0),
            (35.0, 2.0, 3.0),
        ]);
        for event in path.events() {
            assert_eq!(path.at_time(event.epoch).unwrap().location, event.location);
        }
    }

    #[test]
    fn test_at_time_extrapolates_outside_range() {
        let path = path_of(&[(10.0, 0.0, 0.0), (20.0, 0.0, 1.0), (30.0, 0.0, 3.0)]);
        assert_eq!(path.at_time(0.0).unwrap().location, LatLng::new(0.0, -1.0));
        assert_eq!(path.at_time(40.0).unwrap().location, LatLng::new(0.0, 5.0));
    }

    #[test]
    fn test_at_time_skips_duplicate_locations() {
        let path = path_of(&[
            (0.0, 0.0, 0.0),
            (10.0, 0.0, 0.0),
            (20.0, 0.0, 0.0),
            (30.0, 0.0, 3.0),
        ]);
        // bracket advances to (20, 30): fraction (5 - 20) / 10
        let event = path.at_time(5.0).unwrap();
        assert_eq!(event.location, LatLng::new(0.0, -4.5));
    }

    #[test]
    fn test_at_time_all_duplicates_uses_last_pair() {
        let path = path_of(&[(0.0, 1.0, 1.0), (10.0, 1.0, 1.0), (20.0, 1.0, 1.0)]);
        assert_eq!(path.at_time(5.0).unwrap().location, LatLng::new(1.0, 1.0));
    }

    #[test]
    fn test_at_time_degenerate_bracket() {
        let path = path_of(&[(10.0, 0.0, 0.0), (10.0, 1.0, 1.0)]);
        assert_eq!(
            path.at_time(5.0).unwrap_err(),
            TrajectoryError::DegenerateBracket { epoch: 5.0 }
        );
    }

    #[test]
    fn test_at_time_needs_two_events() {
        let path = path_of(&[(10.0, 0.0, 0.0)]);
        assert_eq!(
            path.at_time(5.0).unwrap_err(),
            TrajectoryError::InsufficientEvents { needed: 2, found: 1 }
        );
    }

    #[test]
    fn test_insert_at_time() {
        let mut path = path_of(&[(0.0, 0.0, 0.0), (100.0, 0.0, 1.0)]);
        let event = path.insert_at_time(25.0).unwrap();
        assert_eq!(event.location, LatLng::new(0.0, 0.25));
        assert_eq!(epochs(&path), vec![0.0, 25.0, 100.0]);
    }

    #[test]
    fn test_interpolate_count_and_spacing() {
        let path = path_of(&[(0.0, 0.0, 0.0), (130.0, 0.0, 1.3), (250.0, 1.0, 1.3)]);
        let resampled = path.interpolate(60.0).unwrap();
        // duration 250 over 60s steps: 0, 60, 120, 180, 240
        assert_eq!(epochs(&resampled), vec![0.0, 60.0, 120.0, 180.0, 240.0]);
        assert_near(resampled.events()[1].location, LatLng::new(0.0, 0.6));
        // source is untouched
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_interpolate_exact_multiple_is_half_open() {
        let path = path_of(&[(0.0, 0.0, 0.0), (120.0, 0.0, 1.0)]);
        assert_eq!(epochs(&path.interpolate(60.0).unwrap()), vec![0.0, 60.0]);
    }

    #[test]
    fn test_interpolate_rejects_bad_resolution() {
        let path = path_of(&[(0.0, 0.0, 0.0), (120.0, 0.0, 1.0)]);
        assert_eq!(
            path.interpolate(0.0).unwrap_err(),
            TrajectoryError::InvalidResolution(0.0)
        );
        assert!(path.interpolate(-5.0).is_err());
        assert!(path.interpolate(f64::NAN).is_err());
        assert!(Path::new().interpolate(DEFAULT_RESOLUTION_SECS).unwrap().is_empty());
    }

    #[test]
    fn test_interpolate_tiny_resolution_is_bounded() {
        let path = path_of(&[(0.0, 0.0, 0.0), (3600.0, 0.0, 1.0)]);
        assert!(matches!(
            path.interpolate(1e-300),
            Err(TrajectoryError::TooManySamples { max: MAX_GENERATED_EVENTS, .. })
        ));
        assert!(matches!(
            path.interpolate(1e-6),
            Err(TrajectoryError::TooManySamples { .. })
        ));
        assert_eq!(path.interpolate(1.0).unwrap().len(), 3600);
    }

    #[test]
    fn test_sample_path_count_is_bounded() {
        let mut path = path_of(&[(0.0, 0.0, 0.0), (100.0, 0.0, 1.0)]);
        assert!(matches!(
            path.sample_path(50.0, usize::MAX, 1.0),
            Err(TrajectoryError::TooManySamples { .. })
        ));
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_sample_path_inserts_samples() {
        let mut path = path_of(&[(0.0, 0.0, 0.0), (100.0, 0.0, 1.0)]);
        let samples = path.sample_path(50.0, 4, 10.0).unwrap();
        let sample_epochs: Vec<f64> = samples.iter().map(|e| e.epoch).collect();
        assert_eq!(sample_epochs, vec![30.0, 40.0, 50.0, 60.0]);
        assert_near(samples[2].location, LatLng::new(0.0, 0.5));
        assert_eq!(path.len(), 6);
        assert_eq!(epochs(&path), vec![0.0, 30.0, 40.0, 50.0, 60.0, 100.0]);
    }
}
