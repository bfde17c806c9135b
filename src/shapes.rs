//! Consolidation of raw shape points into route polylines
//!
//! A transit feed describes each physical path as a run of shape point
//! records sharing a `shape_id`, and ties shapes to routes through its trips.
//! [`enumerate_shapes`] folds both into a [`ShapesMap`], the read-only route
//! dataset used by route guessing and stop-passage detection.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::{Display, Formatter};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::types::{Point, Polyline};

#[derive(Error, Debug, PartialEq)]
pub enum ShapeError {
    #[error("shape {shape_id:?} is used by more than one route: {first:?} and {second:?}")]
    AmbiguousShape {
        shape_id: String,
        first: String,
        second: String,
    },
}

type Result<T> = std::result::Result<T, ShapeError>;

/// A trip record, associating a shape with the route it serves.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct TripRecord {
    pub shape_id: String,
    pub route_id: String,
}

/// A single shape point record.
///
/// Records for the same shape are expected in traversal order.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct ShapeRecord {
    pub shape_id: String,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,

    /// Position of the point within its shape, if the feed provides it.
    #[cfg_attr(feature = "serde", serde(default))]
    pub shape_pt_sequence: Option<u32>,
}

impl ShapeRecord {
    pub fn new(shape_id: impl Into<String>, shape_pt_lat: f64, shape_pt_lon: f64) -> Self {
        Self {
            shape_id: shape_id.into(),
            shape_pt_lat,
            shape_pt_lon,
            shape_pt_sequence: None,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.shape_pt_lat, self.shape_pt_lon)
    }
}

impl TripRecord {
    pub fn new(shape_id: impl Into<String>, route_id: impl Into<String>) -> Self {
        Self {
            shape_id: shape_id.into(),
            route_id: route_id.into(),
        }
    }
}

/// Identifies one shape of one route.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct RouteKey {
    pub shape_id: String,
    pub route_id: String,
}

impl RouteKey {
    pub fn new(shape_id: impl Into<String>, route_id: impl Into<String>) -> Self {
        Self {
            shape_id: shape_id.into(),
            route_id: route_id.into(),
        }
    }
}

impl Display for RouteKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (shape {})", self.route_id, self.shape_id)
    }
}

/// Route polylines keyed by [`RouteKey`].
///
/// Iteration follows insertion order, which is the order in which keys first
/// appear among the trips. Route guessing relies on this order to break ties.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct ShapesMap {
    entries: Vec<(RouteKey, Polyline)>,
    index: HashMap<RouteKey, usize>,
}

impl ShapesMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a polyline, replacing and returning any polyline already stored
    /// under `key`. A replaced entry keeps its original position.
    pub fn insert(&mut self, key: RouteKey, polyline: Polyline) -> Option<Polyline> {
        match self.index.entry(key) {
            Entry::Occupied(entry) => {
                let slot = &mut self.entries[*entry.get()].1;
                Some(std::mem::replace(slot, polyline))
            }
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                entry.insert(self.entries.len());
                self.entries.push((key, polyline));
                None
            }
        }
    }

    pub fn get(&self, key: &RouteKey) -> Option<&Polyline> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &RouteKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&RouteKey, &Polyline)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl ExactSizeIterator<Item = &RouteKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// All entries for a given shape, whichever route they belong to.
    pub fn find_shape<'a>(
        &'a self,
        shape_id: &'a str,
    ) -> impl Iterator<Item = (&'a RouteKey, &'a Polyline)> + 'a {
        self.iter().filter(move |(k, _)| k.shape_id == shape_id)
    }
}

impl<'a> IntoIterator for &'a ShapesMap {
    type Item = (&'a RouteKey, &'a Polyline);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Build route polylines from trip and shape records
///
/// Shape points are grouped by `shape_id` in the order given, and each trip
/// attaches its shape's polyline to its route under the key
/// `(shape_id, route_id)`. Trips referring to a shape with no points are
/// skipped, as are shapes no trip refers to.
///
/// Fails if any shape is claimed by two different routes. The check covers
/// all trips before anything is built, so no partial map is ever returned.
#[instrument(level = "trace", skip_all)]
pub fn enumerate_shapes(trips: &[TripRecord], shapes: &[ShapeRecord]) -> Result<ShapesMap> {
    let mut shape_routes: HashMap<&str, &str> = HashMap::new();
    for trip in trips {
        match shape_routes.entry(trip.shape_id.as_str()) {
            Entry::Occupied(entry) => {
                if *entry.get() != trip.route_id {
                    return Err(ShapeError::AmbiguousShape {
                        shape_id: trip.shape_id.clone(),
                        first: (*entry.get()).to_owned(),
                        second: trip.route_id.clone(),
                    });
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(trip.route_id.as_str());
            }
        }
    }

    let mut shape_points: HashMap<&str, Vec<Point>> = HashMap::new();
    for record in shapes {
        shape_points
            .entry(record.shape_id.as_str())
            .or_default()
            .push(record.point());
    }

    let mut shapes_map = ShapesMap::new();
    let mut num_trips_skipped = 0usize;
    for trip in trips {
        let key = RouteKey::new(trip.shape_id.as_str(), trip.route_id.as_str());
        if shapes_map.contains_key(&key) {
            continue;
        }
        match shape_points.get(trip.shape_id.as_str()) {
            Some(points) => {
                // Grouping only creates entries for shapes with at least one
                // point, so this cannot fail.
                if let Ok(polyline) = Polyline::new(points.clone()) {
                    shapes_map.insert(key, polyline);
                }
            }
            None => num_trips_skipped += 1,
        }
    }

    debug!(
        "Enumerated {} route shapes from {} trips and {} shape points",
        shapes_map.len(),
        trips.len(),
        shapes.len()
    );
    debug!(
        "{} trips referred to shapes without any points",
        num_trips_skipped
    );
    Ok(shapes_map)
}
