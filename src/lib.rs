//! A library for matching vehicle positions against transit routes.
//!
//! Builds per-route polylines from the trips and shapes of a GTFS-style feed,
//! then uses them to guess which route a vehicle is traveling on and to detect
//! when a vehicle has passed a stop along its route.
//!
//! The main entry points are:
//!
//! - [`enumerate_shapes`], which consolidates raw trip and shape records into
//!   a [`ShapesMap`]
//! - [`guess_route`] and [`route_histo`], which score routes by their
//!   proximity to a position or a history of positions
//! - [`passes`] and [`passes_within`], which decide whether a history of
//!   positions crossed a stop along a route
//!
//! # Feature flags
//!
//! - `rayon` (default) scores routes in parallel in [`route_histo`]
//! - `feed` enables [`feed`], a reader for GTFS `trips.txt` and `shapes.txt`
//! - `cli` enables the additional dependencies needed by the CLI

#[cfg(feature = "feed")]
use std::path::Path;

pub mod algorithm;
#[cfg(feature = "feed")]
pub mod feed;
pub mod geographic;
pub mod guess;
pub mod passes;
pub mod shapes;
pub mod types;

pub use algorithm::{
    PolylineProjection, RoutePosition, SegmentProjection, arc_length_position, point_to_polyline,
    point_to_segment,
};
pub use geographic::distance;
pub use guess::{GuessError, best_route, guess_route, route_histo};
pub use passes::{Crossing, Direction, find_crossing, passes, passes_within};
pub use shapes::{RouteKey, ShapeError, ShapeRecord, ShapesMap, TripRecord, enumerate_shapes};
use thiserror::Error;
#[cfg(feature = "feed")]
use tracing::{debug, instrument};
pub use types::{Point, Polyline, Segment, TypeError};

#[derive(Error, Debug)]
pub enum RouteMatchError {
    #[error("Core type error")]
    Type(#[from] TypeError),
    #[error("Shape consolidation error")]
    Shape(#[from] ShapeError),
    #[error("Route guessing error")]
    Guess(#[from] GuessError),
    #[cfg(feature = "feed")]
    #[error("GTFS feed error")]
    Feed(#[from] feed::FeedError),
}

pub type Result<T> = std::result::Result<T, RouteMatchError>;

/// Load the route shapes of a GTFS feed directory
///
/// Reads `trips.txt` and `shapes.txt` from `dir`, as [`feed::load_feed`]
/// does, and fails if the feed yields no routes at all, since nothing could
/// then be matched against it.
#[cfg(feature = "feed")]
#[instrument(level = "trace", skip_all)]
pub fn load_routes<P: AsRef<Path>>(dir: P) -> Result<ShapesMap> {
    let shapes_map = feed::load_feed(dir)?;
    if shapes_map.is_empty() {
        return Err(GuessError::NoCandidateRoutes.into());
    }
    debug!("Loaded {} route shapes", shapes_map.len());
    Ok(shapes_map)
}
