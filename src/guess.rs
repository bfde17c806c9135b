//! Guessing which route a vehicle is on
//!
//! Scores every route in a [`ShapesMap`] by how close it passes to a vehicle's
//! position, or to each position in a short history of positions.

use dimensioned::si::{M, Meter};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::algorithm::point_to_polyline;
use crate::shapes::{RouteKey, ShapesMap};
use crate::types::{Point, Polyline};

#[derive(Error, Debug, PartialEq)]
pub enum GuessError {
    #[error("there are no candidate routes to match against")]
    NoCandidateRoutes,
}

type Result<T> = std::result::Result<T, GuessError>;

/// Find the route passing closest to a point
///
/// Returns the key of the nearest route along with its distance from
/// `point`. When several routes are equally close, the first one in the
/// map's iteration order wins.
#[instrument(level = "trace", skip_all)]
pub fn guess_route(shapes_map: &ShapesMap, point: &Point) -> Result<(RouteKey, Meter<f64>)> {
    let mut best: Option<(&RouteKey, Meter<f64>)> = None;
    for (key, polyline) in shapes_map.iter() {
        let distance = point_to_polyline(point, polyline).distance;
        match &best {
            Some((_, best_distance)) if distance >= *best_distance => (),
            _ => best = Some((key, distance)),
        }
    }

    let (key, distance) = best.ok_or(GuessError::NoCandidateRoutes)?;
    debug!("Guessed route {} at {}", key, distance);
    Ok((key.clone(), distance))
}

/// Score every route against a history of positions
///
/// A route's score is the sum of its distances from each position in the
/// history, so lower scores are better and routes that stay close to every
/// position beat routes that merely pass near one of them. Scores are
/// returned for all routes in the map's iteration order; use [`best_route`]
/// to pick the winner.
#[instrument(level = "trace", skip_all)]
pub fn route_histo(
    shapes_map: &ShapesMap,
    history: &[Point],
) -> Result<Vec<(RouteKey, Meter<f64>)>> {
    if shapes_map.is_empty() {
        return Err(GuessError::NoCandidateRoutes);
    }

    let entries = shapes_map.iter().collect::<Vec<_>>();

    #[cfg(feature = "rayon")]
    let iter = entries.into_par_iter();
    #[cfg(not(feature = "rayon"))]
    let iter = entries.into_iter();

    let histo = iter
        .map(|(key, polyline)| (key.clone(), history_score(polyline, history)))
        .collect::<Vec<_>>();

    debug!(
        "Scored {} routes against {} positions",
        histo.len(),
        history.len()
    );
    Ok(histo)
}

fn history_score(polyline: &Polyline, history: &[Point]) -> Meter<f64> {
    history
        .iter()
        .map(|p| point_to_polyline(p, polyline).distance.value_unsafe)
        .sum::<f64>()
        * M
}

/// Pick the lowest-scoring entry of a [`route_histo`] result.
///
/// The first entry wins ties. Returns `None` for an empty histogram.
pub fn best_route(histo: &[(RouteKey, Meter<f64>)]) -> Option<&(RouteKey, Meter<f64>)> {
    let mut best: Option<&(RouteKey, Meter<f64>)> = None;
    for entry in histo {
        match best {
            Some((_, score)) if entry.1 >= *score => (),
            _ => best = Some(entry),
        }
    }
    best
}
