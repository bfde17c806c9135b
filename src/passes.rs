//! Stop-passage detection
//!
//! Decides whether a vehicle's recent positions crossed a stop, measuring
//! along the route rather than in straight lines. Both the stop and every
//! position are located on the route as arc-length positions, so "passing"
//! reduces to a stop position falling between the positions of two
//! consecutive samples, in either direction of travel.
//!
//! # Loops and tolerances
//!
//! With the default unbounded `max_dist`, each point is located at its single
//! nearest projection onto the route. Routes that loop back on themselves
//! make that ambiguous: a point at the loop's closing vertex is both at the
//! start and at the end of the route. Passing a finite `max_dist` keeps every
//! projection within that distance as a candidate position instead.
//!
//! Each sample is then matched to its nearest candidates only. Other legs of
//! the route that happen to pass within `max_dist` never outrank the leg the
//! vehicle is actually on. When a sample is equally near to several
//! positions, as at the closing vertex of a loop, we consider every pairing
//! with the neighbouring sample and trust the one whose along-route
//! displacement best agrees with the great-circle distance actually
//! travelled. A bus crossing the closing vertex of a loop therefore reads as
//! a short hop across the vertex, not as a trip around the entire loop.

use approx::abs_diff_eq;
use dimensioned::si::{M, Meter};
use strum::Display;
use tracing::{debug, instrument, trace};

use crate::algorithm::{ArcLengths, RoutePosition, nearby_positions};
use crate::geographic::distance;
use crate::types::{Point, Polyline};

/// The direction in which a stop was crossed, relative to the route's point
/// order.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

/// Details of a detected stop crossing.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Crossing {
    /// Direction of travel while crossing the stop.
    pub direction: Direction,

    /// Index into the history of the first sample at or beyond the stop.
    pub sample_index: usize,

    /// The stop's position along the route.
    pub stop_position: Meter<f64>,
}

/// Check whether a vehicle passed a stop, using the nearest match on the
/// route for every point.
///
/// See [`passes_within`].
pub fn passes(history: &[Point], stop: &Point, route: &Polyline) -> bool {
    passes_within(history, stop, route, f64::INFINITY * M)
}

/// Check whether a vehicle passed a stop
///
/// Returns true if the motion between any two consecutive located samples of
/// `history` crossed the stop's position along `route`. Only route segments
/// within `max_dist` of a point are considered matches for it; an infinite
/// `max_dist` uses the single nearest match.
///
/// A vehicle that does not move never passes a stop, even when it sits
/// exactly on top of it.
pub fn passes_within(
    history: &[Point],
    stop: &Point,
    route: &Polyline,
    max_dist: Meter<f64>,
) -> bool {
    find_crossing(history, stop, route, max_dist).is_some()
}

/// Find the first crossing of a stop in a history of positions
///
/// Samples with no route segment within `max_dist` are skipped, and the
/// samples on either side of them are compared directly. Returns `None` if
/// the stop itself is not within `max_dist` of the route, or if the history
/// has fewer than two located samples.
#[instrument(level = "trace", skip_all)]
pub fn find_crossing(
    history: &[Point],
    stop: &Point,
    route: &Polyline,
    max_dist: Meter<f64>,
) -> Option<Crossing> {
    if history.len() < 2 {
        return None;
    }

    let arc_lengths = ArcLengths::new(route);
    let stop_positions = nearby_positions(stop, route, &arc_lengths, max_dist)
        .into_iter()
        .map(|p| p.arc_length)
        .collect::<Vec<_>>();
    if stop_positions.is_empty() {
        debug!("Stop is not within {} of the route", max_dist);
        return None;
    }

    let located = history
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let candidates = nearest(nearby_positions(p, route, &arc_lengths, max_dist));
            (!candidates.is_empty()).then_some(LocatedSample {
                index: i,
                point: *p,
                candidates,
            })
        })
        .collect::<Vec<_>>();
    trace!(
        "Located {} of {} samples on the route",
        located.len(),
        history.len()
    );

    for pair in located.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        let travelled = distance(&from.point, &to.point);
        let Some((a, b)) = plausible_move(&from.candidates, &to.candidates, travelled) else {
            continue;
        };
        if a == b {
            continue;
        }

        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        if let Some(&stop_position) = stop_positions.iter().find(|&&s| lo <= s && s <= hi) {
            let direction = if b > a {
                Direction::Forward
            } else {
                Direction::Backward
            };
            debug!(
                "Stop at {} crossed {} between samples {} and {}",
                stop_position, direction, from.index, to.index
            );
            return Some(Crossing {
                direction,
                sample_index: to.index,
                stop_position,
            });
        }
    }
    None
}

struct LocatedSample {
    index: usize,
    point: Point,
    candidates: Vec<RoutePosition>,
}

/// Tolerance, in meters, within which two candidates count as equally near.
const NEAREST_EPSILON: f64 = 1e-6;

/// Keep only the candidates nearest to the sample they were projected from.
fn nearest(candidates: Vec<RoutePosition>) -> Vec<RoutePosition> {
    let min = candidates
        .iter()
        .map(|c| c.projection.distance.value_unsafe)
        .fold(f64::INFINITY, f64::min);
    candidates
        .into_iter()
        .filter(|c| {
            abs_diff_eq!(
                c.projection.distance.value_unsafe,
                min,
                epsilon = NEAREST_EPSILON
            )
        })
        .collect()
}

/// Choose the pairing of candidate positions that best explains a move.
///
/// Prefers the pairing whose along-route displacement is closest to the
/// distance travelled, taking the first such pairing on ties.
fn plausible_move(
    from: &[RoutePosition],
    to: &[RoutePosition],
    travelled: Meter<f64>,
) -> Option<(Meter<f64>, Meter<f64>)> {
    let mut best: Option<(f64, Meter<f64>, Meter<f64>)> = None;
    for a in from {
        for b in to {
            let displacement = (b.arc_length - a.arc_length).value_unsafe.abs();
            let error = (displacement - travelled.value_unsafe).abs();
            match best {
                Some((best_error, _, _)) if error >= best_error => (),
                _ => best = Some((error, a.arc_length, b.arc_length)),
            }
        }
    }
    best.map(|(_, a, b)| (a, b))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use approx::assert_relative_eq;
    use dimensioned::si::M;

    use super::{Direction, find_crossing, passes, passes_within};
    use crate::algorithm::arc_length_position;
    use crate::geographic::distance;
    use crate::types::{Point, Polyline};
    use crate::{point, points};

    fn straight_route() -> Result<Polyline> {
        Ok(Polyline::new(points![(0, 0), (0, 10)])?)
    }

    fn square_loop() -> Result<Polyline> {
        Ok(Polyline::new(points![
            (0, 0),
            (0, 1),
            (1, 1),
            (1, 0),
            (0, 0)
        ])?)
    }

    #[test]
    fn test_passes_forward() -> Result<()> {
        let history = points![(0, 4), (0, 5), (0, 6)];
        assert!(passes(&history, &point!(0, 5), &straight_route()?));
        Ok(())
    }

    #[test]
    fn test_passes_backward() -> Result<()> {
        let history = points![(0, 6), (0, 5), (0, 4)];
        assert!(passes(&history, &point!(0, 5), &straight_route()?));
        Ok(())
    }

    #[test]
    fn test_not_reaching_stop() -> Result<()> {
        let history = points![(0, 4), (0, 3), (0, 2)];
        assert!(!passes(&history, &point!(0, 5), &straight_route()?));
        Ok(())
    }

    #[test]
    fn test_not_moving() -> Result<()> {
        let history = points![(0, 6), (0, 6), (0, 6)];
        assert!(!passes(&history, &point!(0, 5), &straight_route()?));
        Ok(())
    }

    #[test]
    fn test_not_moving_on_stop() -> Result<()> {
        // Arguably a bus waiting at the stop is passing it, but without any
        // movement there is nothing to decide with.
        let history = points![(0, 5), (0, 5), (0, 5)];
        assert!(!passes(&history, &point!(0, 5), &straight_route()?));
        Ok(())
    }

    #[test]
    fn test_short_histories() -> Result<()> {
        let route = straight_route()?;
        assert!(!passes(&[], &point!(0, 5), &route));
        assert!(!passes(&points![(0, 5)], &point!(0, 5), &route));
        Ok(())
    }

    #[test]
    fn test_passes_with_loop() -> Result<()> {
        let route = square_loop()?;
        let history = points![(0.1, 0), (0, 0), (0, 0.1)];

        // Big enough to match points near the bus, but not the far corner of
        // the loop. These coordinates are unrealistically far apart, so this
        // is a lot larger than a typical GPS tolerance.
        let max_dist = distance(&point!(0, 0), &point!(0.1, 0));

        // Crossing from the end of the route back to its start doesn't pass
        // the stop at the far corner.
        assert!(!passes_within(&history, &point!(1, 1), &route, max_dist));

        // But it does pass a stop at the point where the route loops.
        assert!(passes_within(&history, &point!(0, 0), &route, max_dist));
        Ok(())
    }

    #[test]
    fn test_passes_with_curvy_road_and_measurement_error() -> Result<()> {
        let route = Polyline::new(points![
            (0, 0),
            (0, 0.1),
            (0.1, 0.2),
            (0.2, 0.2),
            (0.3, 0.3),
            (0.3, 0.4),
            (0.2, 0.5),
            (0.1, 0.5),
            (0, 0.6),
        ])?;
        let stop = point!(0.1, 0.5);

        let history = points![(0.25, 0.25), (0.29, 0.29)];
        assert!(!passes(&history, &stop, &route));

        // End to end covers every stop along the route.
        let history = points![(0, 0), (0, 0.6)];
        assert!(passes(&history, &stop, &route));
        Ok(())
    }

    #[test]
    fn test_unlocated_samples_are_skipped() -> Result<()> {
        let route = straight_route()?;
        let max_dist = 20_000.0 * M;
        let history = points![(0, 4), (5, 5), (0, 6)];
        assert!(passes_within(&history, &point!(0, 5), &route, max_dist));

        let history = points![(5, 4), (5, 5), (5, 6)];
        assert!(!passes_within(&history, &point!(0, 5), &route, max_dist));
        Ok(())
    }

    #[test]
    fn test_stop_off_route() -> Result<()> {
        let route = straight_route()?;
        let history = points![(0, 4), (0, 6)];
        assert!(!passes_within(&history, &point!(3, 5), &route, 1_000.0 * M));
        // Without a tolerance, the stop snaps to its nearest point on the
        // route.
        assert!(passes(&history, &point!(3, 5), &route));
        Ok(())
    }

    #[test]
    fn test_crossing_details() -> Result<()> {
        let route = straight_route()?;
        let stop = point!(0, 5);
        let stop_arc = distance(&point!(0, 0), &point!(0, 5)).value_unsafe;

        let forward = find_crossing(
            &points![(0, 3), (0, 4), (0, 6)],
            &stop,
            &route,
            f64::INFINITY * M,
        )
        .unwrap();
        assert_eq!(forward.direction, Direction::Forward);
        assert_eq!(forward.sample_index, 2);
        assert_relative_eq!(
            forward.stop_position.value_unsafe,
            stop_arc,
            max_relative = 1e-9
        );

        let backward = find_crossing(
            &points![(0, 6), (0, 4)],
            &stop,
            &route,
            f64::INFINITY * M,
        )
        .unwrap();
        assert_eq!(backward.direction, Direction::Backward);
        assert_eq!(backward.sample_index, 1);
        assert_eq!(backward.direction.to_string(), "backward");
        Ok(())
    }

    #[test]
    fn test_passes_end_to_end_on_u_turn() -> Result<()> {
        // The two legs are closer together than max_dist, so both endpoints
        // are also near the opposite leg.
        let route = Polyline::new(points![(0, 0), (0, 1), (0.05, 1), (0.05, 0)])?;
        let max_dist = 10_000.0 * M;
        assert!(distance(&point!(0, 0), &point!(0.05, 0)) < max_dist);

        let history = points![(0, 0), (0.05, 0)];
        assert!(passes_within(&history, &point!(0, 0.5), &route, max_dist));
        assert!(passes_within(&history, &point!(0.05, 0.5), &route, max_dist));
        assert!(passes_within(&history, &point!(0.03, 1), &route, max_dist));
        assert!(passes(&history, &point!(0, 0.5), &route));
        Ok(())
    }

    #[test]
    fn test_crossing_on_return_leg() -> Result<()> {
        // Out and back along the same road, with the legs about 11 m apart.
        let route = Polyline::new(points![(0, 0), (0, 1), (0.0001, 1), (0.0001, 0)])?;
        let max_dist = 50.0 * M;
        let stop = point!(0.00005, 0.5);

        let history = points![(0.0001, 0.6), (0.0001, 0.4)];
        let crossing = find_crossing(&history, &stop, &route, max_dist).unwrap();
        assert_eq!(crossing.direction, Direction::Forward);
        assert_eq!(crossing.sample_index, 1);
        assert_relative_eq!(
            crossing.stop_position.value_unsafe,
            arc_length_position(&route, 2, 0.5).unwrap().value_unsafe,
            max_relative = 1e-9
        );

        // Traveling the outbound leg crosses the stop's first position.
        let history = points![(0, 0.4), (0, 0.6)];
        let crossing = find_crossing(&history, &stop, &route, max_dist).unwrap();
        assert_eq!(crossing.direction, Direction::Forward);
        assert_relative_eq!(
            crossing.stop_position.value_unsafe,
            arc_length_position(&route, 0, 0.5).unwrap().value_unsafe,
            max_relative = 1e-9
        );
        Ok(())
    }

    #[test]
    fn test_loop_crossing_direction() -> Result<()> {
        let route = square_loop()?;
        let max_dist = distance(&point!(0, 0), &point!(0.1, 0));
        let history: Vec<Point> = points![(0.1, 0), (0, 0), (0, 0.1)];

        let crossing = find_crossing(&history, &point!(0, 0), &route, max_dist).unwrap();
        assert_eq!(crossing.direction, Direction::Forward);
        assert_eq!(crossing.sample_index, 1);
        Ok(())
    }
}
