//! Algorithms for projecting points onto routes
//!
//! To work out where a vehicle or a stop sits along a route, we project its
//! position onto the segments of the route's polyline. This module implements
//! the projections themselves, along with the arc-length bookkeeping that
//! turns a projection into a one-dimensional position along the route.

use std::ops::Mul;

use dimensioned::si::{M, Meter};
use tracing::instrument;

use crate::geographic::distance;
use crate::types::{Point, Polyline, Segment};

/// The result of projecting a point onto a single segment.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SegmentProjection {
    /// Position of the projection within the segment, from 0 at `a` to 1 at
    /// `b`.
    pub t: f64,

    /// The projected point on the segment.
    pub point: Point,

    /// Great-circle distance between the input point and its projection.
    pub distance: Meter<f64>,
}

/// The result of projecting a point onto one segment of a polyline.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PolylineProjection {
    /// Index of the segment the point was projected onto.
    pub segment_index: usize,

    /// Position within the segment, see [`SegmentProjection::t`].
    pub t: f64,

    /// The projected point on the polyline.
    pub point: Point,

    /// Great-circle distance between the input point and its projection.
    pub distance: Meter<f64>,
}

/// A projection together with its distance along the polyline.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RoutePosition {
    pub projection: PolylineProjection,

    /// Distance along the polyline from its first point to the projected
    /// point.
    pub arc_length: Meter<f64>,
}

/// Project a point onto a segment
///
/// The point is projected onto the infinite line through the segment in
/// (latitude, longitude) coordinate space, and the projection parameter is
/// clamped to `[0, 1]` so the result lies on the segment itself. The returned
/// distance is the great-circle distance to that clamped point.
///
/// A zero-length segment projects everything onto its start point.
pub fn point_to_segment(p: &Point, segment: &Segment) -> SegmentProjection {
    let b = subtract_points(&segment.b, &segment.a);
    let a = subtract_points(p, &segment.a);

    let length2 = dot2(b, b);
    let t = if length2 > 0.0 {
        (dot2(a, b) / length2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let offset = b * t;
    let point = Point::new(segment.a.x + offset.x, segment.a.y + offset.y);

    SegmentProjection {
        t,
        point,
        distance: distance(p, &point),
    }
}

/// Project a point onto every segment of a polyline, in segment order.
///
/// A single-point polyline yields one projection onto its lone point.
pub fn project_onto_segments<'a>(
    p: &'a Point,
    polyline: &'a Polyline,
) -> impl Iterator<Item = PolylineProjection> + 'a {
    let count = polyline.segments().len().max(1);
    (0..count).filter_map(move |segment_index| {
        polyline.segment(segment_index).map(|segment| {
            let sln = point_to_segment(p, &segment);
            PolylineProjection {
                segment_index,
                t: sln.t,
                point: sln.point,
                distance: sln.distance,
            }
        })
    })
}

/// Find the segment of a polyline nearest to a point
///
/// Ties are broken in favor of the lowest segment index.
pub fn point_to_polyline(p: &Point, polyline: &Polyline) -> PolylineProjection {
    let mut best: Option<PolylineProjection> = None;
    for sln in project_onto_segments(p, polyline) {
        match &best {
            Some(current) if sln.distance >= current.distance => (),
            _ => best = Some(sln),
        }
    }

    // Every polyline has at least one segment to project onto, including the
    // zero-length one standing in for a single point.
    best.unwrap_or(PolylineProjection {
        segment_index: 0,
        t: 0.0,
        point: polyline.first(),
        distance: distance(p, &polyline.first()),
    })
}

/// Cumulative segment lengths along a polyline.
///
/// Entry `i` is the great-circle length of the polyline from its first point
/// up to point `i`.
#[derive(Clone, PartialEq, Debug)]
pub struct ArcLengths(Vec<f64>);

impl ArcLengths {
    pub fn new(polyline: &Polyline) -> Self {
        let mut cumulative = Vec::with_capacity(polyline.len());
        let mut total = 0.0;
        cumulative.push(total);
        for segment in polyline.segments() {
            total += distance(&segment.a, &segment.b).value_unsafe;
            cumulative.push(total);
        }
        Self(cumulative)
    }

    /// Total length of the polyline.
    pub fn total(&self) -> Meter<f64> {
        self.0.last().copied().unwrap_or(0.0) * M
    }

    /// Distance along the polyline at fraction `t` of segment
    /// `segment_index`, or `None` if there is no such segment.
    pub fn position(&self, segment_index: usize, t: f64) -> Option<Meter<f64>> {
        if self.0.len() == 1 && segment_index == 0 {
            return Some(0.0 * M);
        }
        let start = *self.0.get(segment_index)?;
        let end = *self.0.get(segment_index + 1)?;
        Some((start + t * (end - start)) * M)
    }
}

/// Calculate how far along a polyline a projected point sits
///
/// Sums the great-circle lengths of the segments before `segment_index`, then
/// adds fraction `t` of that segment's own length. Returns `None` if the
/// polyline has no segment at `segment_index`.
pub fn arc_length_position(
    polyline: &Polyline,
    segment_index: usize,
    t: f64,
) -> Option<Meter<f64>> {
    ArcLengths::new(polyline).position(segment_index, t)
}

impl Polyline {
    /// The great-circle length of the whole polyline.
    pub fn total_length(&self) -> Meter<f64> {
        ArcLengths::new(self).total()
    }
}

/// A candidate whose distance from some reference point has been measured.
pub trait NearbySegment<D>
where
    Self: Copy,
    D: Copy + PartialOrd,
{
    /// The candidate's minimum distance from the reference point.
    fn projection_distance(self) -> D;
}

impl NearbySegment<Meter<f64>> for PolylineProjection {
    fn projection_distance(self) -> Meter<f64> {
        self.distance
    }
}

/// Identifies all candidates within some threshold distance of a point.
///
/// Candidates keep their input order.
///
/// # Example
///
/// ```
/// use routematch::algorithm::{NearbySegment, find_nearby_segments};
///
/// #[derive(Clone, Copy, PartialEq, Debug)]
/// struct Seg(char, i32);
///
/// impl NearbySegment<i32> for Seg {
///     fn projection_distance(self) -> i32 {
///         self.1
///     }
/// }
///
/// let segments = vec![Seg('a', 9), Seg('b', 5), Seg('c', 2), Seg('d', 7)];
/// let result = find_nearby_segments(segments, 5);
/// assert_eq!(result, vec![Seg('b', 5), Seg('c', 2)]);
/// ```
pub fn find_nearby_segments<I, T, D>(segments: I, threshold: D) -> Vec<T>
where
    T: NearbySegment<D>,
    I: IntoIterator<Item = T>,
    D: Copy + PartialOrd,
{
    segments
        .into_iter()
        .filter(|segment| segment.projection_distance() <= threshold)
        .collect()
}

/// Locate a point along a polyline, keeping every plausible match
///
/// Returns a [`RoutePosition`] for each segment of `polyline` that passes
/// within `max_dist` of `p`, in segment order. Routes that loop back on
/// themselves can produce several positions for the same point. An infinite
/// `max_dist` instead returns just the single nearest projection.
#[instrument(level = "trace", skip_all)]
pub fn nearby_positions(
    p: &Point,
    polyline: &Polyline,
    arc_lengths: &ArcLengths,
    max_dist: Meter<f64>,
) -> Vec<RoutePosition> {
    let projections = if max_dist.value_unsafe.is_infinite() {
        vec![point_to_polyline(p, polyline)]
    } else {
        find_nearby_segments(project_onto_segments(p, polyline), max_dist)
    };

    projections
        .into_iter()
        .filter_map(|projection| {
            arc_lengths
                .position(projection.segment_index, projection.t)
                .map(|arc_length| RoutePosition {
                    projection,
                    arc_length,
                })
        })
        .collect()
}

#[derive(Clone, Copy)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

fn subtract_points(a: &Point, b: &Point) -> Vec2 {
    Vec2 {
        x: a.x - b.x,
        y: a.y - b.y,
    }
}

fn dot2(a: Vec2, b: Vec2) -> f64 {
    a.x * b.x + a.y * b.y
}
