use std::hash::{Hash, Hasher};

use approx::{AbsDiffEq, RelativeEq, abs_diff_eq, relative_eq};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypeError {
    #[error("geographic point invariant: invalid value {1:?} for {0:?}")]
    GeoPointInvariant(GeoPointDimension, f64),
    #[error("a polyline needs at least one point")]
    EmptyPolyline,
}

type Result<T> = std::result::Result<T, TypeError>;

#[derive(Debug)]
pub enum GeoPointDimension {
    Latitude,
    Longitude,
}

/// A latitude/longitude pair in decimal degrees.
///
/// `x` is the latitude and `y` the longitude. Points compare and hash by
/// value, so they can be used as map keys.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Construct a point, enforcing valid latitude and longitude ranges.
    pub fn checked(lat: f64, lon: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(TypeError::GeoPointInvariant(
                GeoPointDimension::Latitude,
                lat,
            ));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(TypeError::GeoPointInvariant(
                GeoPointDimension::Longitude,
                lon,
            ));
        }
        Ok(Self::new(lat, lon))
    }

    /// Point latitude
    pub fn lat(&self) -> f64 {
        self.x
    }

    /// Point longitude
    pub fn lon(&self) -> f64 {
        self.y
    }
}

impl Eq for Point {}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Adding zero folds -0.0 into 0.0 so equal points hash equally.
        (self.x + 0.0).to_bits().hash(state);
        (self.y + 0.0).to_bits().hash(state);
    }
}

impl AbsDiffEq for Point {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        abs_diff_eq!(self.x, other.x, epsilon = epsilon)
            && abs_diff_eq!(self.y, other.y, epsilon = epsilon)
    }
}

impl RelativeEq for Point {
    fn default_max_relative() -> Self::Epsilon {
        0.000_000_000_000_001
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        relative_eq!(
            self.x,
            other.x,
            epsilon = epsilon,
            max_relative = max_relative
        ) && relative_eq!(
            self.y,
            other.y,
            epsilon = epsilon,
            max_relative = max_relative
        )
    }
}

/// A directed line segment from `a` to `b`.
///
/// Zero-length segments (`a == b`) are allowed.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Segment {
    pub a: Point,
    pub b: Point,
}

impl Segment {
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }
}

/// An ordered, non-empty sequence of points.
///
/// Point order defines the direction of travel along the path.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Polyline {
    points: Vec<Point>,
}

impl Polyline {
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.is_empty() {
            return Err(TypeError::EmptyPolyline);
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of points in the polyline.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false, since polylines have at least one point. Provided for
    /// symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Point {
        self.points[0]
    }

    pub fn last(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    /// The polyline's `n - 1` consecutive segments.
    pub fn segments(&self) -> impl ExactSizeIterator<Item = Segment> + '_ {
        self.points.windows(2).map(|w| Segment::new(w[0], w[1]))
    }

    /// Get the segment at `index`.
    ///
    /// A single-point polyline exposes its lone point as a zero-length
    /// segment at index 0.
    pub fn segment(&self, index: usize) -> Option<Segment> {
        if self.points.len() == 1 && index == 0 {
            return Some(Segment::new(self.points[0], self.points[0]));
        }
        match (self.points.get(index), self.points.get(index + 1)) {
            (Some(a), Some(b)) => Some(Segment::new(*a, *b)),
            _ => None,
        }
    }
}

impl TryFrom<Vec<Point>> for Polyline {
    type Error = TypeError;

    fn try_from(points: Vec<Point>) -> Result<Self> {
        Self::new(points)
    }
}

/// Instantiate a [`Point`] with a tuple-like syntax.
#[macro_export]
macro_rules! point {
    ( $lat:expr, $lon:expr $(,)? ) => {
        $crate::types::Point::new(($lat) as f64, ($lon) as f64)
    };
}

/// Instantiate a vec of [`Point`] with tuple-like syntax.
#[macro_export]
macro_rules! points {
    ( $( ( $lat:expr, $lon:expr $(,)? ) ),* $(,)? ) => {
        vec![ $( $crate::point!($lat, $lon) ),* ]
    };
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use anyhow::Result;

    use super::{Point, Polyline, Segment, TypeError};

    #[test]
    fn test_checked_point() -> Result<()> {
        let p = Point::checked(45.0, -122.0)?;
        assert_eq!((p.lat(), p.lon()), (45.0, -122.0));
        assert!(matches!(
            Point::checked(91.0, 0.0),
            Err(TypeError::GeoPointInvariant(_, _))
        ));
        assert!(matches!(
            Point::checked(0.0, -180.5),
            Err(TypeError::GeoPointInvariant(_, _))
        ));
        Ok(())
    }

    #[test]
    fn test_point_hash_by_value() {
        let mut set = HashSet::new();
        set.insert(point!(1.5, 2.5));
        set.insert(point!(1.5, 2.5));
        set.insert(Point::new(0.0, 0.0));
        set.insert(Point::new(-0.0, 0.0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_empty_polyline() {
        assert!(matches!(
            Polyline::new(vec![]),
            Err(TypeError::EmptyPolyline)
        ));
    }

    #[test]
    fn test_polyline_segments() -> Result<()> {
        let poly = Polyline::new(points![(0, 0), (0, 1), (1, 1)])?;
        let segments = poly.segments().collect::<Vec<_>>();
        assert_eq!(
            segments,
            vec![
                Segment::new(point!(0, 0), point!(0, 1)),
                Segment::new(point!(0, 1), point!(1, 1)),
            ]
        );
        assert_eq!(poly.segment(1), Some(segments[1]));
        assert_eq!(poly.segment(2), None);
        Ok(())
    }

    #[test]
    fn test_single_point_polyline_segment() -> Result<()> {
        let poly = Polyline::new(points![(3, 4)])?;
        assert_eq!(poly.segments().len(), 0);
        let seg = poly.segment(0).unwrap();
        assert_eq!(seg.a, seg.b);
        assert_eq!(poly.first(), poly.last());
        Ok(())
    }

    #[test]
    fn test_polyline_equality() -> Result<()> {
        let a = Polyline::new(points![(0, 0), (0, 1)])?;
        let b = Polyline::try_from(points![(0, 0), (0, 1)])?;
        let c = Polyline::new(points![(0, 1), (0, 0)])?;
        assert_eq!(a, b);
        assert_ne!(a, c);
        Ok(())
    }
}
