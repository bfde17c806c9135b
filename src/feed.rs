//! GTFS feed reader
//!
//! Reads the `trips.txt` and `shapes.txt` tables of a GTFS feed into the raw
//! records consumed by [`enumerate_shapes`]. Columns other than the ones we
//! need are ignored.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::shapes::{ShapeError, ShapeRecord, ShapesMap, TripRecord, enumerate_shapes};
use crate::types::{Point, TypeError};

/// An error reading a GTFS feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("I/O error reading {}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("CSV error")]
    Csv(#[from] csv::Error),
    #[error("invalid shape point in shape {0:?}")]
    InvalidShapePoint(String, #[source] TypeError),
    #[error("inconsistent shapes")]
    Shape(#[from] ShapeError),
}

type Result<T> = std::result::Result<T, FeedError>;

/// Read trip records from a GTFS `trips.txt` table.
pub fn read_trips<R: Read>(input: R) -> Result<Vec<TripRecord>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let mut trips = Vec::new();
    for row in rdr.deserialize() {
        trips.push(row?);
    }
    Ok(trips)
}

/// Read shape point records from a GTFS `shapes.txt` table
///
/// GTFS doesn't require shape points to be listed in order. When every row
/// has a `shape_pt_sequence`, each shape's points are sorted by it, and
/// shapes keep the order in which they first appear.
pub fn read_shapes<R: Read>(input: R) -> Result<Vec<ShapeRecord>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let mut shapes: Vec<ShapeRecord> = Vec::new();
    for row in rdr.deserialize() {
        let record: ShapeRecord = row?;
        Point::checked(record.shape_pt_lat, record.shape_pt_lon)
            .map_err(|e| FeedError::InvalidShapePoint(record.shape_id.clone(), e))?;
        shapes.push(record);
    }

    if shapes.iter().all(|r| r.shape_pt_sequence.is_some()) {
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        for record in &shapes {
            let next = first_seen.len();
            first_seen.entry(record.shape_id.clone()).or_insert(next);
        }
        shapes.sort_by_key(|r| (first_seen[&r.shape_id], r.shape_pt_sequence));
    }
    Ok(shapes)
}

/// Load route shapes from a GTFS feed directory
///
/// Reads `trips.txt` and `shapes.txt` from `dir` and consolidates them with
/// [`enumerate_shapes`].
#[instrument(level = "trace", skip_all)]
pub fn load_feed<P: AsRef<Path>>(dir: P) -> Result<ShapesMap> {
    let dir = dir.as_ref();
    let trips = read_trips(open(&dir.join("trips.txt"))?)?;
    let shapes = read_shapes(open(&dir.join("shapes.txt"))?)?;
    debug!(
        "Read {} trips and {} shape points from {:?}",
        trips.len(),
        shapes.len(),
        dir
    );
    Ok(enumerate_shapes(&trips, &shapes)?)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| FeedError::Io(path.to_owned(), e))
}
