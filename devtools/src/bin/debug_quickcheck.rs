use anyhow::bail;
use clap::Parser;
use regex::Regex;
use routematch::{Point, Segment, distance, point_to_segment};

/// Debugs output from failed quickcheck runs
///
/// Takes on stdin the copy-pasted output from failed runs of the qc_ tests
/// for a segment and a point, and prints the projection of the point onto the
/// segment along with the distances involved.
#[derive(Parser)]
struct Cli {
    /// Divisor turning the generated integers into degrees, matching the one
    /// used by the property tests
    #[clap(long, default_value_t = 1000.0)]
    scale: f64,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let mut input = String::new();
    eprint!("Enter output: ");
    std::io::stdin().read_line(&mut input)?;

    let re = Regex::new(r"-?\d+(\.\d+)?")?;
    let ns = re
        .find_iter(&input)
        .filter_map(|digits| digits.as_str().parse::<f64>().ok())
        .map(|n| n / args.scale)
        .collect::<Vec<f64>>();

    if ns.len() != 6 {
        bail!("Expected six numbers in input");
    }

    let seg = Segment::new(Point::new(ns[0], ns[1]), Point::new(ns[2], ns[3]));
    let p = Point::new(ns[4], ns[5]);

    let sln = point_to_segment(&p, &seg);
    println!("segment: {:?} -> {:?}", seg.a, seg.b);
    println!("point: {:?}", p);
    println!("t = {}", sln.t);
    println!("projection: {:?}", sln.point);
    println!("distance to projection: {}", sln.distance);
    println!("distance to a: {}", distance(&p, &seg.a));
    println!("distance to b: {}", distance(&p, &seg.b));
    Ok(())
}
