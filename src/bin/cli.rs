use std::fmt::Write;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use clap::builder::styling::Styles;
use clap::{Args, ColorChoice, Parser, Subcommand, ValueEnum, crate_version};
use clap_cargo::style::{ERROR, HEADER, INVALID, LITERAL, PLACEHOLDER, USAGE, VALID};
use dimensioned::si::{M, Meter};
use regex::Regex;
use routematch::feed::FeedError;
use routematch::{
    GuessError, Point, RouteMatchError, ShapesMap, best_route, find_crossing, guess_route,
    load_routes, route_histo,
};
use strum::Display;
use sys_locale::get_locale;
use tracing::level_filters::LevelFilter;
use tracing::{Level, debug, info, instrument};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry, fmt};

pub const CLAP_STYLING: Styles = Styles::styled()
    .header(HEADER)
    .usage(USAGE)
    .literal(LITERAL)
    .placeholder(PLACEHOLDER)
    .error(ERROR)
    .valid(VALID)
    .invalid(INVALID);

static LONG_VERSION: LazyLock<String> =
    LazyLock::new(|| format!("{} (rustc {})", crate_version!(), env!("RUSTC_VERSION")));

static POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*$").unwrap()
});

/// Match vehicle positions against the routes of a GTFS feed
///
/// Reads trips.txt and shapes.txt from a GTFS feed directory, then guesses
/// which route a vehicle is on or checks whether it passed a stop.
#[derive(Parser)]
#[command(
    name = "routematch",
    version,
    long_version = LONG_VERSION.as_str(),
    about,
    color = ColorChoice::Auto,
    styles = CLAP_STYLING,
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,

    /// Configure diagnostic logging level
    ///
    /// Set to DEBUG to see a performance summary following execution.
    #[clap(long, short = 'L', default_value_t = Level::ERROR)]
    log_level: Level,

    /// Log to a file
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// The unit of distance used in output on the command line.
    ///
    /// If unspecified, this will default to either km or mi based on your
    /// system locale.
    #[clap(long, short = 'u', default_value_t = DistUnit::Autodetect)]
    distance_unit: DistUnit,
}

#[derive(Copy, Clone, Display, ValueEnum)]
#[strum(serialize_all = "kebab-case")]
#[clap(rename_all = "kebab-case")]
enum DistUnit {
    Autodetect,
    M,
    Km,
    Mi,
}

impl DistUnit {
    fn get(self) -> DistUnit {
        match self {
            Self::Autodetect => Self::auto_detect(),
            _ => self,
        }
    }

    fn auto_detect() -> DistUnit {
        let locale = get_locale().unwrap_or_else(|| String::from("en-US"));
        match locale.as_str() {
            "en-US" | "en-GB" => Self::Mi,
            _ => Self::Km,
        }
    }

    fn format(self, distance: Meter<f64>) -> String {
        let meters = distance.value_unsafe;
        match self.get() {
            Self::Km => format!("{:.3} km", meters / 1000.0),
            Self::Mi => format!("{:.3} mi", meters / 1609.344),
            _ => format!("{:.1} m", meters),
        }
    }
}

/// Parse a "LAT,LON" pair.
fn parse_point(s: &str) -> std::result::Result<Point, String> {
    let caps = POINT_RE
        .captures(s)
        .ok_or_else(|| format!("expected LAT,LON but got {s:?}"))?;
    let lat = caps[1].parse::<f64>().map_err(|e| e.to_string())?;
    let lon = caps[2].parse::<f64>().map_err(|e| e.to_string())?;
    Point::checked(lat, lon).map_err(|e| e.to_string())
}

#[derive(Args, Debug)]
struct GuessArgs {
    /// GTFS feed directory containing trips.txt and shapes.txt
    feed: PathBuf,

    /// Vehicle position as LAT,LON
    #[clap(long, short, value_parser = parse_point, allow_hyphen_values = true)]
    point: Point,
}

#[derive(Args, Debug)]
struct HistoArgs {
    /// GTFS feed directory containing trips.txt and shapes.txt
    feed: PathBuf,

    /// Vehicle positions as LAT,LON, oldest first
    #[clap(long = "point", short, value_parser = parse_point, allow_hyphen_values = true, required = true)]
    points: Vec<Point>,

    /// Only print the best scoring routes
    #[clap(long, short)]
    top: Option<usize>,
}

#[derive(Args, Debug)]
struct PassesArgs {
    /// GTFS feed directory containing trips.txt and shapes.txt
    feed: PathBuf,

    /// Shape whose route geometry to check against
    #[clap(long, short)]
    shape_id: String,

    /// Stop position as LAT,LON
    #[clap(long, value_parser = parse_point, allow_hyphen_values = true)]
    stop: Point,

    /// Vehicle positions as LAT,LON, oldest first
    #[clap(long = "point", short, value_parser = parse_point, allow_hyphen_values = true, required = true)]
    points: Vec<Point>,

    /// Max distance from the route at which a position is matched to it, in
    /// meters
    ///
    /// Needed to tell apart the parts of routes that loop back on themselves.
    /// If unspecified, each position is matched to its nearest point on the
    /// route.
    #[clap(long, short)]
    max_dist: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Guess which route a vehicle is on from its current position
    Guess(GuessArgs),

    /// Score every route against a history of vehicle positions
    ///
    /// Lower scores are better. Routes are listed best first.
    Histo(HistoArgs),

    /// Check whether a history of vehicle positions passed a stop
    Passes(PassesArgs),

    /// Print software license info
    License,
}

fn load(feed: &Path) -> Result<ShapesMap> {
    let res = load_routes(feed);
    let shapes_map = match &res {
        Err(RouteMatchError::Feed(FeedError::Io(_, _))) => res.context(concat!(
            "Reading the GTFS <FEED>. Check that the directory exists and contains ",
            "trips.txt and shapes.txt."
        )),
        Err(RouteMatchError::Feed(FeedError::Shape(_))) => {
            res.context("The feed assigns a shape to more than one route, so it can't be used.")
        }
        Err(RouteMatchError::Guess(GuessError::NoCandidateRoutes)) => {
            res.context("The feed does not contain any routes with shapes")
        }
        _ => res.map_err(anyhow::Error::from),
    }?;
    info!("Loaded {} route shapes from {:?}", shapes_map.len(), feed);
    Ok(shapes_map)
}

#[instrument(level = "trace", skip_all)]
fn guess_cmd(args: &Cli, sub_args: &GuessArgs) -> Result<String> {
    debug!("guess args: {:?}", sub_args);
    let shapes_map = load(&sub_args.feed)?;
    let (key, distance) = guess_route(&shapes_map, &sub_args.point)?;
    Ok(format!(
        "{}\t{}\n",
        key,
        args.distance_unit.format(distance)
    ))
}

#[instrument(level = "trace", skip_all)]
fn histo_cmd(args: &Cli, sub_args: &HistoArgs) -> Result<String> {
    debug!("histo args: {:?}", sub_args);
    let shapes_map = load(&sub_args.feed)?;
    let mut histo = route_histo(&shapes_map, &sub_args.points)?;
    if let Some((key, _)) = best_route(&histo) {
        info!("Best route: {}", key);
    }

    histo.sort_by(|a, b| a.1.value_unsafe.total_cmp(&b.1.value_unsafe));
    let top = sub_args.top.unwrap_or(histo.len());
    let mut r = String::new();
    for (key, score) in histo.iter().take(top) {
        writeln!(&mut r, "{}\t{}", key, args.distance_unit.format(*score))?;
    }
    Ok(r)
}

#[instrument(level = "trace", skip_all)]
fn passes_cmd(_args: &Cli, sub_args: &PassesArgs) -> Result<String> {
    debug!("passes args: {:?}", sub_args);
    let max_dist = match sub_args.max_dist {
        Some(d) if d < 0.0 => bail!("Max distance cannot be negative"),
        Some(d) => d * M,
        None => f64::INFINITY * M,
    };

    let shapes_map = load(&sub_args.feed)?;
    let (key, route) = shapes_map
        .find_shape(&sub_args.shape_id)
        .next()
        .ok_or_else(|| anyhow!("No shape {:?} in the feed", sub_args.shape_id))?;
    debug!("Checking against {}", key);

    let r = match find_crossing(&sub_args.points, &sub_args.stop, route, max_dist) {
        Some(crossing) => format!(
            "passed {} at position {}\n",
            crossing.direction, crossing.sample_index
        ),
        None => "not passed\n".to_owned(),
    };
    Ok(r)
}

fn license_cmd() -> Result<String> {
    let mut r = include_str!("../../LICENSE.txt").to_string();
    writeln!(
        &mut r,
        "\nroutematch {} depends on third-party crates under their own licenses.",
        crate_version!(),
    )?;
    Ok(r)
}

fn main() -> Result<()> {
    // Intentionally avoid wrapping argument parsing errors in anyhow::Result so
    // we preserve Clap's pretty formatting of usage info.
    let args = Cli::parse();

    let log_w: Box<dyn std::io::Write + Send> = match &args.log_file {
        Some(path) => Box::new(File::create(path).context("Creating the log file")?),
        None => Box::new(std::io::stderr()),
    };
    let (appender, _guard) = tracing_appender::non_blocking(log_w);

    // Enable the TRACE-level span tree layer for fmt logging level DEBUG.
    let fmt_layer = fmt::Layer::new()
        .with_writer(appender)
        .with_ansi(args.log_file.is_none())
        .with_target(false)
        .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
        .with_filter(LevelFilter::from_level(args.log_level));
    if args.log_level >= Level::DEBUG {
        let span_tree_layer = tracing_span_tree::SpanTree::default().aggregate(true);
        tracing::subscriber::set_global_default(
            Registry::default().with(fmt_layer).with(span_tree_layer),
        )?;
    } else {
        tracing::subscriber::set_global_default(Registry::default().with(fmt_layer))?;
    }

    debug!("routematch {}", clap::crate_version!());

    let report = match &args.cmd {
        Commands::Guess(sub_args) => guess_cmd(&args, sub_args),
        Commands::Histo(sub_args) => histo_cmd(&args, sub_args),
        Commands::Passes(sub_args) => passes_cmd(&args, sub_args),
        Commands::License => license_cmd(),
    }?;

    print!("{report}");
    Ok(())
}
