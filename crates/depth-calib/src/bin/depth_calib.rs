//! depth-calib CLI: offline affine calibration helpers.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use depth_calib::core::{centroid, solve_affine, AffineFit, AffineSolveParams};
use depth_calib::{
    AffineTransform, AnchorId, DepthCalibConfig, FrameTransformer, MarkerReport, Position,
    RemoteMessage,
};
use log::{info, LevelFilter};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "depth-calib")]
#[command(about = "Fit and apply camera -> target affine transforms from anchor correspondences")]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve the affine transform from paired anchors.
    Solve(SolveArgs),

    /// Map points through a solved transform.
    Apply(ApplyArgs),

    /// Integer area centroid of a polygon.
    Centroid {
        /// Vertices as "x,y;x,y;...".
        #[arg(long, allow_hyphen_values = true)]
        vertices: String,
    },

    /// Write a default run configuration.
    DefaultConfig {
        /// Path to write the config (JSON).
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct SolveArgs {
    /// JSON file with `{"pairs": [{"id", "source", "target"}]}`.
    #[arg(long)]
    input: PathBuf,

    /// Path to write the fit (JSON). Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Reject fits whose singular value ratio falls below this.
    #[arg(long, default_value_t = AffineSolveParams::default().min_relative_singular_value)]
    min_relative_singular_value: f64,
}

#[derive(Debug, Clone, Args)]
struct ApplyArgs {
    /// Fit written by `solve`, or bare 4x4 rows.
    #[arg(long)]
    transform: PathBuf,

    /// JSON list of `{"id", "position"}` (bare or under "messages").
    #[arg(long)]
    points: PathBuf,

    /// Path to write the transformed points (JSON). Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct PairFile {
    pairs: Vec<PairEntry>,
}

#[derive(Debug, Deserialize)]
struct PairEntry {
    id: AnchorId,
    source: Position,
    target: Position,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TransformFile {
    Fit(AffineFit),
    Rows(AffineTransform),
}

#[derive(Serialize)]
struct CentroidOutput {
    x: i32,
    y: i32,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Solve(args) => run_solve(&args),
        Commands::Apply(args) => run_apply(&args),
        Commands::Centroid { vertices } => run_centroid(&vertices),
        Commands::DefaultConfig { out } => run_default_config(&out),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, _) => LevelFilter::Debug,
    };
    #[cfg(feature = "tracing")]
    {
        let _ = level;
        depth_calib::init_tracing(false);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = depth_calib::core::init_with_level(level);
    }
}

fn emit(json: &str, out: Option<&Path>) -> CliResult<()> {
    match out {
        Some(path) => {
            fs::write(path, json)?;
            info!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_solve(args: &SolveArgs) -> CliResult<()> {
    let raw = fs::read_to_string(&args.input)?;
    let mut file: PairFile = serde_json::from_str(&raw)?;
    file.pairs.sort_by(|a, b| a.id.cmp(&b.id));
    if let Some(w) = file.pairs.windows(2).find(|w| w[0].id == w[1].id) {
        return Err(format!("duplicate anchor id {}", w[0].id).into());
    }
    info!("solving from {} pairs", file.pairs.len());

    let pairs: Vec<(Point3<f64>, Point3<f64>)> = file
        .pairs
        .iter()
        .map(|p| (p.source.into(), p.target.into()))
        .collect();
    let params = AffineSolveParams {
        min_relative_singular_value: args.min_relative_singular_value,
    };
    let fit = solve_affine(&pairs, &params)?;
    info!("rms residual {:.6}", fit.rms_residual);

    emit(&serde_json::to_string_pretty(&fit)?, args.out.as_deref())
}

fn run_apply(args: &ApplyArgs) -> CliResult<()> {
    let raw = fs::read_to_string(&args.transform)?;
    let transform = match serde_json::from_str::<TransformFile>(&raw)? {
        TransformFile::Fit(fit) => fit.transform,
        TransformFile::Rows(t) => t,
    };
    let points: RemoteMessage = serde_json::from_str(&fs::read_to_string(&args.points)?)?;
    let mapped = FrameTransformer::new(transform).apply_all(points.points());
    let report = MarkerReport::from_points(&mapped);
    emit(&serde_json::to_string_pretty(&report)?, args.out.as_deref())
}

fn run_centroid(vertices: &str) -> CliResult<()> {
    let vertices = parse_vertices(vertices)?;
    let c = centroid(&vertices)?;
    println!("{}", serde_json::to_string(&CentroidOutput { x: c.x, y: c.y })?);
    Ok(())
}

fn run_default_config(out: &Path) -> CliResult<()> {
    DepthCalibConfig::default().write_json(out)?;
    info!("wrote {}", out.display());
    Ok(())
}

fn parse_vertices(raw: &str) -> CliResult<Vec<Point2<f32>>> {
    raw.split(';')
        .filter(|s| !s.trim().is_empty())
        .map(|pair| -> CliResult<Point2<f32>> {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| format!("vertex `{pair}` is not `x,y`"))?;
            Ok(Point2::new(x.trim().parse::<f32>()?, y.trim().parse::<f32>()?))
        })
        .collect()
}
