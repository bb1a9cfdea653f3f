use calib_ar::{AppConfig, ArStyle, BoardPattern, CellSize, ConfigError, Pipeline, SelectionMode};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Calibrate a camera from chessboard footage and replay it with an AR overlay"
)]
struct Args {
    /// JSON config; command-line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Video file, directory of frames or single image.
    source: Option<PathBuf>,

    /// Use every frame instead of selecting interactively.
    #[arg(long)]
    all: bool,

    /// Key wait per frame while browsing, in milliseconds.
    #[arg(long)]
    wait_ms: Option<u64>,

    /// Interior corners along the board x axis.
    #[arg(long, requires = "rows")]
    columns: Option<u32>,

    /// Interior corners along the board y axis.
    #[arg(long, requires = "columns")]
    rows: Option<u32>,

    /// Square side length, in the unit the poses should use.
    #[arg(long)]
    cell_size: Option<f64>,

    /// Write overlay frames here instead of opening a window.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Draw a cylinder standing on the board instead of the flat ring.
    #[arg(long)]
    extruded: bool,

    /// off, error, warn, info, debug or trace.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines (with the `tracing` feature).
    #[cfg(feature = "tracing")]
    #[arg(long)]
    json_logs: bool,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = build_config(&args)?;
    init_logging(&args, &config)?;

    let report = Pipeline::new(config).run()?;
    let k = report.model.intrinsic_matrix();
    println!("frames used: {}", report.model.extrinsics.len());
    println!("rms: {:.4}", report.model.rms);
    println!("fx fy cx cy: {:.3} {:.3} {:.3} {:.3}", k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)]);
    println!("distortion: {:?}", report.model.distortion());
    Ok(())
}

fn build_config(args: &Args) -> Result<AppConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_json(path)?,
        None => AppConfig::default(),
    };
    if let Some(source) = &args.source {
        config.source = Some(source.clone());
    }
    if args.all {
        config.selection.mode = SelectionMode::All;
    }
    if let Some(ms) = args.wait_ms {
        config.selection.wait_ms = ms;
    }
    if let (Some(columns), Some(rows)) = (args.columns, args.rows) {
        config.pattern = BoardPattern::new(columns, rows)?;
    }
    if let Some(size) = args.cell_size {
        config.cell_size = CellSize::new(size)?;
    }
    if let Some(dir) = &args.output_dir {
        config.playback.output_dir = Some(dir.clone());
    }
    if args.extruded {
        config.ar.style = ArStyle::Extruded;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

#[cfg(not(feature = "tracing"))]
fn init_logging(_args: &Args, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    calib_ar::core::init_with_level(config.level_filter()?)?;
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(args: &Args, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level = config.level_filter()?;
    tracing_log::LogTracer::init()?;
    log::set_max_level(level);
    calib_ar::core::init_tracing(level, args.json_logs);
    Ok(())
}
