use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use featflow_cli::{Replay, ReplayConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

const USAGE: &str = "usage: featflow <config.{yaml,json}> <image_dir> [imu.csv] [--out poses.jsonl]";

struct Args {
    config: PathBuf,
    images: PathBuf,
    imu: Option<PathBuf>,
    out: Option<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut positional = Vec::new();
        let mut out = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--out" | "-o" => match args.next() {
                    Some(path) => out = Some(PathBuf::from(path)),
                    None => bail!("--out needs a path\n{USAGE}"),
                },
                "--help" | "-h" => bail!("{USAGE}"),
                _ => positional.push(PathBuf::from(arg)),
            }
        }
        let mut positional = positional.into_iter();
        let (Some(config), Some(images)) = (positional.next(), positional.next()) else {
            bail!("{USAGE}");
        };
        let imu = positional.next();
        if positional.next().is_some() {
            bail!("too many arguments\n{USAGE}");
        }
        Ok(Self {
            config,
            images,
            imu,
            out,
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let config = ReplayConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    let replay = Replay::new(config);

    let summary = match &args.out {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            replay.run(&args.images, args.imu.as_deref(), BufWriter::new(file))?
        }
        None => replay.run(&args.images, args.imu.as_deref(), io::stdout())?,
    };

    info!(
        "{} frames ({} tracked), {} IMU samples, {} active features, {} ids issued",
        summary.frames,
        summary.frames_tracked,
        summary.imu_samples,
        summary.active_features,
        summary.ids_issued
    );
    if let Some(rounds) = summary.optimizer_rounds {
        info!("optimizer ran {rounds} rounds");
    }
    Ok(())
}
