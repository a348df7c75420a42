//! cuetrace CLI — billiard clip analysis from a frame sequence.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cuetrace::dataset;
use cuetrace::pipeline::colorize_labels;
use cuetrace::{FramePipeline, GroundTruth, PipelineConfig};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "cuetrace")]
#[command(about = "Analyze a fixed-camera billiard clip: table, balls, tracks, minimap, metrics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over one clip directory.
    Run {
        /// Clip directory (frames/, masks/, bounding_boxes/).
        #[arg(long)]
        clip: PathBuf,

        /// Output directory for annotated frames and metrics.
        #[arg(long)]
        out: PathBuf,

        /// Optional minimap background image.
        #[arg(long)]
        minimap: Option<PathBuf>,

        /// Re-run table segmentation on every frame.
        #[arg(long)]
        every_frame: bool,

        /// Skip ground-truth loading and scoring.
        #[arg(long)]
        no_score: bool,
    },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            clip,
            out,
            minimap,
            every_frame,
            no_score,
        } => run_clip(&clip, &out, minimap.as_deref(), every_frame, no_score),
    }
}

fn run_clip(
    clip_dir: &std::path::Path,
    out_dir: &std::path::Path,
    minimap_path: Option<&std::path::Path>,
    every_frame: bool,
    no_score: bool,
) -> CliResult<()> {
    let frame_paths = dataset::frame_paths(clip_dir)?;
    tracing::info!("Clip {}: {} frames", clip_dir.display(), frame_paths.len());

    let config = PipelineConfig {
        segment_every_frame: every_frame,
        ..PipelineConfig::default()
    };
    let mut pipeline = match minimap_path {
        Some(path) => {
            let background = image::open(path)
                .map_err(|e| -> CliError {
                    format!("Failed to open minimap {}: {}", path.display(), e).into()
                })?
                .into_rgb8();
            FramePipeline::with_minimap(config, &background)
        }
        None => FramePipeline::new(config),
    };

    std::fs::create_dir_all(out_dir)?;
    let frames_out = out_dir.join("annotated");
    std::fs::create_dir_all(&frames_out)?;

    let mut last_frame = None;
    for path in &frame_paths {
        let frame = image::open(path)
            .map_err(|e| -> CliError {
                format!("Failed to open frame {}: {}", path.display(), e).into()
            })?
            .into_rgb8();

        let analysis = pipeline.process_frame(&frame)?;
        let name = path
            .file_name()
            .ok_or_else(|| -> CliError { format!("bad frame path {}", path.display()).into() })?;
        analysis.annotated.save(frames_out.join(name))?;

        tracing::debug!(
            frame = analysis.index,
            balls = analysis.snapshot.ids.len(),
            "frame processed"
        );
        last_frame = Some(frame);
    }

    let last_frame = last_frame.ok_or_else(|| -> CliError { "clip has no frames".into() })?;
    pipeline.redetect_final(&last_frame)?;

    write_detection_artifacts(&pipeline, out_dir)?;

    if no_score {
        tracing::info!("Scoring skipped");
        return Ok(());
    }

    let truth = GroundTruth::load(clip_dir)?;
    let metrics = pipeline.score(&truth)?;
    tracing::info!(map = metrics.map, miou = metrics.miou, "run scored");

    let json = serde_json::to_string_pretty(&metrics)?;
    let metrics_path = out_dir.join("metrics.json");
    std::fs::write(&metrics_path, &json)?;
    tracing::info!("Metrics written to {}", metrics_path.display());

    Ok(())
}

/// Dump the first/last-frame box tables and colorized label rasters next
/// to the annotated frames.
fn write_detection_artifacts(pipeline: &FramePipeline, out_dir: &std::path::Path) -> CliResult<()> {
    let passes = [
        ("first", pipeline.first_detection()),
        ("last", pipeline.last_detection()),
    ];
    for (tag, detection) in passes {
        let Some(detection) = detection else { continue };

        let mut rows = String::new();
        for rec in &detection.box_table {
            rows.push_str(&format!(
                "{} {} {} {} {}\n",
                rec.rect.x, rec.rect.y, rec.rect.width, rec.rect.height, rec.class
            ));
        }
        std::fs::write(out_dir.join(format!("frame_{tag}_bbox.txt")), rows)?;

        colorize_labels(&detection.labels).save(out_dir.join(format!("frame_{tag}_labels.png")))?;
    }
    Ok(())
}
