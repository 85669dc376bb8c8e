use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use skin_vision::config::VisionConfig;
use skin_vision::core_modules::draw::DrawBackend;
use skin_vision::core_modules::frame_sampler::FrameQualitySampler;
use skin_vision::{AnalysisResult, ConcernMapRenderer, FaceObservation, Frame, Landmarks, MetricView, RasterSurface, RenderStatus};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "Usage:
  visual_tester render <image> <analysis.json> <landmarks.json> <output.png> [metric_id]
  visual_tester score <landmarks.json> <image-or-dir>...";

fn main() -> Result<()> {
    init_tracing();

    // --- 1. Argument Parsing ---
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("render") if args.len() >= 5 => {
            render(&args[1], &args[2], &args[3], &args[4], args.get(5).map(String::as_str))
        }
        Some("score") if args.len() >= 3 => score(&args[1], &args[2..]),
        _ => {
            println!("{USAGE}");
            Ok(())
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("skin_vision=info,visual_tester=info"));
    let use_json = env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_file(false).with_line_number(false))
            .with(env_filter)
            .init();
    }
}

fn load_landmarks(path: &str) -> Result<Landmarks> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading landmarks {path}"))?;
    serde_json::from_str(&json).with_context(|| format!("parsing landmarks {path}"))
}

/// Draws the concern map of one analysed photo into a PNG.
fn render(image_path: &str, analysis_path: &str, landmarks_path: &str, output: &str, metric: Option<&str>) -> Result<()> {
    // --- 2. Inputs ---
    let image = image::open(image_path)
        .with_context(|| format!("opening {image_path}"))?
        .to_rgba8();
    let analysis_json =
        std::fs::read_to_string(analysis_path).with_context(|| format!("reading analysis {analysis_path}"))?;
    let analysis = AnalysisResult::from_json(&analysis_json)?;
    let landmarks = load_landmarks(landmarks_path)?;

    let view = match metric {
        Some(id) => {
            if analysis.metric(id).is_none() {
                warn!(metric = id, "metric not in analysis, nothing will be highlighted");
            }
            MetricView::Single(id.to_string())
        }
        None => MetricView::TopConcerns,
    };

    // --- 3. Rendering ---
    let config = VisionConfig::from_env();
    let mut renderer = ConcernMapRenderer::new(config.concern_map);
    renderer.set_analysis(analysis);
    let (width, height) = image.dimensions();
    if let RenderStatus::Error(message) = renderer.prepare_with_landmarks(Arc::new(image), &landmarks) {
        bail!("cannot render concern map: {message}");
    }

    let mut surface = RasterSurface::new(width, height);
    let commands = renderer.render(&view, &surface);
    surface.execute_all(&commands);

    // --- 4. Output ---
    surface
        .into_image()
        .save(output)
        .with_context(|| format!("writing {output}"))?;
    info!(output, commands = commands.len(), "concern map written");
    Ok(())
}

/// Expands directories into their files, sorted by name.
fn collect_frames(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let mut entries = std::fs::read_dir(path)
                .with_context(|| format!("listing {input}"))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect::<Vec<_>>();
            entries.sort();
            frames.extend(entries);
        } else {
            frames.push(path.to_path_buf());
        }
    }
    Ok(frames)
}

/// Prints the quality sample of each frame, as the live sampler would score it.
fn score(landmarks_path: &str, inputs: &[String]) -> Result<()> {
    let landmarks = load_landmarks(landmarks_path)?;
    let face = FaceObservation::from_landmarks(&landmarks);
    let mut sampler = FrameQualitySampler::new(VisionConfig::from_env().sampler);

    for path in collect_frames(inputs)? {
        let frame = match image::open(&path) {
            Ok(image) => Frame::from_image(image.to_rgba8()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable frame");
                continue;
            }
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping empty frame");
                continue;
            }
        };
        let sample = sampler.sample(&frame, &face);
        let warnings: Vec<&str> = sample.warnings.iter().map(|w| w.message()).collect();
        println!(
            "{}: score={:.3} brightness={:.3} sharpness={:.3} pose={} warnings=[{}]",
            path.display(),
            sample.score,
            sample.brightness,
            sample.sharpness,
            sample.pose.as_str(),
            warnings.join("; ")
        );
    }
    Ok(())
}
