// THEORY:
// Tunables for every stage live here as plain structs with public fields. The
// capture session and the renderers receive them by value at construction
// time, the same way the engine hands a config down to each layer, so no stage
// reads globals. `Default` carries the production constants; `from_env` lets a
// deployment override the handful of knobs that operators actually touch.

use std::time::Duration;

/// Upper bound on capture items per session; overrides are clamped to `1..=3`.
pub const MAX_CAPTURE_BUDGET: usize = 3;
/// The live overlay never recomputes more than four times a second.
pub const MAX_HEATMAP_FPS: u64 = 4;

/// Frame Quality Sampler settings.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Period of the quality sampling timer.
    pub interval: Duration,
    /// Width of the downsampled working buffer; height keeps the aspect ratio.
    pub working_width: u32,
    /// Empirical divisor that maps Laplacian variance into [0, 1].
    pub sharpness_divisor: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(450),
            working_width: 160,
            sharpness_divisor: 800.0,
        }
    }
}

/// Auto-Capture State Machine settings.
#[derive(Debug, Clone)]
pub struct AutoCaptureConfig {
    /// Whether auto-capture is allowed to start countdowns at all.
    pub enabled: bool,
    /// Minimum aggregated score for the "good" gate.
    pub min_score: f64,
    /// Minimum time between two automatic captures.
    pub cooldown: Duration,
    /// Number of countdown ticks before the capture fires.
    pub countdown_ticks: u32,
    /// Period of a countdown tick.
    pub tick_interval: Duration,
    /// Maximum number of capture items held by a session.
    pub budget: usize,
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: 0.78,
            cooldown: Duration::from_millis(2500),
            countdown_ticks: 3,
            tick_interval: Duration::from_secs(1),
            budget: 3,
        }
    }
}

/// Live Heatmap Synthesizer settings.
#[derive(Debug, Clone)]
pub struct LiveHeatmapConfig {
    /// Minimum spacing between two overlay computations (4 per second by default).
    pub min_interval: Duration,
    /// Width of the downsampled working buffer.
    pub working_width: u32,
    /// Concern magnitudes below this are fully transparent.
    pub visibility_floor: f32,
    /// Alpha of a pixel whose concern magnitude saturates.
    pub max_alpha: f32,
    /// Face coverage below which the overlay is not shown at all.
    pub min_coverage: f64,
    /// Face coverage at which the overlay reaches full strength.
    pub full_coverage: f64,
    /// Global strength cap applied on top of the coverage ramp.
    pub max_strength: f32,
    /// Blur radius as a fraction of the face box width.
    pub blur_fraction: f32,
}

impl Default for LiveHeatmapConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(250),
            working_width: 160,
            visibility_floor: 0.18,
            max_alpha: 0.85,
            min_coverage: 0.05,
            full_coverage: 0.15,
            max_strength: 0.9,
            blur_fraction: 0.02,
        }
    }
}

/// Geometry of callout boxes on the concern map.
#[derive(Debug, Clone)]
pub struct CalloutConfig {
    pub font_size: f32,
    /// Horizontal padding between box edge and text.
    pub padding: f32,
    pub box_height: f32,
    pub min_width: f32,
    pub max_width: f32,
    /// Vertical gap kept between consecutive boxes in a column.
    pub gap: f32,
    /// Distance between the face box and the inner edge of a column.
    pub column_margin: f32,
    /// Minimum distance between a box and the canvas edge.
    pub canvas_padding: f32,
    /// Half-width of the "centered" band, as a fraction of face width.
    pub center_band: f32,
}

impl Default for CalloutConfig {
    fn default() -> Self {
        Self {
            font_size: 13.0,
            padding: 8.0,
            box_height: 26.0,
            min_width: 96.0,
            max_width: 240.0,
            gap: 8.0,
            column_margin: 18.0,
            canvas_padding: 6.0,
            center_band: 0.08,
        }
    }
}

/// Concern-Map Renderer settings.
#[derive(Debug, Clone)]
pub struct ConcernMapConfig {
    /// Number of metrics shown in the "top concerns" view.
    pub top_n: usize,
    /// Longest side of the buffer used for heatmap centroid search.
    pub centroid_max_dim: u32,
    /// Glow radius as a fraction of face width, before weight scaling.
    pub glow_radius_fraction: f32,
    /// Alpha multiplier for server heatmaps, applied on top of the metric weight.
    pub heatmap_alpha: f32,
    /// Peak alpha of a synthesized glow at full weight.
    pub glow_alpha: f32,
    pub callout: CalloutConfig,
}

impl Default for ConcernMapConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            centroid_max_dim: 96,
            glow_radius_fraction: 0.22,
            heatmap_alpha: 0.9,
            glow_alpha: 0.75,
            callout: CalloutConfig::default(),
        }
    }
}

/// Every tunable of the engine, grouped by stage.
#[derive(Debug, Clone, Default)]
pub struct VisionConfig {
    pub sampler: SamplerConfig,
    pub auto_capture: AutoCaptureConfig,
    pub live_heatmap: LiveHeatmapConfig,
    pub concern_map: ConcernMapConfig,
}

impl VisionConfig {
    /// Create config from `SV_*` environment variables, defaulting anything missing.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup. Invalid values are ignored and
    /// the capture budget and overlay rate are clamped to their live limits.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(ms) = parse_u64("SV_SAMPLE_INTERVAL_MS").filter(|ms| *ms > 0) {
            config.sampler.interval = Duration::from_millis(ms);
        }
        if let Some(enabled) = lookup("SV_AUTO_CAPTURE").and_then(|v| parse_flag(&v)) {
            config.auto_capture.enabled = enabled;
        }
        if let Some(budget) = parse_u64("SV_CAPTURE_BUDGET") {
            config.auto_capture.budget = budget.clamp(1, MAX_CAPTURE_BUDGET as u64) as usize;
        }
        if let Some(ms) = parse_u64("SV_AUTO_CAPTURE_COOLDOWN_MS") {
            config.auto_capture.cooldown = Duration::from_millis(ms);
        }
        if let Some(fps) = parse_u64("SV_HEATMAP_MAX_FPS").filter(|fps| *fps > 0) {
            config.live_heatmap.min_interval = Duration::from_millis(1000 / fps.min(MAX_HEATMAP_FPS));
        }
        if let Some(top_n) = parse_u64("SV_TOP_CONCERNS").filter(|n| *n > 0) {
            config.concern_map.top_n = top_n as usize;
        }
        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
