// THEORY:
// The Concern-Map Renderer turns one still photo plus its analysis into draw
// commands: the photo, one glow or heatmap layer per active metric, and a callout
// per active metric. It is the still-image counterpart of the live overlay and,
// unlike it, runs landmark detection only once per image.
//
// Key architectural principles:
// 1.  **Explicit Status**: The renderer is always in one of `Idle`, `Loading`,
//     `Ready` or `Error`. An image that has not finished loading defers rendering
//     (`Loading`); a loaded image without landmarks, or a failed detection, is a
//     terminal `Error` for that image. Neither case draws anything.
// 2.  **Anchors from Evidence First**: A metric with a server heatmap is anchored
//     at the heatmap's intensity centroid. Only metrics without one, or whose
//     heatmap is empty, fall back to landmark regions. Centroids are cached per
//     metric id until the analysis changes.
// 3.  **Weighted Emphasis**: `weight = (severity / 100 * confidence) ^ 0.7`
//     scales heatmap alpha and glow size/alpha. Zero-weight metrics are skipped.
// 4.  **Layered Output**: photo, then screen-blended overlays clipped to the face
//     ellipse, then callouts (leader line, box, text) on top.

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::config::ConcernMapConfig;
use crate::core_modules::analysis::{AnalysisResult, MetricResult, metric_color};
use crate::core_modules::callout::{CalloutItem, PlacedCallout, layout_callouts};
use crate::core_modules::draw::{BlendMode, DrawCommand, ImageLayer, Rect, Rgba, TextMeasure};
use crate::core_modules::face::{Landmarks, Point2};
use crate::core_modules::face_regions::FaceGeometry;
use crate::core_modules::frame::frame::Frame;
use crate::core_modules::heatmap_image::{HeatmapSet, intensity_centroid};
use crate::core_modules::landmarker::{DetectionMode, LandmarkSource};

const NO_LANDMARKS: &str = "No face landmarks found on this image";
const CALLOUT_FILL: (f32, f32, f32, f32) = (0.06, 0.07, 0.09, 0.78);
const CALLOUT_RADIUS: f32 = 6.0;
const LEADER_WIDTH: f32 = 1.5;
/// Glow radius at zero weight, as a share of the full radius.
const GLOW_MIN_SCALE: f32 = 0.6;

/// Render state of the current still image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RenderStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

/// A still image that may still be loading.
#[derive(Debug, Clone)]
pub enum StillImage {
    Pending,
    Loaded(Arc<RgbaImage>),
}

/// Which metrics are drawn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MetricView {
    /// The configured number of metrics with the highest severity x confidence.
    #[default]
    TopConcerns,
    /// One metric chosen by id.
    Single(String),
}

/// One metric resolved for drawing.
#[derive(Debug, Clone)]
pub struct ActiveMetric {
    pub metric: MetricResult,
    pub color: Rgba,
    pub weight: f32,
    /// Where glows are drawn; the callout points at one of them.
    pub anchors: Vec<Point2>,
    pub from_heatmap: bool,
}

pub struct ConcernMapRenderer {
    config: ConcernMapConfig,
    status: RenderStatus,
    image: Option<Arc<RgbaImage>>,
    geometry: Option<FaceGeometry>,
    analysis: Option<AnalysisResult>,
    heatmaps: HeatmapSet,
    /// Heatmap centroids in photo pixels; `None` marks an empty heatmap.
    centroid_cache: HashMap<String, Option<Point2>>,
}

impl ConcernMapRenderer {
    pub fn new(config: ConcernMapConfig) -> Self {
        Self {
            config,
            status: RenderStatus::Idle,
            image: None,
            geometry: None,
            analysis: None,
            heatmaps: HeatmapSet::new(),
            centroid_cache: HashMap::new(),
        }
    }

    pub fn status(&self) -> &RenderStatus {
        &self.status
    }

    pub fn geometry(&self) -> Option<&FaceGeometry> {
        self.geometry.as_ref()
    }

    /// Installs a new analysis result. Heatmaps are decoded here; the centroid
    /// cache starts over.
    pub fn set_analysis(&mut self, analysis: AnalysisResult) {
        self.heatmaps = analysis
            .heatmaps
            .as_ref()
            .map(HeatmapSet::from_uris)
            .unwrap_or_default();
        self.centroid_cache.clear();
        debug!(
            metrics = analysis.metrics.len(),
            heatmaps = self.heatmaps.len(),
            "analysis installed"
        );
        self.analysis = Some(analysis);
    }

    /// Detects landmarks on `image` once and prepares the face geometry.
    pub async fn prepare(&mut self, image: StillImage, source: &dyn LandmarkSource) -> RenderStatus {
        let image = match image {
            StillImage::Pending => return self.defer(),
            StillImage::Loaded(image) => image,
        };
        if self.is_prepared_for(&image) {
            return self.status.clone();
        }

        let frame = match Frame::from_image((*image).clone()) {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                warn!(error = %e, "still image cannot be analysed");
                return self.fail(image, e.to_string());
            }
        };
        match source.detect(frame, DetectionMode::OneShot).await {
            Ok(landmarks) => self.prepare_with_landmarks(image, &landmarks),
            Err(e) => {
                warn!(error = %e, "still-image landmark detection failed");
                self.fail(image, e.to_string())
            }
        }
    }

    /// Prepares the face geometry from landmarks that were detected elsewhere.
    pub fn prepare_with_landmarks(&mut self, image: Arc<RgbaImage>, landmarks: &Landmarks) -> RenderStatus {
        let (width, height) = image.dimensions();
        match FaceGeometry::from_landmarks(landmarks, width, height) {
            Some(geometry) => {
                info!(width, height, landmarks = landmarks.points.len(), "concern map ready");
                self.image = Some(image);
                self.geometry = Some(geometry);
                self.status = RenderStatus::Ready;
                self.status.clone()
            }
            None => self.fail(image, NO_LANDMARKS.to_string()),
        }
    }

    fn defer(&mut self) -> RenderStatus {
        self.image = None;
        self.geometry = None;
        self.status = RenderStatus::Loading;
        self.status.clone()
    }

    fn fail(&mut self, image: Arc<RgbaImage>, message: String) -> RenderStatus {
        self.image = Some(image);
        self.geometry = None;
        self.status = RenderStatus::Error(message);
        self.status.clone()
    }

    fn is_prepared_for(&self, image: &Arc<RgbaImage>) -> bool {
        matches!(&self.image, Some(current) if Arc::ptr_eq(current, image))
            && !matches!(self.status, RenderStatus::Idle | RenderStatus::Loading)
    }

    /// Metrics to draw for `view`, strongest first.
    pub fn select_metrics<'a>(&self, metrics: &'a [MetricResult], view: &MetricView) -> Vec<&'a MetricResult> {
        match view {
            MetricView::TopConcerns => {
                let mut ranked: Vec<&MetricResult> = metrics.iter().filter(|m| m.weight() > 0.0).collect();
                ranked.sort_by(|a, b| b.priority().total_cmp(&a.priority()));
                ranked.truncate(self.config.top_n);
                ranked
            }
            MetricView::Single(id) => metrics
                .iter()
                .filter(|m| &m.id == id && m.weight() > 0.0)
                .take(1)
                .collect(),
        }
    }

    /// Resolves colour, weight and anchors of the metrics shown in `view`.
    pub fn active_metrics(&mut self, view: &MetricView) -> Vec<ActiveMetric> {
        let (Some(analysis), Some(geometry), Some(image)) = (&self.analysis, &self.geometry, &self.image) else {
            return Vec::new();
        };
        let (width, height) = image.dimensions();

        let selected: Vec<(usize, MetricResult)> = self
            .select_metrics(&analysis.metrics, view)
            .into_iter()
            .map(|m| {
                let index = analysis.metrics.iter().position(|x| x.id == m.id).unwrap_or(0);
                (index, m.clone())
            })
            .collect();

        let mut active = Vec::with_capacity(selected.len());
        for (index, metric) in selected {
            let centroid = heatmap_anchor(
                &mut self.centroid_cache,
                &self.heatmaps,
                self.config.centroid_max_dim,
                &metric.id,
                (width, height),
            );
            let (anchors, from_heatmap) = match centroid {
                Some(point) => (vec![point], true),
                None => (geometry.anchors_for_metric(&metric.id), false),
            };
            active.push(ActiveMetric {
                color: metric_color(&metric.id, index),
                weight: metric.weight() as f32,
                anchors,
                from_heatmap,
                metric,
            });
        }
        active
    }

    /// Draw commands for the current image. Empty unless the status is `Ready`.
    pub fn render(&mut self, view: &MetricView, measure: &dyn TextMeasure) -> Vec<DrawCommand> {
        if self.status != RenderStatus::Ready {
            return Vec::new();
        }
        let active = self.active_metrics(view);
        let (Some(image), Some(geometry)) = (&self.image, &self.geometry) else {
            return Vec::new();
        };
        let (width, height) = (image.width() as f32, image.height() as f32);
        let canvas = Rect::new(0.0, 0.0, width, height);
        let clip = geometry.ellipse_clip();

        // Stage 1: the photo itself.
        let mut commands = vec![DrawCommand::Clear, DrawCommand::Image(ImageLayer::new(image.clone(), canvas))];

        // Stage 2: overlays.
        let glow_radius = geometry.bbox.width() * self.config.glow_radius_fraction;
        for metric in &active {
            match self.heatmaps.get(&metric.metric.id) {
                Some(heatmap) if metric.from_heatmap => commands.push(DrawCommand::Image(
                    ImageLayer::new(heatmap.clone(), canvas)
                        .with_alpha(metric.weight * self.config.heatmap_alpha)
                        .with_blend(BlendMode::Screen)
                        .with_clip(clip),
                )),
                _ => {
                    let radius = glow_radius * (GLOW_MIN_SCALE + (1.0 - GLOW_MIN_SCALE) * metric.weight);
                    let color = metric.color.with_alpha(self.config.glow_alpha * metric.weight);
                    commands.extend(metric.anchors.iter().map(|anchor| DrawCommand::RadialGlow {
                        center: *anchor,
                        radius,
                        color,
                        blend: BlendMode::Screen,
                        clip,
                    }));
                }
            }
        }

        // Stage 3: callouts.
        let items = active
            .iter()
            .enumerate()
            .map(|(rank, metric)| CalloutItem {
                metric_id: metric.metric.id.clone(),
                // Successive callouts take successive regions so leader lines spread out.
                anchor: metric.anchors[rank % metric.anchors.len().max(1)],
                text: metric.metric.callout_text(),
                color: metric.color,
                weight: metric.weight,
            })
            .collect();
        let placed = layout_callouts(items, &geometry.bbox, width, height, &self.config.callout, measure);
        for callout in &placed {
            commands.extend(callout_commands(callout, self.config.callout.font_size));
        }
        commands
    }
}

/// Heatmap centroid of a metric in photo pixels, computed once per metric id.
fn heatmap_anchor(
    cache: &mut HashMap<String, Option<Point2>>,
    heatmaps: &HeatmapSet,
    max_dim: u32,
    metric_id: &str,
    (width, height): (u32, u32),
) -> Option<Point2> {
    if let Some(cached) = cache.get(metric_id) {
        return *cached;
    }
    let heatmap = heatmaps.get(metric_id)?;
    let anchor = intensity_centroid(heatmap, max_dim).map(|c| {
        let sx = width as f32 / heatmap.width().max(1) as f32;
        let sy = height as f32 / heatmap.height().max(1) as f32;
        c.scaled(sx, sy)
    });
    cache.insert(metric_id.to_string(), anchor);
    anchor
}

fn callout_commands(callout: &PlacedCallout, font_size: f32) -> [DrawCommand; 3] {
    let (r, g, b, a) = CALLOUT_FILL;
    [
        DrawCommand::Line {
            from: callout.item.anchor,
            to: callout.leader_end,
            color: callout.item.color,
            width: LEADER_WIDTH,
        },
        DrawCommand::RoundedRect {
            rect: callout.rect,
            radius: CALLOUT_RADIUS,
            fill: Rgba::new(r, g, b, a),
            stroke: Some(callout.item.color),
        },
        DrawCommand::Text {
            origin: callout.text_origin,
            text: callout.text.clone(),
            size: font_size,
            color: Rgba::from_rgb8(255, 255, 255),
        },
    ]
}
