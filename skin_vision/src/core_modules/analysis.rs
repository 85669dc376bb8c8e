// THEORY:
// The analysis schema is what the external analysis service returns for a
// submitted photo: scored metrics, a quality summary of the photo that was
// actually analyzed, and optional per-metric heatmap images as data URIs. The
// engine only consumes it, but it never trusts the ranges: severities are
// clamped to [0, 100] and confidences and quality values to [0, 1] while
// deserializing, so nothing downstream ever sees an out-of-range number.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::core_modules::draw::Rgba;
use crate::error::VisionResult;

/// Exponent that flattens weight so mid-range concerns stay visible.
const WEIGHT_EXPONENT: f64 = 0.7;

/// One scored skin concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub id: String,
    pub label: String,
    /// 0..100.
    #[serde(deserialize_with = "severity_range")]
    pub severity: f64,
    /// 0..1.
    #[serde(deserialize_with = "unit_range")]
    pub confidence: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MetricResult {
    pub fn new(id: impl Into<String>, label: impl Into<String>, severity: f64, confidence: f64) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            severity: clamp(severity, 100.0),
            confidence: clamp(confidence, 1.0),
            summary: String::new(),
            tips: Vec::new(),
            value: None,
            unit: None,
        }
    }

    /// Visual emphasis of the metric: `(severity / 100 * confidence) ^ 0.7`, in [0, 1].
    pub fn weight(&self) -> f64 {
        let base = clamp(self.severity, 100.0) / 100.0 * clamp(self.confidence, 1.0);
        base.powf(WEIGHT_EXPONENT).clamp(0.0, 1.0)
    }

    /// Ranking key for the "top concerns" view.
    pub fn priority(&self) -> f64 {
        clamp(self.severity, 100.0) * clamp(self.confidence, 1.0)
    }

    /// Callout text, e.g. `"Oiliness: 64"`.
    pub fn callout_text(&self) -> String {
        format!("{}: {}", self.label, self.severity.round() as i64)
    }
}

/// Quality summary of the photo the service analyzed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageQuality {
    #[serde(deserialize_with = "unit_range")]
    pub score: f64,
    #[serde(deserialize_with = "unit_range")]
    pub brightness: f64,
    /// Sharpness, despite the name: 1 is perfectly sharp.
    #[serde(deserialize_with = "unit_range")]
    pub blur: f64,
    pub face_found: bool,
    #[serde(deserialize_with = "unit_range")]
    pub face_coverage: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineStep {
    pub time: String,
    pub step: String,
    pub why: String,
}

/// Full response of the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub analysis_id: String,
    /// Index of the submitted image the result describes.
    #[serde(default)]
    pub selected_image: usize,
    #[serde(default, deserialize_with = "severity_range")]
    pub overall_score: f64,
    #[serde(default)]
    pub skin_type: String,
    #[serde(default)]
    pub estimated_fitzpatrick: Option<u8>,
    pub metrics: Vec<MetricResult>,
    pub quality: ImageQuality,
    #[serde(default)]
    pub routine: Vec<RoutineStep>,
    #[serde(default)]
    pub notes: Vec<String>,
    /// Metric id to `data:image/png;base64,...` URI.
    #[serde(default)]
    pub heatmaps: Option<BTreeMap<String, String>>,
}

impl AnalysisResult {
    pub fn from_json(json: &str) -> VisionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn metric(&self, id: &str) -> Option<&MetricResult> {
        self.metrics.iter().find(|m| m.id == id)
    }
}

/// Display colour of a metric. Known ids have fixed colours; others cycle a
/// fallback palette by their position in the metric list.
pub fn metric_color(id: &str, index: usize) -> Rgba {
    const FALLBACK: [(u8, u8, u8); 4] = [(16, 185, 129), (99, 102, 241), (234, 179, 8), (20, 184, 166)];
    let (r, g, b) = match id {
        "redness" => (244, 63, 94),
        "uneven_tone" => (245, 158, 11),
        "texture" => (167, 139, 250),
        "oiliness" => (56, 189, 248),
        "wrinkles" => (249, 115, 22),
        "puffy_eyes" => (236, 72, 153),
        _ => FALLBACK[index % FALLBACK.len()],
    };
    Rgba::from_rgb8(r, g, b)
}

fn clamp(value: f64, max: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, max) }
}

fn unit_range<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(clamp(f64::deserialize(deserializer)?, 1.0))
}

fn severity_range<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(clamp(f64::deserialize(deserializer)?, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "analysis_id": "a1",
        "selected_image": 1,
        "overall_score": 71.5,
        "skin_type": "combination",
        "metrics": [
            {"id": "redness", "label": "Redness / irritation", "severity": 140, "confidence": 0.9,
             "summary": "s", "tips": ["t"]},
            {"id": "oiliness", "label": "Oiliness", "severity": 40.4, "confidence": -3}
        ],
        "quality": {"score": 0.8, "brightness": 0.5, "blur": 1.7, "face_found": true,
                    "face_coverage": 0.3, "warnings": []},
        "heatmaps": {"redness": "data:image/png;base64,AAAA"},
        "debug": {"ignored": true}
    }"#;

    #[test]
    fn ranges_are_clamped_on_ingestion() {
        let result = AnalysisResult::from_json(SAMPLE).unwrap();
        assert_eq!(result.metrics[0].severity, 100.0);
        assert_eq!(result.metrics[1].confidence, 0.0);
        assert_eq!(result.quality.blur, 1.0);
        assert_eq!(result.selected_image, 1);
        assert!(result.heatmaps.unwrap().contains_key("redness"));
    }

    #[test]
    fn weight_follows_the_power_curve() {
        let full = MetricResult::new("texture", "Texture / pores", 100.0, 1.0);
        assert_eq!(full.weight(), 1.0);
        let half = MetricResult::new("texture", "Texture / pores", 50.0, 1.0);
        assert!((half.weight() - 0.5f64.powf(0.7)).abs() < 1e-12);
        let none = MetricResult::new("texture", "Texture / pores", 80.0, 0.0);
        assert_eq!(none.weight(), 0.0);
    }

    #[test]
    fn callout_text_rounds_severity() {
        let metric = MetricResult::new("oiliness", "Oiliness", 63.6, 0.8);
        assert_eq!(metric.callout_text(), "Oiliness: 64");
    }

    #[test]
    fn palette_has_fixed_and_fallback_colours() {
        assert_eq!(metric_color("redness", 7).to_rgba8(), [244, 63, 94, 255]);
        assert_eq!(metric_color("custom", 0), metric_color("other", 4));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(AnalysisResult::from_json("{\"metrics\": 3}").is_err());
    }
}
