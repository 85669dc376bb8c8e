// THEORY:
// Callouts are the text labels around the concern map, each tied to its anchor on
// the face by a straight leader line. Layout happens in three stages:
//
// 1.  **Column Assignment**: an anchor clearly left of the face center goes to the
//     left column, clearly right goes right. Anchors inside a narrow band around
//     the center (a nose, a chin) carry no side information, so they are dealt
//     to whichever column is shorter, alternating on ties.
// 2.  **Vertical Packing**: each column is sorted by anchor height. Every box
//     starts centered on its anchor, is clamped into the canvas, and is pushed
//     below the previous box plus a fixed gap. If that runs off the bottom, a
//     backward pass pulls boxes up again, and a last forward pass restores the
//     gaps. Boxes in one column therefore never overlap.
// 3.  **Horizontal Placement**: a box is as wide as its text plus padding, within
//     min/max bounds, and sits just outside the face box on its side, clamped so
//     it stays on the canvas.

use crate::config::CalloutConfig;
use crate::core_modules::draw::{Rect, Rgba, TextMeasure};
use crate::core_modules::face::{FaceBox, Point2};

const ELLIPSIS: &str = "..";

/// A label waiting to be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct CalloutItem {
    pub metric_id: String,
    pub anchor: Point2,
    pub text: String,
    pub color: Rgba,
    /// Metric weight in [0, 1].
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Left,
    Right,
}

/// A callout with its final geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedCallout {
    pub item: CalloutItem,
    pub column: Column,
    pub rect: Rect,
    /// Text as drawn; shortened if it did not fit the maximum width.
    pub text: String,
    /// Top-left corner of the text.
    pub text_origin: Point2,
    /// Where the leader line meets the box: middle of the edge facing the face.
    pub leader_end: Point2,
}

/// Lays out callouts around `face` on a `canvas_width` x `canvas_height` surface.
pub fn layout_callouts(
    items: Vec<CalloutItem>,
    face: &FaceBox,
    canvas_width: f32,
    canvas_height: f32,
    config: &CalloutConfig,
    measure: &dyn TextMeasure,
) -> Vec<PlacedCallout> {
    let (mut left, mut right) = assign_columns(items, face, config.center_band);

    left.sort_by(|a, b| a.anchor.y.total_cmp(&b.anchor.y));
    right.sort_by(|a, b| a.anchor.y.total_cmp(&b.anchor.y));

    let mut placed = Vec::with_capacity(left.len() + right.len());
    for (column, items) in [(Column::Left, left), (Column::Right, right)] {
        let anchors: Vec<f32> = items.iter().map(|item| item.anchor.y).collect();
        let tops = stack_column(&anchors, canvas_height, config);
        for (item, top) in items.into_iter().zip(tops) {
            placed.push(place(item, column, top, face, canvas_width, config, measure));
        }
    }
    placed
}

fn assign_columns(items: Vec<CalloutItem>, face: &FaceBox, center_band: f32) -> (Vec<CalloutItem>, Vec<CalloutItem>) {
    let center_x = face.center().x;
    let band = face.width() * center_band;

    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut centered = Vec::new();
    for item in items {
        let offset = item.anchor.x - center_x;
        if offset.abs() <= band {
            centered.push(item);
        } else if offset < 0.0 {
            left.push(item);
        } else {
            right.push(item);
        }
    }

    let mut next_on_tie = Column::Left;
    for item in centered {
        let column = match left.len().cmp(&right.len()) {
            std::cmp::Ordering::Less => Column::Left,
            std::cmp::Ordering::Greater => Column::Right,
            std::cmp::Ordering::Equal => {
                let column = next_on_tie;
                next_on_tie = match column {
                    Column::Left => Column::Right,
                    Column::Right => Column::Left,
                };
                column
            }
        };
        match column {
            Column::Left => left.push(item),
            Column::Right => right.push(item),
        }
    }
    (left, right)
}

/// Top edges of the boxes of one column, for anchors sorted top to bottom.
pub fn stack_column(anchor_ys: &[f32], canvas_height: f32, config: &CalloutConfig) -> Vec<f32> {
    let height = config.box_height;
    let pad = config.canvas_padding;
    let gap = config.gap;
    let lowest_top = (canvas_height - height - pad).max(pad);

    // Greedy downward pass.
    let mut tops: Vec<f32> = Vec::with_capacity(anchor_ys.len());
    for &anchor_y in anchor_ys {
        let mut top = (anchor_y - height * 0.5).clamp(pad, lowest_top);
        if let Some(prev) = tops.last() {
            top = top.max(prev + height + gap);
        }
        tops.push(top);
    }

    // Pull back up from the bottom edge if the column overflowed.
    let mut limit = lowest_top;
    for top in tops.iter_mut().rev() {
        *top = top.min(limit);
        limit = *top - gap - height;
    }

    // Restore gaps; only a column taller than the canvas still runs past the bottom.
    let mut prev_bottom = f32::NEG_INFINITY;
    for top in tops.iter_mut() {
        *top = top.max(pad).max(prev_bottom + gap);
        prev_bottom = *top + height;
    }
    tops
}

fn place(
    item: CalloutItem,
    column: Column,
    top: f32,
    face: &FaceBox,
    canvas_width: f32,
    config: &CalloutConfig,
    measure: &dyn TextMeasure,
) -> PlacedCallout {
    let max_text = (config.max_width - 2.0 * config.padding).max(0.0);
    let text = fit_text(&item.text, max_text, config.font_size, measure);
    let text_width = measure.measure(&text, config.font_size);
    let width = (text_width + 2.0 * config.padding).clamp(config.min_width, config.max_width);

    let pad = config.canvas_padding;
    let rightmost = (canvas_width - width - pad).max(pad);
    let x = match column {
        Column::Left => face.min_x - config.column_margin - width,
        Column::Right => face.max_x + config.column_margin,
    }
    .clamp(pad, rightmost);

    let rect = Rect::new(x, top, width, config.box_height);
    let leader_end = match column {
        Column::Left => Point2::new(rect.right(), rect.center_y()),
        Column::Right => Point2::new(rect.x, rect.center_y()),
    };
    let line_height = measure.line_height(config.font_size);
    let text_origin = Point2::new(
        rect.x + config.padding,
        rect.y + ((config.box_height - line_height) * 0.5).max(0.0),
    );

    PlacedCallout {
        item,
        column,
        rect,
        text,
        text_origin,
        leader_end,
    }
}

/// Shortens `text` with a trailing ellipsis until it fits `max_width`.
fn fit_text(text: &str, max_width: f32, size: f32, measure: &dyn TextMeasure) -> String {
    if measure.measure(text, size) <= max_width {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>() + ELLIPSIS;
        if measure.measure(&candidate, size) <= max_width {
            return candidate;
        }
    }
    String::new()
}
