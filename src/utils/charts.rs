//! SVG chart generator for training diagnostics
//!
//! Loss and accuracy curves, a confusion matrix heatmap and a per-class
//! precision/recall chart, written as standalone SVG files.

use std::fs;
use std::path::Path;

use crate::utils::metrics::{ConfusionMatrix, Metrics};

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

pub const COLOR_PRIMARY: &str = "#3498db";
pub const COLOR_SECONDARY: &str = "#2ecc71";
pub const COLOR_TERTIARY: &str = "#e74c3c";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";
const FONT: &str = "Arial, sans-serif";

/// A named line on a chart
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub values: Vec<f64>,
    pub color: String,
}

impl DataSeries {
    pub fn new(name: &str, values: Vec<f64>, color: &str) -> Self {
        Self {
            name: name.to_string(),
            values,
            color: color.to_string(),
        }
    }
}

fn svg_open(svg: &mut String, width: f64, height: f64, title: &str) {
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        width, height
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="{}" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        width / 2.0,
        FONT,
        COLOR_TEXT,
        escape_xml(title)
    ));
}

fn axis_labels(svg: &mut String, x_label: &str, y_label: &str) {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="{}" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        CHART_HEIGHT - 20.0,
        FONT,
        COLOR_TEXT,
        escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{y}" text-anchor="middle" font-family="{}" font-size="14" fill="{}" transform="rotate(-90 20 {y})">{}</text>"#,
        FONT,
        COLOR_TEXT,
        escape_xml(y_label),
        y = CHART_HEIGHT / 2.0
    ));
}

/// Line chart of per-epoch values (epochs are numbered from 1)
pub fn generate_line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    output_path: &Path,
) -> std::io::Result<()> {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let max_len = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    let y_max = series
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.05 } else { 1.0 };
    let x_span = (max_len.max(2) - 1) as f64;

    let to_x = |i: usize| MARGIN_LEFT + (i as f64 / x_span) * plot_width;
    let to_y = |v: f64| MARGIN_TOP + plot_height - (v / y_max) * plot_height;

    let mut svg = String::new();
    svg_open(&mut svg, CHART_WIDTH, CHART_HEIGHT, title);

    for i in 0..=5 {
        let value = (i as f64 / 5.0) * y_max;
        let y = to_y(value);
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT,
            y,
            MARGIN_LEFT + plot_width,
            y,
            COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="{}" font-size="12" fill="{}">{:.2}</text>"#,
            MARGIN_LEFT - 10.0,
            y + 4.0,
            FONT,
            COLOR_TEXT,
            value
        ));
    }

    svg.push_str(&format!(
        r#"<line x1="{l}" y1="{b}" x2="{r}" y2="{b}" stroke="{c}" stroke-width="2"/><line x1="{l}" y1="{t}" x2="{l}" y2="{b}" stroke="{c}" stroke-width="2"/>"#,
        l = MARGIN_LEFT,
        r = MARGIN_LEFT + plot_width,
        t = MARGIN_TOP,
        b = MARGIN_TOP + plot_height,
        c = COLOR_AXIS
    ));
    axis_labels(&mut svg, x_label, y_label);

    // Tick labels, at most ten
    let tick_step = (max_len / 10).max(1);
    for i in (0..max_len).step_by(tick_step) {
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="{}" font-size="11" fill="{}">{}</text>"#,
            to_x(i),
            MARGIN_TOP + plot_height + 20.0,
            FONT,
            COLOR_TEXT,
            i + 1
        ));
    }

    for s in series.iter().filter(|s| !s.values.is_empty()) {
        let path: Vec<String> = s
            .values
            .iter()
            .enumerate()
            .map(|(i, &v)| format!("{} {} {}", if i == 0 { "M" } else { "L" }, to_x(i), to_y(v)))
            .collect();
        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
            path.join(" "),
            s.color
        ));
    }

    let mut legend_y = MARGIN_TOP + 10.0;
    for s in series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT - 120.0,
            legend_y,
            s.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="{}" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT - 100.0,
            legend_y + 12.0,
            FONT,
            COLOR_TEXT,
            escape_xml(&s.name)
        ));
        legend_y += 25.0;
    }

    svg.push_str("</svg>");
    fs::write(output_path, svg)
}

/// Heatmap of row-normalised confusion matrix with raw counts in each cell
pub fn generate_confusion_matrix_chart(
    title: &str,
    cm: &ConfusionMatrix,
    class_names: &[String],
    output_path: &Path,
) -> std::io::Result<()> {
    let n = cm.num_classes.max(1);
    let cell = (600.0 / n as f64).clamp(12.0, 60.0);
    let left = 160.0;
    let top = 70.0;
    let width = left + cell * n as f64 + 40.0;
    let height = top + cell * n as f64 + 140.0;
    let normalized = cm.normalize_rows();

    let mut svg = String::new();
    svg_open(&mut svg, width, height, title);

    for (row, values) in normalized.iter().enumerate() {
        for (col, &v) in values.iter().enumerate() {
            let x = left + col as f64 * cell;
            let y = top + row as f64 * cell;
            // White to blue
            let shade = (255.0 * (1.0 - v)).round() as u8;
            svg.push_str(&format!(
                r#"<rect x="{}" y="{}" width="{}" height="{}" fill="rgb({},{},255)" stroke="{}"/>"#,
                x, y, cell, cell, shade, shade, COLOR_GRID
            ));
            if cell >= 24.0 {
                let text_color = if v > 0.5 { "white" } else { COLOR_TEXT };
                svg.push_str(&format!(
                    r#"<text x="{}" y="{}" text-anchor="middle" font-family="{}" font-size="11" fill="{}">{}</text>"#,
                    x + cell / 2.0,
                    y + cell / 2.0 + 4.0,
                    FONT,
                    text_color,
                    cm.get(row, col)
                ));
            }
        }
    }

    for (i, name) in class_names.iter().enumerate().take(n) {
        let label = escape_xml(&name.chars().take(20).collect::<String>());
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="{}" font-size="11" fill="{}">{}</text>"#,
            left - 6.0,
            top + i as f64 * cell + cell / 2.0 + 4.0,
            FONT,
            COLOR_TEXT,
            label
        ));
        let x = left + i as f64 * cell + cell / 2.0;
        let y = top + n as f64 * cell + 10.0;
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" text-anchor="end" font-family="{}" font-size="11" fill="{}" transform="rotate(-60 {x} {y})">{}</text>"#,
            FONT,
            COLOR_TEXT,
            label,
            x = x,
            y = y
        ));
    }

    svg.push_str(&format!(
        r#"<text x="20" y="{y}" text-anchor="middle" font-family="{}" font-size="14" fill="{}" transform="rotate(-90 20 {y})">Actual</text>"#,
        FONT,
        COLOR_TEXT,
        y = top + cell * n as f64 / 2.0
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="{}" font-size="14" fill="{}">Predicted</text>"#,
        left + cell * n as f64 / 2.0,
        height - 15.0,
        FONT,
        COLOR_TEXT
    ));

    svg.push_str("</svg>");
    fs::write(output_path, svg)
}

/// Grouped bars of precision, recall and F1 for every class
pub fn generate_precision_recall_chart(
    title: &str,
    metrics: &Metrics,
    class_names: &[String],
    output_path: &Path,
) -> std::io::Result<()> {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let groups = metrics.per_class.len().max(1);
    let group_width = plot_width / groups as f64;
    let bar_width = group_width * 0.8 / 3.0;

    let mut svg = String::new();
    svg_open(&mut svg, CHART_WIDTH, CHART_HEIGHT, title);

    for i in 0..=5 {
        let value = i as f64 / 5.0;
        let y = MARGIN_TOP + plot_height - value * plot_height;
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT,
            y,
            MARGIN_LEFT + plot_width,
            y,
            COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="{}" font-size="12" fill="{}">{:.1}</text>"#,
            MARGIN_LEFT - 10.0,
            y + 4.0,
            FONT,
            COLOR_TEXT,
            value
        ));
    }
    axis_labels(&mut svg, "Class", "Score");

    let colors = [COLOR_PRIMARY, COLOR_SECONDARY, COLOR_TERTIARY];
    for (idx, m) in metrics.per_class.iter().enumerate() {
        let group_x = MARGIN_LEFT + idx as f64 * group_width + group_width * 0.1;
        for (bar, (&value, color)) in [m.precision, m.recall, m.f1].iter().zip(colors).enumerate() {
            let bar_height = value.clamp(0.0, 1.0) * plot_height;
            svg.push_str(&format!(
                r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
                group_x + bar as f64 * bar_width,
                MARGIN_TOP + plot_height - bar_height,
                bar_width * 0.9,
                bar_height,
                color
            ));
        }
        if let Some(name) = class_names.get(idx) {
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="{}" font-size="10" fill="{}">{}</text>"#,
                group_x + 1.5 * bar_width,
                MARGIN_TOP + plot_height + 18.0,
                FONT,
                COLOR_TEXT,
                escape_xml(&name.chars().take(12).collect::<String>())
            ));
        }
    }

    let mut legend_x = MARGIN_LEFT;
    for (label, color) in ["Precision", "Recall", "F1"].iter().zip(colors) {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="12" height="12" fill="{}"/>"#,
            legend_x,
            CHART_HEIGHT - 45.0,
            color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="{}" font-size="11" fill="{}">{}</text>"#,
            legend_x + 18.0,
            CHART_HEIGHT - 35.0,
            FONT,
            COLOR_TEXT,
            label
        ));
        legend_x += 110.0;
    }

    svg.push_str("</svg>");
    fs::write(output_path, svg)
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_line_chart_generation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loss.svg");
        let series = vec![
            DataSeries::new("train", vec![1.2, 0.8, 0.5], COLOR_PRIMARY),
            DataSeries::new("validation", vec![1.3, 0.9, 0.7], COLOR_TERTIARY),
        ];

        generate_line_chart("Loss", "Epoch", "Loss", &series, &path).unwrap();
        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("validation"));
    }

    #[test]
    fn test_line_chart_single_epoch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("acc.svg");
        let series = vec![DataSeries::new("train", vec![0.5], COLOR_PRIMARY)];
        generate_line_chart("Accuracy", "Epoch", "Accuracy", &series, &path).unwrap();
        assert!(!fs::read_to_string(&path).unwrap().contains("NaN"));
    }

    #[test]
    fn test_confusion_matrix_chart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cm.svg");
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1], &[0, 0, 1], 2);
        let names = vec!["a<b".to_string(), "c".to_string()];

        generate_confusion_matrix_chart("Confusion", &cm, &names, &path).unwrap();
        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.contains("a&lt;b"));
    }

    #[test]
    fn test_precision_recall_chart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pr.svg");
        let metrics = Metrics::from_predictions(&[0, 1, 1], &[0, 0, 1], 2);
        let names = vec!["a".to_string(), "b".to_string()];
        generate_precision_recall_chart("PR", &metrics, &names, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a & 'b'"), "a &amp; &apos;b&apos;");
    }
}
