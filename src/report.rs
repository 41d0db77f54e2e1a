//! Result records and renderings: JSON record lines, the backend comparison chart, the version
//! table and the segmentation overlay.

use crate::arrays::Image;
use crate::error::{Error, Result};
use crate::pipeline::SweepResult;
use image::{save_buffer, ColorType};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Printed by a child sweep right before its record line.
pub const RECORD_SEPARATOR: &str = "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";

/// Line-delimited record a sweep process prints as its last stdout line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepRecord {
    pub backend: String,
    pub times: Vec<f64>,
    pub sizes: Vec<String>,
}

impl SweepRecord {
    pub fn new(backend: &str, result: SweepResult) -> Self {
        Self {
            backend: backend.to_string(),
            times: result.times,
            sizes: result.sizes,
        }
    }

    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Strictly decodes a single record line.
    pub fn from_line(line: &str) -> Result<Self> {
        let record: SweepRecord = serde_json::from_str(line.trim())?;
        if record.times.len() != record.sizes.len() {
            return Err(Error::MalformedRecord(serde::de::Error::custom(format!(
                "{} times for {} sizes",
                record.times.len(),
                record.sizes.len()
            ))));
        }
        Ok(record)
    }

    /// Decodes the last non-empty line of a process output.
    pub fn from_output(output: &str) -> Result<Self> {
        let line = output
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or(Error::MissingRecord)?;
        Self::from_line(line)
    }
}

/// Sweep result of one library version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: String,
    pub times: Vec<f64>,
    pub sizes: Vec<String>,
}

/// Fixed-width text table with one row per version and image size.
pub fn render_version_table(records: &[VersionRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:<14} {:>12}", "version", "size", "time (s)");
    for record in records {
        for (size, time) in record.sizes.iter().zip(&record.times) {
            let _ = writeln!(out, "{:<12} {:<14} {:>12.4}", record.version, size, time);
        }
    }
    out
}

/// Writes one JSON object per line.
pub fn write_jsonl<T: Serialize>(records: &[T], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut contents = String::new();
    for record in records {
        contents.push_str(&serde_json::to_string(record)?);
        contents.push('\n');
    }
    fs::write(path, contents)?;
    Ok(())
}

/// Timings of one backend for the comparison chart.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSeries {
    pub label: String,
    pub times: Vec<f64>,
    pub sizes: Vec<String>,
}

impl BackendSeries {
    /// Drops the first `n` samples, which include warm-up work.
    pub fn skip_first(mut self, n: usize) -> Self {
        let n = n.min(self.times.len()).min(self.sizes.len());
        self.times.drain(..n);
        self.sizes.drain(..n);
        self
    }
}

/// Rendered chart and where it was saved.
#[derive(Debug, Clone)]
pub struct PerformancePlot {
    pub svg: String,
    pub path: Option<PathBuf>,
}

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;
const Y_TICKS: usize = 5;
const COLORS: [&str; 3] = ["green", "blue", "red"];

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_chart(series: &[BackendSeries]) -> String {
    let sizes = series.first().map(|s| s.sizes.as_slice()).unwrap_or(&[]);
    let max_time = series
        .iter()
        .flat_map(|s| s.times.iter().copied())
        .fold(0.0, f64::max);
    let y_max = if max_time > 0.0 { max_time * 1.1 } else { 1.0 };
    let plot_w = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let x_at = |i: usize| {
        if sizes.len() > 1 {
            MARGIN_LEFT + plot_w * i as f64 / (sizes.len() - 1) as f64
        } else {
            MARGIN_LEFT + plot_w / 2.0
        }
    };
    let y_at = |t: f64| MARGIN_TOP + plot_h * (1.0 - t / y_max);
    let title = series
        .iter()
        .map(|s| escape(&s.label))
        .collect::<Vec<_>>()
        .join(" vs ");

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{CHART_WIDTH}" height="{CHART_HEIGHT}" font-family="sans-serif" font-size="12">"#
    );
    let _ = writeln!(
        svg,
        r#"<rect width="{CHART_WIDTH}" height="{CHART_HEIGHT}" fill="white"/>"#
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="25" text-anchor="middle" font-size="16">Spectral clustering: {title}</text>"#,
        CHART_WIDTH / 2.0
    );

    // axes
    let (x0, y0) = (MARGIN_LEFT, MARGIN_TOP + plot_h);
    let _ = writeln!(
        svg,
        r#"<line x1="{x0}" y1="{y0}" x2="{}" y2="{y0}" stroke="black"/>"#,
        MARGIN_LEFT + plot_w
    );
    let _ = writeln!(
        svg,
        r#"<line x1="{x0}" y1="{MARGIN_TOP}" x2="{x0}" y2="{y0}" stroke="black"/>"#
    );
    for tick in 0..=Y_TICKS {
        let t = y_max * tick as f64 / Y_TICKS as f64;
        let y = y_at(t);
        let _ = writeln!(
            svg,
            r##"<line x1="{x0}" y1="{y:.1}" x2="{}" y2="{y:.1}" stroke="#dddddd"/>"##,
            MARGIN_LEFT + plot_w
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{:.1}" text-anchor="end">{t:.3}</text>"#,
            x0 - 6.0,
            y + 4.0
        );
    }
    for (i, size) in sizes.iter().enumerate() {
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{}" text-anchor="middle">{}</text>"#,
            x_at(i),
            y0 + 18.0,
            escape(size)
        );
    }
    let _ = writeln!(
        svg,
        r#"<text x="{:.1}" y="{}" text-anchor="middle">Image Dimension</text>"#,
        MARGIN_LEFT + plot_w / 2.0,
        CHART_HEIGHT - 20.0
    );
    let _ = writeln!(
        svg,
        r#"<text x="20" y="{:.1}" text-anchor="middle" transform="rotate(-90 20 {:.1})">Time Taken (sec)</text>"#,
        MARGIN_TOP + plot_h / 2.0,
        MARGIN_TOP + plot_h / 2.0
    );

    for (index, s) in series.iter().enumerate() {
        let color = COLORS[index % COLORS.len()];
        let points = s
            .times
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{:.1},{:.1}", x_at(i), y_at(*t)))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(
            svg,
            r#"<polyline points="{points}" fill="none" stroke="{color}" stroke-width="2"/>"#
        );
        for (i, t) in s.times.iter().enumerate() {
            let _ = writeln!(
                svg,
                r#"<circle cx="{:.1}" cy="{:.1}" r="3" fill="{color}"/>"#,
                x_at(i),
                y_at(*t)
            );
        }
        let legend_y = MARGIN_TOP + 10.0 + 18.0 * index as f64;
        let legend_x = MARGIN_LEFT + 15.0;
        let _ = writeln!(
            svg,
            r#"<line x1="{legend_x}" y1="{legend_y}" x2="{}" y2="{legend_y}" stroke="{color}" stroke-width="2"/>"#,
            legend_x + 20.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}">{}</text>"#,
            legend_x + 26.0,
            legend_y + 4.0,
            escape(&s.label)
        );
    }
    svg.push_str("</svg>\n");
    svg
}

/// Draws the timings of every backend against image size.
///
/// All series must report the same sizes. With `artifacts_path`, the chart is written to
/// `<label>_vs_<label>.svg` inside it; the directory is created if missing.
pub fn plot_performance(
    series: &[BackendSeries],
    artifacts_path: Option<&Path>,
) -> Result<PerformancePlot> {
    if let Some(first) = series.first() {
        for other in &series[1..] {
            if other.sizes != first.sizes {
                return Err(Error::MismatchedImageSizes {
                    label: other.label.clone(),
                    expected: first.sizes.clone(),
                    found: other.sizes.clone(),
                });
            }
        }
    }
    let svg = render_chart(series);
    let path = match artifacts_path {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let name = series
                .iter()
                .map(|s| s.label.as_str())
                .collect::<Vec<_>>()
                .join("_vs_");
            let path = dir.join(format!("{name}.svg"));
            fs::write(&path, &svg)?;
            info!(path = %path.display(), "comparison plot written");
            Some(path)
        }
        None => None,
    };
    Ok(PerformancePlot { svg, path })
}

/// RGB colour of a label, spread over the hue circle from red to violet.
fn label_color(label: usize, n_labels: usize) -> [u8; 3] {
    let hue = 300.0 * label as f64 / n_labels.max(1) as f64;
    let sector = hue / 60.0;
    let x = 1.0 - (sector % 2.0 - 1.0).abs();
    let (r, g, b) = match sector as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        _ => (x, 0.0, 1.0),
    };
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

/// Saves `image` as RGB with the borders between segments drawn in the label colours.
pub fn render_segmentation(
    image: &Image,
    labels: &[usize],
    n_clusters: usize,
    path: &Path,
) -> Result<()> {
    if labels.len() != image.len() {
        return Err(Error::DimensionMismatch {
            expected: image.len(),
            actual: labels.len(),
        });
    }
    let (width, height) = (image.width, image.height);
    let border = |x: usize, y: usize| {
        let label = labels[y * width + x];
        (x + 1 < width && labels[y * width + x + 1] != label)
            || (y + 1 < height && labels[(y + 1) * width + x] != label)
    };
    let mut buf = Vec::with_capacity(3 * image.len());
    for y in 0..height {
        for x in 0..width {
            if border(x, y) {
                buf.extend_from_slice(&label_color(labels[y * width + x], n_clusters));
            } else {
                let v = (image[(x, y)] * 255.0).round().clamp(0.0, 255.0) as u8;
                buf.extend_from_slice(&[v, v, v]);
            }
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    save_buffer(path, &buf, width as u32, height as u32, ColorType::Rgb8)?;
    Ok(())
}
