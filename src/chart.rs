use crate::builder::{BenchmarkChartBuilder, Chart};
use crate::config::{AxisScale, ChartJob, ChartStyle, ImageFormat};
use crate::error::{ChartError, DataError, Result};
use crate::table::Table;
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// Font sizes
const TITLE_FONT_SIZE: u32 = 26;
const AXIS_LABEL_FONT_SIZE: u32 = 20;
const TICK_LABEL_FONT_SIZE: u32 = 15;
const LEGEND_FONT_SIZE: u32 = 15;

// Layout tuning
const MARGIN: u32 = 20;
const X_LABEL_AREA_SIZE: u32 = 50;
const Y_LABEL_AREA_SIZE: u32 = 70;
const LINE_WIDTH: u32 = 2;

/// Series colors, assigned in series order
const COLORS: &[RGBColor] = &[
    RGBColor(31, 119, 180),  // Blue
    RGBColor(255, 127, 14),  // Orange
    RGBColor(44, 160, 44),   // Green
    RGBColor(214, 39, 40),   // Red
    RGBColor(148, 103, 189), // Purple
    RGBColor(140, 86, 75),   // Brown
    RGBColor(227, 119, 194), // Pink
    RGBColor(127, 127, 127), // Gray
];

fn series_color(idx: usize) -> RGBColor {
    COLORS[idx % COLORS.len()]
}

/// Format a plain axis value, dropping the fraction for whole numbers
fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{:.0}", value);
    }
    if value.abs() >= 0.001 {
        let text = format!("{:.3}", value);
        return text.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{:.1e}", value)
}

/// Tick label for a drawing-space coordinate.
fn format_tick(coord: f64, scale: AxisScale) -> String {
    if !scale.is_log() {
        return format_number(coord);
    }
    // Only label whole powers of the base on log axes.
    let nearest = coord.round();
    if (coord - nearest).abs() < 1e-6 {
        format_number(scale.inverse(nearest))
    } else {
        String::new()
    }
}

/// Drawing-space range covering every finite value.
///
/// Log axes are widened to whole exponents; linear axes get 5% padding.
fn axis_range(values: impl Iterator<Item = f64>, scale: AxisScale) -> (f64, f64) {
    let (min, max) = values
        .map(|v| scale.forward(v))
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if !min.is_finite() {
        return (0.0, 1.0);
    }

    if scale.is_log() {
        let lo = min.floor();
        let hi = max.ceil().max(lo + 1.0);
        let pad = (hi - lo) * 0.05;
        return (lo - pad, hi + pad);
    }

    let span = max - min;
    let pad = if span > 0.0 {
        span * 0.05
    } else {
        max.abs().max(1.0) * 0.05
    };
    (min - pad, max + pad)
}

/// Output of one chart job
#[derive(Debug)]
pub struct JobOutput {
    pub charts: Vec<Chart>,
    pub images: Vec<PathBuf>,
    pub data_file: Option<PathBuf>,
}

/// Load, group, validate and render every chart of a job.
///
/// All data checks run before the output directory is touched, so a
/// `DataError` leaves no files behind. A failed render or export removes
/// the images this job already wrote.
pub fn run_job(job: &ChartJob) -> Result<JobOutput> {
    let style = job.style();
    let (charts, images) = prepare_job(job)?;

    std::fs::create_dir_all(&job.output_dir)
        .map_err(|e| ChartError::io("create directory", &job.output_dir, e))?;

    render_all(&charts, &images, |chart, path| render_chart(chart, &style, path))?;

    let data_file = if job.export_json {
        let path = job.output_dir.join(format!("{}.json", job.prefix));
        if let Err(err) = export_chart_data(&charts, &path) {
            remove_outputs(&images);
            return Err(err);
        }
        info!("exported chart data to {}", path.display());
        Some(path)
    } else {
        None
    };

    Ok(JobOutput {
        charts,
        images,
        data_file,
    })
}

/// Load and group a job's input and validate it for drawing, without writing anything.
///
/// Returns the charts and the image path each one will be rendered to.
pub fn prepare_job(job: &ChartJob) -> Result<(Vec<Chart>, Vec<PathBuf>)> {
    let grouping = job.grouping();
    let style = job.style();

    let table = Table::from_path(&job.input)?;
    let records = table.records(&grouping.columns)?;
    info!(
        input = %job.input.display(),
        records = records.len(),
        "loaded benchmark table"
    );

    let charts = BenchmarkChartBuilder::new(grouping).build(&records)?;
    let images = plan_images(&charts, &job.prefix, &job.output_dir, style.format)?;
    for chart in &charts {
        check_log_axes(chart, &style)?;
    }
    Ok((charts, images))
}

/// Render each chart to its path; on the first failure remove everything written so far.
fn render_all<F>(charts: &[Chart], images: &[PathBuf], mut render: F) -> Result<()>
where
    F: FnMut(&Chart, &Path) -> Result<()>,
{
    for (idx, (chart, path)) in charts.iter().zip(images).enumerate() {
        if let Err(err) = render(chart, path) {
            remove_outputs(&images[..=idx]);
            return Err(err);
        }
        info!(partition = %chart.describe(), "generated {}", path.display());
    }
    Ok(())
}

fn remove_outputs(paths: &[PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => warn!("removed partial output {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "could not remove partial output {}", path.display()),
        }
    }
}

/// One image path per chart; two charts sharing a file name is an error.
fn plan_images(
    charts: &[Chart],
    prefix: &str,
    output_dir: &Path,
    format: ImageFormat,
) -> std::result::Result<Vec<PathBuf>, DataError> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut paths = Vec::with_capacity(charts.len());

    for chart in charts {
        let file = format!("{}.{}", chart.file_stem(prefix), format.extension());
        if let Some(first) = seen.insert(file.clone(), chart.describe()) {
            return Err(DataError::FileNameCollision {
                file,
                first,
                second: chart.describe(),
            });
        }
        paths.push(output_dir.join(file));
    }
    Ok(paths)
}

fn check_log_axes(chart: &Chart, style: &ChartStyle) -> std::result::Result<(), DataError> {
    for series in &chart.series {
        for point in &series.points {
            for (axis, scale, value) in [("x", style.x_scale, point.x), ("y", style.y_scale, point.y)] {
                if scale.is_log() && value <= 0.0 {
                    return Err(DataError::NonPositiveOnLogAxis {
                        axis,
                        series: series.label.clone(),
                        value,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Render a single chart to `path` in the style's image format.
pub fn render_chart(chart: &Chart, style: &ChartStyle, path: &Path) -> Result<()> {
    let size = (style.width, style.height);
    match style.format {
        ImageFormat::Png => {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            draw_chart(&root, chart, style).map_err(|e| render_error(path, e))
        }
        ImageFormat::Svg => {
            let root = SVGBackend::new(path, size).into_drawing_area();
            draw_chart(&root, chart, style).map_err(|e| render_error(path, e))
        }
    }
}

fn render_error<E>(path: &Path, err: DrawingAreaErrorKind<E>) -> ChartError
where
    E: std::error::Error + Send + Sync,
{
    ChartError::io("render", path, io::Error::other(err.to_string()))
}

/// Line chart with markers, one line per series, sharing both axes
fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    chart: &Chart,
    style: &ChartStyle,
) -> std::result::Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;

    let x_scale = style.x_scale;
    let y_scale = style.y_scale;
    let (x_min, x_max) = axis_range(chart.points().map(|p| p.x), x_scale);
    let (y_min, y_max) = axis_range(chart.points().map(|p| p.y), y_scale);

    let mut builder = ChartBuilder::on(root);
    builder
        .margin(MARGIN)
        .x_label_area_size(X_LABEL_AREA_SIZE)
        .y_label_area_size(Y_LABEL_AREA_SIZE);
    if let Some(template) = &style.title {
        builder.caption(chart.title(template), ("sans-serif", TITLE_FONT_SIZE));
    }
    let mut ctx = builder.build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    ctx.configure_mesh()
        .x_labels(tick_count(x_min, x_max, x_scale))
        .y_labels(tick_count(y_min, y_max, y_scale))
        .x_label_formatter(&|x| format_tick(*x, x_scale))
        .y_label_formatter(&|y| format_tick(*y, y_scale))
        .x_desc(style.x_label.as_str())
        .y_desc(style.y_label.as_str())
        .light_line_style(BLACK.mix(0.05))
        .label_style(("sans-serif", TICK_LABEL_FONT_SIZE))
        .axis_desc_style(("sans-serif", AXIS_LABEL_FONT_SIZE))
        .draw()?;

    for (idx, series) in chart.series.iter().enumerate() {
        let color = series_color(idx);

        let data: Vec<(f64, f64)> = series
            .points
            .iter()
            .map(|p| (x_scale.forward(p.x), y_scale.forward(p.y)))
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        if data.len() < series.points.len() {
            warn!(
                series = %series.label,
                skipped = series.points.len() - data.len(),
                "points without a position on the axes are not drawn"
            );
        }

        ctx.draw_series(LineSeries::new(data.clone(), color.stroke_width(LINE_WIDTH)))?
            .label(series.label.as_str())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(LINE_WIDTH))
            });

        ctx.draw_series(PointSeries::of_element(
            data,
            4,
            color.filled(),
            &|coord, size, shape| EmptyElement::at(coord) + Circle::new((0, 0), size, shape),
        ))?;
    }

    ctx.configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", LEGEND_FONT_SIZE))
        .draw()?;

    root.present()?;
    debug!(series = chart.series.len(), "chart drawn");
    Ok(())
}

/// Log axes get one label per whole exponent, linear axes a fixed count.
fn tick_count(min: f64, max: f64, scale: AxisScale) -> usize {
    if scale.is_log() {
        ((max - min).round() as usize + 1).clamp(2, 20)
    } else {
        10
    }
}

/// Write the built charts as pretty JSON.
pub fn export_chart_data(charts: &[Chart], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(charts)
        .map_err(|e| ChartError::io("serialize", path, e.into()))?;
    std::fs::write(path, json).map_err(|e| ChartError::io("write", path, e))
}

/// Print chart data to console
pub fn print_summary(charts: &[Chart]) {
    println!("\n{:=<80}", "");
    println!("Chart Data");
    println!("{:=<80}\n", "");

    for chart in charts {
        println!("Chart: {}", chart.describe());
        println!("{:-<60}", "");
        println!(
            "  {:<20} {:>12} {:>14} {:>8}",
            "Series", "x", "y", "Samples"
        );
        println!("  {:-<57}", "");

        for series in &chart.series {
            for point in &series.points {
                println!(
                    "  {:<20} {:>12} {:>14.6} {:>8}",
                    series.label,
                    format_number(point.x),
                    point.y,
                    point.samples
                );
            }
        }
        println!();
    }
}
