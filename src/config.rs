use crate::table::ColumnRoles;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Axis transform applied when drawing; stored values are never rescaled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AxisScale {
    #[default]
    Linear,
    Log2,
    Log10,
}

impl AxisScale {
    pub fn is_log(&self) -> bool {
        !matches!(self, AxisScale::Linear)
    }

    /// Map a data value into drawing space.
    pub fn forward(&self, value: f64) -> f64 {
        match self {
            AxisScale::Linear => value,
            AxisScale::Log2 => value.log2(),
            AxisScale::Log10 => value.log10(),
        }
    }

    /// Map a drawing-space coordinate back to a data value.
    pub fn inverse(&self, coord: f64) -> f64 {
        match self {
            AxisScale::Linear => coord,
            AxisScale::Log2 => coord.exp2(),
            AxisScale::Log10 => 10f64.powf(coord),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Svg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Order in which partitions become charts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionOrder {
    /// Ascending by key, numbers before text
    #[default]
    Sorted,
    /// Order of first appearance in the input
    FirstSeen,
}

/// How records are grouped into charts and series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupingOptions {
    pub columns: ColumnRoles,
    /// Average repeated measurements sharing a series and x value
    pub aggregate: bool,
    /// Preferred series order; unlisted series follow in first-seen order
    pub series_order: Vec<String>,
    pub partition_order: PartitionOrder,
}

/// Presentation of a rendered chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartStyle {
    pub x_scale: AxisScale,
    pub y_scale: AxisScale,
    /// Caption; `{column}` is replaced with the chart's value for that partition column
    pub title: Option<String>,
    pub x_label: String,
    pub y_label: String,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Everything needed to turn one CSV into a set of charts.
///
/// This is the shape of one entry in a report file; the `plot` subcommand
/// fills the same fields from its flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChartJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub partition_by: Vec<String>,
    pub series_by: String,
    pub x: String,
    pub y: String,
    pub aggregate: bool,
    pub series_order: Vec<String>,
    pub partition_order: PartitionOrder,
    pub x_scale: AxisScale,
    pub y_scale: AxisScale,
    pub title: Option<String>,
    /// Defaults to the x column name
    pub x_label: Option<String>,
    /// Defaults to the y column name
    pub y_label: Option<String>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Also write the built chart data as `<prefix>.json`
    pub export_json: bool,
}

impl Default for ChartJob {
    fn default() -> Self {
        let columns = ColumnRoles::default();
        Self {
            input: PathBuf::from("results.csv"),
            output_dir: PathBuf::from("Plots"),
            prefix: "chart".to_string(),
            partition_by: columns.partition_by,
            series_by: columns.series_by,
            x: columns.x,
            y: columns.y,
            aggregate: false,
            series_order: Vec::new(),
            partition_order: PartitionOrder::Sorted,
            x_scale: AxisScale::Linear,
            y_scale: AxisScale::Linear,
            title: None,
            x_label: None,
            y_label: None,
            format: ImageFormat::Png,
            width: 800,
            height: 500,
            export_json: false,
        }
    }
}

impl ChartJob {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn grouping(&self) -> GroupingOptions {
        GroupingOptions {
            columns: ColumnRoles {
                partition_by: self.partition_by.clone(),
                series_by: self.series_by.clone(),
                x: self.x.clone(),
                y: self.y.clone(),
            },
            aggregate: self.aggregate,
            series_order: self.series_order.clone(),
            partition_order: self.partition_order,
        }
    }

    pub fn style(&self) -> ChartStyle {
        ChartStyle {
            x_scale: self.x_scale,
            y_scale: self.y_scale,
            title: self.title.clone(),
            x_label: self.x_label.clone().unwrap_or_else(|| self.x.clone()),
            y_label: self.y_label.clone().unwrap_or_else(|| self.y.clone()),
            format: self.format,
            width: self.width,
            height: self.height,
        }
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.input.is_relative() {
            self.input = base.join(&self.input);
        }
        if self.output_dir.is_relative() {
            self.output_dir = base.join(&self.output_dir);
        }
    }
}

/// A JSON file listing several chart jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    pub charts: Vec<ChartJob>,
}

impl ReportConfig {
    /// Load a report file; relative paths inside it resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report file {}", path.display()))?;
        let mut config: ReportConfig = serde_json::from_str(&json)
            .with_context(|| format!("Invalid report file {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for job in &mut config.charts {
            job.resolve_paths(base);
        }
        Ok(config)
    }
}
