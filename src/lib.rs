pub mod bench;
pub mod builder;
pub mod chart;
pub mod config;
pub mod error;
pub mod mandelbrot;
pub mod record;
pub mod schedule;
pub mod table;

pub use builder::{BenchmarkChartBuilder, Chart, Point, Series};
pub use error::{ChartError, DataError};
