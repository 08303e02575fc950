use anyhow::{Context, Result};
use bench_charts::bench::{print_results, run_sweep, write_rows, SweepConfig};
use bench_charts::chart::{print_summary, run_job};
use bench_charts::config::{AxisScale, ChartJob, ImageFormat, PartitionOrder, ReportConfig};
use bench_charts::schedule::Schedule;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt::layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bench-charts")]
#[command(about = "Chart parallel-scheduling benchmark results from CSV files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one chart per partition of a results CSV
    Plot(PlotArgs),

    /// Render every chart listed in a JSON report file
    Report {
        /// Report file with a `charts` array
        #[arg(short, long, default_value = "charts.json")]
        config: PathBuf,
    },

    /// Time Mandelbrot renders under each scheduling method and write a results CSV
    Bench {
        /// CSV file to write
        #[arg(short, long, default_value = "results.csv")]
        output: PathBuf,

        /// Image sizes in pixels per side
        #[arg(long, value_delimiter = ',', default_values_t = [1000])]
        sizes: Vec<usize>,

        /// Thread counts
        #[arg(long, value_delimiter = ',', default_values_t = [1, 2, 4, 8])]
        threads: Vec<usize>,

        /// Scheduling methods
        #[arg(long, value_enum, value_delimiter = ',', default_values = ["static", "dynamic", "guided"])]
        methods: Vec<Schedule>,

        /// Chunk sizes; omit to use each method's default
        #[arg(long, value_delimiter = ',')]
        block_sizes: Vec<usize>,

        /// Timed runs per configuration
        #[arg(long, default_value = "3")]
        runs: usize,

        /// Untimed runs before the timed ones
        #[arg(long, default_value = "1")]
        warmup: usize,

        /// Iteration cap per pixel
        #[arg(long, default_value = "500")]
        max_iterations: u32,

        /// Append to the output instead of replacing it
        #[arg(long, default_value = "false")]
        append: bool,
    },
}

#[derive(Args)]
struct PlotArgs {
    /// Results CSV with a header row
    #[arg(short, long, default_value = "results.csv")]
    input: PathBuf,

    /// Output directory for charts
    #[arg(short, long, default_value = "Plots")]
    output: PathBuf,

    /// File name prefix for every chart
    #[arg(long, default_value = "chart")]
    prefix: String,

    /// Columns producing one chart per distinct value combination
    #[arg(long, value_delimiter = ',')]
    partition_by: Vec<String>,

    /// Column holding the series label
    #[arg(long, default_value = "method")]
    series_by: String,

    /// Column plotted on the x axis
    #[arg(long, default_value = "threads")]
    x: String,

    /// Column plotted on the y axis
    #[arg(long, default_value = "time_seconds")]
    y: String,

    /// Average repeated measurements of the same series and x value
    #[arg(long, default_value = "false")]
    aggregate: bool,

    /// Series drawn first, in this order
    #[arg(long, value_delimiter = ',')]
    series_order: Vec<String>,

    #[arg(long, value_enum, default_value = "sorted")]
    partition_order: PartitionOrder,

    #[arg(long, value_enum, default_value = "linear")]
    x_scale: AxisScale,

    #[arg(long, value_enum, default_value = "linear")]
    y_scale: AxisScale,

    /// Chart caption; `{column}` expands to the partition value
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    x_label: Option<String>,

    #[arg(long)]
    y_label: Option<String>,

    #[arg(long, value_enum, default_value = "png")]
    format: ImageFormat,

    #[arg(long, default_value = "800")]
    width: u32,

    #[arg(long, default_value = "500")]
    height: u32,

    /// Also write the chart data as JSON next to the images
    #[arg(long, default_value = "false")]
    export_json: bool,

    /// Print the plotted points
    #[arg(long, default_value = "false")]
    summary: bool,
}

impl PlotArgs {
    fn into_job(self) -> (ChartJob, bool) {
        let job = ChartJob {
            input: self.input,
            output_dir: self.output,
            prefix: self.prefix,
            partition_by: self.partition_by,
            series_by: self.series_by,
            x: self.x,
            y: self.y,
            aggregate: self.aggregate,
            series_order: self.series_order,
            partition_order: self.partition_order,
            x_scale: self.x_scale,
            y_scale: self.y_scale,
            title: self.title,
            x_label: self.x_label,
            y_label: self.y_label,
            format: self.format,
            width: self.width,
            height: self.height,
            export_json: self.export_json,
        };
        (job, self.summary)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Plot(args) => {
            let (job, summary) = args.into_job();
            plot(&job, summary)?;
        }
        Commands::Report { config } => {
            report(&config)?;
        }
        Commands::Bench {
            output,
            sizes,
            threads,
            methods,
            block_sizes,
            runs,
            warmup,
            max_iterations,
            append,
        } => {
            let block_sizes = if block_sizes.is_empty() {
                vec![None]
            } else {
                block_sizes.into_iter().map(Some).collect()
            };
            let config = SweepConfig {
                sizes,
                threads,
                schedules: methods,
                block_sizes,
                runs,
                warmup,
                max_iterations,
            };
            bench(&config, &output, append)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(format!("bench_charts={level}")),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(())
}

fn plot(job: &ChartJob, summary: bool) -> Result<()> {
    let output = run_job(job)
        .with_context(|| format!("Failed to chart {}", job.input.display()))?;

    if summary {
        print_summary(&output.charts);
    }
    info!(
        "{} chart(s) written to {}",
        output.images.len(),
        job.output_dir.display()
    );
    Ok(())
}

fn report(config_path: &Path) -> Result<()> {
    let report = ReportConfig::load(config_path)?;
    info!(
        "running {} chart job(s) from {}",
        report.charts.len(),
        config_path.display()
    );

    for (idx, job) in report.charts.iter().enumerate() {
        run_job(job).with_context(|| {
            format!(
                "Chart job {} ({}) in {} failed",
                idx + 1,
                job.input.display(),
                config_path.display()
            )
        })?;
    }

    println!("\nReport complete!");
    Ok(())
}

fn bench(config: &SweepConfig, output: &Path, append: bool) -> Result<()> {
    println!("\nBenchmark Configuration:");
    println!("  Sizes: {:?}", config.sizes);
    println!("  Threads: {:?}", config.threads);
    println!(
        "  Methods: {}",
        config
            .schedules
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Runs: {} (+{} warmup)", config.runs, config.warmup);
    println!("  Max iterations: {}", config.max_iterations);

    let rows = run_sweep(config)?;
    write_rows(output, &rows, append)?;
    print_results(&rows);

    println!(
        "{} result(s) {} {}",
        rows.len(),
        if append { "appended to" } else { "written to" },
        output.display()
    );
    println!("\nBenchmark complete!");
    Ok(())
}
