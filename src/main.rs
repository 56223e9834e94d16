use clap::Parser;
use offload_rs::config::{DEFAULT_ELEMENT_COUNT, DEFAULT_ENTRY_POINT, DEFAULT_KERNEL_PATH};
use offload_rs::telemetry::timer::as_millis_f64;
use offload_rs::telemetry::{JsonExporter, ReportExporter};
use offload_rs::{Config, HostArray, PreviewMode};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Add two random integer arrays on a GPU (or CPU fallback) and time the kernel.
#[derive(Debug, Parser)]
#[command(name = "offload", version, about)]
struct Cli {
    /// Number of elements per array
    #[arg(default_value_t = DEFAULT_ELEMENT_COUNT)]
    elements: usize,

    /// WGSL kernel program
    #[arg(long, default_value = DEFAULT_KERNEL_PATH)]
    kernel: PathBuf,

    /// Kernel entry point
    #[arg(long, default_value = DEFAULT_ENTRY_POINT)]
    entry: String,

    /// Restrict platforms, e.g. "vulkan" or "metal,gl"
    #[arg(long)]
    backend: Option<String>,

    /// Seed for reproducible input arrays
    #[arg(long)]
    seed: Option<u64>,

    /// Array preview: off, abbreviated or full
    #[arg(long, default_value = "abbreviated")]
    preview: PreviewMode,

    /// Number of timed dispatches
    #[arg(long, default_value_t = 1)]
    iterations: u32,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Check the output against host-side addition
    #[arg(long)]
    verify: bool,
}

impl Cli {
    fn into_config(self) -> offload_rs::Result<Config> {
        let mut builder = Config::builder()
            .element_count(self.elements)
            .kernel_path(self.kernel)
            .entry_point(self.entry)
            .preview(self.preview)
            .iterations(self.iterations)
            .verify(self.verify);

        if let Some(list) = self.backend.as_deref() {
            builder = builder.backend_list(list);
        }
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        if let Some(path) = self.report {
            builder = builder.report_path(path);
        }

        builder.build()
    }
}

fn print_preview(array: &HostArray, mode: PreviewMode) {
    if let Some(text) = array.preview(mode) {
        println!("{text}");
    }
}

fn execute(config: &Config) -> offload_rs::Result<()> {
    // Independent streams so `--seed` does not give identical inputs.
    let a = HostArray::random(config.element_count, config.seed);
    let b = HostArray::random(config.element_count, config.seed.map(|s| s.wrapping_add(1)));

    print_preview(&a, config.preview);
    print_preview(&b, config.preview);

    let outcome = offload_rs::pipeline::run(config, &a, &b)?;

    print_preview(&outcome.output, config.preview);
    println!(
        "Kernel Execution Time: {} ms",
        as_millis_f64(outcome.kernel_time)
    );

    if config.iterations > 1 {
        let summary = outcome.timings.summary();
        println!(
            "Over {} dispatches: min {:.3} ms, mean {:.3} ms, p50 {:.3} ms, p99 {:.3} ms, max {:.3} ms",
            summary.iterations,
            summary.min_ms,
            summary.mean_ms,
            summary.p50_ms,
            summary.p99_ms,
            summary.max_ms
        );
    }

    if let Some(path) = &config.report_path {
        JsonExporter::new(path).export(&outcome.report(config))?;
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = Cli::parse().into_config().and_then(|config| execute(&config));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.compile_log() {
                Some(log) => {
                    tracing::error!("program build failed");
                    eprintln!("{log}");
                }
                None => tracing::error!("{err}"),
            }
            ExitCode::from(err.exit_code())
        }
    }
}
