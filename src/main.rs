use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use mandelbench::benchmark::{self, BenchmarkConfig, BenchmarkEvent};
use mandelbench::cpu::CpuEngineConfig;
use mandelbench::history::{is_canonical_resolution, DEFAULT_HISTORY_FILE};
use mandelbench::viewport::ZOOM_IN_FACTOR;
use mandelbench::{EngineKind, Renderer, StatsAggregator, Viewport};

#[cfg(feature = "gpu")]
use mandelbench::gpu::{self, GpuConfig, KernelSource};

const DEFAULT_SIZE: u32 = 1024;
const DEFAULT_ITERATIONS: u32 = 1000;

/// Which engines to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineArg {
    Linear,
    Parallel,
    Gpu,
    All,
}

impl EngineArg {
    fn kinds(self) -> Vec<EngineKind> {
        match self {
            EngineArg::Linear => vec![EngineKind::Linear],
            EngineArg::Parallel => vec![EngineKind::Parallel],
            EngineArg::Gpu => vec![EngineKind::Gpu],
            #[cfg(feature = "gpu")]
            EngineArg::All => EngineKind::all().to_vec(),
            #[cfg(not(feature = "gpu"))]
            EngineArg::All => vec![EngineKind::Linear, EngineKind::Parallel],
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Mandelbrot renderer and CPU/GPU benchmark", long_about = None)]
struct Args {
    /// Engine to render with
    #[arg(short, long, value_enum, default_value_t = EngineArg::All)]
    engine: EngineArg,

    #[arg(long, default_value_t = DEFAULT_SIZE)]
    width: u32,

    #[arg(long, default_value_t = DEFAULT_SIZE)]
    height: u32,

    #[arg(short, long, default_value_t = DEFAULT_ITERATIONS)]
    max_iterations: u32,

    #[arg(short, long, help = "Number of threads (default: CPU count)")]
    threads: Option<usize>,

    /// Zoom frames to render after the first image
    #[arg(long, default_value_t = 0)]
    frames: usize,

    /// Run the repeated-trial benchmark instead of a single render
    #[arg(long, default_value_t = false)]
    benchmark: bool,

    #[arg(long, default_value_t = 3)]
    trials: usize,

    /// History file; only canonical-resolution renders are saved
    #[arg(long, default_value = DEFAULT_HISTORY_FILE)]
    stats_file: PathBuf,

    /// Print the recorded history and exit
    #[arg(long, default_value_t = false)]
    show_stats: bool,

    /// List available GPUs and exit
    #[arg(long, default_value_t = false)]
    list_gpus: bool,

    /// Select GPU by index (use --list-gpus to see available)
    #[arg(long)]
    gpu_index: Option<usize>,

    /// Load the GPU kernel from a WGSL file instead of the bundled one.
    /// Float scalars must match the GPU's precision (see --list-gpus)
    #[arg(long)]
    kernel: Option<PathBuf>,

    #[arg(long, default_value = "30s", help = "Timeout for GPU readback (e.g., '30s', '2m')")]
    gpu_timeout: String,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn parse_timeout(s: &str) -> Option<Duration> {
    humantime::parse_duration(s)
        .ok()
        .filter(|d| !d.is_zero())
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // Handle --list-gpus early
    if args.list_gpus {
        #[cfg(feature = "gpu")]
        {
            let gpus = gpu::enumerate_gpus();
            if gpus.is_empty() {
                println!("No GPUs found.");
            } else {
                println!("Available GPUs:");
                for gpu_info in &gpus {
                    println!("  {}", gpu_info);
                }
                println!();
                println!("Use --engine gpu --gpu-index N to render on a specific GPU");
            }
        }
        #[cfg(not(feature = "gpu"))]
        {
            println!("GPU support not compiled. Build with: cargo build --features gpu");
        }
        process::exit(0);
    }

    if args.engine == EngineArg::Gpu {
        #[cfg(not(feature = "gpu"))]
        {
            eprintln!("Error: GPU support not compiled.");
            eprintln!("Build with: cargo build --features gpu");
            process::exit(1);
        }
    }

    let Some(timeout) = parse_timeout(&args.gpu_timeout) else {
        eprintln!("Error: invalid --gpu-timeout '{}'", args.gpu_timeout);
        process::exit(1);
    };

    // Saving is disabled when an unreadable history could not be moved aside
    let (history, store) = match StatsAggregator::load_or_recover(&args.stats_file) {
        Ok((history, backup)) => {
            if let Some(backup) = backup {
                eprintln!(
                    "Warning: unreadable history moved to {}",
                    backup.display()
                );
            }
            (history, Some(args.stats_file.as_path()))
        }
        Err(e) => {
            warn!("ignoring history {}: {}", args.stats_file.display(), e);
            eprintln!(
                "Warning: history {} unreadable, not saving this run",
                args.stats_file.display()
            );
            (StatsAggregator::new(), None)
        }
    };

    if args.show_stats {
        print_history(&history);
        process::exit(0);
    }

    let renderer = build_renderer(&args, timeout);
    if args.benchmark {
        run_benchmark(&args, renderer, history, store);
    } else {
        run_render(&args, renderer, history, store);
    }
}

#[cfg_attr(not(feature = "gpu"), allow(unused_variables))]
fn build_renderer(args: &Args, timeout: Duration) -> Renderer {
    let cpu = CpuEngineConfig {
        threads: args.threads,
        ..Default::default()
    };

    #[cfg(feature = "gpu")]
    {
        let kernel = match &args.kernel {
            Some(path) => KernelSource::File(path.clone()),
            None => KernelSource::Bundled,
        };
        Renderer::with_gpu(
            &cpu,
            GpuConfig {
                adapter_index: args.gpu_index,
                kernel,
                timeout,
                palette: cpu.palette,
            },
        )
    }
    #[cfg(not(feature = "gpu"))]
    {
        Renderer::new(&cpu)
    }
}

fn run_render(
    args: &Args,
    mut renderer: Renderer,
    mut history: StatsAggregator,
    store: Option<&Path>,
) {
    let viewport = match Viewport::new(args.width) {
        Ok(viewport) => viewport,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    println!("Mandelbrot Render");
    println!("=================");
    println!("Resolution: {}x{}", args.width, args.height);
    println!("Max iterations: {}", args.max_iterations);
    println!();

    let mut failures = 0;
    for kind in args.engine.kinds() {
        match render_frames(args, &mut renderer, viewport.clone(), kind, &mut history) {
            Ok(()) => {}
            Err(e) => {
                eprintln!("{} failed: {}", kind, e);
                failures += 1;
            }
        }
    }

    save_history(args, &history, store);

    println!();
    if failures == 0 {
        println!("SUCCESS: all renders completed");
        process::exit(0);
    } else {
        println!("{} engine(s) failed", failures);
        process::exit(1);
    }
}

/// Renders the canonical view, then `--frames` zoom steps towards the lower right quadrant.
fn render_frames(
    args: &Args,
    renderer: &mut Renderer,
    mut viewport: Viewport,
    kind: EngineKind,
    history: &mut StatsAggregator,
) -> Result<(), mandelbench::RenderError> {
    let request = viewport.request(args.width, args.height, args.max_iterations)?;
    let output = renderer.render(kind, &request)?;
    let describe = renderer.engine_mut(kind)?.describe();
    println!("{} ({}): {:.2} ms", kind, describe, output.elapsed_ms);
    history.record(output.record());

    if args.frames == 0 {
        return Ok(());
    }

    let mut pixels = output.pixels;
    let focus_x = args.width as f64 * 0.75;
    let focus_y = args.height as f64 * 0.75;
    let mut total_ms = 0.0;
    for _ in 0..args.frames {
        viewport.zoom_at(focus_x, focus_y, args.width, args.height, ZOOM_IN_FACTOR)?;
        let request = viewport.request(args.width, args.height, args.max_iterations)?;
        let elapsed_ms = renderer.render_into(kind, &request, &mut pixels)?;
        history.record(mandelbench::ComputationRecord::new(
            elapsed_ms,
            request.resolution_label(),
            kind,
        ));
        total_ms += elapsed_ms;
    }
    println!(
        "  {} zoom frames: {:.2} ms average",
        args.frames,
        total_ms / args.frames as f64
    );
    Ok(())
}

fn run_benchmark(
    args: &Args,
    renderer: Renderer,
    history: StatsAggregator,
    store: Option<&Path>,
) {
    let kinds = args.engine.kinds();
    let engines = renderer
        .into_engines()
        .into_iter()
        .filter(|engine| kinds.contains(&engine.kind()))
        .collect();
    let config = BenchmarkConfig {
        width: args.width,
        height: args.height,
        trials: args.trials,
        max_iterations: args.max_iterations,
    };

    println!("Mandelbrot Benchmark");
    println!("====================");
    println!("Resolution: {}x{}", config.width, config.height);
    println!("Trials: {}", config.trials);
    println!();

    let handle = benchmark::spawn(config, engines, history);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} runs | {msg}")
            .unwrap()
            .progress_chars("=> "),
    );

    for event in handle.events().iter() {
        match event {
            BenchmarkEvent::Started { total_runs } => pb.set_length(total_runs as u64),
            BenchmarkEvent::RunCompleted {
                trial,
                engine,
                elapsed_ms,
            } => {
                pb.set_message(format!("trial {} {}: {:.2} ms", trial + 1, engine, elapsed_ms));
                pb.inc(1);
            }
            BenchmarkEvent::EngineFailed(failure) => {
                pb.println(format!(
                    "{} failed in trial {}: {}",
                    failure.engine,
                    failure.trial + 1,
                    failure.message
                ));
            }
            BenchmarkEvent::Finished(_) => {
                pb.finish_with_message("Complete");
                break;
            }
            BenchmarkEvent::Failed { message } => {
                pb.abandon_with_message(message);
                break;
            }
        }
    }

    let outcome = match handle.join() {
        Ok(outcome) => outcome,
        Err(_) => {
            eprintln!("Error: benchmark thread panicked");
            process::exit(1);
        }
    };
    save_history(args, &outcome.history, store);

    match outcome.result {
        Ok(summary) => {
            println!();
            println!("Averages over {} trials at {}", summary.trials, summary.resolution);
            for (engine, mean_ms) in &summary.averages {
                println!("  {:<8} {:>10.2} ms", engine.name(), mean_ms);
            }
            for failure in &summary.failures {
                println!("  {:<8} {:>10}", failure.engine.name(), "no data");
            }
            if summary.is_complete() {
                process::exit(0);
            }
            eprintln!();
            eprintln!("{} engine(s) failed during the benchmark", summary.failures.len());
            process::exit(1);
        }
        Err(e) => {
            eprintln!();
            eprintln!("Benchmark error: {}", e);
            process::exit(1);
        }
    }
}

fn save_history(args: &Args, history: &StatsAggregator, store: Option<&Path>) {
    let Some(path) = store else {
        return;
    };
    if !is_canonical_resolution(args.width, args.height) {
        return;
    }
    if let Err(e) = history.save(path) {
        eprintln!("Warning: could not save history to {}: {}", path.display(), e);
    }
}

fn print_history(history: &StatsAggregator) {
    if history.is_empty() {
        println!("No recorded renders.");
        return;
    }
    println!("{}", history.listing());
    println!();
    println!("Averages:");
    for average in history.averages() {
        println!("  {} {}", average.engine, average);
    }
}
