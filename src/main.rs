mod persist;

use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ising_sim::statistics::{
    autocorrelation_batch, efolding_time, integrated_time, isflat, mean_spin,
};
use ising_sim::{
    run_relaxed, run_scan, run_until_converged, ControlField, ConvergenceConfig, Ensemble,
    EnsembleConfig, EnsembleSummary, RunConfig, ScanConfig,
};
use tracing::{info, warn};

use crate::persist::Record;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(version, about = "2D Ising model Metropolis simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate one ensemble, or continue a saved one.
    Run(RunArgs),
    /// Simulate every (size, coupling) pair of a parameter grid.
    Scan(ScanArgs),
    /// Simulate until the mean energy is known to a relative tolerance.
    Converge(ConvergeArgs),
    /// Relax at zero field, then drive with a sinusoidal field.
    Hysteresis(HysteresisArgs),
    /// Summarise a saved ensemble or scan.
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Lattice extent along x (and y unless --ny is given).
    #[arg(short = 'n', long, default_value_t = 50)]
    size: usize,
    #[arg(long)]
    ny: Option<usize>,
    #[arg(long, default_value_t = 1)]
    sysnum: usize,
    /// Probability that a site starts as -1.
    #[arg(short, long, default_value_t = 0.5)]
    p: f64,
    /// Coupling J / kT.
    #[arg(short, long, default_value_t = 0.44)]
    b: f64,
    /// External field muH / J.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    h: f64,
    /// States to record after relaxation.
    #[arg(short, long, default_value_t = 1000)]
    iternum: usize,
    /// States to discard from the front.
    #[arg(short, long, default_value_t = 0)]
    relaxation: usize,
    #[arg(long)]
    seed: Option<u64>,
    /// Start every member from the same configuration.
    #[arg(long)]
    identical: bool,
    /// Advance members on one thread.
    #[arg(long)]
    sequential: bool,
    /// Append to a saved ensemble instead of starting a new one.
    #[arg(long, value_name = "FILE")]
    resume: Option<PathBuf>,
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[arg(long, value_delimiter = ',', required = true)]
    sizes: Vec<usize>,
    #[arg(long, value_delimiter = ',', required = true)]
    couplings: Vec<f64>,
    #[arg(long, default_value_t = 1)]
    sysnum: usize,
    #[arg(short, long, default_value_t = 0.5)]
    p: f64,
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    h: f64,
    #[arg(short, long, default_value_t = 500)]
    iternum: usize,
    #[arg(short, long, default_value_t = 200)]
    relaxation: usize,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConvergeArgs {
    #[arg(short = 'n', long, default_value_t = 25)]
    size: usize,
    #[arg(long, default_value_t = 20)]
    sysnum: usize,
    #[arg(short, long, default_value_t = 1.0)]
    p: f64,
    #[arg(short, long, default_value_t = 0.44)]
    b: f64,
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    h: f64,
    /// Target for |error / mean| of the energy.
    #[arg(long, default_value_t = 0.01)]
    tol: f64,
    #[arg(short, long, default_value_t = 150)]
    relaxation: usize,
    /// Sweeps between two checks of the estimate.
    #[arg(long, default_value_t = 100)]
    check_every: usize,
    #[arg(long, default_value_t = 10_000)]
    max_iternum: usize,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct HysteresisArgs {
    #[arg(short = 'n', long, default_value_t = 25)]
    size: usize,
    #[arg(long, default_value_t = 10)]
    sysnum: usize,
    #[arg(short, long, default_value_t = 0.5)]
    p: f64,
    #[arg(short, long, default_value_t = 0.5)]
    b: f64,
    /// Amplitude of the driving field.
    #[arg(long, default_value_t = 1.0)]
    maxh: f64,
    /// Sweeps per field cycle.
    #[arg(long, default_value_t = 200)]
    period: usize,
    /// Recorded states after relaxation; two periods by default.
    #[arg(short, long)]
    iternum: Option<usize>,
    #[arg(short, long, default_value_t = 200)]
    relaxation: usize,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    file: PathBuf,
    /// Largest autocorrelation lag; half the series by default.
    #[arg(long)]
    maxtau: Option<usize>,
    /// Smoothing window of the flatness test.
    #[arg(long, default_value_t = 20)]
    timescale: usize,
    #[arg(long, default_value_t = 1e-3)]
    tolerance: f64,
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template(
            "{msg} [{bar:40}] {pos}/{len} [{elapsed_precise} < {eta_precise}, {per_sec}]",
        )
        .unwrap()
        .progress_chars("=> "),
    );
    pb.set_message("sweeps");
    pb
}

fn print_summary(label: &str, ensemble: &Ensemble) -> Result<()> {
    let s = EnsembleSummary::from_ensemble(ensemble)?;
    println!("{label}");
    println!("  shape          {:?}", ensemble.shape());
    println!("  <m>            {:+.5} ± {:.5}", s.mag.mean, s.mag.error);
    println!("  <|m|>          {:.5} ± {:.5}", s.abs_mag.mean, s.abs_mag.error);
    println!("  <e>            {:+.5} ± {:.5}", s.energy.mean, s.energy.error);
    println!("  binder         {:.5}", s.binder);
    if let Some(c) = s.specific_heat {
        println!("  specific heat  {c:.5}");
    }
    if let Some(chi) = s.susceptibility {
        println!("  susceptibility {chi:.5}");
    }
    if let Some(rate) = ensemble.acceptance_rate() {
        println!("  acceptance     {rate:.4}");
    }
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let interrupted = AtomicBool::new(false);
    let ensemble = match &args.resume {
        Some(path) => {
            let mut ensemble = persist::load_ensemble(path)?;
            info!(path = %path.display(), iternum = ensemble.iternum(), "resuming");
            let run = RunConfig::resume(args.iternum).sequential(args.sequential);
            let pb = progress_bar(run.n_sweeps() as u64);
            ensemble
                .simulate_with(&run, &interrupted, &|| pb.inc(1))
                .context("continuing simulation")?;
            pb.finish();
            ensemble
        }
        None => {
            let mut config =
                EnsembleConfig::square(args.size, args.sysnum, args.p, args.b, args.h)
                    .with_identical(args.identical);
            config.grid_shape.1 = args.ny.unwrap_or(args.size);
            config.seed = args.seed;
            let total = args.relaxation + args.iternum;
            let pb = progress_bar(total.saturating_sub(1) as u64);
            let ensemble = run_relaxed(
                config,
                args.relaxation,
                args.iternum,
                args.sequential,
                &interrupted,
                &|| pb.inc(1),
            )
            .context("running simulation")?;
            pb.finish();
            ensemble
        }
    };

    print_summary("ensemble", &ensemble)?;
    if let Some(path) = &args.output {
        persist::save_ensemble(&ensemble, path)?;
        info!(path = %path.display(), "ensemble saved");
    }
    Ok(())
}

fn scan(args: ScanArgs) -> Result<()> {
    let scan = ScanConfig {
        sizes: args.sizes,
        couplings: args.couplings,
        sysnum: args.sysnum,
        p: args.p,
        h: args.h,
        relaxation: args.relaxation,
        iternum: args.iternum,
        seed: args.seed,
    };
    let runs = (scan.sizes.len() * scan.couplings.len()) as u64;
    let per_run = (scan.relaxation + scan.iternum).saturating_sub(1) as u64;
    let pb = progress_bar(runs * per_run);

    let registry = run_scan(&scan, &AtomicBool::new(false), &|| pb.inc(1))
        .context("running parameter scan")?;
    pb.finish();

    for (key, record) in registry.iter() {
        print_summary(
            &format!("N = {}, b = {}", key.size, key.coupling()),
            &record.ensemble,
        )?;
    }
    if let Some(path) = &args.output {
        persist::save_scan(&scan, &registry, path)?;
        info!(path = %path.display(), runs = registry.len(), "scan saved");
    }
    Ok(())
}

fn converge(args: ConvergeArgs) -> Result<()> {
    let mut config = EnsembleConfig::square(args.size, args.sysnum, args.p, args.b, args.h);
    config.seed = args.seed;
    let criteria = ConvergenceConfig {
        relaxation: args.relaxation,
        check_every: args.check_every,
        max_iternum: args.max_iternum,
        tol: args.tol,
    };
    let pb = progress_bar((criteria.relaxation + criteria.max_iternum).saturating_sub(1) as u64);
    let out = run_until_converged(config, &criteria, false, &AtomicBool::new(false), &|| {
        pb.inc(1)
    })
    .context("running until converged")?;
    pb.finish();

    println!(
        "E = {:+.5} ± {:.5} (|error / E| = {:.4}) after {} states",
        out.energy.mean,
        out.energy.error,
        out.energy.relative_error(),
        out.ensemble.iternum()
    );
    if !out.converged {
        warn!(max_iternum = criteria.max_iternum, "exceeded the state cap before converging");
    }
    print_summary("ensemble", &out.ensemble)?;
    if let Some(path) = &args.output {
        persist::save_ensemble(&out.ensemble, path)?;
        info!(path = %path.display(), "ensemble saved");
    }
    Ok(())
}

fn hysteresis(args: HysteresisArgs) -> Result<()> {
    if args.period == 0 {
        bail!("--period must be at least 1");
    }
    let iternum = args.iternum.unwrap_or(2 * args.period);
    if iternum < 2 {
        bail!("--iternum must be at least 2");
    }
    let cycle: Vec<f64> = (0..args.period)
        .map(|k| args.maxh * (TAU * k as f64 / args.period as f64).sin())
        .collect();

    let mut config = EnsembleConfig::square(args.size, args.sysnum, args.p, args.b, 0.0);
    config.seed = args.seed;
    let pb = progress_bar((args.relaxation + iternum - 1) as u64);
    let interrupted = AtomicBool::new(false);
    let mut ensemble = run_relaxed(config, args.relaxation, 1, false, &interrupted, &|| pb.inc(1))
        .context("relaxing at zero field")?;

    let drive = ControlField::periodic(&cycle, iternum - 1)?;
    ensemble.set_h(drive.clone())?;
    ensemble
        .simulate_with(&RunConfig::resume(iternum - 1), &interrupted, &|| pb.inc(1))
        .context("driving with the periodic field")?;
    pb.finish();

    let ControlField::Temporal(hs) = drive else {
        bail!("periodic field is not time-dependent");
    };
    let mags = ensemble.ensemble_mean(mean_spin);
    let spread = ensemble.ensemble_std(mean_spin);
    println!("{:>6} {:>9} {:>9} {:>9}", "t", "h", "<m>", "std");
    for (t, (m, s)) in mags.iter().zip(&spread).enumerate() {
        let h = if t == 0 { 0.0 } else { hs[t - 1] };
        println!("{t:>6} {h:>+9.4} {m:>+9.4} {s:>9.4}");
    }
    if let Some(path) = &args.output {
        persist::save_ensemble(&ensemble, path)?;
        info!(path = %path.display(), "ensemble saved");
    }
    Ok(())
}

fn inspect_ensemble(label: &str, ensemble: &Ensemble, args: &InspectArgs) -> Result<()> {
    print_summary(label, ensemble)?;

    let series = ensemble.trajectory().observable_series(mean_spin);
    let acfs = autocorrelation_batch(&series, ensemble.sysnum(), args.maxtau)?;
    for (k, acf) in acfs.iter().enumerate() {
        let efold = efolding_time(acf)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "> maxtau".into());
        println!(
            "  member {k}: e-folding time {efold}, integrated time {:.2}",
            integrated_time(acf)
        );
    }

    if ensemble.iternum() > args.timescale + 1 {
        let flat = isflat(|s| mean_spin(s).abs(), ensemble, args.timescale, args.tolerance, true)?;
        println!("  |m| flat over {} sweeps: {flat}", args.timescale);
    }
    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    match persist::load_record(&args.file)? {
        Record::Scan(record) => {
            let (_, registry) = record
                .into_registry()
                .with_context(|| format!("loading {}", args.file.display()))?;
            for (key, record) in registry.iter() {
                let label = format!(
                    "N = {}, b = {} (relaxation {})",
                    key.size,
                    key.coupling(),
                    record.relaxation
                );
                inspect_ensemble(&label, &record.ensemble, &args)?;
            }
        }
        Record::Ensemble(record) => {
            let ensemble = record
                .into_ensemble()
                .with_context(|| format!("loading {}", args.file.display()))?;
            inspect_ensemble(&file_label(&args.file), &ensemble, &args)?;
        }
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ensemble".into())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            if args.iternum == 0 {
                bail!("--iternum must be at least 1");
            }
            run(args)
        }
        Command::Scan(args) => scan(args),
        Command::Converge(args) => converge(args),
        Command::Hysteresis(args) => hysteresis(args),
        Command::Inspect(args) => inspect(args),
    }
}
