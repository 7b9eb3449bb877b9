use std::f64::consts::TAU;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use cavtune_core::{
    steps_from_radians, Bench, CancelToken, LinearStage, ModeLookup, RotaryStage, SessionStore,
    Target, TuneOptions, TuningSession, VisaTcpTransport, Vna,
};

/// Tune the filter cavity to a target resonance frequency and coupling depth.
#[derive(Parser, Debug)]
#[command(name = "cavtune")]
#[command(about = "Closed-loop microwave filter-cavity tuner")]
struct Args {
    /// Target resonance frequency in GHz
    #[arg(long)]
    target_ghz: f64,

    /// Depth tolerance (linear amplitude) at which the cavity counts as tuned
    #[arg(long, default_value = "1e-3")]
    depth_tolerance: f64,

    /// Frequency scale of the cost function's offset term, in Hz
    #[arg(long, default_value = "1e4")]
    frequency_tolerance: f64,

    /// VNA address (VISA socket, host:port)
    #[arg(long, default_value = "192.168.1.44:5025")]
    vna_addr: String,

    /// Serial port of the Zaber linear stage
    #[arg(long, default_value = "/dev/ttyUSB0")]
    linear_port: String,

    /// Zaber device number of the linear stage
    #[arg(long, default_value = "1")]
    linear_device: u8,

    /// Serial port of the Trinamic rotary stage
    #[arg(long, default_value = "/dev/ttyUSB1")]
    rotary_port: String,

    /// TMCL module address of the rotary stage
    #[arg(long, default_value = "1")]
    rotary_module: u8,

    /// Motor number on the TMCL module
    #[arg(long, default_value = "0")]
    rotary_motor: u8,

    /// Mode lookup table (CSV: frequency_ghz,length_mm)
    #[arg(long, default_value = "lookuptable.csv")]
    lookup: PathBuf,

    /// Directory for raw traces and sweep/peak records (omit to disable)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Half-width of the length search box, in mm
    #[arg(long, default_value = "0.5")]
    lin_span: f64,

    /// Coupling span of the initial simplex, in radians
    #[arg(long, default_value_t = 0.1 * TAU)]
    coupling_span: f64,

    /// Cold start: consult the lookup table and coarse-pull first
    #[arg(long)]
    cold_start: bool,

    /// Scan the coupling angle for a usable starting point
    #[arg(long)]
    scan_coupling: bool,

    /// Verbose progress output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if args.verbose { "debug" } else { "info" },
    ))
    .init();

    let mut target = Target::new(args.target_ghz * 1e9);
    target.depth_tolerance = args.depth_tolerance;
    target.frequency_tolerance_hz = args.frequency_tolerance;

    let options = TuneOptions {
        verbose: args.verbose,
        lin_span_mm: args.lin_span,
        coupling_span_steps: steps_from_radians(args.coupling_span) as f64,
        small_change: !args.cold_start,
        scan_coupling: args.scan_coupling,
    };

    let mut vna = Vna::new(
        VisaTcpTransport::connect(&args.vna_addr)
            .with_context(|| format!("connecting to VNA at {}", args.vna_addr))?,
    );
    let mut linear = LinearStage::open(&args.linear_port, args.linear_device)
        .with_context(|| format!("opening linear stage on {}", args.linear_port))?;
    let mut rotary = RotaryStage::open(&args.rotary_port, args.rotary_module, args.rotary_motor)
        .with_context(|| format!("opening rotary stage on {}", args.rotary_port))?;

    let mut session = TuningSession::new(target, options);

    if args.cold_start {
        let lookup = ModeLookup::load(&args.lookup)
            .with_context(|| format!("loading lookup table {}", args.lookup.display()))?;
        session = session.with_lookup(lookup);
    }
    if let Some(data_dir) = &args.data_dir {
        session = session.with_store(SessionStore::new(data_dir)?);
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, finishing the current measurement");
            cancel.cancel();
        })
        .context("installing the interrupt handler")?;
    }
    session = session.with_cancel_token(cancel);

    let mut bench = Bench {
        vna: &mut vna,
        linear: &mut linear,
        rotary: &mut rotary,
    };

    let outcome = session.run(&mut bench)?;

    println!(
        "{} after {} iterations ({} cost evaluations)",
        if outcome.depth_met() {
            "Tuned"
        } else {
            "Stopped"
        },
        outcome.iterations,
        outcome.log.len()
    );
    println!(
        "best point: {:.4} mm, {:.0} steps (level {:.4e}, {:?})",
        outcome.best_length_mm, outcome.best_coupling_steps, outcome.best_level, outcome.termination
    );

    Ok(())
}
