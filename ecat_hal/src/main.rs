//! # ECAT HAL Binary
//!
//! Runs the EtherCAT servo hardware interface on its own, with a minimal
//! host loop in place of the lifecycle framework.
//!
//! # Usage
//!
//! ```bash
//! # Simulated drives, one per declared joint
//! ecat_hal --config config/hardware.toml --simulate
//!
//! # Simulated bus with a fixed slave count, 5000 cycles, verbose logging
//! ecat_hal -c config/hardware.toml -s --slaves 4 --cycles 5000 -v
//!
//! # Override the fieldbus interface
//! ecat_hal -c config/hardware.toml -s --interface eth1
//!
//! # Simulated bus with injected faults
//! ecat_hal -c config/hardware.toml -s --sim-config config/simulation.toml
//! ```

use clap::Parser;
use ecat_common::config::{load_hardware, LogLevel};
use ecat_common::consts::DEFAULT_CONFIG_PATH;
use ecat_hal::core::HalCore;
use ecat_hal::drivers::simulation::{SimulatedMaster, SimulationConfig};
use ecat_hal::system::EcatSystem;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// ECAT HAL - EtherCAT servo-drive hardware interface
#[derive(Parser, Debug)]
#[command(name = "ecat_hal")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "EtherCAT servo-drive hardware interface")]
#[command(long_about = None)]
struct Args {
    /// Path to the hardware description (hardware.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Fieldbus interface, overrides `hardware.interface_name`
    #[arg(short, long)]
    interface: Option<String>,

    /// Use the simulated master stack
    #[arg(short = 's', long)]
    simulate: bool,

    /// Simulated slave count (default: one per joint)
    #[arg(long, requires = "simulate")]
    slaves: Option<usize>,

    /// TOML file with a `[simulation]` table
    #[arg(long, requires = "simulate")]
    sim_config: Option<PathBuf>,

    /// Stop after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("HAL failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_hardware(&args.config);
    let log_level = loaded
        .as_ref()
        .ok()
        .and_then(|info| info.shared.as_ref())
        .map(|shared| shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("ECAT HAL v{} starting...", env!("CARGO_PKG_VERSION"));
    let mut info = loaded.map_err(|e| format!("{}: {}", args.config.display(), e))?;
    info!(
        "Loaded {} joints from {}",
        info.joints.len(),
        args.config.display()
    );

    if let Some(interface) = args.interface {
        info.hardware.interface_name = interface;
    }

    if !args.simulate {
        return Err("no hardware master stack is linked into this build, run with --simulate".into());
    }

    let mut simulation = match &args.sim_config {
        Some(path) => SimulationConfig::load(path)
            .map_err(|e| format!("{}: {}", path.display(), e))?,
        None => SimulationConfig::with_slaves(info.joints.len().max(1)),
    };
    if let Some(slaves) = args.slaves {
        simulation.slaves = slaves;
    }
    info!("Simulation mode: {} slaves", simulation.slaves);
    let master = SimulatedMaster::new(simulation);

    let mut hal_core =
        HalCore::new(Box::new(EcatSystem::new(master)), info).with_max_cycles(args.cycles);

    let running = hal_core.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    hal_core.init()?;
    if let Err(e) = hal_core.run() {
        error!("Cycle loop error: {}", e);
    }
    hal_core.shutdown()?;

    info!("ECAT HAL shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.into()
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
