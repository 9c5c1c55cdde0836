//! Batch dispersion run driver.
//!
//! Assembles a domain, a point source and a stationary direction sweep
//! from command-line flags, then drives the run to completion. Exit
//! codes: 0 completed, 1 failed, 2 cancelled.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use plume_sim_core::{
    Degrees, Domain, EmissionSource, FrequencyEntry, GridGeometry, MetersPerSecond, Receptor,
    RunConfig, RunContext, RunStatus, Simulation, SourceGeometry, StabilityClass, StationaryTable,
    TerrainData,
};
use plume_sim_core::domain::DomainMode;

/// Atmospheric dispersion simulation demo with configurable parameters
#[derive(Parser, Debug)]
#[command(name = "plume-sim")]
#[command(about = "Lagrangian dispersion simulation driver", long_about = None)]
struct Args {
    /// Horizontal cells per axis (square domain)
    #[arg(long, default_value_t = 40)]
    cells: usize,

    /// Horizontal cell size in metres
    #[arg(long, default_value_t = 10.0)]
    cell_size: f32,

    /// Vertical layers
    #[arg(long, default_value_t = 12)]
    layers: usize,

    /// First-layer height in metres
    #[arg(long, default_value_t = 3.0)]
    layer_height: f32,

    /// Vertical stretching factor above the first layer
    #[arg(long, default_value_t = 1.2)]
    stretch: f32,

    /// Wind direction sectors to simulate (one situation per sector)
    #[arg(short, long, default_value_t = 8)]
    sectors: u16,

    /// Wind speed in m/s
    #[arg(short, long, default_value_t = 3.0)]
    wind_speed: f32,

    /// Stability class (1 = very unstable .. 7 = very stable)
    #[arg(long, default_value_t = 4)]
    stability: u8,

    /// Emission strength of the central point source in mass/s
    #[arg(long, default_value_t = 1.0)]
    strength: f64,

    /// Release height above ground in metres
    #[arg(long, default_value_t = 8.0)]
    release_height: f32,

    /// Dispersion time per situation in seconds
    #[arg(short, long, default_value_t = 3600.0)]
    duration: f32,

    /// Particle budget per situation
    #[arg(short, long, default_value_t = 50_000)]
    particles: usize,

    /// Worker threads for the advection passes (0 = automatic)
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// Put a Gaussian hill at the domain centre (complex-terrain mode)
    #[arg(long)]
    hill: Option<f32>,

    /// Disable deterministic particle streams
    #[arg(long)]
    free_running: bool,

    /// Output directory for artifacts and the run log
    #[arg(short, long, default_value = "result")]
    out: PathBuf,
}

fn build_simulation(args: &Args) -> Result<Simulation, String> {
    let extent = args.cells as f32 * args.cell_size;
    let geometry = GridGeometry::new(
        args.cells,
        args.cells,
        args.layers,
        args.cell_size,
        args.cell_size,
        args.layer_height,
        args.stretch,
        0.0,
        0.0,
        vec![1.5],
    )
    .map_err(|e| e.to_string())?;

    let domain = match args.hill {
        Some(height) => {
            let terrain =
                TerrainData::single_hill(extent, extent, args.cell_size, 0.0, height, extent / 6.0);
            Domain::assemble(geometry, DomainMode::ComplexTerrain, &terrain, &[], &[], 0.1)
                .map_err(|e| e.to_string())?
        }
        None => Domain::flat(geometry, 0.1).map_err(|e| e.to_string())?,
    };

    let stability = StabilityClass::from_class(args.stability)
        .ok_or_else(|| format!("stability class {} out of range 1..=7", args.stability))?;
    let entries = (0..args.sectors)
        .map(|sector| FrequencyEntry {
            wind_speed: MetersPerSecond::new(args.wind_speed),
            wind_direction: Degrees::new(
                f32::from(sector) * 360.0 / f32::from(args.sectors.max(1)),
            ),
            stability,
            frequency: 1.0,
        })
        .collect();
    let table = StationaryTable::new(entries).map_err(|e| e.to_string())?;

    let source = EmissionSource {
        name: "central stack".into(),
        geometry: SourceGeometry::Point {
            x: extent / 2.0,
            y: extent / 2.0,
            height: args.release_height,
        },
        strength: args.strength,
        source_group: 0,
        deposition_velocity: 0.0,
    };

    let receptors = vec![Receptor {
        id: 1,
        name: "downwind".into(),
        x: extent * 0.75,
        y: extent / 2.0,
        z: 1.5,
    }];

    let config = RunConfig {
        dispersion_time: args.duration,
        particle_rate: args.particles as f32 / args.duration.max(1.0),
        max_particles: args.particles,
        max_threads: args.threads,
        deterministic: !args.free_running,
        output_directory: args.out.clone(),
        field_store_directory: args.hill.map(|_| args.out.clone()),
        ..RunConfig::default()
    };

    Ok(Simulation::new(
        domain,
        vec![source],
        Box::new(table),
        receptors,
        config,
    ))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    println!("=== plume-sim dispersion run ===\n");
    println!(
        "Domain {0}x{0} cells ({1:.0} m), {2} sectors at {3:.1} m/s, stability {4}",
        args.cells,
        args.cells as f32 * args.cell_size,
        args.sectors,
        args.wind_speed,
        args.stability
    );

    let simulation = match build_simulation(&args) {
        Ok(simulation) => simulation,
        Err(message) => {
            eprintln!("setup failed: {message}");
            return ExitCode::from(1);
        }
    };

    let (ctx, _cancel) = RunContext::new();
    match simulation.run(&ctx) {
        Ok(summary) => {
            println!();
            println!(
                "Situations: {} computed, {} skipped",
                summary.situations_computed, summary.situations_skipped
            );
            println!(
                "Particles:  {} released, {} left the domain",
                summary.particles_released, summary.particles_discarded
            );
            println!("Deposited:  {:.3e}", summary.deposited_mass);
            match summary.status {
                RunStatus::Completed => {
                    println!("Run completed.");
                    ExitCode::SUCCESS
                }
                RunStatus::Cancelled => {
                    println!("Run cancelled by request.");
                    ExitCode::from(2)
                }
            }
        }
        Err(e) => {
            eprintln!("run failed: {e}");
            ExitCode::from(1)
        }
    }
}
