//! The simulation control loop.
//!
//! A single control thread drives the per-situation state machine:
//! fetch → (skip | resolve wind field → transport → accumulate → dispatch
//! I/O) → next. Particle passes fan out over the advection thread pool;
//! artifact serialization overlaps the next situation on the output
//! pipeline's background writers. Cancellation is polled at the top of
//! each iteration and after every long-running phase; on observation the
//! loop joins in-flight writers and exits with a distinct `Cancelled`
//! status. Errors local to one situation are logged and skipped; only
//! setup and output-pipeline failures abort the run.

use std::time::Instant;

use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::accumulate::{
    AccumulationDelta, ConcentrationGrid, Receptor, ReceptorSet, ReceptorStatistics, TransientPool,
};
use crate::core_types::{situation_seed_v1, SEED_VERSION};
use crate::domain::{Domain, GridGeometry};
use crate::meteo::{Fetch, MeteoError, SituationSource, WeatherSituation};
use crate::output::{ConcentrationArtifact, OutputError, OutputPipeline, ReceptorArtifact, ReceptorRecord};
use crate::run::config::RunConfig;
use crate::run::context::RunContext;
use crate::run::log::RunLog;
use crate::transport::{EmissionSource, TransportEngine};
use crate::wind::{FieldSnapshot, FieldStore, WindFieldSolver};

/// How a run ended, short of a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// End-of-run accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub situations_computed: u32,
    pub situations_skipped: u32,
    pub particles_released: u64,
    /// Particles that left the domain or failed interpolation; diagnostics
    /// only.
    pub particles_discarded: u64,
    pub deposited_mass: f64,
    /// Mass left in the transient carry-over pool at run end; 0 in
    /// stationary mode.
    pub transient_carried_mass: f64,
    /// Seed derivation version used for deterministic streams.
    pub seed_version: u32,
}

/// Fatal pre-loop failures.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no emission sources defined")]
    NoSources,
    #[error("meteorological input failed: {0}")]
    Meteo(#[from] MeteoError),
    #[error("advection thread pool: {0}")]
    ThreadPool(String),
}

/// Anything that aborts a run. Situation-level faults never reach this
/// type; they are logged and skipped inside the loop.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// One configured simulation run.
pub struct Simulation {
    domain: Domain,
    sources: Vec<EmissionSource>,
    situations: Box<dyn SituationSource>,
    receptors: ReceptorSet,
    config: RunConfig,
}

impl Simulation {
    #[must_use]
    pub fn new(
        domain: Domain,
        sources: Vec<EmissionSource>,
        situations: Box<dyn SituationSource>,
        receptors: Vec<Receptor>,
        config: RunConfig,
    ) -> Self {
        Self {
            domain,
            sources,
            situations,
            receptors: ReceptorSet::new(receptors),
            config,
        }
    }

    /// Drive the run to completion or cancellation.
    ///
    /// # Errors
    /// `RunError::Setup` for pre-loop failures (no sources, broken
    /// meteorology, thread pool); `RunError::Output` when the output
    /// pipeline becomes unavailable.
    pub fn run(self, ctx: &RunContext) -> Result<RunSummary, RunError> {
        let Simulation {
            domain,
            sources,
            mut situations,
            mut receptors,
            config,
        } = self;

        if sources.is_empty() {
            return Err(SetupError::NoSources.into());
        }
        let n_groups = sources
            .iter()
            .map(|s| s.source_group)
            .max()
            .unwrap_or(0)
            + 1;
        let transient = situations.is_transient();

        let pool = build_thread_pool(config.max_threads)?;
        let mut pipeline = OutputPipeline::new(config.output_directory.clone())?;
        let mut log = RunLog::create(pipeline.directory());
        log.header(&format!(
            "plume-sim core {} | {} source(s), {} group(s), budget {} particles",
            env!("CARGO_PKG_VERSION"),
            sources.len(),
            n_groups,
            config.particle_budget()
        ));
        if config.deterministic {
            let banner = format!("deterministic particle streams enabled (seed v{SEED_VERSION})");
            info!("{banner}");
            log.line(&banner);
        }
        if transient {
            log.line("transient mode: particle mass carries over between situations");
        }

        let store = FieldStore::new(config.field_store_directory.clone());
        let mut solver = WindFieldSolver::new(config.solver.clone(), store);
        let geometry = domain.geometry().clone();
        let mut grid = ConcentrationGrid::new(&geometry, n_groups);
        let mut carry_pool =
            transient.then(|| TransientPool::new(&geometry, n_groups, config.transient_threshold));
        let transport_config = config.transport();
        let budget = config.particle_budget();

        let mut computed = 0_u32;
        let mut skipped = 0_u32;
        let mut released = 0_u64;
        let mut discarded = 0_u64;
        let mut deposited = 0.0_f64;

        let status = 'situations: loop {
            // Checkpoint: top of every iteration.
            if ctx.is_cancelled() {
                break 'situations RunStatus::Cancelled;
            }

            let fetch = situations.next_situation().map_err(SetupError::Meteo)?;
            // Checkpoint: a signal raised during the fetch must stop the
            // loop before any new solve, pass or I/O dispatch starts.
            if ctx.is_cancelled() {
                break 'situations RunStatus::Cancelled;
            }
            let situation = match fetch {
                Fetch::EndOfSequence => break 'situations RunStatus::Completed,
                Fetch::Skip(situation) => {
                    skipped += 1;
                    let reason = format!(
                        "situation {:5}: skipped (no matching reference profile)",
                        situation.index
                    );
                    warn!("{reason}");
                    log.line(&reason);
                    dispatch_skipped(
                        &mut pipeline,
                        &geometry,
                        n_groups,
                        &situation,
                        &config,
                        &mut receptors,
                    )?;
                    continue;
                }
                Fetch::Situation(situation) => situation,
            };

            info!(
                index = situation.index,
                speed = situation.wind_speed,
                direction = situation.wind_direction,
                stability = situation.stability.as_class(),
                "processing weather situation"
            );
            let situation_started = Instant::now();

            let solved = match solver.solve(&situation, &domain) {
                Ok(solved) => solved,
                Err(e) => {
                    skipped += 1;
                    let reason = format!(
                        "situation {:5}: skipped (wind field: {e})",
                        situation.index
                    );
                    warn!("{reason}");
                    log.line(&reason);
                    dispatch_skipped(
                        &mut pipeline,
                        &geometry,
                        n_groups,
                        &situation,
                        &config,
                        &mut receptors,
                    )?;
                    continue;
                }
            };
            let wind_seconds = situation_started.elapsed().as_secs_f64();

            // Checkpoint: the flow-field solve can run long.
            if ctx.is_cancelled() {
                break 'situations RunStatus::Cancelled;
            }

            if solved.freshly_computed {
                pipeline.submit_flow_field(FieldSnapshot {
                    key: solved.key,
                    situation_index: situation.index,
                    field: (*solved.field).clone(),
                })?;
            }

            let seed = if config.deterministic {
                situation_seed_v1(
                    situation.index,
                    situation.wind_speed,
                    situation.wind_direction,
                )
            } else {
                rand::random()
            };
            let emission_factor = situations.emission_factor(&situation);
            let engine =
                TransportEngine::new(&domain, &solved.field, &transport_config, n_groups, transient);

            // Transient carry-over pass precedes the fresh release.
            let mut total_delta = AccumulationDelta::new(&geometry, n_groups, transient);
            if let Some(pool_state) = &mut carry_pool {
                let carriers = pool_state.drain();
                if !carriers.is_empty() {
                    let (delta, stats) = pool.install(|| {
                        engine.transient_pass(&carriers, &situation, seed)
                    });
                    total_delta.merge(&delta);
                    released += stats.released as u64;
                    discarded += stats.discarded as u64;
                    deposited += stats.deposited_mass;
                }
            }

            let (delta, stats) = pool.install(|| {
                engine.release_pass(&sources, budget, &situation, emission_factor, seed)
            });
            total_delta.merge(&delta);
            released += stats.released as u64;
            discarded += stats.discarded as u64;
            deposited += stats.deposited_mass;

            // Checkpoint: the particle passes are the dominant cost.
            if ctx.is_cancelled() {
                break 'situations RunStatus::Cancelled;
            }

            // Accumulate, volume-correct exactly once, refill the pool,
            // sample receptors.
            grid.reset_for(situation.index);
            grid.absorb(&total_delta);
            grid.normalize(&geometry, config.dispersion_time);
            if let Some(pool_state) = &mut carry_pool {
                pool_state.absorb(&geometry, &total_delta, config.dispersion_time);
            }
            receptors.sample(&grid, &geometry);

            pipeline.submit_concentration(ConcentrationArtifact {
                situation_index: situation.index,
                skipped: false,
                timestamp: situation.timestamp,
                dispersion_time: config.dispersion_time,
                slice_heights: geometry.slice_heights().to_vec(),
                grid: grid.clone(),
            })?;
            if !receptors.is_empty() {
                pipeline.submit_receptors(receptor_artifact(&receptors, None))?;
            }
            computed += 1;

            let total_seconds = situation_started.elapsed().as_secs_f64();
            let line = format!(
                "situation {:5}: computed (wind {:.1} s, dispersion {:.1} s)",
                situation.index,
                wind_seconds,
                total_seconds - wind_seconds
            );
            info!("{line}");
            log.line(&line);
        };

        // Finalizing: join whatever writers are in flight, also on
        // cancellation, so no artifact is left half-written.
        pipeline.join_all()?;

        if status == RunStatus::Completed && !receptors.is_empty() {
            let statistics = receptors.finalize();
            pipeline.submit_receptors(receptor_artifact(&receptors, Some(statistics)))?;
            pipeline.join_all()?;
        }

        let summary = RunSummary {
            status,
            situations_computed: computed,
            situations_skipped: skipped,
            particles_released: released,
            particles_discarded: discarded,
            deposited_mass: deposited,
            transient_carried_mass: carry_pool.as_ref().map_or(0.0, TransientPool::total_mass),
            seed_version: SEED_VERSION,
        };
        let footer = match status {
            RunStatus::Completed => format!(
                "run completed: {computed} situation(s) computed, {skipped} skipped"
            ),
            RunStatus::Cancelled => format!(
                "run cancelled after {computed} computed situation(s)"
            ),
        };
        info!("{footer}");
        log.line(&footer);
        Ok(summary)
    }
}

/// Zero-physics bookkeeping for a skipped situation: the situation index
/// still advances, an all-zero artifact is written, receptors record a
/// zero sample, and the transient pool is left untouched.
fn dispatch_skipped(
    pipeline: &mut OutputPipeline,
    geometry: &GridGeometry,
    n_groups: usize,
    situation: &WeatherSituation,
    config: &RunConfig,
    receptors: &mut ReceptorSet,
) -> Result<(), OutputError> {
    receptors.append_zero();
    let mut zero = ConcentrationGrid::new(geometry, n_groups);
    zero.reset_for(situation.index);
    zero.normalize(geometry, config.dispersion_time);
    pipeline.submit_concentration(ConcentrationArtifact {
        situation_index: situation.index,
        skipped: true,
        timestamp: situation.timestamp,
        dispersion_time: config.dispersion_time,
        slice_heights: geometry.slice_heights().to_vec(),
        grid: zero,
    })?;
    if !receptors.is_empty() {
        pipeline.submit_receptors(receptor_artifact(receptors, None))?;
    }
    Ok(())
}

fn receptor_artifact(
    receptors: &ReceptorSet,
    statistics: Option<Vec<ReceptorStatistics>>,
) -> ReceptorArtifact {
    let records = receptors
        .receptors()
        .iter()
        .enumerate()
        .map(|(idx, receptor)| ReceptorRecord {
            receptor: receptor.clone(),
            series: receptors.series(idx).to_vec(),
        })
        .collect();
    ReceptorArtifact {
        situation_count: receptors
            .receptors()
            .first()
            .map_or(0, |_| receptors.series(0).len() as u32),
        records,
        statistics,
    }
}

/// Bounded advection pool. `max_threads == 0` still builds an explicit
/// pool (rayon default sizing) so the advection passes never contend with
/// a globally reconfigured pool.
fn build_thread_pool(max_threads: usize) -> Result<ThreadPool, SetupError> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if max_threads > 0 {
        builder = builder.num_threads(max_threads);
    }
    builder
        .build()
        .map_err(|e| SetupError::ThreadPool(e.to_string()))
}
