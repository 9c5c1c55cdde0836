//! Control-loop guarantees: cooperative cancellation stops the run at the
//! next checkpoint with a distinct status and a complete, in-order
//! artifact trail for the situations finished before the signal.

use plume_sim_core::{
    CancelHandle, Degrees, Domain, EmissionSource, Fetch, FrequencyEntry, GridGeometry,
    MetersPerSecond, RunConfig, RunContext, RunError, RunStatus, Simulation, SituationSource,
    SourceGeometry, StabilityClass, StationaryTable,
};
use plume_sim_core::meteo::MeteoError;

fn geometry() -> GridGeometry {
    GridGeometry::new(12, 12, 6, 10.0, 10.0, 3.0, 1.1, 0.0, 0.0, vec![1.5]).unwrap()
}

fn ten_situation_table() -> StationaryTable {
    let entries = (0..10)
        .map(|sector| FrequencyEntry {
            wind_speed: MetersPerSecond::new(3.0),
            wind_direction: Degrees::new(sector as f32 * 36.0),
            stability: StabilityClass::from_class(4).unwrap(),
            frequency: 1.0,
        })
        .collect();
    StationaryTable::new(entries).unwrap()
}

fn source() -> EmissionSource {
    EmissionSource {
        name: "stack".into(),
        geometry: SourceGeometry::Point {
            x: 60.0,
            y: 60.0,
            height: 4.0,
        },
        strength: 1.0,
        source_group: 0,
        deposition_velocity: 0.0,
    }
}

fn config(out_dir: &std::path::Path) -> RunConfig {
    RunConfig {
        dispersion_time: 200.0,
        particle_rate: 0.5,
        max_particles: 100,
        output_directory: out_dir.to_path_buf(),
        ..RunConfig::default()
    }
}

/// Wraps a source and raises the cancellation signal while fetching the
/// N-th situation, the shape of an external stop request arriving between
/// situations.
struct CancellingSource {
    inner: StationaryTable,
    cancel: CancelHandle,
    fetches: u32,
    cancel_on_fetch: u32,
}

impl SituationSource for CancellingSource {
    fn next_situation(&mut self) -> Result<Fetch, MeteoError> {
        self.fetches += 1;
        if self.fetches == self.cancel_on_fetch {
            self.cancel.cancel();
        }
        self.inner.next_situation()
    }
}

#[test]
fn cancellation_after_three_of_ten_leaves_three_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, cancel) = RunContext::new();

    let sim = Simulation::new(
        Domain::flat(geometry(), 0.1).unwrap(),
        vec![source()],
        Box::new(CancellingSource {
            inner: ten_situation_table(),
            cancel,
            fetches: 0,
            cancel_on_fetch: 4,
        }),
        Vec::new(),
        config(dir.path()),
    );

    let summary = sim.run(&ctx).unwrap();
    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.situations_computed, 3);

    // Exactly three complete artifact sets; nothing for situations 4-10.
    for situation in 1..=3_u32 {
        assert!(dir
            .path()
            .join(format!("{situation:05}_concentration.json"))
            .exists());
    }
    for situation in 4..=10_u32 {
        assert!(
            !dir.path()
                .join(format!("{situation:05}_concentration.json"))
                .exists(),
            "situation {situation} has an artifact after cancellation"
        );
    }
}

#[test]
fn cancellation_before_start_computes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, cancel) = RunContext::new();
    cancel.cancel();

    let sim = Simulation::new(
        Domain::flat(geometry(), 0.1).unwrap(),
        vec![source()],
        Box::new(ten_situation_table()),
        Vec::new(),
        config(dir.path()),
    );
    let summary = sim.run(&ctx).unwrap();
    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.situations_computed, 0);
}

#[test]
fn full_run_emits_ordered_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _cancel) = RunContext::new();

    let sim = Simulation::new(
        Domain::flat(geometry(), 0.1).unwrap(),
        vec![source()],
        Box::new(ten_situation_table()),
        Vec::new(),
        config(dir.path()),
    );
    let summary = sim.run(&ctx).unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.situations_computed, 10);

    // The on-disk artifact sequence is dense and ordered by situation
    // index; the backpressure join between submissions guarantees no
    // artifact is lost or reordered.
    for situation in 1..=10_u32 {
        assert!(dir
            .path()
            .join(format!("{situation:05}_concentration.json"))
            .exists());
    }
}

#[test]
fn missing_sources_fail_setup() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _cancel) = RunContext::new();
    let sim = Simulation::new(
        Domain::flat(geometry(), 0.1).unwrap(),
        Vec::new(),
        Box::new(ten_situation_table()),
        Vec::new(),
        config(dir.path()),
    );
    match sim.run(&ctx) {
        Err(RunError::Setup(_)) => {}
        other => panic!("expected setup error, got {other:?}"),
    }
}
