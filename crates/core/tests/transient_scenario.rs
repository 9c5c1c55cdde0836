//! Transient-mode behaviour: carried-over mass survives a skipped
//! situation, skipped situations still advance the sequence and emit a
//! zero artifact, and receptor series stay aligned.

use plume_sim_core::{
    ConcentrationArtifact, Degrees, Domain, EmissionSource, GridGeometry, MatchPolicy,
    MetersPerSecond, MillimetersPerHour, Receptor, ReferenceEntry, RunConfig, RunContext,
    RunStatus, SeriesEntry, Simulation, SourceGeometry, StabilityClass, TransientSeries,
};
use plume_sim_core::meteo::SeriesTimestamp;

fn geometry() -> GridGeometry {
    GridGeometry::new(16, 16, 8, 10.0, 10.0, 3.0, 1.1, 0.0, 0.0, vec![1.5]).unwrap()
}

fn entry(hour: u8, speed: f32, direction: f32) -> SeriesEntry {
    SeriesEntry {
        timestamp: SeriesTimestamp {
            day: 12,
            month: 3,
            hour,
        },
        wind_speed: MetersPerSecond::new(speed),
        wind_direction: Degrees::new(direction),
        stability: StabilityClass::from_class(4).unwrap(),
        precipitation: MillimetersPerHour::new(0.0),
    }
}

fn scenario(out_dir: &std::path::Path) -> Simulation {
    let domain = Domain::flat(geometry(), 0.1).unwrap();
    let source = EmissionSource {
        name: "stack".into(),
        geometry: SourceGeometry::Point {
            x: 80.0,
            y: 80.0,
            height: 4.0,
        },
        strength: 5.0,
        source_group: 0,
        deposition_velocity: 0.0,
    };
    // Situation 1 matches the reference table, situation 2 does not.
    let series = TransientSeries::new(
        vec![entry(1, 3.0, 136.0), entry(2, 9.0, 11.0)],
        vec![ReferenceEntry {
            wind_speed: MetersPerSecond::new(3.0),
            wind_direction: Degrees::new(136.0),
            stability: StabilityClass::from_class(4).unwrap(),
        }],
        MatchPolicy::Exact,
        None,
    )
    .unwrap();
    let receptors = vec![Receptor {
        id: 7,
        name: "kerbside".into(),
        x: 60.0,
        y: 60.0,
        z: 1.5,
    }];
    let config = RunConfig {
        dispersion_time: 400.0,
        particle_rate: 1.0,
        max_particles: 400,
        transient_threshold: 0.0,
        output_directory: out_dir.to_path_buf(),
        ..RunConfig::default()
    };
    Simulation::new(domain, vec![source], Box::new(series), receptors, config)
}

#[test]
fn skipped_situation_preserves_carryover_and_emits_zero_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _cancel) = RunContext::new();
    let summary = scenario(dir.path()).run(&ctx).unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.situations_computed, 1);
    assert_eq!(summary.situations_skipped, 1);

    // Situation 1's carried-over mass is still in the pool after the
    // skipped situation 2: a skip advances the clock, not the physics.
    assert!(
        summary.transient_carried_mass > 0.0,
        "carry-over pool was drained by a skipped situation"
    );

    // Situation 2's artifact exists, is flagged skipped and carries zero
    // new mass.
    let text =
        std::fs::read_to_string(dir.path().join("00002_concentration.json")).unwrap();
    let second: ConcentrationArtifact = serde_json::from_str(&text).unwrap();
    assert!(second.skipped);
    assert_eq!(second.situation_index, 2);
    assert_eq!(second.grid.total_concentration(), 0.0);

    // Situation 1's artifact carries mass.
    let text =
        std::fs::read_to_string(dir.path().join("00001_concentration.json")).unwrap();
    let first: ConcentrationArtifact = serde_json::from_str(&text).unwrap();
    assert!(!first.skipped);
    assert!(first.grid.total_concentration() > 0.0);

    // Receptor series covers both situations; the skipped one is zero.
    let receptor_text = std::fs::read_to_string(dir.path().join("receptors.json")).unwrap();
    let receptors: plume_sim_core::ReceptorArtifact =
        serde_json::from_str(&receptor_text).unwrap();
    assert_eq!(receptors.records[0].series.len(), 2);
    assert_eq!(receptors.records[0].series[1], 0.0);
}

#[test]
fn carried_mass_redisperses_in_following_situation() {
    // Two matching situations: situation 2 must start from a non-empty
    // pool and re-release it through the transient pass.
    let dir = tempfile::tempdir().unwrap();
    let domain = Domain::flat(geometry(), 0.1).unwrap();
    let source = EmissionSource {
        name: "stack".into(),
        geometry: SourceGeometry::Point {
            x: 80.0,
            y: 80.0,
            height: 4.0,
        },
        strength: 5.0,
        source_group: 0,
        deposition_velocity: 0.0,
    };
    let reference = vec![ReferenceEntry {
        wind_speed: MetersPerSecond::new(3.0),
        wind_direction: Degrees::new(136.0),
        stability: StabilityClass::from_class(4).unwrap(),
    }];
    let series = TransientSeries::new(
        vec![entry(1, 3.0, 136.0), entry(2, 3.0, 136.0)],
        reference,
        MatchPolicy::Exact,
        None,
    )
    .unwrap();
    let config = RunConfig {
        dispersion_time: 400.0,
        particle_rate: 0.5,
        max_particles: 200,
        transient_threshold: 0.0,
        output_directory: dir.path().to_path_buf(),
        ..RunConfig::default()
    };
    let sim = Simulation::new(domain, vec![source], Box::new(series), Vec::new(), config);

    let (ctx, _cancel) = RunContext::new();
    let summary = sim.run(&ctx).unwrap();
    assert_eq!(summary.situations_computed, 2);

    // Situation 2 released the fresh budget plus carrier particles from
    // the pool, so more than twice the single-situation release count.
    assert!(
        summary.particles_released > 400,
        "expected carrier particles on top of fresh releases, got {}",
        summary.particles_released
    );
}
