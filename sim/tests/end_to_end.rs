use approx::assert_abs_diff_eq;
use fusion_core::{snapshot::SnapshotPublisher, FusionConfig};
use sensor_models::SensorSetup;
use sim::{evaluate, load_replay, save_replay, simulate, Scenario, ScenarioKind};

#[test]
fn same_seed_gives_the_same_log() {
    let setup = SensorSetup::default();
    let a = simulate(&Scenario::build(ScenarioKind::Walking, 11), &setup).unwrap();
    let b = simulate(&Scenario::build(ScenarioKind::Walking, 11), &setup).unwrap();
    assert_eq!(a, b);

    let c = simulate(&Scenario::build(ScenarioKind::Walking, 12), &setup).unwrap();
    assert_ne!(a.frames, c.frames);
}

#[test]
fn replay_survives_a_file_round_trip() {
    let setup = SensorSetup::default();
    let log = simulate(&Scenario::build(ScenarioKind::Static, 3), &setup).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("static.json");
    save_replay(&log, &path).unwrap();
    let loaded = load_replay(&path).unwrap();

    assert_eq!(loaded.scenario_name, "static");
    assert_eq!(loaded.seed, 3);
    assert_eq!(loaded.frames.len(), log.frames.len());
    for (a, b) in log.frames.iter().zip(&loaded.frames) {
        assert_abs_diff_eq!(a.time, b.time, epsilon = 1e-12);
        assert_eq!(a.payloads.len(), b.payloads.len());
        assert_eq!(a.ground_truth.len(), b.ground_truth.len());
    }

    // Replaying the loaded log scores the same as the in-memory one
    let config = FusionConfig::default();
    let direct = evaluate(&log, &config, &setup, |_| {}).unwrap();
    let replayed = evaluate(&loaded, &config, &setup, |_| {}).unwrap();
    assert_eq!(direct.metrics.true_positives, replayed.metrics.true_positives);
    assert_eq!(direct.metrics.highest_hits, replayed.metrics.highest_hits);
}

#[test]
fn standing_person_is_the_highest_point() {
    let setup = SensorSetup::default();
    let log = simulate(&Scenario::build(ScenarioKind::Static, 42), &setup).unwrap();
    let summary = evaluate(&log, &FusionConfig::default(), &setup, |_| {}).unwrap();

    let n = summary.ticks as f64;
    assert_eq!(summary.ticks, 100);
    assert!(
        summary.metrics.highest_hits as f64 >= 0.8 * n,
        "highest hits {} of {n}",
        summary.metrics.highest_hits
    );
    assert!(summary.metrics.recall() >= 0.6, "recall {}", summary.metrics.recall());
    assert!(summary.metrics.rmse_position() < 0.75);
    // Every enabled detector reports every tick
    assert_eq!(summary.faults.missing_batches, 0);
    assert_eq!(summary.faults.stale_batches, 0);
}

#[test]
fn candidates_follow_the_person_while_the_robot_drives() {
    let setup = SensorSetup::default();
    let log = simulate(&Scenario::build(ScenarioKind::Approach, 5), &setup).unwrap();

    // The robot closes in, so the person's base-frame range shrinks
    let first = log.frames.first().unwrap().ground_truth[0].position;
    let parked = log.frames[90].ground_truth[0].position;
    assert!(parked.x < first.x - 2.0);

    let summary = evaluate(&log, &FusionConfig::default(), &setup, |_| {}).unwrap();
    assert!(
        summary.metrics.highest_hits as f64 >= 0.6 * summary.ticks as f64,
        "highest hits {} of {}",
        summary.metrics.highest_hits,
        summary.ticks
    );
}

#[test]
fn snapshots_carry_metadata_once() {
    let setup = SensorSetup::default();
    let log = simulate(&Scenario::build(ScenarioKind::Static, 1), &setup).unwrap();
    let mut publisher = SnapshotPublisher::new();
    let mut with_info = 0;
    let mut cycles = 0;
    evaluate(&log, &FusionConfig::default(), &setup, |output| {
        let msgs = publisher.publish(output);
        cycles += 1;
        with_info += msgs.grids.iter().filter(|(_, g)| g.info.is_some()).count();
    })
    .unwrap();
    assert_eq!(cycles, 100);
    // Leg, torso, sound and the fused grid
    assert_eq!(with_info, 4);
}
