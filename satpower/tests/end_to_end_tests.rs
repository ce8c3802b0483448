// tests/end_to_end_tests.rs
//
// Smoke run of the whole pipeline: train a small agent, checkpoint it,
// compare it with the baseline on held-out passes, write the reports and
// serve decisions from the saved checkpoint.

use std::path::Path;

use satpower::config::Config;
use satpower::rl::{read_history, Checkpoint};
use satpower::sim_eval::{write_reports, Evaluator, REPORT_JSON, REPORT_MARKDOWN};
use satpower::{
    ActionSource, EvaluationReport, FrozenQNetwork, InferenceRequest, InferenceService, Observation, TelemetrySink,
    Trainer,
};

fn smoke_cfg(dir: &Path) -> Config {
    Config {
        seed: 11,
        output_dir: dir.to_path_buf(),
        ..Config::smoke()
    }
}

#[test]
fn test_train_checkpoint_and_evaluate() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = smoke_cfg(dir.path());

    let mut trainer = Trainer::new(cfg.clone()).unwrap().with_telemetry(TelemetrySink::disabled());
    let summary = trainer.run().unwrap();

    assert_eq!(summary.first_episode, 1);
    assert_eq!(summary.last_episode, 30);
    assert!(!summary.stopped_early);
    assert!(summary.train_steps > 0);
    assert!(summary.replay_size <= cfg.replay_capacity);
    assert_eq!(summary.counters.syncs, 6);
    assert_eq!(summary.counters.evaluations, 3);
    assert_eq!(summary.counters.checkpoints_written, 3);
    assert!(summary.final_epsilon < cfg.epsilon_start);

    let history = read_history(&summary.history_path).unwrap();
    assert_eq!(history.len(), 30);
    assert!(history.windows(2).all(|w| w[1].episode == w[0].episode + 1));
    assert!(history.iter().all(|r| r.steps >= 1 && r.steps <= cfg.episode_length));

    let latest = dir.path().join("checkpoints").join("latest.ckpt");
    assert!(latest.exists());
    assert!(dir.path().join("checkpoints").join("ep_00030.ckpt").exists());
    assert!(dir.path().join("training_summary.json").exists());

    let ckpt = Checkpoint::load(&latest).unwrap();
    assert_eq!(ckpt.header.episodes_completed, 30);
    assert_eq!(ckpt.header.train_steps, summary.train_steps);

    let policy = FrozenQNetwork::from_checkpoint(&ckpt).unwrap();
    let mut evaluator = Evaluator::new(&cfg).unwrap();
    let report = evaluator.compare(&policy, 10).unwrap();

    let p = report.p_value();
    assert!((0.0..=1.0).contains(&p), "p={p}");
    assert_eq!(report.seeds.len(), 10);
    assert_eq!(report.matched_episodes.len(), 10);
    assert_eq!(report.agent.episodes, 10);
    assert_eq!(report.baseline.episodes, 10);
    assert!(report.agent.violation_rate >= 0.0 && report.agent.violation_rate <= 1.0);
    if report.improvement {
        assert!(p < cfg.significance_level);
        assert!(report.agent.mean_power_dbm < report.baseline.mean_power_dbm);
    }

    let (json, md) = write_reports(&report, dir.path()).unwrap();
    assert_eq!(json, dir.path().join(REPORT_JSON));
    assert_eq!(md, dir.path().join(REPORT_MARKDOWN));
    let parsed: EvaluationReport = serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(parsed.seeds, report.seeds);
}

#[test]
fn test_training_is_reproducible_for_fixed_seed() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let cfg_a = Config {
        episodes: 8,
        ..smoke_cfg(a.path())
    };
    let cfg_b = Config {
        output_dir: b.path().to_path_buf(),
        ..cfg_a.clone()
    };

    let sa = Trainer::new(cfg_a).unwrap().with_telemetry(TelemetrySink::disabled()).run().unwrap();
    let sb = Trainer::new(cfg_b).unwrap().with_telemetry(TelemetrySink::disabled()).run().unwrap();
    assert_eq!(sa.train_steps, sb.train_steps);
    assert_eq!(sa.final_epsilon, sb.final_epsilon);

    let ha = read_history(&sa.history_path).unwrap();
    let hb = read_history(&sb.history_path).unwrap();
    assert_eq!(ha, hb);
}

#[tokio::test]
async fn test_serve_from_trained_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config {
        episodes: 4,
        checkpoint_frequency: 2,
        ..smoke_cfg(dir.path())
    };
    Trainer::new(cfg.clone())
        .unwrap()
        .with_telemetry(TelemetrySink::disabled())
        .run()
        .unwrap();

    let latest = dir.path().join("checkpoints").join("latest.ckpt");
    let service = InferenceService::load(&latest, &cfg.inference).unwrap();
    assert!(service.has_model());

    let obs = Observation {
        elevation_deg: 50.0,
        slant_range_km: 700.0,
        rain_rate_mm_h: 1.0,
        rsrp_dbm: -92.0,
        doppler_hz: 0.0,
        tx_power_dbm: 30.0,
    };
    let response = service
        .infer(InferenceRequest::new(obs).with_deadline_ms(1_000))
        .await;
    assert_eq!(response.source, ActionSource::Network);
    assert_eq!(response.delta_db, response.action.delta_db());
    let confidence = response.confidence.unwrap();
    assert!(confidence > 0.0 && confidence <= 1.0);

    // A missing file leaves the loaded model serving.
    assert!(service.reload(&dir.path().join("missing.ckpt")).is_err());
    assert!(service.has_model());
    assert!(service.reload(&latest).is_ok());
    assert_eq!(service.stats().reloads, 1);
    assert_eq!(service.stats().reload_failures, 1);
}

#[test]
fn test_load_rejects_corrupt_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.ckpt");
    std::fs::write(&path, b"not a checkpoint").unwrap();
    assert!(Checkpoint::load(&path).is_err());
    assert!(InferenceService::load(&path, &Config::default().inference).is_err());
}
