//! End-to-end LM knowledge-tracing runs against a toy language model

mod common;

use approx::assert_abs_diff_eq;
use common::{run_config, MemorySource, ToyLoader};
use lmkt::config::ModelType;
use lmkt::eval::MetricsVector;
use lmkt::io::{load_model_state, ADAPTER_FILE};
use lmkt::pipeline::kc_results_path;
use lmkt::{test, train, ExecutionContext, RunOutcome};
use std::fs;
use tempfile::TempDir;

fn single(outcome: RunOutcome) -> MetricsVector {
    match outcome {
        RunOutcome::Single(metrics) => metrics,
        other => panic!("expected a single-fold outcome, got {other:?}"),
    }
}

#[test]
fn test_train_saves_adapter_and_exports_kc_probabilities() {
    let dir = TempDir::new().unwrap();
    let source = MemorySource::default();
    let loader = ToyLoader::default();
    let ctx = ExecutionContext::new(&source)
        .with_dirs(dir.path().join("results"), dir.path().join("ckpt"))
        .with_lm_loader(&loader);

    let metrics = single(train(&run_config(ModelType::Lmkt, Some("lm")), &ctx).unwrap());
    assert!(metrics.values()[1..].iter().all(|v| (0.0..=100.0).contains(v)));

    let state = load_model_state(&dir.path().join("ckpt/lm").join(ADAPTER_FILE)).unwrap();
    assert_eq!(state.metadata.architecture, "lmkt");
    assert_eq!(state.parameters[0].name, "lora_bias");

    let export = fs::read_to_string(kc_results_path(&dir.path().join("results"), "toy_lm")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&export).unwrap();
    let dialogues = json.as_object().unwrap();
    assert_eq!(dialogues.len(), 4);
    // The first turn is skipped at evaluation time; the remaining four are all labelled
    let turns = dialogues["20"].as_array().unwrap();
    assert_eq!(turns.len(), 4);
    let second = turns[0].as_object().unwrap();
    assert_eq!(second.keys().collect::<Vec<_>>(), vec!["add", "mul"]);
    for p in second.values() {
        let p = p.as_f64().unwrap();
        assert!(p > 0.0 && p < 1.0);
    }

    // Training then test loads a fresh model without the pretrained adapter
    let requests = loader.requests.borrow();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|(r, alpha, pt)| *r == 16 && *alpha == 16 && pt.is_none()));
}

#[test]
fn test_training_moves_add_above_sub() {
    let dir = TempDir::new().unwrap();
    let source = MemorySource::default();
    let loader = ToyLoader::default();
    let ctx = ExecutionContext::new(&source)
        .with_dirs(dir.path().join("results"), dir.path().join("ckpt"))
        .with_lm_loader(&loader);
    let mut config = run_config(ModelType::Lmkt, Some("lm"));
    config.epochs = 5;
    config.lr = 0.1;
    train(&config, &ctx).unwrap();

    let state = load_model_state(&dir.path().join("ckpt/lm").join(ADAPTER_FILE)).unwrap();
    // Tokens: 0 True, 1 False, then add, sub, mul
    let (add, sub) = (state.data[2], state.data[3]);
    assert!(add > sub, "add bias {add} should exceed sub bias {sub}");
}

#[test]
fn test_packed_and_unpacked_evaluation_agree() {
    let dir = TempDir::new().unwrap();
    let source = MemorySource::default();
    let loader = ToyLoader::default();
    let ctx = ExecutionContext::new(&source).with_dirs(dir.path(), dir.path()).with_lm_loader(&loader);

    // Without a run name the base model is evaluated as loaded
    let mut config = run_config(ModelType::Lmkt, None);
    let unpacked = single(test(&config, &ctx).unwrap());
    config.pack_kcs = true;
    let packed = single(test(&config, &ctx).unwrap());

    for (a, b) in unpacked.values().iter().zip(packed.values()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-5);
    }
    // Every KC starts at 0.5
    let export = fs::read_to_string(kc_results_path(dir.path(), "toy_lmkt")).unwrap();
    assert!(export.contains("0.5"));
}

#[test]
fn test_sweep_over_lora_grid() {
    let dir = TempDir::new().unwrap();
    let source = MemorySource::default();
    let loader = ToyLoader::default();
    let ctx = ExecutionContext::new(&source)
        .with_dirs(dir.path().join("results"), dir.path().join("ckpt"))
        .with_lm_loader(&loader);
    let mut config = run_config(ModelType::Lmkt, None);
    config.epochs = 1;
    config.hyperparam_sweep = true;

    let RunOutcome::Sweep(summary) = train(&config, &ctx).unwrap() else {
        panic!("expected a sweep");
    };
    assert_eq!(summary.entries.len(), 20);
    assert_eq!(summary.entries[0].name, "hpsweep_toy_default_lmkt_lr5e-05_r2");

    // Every candidate loads with alpha equal to its rank
    let requests = loader.requests.borrow();
    assert!(requests.iter().all(|(r, alpha, _)| r == alpha));
    assert!(dir.path().join("results/metrics_hpsweep_toy_default_lmkt.txt").exists());
}
