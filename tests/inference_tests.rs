//! Контракт инференса: валидация, вероятности, запасная модель, round-trip артефакта

use serde_json::{json, Value};

use stress_ml::models::trainer::TrainerConfig;
use stress_ml::preprocessing::loader;
use stress_ml::{
    DataNormalizer, FeatureEngineer, ForestParams, ModelOrigin, ModelSource, ModelTrainer,
    StressLevel, StressPredictor,
};

fn sample() -> Value {
    json!({"heart_rate": 75, "ecg": 0.5, "emg": 0.3, "gsr": 0.2, "resp": 0.4})
}

fn mock_predictor() -> StressPredictor {
    StressPredictor::from_source(&ModelSource::Synthetic(42)).unwrap()
}

fn trained_predictor(dir: &std::path::Path) -> (StressPredictor, std::path::PathBuf) {
    let path = dir.join("models").join("stress_model.json");
    let mut trainer = ModelTrainer::new(TrainerConfig {
        forest: ForestParams {
            n_trees: 20,
            ..ForestParams::default()
        },
        model_path: path.clone(),
        ..TrainerConfig::default()
    });
    trainer.train(&loader::synthetic(120, 9), 0.2, 9).unwrap();
    trainer.save().unwrap();

    let predictor = StressPredictor::load_or_fallback(&path, 0).unwrap();
    (predictor, path)
}

#[test]
fn reference_sample_yields_a_valid_prediction() {
    let result = mock_predictor().predict(&sample());

    assert!(result.error.is_none());
    let level = result.stress_level.unwrap();
    assert!(StressLevel::ALL.contains(&level));
    assert!((0.0..=1.0).contains(&result.confidence));

    let body = serde_json::to_value(&result).unwrap();
    let keys: Vec<&String> = body["probabilities"].as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 3);
    for k in ["low", "medium", "high"] {
        assert!(body["probabilities"].get(k).is_some());
    }
    assert_eq!(
        body["features_used"],
        json!(["heart_rate", "ecg", "emg", "gsr", "resp"])
    );
}

#[test]
fn probabilities_sum_to_one_and_confidence_is_their_max() {
    let predictor = mock_predictor();
    let inputs = [
        sample(),
        json!({"heart_rate": 0, "ecg": 0, "emg": 0, "gsr": 0, "resp": 0}),
        json!({"heart_rate": 99.9, "ecg": 55, "emg": 12.5, "gsr": 80, "resp": 3}),
        json!({"heart_rate": 180, "ecg": 1000, "emg": 0.01, "gsr": 40, "resp": 99}),
    ];

    for input in &inputs {
        let result = predictor.predict(input);
        let probs = result.probabilities.unwrap();
        assert!((probs.sum() - 1.0).abs() < 1e-6, "sum was {}", probs.sum());
        assert_eq!(result.confidence, probs.max());
        assert_eq!(probs.get(result.stress_level.unwrap()), probs.max());
    }
}

#[test]
fn missing_features_return_error_without_prediction() {
    let predictor = mock_predictor();
    for input in [
        json!({}),
        json!({"heart_rate": 75, "ecg": 0.5}),
        json!({"ecg": 0.5, "emg": 0.3, "gsr": 0.2, "resp": 0.4}),
    ] {
        let result = predictor.predict(&input);
        assert!(result.error.as_deref().unwrap().starts_with("Missing features"));
        assert_eq!(result.stress_level, None);
        assert_eq!(result.confidence, 0.0);
    }
}

#[test]
fn invalid_values_name_the_offending_feature() {
    let predictor = mock_predictor();
    let cases = [
        ("heart_rate", json!(-1)),
        ("ecg", json!("abc")),
        ("emg", json!(null)),
        ("gsr", json!([1])),
        ("resp", json!(-0.5)),
    ];

    for (name, bad) in cases {
        let mut input = sample();
        input[name] = bad;
        let result = predictor.predict(&input);
        let error = result.error.expect("validation error");
        assert!(error.contains(name), "'{}' not in '{}'", name, error);
        assert_eq!(result.stress_level, None);
    }
}

#[test]
fn batch_preserves_order_and_isolates_failures() {
    let predictor = mock_predictor();
    let inputs = vec![
        sample(),
        json!({"heart_rate": 75}),
        json!({"heart_rate": 85, "ecg": 0.6, "emg": 0.4, "gsr": 0.3, "resp": 0.5}),
    ];

    let results = predictor.batch_predict(&inputs);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], predictor.predict(&inputs[0]));
    assert!(results[1].is_error());
    assert_eq!(results[2], predictor.predict(&inputs[2]));
}

#[test]
fn two_valid_inputs_give_two_results() {
    let predictor = mock_predictor();
    let inputs = vec![
        sample(),
        json!({"heart_rate": 85, "ecg": 0.6, "emg": 0.4, "gsr": 0.3, "resp": 0.5}),
    ];
    let results = predictor.batch_predict(&inputs);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.stress_level.is_some()));
}

#[test]
fn batch_has_no_internal_size_limit() {
    let predictor = mock_predictor();
    let inputs = vec![sample(); 250];
    assert_eq!(predictor.batch_predict(&inputs).len(), 250);
}

#[test]
fn absent_artifact_falls_back_to_synthetic_model() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = StressPredictor::load_or_fallback(dir.path().join("missing.json"), 42).unwrap();

    assert_eq!(predictor.origin(), &ModelOrigin::Synthetic { seed: 42 });
    assert!(predictor.predict(&sample()).stress_level.is_some());
}

#[test]
fn corrupt_artifact_falls_back_to_synthetic_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, b"{ not a model").unwrap();

    let predictor = StressPredictor::load_or_fallback(&path, 5).unwrap();
    assert_eq!(predictor.origin(), &ModelOrigin::Synthetic { seed: 5 });
}

#[test]
fn persisted_model_round_trips_with_identical_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let (loaded, path) = trained_predictor(dir.path());
    assert_eq!(loaded.origin(), &ModelOrigin::Persisted { path: path.clone() });

    let reloaded = StressPredictor::load_or_fallback(&path, 0).unwrap();
    for input in [
        sample(),
        json!({"heart_rate": 10, "ecg": 90, "emg": 50, "gsr": 5, "resp": 70}),
    ] {
        assert_eq!(loaded.predict(&input), reloaded.predict(&input));
    }
}

#[test]
fn trained_augmented_model_serves_raw_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let (predictor, _) = trained_predictor(dir.path());

    assert_eq!(predictor.artifact().feature_names.len(), 8);
    assert!(predictor.artifact().scaler.is_some());
    let result = predictor.predict(&sample());
    assert!(result.error.is_none());
    assert_eq!(result.features_used.unwrap().len(), 5);
}

#[test]
fn inference_reuses_the_scaler_fitted_on_the_training_split() {
    let dir = tempfile::tempdir().unwrap();
    let (predictor, _) = trained_predictor(dir.path());
    let artifact = predictor.artifact();
    let scaler = artifact.scaler.as_ref().unwrap();

    let input = json!({"heart_rate": 62, "ecg": 30, "emg": 71, "gsr": 12, "resp": 48});
    let raw = ndarray::arr2(&[[62.0, 30.0, 71.0, 12.0, 48.0]]);
    let augmented = FeatureEngineer::augment(&raw).unwrap();
    let expected = artifact
        .forest
        .predict_proba(&scaler.transform(&augmented).unwrap())
        .unwrap();

    let probs = predictor.predict(&input).probabilities.unwrap();
    for (&level, &p) in StressLevel::ALL.iter().zip(expected.row(0)) {
        assert!((probs.get(level) - p).abs() < 1e-4 + 1e-9, "{}: {} vs {}", level, probs.get(level), p);
    }

    // параметры по всей выборке не совпадают с подобранными на обучающей части
    let full = FeatureEngineer::augment(&loader::synthetic(120, 9).features).unwrap();
    let mut normalizer = DataNormalizer::new();
    normalizer.fit(&full).unwrap();
    let refitted = normalizer.into_params().unwrap();
    assert_ne!(&refitted, scaler);
    assert_ne!(
        refitted.transform(&augmented).unwrap(),
        scaler.transform(&augmented).unwrap()
    );
}

#[test]
fn predictor_is_shareable_across_threads() {
    let predictor = std::sync::Arc::new(mock_predictor());
    let expected = predictor.predict(&sample());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let predictor = predictor.clone();
            std::thread::spawn(move || predictor.predict(&sample()))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
