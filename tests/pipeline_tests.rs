//! Полный офлайн-пайплайн: CSV → очистка → обучение → артефакт

use std::io::Write;

use stress_ml::models::trainer::TrainerConfig;
use stress_ml::preprocessing::{cleaning::DEFAULT_OUTLIER_THRESHOLD, loader};
use stress_ml::{
    FeatureSet, ForestParams, MissingStrategy, ModelArtifact, ModelTrainer, StressError,
    StressLevel, TrainerState,
};

/// Классы различимы по пульсу и GSR
fn write_dataset(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("stress_data.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "heart_rate,ecg,emg,gsr,resp,stress").unwrap();

    for i in 0..90 {
        let (label, hr, gsr) = match i % 3 {
            0 => ("low", 60.0, 0.1),
            1 => ("medium", 85.0, 0.5),
            _ => ("high", 115.0, 0.9),
        };
        let jitter = (i as f64 * 0.37).sin();
        let ecg = if i == 10 { String::new() } else { format!("{:.3}", 0.5 + 0.1 * jitter) };
        writeln!(
            file,
            "{:.2},{},{:.3},{:.3},{:.3},{}",
            hr + 3.0 * jitter,
            ecg,
            0.3 + 0.05 * jitter,
            gsr + 0.02 * jitter,
            0.4 + 0.05 * jitter,
            label
        )
        .unwrap();
    }
    path
}

fn config(feature_set: FeatureSet, model_path: std::path::PathBuf) -> TrainerConfig {
    TrainerConfig {
        feature_set,
        forest: ForestParams {
            n_trees: 25,
            ..ForestParams::default()
        },
        model_path,
        ..TrainerConfig::default()
    }
}

#[test]
fn csv_to_persisted_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let data = loader::load(write_dataset(dir.path())).unwrap();
    assert_eq!(data.len(), 90);
    assert!(data.features[[10, 1]].is_nan());

    let data = data
        .handle_missing(MissingStrategy::Mean)
        .remove_outliers(DEFAULT_OUTLIER_THRESHOLD);
    assert!(data.features.iter().all(|v| v.is_finite()));

    let model_path = dir.path().join("out").join("stress_model.json");
    let mut trainer = ModelTrainer::new(config(FeatureSet::Augmented, model_path.clone()));
    let report = trainer.train(&data, 0.2, 42).unwrap();

    assert_eq!(report.train_size + report.test_size, data.len());
    assert!(report.metrics.test.accuracy > 0.9, "accuracy {}", report.metrics.test.accuracy);
    let cm_total: usize = report.metrics.confusion_matrix.iter().flatten().sum();
    assert_eq!(cm_total, report.test_size);
    let names: Vec<&str> = report
        .metrics
        .feature_importances
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names[..5], ["heart_rate", "ecg", "emg", "gsr", "resp"]);
    assert_eq!(names[5..], ["hr_ecg_ratio", "emg_gsr_product", "resp_hr_ratio"]);

    trainer.save().unwrap();
    assert_eq!(trainer.state(), TrainerState::Persisted);

    let artifact = ModelArtifact::load(&model_path).unwrap();
    assert_eq!(artifact.feature_set, FeatureSet::Augmented);
    assert_eq!(artifact.metrics.as_ref(), Some(&report.metrics));
}

#[test]
fn raw_feature_set_without_scaling() {
    let dir = tempfile::tempdir().unwrap();
    let data = loader::load(write_dataset(dir.path()))
        .unwrap()
        .handle_missing(MissingStrategy::Median);

    let mut trainer = ModelTrainer::new(TrainerConfig {
        scale: false,
        ..config(FeatureSet::Raw, dir.path().join("raw.json"))
    });
    let report = trainer.train(&data, 0.25, 1).unwrap();

    let artifact = trainer.artifact().unwrap();
    assert!(artifact.scaler.is_none());
    assert_eq!(artifact.forest.n_features(), 5);
    assert_eq!(report.metrics.feature_importances.len(), 5);
}

#[test]
fn retraining_discards_previous_model() {
    let data = loader::synthetic(90, 3);
    let mut trainer = ModelTrainer::new(config(FeatureSet::Raw, "unused.json".into()));

    trainer.train(&data, 0.2, 1).unwrap();
    let first = trainer.artifact().unwrap().forest.clone();
    trainer.train(&data, 0.2, 2).unwrap();

    assert_ne!(&first, &trainer.artifact().unwrap().forest);
    assert_eq!(trainer.state(), TrainerState::Evaluated);
}

#[test]
fn failed_training_leaves_trainer_uninitialized() {
    let data = stress_ml::Dataset::new(
        ndarray::Array2::zeros((4, 5)),
        vec![StressLevel::Low, StressLevel::Low, StressLevel::Low, StressLevel::High],
    )
    .unwrap();
    let mut trainer = ModelTrainer::new(config(FeatureSet::Raw, "unused.json".into()));

    let err = trainer.train(&data, 0.2, 0).unwrap_err();
    assert!(matches!(err, StressError::InsufficientData(_)));
    assert_eq!(trainer.state(), TrainerState::Uninitialized);
    assert!(trainer.artifact().is_none());
}

#[test]
fn missing_dataset_surfaces_data_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = loader::load(dir.path().join("nope.csv")).unwrap_err();
    assert!(matches!(err, StressError::DataNotFound { .. }));
}
