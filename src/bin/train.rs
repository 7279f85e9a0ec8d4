/// Обучение модели оценки стресса: загрузка → очистка → обучение → сохранение

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stress_ml::models::trainer::{DEFAULT_SEED, DEFAULT_TEST_FRACTION};
use stress_ml::preprocessing::{cleaning::DEFAULT_OUTLIER_THRESHOLD, loader};
use stress_ml::{FeatureSet, MissingStrategy, ModelTrainer, StressError, TrainerConfig};

/// Количество синтетических примеров, если данных нет
const SYNTHETIC_TRAINING_SAMPLES: usize = 200;

#[derive(Debug, Parser)]
#[command(name = "stress-train", version, about = "Train the stress level classifier")]
struct Args {
    /// CSV с признаками; последний столбец - метка
    #[arg(long, default_value = "data/stress_data.csv")]
    data: PathBuf,

    /// Куда сохранить артефакт модели
    #[arg(long, default_value = stress_ml::models::artifact::DEFAULT_MODEL_PATH)]
    output: PathBuf,

    #[arg(long, default_value_t = DEFAULT_TEST_FRACTION)]
    test_fraction: f64,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// mean | median | drop
    #[arg(long, default_value = "mean")]
    missing: MissingStrategy,

    #[arg(long, default_value_t = DEFAULT_OUTLIER_THRESHOLD)]
    outlier_threshold: f64,

    /// Обучать на пяти исходных признаках без производных
    #[arg(long)]
    raw_features: bool,

    /// Не масштабировать признаки
    #[arg(long)]
    no_scaling: bool,

    /// Синтетические данные, если файл не найден
    #[arg(long)]
    synthetic_fallback: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    tracing::info!("STRESS DETECTION MODEL TRAINING");

    let data = match loader::load(&args.data) {
        Ok(data) => data,
        Err(StressError::DataNotFound { path }) if args.synthetic_fallback => {
            tracing::warn!(
                "Training data not found at {}. Creating synthetic data for demonstration.",
                path.display()
            );
            loader::synthetic(SYNTHETIC_TRAINING_SAMPLES, args.seed)
        }
        Err(e) => return Err(e).context("failed to load training data"),
    };

    let data = data
        .handle_missing(args.missing)
        .remove_outliers(args.outlier_threshold);

    let config = TrainerConfig {
        feature_set: if args.raw_features {
            FeatureSet::Raw
        } else {
            FeatureSet::Augmented
        },
        scale: !args.no_scaling,
        model_path: args.output.clone(),
        ..TrainerConfig::default()
    };

    let mut trainer = ModelTrainer::new(config);
    let report = trainer
        .train(&data, args.test_fraction, args.seed)
        .context("training failed")?;

    // Ошибка сохранения не прерывает запуск: метрики уже посчитаны
    if let Err(e) = trainer.save() {
        tracing::warn!("Model was trained but not saved: {}", e);
    }

    tracing::info!("TRAINING COMPLETED SUCCESSFULLY");
    tracing::info!("Train size: {}, test size: {}", report.train_size, report.test_size);
    if let Some(metrics) = trainer.metrics() {
        tracing::info!("Test Accuracy: {:.4}", metrics.test.accuracy);
        tracing::info!("Test F1 Score: {:.4}", metrics.test.f1);
        for feature in &metrics.feature_importances {
            tracing::info!("Feature importance: {} = {:.4}", feature.name, feature.importance);
        }
    }

    Ok(())
}
