//! Сохранённая модель и источник модели для сервиса

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StressError};
use crate::models::evaluation::Metrics;
use crate::models::forest::{ForestParams, RandomForest};
use crate::preprocessing::{loader, FeatureEngineer, ScalingParameters};
use crate::types::{FeatureSet, StressLevel};

/// Версия формата артефакта; несовпадение при загрузке - ошибка
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Путь артефакта по умолчанию
pub const DEFAULT_MODEL_PATH: &str = "models/stress_model.json";

/// Размер синтетической выборки для запасной модели
pub const SYNTHETIC_SAMPLES: usize = 100;

/// Обученная модель вместе со всем, что нужно для повторения предобработки
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub feature_set: FeatureSet,
    pub feature_names: Vec<String>,
    pub scaler: Option<ScalingParameters>,
    pub forest: RandomForest,
    pub trained_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: Option<Metrics>,
}

impl ModelArtifact {
    pub fn new(feature_set: FeatureSet, scaler: Option<ScalingParameters>, forest: RandomForest) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_set,
            feature_names: feature_set.feature_names(),
            scaler,
            forest,
            trained_at: Utc::now(),
            metrics: None,
        }
    }

    /// Согласованность ширины признаков между набором, скейлером и лесом
    pub fn check(&self) -> Result<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(StressError::ArtifactLoad(format!(
                "unsupported format version {} (expected {})",
                self.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }

        let width = self.feature_set.width();
        if self.forest.n_features() != width || self.feature_names.len() != width {
            return Err(StressError::ArtifactLoad(format!(
                "feature set '{:?}' has {} columns but model expects {}",
                self.feature_set,
                width,
                self.forest.n_features()
            )));
        }
        if let Some(scaler) = &self.scaler {
            if scaler.n_features() != width || scaler.std.len() != width {
                return Err(StressError::ArtifactLoad(format!(
                    "scaler has {} columns, feature set has {}",
                    scaler.n_features(),
                    width
                )));
            }
        }
        if self.forest.n_classes() != StressLevel::COUNT {
            return Err(StressError::ArtifactLoad(format!(
                "model has {} classes, expected {}",
                self.forest.n_classes(),
                StressLevel::COUNT
            )));
        }
        Ok(())
    }

    /// Базовые 5 столбцов → столбцы модели (аугментация и масштабирование по артефакту)
    pub fn prepare(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x = match self.feature_set {
            FeatureSet::Raw => x.clone(),
            FeatureSet::Augmented => FeatureEngineer::augment(x)?,
        };
        match &self.scaler {
            Some(scaler) => scaler.transform(&x),
            None => Ok(x),
        }
    }

    /// JSON не хранит NaN и бесконечности: такой артефакт не загрузится обратно
    pub fn is_finite(&self) -> bool {
        self.scaler.as_ref().map_or(true, ScalingParameters::is_finite) && self.forest.is_finite()
    }

    /// Записывает артефакт в JSON, создавая каталог назначения
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let persist_err = |source: std::io::Error| StressError::Persist {
            path: path.to_path_buf(),
            source,
        };

        if !self.is_finite() {
            return Err(persist_err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "model contains NaN or infinite values",
            )));
        }

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(persist_err)?;
        }

        let file = File::create(path).map_err(persist_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|e| persist_err(e.into()))?;
        writer.flush().map_err(persist_err)?;

        tracing::info!("Model saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| StressError::ArtifactLoad(format!("{}: {}", path.display(), e)))?;
        let artifact: ModelArtifact = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| StressError::ArtifactLoad(format!("{}: {}", path.display(), e)))?;
        artifact.check()?;
        Ok(artifact)
    }

    /// Запасная модель: лес без балансировки классов на случайных данных
    pub fn synthetic(seed: u64) -> Result<Self> {
        let data = loader::synthetic(SYNTHETIC_SAMPLES, seed);
        let params = ForestParams::default().with_seed(seed).without_class_balancing();
        let forest = RandomForest::fit(&data.features, &data.label_codes(), StressLevel::COUNT, &params)?;
        Ok(Self::new(FeatureSet::Raw, None, forest))
    }
}

/// Откуда взять модель при старте сервиса
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Persisted(PathBuf),
    Synthetic(u64),
}

/// Откуда фактически взялась загруженная модель
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelOrigin {
    Persisted { path: PathBuf },
    Synthetic { seed: u64 },
}

impl ModelSource {
    pub fn resolve(&self) -> Result<(ModelArtifact, ModelOrigin)> {
        match self {
            ModelSource::Persisted(path) => {
                if !path.exists() {
                    return Err(StressError::ArtifactLoad(format!(
                        "model not found at {}",
                        path.display()
                    )));
                }
                let artifact = ModelArtifact::load(path)?;
                tracing::info!("Model loaded successfully from {}", path.display());
                Ok((artifact, ModelOrigin::Persisted { path: path.clone() }))
            }
            ModelSource::Synthetic(seed) => {
                let artifact = ModelArtifact::synthetic(*seed)?;
                tracing::info!("Mock model trained on {} synthetic samples", SYNTHETIC_SAMPLES);
                Ok((artifact, ModelOrigin::Synthetic { seed: *seed }))
            }
        }
    }
}
