//! Обучение классификатора уровня стресса

use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StressError};
use crate::models::artifact::{ModelArtifact, DEFAULT_MODEL_PATH};
use crate::models::evaluation::{self, Metrics};
use crate::models::forest::{ForestParams, RandomForest};
use crate::preprocessing::{DataNormalizer, FeatureEngineer};
use crate::types::{select_rows, Dataset, FeatureSet, StressLevel};

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub feature_set: FeatureSet,
    /// Масштабировать признаки (параметры подбираются на обучающей части)
    pub scale: bool,
    pub forest: ForestParams,
    pub model_path: PathBuf,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            feature_set: FeatureSet::Augmented,
            scale: true,
            forest: ForestParams::default(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Uninitialized,
    Trained,
    Evaluated,
    Persisted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub train_size: usize,
    pub test_size: usize,
    pub metrics: Metrics,
}

/// Индексы обучающей и тестовой частей
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StratifiedSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Стратифицированное разбиение: каждый класс попадает в обе части
/// пропорционально своему размеру.
pub fn stratified_split(labels: &[StressLevel], test_fraction: f64, seed: u64) -> Result<StratifiedSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(StressError::InvalidParameter(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); StressLevel::COUNT];
    for (i, label) in labels.iter().enumerate() {
        by_class[label.index()].push(i);
    }

    let present: Vec<&Vec<usize>> = by_class.iter().filter(|c| !c.is_empty()).collect();
    if present.len() < 2 {
        return Err(StressError::InsufficientData(format!(
            "need at least 2 classes to stratify, found {}",
            present.len()
        )));
    }
    for (level, members) in StressLevel::ALL.iter().zip(&by_class) {
        if members.len() == 1 {
            return Err(StressError::InsufficientData(format!(
                "class '{}' has only 1 member, at least 2 are required to stratify",
                level
            )));
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = StratifiedSplit {
        train: Vec::new(),
        test: Vec::new(),
    };

    for members in by_class.iter_mut().filter(|c| !c.is_empty()) {
        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64 * test_fraction).round() as usize).clamp(1, members.len() - 1);
        split.test.extend_from_slice(&members[..n_test]);
        split.train.extend_from_slice(&members[n_test..]);
    }

    split.train.shuffle(&mut rng);
    split.test.shuffle(&mut rng);
    Ok(split)
}

pub struct ModelTrainer {
    config: TrainerConfig,
    state: TrainerState,
    artifact: Option<ModelArtifact>,
    metrics: Option<Metrics>,
}

impl ModelTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            config,
            state: TrainerState::Uninitialized,
            artifact: None,
            metrics: None,
        }
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn artifact(&self) -> Option<&ModelArtifact> {
        self.artifact.as_ref()
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    /// Разбивает данные, обучает лес и оценивает его.
    ///
    /// `data.features` - пять базовых столбцов; аугментация и масштабирование
    /// выполняются здесь, по конфигурации, теми же функциями, что и при инференсе.
    pub fn train(&mut self, data: &Dataset, test_fraction: f64, seed: u64) -> Result<TrainingReport> {
        self.state = TrainerState::Uninitialized;
        self.artifact = None;
        self.metrics = None;

        let non_finite = data.features.iter().filter(|v| !v.is_finite()).count();
        if non_finite > 0 {
            return Err(StressError::InvalidParameter(format!(
                "training features contain {} missing or non-finite values",
                non_finite
            )));
        }

        tracing::info!("Starting model training with {} samples", data.len());
        tracing::info!("Feature dimensions: {:?}", data.features.dim());
        tracing::info!("Class distribution: {:?}", class_distribution(data));

        let x = match self.config.feature_set {
            FeatureSet::Raw => {
                if data.features.ncols() != FeatureSet::Raw.width() {
                    return Err(StressError::Shape {
                        expected: FeatureSet::Raw.width(),
                        found: data.features.ncols(),
                    });
                }
                data.features.clone()
            }
            FeatureSet::Augmented => FeatureEngineer::augment(&data.features)?,
        };

        let split = stratified_split(&data.labels, test_fraction, seed)?;
        let y = data.label_codes();
        let y_train: Vec<usize> = split.train.iter().map(|&i| y[i]).collect();
        let y_test: Vec<usize> = split.test.iter().map(|&i| y[i]).collect();
        let mut x_train = select_rows(&x, &split.train);
        let mut x_test = select_rows(&x, &split.test);

        tracing::info!("Training set size: {}", x_train.nrows());
        tracing::info!("Testing set size: {}", x_test.nrows());

        let scaler = if self.config.scale {
            let mut normalizer = DataNormalizer::new();
            x_train = normalizer.fit_transform(&x_train)?;
            x_test = normalizer.transform(&x_test)?;
            normalizer.into_params()
        } else {
            None
        };

        let params = self.config.forest.clone().with_seed(seed);
        tracing::info!(
            "Training random forest: {} trees, max_depth {:?}, class weight {:?}",
            params.n_trees,
            params.max_depth,
            params.class_weight
        );
        let forest = RandomForest::fit(&x_train, &y_train, StressLevel::COUNT, &params)?;
        let mut artifact = ModelArtifact::new(self.config.feature_set, scaler, forest);
        self.state = TrainerState::Trained;

        let metrics = self.evaluate_model(&artifact, &x_train, &y_train, &x_test, &y_test)?;
        artifact.metrics = Some(metrics.clone());
        self.artifact = Some(artifact);
        self.metrics = Some(metrics.clone());
        self.state = TrainerState::Evaluated;

        Ok(TrainingReport {
            train_size: x_train.nrows(),
            test_size: x_test.nrows(),
            metrics,
        })
    }

    fn evaluate_model(
        &self,
        artifact: &ModelArtifact,
        x_train: &Array2<f64>,
        y_train: &[usize],
        x_test: &Array2<f64>,
        y_test: &[usize],
    ) -> Result<Metrics> {
        evaluation::evaluate(
            &artifact.forest,
            &artifact.feature_names,
            x_train,
            y_train,
            x_test,
            y_test,
        )
    }

    /// Сохраняет модель в `config.model_path`
    pub fn save(&mut self) -> Result<()> {
        let path = self.config.model_path.clone();
        self.persist(path)
    }

    /// Ошибка сохранения не сбрасывает обученную модель
    pub fn persist(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let artifact = self.artifact.as_ref().ok_or(StressError::NotTrained)?;
        match artifact.save(path) {
            Ok(()) => {
                self.state = TrainerState::Persisted;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error saving model: {}", e);
                Err(e)
            }
        }
    }
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new(TrainerConfig::default())
    }
}

fn class_distribution(data: &Dataset) -> Vec<(StressLevel, usize)> {
    StressLevel::ALL.iter().copied().zip(data.class_counts()).collect()
}
