//! Инференс: проверка входа, предсказание, загрузка модели с запасным вариантом

use std::path::Path;

use serde_json::Value;

use crate::error::{Result, StressError, ValidationError};
use crate::models::artifact::{ModelArtifact, ModelOrigin, ModelSource};
use crate::models::forest::argmax;
use crate::types::{
    ClassProbabilities, FeatureSet, FeatureVector, PredictionResult, StressLevel, FEATURE_NAMES,
};

/// Знаков после запятой в вероятностях и уверенности
const ROUND_DIGITS: i32 = 4;

/// Сид запасной модели по умолчанию
pub const DEFAULT_FALLBACK_SEED: u64 = 42;

/// Сервис предсказаний. После создания не изменяется, поэтому его можно
/// разделять между потоками через `Arc` без блокировок.
#[derive(Debug, Clone)]
pub struct StressPredictor {
    artifact: ModelArtifact,
    origin: ModelOrigin,
}

impl StressPredictor {
    pub fn new(artifact: ModelArtifact, origin: ModelOrigin) -> Self {
        Self { artifact, origin }
    }

    pub fn from_source(source: &ModelSource) -> Result<Self> {
        let (artifact, origin) = source.resolve()?;
        Ok(Self::new(artifact, origin))
    }

    /// Загружает модель из `path`; при отсутствии файла или ошибке чтения
    /// обучает запасную модель на синтетических данных.
    pub fn load_or_fallback(path: impl AsRef<Path>, fallback_seed: u64) -> Result<Self> {
        let path = path.as_ref();
        match Self::from_source(&ModelSource::Persisted(path.to_path_buf())) {
            Ok(predictor) => Ok(predictor),
            Err(e) => {
                tracing::warn!("{}", e);
                tracing::info!("Falling back to mock model for demonstration");
                Self::from_source(&ModelSource::Synthetic(fallback_seed))
            }
        }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn origin(&self) -> &ModelOrigin {
        &self.origin
    }

    pub fn feature_names(&self) -> Vec<String> {
        FeatureSet::Raw.feature_names()
    }

    pub fn stress_classes(&self) -> Vec<StressLevel> {
        StressLevel::ALL.to_vec()
    }

    /// Все пять признаков присутствуют, каждый - конечное неотрицательное число
    pub fn validate(&self, input: &Value) -> std::result::Result<FeatureVector, ValidationError> {
        let map = input.as_object().ok_or(ValidationError::NotAnObject)?;

        let missing: Vec<String> = FEATURE_NAMES
            .iter()
            .filter(|name| !map.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFeatures(missing));
        }

        let mut values = [0.0; FEATURE_NAMES.len()];
        for (slot, name) in values.iter_mut().zip(FEATURE_NAMES) {
            let value = numeric(&map[name]).ok_or_else(|| ValidationError::NotNumeric(name.to_string()))?;
            if value < 0.0 {
                return Err(ValidationError::Negative(name.to_string()));
            }
            *slot = value;
        }

        let [heart_rate, ecg, emg, gsr, resp] = values;
        Ok(FeatureVector {
            heart_rate,
            ecg,
            emg,
            gsr,
            resp,
        })
    }

    /// Никогда не паникует и не возвращает ошибку: проблемы попадают в `error`
    pub fn predict(&self, input: &Value) -> PredictionResult {
        let features = match self.validate(input) {
            Ok(features) => features,
            Err(e) => return PredictionResult::failure(e.to_string()),
        };

        match self.predict_features(&features) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Prediction error: {}", e);
                let message = match e {
                    StressError::Inference(_) => e.to_string(),
                    other => format!("Prediction failed: {}", other),
                };
                PredictionResult::failure(message)
            }
        }
    }

    /// Предсказание для уже проверенного вектора
    pub fn predict_features(&self, features: &FeatureVector) -> Result<PredictionResult> {
        let x = self.artifact.prepare(&features.to_row())?;
        let proba = self.artifact.forest.predict_proba(&x)?;
        let row = proba.row(0);

        if row.iter().any(|p| !p.is_finite()) {
            return Err(StressError::Inference("model produced non-finite probabilities".to_string()));
        }

        let class = argmax(row);
        let stress_level = StressLevel::from_index(class)
            .ok_or_else(|| StressError::Inference(format!("unknown class index {}", class)))?;

        let probabilities = ClassProbabilities::from_slice(&round_distribution(&row.to_vec(), ROUND_DIGITS));

        Ok(PredictionResult {
            stress_level: Some(stress_level),
            confidence: probabilities.max(),
            probabilities: Some(probabilities),
            features_used: Some(self.feature_names()),
            error: None,
        })
    }

    /// Каждый элемент обрабатывается независимо, порядок сохраняется
    pub fn batch_predict(&self, inputs: &[Value]) -> Vec<PredictionResult> {
        inputs.iter().map(|input| self.predict(input)).collect()
    }
}

/// JSON-число или строка с числом; NaN и бесконечности не принимаются
fn numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Округляет распределение до `digits` знаков так, чтобы сумма осталась равной 1:
/// недостающие единицы младшего разряда получают значения с наибольшим остатком.
fn round_distribution(values: &[f64], digits: i32) -> Vec<f64> {
    let scale = 10f64.powi(digits);
    let total = scale.round() as i64;

    let scaled: Vec<f64> = values.iter().map(|v| v * scale).collect();
    let mut units: Vec<i64> = scaled.iter().map(|v| v.floor() as i64).collect();

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = scaled[a] - scaled[a].floor();
        let rb = scaled[b] - scaled[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    let deficit = total - units.iter().sum::<i64>();
    for &i in order.iter().cycle().take(deficit.max(0) as usize) {
        units[i] += 1;
    }

    units.into_iter().map(|u| u as f64 / scale).collect()
}
