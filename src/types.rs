/// Типы данных для модуля оценки стресса

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StressError};

/// Порядок базовых признаков: контракт между обучением, моделью и инференсом
pub const FEATURE_NAMES: [&str; 5] = ["heart_rate", "ecg", "emg", "gsr", "resp"];

/// Производные признаки, дописываемые после базовых
pub const DERIVED_FEATURE_NAMES: [&str; 3] = ["hr_ecg_ratio", "emg_gsr_product", "resp_hr_ratio"];

pub const N_BASE_FEATURES: usize = FEATURE_NAMES.len();
pub const N_AUGMENTED_FEATURES: usize = N_BASE_FEATURES + DERIVED_FEATURE_NAMES.len();

/// Уровень стресса с фиксированным порядковым кодированием 0/1/2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLevel {
    Low,
    Medium,
    High,
}

impl StressLevel {
    /// `stress_classes[i]` соответствует i-й вероятности
    pub const ALL: [StressLevel; 3] = [StressLevel::Low, StressLevel::Medium, StressLevel::High];
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StressLevel::Low => "low",
            StressLevel::Medium => "medium",
            StressLevel::High => "high",
        }
    }
}

impl fmt::Display for StressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for StressLevel {
    type Err = String;

    /// Принимает имя класса (`low`, `Medium`, ...) или его код (`0`, `1`, `2`, `2.0`)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "low" => return Ok(StressLevel::Low),
            "medium" => return Ok(StressLevel::Medium),
            "high" => return Ok(StressLevel::High),
            _ => {}
        }

        trimmed
            .parse::<f64>()
            .ok()
            .filter(|code| code.fract() == 0.0 && *code >= 0.0)
            .and_then(|code| Self::from_index(code as usize))
            .ok_or_else(|| format!("Unknown stress label '{}'", trimmed))
    }
}

/// Пять физиологических показателей одного наблюдения
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub heart_rate: f64,
    pub ecg: f64,
    pub emg: f64,
    pub gsr: f64,
    pub resp: f64,
}

impl FeatureVector {
    /// Значения в порядке `FEATURE_NAMES`
    pub fn to_array(&self) -> [f64; N_BASE_FEATURES] {
        [self.heart_rate, self.ecg, self.emg, self.gsr, self.resp]
    }

    pub fn to_row(&self) -> Array2<f64> {
        ndarray::arr2(&[self.to_array()])
    }
}

/// Какие столбцы видит модель: только базовые или базовые + производные
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSet {
    Raw,
    Augmented,
}

impl FeatureSet {
    pub fn width(self) -> usize {
        match self {
            FeatureSet::Raw => N_BASE_FEATURES,
            FeatureSet::Augmented => N_AUGMENTED_FEATURES,
        }
    }

    pub fn feature_names(self) -> Vec<String> {
        let names = FEATURE_NAMES.iter();
        match self {
            FeatureSet::Raw => names.map(|n| n.to_string()).collect(),
            FeatureSet::Augmented => names
                .chain(DERIVED_FEATURE_NAMES.iter())
                .map(|n| n.to_string())
                .collect(),
        }
    }
}

/// Вероятности классов в порядке low, medium, high
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl ClassProbabilities {
    pub fn from_slice(values: &[f64]) -> Self {
        let get = |i: usize| values.get(i).copied().unwrap_or(0.0);
        Self {
            low: get(0),
            medium: get(1),
            high: get(2),
        }
    }

    pub fn get(&self, level: StressLevel) -> f64 {
        match level {
            StressLevel::Low => self.low,
            StressLevel::Medium => self.medium,
            StressLevel::High => self.high,
        }
    }

    pub fn values(&self) -> [f64; 3] {
        [self.low, self.medium, self.high]
    }

    pub fn sum(&self) -> f64 {
        self.values().iter().sum()
    }

    pub fn max(&self) -> f64 {
        self.values().iter().copied().fold(0.0, f64::max)
    }
}

/// Результат предсказания: либо заполнен `stress_level`, либо `error`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionResult {
    pub stress_level: Option<StressLevel>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<ClassProbabilities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features_used: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            stress_level: None,
            confidence: 0.0,
            probabilities: None,
            features_used: None,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Размеченный набор данных: строки `features` выровнены с `labels`
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub labels: Vec<StressLevel>,
}

impl Dataset {
    pub fn new(features: Array2<f64>, labels: Vec<StressLevel>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(StressError::InvalidParameter(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Коды классов (0/1/2) для обучения
    pub fn label_codes(&self) -> Vec<usize> {
        self.labels.iter().map(|l| l.index()).collect()
    }

    /// Количество примеров каждого класса в порядке `StressLevel::ALL`
    pub fn class_counts(&self) -> [usize; StressLevel::COUNT] {
        let mut counts = [0; StressLevel::COUNT];
        for label in &self.labels {
            counts[label.index()] += 1;
        }
        counts
    }

    /// Оставляет строки, для которых `mask[i] == true`
    pub fn retain_rows(&self, mask: &[bool]) -> Self {
        let kept: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        Self {
            features: select_rows(&self.features, &kept),
            labels: kept.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

/// Копирует выбранные строки матрицы (пустой список даёт матрицу 0 x ncols)
pub(crate) fn select_rows(x: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    let mut out = Array2::zeros((rows.len(), x.ncols()));
    for (dst, &src) in rows.iter().enumerate() {
        out.row_mut(dst).assign(&x.row(src));
    }
    out
}
