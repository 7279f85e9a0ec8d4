//! Оценка качества классификатора

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::forest::RandomForest;
use crate::types::StressLevel;

/// Accuracy и взвешенные по поддержке precision / recall / F1
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PartitionMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub label: StressLevel,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub train: PartitionMetrics,
    pub test: PartitionMetrics,
    /// Строки - истинный класс, столбцы - предсказанный (порядок low, medium, high)
    pub confusion_matrix: Vec<Vec<usize>>,
    pub classification_report: Vec<ClassReport>,
    pub feature_importances: Vec<FeatureImportance>,
}

pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize]) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0; StressLevel::COUNT]; StressLevel::COUNT];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t < StressLevel::COUNT && p < StressLevel::COUNT {
            matrix[t][p] += 1;
        }
    }
    matrix
}

/// Метрики по каждому классу; деление на ноль даёт 0
pub fn class_report(y_true: &[usize], y_pred: &[usize]) -> Vec<ClassReport> {
    let matrix = confusion_matrix(y_true, y_pred);

    StressLevel::ALL
        .iter()
        .map(|&label| {
            let c = label.index();
            let tp = matrix[c][c] as f64;
            let support: usize = matrix[c].iter().sum();
            let predicted: usize = matrix.iter().map(|row| row[c]).sum();

            let precision = safe_div(tp, predicted as f64);
            let recall = safe_div(tp, support as f64);
            let f1 = safe_div(2.0 * precision * recall, precision + recall);

            ClassReport {
                label,
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect()
}

pub fn partition_metrics(y_true: &[usize], y_pred: &[usize]) -> PartitionMetrics {
    let total = y_true.len();
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    let report = class_report(y_true, y_pred);

    let weighted = |metric: fn(&ClassReport) -> f64| {
        let sum: f64 = report.iter().map(|r| metric(r) * r.support as f64).sum();
        safe_div(sum, total as f64)
    };

    PartitionMetrics {
        accuracy: safe_div(correct as f64, total as f64),
        precision: weighted(|r| r.precision),
        recall: weighted(|r| r.recall),
        f1: weighted(|r| r.f1),
    }
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Оценивает модель на обеих частях выборки. Входные данные не изменяются.
pub fn evaluate(
    model: &RandomForest,
    feature_names: &[String],
    x_train: &Array2<f64>,
    y_train: &[usize],
    x_test: &Array2<f64>,
    y_test: &[usize],
) -> Result<Metrics> {
    let train_pred = model.predict(x_train)?;
    let test_pred = model.predict(x_test)?;

    let metrics = Metrics {
        train: partition_metrics(y_train, &train_pred),
        test: partition_metrics(y_test, &test_pred),
        confusion_matrix: confusion_matrix(y_test, &test_pred),
        classification_report: class_report(y_test, &test_pred),
        feature_importances: feature_names
            .iter()
            .zip(model.feature_importances())
            .map(|(name, &importance)| FeatureImportance {
                name: name.clone(),
                importance,
            })
            .collect(),
    };

    log_metrics(&metrics);
    Ok(metrics)
}

fn log_metrics(metrics: &Metrics) {
    for (partition, m) in [("Training", &metrics.train), ("Testing", &metrics.test)] {
        tracing::info!(
            "{} metrics: accuracy={:.4} precision={:.4} recall={:.4} f1={:.4}",
            partition,
            m.accuracy,
            m.precision,
            m.recall,
            m.f1
        );
    }

    tracing::info!("Confusion matrix: {:?}", metrics.confusion_matrix);
    for r in &metrics.classification_report {
        tracing::info!(
            "  {:<6} precision={:.4} recall={:.4} f1={:.4} support={}",
            r.label,
            r.precision,
            r.recall,
            r.f1,
            r.support
        );
    }

    tracing::info!("Feature importance:");
    for f in &metrics.feature_importances {
        tracing::info!("  {}: {:.4}", f.name, f.importance);
    }
}
