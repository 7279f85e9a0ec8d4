//! Очистка данных: пропуски и выбросы

use std::str::FromStr;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::types::{select_rows, Dataset};

/// Z-score порог по умолчанию
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 3.0;

/// Стратегия обработки пропусков (NaN)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingStrategy {
    #[default]
    Mean,
    Median,
    Drop,
}

impl FromStr for MissingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(MissingStrategy::Mean),
            "median" => Ok(MissingStrategy::Median),
            "drop" => Ok(MissingStrategy::Drop),
            other => Err(format!("Unknown missing-value strategy '{}'", other)),
        }
    }
}

/// Заполняет пропуски средним/медианой столбца или удаляет строки с пропусками.
/// Количество столбцов сохраняется всегда.
pub fn handle_missing(x: &Array2<f64>, strategy: MissingStrategy) -> Array2<f64> {
    match strategy {
        MissingStrategy::Drop => select_rows(x, &complete_rows(x)),
        MissingStrategy::Mean | MissingStrategy::Median => {
            let mut filled = x.clone();
            for mut column in filled.columns_mut() {
                let fill = column_statistic(column.view(), strategy);
                column.iter_mut().filter(|v| v.is_nan()).for_each(|v| *v = fill);
            }
            filled
        }
    }
}

/// Маска строк без пропусков
pub fn missing_mask(x: &Array2<f64>) -> Vec<bool> {
    x.rows()
        .into_iter()
        .map(|row| row.iter().all(|v| !v.is_nan()))
        .collect()
}

fn complete_rows(x: &Array2<f64>) -> Vec<usize> {
    missing_mask(x)
        .into_iter()
        .enumerate()
        .filter_map(|(i, keep)| keep.then_some(i))
        .collect()
}

/// Статистика по наблюдённым значениям; столбец без значений заполняется нулём
fn column_statistic(column: ArrayView1<f64>, strategy: MissingStrategy) -> f64 {
    let mut observed: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
    if observed.is_empty() {
        return 0.0;
    }

    match strategy {
        MissingStrategy::Median => {
            observed.sort_by(|a, b| a.total_cmp(b));
            let mid = observed.len() / 2;
            if observed.len() % 2 == 0 {
                (observed[mid - 1] + observed[mid]) / 2.0
            } else {
                observed[mid]
            }
        }
        _ => observed.iter().sum::<f64>() / observed.len() as f64,
    }
}

/// Маска строк, у которых все |z| < threshold.
///
/// Для столбца с нулевым std z-score считается нулевым.
pub fn outlier_mask(x: &Array2<f64>, threshold: f64) -> Vec<bool> {
    let n = x.nrows();
    if n == 0 {
        return Vec::new();
    }

    let stats: Vec<(f64, f64)> = x.columns().into_iter().map(observed_mean_std).collect();

    x.rows()
        .into_iter()
        .map(|row| {
            row.iter().zip(&stats).all(|(value, &(mean, std))| {
                let z = if std > 0.0 { (value - mean) / std } else { 0.0 };
                // NaN не считается выбросом
                !(z.abs() >= threshold)
            })
        })
        .collect()
}

/// Среднее и популяционное std по значениям без NaN
fn observed_mean_std(column: ArrayView1<f64>) -> (f64, f64) {
    let observed: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
    if observed.is_empty() {
        return (0.0, 0.0);
    }

    let n = observed.len() as f64;
    let mean = observed.iter().sum::<f64>() / n;
    let variance = observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Удаляет строки-выбросы по z-score
pub fn remove_outliers(x: &Array2<f64>, threshold: f64) -> Array2<f64> {
    let kept: Vec<usize> = outlier_mask(x, threshold)
        .into_iter()
        .enumerate()
        .filter_map(|(i, keep)| keep.then_some(i))
        .collect();
    select_rows(x, &kept)
}

impl Dataset {
    /// `handle_missing` с сохранением соответствия строк и меток
    pub fn handle_missing(&self, strategy: MissingStrategy) -> Dataset {
        match strategy {
            MissingStrategy::Drop => self.retain_rows(&missing_mask(&self.features)),
            _ => Dataset {
                features: handle_missing(&self.features, strategy),
                labels: self.labels.clone(),
            },
        }
    }

    /// `remove_outliers` с сохранением соответствия строк и меток
    pub fn remove_outliers(&self, threshold: f64) -> Dataset {
        let before = self.len();
        let cleaned = self.retain_rows(&outlier_mask(&self.features, threshold));
        tracing::info!(
            "Outlier removal (threshold {}): kept {} of {} rows",
            threshold,
            cleaned.len(),
            before
        );
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StressLevel;
    use ndarray::array;

    #[test]
    fn mean_and_median_fill_per_column() {
        let x = array![[1.0, f64::NAN], [f64::NAN, 4.0], [3.0, 10.0], [8.0, 1.0]];

        let by_mean = handle_missing(&x, MissingStrategy::Mean);
        assert_eq!(by_mean.dim(), (4, 2));
        assert_eq!(by_mean[[1, 0]], 4.0);
        assert_eq!(by_mean[[0, 1]], 5.0);

        let by_median = handle_missing(&x, MissingStrategy::Median);
        assert_eq!(by_median[[1, 0]], 3.0);
        assert_eq!(by_median[[0, 1]], 4.0);
    }

    #[test]
    fn drop_keeps_columns_and_shrinks_rows() {
        let x = array![[1.0, 2.0, 3.0], [f64::NAN, 1.0, 1.0], [4.0, 5.0, 6.0]];
        let out = handle_missing(&x, MissingStrategy::Drop);
        assert_eq!(out, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }

    #[test]
    fn fully_missing_column_is_zero_filled() {
        let x = array![[f64::NAN, 1.0], [f64::NAN, 2.0]];
        let out = handle_missing(&x, MissingStrategy::Mean);
        assert_eq!(out.column(0).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn zero_variance_column_keeps_every_row() {
        let x = array![[7.0, 1.0], [7.0, 1.0], [7.0, 1.0], [7.0, 1.0]];
        let out = remove_outliers(&x, DEFAULT_OUTLIER_THRESHOLD);
        assert_eq!(out, x);
    }

    #[test]
    fn missing_value_does_not_disable_outlier_filtering() {
        let mut rows: Vec<[f64; 2]> = (0..30).map(|i| [10.0 + (i % 3) as f64, 5.0]).collect();
        rows[0][0] = f64::NAN;
        rows.push([500.0, 5.0]);
        let x = ndarray::arr2(&rows);

        let mask = outlier_mask(&x, DEFAULT_OUTLIER_THRESHOLD);
        assert!(mask[0], "row with a missing value is kept");
        assert!(!mask[30], "extreme row is still removed");
        assert_eq!(mask.iter().filter(|&&keep| keep).count(), 30);
    }

    #[test]
    fn extreme_row_is_removed() {
        let mut rows: Vec<[f64; 2]> = (0..30).map(|i| [10.0 + (i % 3) as f64, 5.0]).collect();
        rows.push([500.0, 5.0]);
        let x = ndarray::arr2(&rows);

        let out = remove_outliers(&x, 3.0);
        assert_eq!(out.nrows(), 30);
        assert!(out.column(0).iter().all(|v| *v < 100.0));
    }

    #[test]
    fn dataset_cleaning_keeps_labels_aligned() {
        let data = Dataset::new(
            array![[1.0, 1.0], [f64::NAN, 2.0], [3.0, 3.0]],
            vec![StressLevel::Low, StressLevel::Medium, StressLevel::High],
        )
        .unwrap();

        let cleaned = data.handle_missing(MissingStrategy::Drop);
        assert_eq!(cleaned.labels, vec![StressLevel::Low, StressLevel::High]);
        assert_eq!(cleaned.features.nrows(), 2);
    }

    #[test]
    fn strategy_parses_from_cli_names() {
        assert_eq!("median".parse::<MissingStrategy>(), Ok(MissingStrategy::Median));
        assert!("mode".parse::<MissingStrategy>().is_err());
    }
}
