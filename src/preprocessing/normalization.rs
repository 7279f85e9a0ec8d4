//! Нормализация данных (StandardScaler)

#![allow(non_snake_case)]

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StressError};

/// Среднее и стандартное отклонение по каждому признаку.
///
/// Подбираются один раз на обучающей выборке и сохраняются в артефакт модели;
/// при инференсе только применяются.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingParameters {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl ScalingParameters {
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn is_finite(&self) -> bool {
        self.mean.iter().chain(&self.std).all(|v| v.is_finite())
    }

    /// (X - mean) / std без пересчёта параметров
    pub fn transform(&self, X: &Array2<f64>) -> Result<Array2<f64>> {
        if X.ncols() != self.n_features() {
            return Err(StressError::Shape {
                expected: self.n_features(),
                found: X.ncols(),
            });
        }

        let mut normalized = X.clone();
        for mut row in normalized.rows_mut() {
            for (i, val) in row.iter_mut().enumerate() {
                *val = (*val - self.mean[i]) / self.std[i];
            }
        }

        Ok(normalized)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataNormalizer {
    params: Option<ScalingParameters>,
}

impl DataNormalizer {
    pub fn new() -> Self {
        Self { params: None }
    }

    pub fn fit(&mut self, X: &Array2<f64>) -> Result<&ScalingParameters> {
        if X.nrows() == 0 {
            return Err(StressError::InsufficientData("Empty dataset".to_string()));
        }

        let mean = X
            .mean_axis(Axis(0))
            .ok_or_else(|| StressError::InsufficientData("Failed to compute mean".to_string()))?;
        let mut std = X.std_axis(Axis(0), 0.0);

        // Постоянный признак масштабируется в ноль, а не в NaN
        for val in std.iter_mut() {
            if *val < 1e-10 {
                *val = 1.0;
            }
        }

        Ok(self.params.insert(ScalingParameters {
            mean: mean.to_vec(),
            std: std.to_vec(),
        }))
    }

    pub fn transform(&self, X: &Array2<f64>) -> Result<Array2<f64>> {
        self.params
            .as_ref()
            .ok_or_else(|| StressError::InvalidParameter("Normalizer not fitted".to_string()))?
            .transform(X)
    }

    pub fn fit_transform(&mut self, X: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(X)?;
        self.transform(X)
    }

    pub fn into_params(self) -> Option<ScalingParameters> {
        self.params
    }
}

/// `fit = true`: подбирает параметры по `X`; `fit = false`: применяет переданные.
pub fn scale(
    X: &Array2<f64>,
    params: Option<&ScalingParameters>,
    fit: bool,
) -> Result<(Array2<f64>, ScalingParameters)> {
    if fit {
        let mut normalizer = DataNormalizer::new();
        let scaled = normalizer.fit_transform(X)?;
        let params = normalizer
            .into_params()
            .ok_or_else(|| StressError::InvalidParameter("Normalizer not fitted".to_string()))?;
        return Ok((scaled, params));
    }

    let params = params.ok_or_else(|| {
        StressError::InvalidParameter("Scaling parameters required when fit is false".to_string())
    })?;
    Ok((params.transform(X)?, params.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn fit_gives_zero_mean_unit_variance() {
        let X = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let (scaled, params) = scale(&X, None, true).unwrap();

        assert_eq!(params.mean, vec![2.5, 25.0]);
        for col in scaled.columns() {
            assert!(col.mean().unwrap().abs() < 1e-12);
            assert!((col.std(0.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn constant_column_scales_to_zero() {
        let X = array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let (scaled, params) = scale(&X, None, true).unwrap();

        assert_eq!(params.std[0], 1.0);
        assert!(scaled.column(0).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn apply_without_fit_is_idempotent() {
        let params = ScalingParameters {
            mean: vec![70.0, 0.5],
            std: vec![10.0, 0.25],
        };
        let X = array![[80.0, 0.75], [60.0, 0.25]];

        let (first, returned) = scale(&X, Some(&params), false).unwrap();
        let (second, _) = scale(&X, Some(&params), false).unwrap();

        assert_eq!(first, second);
        assert_eq!(returned, params);
        assert_eq!(first, array![[1.0, 1.0], [-1.0, -1.0]]);
    }

    #[test]
    fn apply_rejects_width_mismatch() {
        let params = ScalingParameters {
            mean: vec![0.0; 5],
            std: vec![1.0; 5],
        };
        let X = Array2::<f64>::zeros((2, 8));
        assert!(matches!(
            scale(&X, Some(&params), false),
            Err(StressError::Shape { expected: 5, found: 8 })
        ));
    }

    #[test]
    fn apply_without_params_is_an_error() {
        let X = Array2::<f64>::zeros((2, 5));
        assert!(matches!(
            scale(&X, None, false),
            Err(StressError::InvalidParameter(_))
        ));
    }

    #[test]
    fn empty_dataset_cannot_be_fitted() {
        let X = Array2::<f64>::zeros((0, 5));
        assert!(DataNormalizer::new().fit(&X).is_err());
    }
}
