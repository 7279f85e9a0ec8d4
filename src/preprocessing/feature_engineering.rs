//! Feature engineering: производные признаки из пяти базовых сигналов

use ndarray::{s, Array2};

use crate::error::{Result, StressError};
use crate::types::{N_AUGMENTED_FEATURES, N_BASE_FEATURES};

/// Защита от деления на ноль в отношениях
pub const EPSILON: f64 = 1e-6;

pub struct FeatureEngineer;

impl FeatureEngineer {
    /// Дописывает к матрице `[heart_rate, ecg, emg, gsr, resp]` три столбца:
    /// `hr_ecg_ratio`, `emg_gsr_product`, `resp_hr_ratio`.
    pub fn augment(x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != N_BASE_FEATURES {
            return Err(StressError::Shape {
                expected: N_BASE_FEATURES,
                found: x.ncols(),
            });
        }

        let mut augmented = Array2::zeros((x.nrows(), N_AUGMENTED_FEATURES));
        augmented.slice_mut(s![.., ..N_BASE_FEATURES]).assign(x);

        for (i, row) in x.rows().into_iter().enumerate() {
            let (hr, ecg, emg, gsr, resp) = (row[0], row[1], row[2], row[3], row[4]);
            augmented[[i, 5]] = hr / (ecg + EPSILON);
            augmented[[i, 6]] = emg * gsr;
            augmented[[i, 7]] = resp / (hr + EPSILON);
        }

        tracing::debug!("Features augmented. New shape: {:?}", augmented.dim());
        Ok(augmented)
    }
}
