//! Загрузка размеченных данных из CSV и генерация синтетического набора

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, StressError};
use crate::types::{Dataset, StressLevel, N_BASE_FEATURES};

/// Верхняя граница синтетических признаков: значения в [0, 100)
pub const SYNTHETIC_FEATURE_SCALE: f64 = 100.0;

/// Читает CSV: последний столбец - метка, остальные - признаки.
///
/// Заголовок необязателен: первая строка считается заголовком, только если ни
/// один её признак не разбирается как число. Пустые ячейки и `NA`/`NaN`/`null`
/// становятся пропусками (NaN).
pub fn load(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(StressError::DataNotFound {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path)
        .map_err(|e| StressError::DataLoad(format!("{}: {}", path.display(), e)))?;

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(BufReader::new(file));

    let mut values: Vec<f64> = Vec::new();
    let mut labels: Vec<StressLevel> = Vec::new();
    let mut n_features: Option<usize> = None;

    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| StressError::DataLoad(e.to_string()))?;
        if record.len() < 2 {
            return Err(StressError::DataLoad(format!(
                "line {}: expected at least 2 columns, found {}",
                line + 1,
                record.len()
            )));
        }

        if line == 0 && is_header(&record) {
            tracing::debug!("Skipping header row: {:?}", record);
            continue;
        }

        let width = record.len() - 1;
        match n_features {
            None => n_features = Some(width),
            Some(expected) if expected != width => {
                return Err(StressError::DataLoad(format!(
                    "line {}: expected {} feature columns, found {}",
                    line + 1,
                    expected,
                    width
                )));
            }
            Some(_) => {}
        }

        for (col, cell) in record.iter().take(width).enumerate() {
            let value = parse_cell(cell).ok_or_else(|| {
                StressError::DataLoad(format!(
                    "line {}, column {}: '{}' is not a number",
                    line + 1,
                    col + 1,
                    cell
                ))
            })?;
            values.push(value);
        }

        let label_cell = record.get(width).unwrap_or_default();
        let label = label_cell
            .parse::<StressLevel>()
            .map_err(|e| StressError::DataLoad(format!("line {}: {}", line + 1, e)))?;
        labels.push(label);
    }

    let n_features = n_features
        .ok_or_else(|| StressError::DataLoad(format!("{} has no data rows", path.display())))?;
    let features = Array2::from_shape_vec((labels.len(), n_features), values)
        .map_err(|e| StressError::DataLoad(e.to_string()))?;

    tracing::info!("Data loaded from {}", path.display());
    tracing::info!("Data shape: {:?}", features.dim());
    tracing::info!("Labels shape: ({},)", labels.len());

    Dataset::new(features, labels)
}

/// Число или пропуск; `None` - ячейка не разбирается
fn parse_cell(cell: &str) -> Option<f64> {
    match cell.to_ascii_lowercase().as_str() {
        "" | "na" | "nan" | "null" | "none" => Some(f64::NAN),
        _ => cell.parse::<f64>().ok(),
    }
}

fn is_header(record: &StringRecord) -> bool {
    let width = record.len() - 1;
    record.iter().take(width).all(|cell| parse_cell(cell).is_none())
}

/// Равномерные признаки в [0, 100) и равномерные метки трёх классов
pub fn synthetic(n_samples: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);

    let features = Array2::from_shape_fn((n_samples, N_BASE_FEATURES), |_| {
        rng.gen::<f64>() * SYNTHETIC_FEATURE_SCALE
    });
    let labels = (0..n_samples)
        .map(|_| StressLevel::ALL[rng.gen_range(0..StressLevel::COUNT)])
        .collect();

    Dataset { features, labels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_with_header() {
        let file = csv_file(
            "heart_rate,ecg,emg,gsr,resp,stress\n\
             75,0.5,0.3,0.2,0.4,low\n\
             110,0.9,0.8,0.7,0.9,high\n",
        );
        let data = load(file.path()).unwrap();

        assert_eq!(data.features.dim(), (2, 5));
        assert_eq!(data.labels, vec![StressLevel::Low, StressLevel::High]);
        assert_eq!(data.features[[1, 0]], 110.0);
    }

    #[test]
    fn loads_without_header_and_numeric_labels() {
        let file = csv_file("75,0.5,0.3,0.2,0.4,0\n80,0.6,0.4,0.3,0.5,1\n90,0.7,0.5,0.4,0.6,2\n");
        let data = load(file.path()).unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(
            data.labels,
            vec![StressLevel::Low, StressLevel::Medium, StressLevel::High]
        );
    }

    #[test]
    fn empty_cells_become_missing() {
        let file = csv_file("75,,0.3,0.2,0.4,medium\n");
        let data = load(file.path()).unwrap();
        assert!(data.features[[0, 1]].is_nan());
    }

    #[test]
    fn missing_file_is_data_not_found() {
        let err = load("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, StressError::DataNotFound { .. }));
    }

    #[test]
    fn bad_label_is_data_load_error() {
        let file = csv_file("75,0.5,0.3,0.2,0.4,extreme\n");
        assert!(matches!(load(file.path()), Err(StressError::DataLoad(_))));
    }

    #[test]
    fn ragged_rows_are_data_load_error() {
        let file = csv_file("75,0.5,0.3,0.2,0.4,low\n75,0.5,0.3,low\n");
        assert!(matches!(load(file.path()), Err(StressError::DataLoad(_))));
    }

    #[test]
    fn non_numeric_feature_after_first_row_is_rejected() {
        let file = csv_file("75,0.5,0.3,0.2,0.4,low\n75,abc,0.3,0.2,0.4,low\n");
        assert!(matches!(load(file.path()), Err(StressError::DataLoad(_))));
    }

    #[test]
    fn malformed_first_row_is_not_a_header() {
        let file = csv_file("75,abc,0.3,0.2,0.4,low\n80,0.6,0.4,0.3,0.5,high\n");
        let err = load(file.path()).unwrap_err();
        assert!(matches!(err, StressError::DataLoad(ref m) if m.contains("abc")), "{}", err);
    }

    #[test]
    fn synthetic_is_seeded_and_bounded() {
        let a = synthetic(50, 7);
        let b = synthetic(50, 7);

        assert_eq!(a, b);
        assert_eq!(a.features.dim(), (50, 5));
        assert!(a.features.iter().all(|v| (0.0..100.0).contains(v)));
    }
}
