/// Модуль предобработки данных

pub mod cleaning;
pub mod feature_engineering;
pub mod loader;
pub mod normalization;

pub use cleaning::{handle_missing, remove_outliers, MissingStrategy};
pub use feature_engineering::FeatureEngineer;
pub use loader::load;
pub use normalization::{scale, DataNormalizer, ScalingParameters};
