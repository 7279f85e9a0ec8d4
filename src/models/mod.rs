/// ML модели

pub mod artifact;
pub mod evaluation;
pub mod forest;
pub mod predictor;
pub mod trainer;

pub use artifact::{ModelArtifact, ModelOrigin, ModelSource};
pub use evaluation::{Metrics, PartitionMetrics};
pub use forest::{ClassWeight, ForestParams, RandomForest};
pub use predictor::StressPredictor;
pub use trainer::{ModelTrainer, TrainerConfig, TrainerState, TrainingReport};
