//! Stress ML - классификация уровня стресса по физиологическим сигналам

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod preprocessing;
pub mod types;

pub use error::{Result, StressError, ValidationError};
pub use models::*;
pub use preprocessing::*;
pub use types::*;
