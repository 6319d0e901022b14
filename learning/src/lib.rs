pub mod data;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod preprocessing;
pub mod table;

pub use dataset::Dataset;
pub use error::{MlErr, Result};
pub use model::{FitReport, LogisticConfig, LogisticRegression, Penalty};
