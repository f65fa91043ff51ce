pub mod example;
pub mod metrics;
pub mod mode;
pub mod span;

pub use example::{Example, IGNORE_LABEL, Prediction, SENTINEL_INVALID};
pub use metrics::EvalRecord;
pub use mode::TrainingMode;
pub use span::NswSpan;
