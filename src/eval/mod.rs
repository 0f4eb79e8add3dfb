//! Model evaluation
//!
//! - `metrics`: accuracy, ROC AUC, precision, recall, F1 for binary correctness
//! - `report`: all-turn vs final-turn reports and the flat metrics vector
//! - `driver`: evaluation loops for language models and baselines
//!
//! ## Example
//!
//! ```
//! use lmkt::eval::compute_metrics;
//!
//! let m = compute_metrics(&[1.0, 0.0, 1.0], &[0.9, 0.2, 0.4]).unwrap();
//! assert_eq!(m.auc, 100.0);
//! ```

pub mod driver;
pub mod metrics;
pub mod report;

pub use driver::{
    evaluate_baseline, evaluate_lm, BaselinePredictor, DialogueIndex, KcReport, LmEvaluation,
};
pub use metrics::{compute_metrics, hard_prediction, roc_auc, BinaryConfusion, MetricSet};
pub use report::{compute_all_metrics, metrics_path, MetricsVector, Predictions};
