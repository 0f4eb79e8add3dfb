//! Cross-validation and hyperparameter search over the train/test pipeline

mod crossval;
mod grid;

pub use crossval::{crossval, crossval_path, CrossValSummary};
pub use grid::{
    hyperparam_sweep, sweep_grid, sweep_path, SweepEntry, SweepPoint, SweepSummary, BASELINE_LRS,
    EMB_SIZES, LMKT_LRS, LORA_RANKS,
};
