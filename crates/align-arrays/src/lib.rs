//! Analysis arrays for neural-align.
//!
//! Turns loaded trial tables into dense reduced arrays, augments them with
//! time lags, and decides which sessions are aligned against each other.

pub mod builder;
pub mod history;
pub mod pairing;
pub mod pca;

pub use align_core as core;
pub use builder::{
    data_array, data_array_with_kinematics, random_window_array, ArrayOptions, KinematicOptions,
};
pub use history::{add_history, add_history_to_data_array};
pub use pairing::{paired_sessions, paired_tables, PairingRules};
pub use pca::{Pca, ReductionModel, Reducer};
