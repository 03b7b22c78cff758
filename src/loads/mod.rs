//! Excitation loads

mod unbalance;

pub use unbalance::{unbalance_force_over_time, Unbalance};
