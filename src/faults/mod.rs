//! Nonlinear fault forces applied through the per-step callback

mod rubbing;

pub use rubbing::{Rubbing, RubbingResult, RubbingSample};
