//! Question selection — injectable randomness for the session engine.
//!
//! The store asks a `QuestionPicker` for an index into the remaining unasked
//! questions. Production uses `UniformRandomPicker`; tests supply a
//! deterministic picker so selection order is reproducible.

use rand::Rng;

/// Picks an index in `0..remaining`. `remaining` is always non-zero.
pub trait QuestionPicker: Send + Sync {
    fn pick(&self, remaining: usize) -> usize;
}

/// Uniform selection with no ordering preference.
pub struct UniformRandomPicker;

impl QuestionPicker for UniformRandomPicker {
    fn pick(&self, remaining: usize) -> usize {
        rand::thread_rng().gen_range(0..remaining)
    }
}

/// Always picks the first remaining question. Used in tests and available for
/// deployments that want deterministic question order.
pub struct FirstPicker;

impl QuestionPicker for FirstPicker {
    fn pick(&self, _remaining: usize) -> usize {
        0
    }
}
