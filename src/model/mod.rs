//! The analytical cost model: mapping analysis, buffer sizing and traffic,
//! and closed-form runtime.
mod buffer;
mod mapping;
mod performance;

pub use buffer::BufferModel;
pub use mapping::MappingAnalyzer;
pub use performance::PerformanceModel;

/// Selects between bug-for-bug compatibility with the analyzer this crate
/// was modeled on and a corrected reading of the same formulas.
///
/// `Compat` is the default: existing dataflow/layer files and any numbers
/// published against the original tool keep matching. `Strict` fixes the
/// three quirks named on each affected method's doc comment; switch to it
/// when comparing against a from-scratch reimplementation rather than
/// against historical output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Compat,
    Strict,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Compat
    }
}
