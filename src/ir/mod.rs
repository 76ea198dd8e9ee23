//! Core data model: directives, loop bounds and tensor bindings.
mod directive;
mod loop_nest;
mod tensor;

pub use directive::{Directive, DirectiveTable};
pub use loop_nest::{Loop, LoopTable};
pub use tensor::Tensor;
