//! Convolution tensor-to-loop-variable bindings.
//!
//! Not part of the core model: callers that map a different kind of
//! computation supply their own `Vec<Tensor>` instead of calling this.
use crate::error::{ModelError, Result};
use crate::ir::Tensor;

/// The weight/input/output bindings used for a convolutional layer:
/// `weight` over `{K,C,R,S}`, `input` over `{C,Y,X}`, `output` over
/// `{K,Y,X}`.
pub fn convolution_bindings() -> Vec<Tensor> {
    vec![
        Tensor::new("weight", vec!["K", "C", "R", "S"].into_iter().map(String::from).collect()),
        Tensor::new("input", vec!["C", "Y", "X"].into_iter().map(String::from).collect()),
        Tensor::new("output", vec!["K", "Y", "X"].into_iter().map(String::from).collect()),
    ]
}

/// Finds the tensor named `name` in `tensors`, or reports it as unknown.
pub fn find_tensor<'a>(tensors: &'a [Tensor], name: &str) -> Result<&'a Tensor> {
    tensors
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| ModelError::UnknownTensor(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_the_three_convolution_tensors() {
        let tensors = convolution_bindings();
        let names: Vec<&str> = tensors.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["weight", "input", "output"]);
    }

    #[test]
    fn find_tensor_reports_unknown_names() {
        let tensors = convolution_bindings();
        assert!(find_tensor(&tensors, "weight").is_ok());
        let err = find_tensor(&tensors, "bias").unwrap_err();
        assert!(matches!(err, ModelError::UnknownTensor(name) if name == "bias"));
    }
}
