//! # Gradiente: tensor autodiff engine
//!
//! Gradiente provides a minimal reverse-mode automatic-differentiation
//! engine over n-dimensional `f64` arrays, plus a small neural-network
//! layer (neuron / layer / multi-layer perceptron) built purely on the
//! engine's public operator surface.
//!
//! ## Architecture
//!
//! - **autograd**: tensors, operator overloads, graph recording, and the
//!   reverse-topological backward pass
//! - **nn**: `Activation`, `Neuron`, `Layer`, `MLP`
//! - **error**: the shape/value error taxonomy
//!
//! ## Example
//!
//! ```
//! use gradiente::Tensor;
//! use ndarray::array;
//!
//! let x = Tensor::from(array![1.0, 2.0, 3.0]);
//! let y = Tensor::from(array![4.0, 5.0, 6.0]);
//! let loss = (&x * &y).sum();
//! loss.backward();
//!
//! // d(sum(x*y))/dx = y
//! assert_eq!(x.grad().unwrap(), array![4.0, 5.0, 6.0].into_dyn());
//! ```

pub mod autograd;
pub mod error;
pub mod nn;

// Re-export commonly used types
pub use autograd::{backward, Op, Tensor};
pub use error::{Result, TensorError};
