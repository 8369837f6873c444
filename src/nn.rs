//! Neural-network layer built on the autograd engine
//!
//! `Neuron`, `Layer`, and `MLP` are thin consumers of the engine's public
//! operator surface: they hold trainable parameter tensors and compose
//! forward passes, introducing no new graph mechanism. RNGs are threaded
//! explicitly through the constructors so initialization is deterministic
//! under a seeded generator.

use crate::autograd::Tensor;
use ndarray::{Array2, ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::fmt;

/// The closed set of activation functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Tanh,
    Sigmoid,
    Relu,
    Linear,
}

impl Activation {
    /// Apply the activation to a tensor, recording it as a graph node.
    pub fn apply(&self, x: &Tensor) -> Tensor {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => x.sigmoid(),
            Activation::Relu => x.relu(),
            Activation::Linear => x.linear(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Relu => "relu",
            Activation::Linear => "linear",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single neuron: weights of shape `[1, n_input]`, bias of shape `[1]`.
///
/// Weights use Xavier/Glorot initialization, `Normal(0, sqrt(2/(n_input+1)))`,
/// which keeps activation and gradient variance comparable across layers;
/// the bias starts at zero.
pub struct Neuron {
    w: Tensor,
    b: Tensor,
    n_input: usize,
    activation: Activation,
    label: Option<String>,
}

impl Neuron {
    pub fn new<R: Rng + ?Sized>(n_input: usize, activation: Activation, rng: &mut R) -> Self {
        let scale = (2.0 / (n_input as f64 + 1.0)).sqrt();
        let normal = Normal::new(0.0, scale).expect("positive standard deviation");
        let weights = Array2::from_shape_fn((1, n_input), |_| normal.sample(rng));
        Self {
            w: Tensor::with_label(weights.into_dyn(), "w"),
            b: Tensor::with_label(ArrayD::zeros(IxDyn(&[1])), "b"),
            n_input,
            activation,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// All tunable parameter tensors: `[w, b]`.
    pub fn parameters(&self) -> Vec<Tensor> {
        vec![self.w.clone(), self.b.clone()]
    }

    pub fn n_input(&self) -> usize {
        self.n_input
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Forward pass: `activation((w * x).sum(axis=1) + b)`.
    ///
    /// Any tensor broadcastable against the `[1, n_input]` weights is a
    /// valid input; a `[batch, n_input]` input yields a `[batch]` output.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let pre = (&self.w * x).sum_axis(1) + &self.b;
        self.activation.apply(&pre)
    }
}

impl fmt::Display for Neuron {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Neuron({})", self.activation)
    }
}

/// A collection of neurons sharing one input; outputs are stacked along
/// axis 1, so a `[batch, n_input]` input yields `[batch, n_neurons]`.
pub struct Layer {
    neurons: Vec<Neuron>,
    n_input: usize,
    activation: Activation,
    label: Option<String>,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        n_input: usize,
        n_neurons: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let neurons = (0..n_neurons)
            .map(|i| Neuron::new(n_input, activation, rng).with_label(format!("neuron_{i}")))
            .collect();
        Self {
            neurons,
            n_input,
            activation,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn parameters(&self) -> Vec<Tensor> {
        self.neurons.iter().flat_map(Neuron::parameters).collect()
    }

    pub fn n_input(&self) -> usize {
        self.n_input
    }

    pub fn n_neurons(&self) -> usize {
        self.neurons.len()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn forward(&self, x: &Tensor) -> Tensor {
        let outputs: Vec<Tensor> = self.neurons.iter().map(|n| n.forward(x)).collect();
        Tensor::stack(&outputs, 1).expect("neuron outputs share one shape")
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Layer({} neurons, {})",
            self.neurons.len(),
            self.activation
        )
    }
}

/// A multi-layer perceptron: layers applied left to right.
pub struct MLP {
    layers: Vec<Layer>,
    label: Option<String>,
}

impl MLP {
    /// Build an MLP from `(n_neurons, activation)` pairs, chaining each
    /// layer's width into the next layer's input size.
    pub fn new<R: Rng + ?Sized>(
        n_input: usize,
        layers: &[(usize, Activation)],
        rng: &mut R,
    ) -> Self {
        let mut dims = vec![n_input];
        dims.extend(layers.iter().map(|(n, _)| *n));
        let built = layers
            .iter()
            .enumerate()
            .map(|(i, (n_neurons, activation))| Layer::new(dims[i], *n_neurons, *activation, rng))
            .collect();
        Self {
            layers: built,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn parameters(&self) -> Vec<Tensor> {
        self.layers.iter().flat_map(Layer::parameters).collect()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn forward(&self, x: &Tensor) -> Tensor {
        self.layers
            .iter()
            .fold(x.clone(), |xi, layer| layer.forward(&xi))
    }
}

impl fmt::Display for MLP {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain = self
            .layers
            .iter()
            .map(|l| format!("{}/{}", l.n_neurons(), l.activation))
            .collect::<Vec<_>>()
            .join(" -> ");
        let n_input = self.layers.first().map_or(0, Layer::n_input);
        write!(f, "MLP({n_input} -> [{chain}])")
    }
}
