//! Tensor type with operation provenance and gradient tracking

use super::backward::BackwardOp;
use ndarray::{Array1, Array2, ArrayD, IxDyn};
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Tag identifying which operation produced a tensor.
///
/// `None` marks a leaf (user data or a trainable parameter).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    None,
    Add,
    Sub,
    Mult,
    Div,
    Pow,
    Matmul,
    Sum,
    Log,
    Stack,
    Tanh,
    Sigmoid,
    Relu,
    Linear,
}

struct Inner {
    data: ArrayD<f64>,
    op: Op,
    children: Vec<Tensor>,
    label: Option<String>,
    grad: RefCell<Option<ArrayD<f64>>>,
    backward: Option<Box<dyn BackwardOp>>,
}

/// An n-dimensional array value augmented with provenance for gradient
/// tracking.
///
/// `Tensor` is a cheap handle onto a shared graph node: cloning a tensor
/// clones the handle, not the data. Every operation returns a new node
/// recording how it was produced; operands are never mutated. Equality and
/// hashing are reference-based, so two handles compare equal iff they point
/// at the same node.
#[derive(Clone)]
pub struct Tensor {
    inner: Rc<Inner>,
}

impl Tensor {
    /// Create a leaf tensor from an n-dimensional array.
    pub fn new(data: ArrayD<f64>) -> Self {
        Self::leaf(data, None)
    }

    /// Create a labeled leaf tensor. The label is purely descriptive and
    /// never affects computation or equality.
    pub fn with_label(data: ArrayD<f64>, label: impl Into<String>) -> Self {
        Self::leaf(data, Some(label.into()))
    }

    /// Create a rank-0 (scalar) tensor.
    pub fn scalar(value: f64) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(&[]), value))
    }

    /// Create a 1-D tensor from a vector.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self::new(Array1::from(data).into_dyn())
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)))
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::new(ArrayD::ones(IxDyn(shape)))
    }

    fn leaf(data: ArrayD<f64>, label: Option<String>) -> Self {
        Self {
            inner: Rc::new(Inner {
                data,
                op: Op::None,
                children: Vec::new(),
                label,
                grad: RefCell::new(None),
                backward: None,
            }),
        }
    }

    /// Construct a derived node. Operands are deduplicated by node identity
    /// so that e.g. `t * t` records a single child.
    pub(crate) fn derived(
        data: ArrayD<f64>,
        op: Op,
        operands: &[&Tensor],
        backward: Box<dyn BackwardOp>,
    ) -> Self {
        let mut children: Vec<Tensor> = Vec::with_capacity(operands.len());
        for operand in operands {
            if !children.iter().any(|c| c.is(operand)) {
                children.push((*operand).clone());
            }
        }
        Self {
            inner: Rc::new(Inner {
                data,
                op,
                children,
                label: None,
                grad: RefCell::new(None),
                backward: Some(backward),
            }),
        }
    }

    /// Get a reference to the underlying array.
    pub fn data(&self) -> &ArrayD<f64> {
        &self.inner.data
    }

    /// Shape of the tensor; `[]` denotes a scalar.
    pub fn shape(&self) -> &[usize] {
        self.inner.data.shape()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.inner.data.ndim()
    }

    /// The operation that produced this tensor (`Op::None` for leaves).
    pub fn op(&self) -> Op {
        self.inner.op
    }

    /// The identity-deduplicated set of direct operands.
    pub fn children(&self) -> &[Tensor] {
        &self.inner.children
    }

    /// Optional descriptive label.
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Get the accumulated gradient, if a backward pass has touched this
    /// node.
    pub fn grad(&self) -> Option<ArrayD<f64>> {
        self.inner.grad.borrow().clone()
    }

    /// Clear the gradient accumulator. Gradients accumulate across backward
    /// calls, so callers reset between training iterations.
    pub fn zero_grad(&self) {
        *self.inner.grad.borrow_mut() = None;
    }

    /// Add a contribution into the gradient accumulator.
    pub(crate) fn accumulate_grad(&self, contribution: ArrayD<f64>) {
        let mut slot = self.inner.grad.borrow_mut();
        match slot.as_mut() {
            Some(grad) => *grad += &contribution,
            None => *slot = Some(contribution),
        }
    }

    pub(crate) fn backward_rule(&self) -> Option<&dyn BackwardOp> {
        self.inner.backward.as_deref()
    }

    /// Stable identity of the underlying node.
    pub(crate) fn node_id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    /// Whether two handles refer to the same graph node.
    pub fn is(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Propagate gradients from this tensor back through the graph,
    /// seeding with ones. See [`crate::autograd::backward`].
    pub fn backward(&self) {
        super::backward::backward(self, None);
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.is(other)
    }
}

impl Eq for Tensor {}

impl Hash for Tensor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_id().hash(state);
    }
}

impl From<ArrayD<f64>> for Tensor {
    fn from(data: ArrayD<f64>) -> Self {
        Self::new(data)
    }
}

impl From<Array1<f64>> for Tensor {
    fn from(data: Array1<f64>) -> Self {
        Self::new(data.into_dyn())
    }
}

impl From<Array2<f64>> for Tensor {
    fn from(data: Array2<f64>) -> Self {
        Self::new(data.into_dyn())
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape={:?})", self.shape())
    }
}

// The short and detailed forms are deliberately identical.
impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
