//! Forward operations, operator overloads, and their backward rules
//!
//! Every operation returns a freshly allocated node tagged with its [`Op`]
//! and the operand set that produced it. Scalars are captured as constants
//! inside the backward rule; they never become graph leaves.

use super::backward::BackwardOp;
use super::broadcast::{broadcast_apply, reduce_to_shape};
use super::tensor::{Op, Tensor};
use crate::error::{Result, TensorError};
use ndarray::{ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, IxDyn, Zip};
use std::ops::{Add, Div, Mul, Neg, Sub};

// ---------------------------------------------------------------------------
// Elementwise binary operations (tensor ⊙ tensor, broadcasting)
// ---------------------------------------------------------------------------

pub(crate) fn add(lhs: &Tensor, rhs: &Tensor) -> Tensor {
    let data = broadcast_apply(lhs.data(), rhs.data(), |a, b| a + b);
    let rule = Box::new(AddBackward {
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    });
    Tensor::derived(data, Op::Add, &[lhs, rhs], rule)
}

pub(crate) fn sub(lhs: &Tensor, rhs: &Tensor) -> Tensor {
    let data = broadcast_apply(lhs.data(), rhs.data(), |a, b| a - b);
    let rule = Box::new(SubBackward {
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    });
    Tensor::derived(data, Op::Sub, &[lhs, rhs], rule)
}

pub(crate) fn mul(lhs: &Tensor, rhs: &Tensor) -> Tensor {
    let data = broadcast_apply(lhs.data(), rhs.data(), |a, b| a * b);
    let rule = Box::new(MulBackward {
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    });
    Tensor::derived(data, Op::Mult, &[lhs, rhs], rule)
}

pub(crate) fn div(lhs: &Tensor, rhs: &Tensor) -> Tensor {
    let data = broadcast_apply(lhs.data(), rhs.data(), |a, b| a / b);
    let rule = Box::new(DivBackward {
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    });
    Tensor::derived(data, Op::Div, &[lhs, rhs], rule)
}

struct AddBackward {
    lhs: Tensor,
    rhs: Tensor,
}

impl BackwardOp for AddBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        vec![
            (
                self.lhs.clone(),
                reduce_to_shape(grad.clone(), self.lhs.shape()),
            ),
            (
                self.rhs.clone(),
                reduce_to_shape(grad.clone(), self.rhs.shape()),
            ),
        ]
    }
}

struct SubBackward {
    lhs: Tensor,
    rhs: Tensor,
}

impl BackwardOp for SubBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        vec![
            (
                self.lhs.clone(),
                reduce_to_shape(grad.clone(), self.lhs.shape()),
            ),
            (
                self.rhs.clone(),
                reduce_to_shape(grad.mapv(|g| -g), self.rhs.shape()),
            ),
        ]
    }
}

struct MulBackward {
    lhs: Tensor,
    rhs: Tensor,
}

impl BackwardOp for MulBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        // ∂(a*b)/∂a = b, ∂(a*b)/∂b = a
        let to_lhs = broadcast_apply(grad, self.rhs.data(), |g, b| g * b);
        let to_rhs = broadcast_apply(grad, self.lhs.data(), |g, a| g * a);
        vec![
            (self.lhs.clone(), reduce_to_shape(to_lhs, self.lhs.shape())),
            (self.rhs.clone(), reduce_to_shape(to_rhs, self.rhs.shape())),
        ]
    }
}

struct DivBackward {
    lhs: Tensor,
    rhs: Tensor,
}

impl BackwardOp for DivBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        // ∂(a/b)/∂a = 1/b, ∂(a/b)/∂b = -a/b²
        let to_lhs = broadcast_apply(grad, self.rhs.data(), |g, b| g / b);
        let scaled = broadcast_apply(grad, self.lhs.data(), |g, a| g * a);
        let to_rhs = broadcast_apply(&scaled, self.rhs.data(), |t, b| -t / (b * b));
        vec![
            (self.lhs.clone(), reduce_to_shape(to_lhs, self.lhs.shape())),
            (self.rhs.clone(), reduce_to_shape(to_rhs, self.rhs.shape())),
        ]
    }
}

// ---------------------------------------------------------------------------
// Scalar forms (tensor ⊙ constant, constant ⊙ tensor)
// ---------------------------------------------------------------------------

pub(crate) fn add_scalar(lhs: &Tensor, scalar: f64) -> Tensor {
    let data = lhs.data().mapv(|x| x + scalar);
    let rule = Box::new(PassthroughBackward { input: lhs.clone() });
    Tensor::derived(data, Op::Add, &[lhs], rule)
}

pub(crate) fn sub_scalar(lhs: &Tensor, scalar: f64) -> Tensor {
    let data = lhs.data().mapv(|x| x - scalar);
    let rule = Box::new(PassthroughBackward { input: lhs.clone() });
    Tensor::derived(data, Op::Sub, &[lhs], rule)
}

pub(crate) fn scalar_sub(scalar: f64, rhs: &Tensor) -> Tensor {
    let data = rhs.data().mapv(|x| scalar - x);
    let rule = Box::new(ScaleBackward {
        input: rhs.clone(),
        factor: -1.0,
    });
    Tensor::derived(data, Op::Sub, &[rhs], rule)
}

pub(crate) fn mul_scalar(lhs: &Tensor, scalar: f64) -> Tensor {
    let data = lhs.data().mapv(|x| x * scalar);
    let rule = Box::new(ScaleBackward {
        input: lhs.clone(),
        factor: scalar,
    });
    Tensor::derived(data, Op::Mult, &[lhs], rule)
}

pub(crate) fn div_scalar(lhs: &Tensor, scalar: f64) -> Tensor {
    let data = lhs.data().mapv(|x| x / scalar);
    let rule = Box::new(DivScalarBackward {
        input: lhs.clone(),
        scalar,
    });
    Tensor::derived(data, Op::Div, &[lhs], rule)
}

pub(crate) fn scalar_div(scalar: f64, rhs: &Tensor) -> Tensor {
    let data = rhs.data().mapv(|x| scalar / x);
    let rule = Box::new(ScalarDivBackward {
        input: rhs.clone(),
        scalar,
    });
    Tensor::derived(data, Op::Div, &[rhs], rule)
}

/// Gradient flows through unchanged (constant add/subtract, identity).
struct PassthroughBackward {
    input: Tensor,
}

impl BackwardOp for PassthroughBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        vec![(self.input.clone(), grad.clone())]
    }
}

/// Gradient scales by a constant factor (scalar multiply, negation,
/// constant-minus-tensor).
struct ScaleBackward {
    input: Tensor,
    factor: f64,
}

impl BackwardOp for ScaleBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        vec![(self.input.clone(), grad.mapv(|g| g * self.factor))]
    }
}

struct DivScalarBackward {
    input: Tensor,
    scalar: f64,
}

impl BackwardOp for DivScalarBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        vec![(self.input.clone(), grad.mapv(|g| g / self.scalar))]
    }
}

struct ScalarDivBackward {
    input: Tensor,
    scalar: f64,
}

impl BackwardOp for ScalarDivBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        // ∂(s/x)/∂x = -s/x²
        let contribution = Zip::from(grad)
            .and(self.input.data())
            .map_collect(|&g, &x| -g * self.scalar / (x * x));
        vec![(self.input.clone(), contribution)]
    }
}

// ---------------------------------------------------------------------------
// Unary and structural operations
// ---------------------------------------------------------------------------

impl Tensor {
    /// Elementwise power with a float exponent.
    pub fn powf(&self, exponent: f64) -> Tensor {
        let data = self.data().mapv(|x| x.powf(exponent));
        let rule = Box::new(PowBackward {
            base: self.clone(),
            exponent,
        });
        Tensor::derived(data, Op::Pow, &[self], rule)
    }

    /// Elementwise power with an integer exponent.
    pub fn powi(&self, exponent: i32) -> Tensor {
        let data = self.data().mapv(|x| x.powi(exponent));
        let rule = Box::new(PowBackward {
            base: self.clone(),
            exponent: f64::from(exponent),
        });
        Tensor::derived(data, Op::Pow, &[self], rule)
    }

    /// Matrix multiplication with shape-dependent semantics: 2-D×2-D matrix
    /// product, 2-D×1-D matrix-vector, 1-D×2-D vector-matrix, and 1-D×1-D
    /// dot product (scalar result).
    ///
    /// A rank-0 operand is rejected: multiplying by a scalar-valued tensor
    /// belongs to `*`, not `matmul`. Ranks above 2 are unsupported.
    pub fn matmul(&self, rhs: &Tensor) -> Result<Tensor> {
        let (a, b) = (self.data(), rhs.data());
        if a.ndim() == 0 || b.ndim() == 0 {
            return Err(TensorError::MatmulScalarOperand);
        }
        if a.ndim() > 2 || b.ndim() > 2 {
            return Err(TensorError::MatmulUnsupportedRank(a.ndim().max(b.ndim())));
        }
        if a.shape()[a.ndim() - 1] != b.shape()[0] {
            return Err(TensorError::MatmulShapeMismatch {
                lhs: a.shape().to_vec(),
                rhs: b.shape().to_vec(),
            });
        }
        let data = match (a.ndim(), b.ndim()) {
            (1, 1) => ArrayD::from_elem(IxDyn(&[]), view1(a).dot(&view1(b))),
            (2, 1) => view2(a).dot(&view1(b)).into_dyn(),
            (1, 2) => view1(a).dot(&view2(b)).into_dyn(),
            _ => view2(a).dot(&view2(b)).into_dyn(),
        };
        let rule = Box::new(MatmulBackward {
            lhs: self.clone(),
            rhs: rhs.clone(),
        });
        Ok(Tensor::derived(data, Op::Matmul, &[self, rhs], rule))
    }

    /// Sum over all axes, producing a scalar tensor.
    pub fn sum(&self) -> Tensor {
        let data = ArrayD::from_elem(IxDyn(&[]), self.data().sum());
        let rule = Box::new(SumBackward {
            input: self.clone(),
            axes: None,
        });
        Tensor::derived(data, Op::Sum, &[self], rule)
    }

    /// Sum over one axis (no keep-dims).
    ///
    /// # Panics
    ///
    /// Panics if `axis` is out of range.
    pub fn sum_axis(&self, axis: usize) -> Tensor {
        self.sum_axes(&[axis])
    }

    /// Sum over several axes (no keep-dims).
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range or duplicate axis.
    pub fn sum_axes(&self, axes: &[usize]) -> Tensor {
        let mut sorted = axes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), axes.len(), "duplicate reduction axis");
        for &axis in &sorted {
            assert!(
                axis < self.ndim(),
                "reduction axis {axis} out of range for rank-{} tensor",
                self.ndim()
            );
        }
        let mut data = self.data().clone();
        for &axis in sorted.iter().rev() {
            data = data.sum_axis(Axis(axis));
        }
        let rule = Box::new(SumBackward {
            input: self.clone(),
            axes: Some(sorted),
        });
        Tensor::derived(data, Op::Sum, &[self], rule)
    }

    /// Elementwise natural logarithm.
    ///
    /// Non-positive input is a caller responsibility; the result follows
    /// IEEE-754 (NaN or −inf) rather than raising.
    pub fn ln(&self) -> Tensor {
        let data = self.data().mapv(f64::ln);
        let rule = Box::new(LogBackward { input: self.clone() });
        Tensor::derived(data, Op::Log, &[self], rule)
    }

    /// Elementwise hyperbolic tangent.
    pub fn tanh(&self) -> Tensor {
        let output = self.data().mapv(f64::tanh);
        let rule = Box::new(TanhBackward {
            input: self.clone(),
            output: output.clone(),
        });
        Tensor::derived(output, Op::Tanh, &[self], rule)
    }

    /// Elementwise logistic sigmoid, `1 / (1 + e^-x)`.
    pub fn sigmoid(&self) -> Tensor {
        let output = self.data().mapv(|x| 1.0 / (1.0 + (-x).exp()));
        let rule = Box::new(SigmoidBackward {
            input: self.clone(),
            output: output.clone(),
        });
        Tensor::derived(output, Op::Sigmoid, &[self], rule)
    }

    /// Elementwise rectified linear unit, `max(0, x)`.
    pub fn relu(&self) -> Tensor {
        let data = self.data().mapv(|x| x.max(0.0));
        let rule = Box::new(ReluBackward { input: self.clone() });
        Tensor::derived(data, Op::Relu, &[self], rule)
    }

    /// Identity passthrough recorded as a graph node.
    pub fn linear(&self) -> Tensor {
        let data = self.data().clone();
        let rule = Box::new(PassthroughBackward { input: self.clone() });
        Tensor::derived(data, Op::Linear, &[self], rule)
    }

    /// Join equal-shape tensors into one higher-rank tensor along `axis`
    /// (`0 <= axis <= ndim` of the inputs).
    pub fn stack(tensors: &[Tensor], axis: usize) -> Result<Tensor> {
        let first = tensors.first().ok_or(TensorError::EmptyStack)?;
        if axis > first.ndim() {
            return Err(TensorError::StackAxisOutOfRange {
                axis,
                ndim: first.ndim(),
            });
        }
        for tensor in tensors {
            if tensor.shape() != first.shape() {
                return Err(TensorError::StackShapeMismatch {
                    expected: first.shape().to_vec(),
                    got: tensor.shape().to_vec(),
                });
            }
        }
        let views: Vec<ArrayViewD<'_, f64>> = tensors.iter().map(|t| t.data().view()).collect();
        let data = ndarray::stack(Axis(axis), &views).expect("equal shapes and a checked axis");
        let operands: Vec<&Tensor> = tensors.iter().collect();
        let rule = Box::new(StackBackward {
            inputs: tensors.to_vec(),
            axis,
        });
        Ok(Tensor::derived(data, Op::Stack, &operands, rule))
    }
}

struct PowBackward {
    base: Tensor,
    exponent: f64,
}

impl BackwardOp for PowBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        // ∂(x^n)/∂x = n·x^(n-1)
        let n = self.exponent;
        let contribution = Zip::from(grad)
            .and(self.base.data())
            .map_collect(|&g, &x| g * n * x.powf(n - 1.0));
        vec![(self.base.clone(), contribution)]
    }
}

struct MatmulBackward {
    lhs: Tensor,
    rhs: Tensor,
}

impl BackwardOp for MatmulBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        let (a, b) = (self.lhs.data(), self.rhs.data());
        // ∂L/∂A = ∂L/∂C · Bᵀ and ∂L/∂B = Aᵀ · ∂L/∂C, specialised per rank
        // case so vector operands keep their rank.
        let (to_lhs, to_rhs) = match (a.ndim(), b.ndim()) {
            (1, 1) => {
                let g = grad[IxDyn(&[])];
                (b.mapv(|x| x * g), a.mapv(|x| x * g))
            }
            (2, 1) => (
                view1(grad)
                    .insert_axis(Axis(1))
                    .dot(&view1(b).insert_axis(Axis(0)))
                    .into_dyn(),
                view2(a).t().dot(&view1(grad)).into_dyn(),
            ),
            (1, 2) => (
                view2(b).dot(&view1(grad)).into_dyn(),
                view1(a)
                    .insert_axis(Axis(1))
                    .dot(&view1(grad).insert_axis(Axis(0)))
                    .into_dyn(),
            ),
            _ => (
                view2(grad).dot(&view2(b).t()).into_dyn(),
                view2(a).t().dot(&view2(grad)).into_dyn(),
            ),
        };
        vec![(self.lhs.clone(), to_lhs), (self.rhs.clone(), to_rhs)]
    }
}

struct SumBackward {
    input: Tensor,
    /// Reduced axes in ascending order; `None` means the full reduction.
    axes: Option<Vec<usize>>,
}

impl BackwardOp for SumBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        let shape = IxDyn(self.input.shape());
        let contribution = match &self.axes {
            None => ArrayD::from_elem(shape, grad[IxDyn(&[])]),
            Some(axes) => {
                let mut expanded = grad.clone();
                for &axis in axes {
                    expanded = expanded.insert_axis(Axis(axis));
                }
                expanded
                    .broadcast(shape)
                    .expect("gradient broadcasts back over the summed axes")
                    .to_owned()
            }
        };
        vec![(self.input.clone(), contribution)]
    }
}

struct LogBackward {
    input: Tensor,
}

impl BackwardOp for LogBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        // ∂(ln x)/∂x = 1/x
        let contribution = Zip::from(grad)
            .and(self.input.data())
            .map_collect(|&g, &x| g / x);
        vec![(self.input.clone(), contribution)]
    }
}

struct TanhBackward {
    input: Tensor,
    output: ArrayD<f64>,
}

impl BackwardOp for TanhBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        // ∂tanh/∂x = 1 - tanh²(x), evaluated at the saved forward output
        let contribution = Zip::from(grad)
            .and(&self.output)
            .map_collect(|&g, &y| g * (1.0 - y * y));
        vec![(self.input.clone(), contribution)]
    }
}

struct SigmoidBackward {
    input: Tensor,
    output: ArrayD<f64>,
}

impl BackwardOp for SigmoidBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        // ∂σ/∂x = σ(x)·(1 - σ(x))
        let contribution = Zip::from(grad)
            .and(&self.output)
            .map_collect(|&g, &y| g * y * (1.0 - y));
        vec![(self.input.clone(), contribution)]
    }
}

struct ReluBackward {
    input: Tensor,
}

impl BackwardOp for ReluBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        let contribution = Zip::from(grad)
            .and(self.input.data())
            .map_collect(|&g, &x| if x > 0.0 { g } else { 0.0 });
        vec![(self.input.clone(), contribution)]
    }
}

struct StackBackward {
    inputs: Vec<Tensor>,
    axis: usize,
}

impl BackwardOp for StackBackward {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                (
                    input.clone(),
                    grad.index_axis(Axis(self.axis), i).to_owned(),
                )
            })
            .collect()
    }
}

fn view1(array: &ArrayD<f64>) -> ArrayView1<'_, f64> {
    array.view().into_dimensionality().expect("rank-1 operand")
}

fn view2(array: &ArrayD<f64>) -> ArrayView2<'_, f64> {
    array.view().into_dimensionality().expect("rank-2 operand")
}

// ---------------------------------------------------------------------------
// Operator overloads
//
// Every concrete operand ordering gets an explicit impl: tensor ⊙ tensor in
// all reference combinations, plus f64 on either side. Broadcasting
// failures panic with the corresponding `TensorError` message, matching
// ndarray's own operator convention.
// ---------------------------------------------------------------------------

macro_rules! impl_tensor_binop {
    ($trait:ident, $method:ident, $func:path) => {
        impl $trait<&Tensor> for &Tensor {
            type Output = Tensor;
            fn $method(self, rhs: &Tensor) -> Tensor {
                $func(self, rhs)
            }
        }
        impl $trait<Tensor> for &Tensor {
            type Output = Tensor;
            fn $method(self, rhs: Tensor) -> Tensor {
                $func(self, &rhs)
            }
        }
        impl $trait<&Tensor> for Tensor {
            type Output = Tensor;
            fn $method(self, rhs: &Tensor) -> Tensor {
                $func(&self, rhs)
            }
        }
        impl $trait<Tensor> for Tensor {
            type Output = Tensor;
            fn $method(self, rhs: Tensor) -> Tensor {
                $func(&self, &rhs)
            }
        }
    };
}

macro_rules! impl_scalar_binop {
    ($trait:ident, $method:ident, $tensor_scalar:path, $scalar_tensor:path) => {
        impl $trait<f64> for &Tensor {
            type Output = Tensor;
            fn $method(self, rhs: f64) -> Tensor {
                $tensor_scalar(self, rhs)
            }
        }
        impl $trait<f64> for Tensor {
            type Output = Tensor;
            fn $method(self, rhs: f64) -> Tensor {
                $tensor_scalar(&self, rhs)
            }
        }
        impl $trait<&Tensor> for f64 {
            type Output = Tensor;
            fn $method(self, rhs: &Tensor) -> Tensor {
                $scalar_tensor(self, rhs)
            }
        }
        impl $trait<Tensor> for f64 {
            type Output = Tensor;
            fn $method(self, rhs: Tensor) -> Tensor {
                $scalar_tensor(self, &rhs)
            }
        }
    };
}

impl_tensor_binop!(Add, add, self::add);
impl_tensor_binop!(Sub, sub, self::sub);
impl_tensor_binop!(Mul, mul, self::mul);
impl_tensor_binop!(Div, div, self::div);

fn scalar_add(scalar: f64, rhs: &Tensor) -> Tensor {
    add_scalar(rhs, scalar)
}

fn scalar_mul(scalar: f64, rhs: &Tensor) -> Tensor {
    mul_scalar(rhs, scalar)
}

impl_scalar_binop!(Add, add, self::add_scalar, self::scalar_add);
impl_scalar_binop!(Sub, sub, self::sub_scalar, self::scalar_sub);
impl_scalar_binop!(Mul, mul, self::mul_scalar, self::scalar_mul);
impl_scalar_binop!(Div, div, self::div_scalar, self::scalar_div);

// Negation routes through the scalar-multiply machinery: `-t` is a `Mult`
// node with the original tensor as its single child, not a separate tag.
impl Neg for &Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        mul_scalar(self, -1.0)
    }
}

impl Neg for Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        mul_scalar(&self, -1.0)
    }
}
