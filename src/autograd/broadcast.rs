//! Shape rules for broadcasting and for reducing gradients back across it

use crate::error::{Result, TensorError};
use ndarray::{ArrayD, Axis, IxDyn, Zip};

/// Compute the broadcast shape of two operand shapes under numpy alignment
/// rules: shapes are right-aligned and each dimension pair must be equal or
/// contain a 1.
pub(crate) fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
    let ndim = lhs.len().max(rhs.len());
    let mut shape = vec![0; ndim];
    for i in 0..ndim {
        let l = if i < ndim - lhs.len() { 1 } else { lhs[i - (ndim - lhs.len())] };
        let r = if i < ndim - rhs.len() { 1 } else { rhs[i - (ndim - rhs.len())] };
        shape[i] = if l == r || r == 1 {
            l
        } else if l == 1 {
            r
        } else {
            return Err(TensorError::BroadcastMismatch {
                lhs: lhs.to_vec(),
                rhs: rhs.to_vec(),
            });
        };
    }
    Ok(shape)
}

/// Broadcast both operands to their common shape and combine elementwise.
pub(crate) fn broadcast_values<F>(a: &ArrayD<f64>, b: &ArrayD<f64>, f: F) -> Result<ArrayD<f64>>
where
    F: Fn(f64, f64) -> f64,
{
    let shape = broadcast_shape(a.shape(), b.shape())?;
    let dim = IxDyn(&shape);
    let (Some(lhs), Some(rhs)) = (a.broadcast(dim.clone()), b.broadcast(dim)) else {
        return Err(TensorError::BroadcastMismatch {
            lhs: a.shape().to_vec(),
            rhs: b.shape().to_vec(),
        });
    };
    Ok(Zip::from(&lhs).and(&rhs).map_collect(|&x, &y| f(x, y)))
}

/// Infallible form of [`broadcast_values`] for operator overloads and
/// backward rules, where incompatible shapes are a caller bug or a broken
/// graph invariant.
///
/// # Panics
///
/// Panics with the broadcast error message if the shapes are incompatible.
pub(crate) fn broadcast_apply<F>(a: &ArrayD<f64>, b: &ArrayD<f64>, f: F) -> ArrayD<f64>
where
    F: Fn(f64, f64) -> f64,
{
    broadcast_values(a, b, f).unwrap_or_else(|e| panic!("{e}"))
}

/// Reduce a gradient back down to an operand's pre-broadcast shape by
/// summing over the broadcast axes, inverting the forward broadcast.
///
/// Leading axes the operand never had are summed away entirely; axes where
/// the operand had size 1 are summed but kept.
pub(crate) fn reduce_to_shape(grad: ArrayD<f64>, shape: &[usize]) -> ArrayD<f64> {
    let mut grad = grad;
    while grad.ndim() > shape.len() {
        grad = grad.sum_axis(Axis(0));
    }
    for (i, &dim) in shape.iter().enumerate() {
        if dim == 1 && grad.shape()[i] != 1 {
            grad = grad.sum_axis(Axis(i)).insert_axis(Axis(i));
        }
    }
    grad
}
