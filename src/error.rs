//! Error types for gradiente

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("shapes {lhs:?} and {rhs:?} are not broadcast-compatible")]
    BroadcastMismatch { lhs: Vec<usize>, rhs: Vec<usize> },

    #[error("matmul operand must have rank 1 or 2, got a scalar (rank 0)")]
    MatmulScalarOperand,

    #[error("matmul operand must have rank 1 or 2, got rank {0}")]
    MatmulUnsupportedRank(usize),

    #[error("matmul dimension mismatch: {lhs:?} @ {rhs:?}")]
    MatmulShapeMismatch { lhs: Vec<usize>, rhs: Vec<usize> },

    #[error("cannot stack tensors with differing shapes: expected {expected:?}, got {got:?}")]
    StackShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("cannot stack an empty sequence of tensors")]
    EmptyStack,

    #[error("stack axis {axis} out of range for rank-{ndim} inputs")]
    StackAxisOutOfRange { axis: usize, ndim: usize },
}

pub type Result<T> = std::result::Result<T, TensorError>;
