//! Reverse-topological gradient propagation

use super::tensor::Tensor;
use ndarray::{ArrayD, IxDyn};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// Local backward rule of the operation that produced a node: maps the
/// node's incoming gradient to one contribution per operand. The set of
/// operations is closed, so rules live alongside their forward ops rather
/// than behind an open registration mechanism.
pub(crate) trait BackwardOp {
    fn backward(&self, grad: &ArrayD<f64>) -> Vec<(Tensor, ArrayD<f64>)>;
}

/// Propagate gradients from `root` back through the computation graph.
///
/// The reachable graph is walked once in reverse topological order; each
/// node is visited exactly once no matter how many consumers reference it.
/// The root's flow is seeded with `seed` when given, otherwise with ones of
/// the root's shape. Every visited node has the pass's flow *added* into
/// its gradient accumulator, so repeated calls without
/// [`Tensor::zero_grad`] accumulate one further full pass each time.
///
/// # Panics
///
/// Panics if `seed` does not match the root's shape.
pub fn backward(root: &Tensor, seed: Option<ArrayD<f64>>) {
    let seed = seed.unwrap_or_else(|| ArrayD::ones(IxDyn(root.shape())));
    assert_eq!(
        seed.shape(),
        root.shape(),
        "backward seed must match the root tensor's shape"
    );

    // Per-call flow is kept separate from the persistent accumulators so a
    // second pass never re-propagates gradients stored by the first.
    let mut flow: HashMap<usize, ArrayD<f64>> = HashMap::new();
    flow.insert(root.node_id(), seed);

    let order = topo_order(root);
    for node in order.iter().rev() {
        let Some(grad) = flow.remove(&node.node_id()) else {
            continue;
        };
        if let Some(rule) = node.backward_rule() {
            for (child, contribution) in rule.backward(&grad) {
                match flow.entry(child.node_id()) {
                    Entry::Occupied(mut entry) => *entry.get_mut() += &contribution,
                    Entry::Vacant(entry) => {
                        entry.insert(contribution);
                    }
                }
            }
        }
        node.accumulate_grad(grad);
    }
}

/// Postorder over the DAG reachable from `root` via children edges:
/// children always precede their consumers. Iterative so deep op chains
/// cannot overflow the call stack.
fn topo_order(root: &Tensor) -> Vec<Tensor> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root.clone(), false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.node_id()) {
            continue;
        }
        stack.push((node.clone(), true));
        for child in node.children() {
            stack.push((child.clone(), false));
        }
    }
    order
}
