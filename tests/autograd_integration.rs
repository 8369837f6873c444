//! Integration tests for the autograd engine and the network layer built
//! on top of it.

use gradiente::nn::{Activation, Layer, MLP, Neuron};
use gradiente::{backward, Op, Tensor};
use ndarray::{arr1, arr2, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_graph_provenance() {
    let a = Tensor::with_label(arr1(&[1.0, 2.0]).into_dyn(), "a");
    let b = Tensor::with_label(arr1(&[3.0, 4.0]).into_dyn(), "b");
    let c = &a * &b;
    let d = &c + &a;

    assert_eq!(c.op(), Op::Mult);
    assert_eq!(d.op(), Op::Add);
    assert_eq!(d.children().len(), 2);
    assert!(d.children().iter().any(|t| t.is(&c)));
    assert!(d.children().iter().any(|t| t.is(&a)));
    assert_eq!(a.label(), Some("a"));
}

#[test]
fn test_reused_subexpression_accumulation() {
    // L = sum(u + u²) with u = x*y: u feeds two consumers, so its gradient
    // accumulates before flowing on to x and y.
    let x = Tensor::from(arr1(&[2.0]));
    let y = Tensor::from(arr1(&[3.0]));
    let u = &x * &y;
    let loss = (&u + u.powi(2)).sum();
    backward(&loss, None);

    // dL/du = 1 + 2u = 13, dL/dx = 13·y, dL/dy = 13·x
    assert_eq!(u.grad().unwrap(), arr1(&[13.0]).into_dyn());
    assert_eq!(x.grad().unwrap(), arr1(&[39.0]).into_dyn());
    assert_eq!(y.grad().unwrap(), arr1(&[26.0]).into_dyn());
}

#[test]
fn test_backward_accumulates_until_reset() {
    let x = Tensor::from(arr1(&[1.0, 2.0]));
    let loss = (&x * &x).sum();

    backward(&loss, None);
    assert_eq!(x.grad().unwrap(), arr1(&[2.0, 4.0]).into_dyn());

    backward(&loss, None);
    assert_eq!(x.grad().unwrap(), arr1(&[4.0, 8.0]).into_dyn());

    x.zero_grad();
    loss.zero_grad();
    backward(&loss, None);
    assert_eq!(x.grad().unwrap(), arr1(&[2.0, 4.0]).into_dyn());
}

#[test]
fn test_broadcast_forward_and_backward() {
    // [batch, features] * [1, features] mirrors a parameterised layer
    let batch = Tensor::from(arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]));
    let weights = Tensor::from(arr2(&[[10.0, 100.0]]));
    let loss = (&batch * &weights).sum();
    backward(&loss, None);

    assert_eq!(loss.shape(), &[] as &[usize]);
    assert_eq!(weights.grad().unwrap(), arr2(&[[9.0, 12.0]]).into_dyn());
    assert_eq!(
        batch.grad().unwrap(),
        arr2(&[[10.0, 100.0], [10.0, 100.0], [10.0, 100.0]]).into_dyn()
    );
}

#[test]
fn test_stack_gradient_routing() {
    let t1 = Tensor::from(arr1(&[1.0, 2.0]));
    let t2 = Tensor::from(arr1(&[3.0, 4.0]));
    let stacked = Tensor::stack(&[t1.clone(), t2.clone()], 1).unwrap();
    assert_eq!(stacked.shape(), &[2, 2]);

    backward(&stacked.sum(), None);
    assert_eq!(t1.grad().unwrap(), ArrayD::ones(IxDyn(&[2])));
    assert_eq!(t2.grad().unwrap(), ArrayD::ones(IxDyn(&[2])));
}

#[test]
fn test_mlp_end_to_end() {
    let mut rng = StdRng::seed_from_u64(7);
    let mlp = MLP::new(
        3,
        &[(4, Activation::Tanh), (1, Activation::Sigmoid)],
        &mut rng,
    );

    let x = Tensor::from(arr2(&[[0.5, -1.0, 2.0], [1.5, 0.0, -0.5]]));
    let out = mlp.forward(&x);
    assert_eq!(out.shape(), &[2, 1]);
    // Sigmoid output stays in (0, 1)
    assert!(out.data().iter().all(|&v| v > 0.0 && v < 1.0));

    let loss = out.sum();
    backward(&loss, None);
    for param in mlp.parameters() {
        let grad = param.grad().expect("every parameter receives a gradient");
        assert_eq!(grad.shape(), param.shape());
    }
}

#[test]
fn test_neuron_broadcastable_input() {
    let mut rng = StdRng::seed_from_u64(11);
    let neuron = Neuron::new(4, Activation::Relu, &mut rng);

    let single = Tensor::from(arr1(&[1.0, -2.0, 0.5, 3.0]));
    assert_eq!(neuron.forward(&single).shape(), &[1]);

    let batch = Tensor::from(arr2(&[[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]]));
    assert_eq!(neuron.forward(&batch).shape(), &[2]);
}

#[test]
fn test_layer_stacked_output() {
    let mut rng = StdRng::seed_from_u64(3);
    let layer = Layer::new(2, 3, Activation::Linear, &mut rng);
    let x = Tensor::from(arr2(&[[1.0, 2.0], [3.0, 4.0]]));
    let out = layer.forward(&x);
    assert_eq!(out.shape(), &[2, 3]);
    assert_eq!(out.op(), Op::Stack);
}

#[test]
fn test_training_step_decreases_loss() {
    // One manual gradient-descent step over a tiny regression target:
    // exercises forward, backward, and gradient reset together.
    let mut rng = StdRng::seed_from_u64(5);
    let neuron = Neuron::new(2, Activation::Linear, &mut rng);
    let x = Tensor::from(arr2(&[[1.0, 0.0], [0.0, 1.0]]));
    let target = Tensor::from(arr1(&[1.0, -1.0]));

    let error = neuron.forward(&x) - &target;
    let loss = error.powi(2).sum();
    backward(&loss, None);
    let first_loss = loss.data()[IxDyn(&[])];

    let params = neuron.parameters();
    let updated: Vec<Tensor> = params
        .iter()
        .map(|p| {
            let step = p.grad().unwrap() * 0.1;
            Tensor::new(p.data() - &step)
        })
        .collect();

    // Rebuild the forward pass with the updated parameters
    let error = (&updated[0] * &x).sum_axis(1) + &updated[1] - &target;
    let second_loss = error.powi(2).sum().data()[IxDyn(&[])];
    assert!(second_loss < first_loss);
}
