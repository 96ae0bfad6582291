//! Reverse-mode autodiff over [`Mat`].
//!
//! Each forward op appends a record to the tape and allocates its output in
//! the graph's node arena. `backward` replays the tape in reverse and
//! accumulates gradients into the node arena and into the parameter set the
//! forward pass read from.

use super::tensor::{Mat, Net};

/// Reference to a matrix taking part in a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    /// Parameter `i` of the [`Net`] passed to the ops.
    Param(usize),
    /// Node `i` of this graph.
    Node(usize),
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Mul { a: Handle, b: Handle, out: usize },
    Add { a: Handle, b: Handle, out: usize },
    EltMul { a: Handle, b: Handle, out: usize },
    Tanh { a: Handle, out: usize },
    Sigmoid { a: Handle, out: usize },
    Relu { a: Handle, out: usize },
    RowPluck { m: Handle, row: usize, out: usize },
}

#[derive(Debug, Default)]
pub struct Graph {
    needs_backprop: bool,
    nodes: Vec<Mat>,
    tape: Vec<Op>,
}

fn mat<'a>(nodes: &'a [Mat], net: &'a Net, h: Handle) -> &'a Mat {
    match h {
        Handle::Param(i) => net.param(i),
        Handle::Node(i) => &nodes[i],
    }
}

fn grad_of<'a>(nodes: &'a mut [Mat], net: &'a mut Net, h: Handle) -> &'a mut Vec<f64> {
    match h {
        Handle::Param(i) => &mut net.param_mut(i).dw,
        Handle::Node(i) => &mut nodes[i].dw,
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Graph {
    /// A graph that records nothing when `needs_backprop` is false.
    pub fn new(needs_backprop: bool) -> Self {
        Self {
            needs_backprop,
            nodes: Vec::new(),
            tape: Vec::new(),
        }
    }

    pub fn input(&mut self, m: Mat) -> Handle {
        self.nodes.push(m);
        Handle::Node(self.nodes.len() - 1)
    }

    pub fn value<'a>(&'a self, net: &'a Net, h: Handle) -> &'a Mat {
        mat(&self.nodes, net, h)
    }

    /// Gradient buffer of an intermediate node, for seeding `backward`.
    pub fn grad_mut(&mut self, h: Handle) -> &mut [f64] {
        match h {
            Handle::Node(i) => &mut self.nodes[i].dw,
            Handle::Param(_) => panic!("Graph::grad_mut: parameters take gradients from backward"),
        }
    }

    fn push(&mut self, out: Mat, op: impl FnOnce(usize) -> Op) -> Handle {
        self.nodes.push(out);
        let idx = self.nodes.len() - 1;
        if self.needs_backprop {
            self.tape.push(op(idx));
        }
        Handle::Node(idx)
    }

    /// Matrix product `a · b`.
    pub fn mul(&mut self, net: &Net, a: Handle, b: Handle) -> Handle {
        let (ma, mb) = (mat(&self.nodes, net, a), mat(&self.nodes, net, b));
        assert_eq!(ma.d, mb.n, "Graph::mul: {}x{} · {}x{}", ma.n, ma.d, mb.n, mb.d);
        let mut out = Mat::new(ma.n, mb.d);
        for i in 0..ma.n {
            for j in 0..mb.d {
                let mut dot = 0.0;
                for k in 0..ma.d {
                    dot += ma.w[i * ma.d + k] * mb.w[k * mb.d + j];
                }
                out.w[i * mb.d + j] = dot;
            }
        }
        self.push(out, |out| Op::Mul { a, b, out })
    }

    pub fn add(&mut self, net: &Net, a: Handle, b: Handle) -> Handle {
        let (ma, mb) = (mat(&self.nodes, net, a), mat(&self.nodes, net, b));
        assert_eq!(ma.w.len(), mb.w.len(), "Graph::add: shape mismatch");
        let mut out = Mat::new(ma.n, ma.d);
        for (o, (x, y)) in out.w.iter_mut().zip(ma.w.iter().zip(&mb.w)) {
            *o = x + y;
        }
        self.push(out, |out| Op::Add { a, b, out })
    }

    /// Element-wise product.
    pub fn eltmul(&mut self, net: &Net, a: Handle, b: Handle) -> Handle {
        let (ma, mb) = (mat(&self.nodes, net, a), mat(&self.nodes, net, b));
        assert_eq!(ma.w.len(), mb.w.len(), "Graph::eltmul: shape mismatch");
        let mut out = Mat::new(ma.n, ma.d);
        for (o, (x, y)) in out.w.iter_mut().zip(ma.w.iter().zip(&mb.w)) {
            *o = x * y;
        }
        self.push(out, |out| Op::EltMul { a, b, out })
    }

    fn map(&self, net: &Net, a: Handle, f: impl Fn(f64) -> f64) -> Mat {
        let ma = mat(&self.nodes, net, a);
        let mut out = Mat::new(ma.n, ma.d);
        for (o, &x) in out.w.iter_mut().zip(&ma.w) {
            *o = f(x);
        }
        out
    }

    pub fn tanh(&mut self, net: &Net, a: Handle) -> Handle {
        let out = self.map(net, a, f64::tanh);
        self.push(out, |out| Op::Tanh { a, out })
    }

    pub fn sigmoid(&mut self, net: &Net, a: Handle) -> Handle {
        let out = self.map(net, a, sigmoid);
        self.push(out, |out| Op::Sigmoid { a, out })
    }

    pub fn relu(&mut self, net: &Net, a: Handle) -> Handle {
        let out = self.map(net, a, |x| x.max(0.0));
        self.push(out, |out| Op::Relu { a, out })
    }

    /// Row `row` of `m` as a column vector.
    pub fn row_pluck(&mut self, net: &Net, m: Handle, row: usize) -> Handle {
        let mm = mat(&self.nodes, net, m);
        assert!(row < mm.n, "Graph::row_pluck: row {} of {}", row, mm.n);
        let out = Mat::column(&mm.w[row * mm.d..(row + 1) * mm.d]);
        self.push(out, |out| Op::RowPluck { m, row, out })
    }

    /// Propagates the seeded output gradients back to every input, in
    /// reverse tape order. Parameter gradients accumulate into `net`.
    pub fn backward(&mut self, net: &mut Net) {
        for op in self.tape.iter().rev().copied() {
            match op {
                Op::Mul { a, b, out } => {
                    let g = self.nodes[out].dw.clone();
                    let ma = mat(&self.nodes, net, a).clone();
                    let mb = mat(&self.nodes, net, b).clone();
                    {
                        let da = grad_of(&mut self.nodes, net, a);
                        for i in 0..ma.n {
                            for j in 0..mb.d {
                                let go = g[i * mb.d + j];
                                for k in 0..ma.d {
                                    da[i * ma.d + k] += mb.w[k * mb.d + j] * go;
                                }
                            }
                        }
                    }
                    let db = grad_of(&mut self.nodes, net, b);
                    for i in 0..ma.n {
                        for j in 0..mb.d {
                            let go = g[i * mb.d + j];
                            for k in 0..ma.d {
                                db[k * mb.d + j] += ma.w[i * ma.d + k] * go;
                            }
                        }
                    }
                }
                Op::Add { a, b, out } => {
                    let g = self.nodes[out].dw.clone();
                    for h in [a, b] {
                        let d = grad_of(&mut self.nodes, net, h);
                        for (di, gi) in d.iter_mut().zip(&g) {
                            *di += gi;
                        }
                    }
                }
                Op::EltMul { a, b, out } => {
                    let g = self.nodes[out].dw.clone();
                    let wa = mat(&self.nodes, net, a).w.clone();
                    let wb = mat(&self.nodes, net, b).w.clone();
                    {
                        let da = grad_of(&mut self.nodes, net, a);
                        for i in 0..g.len() {
                            da[i] += wb[i] * g[i];
                        }
                    }
                    let db = grad_of(&mut self.nodes, net, b);
                    for i in 0..g.len() {
                        db[i] += wa[i] * g[i];
                    }
                }
                Op::Tanh { a, out } => {
                    let o = self.nodes[out].clone();
                    let da = grad_of(&mut self.nodes, net, a);
                    for i in 0..o.w.len() {
                        da[i] += (1.0 - o.w[i] * o.w[i]) * o.dw[i];
                    }
                }
                Op::Sigmoid { a, out } => {
                    let o = self.nodes[out].clone();
                    let da = grad_of(&mut self.nodes, net, a);
                    for i in 0..o.w.len() {
                        da[i] += o.w[i] * (1.0 - o.w[i]) * o.dw[i];
                    }
                }
                Op::Relu { a, out } => {
                    let g = self.nodes[out].dw.clone();
                    let wa = mat(&self.nodes, net, a).w.clone();
                    let da = grad_of(&mut self.nodes, net, a);
                    for i in 0..g.len() {
                        if wa[i] > 0.0 {
                            da[i] += g[i];
                        }
                    }
                }
                Op::RowPluck { m, row, out } => {
                    let g = self.nodes[out].dw.clone();
                    let d = g.len();
                    let dm = grad_of(&mut self.nodes, net, m);
                    for j in 0..d {
                        dm[row * d + j] += g[j];
                    }
                }
            }
        }
    }
}

/// Forward pass of the two-layer perceptron built by [`Net::mlp`]:
/// `W2 · tanh(W1 · x + b1) + b2`.
/// Parameters are looked up by name; a net without those names is read
/// positionally in `W1, b1, W2, b2` order.
pub fn mlp_forward(graph: &mut Graph, net: &Net, input: Handle) -> Handle {
    let param = |name: &str, fallback: usize| Handle::Param(net.index_of(name).unwrap_or(fallback));
    let h0 = graph.mul(net, param("W1", 0), input);
    let h1 = graph.add(net, h0, param("b1", 1));
    let hidden = graph.tanh(net, h1);
    let o0 = graph.mul(net, param("W2", 2), hidden);
    graph.add(net, o0, param("b2", 3))
}

/// Convenience: evaluates [`mlp_forward`] without recording a tape.
pub fn mlp_predict(net: &Net, x: &[f64]) -> Vec<f64> {
    let mut graph = Graph::new(false);
    let input = graph.input(Mat::column(x));
    let out = mlp_forward(&mut graph, net, input);
    graph.value(net, out).w.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Loss = sum of (output · weights) for a fixed weighting, so the seed
    /// gradient is simply `weights`.
    fn loss(net: &Net, x: &[f64], weights: &[f64]) -> f64 {
        mlp_predict(net, x)
            .iter()
            .zip(weights)
            .map(|(o, w)| o * w)
            .sum()
    }

    #[test]
    fn test_mlp_gradient_matches_finite_differences() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut net = Net::mlp(3, 4, 2, 0.5, &mut rng);
        let x = [0.3, -0.7, 0.2];
        let weights = [1.0, -2.0];

        let mut graph = Graph::new(true);
        let input = graph.input(Mat::column(&x));
        let out = mlp_forward(&mut graph, &net, input);
        graph.grad_mut(out).copy_from_slice(&weights);
        graph.backward(&mut net);

        let eps = 1e-6;
        for p in 0..net.len() {
            for i in 0..net.param(p).len() {
                let analytic = net.param(p).dw[i];
                let orig = net.param(p).w[i];
                net.param_mut(p).w[i] = orig + eps;
                let up = loss(&net, &x, &weights);
                net.param_mut(p).w[i] = orig - eps;
                let down = loss(&net, &x, &weights);
                net.param_mut(p).w[i] = orig;
                let numeric = (up - down) / (2.0 * eps);
                assert!(
                    (analytic - numeric).abs() < 1e-6,
                    "param {} index {}: analytic {} numeric {}",
                    p,
                    i,
                    analytic,
                    numeric
                );
            }
        }
    }

    #[test]
    fn test_sigmoid_relu_eltmul_gradients() {
        let mut net = Net::new();
        net.push("a", Mat::from_vec(2, 1, vec![0.5, -1.5]));
        net.push("b", Mat::from_vec(2, 1, vec![2.0, 3.0]));

        let mut graph = Graph::new(true);
        let s = graph.sigmoid(&net, Handle::Param(0));
        let r = graph.relu(&net, Handle::Param(1));
        let out = graph.eltmul(&net, s, r);
        graph.grad_mut(out).copy_from_slice(&[1.0, 1.0]);
        graph.backward(&mut net);

        let sig = |x: f64| 1.0 / (1.0 + (-x).exp());
        let da0 = sig(0.5) * (1.0 - sig(0.5)) * 2.0;
        assert!((net.param(0).dw[0] - da0).abs() < 1e-12);
        assert!((net.param(1).dw[1] - sig(-1.5)).abs() < 1e-12);
    }

    #[test]
    fn test_row_pluck_routes_gradient_to_row() {
        let mut net = Net::new();
        net.push("emb", Mat::from_vec(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let mut graph = Graph::new(true);
        let row = graph.row_pluck(&net, Handle::Param(0), 1);
        assert_eq!(graph.value(&net, row).w, vec![3.0, 4.0]);
        graph.grad_mut(row).copy_from_slice(&[0.5, -0.5]);
        graph.backward(&mut net);
        assert_eq!(net.param(0).dw, vec![0.0, 0.0, 0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_no_backprop_graph_leaves_gradients_alone() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut net = Net::mlp(2, 2, 2, 1.0, &mut rng);
        let mut graph = Graph::new(false);
        let input = graph.input(Mat::column(&[1.0, 1.0]));
        let out = mlp_forward(&mut graph, &net, input);
        graph.grad_mut(out).copy_from_slice(&[1.0, 1.0]);
        graph.backward(&mut net);
        assert!(net.iter().all(|(_, m)| m.dw.iter().all(|&g| g == 0.0)));
    }
}
