//! Dense matrices with gradient buffers, and named parameter sets.

use anyhow::{ensure, Result};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Row-major `n × d` matrix. `dw` accumulates gradients and is never
/// serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatData", into = "MatData")]
pub struct Mat {
    pub n: usize,
    pub d: usize,
    pub w: Vec<f64>,
    pub dw: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct MatData {
    n: usize,
    d: usize,
    w: Vec<f64>,
}

impl TryFrom<MatData> for Mat {
    type Error = String;

    fn try_from(data: MatData) -> Result<Self, Self::Error> {
        if data.w.len() != data.n * data.d {
            return Err(format!(
                "matrix {}x{} carries {} weights",
                data.n,
                data.d,
                data.w.len()
            ));
        }
        Ok(Mat::from_vec(data.n, data.d, data.w))
    }
}

impl From<Mat> for MatData {
    fn from(m: Mat) -> Self {
        MatData {
            n: m.n,
            d: m.d,
            w: m.w,
        }
    }
}

impl Mat {
    pub fn new(n: usize, d: usize) -> Self {
        Self {
            n,
            d,
            w: vec![0.0; n * d],
            dw: vec![0.0; n * d],
        }
    }

    pub fn from_vec(n: usize, d: usize, w: Vec<f64>) -> Self {
        assert_eq!(w.len(), n * d, "Mat::from_vec: {}x{} needs {} values", n, d, n * d);
        Self {
            n,
            d,
            dw: vec![0.0; w.len()],
            w,
        }
    }

    /// Column vector holding `values`.
    pub fn column(values: &[f64]) -> Self {
        Self::from_vec(values.len(), 1, values.to_vec())
    }

    /// Gaussian-initialized matrix with mean `mu` and standard deviation `std`.
    pub fn random<R: Rng + ?Sized>(n: usize, d: usize, mu: f64, std: f64, rng: &mut R) -> Self {
        let w = (0..n * d)
            .map(|_| {
                let z: f64 = rng.sample(StandardNormal);
                mu + std * z
            })
            .collect();
        Self::from_vec(n, d, w)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        debug_assert!(row < self.n && col < self.d);
        self.w[row * self.d + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, v: f64) {
        debug_assert!(row < self.n && col < self.d);
        self.w[row * self.d + col] = v;
    }

    pub fn len(&self) -> usize {
        self.w.len()
    }

    pub fn is_empty(&self) -> bool {
        self.w.is_empty()
    }

    pub fn zero_grad(&mut self) {
        self.dw.iter_mut().for_each(|g| *g = 0.0);
    }

    pub fn is_finite(&self) -> bool {
        self.w.iter().all(|v| v.is_finite())
    }

    /// Index of the largest weight; first wins on ties.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &v) in self.w.iter().enumerate() {
            if v > self.w[best] {
                best = i;
            }
        }
        best
    }
}

/// Ordered set of named parameter matrices.
///
/// Order is significant: it fixes the layout of flattened genes and of the
/// solver caches. Serializes as a JSON object `{name: {n, d, w}}` in
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Net {
    params: Vec<(String, Mat)>,
}

impl Net {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two-layer perceptron `W1 (nh×ns), b1, W2 (na×nh), b2`, weights drawn
    /// from `N(0, std²)`, biases zero.
    pub fn mlp<R: Rng + ?Sized>(ns: usize, nh: usize, na: usize, std: f64, rng: &mut R) -> Self {
        let mut net = Self::new();
        net.push("W1", Mat::random(nh, ns, 0.0, std, rng));
        net.push("b1", Mat::new(nh, 1));
        net.push("W2", Mat::random(na, nh, 0.0, std, rng));
        net.push("b2", Mat::new(na, 1));
        net
    }

    pub fn push(&mut self, name: impl Into<String>, mat: Mat) {
        let name = name.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = mat,
            None => self.params.push((name, mat)),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Mat> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Mat> {
        self.params.iter_mut().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    #[inline]
    pub fn param(&self, i: usize) -> &Mat {
        &self.params[i].1
    }

    #[inline]
    pub fn param_mut(&mut self, i: usize) -> &mut Mat {
        &mut self.params[i].1
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Mat)> {
        self.params.iter().map(|(n, m)| (n.as_str(), m))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Mat)> {
        self.params.iter_mut().map(|(n, m)| (n.as_str(), m))
    }

    pub fn zero_grads(&mut self) {
        for (_, m) in &mut self.params {
            m.zero_grad();
        }
    }

    pub fn is_finite(&self) -> bool {
        self.params.iter().all(|(_, m)| m.is_finite())
    }

    pub fn num_weights(&self) -> usize {
        self.params.iter().map(|(_, m)| m.len()).sum()
    }

    /// All weights concatenated in parameter order.
    pub fn flatten(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.num_weights());
        for (_, m) in &self.params {
            out.extend_from_slice(&m.w);
        }
        out
    }

    /// Inverse of [`Net::flatten`].
    pub fn load_flat(&mut self, gene: &[f64]) -> Result<()> {
        ensure!(
            gene.len() == self.num_weights(),
            "gene has {} values, network has {} weights",
            gene.len(),
            self.num_weights()
        );
        let mut offset = 0;
        for (_, m) in &mut self.params {
            let len = m.w.len();
            m.w.copy_from_slice(&gene[offset..offset + len]);
            offset += len;
        }
        Ok(())
    }

    /// Checks that every parameter here exists in `other` under the same
    /// name and shape. Parameter order is ignored.
    pub fn same_shape(&self, other: &Net) -> bool {
        self.params.len() == other.params.len()
            && self.params.iter().all(|(name, a)| {
                other
                    .get(name)
                    .is_some_and(|b| a.n == b.n && a.d == b.d)
            })
    }

    /// Returns this net with its parameters in `template`'s order, or `None`
    /// when the two do not have the same named shapes.
    pub fn arranged_like(mut self, template: &Net) -> Option<Net> {
        if !template.same_shape(&self) {
            return None;
        }
        let mut params = Vec::with_capacity(template.params.len());
        for (name, _) in &template.params {
            let i = self.index_of(name)?;
            params.push(self.params.swap_remove(i));
        }
        Some(Net { params })
    }
}

impl Serialize for Net {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.params.len()))?;
        for (name, mat) in &self.params {
            map.serialize_entry(name, mat)?;
        }
        map.end()
    }
}

struct NetVisitor;

impl<'de> Visitor<'de> for NetVisitor {
    type Value = Net;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of parameter name to {n, d, w}")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Net, A::Error> {
        let mut net = Net::new();
        while let Some((name, mat)) = access.next_entry::<String, Mat>()? {
            net.push(name, mat);
        }
        Ok(net)
    }
}

impl<'de> Deserialize<'de> for Net {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Net, D::Error> {
        deserializer.deserialize_map(NetVisitor)
    }
}
