//! Parameter trees: named real or complex tensors with a fixed flattening.

use std::collections::BTreeMap;
use std::ops::Index;

use nalgebra::DVector;
use num_complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Element type declared by a parameter tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamDtype {
    Real,
    Complex,
    /// Both real and complex leaves.
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    Real(Vec<f64>),
    Complex(Vec<Complex64>),
}

/// Dense row-major tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl Tensor {
    pub fn real(shape: Vec<usize>, values: Vec<f64>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), values.len());
        Self { shape, data: TensorData::Real(values) }
    }

    pub fn complex(shape: Vec<usize>, values: Vec<Complex64>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), values.len());
        Self { shape, data: TensorData::Complex(values) }
    }

    /// Normal initializer. Complex entries split the variance evenly between
    /// real and imaginary parts.
    pub fn normal<R: Rng + ?Sized>(shape: Vec<usize>, std: f64, complex: bool, rng: &mut R) -> Self {
        let n = shape.iter().product::<usize>();
        if complex {
            let s = std / 2f64.sqrt();
            let values = (0..n)
                .map(|_| {
                    let re: f64 = StandardNormal.sample(rng);
                    let im: f64 = StandardNormal.sample(rng);
                    Complex64::new(s * re, s * im)
                })
                .collect();
            Self::complex(shape, values)
        } else {
            let values = (0..n)
                .map(|_| {
                    let z: f64 = StandardNormal.sample(rng);
                    std * z
                })
                .collect();
            Self::real(shape, values)
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            TensorData::Real(v) => v.len(),
            TensorData::Complex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.data, TensorData::Complex(_))
    }

    /// Number of real coordinates: one per real entry, two per complex entry.
    pub fn n_real_coords(&self) -> usize {
        if self.is_complex() {
            2 * self.len()
        } else {
            self.len()
        }
    }

    #[inline]
    pub fn at(&self, i: usize) -> Complex64 {
        match &self.data {
            TensorData::Real(v) => Complex64::new(v[i], 0.0),
            TensorData::Complex(v) => v[i],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Complex64> + '_ {
        (0..self.len()).map(move |i| self.at(i))
    }

    fn all_finite(&self) -> bool {
        match &self.data {
            TensorData::Real(v) => v.iter().all(|x| x.is_finite()),
            TensorData::Complex(v) => v.iter().all(|z| z.re.is_finite() && z.im.is_finite()),
        }
    }
}

/// Position of a leaf inside the real-coordinate flattening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafLayout {
    pub offset: usize,
    pub len: usize,
    pub complex: bool,
}

/// Ordered mapping from `/`-separated paths to tensors.
///
/// The real-coordinate flattening visits leaves in key order. A real leaf
/// contributes its values; a complex leaf contributes all real parts followed
/// by all imaginary parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTree {
    leaves: BTreeMap<String, Tensor>,
}

impl ParameterTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, tensor: Tensor) {
        self.leaves.insert(path.into(), tensor);
    }

    pub fn with(mut self, path: impl Into<String>, tensor: Tensor) -> Self {
        self.insert(path, tensor);
        self
    }

    pub fn get(&self, path: &str) -> Option<&Tensor> {
        self.leaves.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.leaves.iter()
    }

    pub fn n_leaves(&self) -> usize {
        self.leaves.len()
    }

    pub fn dtype(&self) -> ParamDtype {
        let n_complex = self.leaves.values().filter(|t| t.is_complex()).count();
        match n_complex {
            0 => ParamDtype::Real,
            n if n == self.leaves.len() => ParamDtype::Complex,
            _ => ParamDtype::Mixed,
        }
    }

    pub fn n_real_coords(&self) -> usize {
        self.leaves.values().map(Tensor::n_real_coords).sum()
    }

    pub fn layout(&self) -> BTreeMap<&str, LeafLayout> {
        let mut offset = 0;
        self.leaves
            .iter()
            .map(|(path, t)| {
                let layout = LeafLayout {
                    offset,
                    len: t.len(),
                    complex: t.is_complex(),
                };
                offset += t.n_real_coords();
                (path.as_str(), layout)
            })
            .collect()
    }

    pub fn to_real_coords(&self) -> DVector<f64> {
        let mut out = Vec::with_capacity(self.n_real_coords());
        for t in self.leaves.values() {
            match &t.data {
                TensorData::Real(v) => out.extend_from_slice(v),
                TensorData::Complex(v) => {
                    out.extend(v.iter().map(|z| z.re));
                    out.extend(v.iter().map(|z| z.im));
                }
            }
        }
        DVector::from_vec(out)
    }

    /// `params += delta` in real coordinates.
    pub fn add_real_coords(&mut self, delta: &DVector<f64>) {
        debug_assert_eq!(delta.len(), self.n_real_coords());
        let mut offset = 0;
        for t in self.leaves.values_mut() {
            match &mut t.data {
                TensorData::Real(v) => {
                    for (i, x) in v.iter_mut().enumerate() {
                        *x += delta[offset + i];
                    }
                    offset += v.len();
                }
                TensorData::Complex(v) => {
                    let n = v.len();
                    for (i, z) in v.iter_mut().enumerate() {
                        z.re += delta[offset + i];
                        z.im += delta[offset + n + i];
                    }
                    offset += 2 * n;
                }
            }
        }
    }

    pub fn is_finite(&self) -> bool {
        self.leaves.values().all(Tensor::all_finite)
    }
}

impl Index<&str> for ParameterTree {
    type Output = Tensor;

    /// Panics when the leaf is missing, like `BTreeMap` indexing.
    fn index(&self, path: &str) -> &Tensor {
        match self.leaves.get(path) {
            Some(t) => t,
            None => panic!("parameter tree has no leaf {path:?}"),
        }
    }
}

/// Accumulates `∂ log ψ / ∂θ` in real coordinates.
///
/// Values are given as derivatives with respect to the (complex) entry;
/// for a complex leaf the model is assumed holomorphic in that entry, so the
/// derivative with respect to its imaginary part is `i` times the given value.
pub struct GradientBuffer<'a> {
    layout: BTreeMap<&'a str, LeafLayout>,
    values: DVector<Complex64>,
}

impl<'a> GradientBuffer<'a> {
    pub fn new(params: &'a ParameterTree) -> Self {
        Self {
            layout: params.layout(),
            values: DVector::zeros(params.n_real_coords()),
        }
    }

    pub fn add(&mut self, path: &str, index: usize, value: Complex64) {
        if let Some(leaf) = self.layout.get(path) {
            self.values[leaf.offset + index] += value;
            if leaf.complex {
                self.values[leaf.offset + leaf.len + index] += Complex64::i() * value;
            }
        }
    }

    pub fn finish(self) -> DVector<Complex64> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_coords_roundtrip_order() {
        let tree = ParameterTree::new()
            .with("b", Tensor::complex(vec![2], vec![Complex64::new(1.0, 2.0), Complex64::new(3.0, 4.0)]))
            .with("a", Tensor::real(vec![1], vec![5.0]));
        assert_eq!(tree.dtype(), ParamDtype::Mixed);
        assert_eq!(tree.n_real_coords(), 5);
        let coords = tree.to_real_coords();
        assert_eq!(coords.as_slice(), &[5.0, 1.0, 3.0, 2.0, 4.0]);

        let mut moved = tree.clone();
        moved.add_real_coords(&DVector::from_vec(vec![1.0, 0.5, 0.0, 0.0, -1.0]));
        assert_eq!(moved["a"].at(0), Complex64::new(6.0, 0.0));
        assert_eq!(moved["b"].at(0), Complex64::new(1.5, 2.0));
        assert_eq!(moved["b"].at(1), Complex64::new(3.0, 3.0));
    }

    #[test]
    fn test_gradient_buffer_complex_leaf() {
        let tree = ParameterTree::new()
            .with("w", Tensor::complex(vec![1], vec![Complex64::new(0.0, 0.0)]));
        let mut grad = GradientBuffer::new(&tree);
        grad.add("w", 0, Complex64::new(2.0, 1.0));
        let g = grad.finish();
        assert_eq!(g[0], Complex64::new(2.0, 1.0));
        assert_eq!(g[1], Complex64::new(-1.0, 2.0));
    }
}
