//! Particle-number-conserving operators in a compact bitmask form.
//!
//! Every `k`-body term `c†_{a_1} … c†_{a_k} c_{b_1} … c_{b_k}` is stored in
//! canonical order (`a_1 > … > a_k`, `b_1 > … > b_k`) as a pair of bitmasks.
//! Terms are grouped by annihilation mask so that a configuration is tested
//! once per group.

use std::collections::BTreeMap;

use crate::error::FermionError;
use crate::hilbert::SpinOrbitalFermions;
use crate::operator::DiscreteOperator;

use super::operator2nd::{term_string, FermionOp, FermionOperator2nd};
use super::sparse::{
    annihilate, create, descending_parity, is_non_increasing, mask_of, modes_descending,
    SparseCoefficients,
};

/// Terms sharing one annihilation mask.
#[derive(Debug, Clone, PartialEq)]
struct AnnihilationGroup {
    annihilate: u64,
    create: Vec<u64>,
    coeffs: Vec<f64>,
}

/// All `k`-body terms.
#[derive(Debug, Clone, PartialEq)]
struct OrderBlock {
    order: usize,
    groups: Vec<AnnihilationGroup>,
}

/// Accumulates canonical terms keyed by `(order, annihilation, creation)`.
#[derive(Debug, Default)]
pub(crate) struct TermAccumulator {
    constant: f64,
    terms: BTreeMap<(usize, u64, u64), f64>,
}

impl TermAccumulator {
    pub(crate) fn add_constant(&mut self, c: f64) {
        self.constant += c;
    }

    pub(crate) fn add(&mut self, create: u64, annihilate: u64, value: f64) {
        let order = create.count_ones() as usize;
        *self.terms.entry((order, annihilate, create)).or_insert(0.0) += value;
    }

    /// Entry of a rank `2k` tensor in arbitrary index order.
    pub(crate) fn add_unordered(&mut self, idx: &[usize], value: f64) {
        let k = idx.len() / 2;
        let (c, a) = idx.split_at(k);
        if let (Some(pc), Some(pa)) = (descending_parity(c), descending_parity(a)) {
            self.add(mask_of(c), mask_of(a), pc * pa * value);
        }
    }

    pub(crate) fn build(self, hilbert: SpinOrbitalFermions) -> ParticleNumberConservingFermioperator2nd {
        let mut blocks: Vec<OrderBlock> = Vec::new();
        for ((order, ann, cre), value) in self.terms {
            if value == 0.0 {
                continue;
            }
            if blocks.last().map_or(true, |b| b.order != order) {
                blocks.push(OrderBlock { order, groups: Vec::new() });
            }
            let Some(block) = blocks.last_mut() else { continue };
            if block.groups.last().map_or(true, |g| g.annihilate != ann) {
                block.groups.push(AnnihilationGroup { annihilate: ann, create: Vec::new(), coeffs: Vec::new() });
            }
            if let Some(group) = block.groups.last_mut() {
                group.create.push(cre);
                group.coeffs.push(value);
            }
        }
        ParticleNumberConservingFermioperator2nd {
            hilbert,
            constant: self.constant,
            blocks,
        }
    }
}

fn check_tensors(hilbert: &SpinOrbitalFermions, tensors: &[SparseCoefficients]) -> Result<(), FermionError> {
    for t in tensors {
        if t.rank() % 2 == 1 {
            return Err(FermionError::ShapeMismatch(format!(
                "coefficient tensor of odd rank {} cannot conserve particle number",
                t.rank()
            )));
        }
        if t.n() != hilbert.n_modes() {
            return Err(FermionError::ShapeMismatch(format!(
                "coefficient tensor over {} modes, hilbert space has {}",
                t.n(),
                hilbert.n_modes()
            )));
        }
    }
    Ok(())
}

/// Number-conserving Hamiltonian `c + Σ_k Σ h^{(k)} c†…c† c…c`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleNumberConservingFermioperator2nd {
    hilbert: SpinOrbitalFermions,
    constant: f64,
    blocks: Vec<OrderBlock>,
}

impl ParticleNumberConservingFermioperator2nd {
    /// From coefficient tensors in any index order. Entries with a repeated
    /// creation or annihilation index vanish; the others are brought to
    /// canonical order with the sign of the permutation.
    pub fn from_sparse_arrays(
        hilbert: SpinOrbitalFermions,
        constant: f64,
        tensors: &[SparseCoefficients],
    ) -> Result<Self, FermionError> {
        check_tensors(&hilbert, tensors)?;
        let mut acc = TermAccumulator::default();
        acc.add_constant(constant);
        for t in tensors {
            for (idx, v) in t.iter() {
                acc.add_unordered(idx, v);
            }
        }
        Ok(acc.build(hilbert))
    }

    /// From tensors whose entries are already normal ordered: both index
    /// halves non-increasing. Entries violating this are rejected.
    pub fn from_sparse_arrays_normal_order(
        hilbert: SpinOrbitalFermions,
        constant: f64,
        tensors: &[SparseCoefficients],
    ) -> Result<Self, FermionError> {
        check_tensors(&hilbert, tensors)?;
        let mut acc = TermAccumulator::default();
        acc.add_constant(constant);
        for t in tensors {
            let k = t.order();
            for (idx, v) in t.iter() {
                let (c, a) = idx.split_at(k);
                if !is_non_increasing(c) || !is_non_increasing(a) {
                    return Err(FermionError::NotNormalOrdered { indices: idx.to_vec() });
                }
                let (mc, ma) = (mask_of(c), mask_of(a));
                // a repeated index leaves fewer bits than operators
                if mc.count_ones() as usize == k && ma.count_ones() as usize == k {
                    acc.add(mc, ma, v);
                }
            }
        }
        Ok(acc.build(hilbert))
    }

    /// Normal-order a generic operator and read back its coefficients.
    pub fn from_fermiop(op: &FermionOperator2nd) -> Result<Self, FermionError> {
        let normal = op.to_normal_order();
        let mut acc = TermAccumulator::default();
        for (ops, w) in normal.terms() {
            let (cre, ann) = split_conserving(ops)?;
            if cre.is_empty() {
                acc.add_constant(w);
            } else {
                acc.add(mask_of(&cre), mask_of(&ann), w);
            }
        }
        Ok(acc.build(op.hilbert().clone()))
    }

    /// Back to a generic operator with canonical strings.
    pub fn to_fermiop(&self) -> FermionOperator2nd {
        let mut op = FermionOperator2nd::zero(self.hilbert.clone());
        if self.constant != 0.0 {
            op.add_term(Vec::new(), self.constant);
        }
        for block in &self.blocks {
            for group in &block.groups {
                let ann: Vec<FermionOp> = modes_descending(group.annihilate)
                    .into_iter()
                    .map(FermionOp::destroy)
                    .collect();
                for (&cre, &w) in group.create.iter().zip(&group.coeffs) {
                    let mut ops: Vec<FermionOp> = modes_descending(cre)
                        .into_iter()
                        .map(FermionOp::create)
                        .collect();
                    ops.extend_from_slice(&ann);
                    op.add_term(ops, w);
                }
            }
        }
        op
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Number of stored non-constant terms.
    pub fn n_terms(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|b| &b.groups)
            .map(|g| g.coeffs.len())
            .sum()
    }

    /// Highest `k` among the stored `k`-body terms.
    pub fn max_order(&self) -> usize {
        self.blocks.iter().map(|b| b.order).max().unwrap_or(0)
    }
}

/// Split a normal-ordered string into creation and annihilation modes.
pub(crate) fn split_conserving(ops: &[FermionOp]) -> Result<(Vec<usize>, Vec<usize>), FermionError> {
    let cre: Vec<usize> = ops.iter().filter(|o| o.dagger).map(|o| o.mode).collect();
    let ann: Vec<usize> = ops.iter().filter(|o| !o.dagger).map(|o| o.mode).collect();
    if cre.len() != ann.len() {
        return Err(FermionError::NotNumberConserving { term: term_string(ops) });
    }
    Ok((cre, ann))
}

impl DiscreteOperator for ParticleNumberConservingFermioperator2nd {
    type Hilbert = SpinOrbitalFermions;

    fn hilbert(&self) -> &SpinOrbitalFermions {
        &self.hilbert
    }

    fn get_conn(&self, x: &[f64]) -> Vec<(Vec<f64>, f64)> {
        let mask = SpinOrbitalFermions::mask_of(x);
        let mut conn: BTreeMap<u64, f64> = BTreeMap::new();
        if self.constant != 0.0 {
            conn.insert(mask, self.constant);
        }
        for block in &self.blocks {
            for group in &block.groups {
                let Some((emptied, s_ann)) = annihilate(mask, group.annihilate) else {
                    continue;
                };
                for (&cre, &w) in group.create.iter().zip(&group.coeffs) {
                    if let Some((xp, s_cre)) = create(emptied, cre) {
                        *conn.entry(xp).or_insert(0.0) += s_ann * s_cre * w;
                    }
                }
            }
        }
        conn.into_iter()
            .filter(|(_, mel)| *mel != 0.0)
            .map(|(xp, mel)| (self.hilbert.config_of(xp), mel))
            .collect()
    }
}
