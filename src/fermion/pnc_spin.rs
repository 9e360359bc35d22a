//! Spin-resolved number-conserving operators.
//!
//! Spatial coefficient tensors are attached to spin sectors: one-body terms
//! `h_ij c†_{iσ} c_{jσ}` per sector and two-body terms
//! `h_ijkl c†_{iσ1} c†_{jσ2} c_{kσ2} c_{lσ1}` per sector pair. Orbital `i` of
//! sector `σ` is mode `i + σ·N`.

use std::collections::BTreeMap;

use crate::error::FermionError;
use crate::hilbert::SpinOrbitalFermions;
use crate::operator::DiscreteOperator;

use super::operator2nd::{term_string, FermionOperator2nd};
use super::pnc::{split_conserving, ParticleNumberConservingFermioperator2nd, TermAccumulator};
use super::sparse::SparseCoefficients;

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleNumberConservingFermioperator2ndSpin {
    constant: f64,
    one_body: BTreeMap<usize, SparseCoefficients>,
    two_body: BTreeMap<(usize, usize), SparseCoefficients>,
    /// Lowered to mode indices for evaluation
    lowered: ParticleNumberConservingFermioperator2nd,
}

impl ParticleNumberConservingFermioperator2ndSpin {
    /// `one_body[σ]` acts within sector `σ`; `two_body[(σ1, σ2)]` follows the
    /// `c†_{iσ1} c†_{jσ2} c_{kσ2} c_{lσ1}` pattern.
    pub fn from_sparse_arrays(
        hilbert: SpinOrbitalFermions,
        constant: f64,
        one_body: BTreeMap<usize, SparseCoefficients>,
        two_body: BTreeMap<(usize, usize), SparseCoefficients>,
    ) -> Result<Self, FermionError> {
        let n = hilbert.n_orbitals;
        let n_sectors = hilbert.n_spin_subsectors();
        let check = |t: &SparseCoefficients, rank: usize, sectors: &[usize]| -> Result<(), FermionError> {
            if t.rank() != rank || t.n() != n {
                return Err(FermionError::ShapeMismatch(format!(
                    "expected a rank-{rank} tensor over {n} orbitals, got rank {} over {}",
                    t.rank(),
                    t.n()
                )));
            }
            if let Some(&bad) = sectors.iter().find(|&&s| s >= n_sectors) {
                return Err(FermionError::ShapeMismatch(format!(
                    "spin sector {bad} out of range for {n_sectors} sectors"
                )));
            }
            Ok(())
        };

        let mut acc = TermAccumulator::default();
        acc.add_constant(constant);
        for (&sigma, t) in &one_body {
            check(t, 2, &[sigma])?;
            for (idx, v) in t.iter() {
                let modes = [hilbert.mode(idx[0], sigma), hilbert.mode(idx[1], sigma)];
                acc.add_unordered(&modes, v);
            }
        }
        for (&(s1, s2), t) in &two_body {
            check(t, 4, &[s1, s2])?;
            for (idx, v) in t.iter() {
                let modes = [
                    hilbert.mode(idx[0], s1),
                    hilbert.mode(idx[1], s2),
                    hilbert.mode(idx[2], s2),
                    hilbert.mode(idx[3], s1),
                ];
                acc.add_unordered(&modes, v);
            }
        }
        Ok(Self {
            constant,
            one_body,
            two_body,
            lowered: acc.build(hilbert),
        })
    }

    /// The same spatial `h1` in every sector and `h2` in every sector pair.
    pub fn from_sparse_arrays_all_sectors(
        hilbert: SpinOrbitalFermions,
        constant: f64,
        h1: &SparseCoefficients,
        h2: &SparseCoefficients,
    ) -> Result<Self, FermionError> {
        let n_sectors = hilbert.n_spin_subsectors();
        let one_body = (0..n_sectors).map(|s| (s, h1.clone())).collect();
        let two_body = (0..n_sectors)
            .flat_map(|s1| (0..n_sectors).map(move |s2| (s1, s2)))
            .map(|pair| (pair, h2.clone()))
            .collect();
        Self::from_sparse_arrays(hilbert, constant, one_body, two_body)
    }

    /// Normal-order a generic operator and sort its terms into sectors.
    pub fn from_fermiop(op: &FermionOperator2nd) -> Result<Self, FermionError> {
        let hilbert = op.hilbert().clone();
        let n = hilbert.n_orbitals;
        let orbital = |mode: usize| mode % n;
        let sector = |mode: usize| hilbert.sector_of(mode);

        let mut constant = 0.0;
        let mut one_body: BTreeMap<usize, SparseCoefficients> = BTreeMap::new();
        let mut two_body: BTreeMap<(usize, usize), SparseCoefficients> = BTreeMap::new();

        for (ops, w) in op.to_normal_order().terms() {
            let (cre, ann) = split_conserving(ops)?;
            let not_spin = || FermionError::NotSpinConserving { term: term_string(ops) };
            match cre.len() {
                0 => constant += w,
                1 => {
                    let (p, q) = (cre[0], ann[0]);
                    if sector(p) != sector(q) {
                        return Err(not_spin());
                    }
                    one_body
                        .entry(sector(p))
                        .or_insert_with(|| SparseCoefficients::new(n, 2))
                        .add(vec![orbital(p), orbital(q)], w)?;
                }
                2 => {
                    // c†_p1 c†_p2 c_q1 c_q2; match c†_{iσ1} c†_{jσ2} c_{kσ2} c_{lσ1}
                    let (p1, p2, q1, q2) = (cre[0], cre[1], ann[0], ann[1]);
                    let (k, l, sign) = if sector(p1) == sector(q2) && sector(p2) == sector(q1) {
                        (q1, q2, 1.0)
                    } else if sector(p1) == sector(q1) && sector(p2) == sector(q2) {
                        (q2, q1, -1.0)
                    } else {
                        return Err(not_spin());
                    };
                    two_body
                        .entry((sector(p1), sector(p2)))
                        .or_insert_with(|| SparseCoefficients::new(n, 4))
                        .add(vec![orbital(p1), orbital(p2), orbital(k), orbital(l)], sign * w)?;
                }
                _ => return Err(not_spin()),
            }
        }
        Self::from_sparse_arrays(hilbert, constant, one_body, two_body)
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn one_body(&self, sector: usize) -> Option<&SparseCoefficients> {
        self.one_body.get(&sector)
    }

    pub fn two_body(&self, s1: usize, s2: usize) -> Option<&SparseCoefficients> {
        self.two_body.get(&(s1, s2))
    }

    pub fn to_fermiop(&self) -> FermionOperator2nd {
        self.lowered.to_fermiop()
    }

    /// The equivalent operator over plain mode indices.
    pub fn as_mode_operator(&self) -> &ParticleNumberConservingFermioperator2nd {
        &self.lowered
    }
}

impl DiscreteOperator for ParticleNumberConservingFermioperator2ndSpin {
    type Hilbert = SpinOrbitalFermions;

    fn hilbert(&self) -> &SpinOrbitalFermions {
        self.lowered.hilbert()
    }

    fn get_conn(&self, x: &[f64]) -> Vec<(Vec<f64>, f64)> {
        self.lowered.get_conn(x)
    }
}
