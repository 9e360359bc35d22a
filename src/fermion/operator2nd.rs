//! Generic second-quantized operators: weighted sums of fermion strings.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;

use crate::error::FermionError;
use crate::hilbert::SpinOrbitalFermions;
use crate::operator::DiscreteOperator;

use super::sparse::below;

/// A single creation (`dagger`) or annihilation operator on a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FermionOp {
    pub mode: usize,
    pub dagger: bool,
}

impl FermionOp {
    pub fn create(mode: usize) -> Self {
        Self { mode, dagger: true }
    }

    pub fn destroy(mode: usize) -> Self {
        Self { mode, dagger: false }
    }
}

impl fmt::Display for FermionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dagger {
            write!(f, "{}^", self.mode)
        } else {
            write!(f, "{}", self.mode)
        }
    }
}

pub(crate) fn term_string(ops: &[FermionOp]) -> String {
    ops.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

/// Parse `"3^ 1^ 2 0"` into operators; `""` is the identity.
pub fn parse_term(term: &str, n_modes: usize) -> Result<Vec<FermionOp>, FermionError> {
    term.split_whitespace()
        .map(|token| {
            let (digits, dagger) = match token.strip_suffix('^') {
                Some(d) => (d, true),
                None => (token, false),
            };
            let mode: usize = digits.parse().map_err(|_| FermionError::Parse {
                term: term.to_string(),
                reason: format!("invalid mode {token:?}"),
            })?;
            if mode >= n_modes {
                return Err(FermionError::OrbitalOutOfRange { orbital: mode, n_modes });
            }
            Ok(FermionOp { mode, dagger })
        })
        .collect()
}

/// Apply a string right to left to an occupation bitmask.
pub(crate) fn apply_string(mask: u64, ops: &[FermionOp]) -> Option<(u64, f64)> {
    let mut x = mask;
    let mut sign = 1.0;
    for op in ops.iter().rev() {
        let bit = 1u64 << op.mode;
        let occupied = x & bit != 0;
        if occupied == op.dagger {
            return None;
        }
        if below(x, op.mode) % 2 == 1 {
            sign = -sign;
        }
        x ^= bit;
    }
    Some((x, sign))
}

/// `Σ_t w_t · Π ops_t` on a spin-orbital Fock space.
#[derive(Debug, Clone)]
pub struct FermionOperator2nd {
    hilbert: SpinOrbitalFermions,
    terms: BTreeMap<Vec<FermionOp>, f64>,
}

impl FermionOperator2nd {
    pub fn zero(hilbert: SpinOrbitalFermions) -> Self {
        Self { hilbert, terms: BTreeMap::new() }
    }

    /// Build from term strings and their weights. Repeated terms are summed.
    pub fn new<S: AsRef<str>>(
        hilbert: SpinOrbitalFermions,
        terms: &[S],
        weights: &[f64],
    ) -> Result<Self, FermionError> {
        if terms.len() != weights.len() {
            return Err(FermionError::WeightCount { terms: terms.len(), weights: weights.len() });
        }
        let n_modes = hilbert.n_modes();
        let mut op = Self::zero(hilbert);
        for (term, &w) in terms.iter().zip(weights) {
            op.add_term(parse_term(term.as_ref(), n_modes)?, w);
        }
        Ok(op)
    }

    pub fn add_term(&mut self, ops: Vec<FermionOp>, weight: f64) {
        *self.terms.entry(ops).or_insert(0.0) += weight;
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&[FermionOp], f64)> + '_ {
        self.terms.iter().map(|(ops, &w)| (ops.as_slice(), w))
    }

    /// Coefficient of the identity.
    pub fn constant(&self) -> f64 {
        self.terms.get(&Vec::new()).copied().unwrap_or(0.0)
    }

    pub fn is_number_conserving(&self) -> bool {
        self.terms.keys().all(|ops| {
            let n_create = ops.iter().filter(|o| o.dagger).count();
            2 * n_create == ops.len()
        })
    }

    /// Equivalent operator whose strings have all creators on the left, each
    /// group sorted by descending mode. Anticommutators generate the lower
    /// order terms; strings that vanish identically are dropped.
    pub fn to_normal_order(&self) -> Self {
        let mut out: BTreeMap<Vec<FermionOp>, f64> = BTreeMap::new();
        let mut work: Vec<(Vec<FermionOp>, f64)> =
            self.terms.iter().map(|(ops, &w)| (ops.clone(), w)).collect();

        while let Some((mut ops, w)) = work.pop() {
            if w == 0.0 {
                continue;
            }
            let violation = ops.windows(2).position(|p| {
                let (a, b) = (p[0], p[1]);
                (!a.dagger && b.dagger) || (a.dagger == b.dagger && a.mode <= b.mode)
            });
            match violation {
                None => *out.entry(ops).or_insert(0.0) += w,
                Some(i) => {
                    let (a, b) = (ops[i], ops[i + 1]);
                    if a.dagger == b.dagger {
                        if a.mode == b.mode {
                            // c c or c† c† on one mode
                            continue;
                        }
                        ops.swap(i, i + 1);
                        work.push((ops, -w));
                    } else {
                        // c_a c†_b = δ_ab - c†_b c_a
                        if a.mode == b.mode {
                            let mut contracted = ops.clone();
                            contracted.drain(i..i + 2);
                            work.push((contracted, w));
                        }
                        ops.swap(i, i + 1);
                        work.push((ops, -w));
                    }
                }
            }
        }
        out.retain(|_, w| *w != 0.0);
        Self { hilbert: self.hilbert.clone(), terms: out }
    }
}

impl fmt::Display for FermionOperator2nd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .terms
            .iter()
            .map(|(ops, w)| format!("{w} [{}]", term_string(ops)))
            .collect();
        write!(f, "FermionOperator2nd({})", parts.join(" + "))
    }
}

impl Add for FermionOperator2nd {
    type Output = FermionOperator2nd;

    fn add(mut self, rhs: FermionOperator2nd) -> FermionOperator2nd {
        for (ops, w) in rhs.terms {
            self.add_term(ops, w);
        }
        self
    }
}

impl DiscreteOperator for FermionOperator2nd {
    type Hilbert = SpinOrbitalFermions;

    fn hilbert(&self) -> &SpinOrbitalFermions {
        &self.hilbert
    }

    fn get_conn(&self, x: &[f64]) -> Vec<(Vec<f64>, f64)> {
        let mask = SpinOrbitalFermions::mask_of(x);
        let mut conn: BTreeMap<u64, f64> = BTreeMap::new();
        for (ops, &w) in &self.terms {
            if let Some((xp, sign)) = apply_string(mask, ops) {
                *conn.entry(xp).or_insert(0.0) += sign * w;
            }
        }
        conn.into_iter()
            .filter(|(_, mel)| *mel != 0.0)
            .map(|(xp, mel)| (self.hilbert.config_of(xp), mel))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hilbert() -> SpinOrbitalFermions {
        SpinOrbitalFermions::new(4, None).unwrap()
    }

    #[test]
    fn test_parse_terms() {
        let ops = parse_term("3^ 1", 4).unwrap();
        assert_eq!(ops, vec![FermionOp::create(3), FermionOp::destroy(1)]);
        assert!(parse_term("", 4).unwrap().is_empty());
        assert!(matches!(parse_term("2^ x", 4), Err(FermionError::Parse { .. })));
        assert!(matches!(parse_term("7^ 0", 4), Err(FermionError::OrbitalOutOfRange { .. })));
        assert!(matches!(
            FermionOperator2nd::new(hilbert(), &["0^ 0"], &[]),
            Err(FermionError::WeightCount { .. })
        ));
    }

    #[test]
    fn test_number_operator_is_diagonal() {
        let op = FermionOperator2nd::new(hilbert(), &["1^ 1", "2^ 2"], &[1.0, 1.0]).unwrap();
        let conn = op.get_conn(&[0.0, 1.0, 1.0, 0.0]);
        assert_eq!(conn, vec![(vec![0.0, 1.0, 1.0, 0.0], 2.0)]);
        assert!(op.is_number_conserving());
    }

    #[test]
    fn test_hopping_sign() {
        // c†_3 c_0 on |0b0011⟩: c_0 (+), then c†_3 passes mode 1 (-)
        let op = FermionOperator2nd::new(hilbert(), &["3^ 0"], &[1.0]).unwrap();
        let conn = op.get_conn(&[1.0, 1.0, 0.0, 0.0]);
        assert_eq!(conn, vec![(vec![0.0, 1.0, 0.0, 1.0], -1.0)]);
    }

    #[test]
    fn test_normal_order_preserves_matrix() {
        let op = FermionOperator2nd::new(
            hilbert(),
            &["0 1^", "1 2^ 3^ 0", "2^ 3^ 2 1", "1 1^", "0^ 0^", ""],
            &[0.7, -1.3, 0.4, 2.0, 5.0, 0.25],
        )
        .unwrap();
        let normal = op.to_normal_order();
        for (ops, _) in normal.terms() {
            let split = ops.iter().position(|o| !o.dagger).unwrap_or(ops.len());
            assert!(ops[..split].iter().all(|o| o.dagger));
            assert!(ops[split..].iter().all(|o| !o.dagger));
            assert!(ops.windows(2).all(|w| w[0].dagger != w[1].dagger || w[0].mode > w[1].mode));
        }
        // c_1 c†_1 = 1 - c†_1 c_1 contributes to the identity
        assert_relative_eq!(normal.constant(), 2.25);
        assert_relative_eq!(op.to_dense().unwrap(), normal.to_dense().unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_addition_merges_terms() {
        let a = FermionOperator2nd::new(hilbert(), &["1^ 0"], &[1.0]).unwrap();
        let b = FermionOperator2nd::new(hilbert(), &["1^ 0", "0^ 1"], &[0.5, 0.5]).unwrap();
        let sum = a + b;
        assert_eq!(sum.n_terms(), 2);
        assert_relative_eq!(sum.terms().next().map(|(_, w)| w).unwrap_or(0.0), 0.5);
    }
}
