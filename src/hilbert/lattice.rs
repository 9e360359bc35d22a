//! Periodic square lattice with neighbor shells.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

/// `length × length` square lattice with periodic boundaries.
///
/// Site `(x, y)` has index `x * length + y`. Neighbor order 1 are the
/// nearest-neighbor bonds, order 2 the diagonal bonds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareLattice {
    pub length: usize,
    pub max_neighbor_order: usize,
}

impl SquareLattice {
    pub fn new(length: usize, max_neighbor_order: usize) -> Self {
        Self {
            length,
            max_neighbor_order: max_neighbor_order.clamp(1, 2),
        }
    }

    pub fn n_sites(&self) -> usize {
        self.length * self.length
    }

    fn site(&self, x: isize, y: isize) -> usize {
        let l = self.length as isize;
        (x.rem_euclid(l) * l + y.rem_euclid(l)) as usize
    }

    /// Bonds of the given neighbor order, deduplicated, as `(i, j)` with `i < j`.
    pub fn edges_of_order(&self, order: usize) -> Vec<(usize, usize)> {
        let shifts: &[(isize, isize)] = match order {
            1 => &[(1, 0), (0, 1)],
            2 => &[(1, 1), (1, -1)],
            _ => &[],
        };
        let mut set = BTreeSet::new();
        for x in 0..self.length as isize {
            for y in 0..self.length as isize {
                let i = self.site(x, y);
                for &(dx, dy) in shifts {
                    let j = self.site(x + dx, y + dy);
                    if i != j {
                        set.insert((i.min(j), i.max(j)));
                    }
                }
            }
        }
        set.into_iter().collect()
    }

    /// All bonds up to `max_neighbor_order`.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut set = BTreeSet::new();
        for order in 1..=self.max_neighbor_order {
            set.extend(self.edges_of_order(order));
        }
        set.into_iter().collect()
    }

    /// Hop distances between all pairs of sites over `edges()`.
    pub fn distances(&self) -> Vec<Vec<usize>> {
        let n = self.n_sites();
        let mut adjacency = vec![Vec::new(); n];
        for (i, j) in self.edges() {
            adjacency[i].push(j);
            adjacency[j].push(i);
        }
        (0..n)
            .map(|source| {
                let mut dist = vec![usize::MAX; n];
                dist[source] = 0;
                let mut queue = VecDeque::from([source]);
                while let Some(u) = queue.pop_front() {
                    for &v in &adjacency[u] {
                        if dist[v] == usize::MAX {
                            dist[v] = dist[u] + 1;
                            queue.push_back(v);
                        }
                    }
                }
                dist
            })
            .collect()
    }

    /// Site pairs `(i, j)`, `i < j`, within `d_max` hops.
    pub fn pairs_within(&self, d_max: usize) -> Vec<(usize, usize)> {
        let dist = self.distances();
        let n = self.n_sites();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if dist[i][j] <= d_max {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_neighbors_periodic() {
        let lattice = SquareLattice::new(4, 1);
        let edges = lattice.edges();
        assert_eq!(edges.len(), 2 * 16);
        assert!(edges.contains(&(0, 1)));
        assert!(edges.contains(&(0, 3)));
        assert!(edges.contains(&(0, 12)));
    }

    #[test]
    fn test_pairs_within_distance() {
        let lattice = SquareLattice::new(3, 2);
        // with diagonal bonds every pair on a 3x3 torus is one hop apart
        assert_eq!(lattice.pairs_within(1).len(), 36);
        let nn_only = SquareLattice::new(4, 1);
        assert_eq!(nn_only.pairs_within(1).len(), 32);
    }
}
