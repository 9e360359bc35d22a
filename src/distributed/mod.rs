//! Distributed module - additive collectives over sharded sample batches.
//!
//! Every process (rank) owns an equally sized shard of the Monte Carlo batch.
//! The only primitive the numerical core needs is an in-place
//! `all_reduce_sum`; gathers are expressed as zero-padded sums.

mod thread;

pub use thread::ThreadCollective;

use std::sync::Arc;

use crate::error::DistributedError;

/// Collective communication contract.
pub trait Collective: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Replace `buf` with the element-wise sum of every rank's `buf`.
    ///
    /// All ranks must call this the same number of times with buffers of the
    /// same length.
    fn all_reduce_sum(&self, buf: &mut [f64]) -> Result<(), DistributedError>;
}

/// Single-process collective; reductions are the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCollective;

impl Collective for LocalCollective {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _buf: &mut [f64]) -> Result<(), DistributedError> {
        Ok(())
    }
}

/// Explicit process context threaded through drivers and statistics.
#[derive(Clone)]
pub struct DistributedContext {
    collective: Arc<dyn Collective>,
}

impl std::fmt::Debug for DistributedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedContext")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}

impl Default for DistributedContext {
    fn default() -> Self {
        Self::local()
    }
}

impl DistributedContext {
    pub fn new(collective: Arc<dyn Collective>) -> Self {
        Self { collective }
    }

    pub fn local() -> Self {
        Self::new(Arc::new(LocalCollective))
    }

    pub fn rank(&self) -> usize {
        self.collective.rank()
    }

    pub fn size(&self) -> usize {
        self.collective.size()
    }

    /// Rank 0 is the conventional place for user-visible output.
    pub fn is_root(&self) -> bool {
        self.rank() == 0
    }

    pub fn all_reduce_sum(&self, buf: &mut [f64]) -> Result<(), DistributedError> {
        if self.size() == 1 {
            return Ok(());
        }
        self.collective.all_reduce_sum(buf)
    }

    pub fn sum_scalar(&self, value: f64) -> Result<f64, DistributedError> {
        let mut buf = [value];
        self.all_reduce_sum(&mut buf)?;
        Ok(buf[0])
    }

    /// Concatenate equally sized local blocks in rank order.
    pub fn all_gather(&self, local: &[f64]) -> Result<Vec<f64>, DistributedError> {
        if self.size() == 1 {
            return Ok(local.to_vec());
        }
        let n = local.len();
        let mut global = vec![0.0; n * self.size()];
        let offset = self.rank() * n;
        global[offset..offset + n].copy_from_slice(local);
        self.all_reduce_sum(&mut global)?;
        Ok(global)
    }

    /// Verify that every rank holds `n_local` samples; returns the global count.
    pub fn check_shard(&self, n_local: usize) -> Result<usize, DistributedError> {
        let sizes = self.all_gather(&[n_local as f64])?;
        if let Some((rank, &other)) = sizes
            .iter()
            .enumerate()
            .find(|(_, &s)| s as usize != n_local)
        {
            let (rank, local, expected) = if rank < self.rank() {
                (self.rank(), n_local, other as usize)
            } else {
                (rank, other as usize, n_local)
            };
            return Err(DistributedError::ShardMismatch { rank, local, expected });
        }
        Ok(n_local * self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_context_is_identity() {
        let ctx = DistributedContext::local();
        assert!(ctx.is_root());
        assert_eq!(ctx.sum_scalar(2.5).unwrap(), 2.5);
        assert_eq!(ctx.all_gather(&[1.0, 2.0]).unwrap(), vec![1.0, 2.0]);
        assert_eq!(ctx.check_shard(7).unwrap(), 7);
    }
}
