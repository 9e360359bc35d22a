//! In-process collective: one rank per thread, rendezvous on a shared slot table.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::Collective;
use crate::error::DistributedError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

struct RoundState {
    generation: u64,
    arrived: usize,
    slots: Vec<Option<Vec<f64>>>,
    result: Arc<Vec<f64>>,
    poisoned: bool,
}

struct Group {
    size: usize,
    timeout: Duration,
    state: Mutex<RoundState>,
    cv: Condvar,
}

/// A rank inside a thread group created by [`ThreadCollective::group`].
///
/// Contributions are summed in rank order, so every rank observes bit-identical
/// results.
#[derive(Clone)]
pub struct ThreadCollective {
    rank: usize,
    group: Arc<Group>,
}

impl ThreadCollective {
    /// Create `size` connected ranks; hand one to each worker thread.
    pub fn group(size: usize) -> Vec<ThreadCollective> {
        Self::group_with_timeout(size, DEFAULT_TIMEOUT)
    }

    pub fn group_with_timeout(size: usize, timeout: Duration) -> Vec<ThreadCollective> {
        let size = size.max(1);
        let group = Arc::new(Group {
            size,
            timeout,
            state: Mutex::new(RoundState {
                generation: 0,
                arrived: 0,
                slots: vec![None; size],
                result: Arc::new(Vec::new()),
                poisoned: false,
            }),
            cv: Condvar::new(),
        });
        (0..size)
            .map(|rank| ThreadCollective { rank, group: Arc::clone(&group) })
            .collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RoundState>, DistributedError> {
        self.group.state.lock().map_err(|_| DistributedError::Poisoned)
    }

    fn poison(&self, state: &mut RoundState) {
        state.poisoned = true;
        self.group.cv.notify_all();
    }
}

impl Collective for ThreadCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn all_reduce_sum(&self, buf: &mut [f64]) -> Result<(), DistributedError> {
        let mut state = self.lock()?;
        if state.poisoned {
            return Err(DistributedError::Poisoned);
        }
        let generation = state.generation;
        state.slots[self.rank] = Some(buf.to_vec());
        state.arrived += 1;

        if state.arrived == self.group.size {
            let expected = buf.len();
            if let Some(rank) = state
                .slots
                .iter()
                .position(|s| s.as_ref().map_or(true, |v| v.len() != expected))
            {
                let len = state.slots[rank].as_ref().map_or(0, Vec::len);
                self.poison(&mut state);
                return Err(DistributedError::LengthMismatch { rank, len, expected });
            }
            let mut sum = vec![0.0; expected];
            for slot in state.slots.iter_mut() {
                if let Some(v) = slot.take() {
                    for (s, x) in sum.iter_mut().zip(v) {
                        *s += x;
                    }
                }
            }
            buf.copy_from_slice(&sum);
            state.result = Arc::new(sum);
            state.arrived = 0;
            state.generation += 1;
            self.group.cv.notify_all();
            return Ok(());
        }

        let start = Instant::now();
        loop {
            let waited = start.elapsed();
            if waited >= self.group.timeout {
                let missing = self.group.size - state.arrived;
                self.poison(&mut state);
                return Err(DistributedError::Timeout {
                    rank: self.rank,
                    waited_ms: waited.as_millis(),
                    missing,
                });
            }
            let (guard, _) = self
                .group
                .cv
                .wait_timeout(state, self.group.timeout - waited)
                .map_err(|_| DistributedError::Poisoned)?;
            state = guard;
            if state.generation != generation {
                let result = Arc::clone(&state.result);
                if result.len() != buf.len() {
                    return Err(DistributedError::LengthMismatch {
                        rank: self.rank,
                        len: buf.len(),
                        expected: result.len(),
                    });
                }
                buf.copy_from_slice(&result);
                return Ok(());
            }
            if state.poisoned {
                return Err(DistributedError::Poisoned);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_all_reduce_sums_in_rank_order() {
        let ranks = ThreadCollective::group(3);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    let mut out = Vec::new();
                    for round in 0..4 {
                        let mut buf = vec![c.rank() as f64 + round as f64, 1.0];
                        c.all_reduce_sum(&mut buf).unwrap();
                        out.push(buf);
                    }
                    out
                })
            })
            .collect();
        for h in handles {
            let out = h.join().unwrap();
            for (round, buf) in out.iter().enumerate() {
                assert_eq!(buf[0], 3.0 + 3.0 * round as f64);
                assert_eq!(buf[1], 3.0);
            }
        }
    }

    #[test]
    fn test_missing_rank_times_out() {
        let mut ranks = ThreadCollective::group_with_timeout(2, Duration::from_millis(50));
        let _absent = ranks.pop();
        let mut buf = vec![1.0];
        let err = ranks[0].all_reduce_sum(&mut buf).unwrap_err();
        assert!(matches!(err, DistributedError::Timeout { rank: 0, missing: 1, .. }));
        // the group stays poisoned afterwards
        assert!(matches!(ranks[0].all_reduce_sum(&mut buf), Err(DistributedError::Poisoned)));
    }
}
