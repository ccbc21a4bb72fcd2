//! Render-target pool.
//!
//! Targets are matched on their exact [`TargetDesc`]. Released targets go to
//! a free list and are handed out again before anything new is allocated;
//! nothing is destroyed until the pool is cleared.

use crate::backend::{RenderBackend, TargetDesc, TextureHandle};
use crate::error::BackendError;

/// A backend image owned by one stage while in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    /// Immutable description.
    pub desc: TargetDesc,
    /// Backend handle.
    pub handle: TextureHandle,
}

/// Allocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful `acquire` calls.
    pub acquired: u64,
    /// `release` calls.
    pub released: u64,
    /// Targets created on the backend.
    pub created: u64,
    /// Targets destroyed on the backend.
    pub destroyed: u64,
}

/// Free list of render targets.
#[derive(Debug, Default)]
pub struct TargetPool {
    free: Vec<RenderTarget>,
    stats: PoolStats,
}

impl TargetPool {
    /// Empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuses a free target matching `desc` exactly, else creates one.
    pub fn acquire(
        &mut self,
        backend: &mut dyn RenderBackend,
        desc: &TargetDesc,
    ) -> Result<RenderTarget, BackendError> {
        let target = match self.free.iter().position(|t| t.desc == *desc) {
            Some(pos) => self.free.swap_remove(pos),
            None => {
                let handle = backend.create_target(desc)?;
                self.stats.created += 1;
                tracing::trace!(%handle, width = desc.width, height = desc.height, "target created");
                RenderTarget {
                    desc: *desc,
                    handle,
                }
            }
        };
        self.stats.acquired += 1;
        Ok(target)
    }

    /// Returns a target to the free list.
    pub fn release(&mut self, target: RenderTarget) {
        self.stats.released += 1;
        self.free.push(target);
    }

    /// Ensures at least `count` free targets matching `desc`.
    pub fn prewarm(
        &mut self,
        backend: &mut dyn RenderBackend,
        desc: &TargetDesc,
        count: usize,
    ) -> Result<(), BackendError> {
        let have = self.free.iter().filter(|t| t.desc == *desc).count();
        for _ in have..count {
            let handle = backend.create_target(desc)?;
            self.stats.created += 1;
            self.free.push(RenderTarget {
                desc: *desc,
                handle,
            });
        }
        Ok(())
    }

    /// Destroys every free target.
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for target in self.free.drain(..) {
            backend.destroy_target(target.handle);
            self.stats.destroyed += 1;
        }
    }

    /// Destroys one target that is not in the pool.
    pub fn destroy(&mut self, backend: &mut dyn RenderBackend, target: RenderTarget) {
        backend.destroy_target(target.handle);
        self.stats.destroyed += 1;
    }

    /// Number of free targets.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Counters since creation.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::{ProgramLibrary, SoftwareBackend};
    use std::sync::Arc;

    fn backend() -> SoftwareBackend {
        SoftwareBackend::new(Arc::new(ProgramLibrary::new()))
    }

    #[test]
    fn test_release_then_acquire_reuses() {
        let mut b = backend();
        let mut pool = TargetPool::new();
        let desc = TargetDesc::new(8, 8);
        let t = pool.acquire(&mut b, &desc).unwrap();
        pool.release(t);
        let again = pool.acquire(&mut b, &desc).unwrap();
        assert_eq!(again.handle, t.handle);
        assert_eq!(pool.stats().created, 1);
        assert_eq!(pool.stats().acquired, 2);
    }

    #[test]
    fn test_exact_match_only() {
        let mut b = backend();
        let mut pool = TargetPool::new();
        let t = pool.acquire(&mut b, &TargetDesc::new(8, 8)).unwrap();
        pool.release(t);
        let other = pool
            .acquire(&mut b, &TargetDesc::new(8, 8).with_depth(true))
            .unwrap();
        assert_ne!(other.handle, t.handle);
        assert_eq!(pool.free_len(), 1);
    }

    #[test]
    fn test_prewarm_and_clear() {
        let mut b = backend();
        let mut pool = TargetPool::new();
        let desc = TargetDesc::new(4, 4);
        pool.prewarm(&mut b, &desc, 3).unwrap();
        pool.prewarm(&mut b, &desc, 2).unwrap();
        assert_eq!(pool.free_len(), 3);
        assert_eq!(b.live_targets(), 3);
        pool.clear(&mut b);
        assert_eq!(b.live_targets(), 0);
        assert_eq!(pool.stats().destroyed, 3);
    }

    #[test]
    fn test_acquire_failure_propagates() {
        let mut b = backend().with_texel_budget(10);
        let mut pool = TargetPool::new();
        assert!(pool.acquire(&mut b, &TargetDesc::new(4, 4)).is_err());
        assert_eq!(pool.stats().acquired, 0);
    }
}
