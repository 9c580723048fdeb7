use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// Allocation error
// ---------------------------------------------------------------------------

/// Returned when an [`Allocator`] refuses to grant an allocation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("allocation of {requested} bytes refused: {reason}")]
pub struct AllocationError {
    /// Number of bytes that were requested.
    pub requested: usize,
    /// Why the allocator refused.
    pub reason: String,
}

impl AllocationError {
    pub(crate) fn new(requested: usize, reason: impl Into<String>) -> Self {
        Self {
            requested,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Allocator capability
// ---------------------------------------------------------------------------

/// Accounting capability charged for every object a [`Client`] owns on the
/// caller's behalf.
///
/// The client asks for permission before it stores a managed or charged
/// attribute object and releases the same number of bytes when the object
/// goes away. Storage itself always comes from the process allocator; this
/// trait only decides whether the client may keep growing and lets callers
/// observe how much it holds.
///
/// Implementations must be cheap to call and must never block.
///
/// [`Client`]: crate::Client
pub trait Allocator: Send + Sync + fmt::Debug {
    /// Ask for `size` bytes. An `Err` surfaces to the caller as
    /// [`WarrenError::OutOfMemory`](crate::WarrenError::OutOfMemory) and the
    /// object is not created.
    fn allocate(&self, size: usize) -> Result<(), AllocationError>;

    /// Return `size` bytes previously granted by [`allocate`](Self::allocate).
    fn release(&self, size: usize);
}

// ---------------------------------------------------------------------------
// Default allocator
// ---------------------------------------------------------------------------

/// The allocator used when none is configured: grants every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAllocator;

impl Allocator for DefaultAllocator {
    fn allocate(&self, _size: usize) -> Result<(), AllocationError> {
        Ok(())
    }

    fn release(&self, _size: usize) {}
}

// ---------------------------------------------------------------------------
// Quota allocator
// ---------------------------------------------------------------------------

/// An [`Allocator`] that refuses requests past a fixed byte budget.
///
/// # Example
///
/// ```rust
/// use warren::{Allocator, QuotaAllocator};
///
/// let quota = QuotaAllocator::new(64);
/// assert!(quota.allocate(48).is_ok());
/// assert!(quota.allocate(48).is_err());
/// quota.release(48);
/// assert_eq!(quota.used(), 0);
/// ```
#[derive(Debug)]
pub struct QuotaAllocator {
    limit: usize,
    used: AtomicUsize,
}

impl QuotaAllocator {
    /// Create a quota of `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Bytes currently granted.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// The configured budget.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Allocator for QuotaAllocator {
    fn allocate(&self, size: usize) -> Result<(), AllocationError> {
        let mut used = self.used.load(Ordering::Relaxed);
        loop {
            let next = used.checked_add(size).filter(|n| *n <= self.limit);
            let Some(next) = next else {
                return Err(AllocationError::new(
                    size,
                    format!("quota exceeded ({used} of {} bytes in use)", self.limit),
                ));
            };
            match self
                .used
                .compare_exchange_weak(used, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Ok(()),
                Err(actual) => used = actual,
            }
        }
    }

    fn release(&self, size: usize) {
        // Saturate rather than underflow on a mismatched release.
        let mut used = self.used.load(Ordering::Relaxed);
        loop {
            let next = used.saturating_sub(size);
            match self
                .used
                .compare_exchange_weak(used, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => used = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grants_everything() {
        let alloc = DefaultAllocator;
        assert!(alloc.allocate(usize::MAX).is_ok());
        alloc.release(usize::MAX);
    }

    #[test]
    fn test_quota_refuses_past_limit() {
        let quota = QuotaAllocator::new(100);
        assert!(quota.allocate(60).is_ok());
        let err = quota.allocate(60).unwrap_err();
        assert_eq!(err.requested, 60);
        assert_eq!(quota.used(), 60);
    }

    #[test]
    fn test_quota_release_restores_budget() {
        let quota = QuotaAllocator::new(100);
        quota.allocate(100).unwrap();
        quota.release(40);
        assert_eq!(quota.used(), 60);
        assert!(quota.allocate(40).is_ok());
    }

    #[test]
    fn test_quota_release_saturates() {
        let quota = QuotaAllocator::new(100);
        quota.allocate(10).unwrap();
        quota.release(50);
        assert_eq!(quota.used(), 0);
    }
}
