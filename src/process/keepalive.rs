//! Host-process keep-alive.
//!
//! The hosting environment may reclaim an engine process that nothing keeps
//! alive.  [`ProcessHost`] counts outstanding [`KeepAliveToken`]s; exit is
//! permitted only when the count is zero.  A token is released by
//! [`KeepAliveToken::invalidate`] or by dropping it, and releasing twice has
//! no further effect.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct HostState {
    keep_alive: AtomicUsize,
    exited: AtomicBool,
}

/// Handle on the hosting environment of one engine process.
#[derive(Debug, Clone, Default)]
pub struct ProcessHost {
    state: Arc<HostState>,
}

impl ProcessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the keep-alive count.  The host will not exit while the
    /// returned token is valid.
    pub fn acquire_keep_alive(&self) -> KeepAliveToken {
        let count = self.state.keep_alive.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("process: keep-alive acquired ({count} held)");
        KeepAliveToken {
            state: Arc::clone(&self.state),
            valid: AtomicBool::new(true),
        }
    }

    pub fn keep_alive_count(&self) -> usize {
        self.state.keep_alive.load(Ordering::SeqCst)
    }

    pub fn is_exit_permitted(&self) -> bool {
        self.keep_alive_count() == 0
    }

    /// Record that the host has let the process go.
    pub fn mark_exited(&self) {
        self.state.exited.store(true, Ordering::SeqCst);
    }

    pub fn has_exited(&self) -> bool {
        self.state.exited.load(Ordering::SeqCst)
    }
}

/// One unit of the keep-alive count.
#[derive(Debug)]
pub struct KeepAliveToken {
    state: Arc<HostState>,
    valid: AtomicBool,
}

impl KeepAliveToken {
    /// Release this token's hold.  Returns `true` only for the call that
    /// actually released it.
    pub fn invalidate(&self) -> bool {
        if !self.valid.swap(false, Ordering::SeqCst) {
            return false;
        }
        let previous = self
            .state
            .keep_alive
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        log::debug!(
            "process: keep-alive released ({} held)",
            previous.saturating_sub(1)
        );
        true
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

impl Drop for KeepAliveToken {
    fn drop(&mut self) {
        self.invalidate();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_host_permits_exit() {
        let host = ProcessHost::new();
        assert_eq!(host.keep_alive_count(), 0);
        assert!(host.is_exit_permitted());
        assert!(!host.has_exited());
    }

    #[test]
    fn invalidate_is_idempotent() {
        let host = ProcessHost::new();
        let _unrelated = host.acquire_keep_alive();
        let token = host.acquire_keep_alive();
        assert_eq!(host.keep_alive_count(), 2);

        assert!(token.invalidate());
        assert!(!token.invalidate());
        assert!(!token.is_valid());
        assert_eq!(host.keep_alive_count(), 1);

        drop(token);
        assert_eq!(host.keep_alive_count(), 1);
        assert!(!host.is_exit_permitted());
    }

    #[test]
    fn drop_releases() {
        let host = ProcessHost::new();
        {
            let _token = host.acquire_keep_alive();
            assert!(!host.is_exit_permitted());
        }
        assert!(host.is_exit_permitted());
    }

    #[test]
    fn clones_share_the_count() {
        let host = ProcessHost::new();
        let other = host.clone();
        let _token = other.acquire_keep_alive();
        assert_eq!(host.keep_alive_count(), 1);
        host.mark_exited();
        assert!(other.has_exited());
    }
}
