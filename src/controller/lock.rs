// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! FIFO serialization lock for signing and state-altering operations.
//!
//! ## Semantics
//!
//! - Non-bypass callers enter the critical section in the exact order they
//!   called [`SigningLock::acquire`].
//! - `bypass = true` returns a no-op token without touching the queue. Only
//!   read-only operations may use it.
//! - The section is released when the [`ReleaseToken`] is dropped, so every
//!   exit path (including `?` and panics) releases it.
//! - With a timeout configured, a waiter gives up with [`LockError::Timeout`].
//!
//! Ownership is handed over directly from the releasing holder to the next
//! waiter through a one-shot ticket; there is no window in which a newcomer
//! can jump the queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

/// Errors returned by [`SigningLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {0:?} waiting for the signing lock")]
    Timeout(Duration),
}

#[derive(Debug, Default)]
struct LockState {
    locked: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// FIFO mutual exclusion with explicit wait tickets.
#[derive(Debug, Clone, Default)]
pub struct SigningLock {
    state: Arc<Mutex<LockState>>,
    timeout: Option<Duration>,
}

impl SigningLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock whose non-bypass acquisitions give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: Arc::default(),
            timeout: Some(timeout),
        }
    }

    /// Configured wait bound, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Enter the critical section, or skip the queue with `bypass`.
    pub async fn acquire(&self, bypass: bool) -> Result<ReleaseToken, LockError> {
        if bypass {
            return Ok(ReleaseToken::noop());
        }
        match self.timeout {
            Some(timeout) => self.acquire_timeout(timeout).await,
            None => Ok(self.acquire_unbounded().await),
        }
    }

    /// Enter the critical section, waiting as long as it takes.
    pub async fn acquire_unbounded(&self) -> ReleaseToken {
        match self.enqueue() {
            None => self.token(),
            Some(ticket) => {
                // The sender is only dropped after sending, or when the lock
                // itself is gone; either way we own the section now.
                let _ = ticket.await;
                self.token()
            }
        }
    }

    /// Enter the critical section, giving up after `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<ReleaseToken, LockError> {
        let mut ticket = match self.enqueue() {
            None => return Ok(self.token()),
            Some(ticket) => ticket,
        };

        match tokio::time::timeout(timeout, &mut ticket).await {
            Ok(_) => Ok(self.token()),
            Err(_) => {
                // Refuse any further hand-over, then check whether one
                // raced in before the close.
                ticket.close();
                match ticket.try_recv() {
                    Ok(()) => Ok(self.token()),
                    Err(_) => {
                        tracing::warn!(?timeout, "signing lock wait timed out");
                        Err(LockError::Timeout(timeout))
                    }
                }
            }
        }
    }

    /// Whether a holder is currently inside the critical section.
    pub fn is_locked(&self) -> bool {
        self.lock_state().locked
    }

    /// Number of callers waiting behind the holder.
    pub fn queue_len(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// Take the lock if free, otherwise install a ticket at the tail.
    fn enqueue(&self) -> Option<oneshot::Receiver<()>> {
        let mut state = self.lock_state();
        if !state.locked {
            state.locked = true;
            None
        } else {
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            Some(rx)
        }
    }

    fn release(&self) {
        let mut state = self.lock_state();
        while let Some(next) = state.waiters.pop_front() {
            // A closed ticket belongs to a waiter that timed out
            if next.send(()).is_ok() {
                return;
            }
        }
        state.locked = false;
    }

    fn token(&self) -> ReleaseToken {
        ReleaseToken {
            lock: Some(self.clone()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of holding the critical section. Dropping it releases the lock.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the token is dropped"]
pub struct ReleaseToken {
    lock: Option<SigningLock>,
}

impl ReleaseToken {
    fn noop() -> Self {
        Self { lock: None }
    }

    /// Whether this token came from a bypass acquisition.
    pub fn is_bypass(&self) -> bool {
        self.lock.is_none()
    }

    /// Release explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ReleaseToken {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
    }
}
