//! Exclusive ownership of the encoder across sessions.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::MirrorError;

/// Single-permit gate: at most one session holds the encoder.
#[derive(Debug, Clone)]
pub struct SessionSlot {
    permits: Arc<Semaphore>,
}

/// Proof that the holder owns the encoder. Dropping it frees the slot.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Claim the slot or fail with [`MirrorError::SessionBusy`].
    pub fn try_acquire(&self) -> Result<SessionPermit, MirrorError> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .map(|permit| SessionPermit { _permit: permit })
            .map_err(|_| MirrorError::SessionBusy)
    }

    /// Wait until the previous session has fully torn down.
    pub async fn acquire(&self) -> Result<SessionPermit, MirrorError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map(|permit| SessionPermit { _permit: permit })
            .map_err(|_| MirrorError::Other("session slot closed".into()))
    }

    /// `true` when no session holds the encoder.
    pub fn is_idle(&self) -> bool {
        self.permits.available_permits() == 1
    }
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_while_held() {
        let slot = SessionSlot::new();
        let permit = slot.try_acquire().unwrap();
        assert!(!slot.is_idle());
        assert!(matches!(slot.try_acquire(), Err(MirrorError::SessionBusy)));

        drop(permit);
        assert!(slot.is_idle());
        assert!(slot.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let slot = SessionSlot::new();
        let permit = slot.try_acquire().unwrap();

        let waiter = tokio::spawn({
            let slot = slot.clone();
            async move { slot.acquire().await.map(|_| ()) }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(permit);
        waiter.await.unwrap().unwrap();
    }
}
