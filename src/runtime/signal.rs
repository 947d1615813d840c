//! Binary signals shared between the control loop and its callers
//!
//! Both [`Gate`] and [`CancelToken`] can be polled without blocking (to report
//! status) and awaited (to block the control loop).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::error::ExecError;

/// Manual-reset open/closed signal
#[derive(Debug, Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    /// Create a gate in the given state
    pub fn new(open: bool) -> Self {
        let (tx, _rx) = watch::channel(open);
        Self { tx: Arc::new(tx) }
    }

    /// Open the gate, releasing waiters
    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    /// Close the gate
    pub fn close(&self) {
        self.tx.send_replace(false);
    }

    /// Non-blocking poll
    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the gate is open
    pub async fn opened(&self) {
        self.wait_for(true).await;
    }

    /// Wait until the gate is closed
    pub async fn closed(&self) {
        self.wait_for(false).await;
    }

    async fn wait_for(&self, state: bool) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close underneath us.
        let _ = rx.wait_for(|open| *open == state).await;
    }
}

/// One-shot cancellation shared by every suspension point
#[derive(Debug, Clone)]
pub struct CancelToken {
    gate: Gate,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create an un-cancelled token
    pub fn new() -> Self {
        Self {
            gate: Gate::new(false),
        }
    }

    /// Cancel; every pending and future sleep returns immediately
    pub fn cancel(&self) {
        self.gate.open();
    }

    /// Non-blocking poll
    pub fn is_cancelled(&self) -> bool {
        self.gate.is_open()
    }

    /// Resolve once cancelled
    pub async fn cancelled(&self) {
        self.gate.opened().await;
    }

    /// Sleep unless cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<(), ExecError> {
        if self.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled() => Err(ExecError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_wakes_waiters_on_open() {
        let gate = Gate::new(false);
        assert!(!gate.is_open());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.opened().await })
        };
        gate.open();
        waiter.await.unwrap();
        assert!(gate.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let token = CancelToken::new();
        let sleeper = {
            let token = token.clone();
            tokio::spawn(async move { token.sleep(Duration::from_secs(3600)).await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        assert!(matches!(sleeper.await.unwrap(), Err(ExecError::Cancelled)));
        assert!(matches!(
            token.sleep(Duration::from_millis(1)).await,
            Err(ExecError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_cancel() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(250)).await.is_ok());
    }
}
