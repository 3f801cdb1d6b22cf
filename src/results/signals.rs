//! Terminating signals delivered while a scan is running.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{debug, warn};

pub const SIGINT: i32 = 2;
pub const SIGQUIT: i32 = 3;
pub const SIGPIPE: i32 = 13;
pub const SIGTERM: i32 = 15;

const HANDLED: [(i32, fn() -> SignalKind); 4] = [
    (SIGINT, SignalKind::interrupt),
    (SIGPIPE, SignalKind::pipe),
    (SIGQUIT, SignalKind::quit),
    (SIGTERM, SignalKind::terminate),
];

#[derive(Default)]
struct Inner {
    pending: AtomicI32,
    notify: Notify,
}

/// Records the most recent terminating signal until the scan consumes it.
#[derive(Clone, Default)]
pub struct SignalState {
    inner: Arc<Inner>,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs handlers for SIGINT, SIGPIPE, SIGQUIT and SIGTERM.
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen(&self) -> std::io::Result<()> {
        for (signum, kind) in HANDLED {
            let mut stream = signal(kind())?;
            let state = self.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    warn!(signum, "Caught terminating signal");
                    state.raise(signum);
                }
            });
        }
        debug!("Signal handlers installed");
        Ok(())
    }

    pub fn raise(&self, signum: i32) {
        self.inner.pending.store(signum, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Takes the pending signal, if any.
    pub fn take(&self) -> Option<i32> {
        match self.inner.pending.swap(0, Ordering::SeqCst) {
            0 => None,
            signum => Some(signum),
        }
    }

    /// Waits until a signal is pending and takes it.
    pub async fn recv(&self) -> i32 {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(signum) = self.take() {
                return signum;
            }
            notified.await;
        }
    }
}

/// Sends `signum` to process `pid` through kill(1).
pub fn forward(signum: i32, pid: u32) -> std::io::Result<()> {
    let status = std::process::Command::new("kill")
        .arg("-s")
        .arg(signum.to_string())
        .arg(pid.to_string())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("kill exited with {}", status),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_take_clears_pending() {
        let state = SignalState::new();
        assert_eq!(state.take(), None);
        state.raise(SIGTERM);
        assert_eq!(state.take(), Some(SIGTERM));
        assert_eq!(state.take(), None);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_raise() {
        let state = SignalState::new();
        let raiser = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            raiser.raise(SIGINT);
        });

        let signum = tokio::time::timeout(Duration::from_secs(5), state.recv())
            .await
            .unwrap();
        assert_eq!(signum, SIGINT);
    }

    #[tokio::test]
    async fn test_recv_returns_already_pending() {
        let state = SignalState::new();
        state.raise(SIGQUIT);
        assert_eq!(state.recv().await, SIGQUIT);
    }
}
