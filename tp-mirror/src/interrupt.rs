//! Interrupt handling for SIGINT and SIGTERM.
//!
//! One cancellation token tree per session:
//! - the orchestrator context owns the root; on interrupt the session rolls back
//!   and exits cleanly
//! - worker contexts are children; a worker that sees cancellation stops at once
//!   without touching `current`/`backup`

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Orchestrator,
    Worker,
}

/// Cancellation handle carried by a task, tagged with its role
#[derive(Debug, Clone)]
pub struct CancelContext {
    role: Role,
    token: CancellationToken,
}

impl CancelContext {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Cancel this context and every scope derived from it
    pub fn cancel(&self) {
        self.token.cancel()
    }

    /// A worker scope: cancelled with this context, but cancelling it leaves
    /// this context untouched
    pub fn worker_scope(&self) -> CancelContext {
        CancelContext {
            role: Role::Worker,
            token: self.token.child_token(),
        }
    }
}

/// Session-wide interrupt source
#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    token: CancellationToken,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for the orchestrating task
    pub fn orchestrator(&self) -> CancelContext {
        CancelContext {
            role: Role::Orchestrator,
            token: self.token.clone(),
        }
    }

    /// Trigger the interrupt path programmatically
    pub fn interrupt(&self) {
        self.token.cancel()
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Listen for SIGINT/SIGTERM in the background and cancel on the first one
    pub fn install(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            match wait_for_signal().await {
                Ok(name) => {
                    info!("Received {}, rolling back", name);
                    token.cancel();
                }
                Err(e) => warn!("Failed to install interrupt handler: {}", e),
            }
        })
    }
}

/// Wait for an interrupt signal (SIGTERM or SIGINT)
async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    let terminate = async move {
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => result.map(|_| "SIGINT (Ctrl+C)"),
        _ = terminate => Ok("SIGTERM"),
    }
}
