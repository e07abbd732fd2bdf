//! Outbound notification contract. Transport (chat, webhook, etc.) is an
//! external collaborator; this crate only states the contract and ships two
//! reference implementations used in tests and no-op deployments.

use async_trait::async_trait;
use tracing::info;

use crate::error::EngineError;
use crate::lifecycle::Signal;

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub failed: usize,
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Only invoked on signals already filtered by `Signal::is_dispatchable`.
    /// Dispatch failures never roll back the signal write; the signal stays
    /// `Active` and the dispatcher is expected to retry independently.
    async fn dispatch(&self, signals: &[Signal]) -> Result<DispatchOutcome, EngineError>;
}

/// Drops everything. Used where dispatch is wired but no transport exists yet.
pub struct NullDispatcher;

#[async_trait]
impl Dispatcher for NullDispatcher {
    async fn dispatch(&self, signals: &[Signal]) -> Result<DispatchOutcome, EngineError> {
        Ok(DispatchOutcome {
            sent: 0,
            failed: signals.len(),
        })
    }
}

/// Logs each dispatchable signal at info level. Useful for local runs and
/// as a template for a real transport.
pub struct LoggingDispatcher;

#[async_trait]
impl Dispatcher for LoggingDispatcher {
    async fn dispatch(&self, signals: &[Signal]) -> Result<DispatchOutcome, EngineError> {
        for signal in signals {
            info!(
                signal_key = %signal.signal_key,
                severity = ?signal.severity,
                label = ?signal.confidence_label,
                "signal dispatched"
            );
        }
        Ok(DispatchOutcome {
            sent: signals.len(),
            failed: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_dispatcher_reports_everything_failed() {
        let dispatcher = NullDispatcher;
        let outcome = dispatcher.dispatch(&[]).await.unwrap();
        assert_eq!(outcome.sent, 0);
        assert_eq!(outcome.failed, 0);
    }
}
