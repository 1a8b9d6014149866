//! # Alert Dispatcher
//!
//! Fire-and-forget delivery of low-stock emails.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  inventory write (tx) ──► notification row (same tx) ──► COMMIT         │
//! │                                                            │            │
//! │                                              AlertHandle::try_dispatch  │
//! │                                              (never blocks, never fails │
//! │                                               the inventory write)      │
//! │                                                            │            │
//! │                                                            ▼ mpsc       │
//! │                                     AlertDispatcher::run (tokio task)   │
//! │                                                            │            │
//! │                                             spawn_blocking(Mailer::send)│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery mechanics live behind the [`Mailer`] trait. The default
//! [`TracingMailer`] only writes a log line.

use std::sync::Arc;

use storekeep_core::LowStockAlert;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert queue is full")]
    QueueFull,

    #[error("Alert dispatcher has stopped")]
    Closed,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// An email to staff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl AlertEmail {
    pub fn low_stock(alert: &LowStockAlert, to: &[String]) -> Self {
        AlertEmail {
            to: to.to_vec(),
            subject: alert.title(),
            body: alert.message(),
        }
    }
}

/// Sends an email. Runs on the blocking pool, so implementations may block.
pub trait Mailer: Send + Sync + 'static {
    fn send(&self, email: &AlertEmail) -> Result<(), AlertError>;
}

/// Logs instead of sending. Used when no transport is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMailer;

impl Mailer for TracingMailer {
    fn send(&self, email: &AlertEmail) -> Result<(), AlertError> {
        info!(
            to = ?email.to,
            subject = %email.subject,
            "Alert email (log only)"
        );
        Ok(())
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Background task draining the alert queue.
pub struct AlertDispatcher {
    mailer: Arc<dyn Mailer>,
    rx: mpsc::Receiver<AlertEmail>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Cloneable sender side of the dispatcher.
#[derive(Debug, Clone)]
pub struct AlertHandle {
    tx: mpsc::Sender<AlertEmail>,
    shutdown_tx: mpsc::Sender<()>,
}

impl AlertHandle {
    /// Queues an email without waiting.
    pub fn try_dispatch(&self, email: AlertEmail) -> Result<(), AlertError> {
        self.tx.try_send(email).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AlertError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => AlertError::Closed,
        })
    }

    /// Asks the dispatcher to stop after the email in flight.
    pub async fn shutdown(&self) -> Result<(), AlertError> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| AlertError::Closed)
    }
}

impl AlertDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, queue_size: usize) -> (Self, AlertHandle) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let dispatcher = AlertDispatcher {
            mailer,
            rx,
            shutdown_rx,
        };
        (dispatcher, AlertHandle { tx, shutdown_tx })
    }

    /// Creates the dispatcher and spawns it on the current runtime.
    pub fn spawn(mailer: Arc<dyn Mailer>, queue_size: usize) -> AlertHandle {
        let (dispatcher, handle) = Self::new(mailer, queue_size);
        tokio::spawn(dispatcher.run());
        handle
    }

    pub async fn run(mut self) {
        debug!("Alert dispatcher starting");

        loop {
            tokio::select! {
                maybe_email = self.rx.recv() => {
                    let Some(email) = maybe_email else { break };
                    self.deliver(email).await;
                }

                _ = self.shutdown_rx.recv() => {
                    debug!("Alert dispatcher shutting down");
                    break;
                }
            }
        }

        debug!("Alert dispatcher stopped");
    }

    async fn deliver(&self, email: AlertEmail) {
        let mailer = Arc::clone(&self.mailer);
        let subject = email.subject.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email)).await;

        match result {
            Ok(Ok(())) => debug!(subject = %subject, "Alert delivered"),
            Ok(Err(e)) => warn!(subject = %subject, error = %e, "Alert delivery failed"),
            Err(e) => warn!(subject = %subject, error = %e, "Alert delivery task panicked"),
        }
    }
}
