//! Background SLA sweeper (§4.9): polls for pending entries whose
//! deadline has passed and escalates them. Runs on its own tokio task;
//! the poll interval is `approvals.sweep_interval_secs`, capped at 30s
//! so no entry sits expired for more than one interval past its SLA.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::Result;

use super::queue::ApprovalQueue;

pub struct ApprovalSweeper {
    queue: Arc<ApprovalQueue>,
    interval_seconds: u64,
}

impl ApprovalSweeper {
    pub fn new(queue: Arc<ApprovalQueue>, interval_seconds: u64) -> Self {
        Self { queue, interval_seconds: interval_seconds.min(30).max(1) }
    }

    /// Runs a single sweep pass: escalates every currently past-SLA
    /// pending entry and returns how many it escalated. Exposed
    /// separately from `start` so tests can drive one pass
    /// deterministically.
    pub async fn sweep_once(&self) -> Result<usize> {
        let due = self.queue.find_past_sla().await?;
        let mut escalated = 0;
        for approval in due {
            match self.queue.escalate(approval.id).await {
                Ok(Some(_)) => escalated += 1,
                Ok(None) => {}
                Err(err) => warn!(approval_id = %approval.id, error = %err, "failed to escalate approval"),
            }
        }
        Ok(escalated)
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(self.interval_seconds));
            loop {
                ticker.tick().await;
                match self.sweep_once().await {
                    Ok(count) if count > 0 => info!(count, "escalated past-SLA approvals"),
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "approval sweep failed"),
                }
            }
        })
    }
}
