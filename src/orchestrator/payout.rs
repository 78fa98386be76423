//! Payout orchestration (§3, §4.6 supplement): drives a `Payout` from
//! `Pending` through manual review, batching, and processor dispatch.
//! Funds are reserved against the creator's cached balance the moment
//! a payout is requested, not when it's approved, so a second request
//! against the same balance during the review window can't double
//! spend it. Every payout goes through `PayoutReview`; unlike refunds
//! there is no auto-approve tier, since a payout leaves the platform
//! entirely.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::LimitsConfig;
use crate::error::{AppError, Result};
use crate::events::bus::EventBus;
use crate::events::types::{EventEnvelope, EventType, PayoutBatchStatusChanged};
use crate::models::{
    ApprovalType, Currency, Payout, PayoutBatch, PayoutBatchStatus, PayoutMethod, PayoutStatus,
};
use crate::processors::{PayoutSendRequest as AdapterPayoutSendRequest, ProcessorRegistry};
use crate::repositories::{BalanceRepository, PayoutBatchRepository, PayoutRepository};

use super::locks::StripedLocks;
use super::ApprovalQueue;

fn method_key(method: PayoutMethod) -> &'static str {
    match method {
        PayoutMethod::BankTransfer => "bank_transfer",
        PayoutMethod::Crypto => "crypto",
        PayoutMethod::Check => "check",
    }
}

pub struct PayoutOrchestrator {
    payouts: PayoutRepository,
    batches: PayoutBatchRepository,
    balances: BalanceRepository,
    processors: Arc<ProcessorRegistry>,
    approvals: Arc<ApprovalQueue>,
    events: Arc<EventBus>,
    limits: LimitsConfig,
    clock: SharedClock,
    locks: StripedLocks,
}

impl PayoutOrchestrator {
    pub fn new(
        payouts: PayoutRepository,
        batches: PayoutBatchRepository,
        balances: BalanceRepository,
        processors: Arc<ProcessorRegistry>,
        approvals: Arc<ApprovalQueue>,
        events: Arc<EventBus>,
        limits: LimitsConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            payouts,
            batches,
            balances,
            processors,
            approvals,
            events,
            limits,
            clock,
            locks: StripedLocks::new(64),
        }
    }

    /// Requests a payout for `creator_id`, reserving the debit amount
    /// against the creator's cached balance and queuing a
    /// `PayoutReview` approval entry.
    pub async fn request_payout(
        &self,
        creator_id: Uuid,
        method: PayoutMethod,
        amount_minor: i64,
        currency: Currency,
    ) -> Result<Payout> {
        let _guard = self.locks.lock(creator_id).await;

        let minimum = self
            .limits
            .payout_minimums_minor
            .get(method_key(method))
            .copied()
            .unwrap_or(0);
        if amount_minor < minimum {
            return Err(AppError::Validation(format!(
                "amount {amount_minor} is below the {minimum} minimum for {}",
                method_key(method)
            )));
        }

        let payout = Payout::new(creator_id, method, amount_minor, currency, self.clock.now());
        let total_debit = payout.total_debit_minor();

        self.balances.reserve(creator_id, currency, total_debit).await?;

        let payout = self.payouts.create(&payout).await?;
        self.approvals
            .enqueue(payout.id, ApprovalType::PayoutReview, 0, None)
            .await?;

        Ok(payout)
    }

    /// Applies a decision already recorded against the approval entry.
    /// Denial releases the reservation and cancels the payout; approval
    /// advances it to `Approved` so the next batching pass can pick it
    /// up.
    pub async fn apply_decision(&self, payout_id: Uuid, approved: bool) -> Result<Payout> {
        let mut payout = self
            .payouts
            .find_by_id(payout_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payout {payout_id}")))?;

        let _guard = self.locks.lock(payout.creator_id).await;

        if approved {
            payout
                .transition_to(PayoutStatus::Approved, self.clock.now())
                .map_err(|e| AppError::Validation(e.to_string()))?;
        } else {
            payout
                .transition_to(PayoutStatus::Cancelled, self.clock.now())
                .map_err(|e| AppError::Validation(e.to_string()))?;
            self.balances
                .release_reservation(payout.creator_id, payout.currency, payout.total_debit_minor())
                .await?;
        }

        self.payouts
            .update_with_version(&payout)
            .await?
            .ok_or(AppError::VersionConflict { entity: "payout", id: payout_id })
    }

    /// Assigns an approved payout to the open batch for its currency,
    /// opening a new one if none is open. Re-verifies
    /// `Σ payouts.net = batch.net` after the membership write so a
    /// missed concurrent assignment surfaces immediately rather than at
    /// send time.
    pub async fn assign_to_open_batch(&self, payout_id: Uuid) -> Result<PayoutBatch> {
        let payout = self
            .payouts
            .find_by_id(payout_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payout {payout_id}")))?;

        if payout.status != PayoutStatus::Approved {
            return Err(AppError::Validation(format!(
                "payout {payout_id} is not approved ({:?})",
                payout.status
            )));
        }

        let mut batch = match self.batches.find_open(payout.currency).await? {
            Some(batch) => batch,
            None => self.batches.create(&PayoutBatch::new(payout.currency, self.clock.now())).await?,
        };

        batch
            .add_member(payout.net_minor, self.clock.now())
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let batch = self
            .batches
            .update_with_version(&batch)
            .await?
            .ok_or(AppError::VersionConflict { entity: "payout_batch", id: batch.id })?;

        let member_sum = self.payouts.sum_net_by_batch(batch.id).await? + payout.net_minor;
        batch
            .verify_net(member_sum)
            .map_err(|e| AppError::LedgerConflict(e.to_string()))?;

        self.payouts.assign_to_batch(payout_id, batch.id).await?;

        Ok(batch)
    }

    /// Closes a batch to new members and dispatches every batched
    /// member to `processor_id`. A send failure fails only that payout
    /// and releases its reservation; the batch itself moves to `Sent`
    /// once at least one member dispatched successfully, or `Failed` if
    /// every member failed.
    pub async fn send_batch(&self, batch_id: Uuid, processor_id: &str) -> Result<PayoutBatch> {
        let mut batch = self
            .batches
            .find_by_id(batch_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payout batch {batch_id}")))?;

        let member_sum = self.payouts.sum_net_by_batch(batch_id).await?;
        batch.verify_net(member_sum).map_err(|e| AppError::LedgerConflict(e.to_string()))?;

        if batch.status == PayoutBatchStatus::Open {
            batch.close(self.clock.now());
            batch = self
                .batches
                .update_with_version(&batch)
                .await?
                .ok_or(AppError::VersionConflict { entity: "payout_batch", id: batch_id })?;
        }

        let members = self.payouts.find_by_batch(batch_id).await?;
        let mut any_sent = false;

        for mut payout in members {
            if payout.status != PayoutStatus::Batched {
                continue;
            }

            let req = AdapterPayoutSendRequest {
                payout_id: payout.id,
                amount_minor: payout.amount_minor,
                currency: payout.currency,
                method: payout.method,
                attempt: 1,
            };

            let outcome = self
                .processors
                .dispatch(processor_id, |adapter| async move { adapter.payout_send(&req).await })
                .await;

            match outcome {
                Ok(_) => {
                    payout
                        .transition_to(PayoutStatus::Sent, self.clock.now())
                        .map_err(|e| AppError::Validation(e.to_string()))?;
                    self.payouts.update_with_version(&payout).await?;
                    any_sent = true;
                }
                Err(err) => {
                    payout
                        .transition_to(PayoutStatus::Failed, self.clock.now())
                        .map_err(|e| AppError::Validation(e.to_string()))?;
                    self.payouts.update_with_version(&payout).await?;
                    self.balances
                        .release_reservation(payout.creator_id, payout.currency, payout.total_debit_minor())
                        .await?;
                    warn!(payout_id = %payout.id, error = %err.message, "payout send failed");
                }
            }
        }

        batch.status = if any_sent { PayoutBatchStatus::Sent } else { PayoutBatchStatus::Failed };
        batch.version += 1;
        batch.updated_at = self.clock.now();
        let batch = self
            .batches
            .update_with_version(&batch)
            .await?
            .ok_or(AppError::VersionConflict { entity: "payout_batch", id: batch_id })?;

        if batch.status == PayoutBatchStatus::Sent {
            crate::observability::get_metrics()
                .record_payout_batch_sent(&batch.currency.to_string(), batch.payout_count as u64);
        }

        self.events
            .publish(EventEnvelope::new(
                EventType::PayoutBatchStatusChanged,
                batch.id,
                PayoutBatchStatusChanged {
                    batch_id: batch.id,
                    status: batch.status,
                    payout_count: batch.payout_count,
                    net_minor: batch.net_minor,
                    currency: batch.currency,
                },
            ))
            .await;

        Ok(batch)
    }

    /// Marks a sent payout completed once the processor confirms
    /// settlement (driven by the webhook ingestor), releasing the
    /// reservation and debiting it from the available balance for
    /// real.
    pub async fn complete_payout(&self, payout_id: Uuid) -> Result<Payout> {
        let mut payout = self
            .payouts
            .find_by_id(payout_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payout {payout_id}")))?;

        let _guard = self.locks.lock(payout.creator_id).await;

        payout
            .transition_to(PayoutStatus::Completed, self.clock.now())
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let total_debit = payout.total_debit_minor();
        self.balances.release_reservation(payout.creator_id, payout.currency, total_debit).await?;
        self.balances.debit(payout.creator_id, payout.currency, total_debit).await?;

        self.payouts
            .update_with_version(&payout)
            .await?
            .ok_or(AppError::VersionConflict { entity: "payout", id: payout_id })
    }

    /// Marks a sent or batched payout failed after dispatch (e.g. a
    /// bounced bank transfer the processor reports late), releasing its
    /// reservation back to available.
    pub async fn fail_payout(&self, payout_id: Uuid) -> Result<Payout> {
        let mut payout = self
            .payouts
            .find_by_id(payout_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payout {payout_id}")))?;

        let _guard = self.locks.lock(payout.creator_id).await;

        payout
            .transition_to(PayoutStatus::Failed, self.clock.now())
            .map_err(|e| AppError::Validation(e.to_string()))?;

        self.balances
            .release_reservation(payout.creator_id, payout.currency, payout.total_debit_minor())
            .await?;

        self.payouts
            .update_with_version(&payout)
            .await?
            .ok_or(AppError::VersionConflict { entity: "payout", id: payout_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_key_matches_config_map_naming() {
        assert_eq!(method_key(PayoutMethod::BankTransfer), "bank_transfer");
        assert_eq!(method_key(PayoutMethod::Crypto), "crypto");
        assert_eq!(method_key(PayoutMethod::Check), "check");
    }
}
