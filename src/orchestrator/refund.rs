//! Refund and dispute orchestration (§4.6). A refund under
//! `limits.auto_approve_refund_limit_minor` is processed immediately;
//! anything larger goes through the approval queue first. Disputes
//! split on type: a retrieval is auto-responded with the existing
//! transaction evidence, a chargeback always creates a review entry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::LimitsConfig;
use crate::error::{AppError, Result};
use crate::events::bus::EventBus;
use crate::events::types::{DisputeLifecycle, EventEnvelope, EventType, RefundIssued};
use crate::ledger::Ledger;
use crate::models::{
    ApprovalType, Dispute, DisputeStage, DisputeType, EntryDirection, LedgerEntry, LedgerEntrySet,
    Refund, RefundDecisionSource, RefundStatus, Transaction, TransactionStatus,
};
use crate::processors::{ProcessorRegistry, RefundRequest as AdapterRefundRequest};
use crate::repositories::{DisputeRepository, RefundRepository, TransactionRepository};

use super::locks::StripedLocks;
use super::ApprovalQueue;

pub struct RefundOrchestrator {
    transactions: TransactionRepository,
    refunds: RefundRepository,
    disputes: DisputeRepository,
    ledger: Ledger,
    processors: Arc<ProcessorRegistry>,
    approvals: Arc<ApprovalQueue>,
    events: Arc<EventBus>,
    limits: LimitsConfig,
    clock: SharedClock,
    locks: StripedLocks,
}

impl RefundOrchestrator {
    pub fn new(
        transactions: TransactionRepository,
        refunds: RefundRepository,
        disputes: DisputeRepository,
        ledger: Ledger,
        processors: Arc<ProcessorRegistry>,
        approvals: Arc<ApprovalQueue>,
        events: Arc<EventBus>,
        limits: LimitsConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            transactions,
            refunds,
            disputes,
            ledger,
            processors,
            approvals,
            events,
            limits,
            clock,
            locks: StripedLocks::new(64),
        }
    }

    /// Requests a refund against `transaction_id`. Amounts under the
    /// configured auto-approve limit process immediately; everything
    /// else is queued for manual review and returned in `Pending`.
    pub async fn request_refund(
        &self,
        transaction_id: Uuid,
        amount_minor: i64,
        reason: impl Into<String>,
    ) -> Result<Refund> {
        let _guard = self.locks.lock(transaction_id).await;

        let txn = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))?;

        if amount_minor <= 0 || amount_minor > txn.remaining_refundable_minor() {
            return Err(AppError::Validation(format!(
                "refund amount {amount_minor} exceeds remaining refundable {}",
                txn.remaining_refundable_minor()
            )));
        }
        if !matches!(txn.status, TransactionStatus::Captured | TransactionStatus::Settled) {
            return Err(AppError::Validation(format!(
                "transaction {transaction_id} is not in a refundable state ({:?})",
                txn.status
            )));
        }

        let mut refund = Refund::new(transaction_id, amount_minor, txn.currency, reason, self.clock.now());

        if amount_minor <= self.limits.auto_approve_refund_limit_minor {
            refund = self.refunds.create(&refund).await?;
            self.process_refund(&txn, refund).await
        } else {
            refund = self.refunds.create(&refund).await?;
            self.approvals
                .enqueue(refund.id, ApprovalType::RefundReview, 0, None)
                .await?;
            Ok(refund)
        }
    }

    /// Carries out a refund already approved (auto or manual) against
    /// the processor and ledger, and advances the parent transaction.
    /// Bumps `txn.refunded_total_minor` and moves the transaction to
    /// `Refunded` once the running total reaches the captured amount
    /// (§4.6 refund state machine; the transaction only leaves
    /// `Captured`/`Settled` once it is refunded in full).
    pub async fn process_refund(&self, txn: &Transaction, mut refund: Refund) -> Result<Refund> {
        let processor_id = txn
            .processor_id
            .clone()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("transaction has no processor_id")))?;

        let req = AdapterRefundRequest {
            transaction_id: txn.id,
            processor_reference: txn
                .processor_response
                .as_ref()
                .and_then(|r| r.get("id").and_then(|v| v.as_str()))
                .unwrap_or_default()
                .to_string(),
            amount_minor: refund.amount_minor,
            attempt: 1,
        };

        let outcome = self
            .processors
            .dispatch(&processor_id, |adapter| async move { adapter.refund(&req).await })
            .await;

        // Preserve whatever decision source already got this refund here
        // (auto-approved under the limit, manually approved, or a
        // chargeback-forced refund); default to `Auto` only if none was
        // ever recorded.
        let decision_source = refund.decision_source.unwrap_or(RefundDecisionSource::Auto);

        match outcome {
            Ok(_) => {
                refund.decide(RefundStatus::Processed, decision_source, self.clock.now());
                let refund = self
                    .refunds
                    .update_with_version(&refund)
                    .await?
                    .ok_or(AppError::VersionConflict { entity: "refund", id: refund.id })?;

                let pair_id = format!("tx:{}:refund:{}", txn.id, refund.id);
                let set = LedgerEntrySet::new(
                    pair_id.clone(),
                    vec![
                        LedgerEntry::debit(
                            pair_id.clone(),
                            format!("creator_payable:{}", txn.creator_id),
                            refund.amount_minor,
                            refund.currency,
                            Some(txn.id),
                            self.clock.now(),
                        ),
                        LedgerEntry::credit(pair_id, "fan_receivable", refund.amount_minor, refund.currency, Some(txn.id), self.clock.now()),
                    ],
                )
                .map_err(|e| AppError::LedgerConflict(e.to_string()))?;
                self.ledger.post(set).await?;

                let mut parent = self
                    .transactions
                    .find_by_id(txn.id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("transaction {}", txn.id)))?;
                parent.refunded_total_minor += refund.amount_minor;
                if parent.refunded_total_minor >= parent.amount_minor
                    && matches!(parent.status, TransactionStatus::Captured | TransactionStatus::Settled)
                {
                    parent
                        .transition_to(TransactionStatus::Refunded, self.clock.now())
                        .map_err(|e| AppError::Validation(e.to_string()))?;
                } else {
                    parent.version += 1;
                    parent.updated_at = self.clock.now();
                }
                self.transactions
                    .update_with_version(&parent)
                    .await?
                    .ok_or(AppError::VersionConflict { entity: "transaction", id: txn.id })?;
                self.transactions
                    .append_event(
                        &crate::models::TransactionEvent::new(
                            txn.id,
                            "refund_processed",
                            "orchestrator",
                            -refund.amount_minor,
                            true,
                            self.clock.now(),
                        )
                        .with_processor_event_id(refund.id.to_string()),
                    )
                    .await?;

                self.events
                    .publish(EventEnvelope::new(
                        EventType::RefundIssued,
                        txn.id,
                        RefundIssued {
                            refund_id: refund.id,
                            transaction_id: txn.id,
                            amount_minor: refund.amount_minor,
                            currency: refund.currency,
                        },
                    ))
                    .await;

                Ok(refund)
            }
            Err(err) => {
                refund.decide(RefundStatus::Failed, decision_source, self.clock.now());
                self.refunds
                    .update_with_version(&refund)
                    .await?
                    .ok_or(AppError::VersionConflict { entity: "refund", id: refund.id })?;
                Err(AppError::from(err))
            }
        }
    }

    /// Applies a decision already recorded against a `RefundReview`
    /// approval entry. Approval carries the refund through
    /// [`Self::process_refund`]; denial marks it `Denied` and leaves
    /// the parent transaction untouched.
    pub async fn apply_review_decision(&self, refund_id: Uuid, approved: bool) -> Result<Refund> {
        let mut refund = self
            .refunds
            .find_by_id(refund_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("refund {refund_id}")))?;

        let _guard = self.locks.lock(refund.transaction_id).await;

        if !approved {
            refund.decide(RefundStatus::Denied, RefundDecisionSource::Manual, self.clock.now());
            return self
                .refunds
                .update_with_version(&refund)
                .await?
                .ok_or(AppError::VersionConflict { entity: "refund", id: refund_id });
        }

        let txn = self
            .transactions
            .find_by_id(refund.transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", refund.transaction_id)))?;

        refund.decide(RefundStatus::Approved, RefundDecisionSource::Manual, self.clock.now());
        let refund = self
            .refunds
            .update_with_version(&refund)
            .await?
            .ok_or(AppError::VersionConflict { entity: "refund", id: refund_id })?;

        self.process_refund(&txn, refund).await
    }

    /// Applies a decision against a `DisputeResponse` approval entry: if
    /// the merchant's response prevails the dispute closes without
    /// touching the transaction; otherwise the remaining refundable
    /// amount is refunded as the chargeback would have forced anyway,
    /// and the dispute closes regardless of which way it went.
    pub async fn apply_dispute_decision(&self, dispute_id: Uuid, merchant_prevailed: bool) -> Result<Dispute> {
        let mut dispute = self
            .disputes
            .find_by_id(dispute_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("dispute {dispute_id}")))?;

        let _guard = self.locks.lock(dispute.transaction_id).await;

        if !merchant_prevailed {
            let txn = self
                .transactions
                .find_by_id(dispute.transaction_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("transaction {}", dispute.transaction_id)))?;
            if txn.remaining_refundable_minor() > 0 {
                let mut refund = self
                    .refunds
                    .create(&Refund::new(
                        txn.id,
                        txn.remaining_refundable_minor(),
                        txn.currency,
                        "chargeback",
                        self.clock.now(),
                    ))
                    .await?;
                refund.decide(RefundStatus::Approved, RefundDecisionSource::Chargeback, self.clock.now());
                let refund = self
                    .refunds
                    .update_with_version(&refund)
                    .await?
                    .ok_or(AppError::VersionConflict { entity: "refund", id: refund.id })?;
                self.process_refund(&txn, refund).await?;
            }
        }

        dispute.stage = DisputeStage::Closed;
        dispute.version += 1;
        dispute.updated_at = self.clock.now();
        self.disputes
            .update_with_version(&dispute)
            .await?
            .ok_or(AppError::VersionConflict { entity: "dispute", id: dispute_id })
    }

    /// Opens a dispute against a transaction. A retrieval is answered
    /// immediately with the existing transaction record; a chargeback
    /// always needs a human response and goes straight to the queue.
    pub async fn open_dispute(
        &self,
        transaction_id: Uuid,
        dispute_type: DisputeType,
        deadline_at: DateTime<Utc>,
    ) -> Result<Dispute> {
        let _guard = self.locks.lock(transaction_id).await;

        let mut txn = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))?;

        let mut dispute = Dispute::new(transaction_id, dispute_type, deadline_at, self.clock.now());
        dispute = self.disputes.create(&dispute).await?;

        self.events
            .publish(EventEnvelope::new(
                EventType::DisputeOpened,
                transaction_id,
                DisputeLifecycle {
                    dispute_id: dispute.id,
                    transaction_id,
                    stage: dispute.stage,
                    amount_minor: txn.amount_minor,
                    currency: txn.currency,
                },
            ))
            .await;

        txn.transition_to(TransactionStatus::Disputed, self.clock.now()).map_err(|e| AppError::Validation(e.to_string()))?;

        match dispute_type {
            DisputeType::Retrieval => {
                dispute.respond(self.clock.now());
                dispute = self
                    .disputes
                    .update_with_version(&dispute)
                    .await?
                    .ok_or(AppError::VersionConflict { entity: "dispute", id: dispute.id })?;

                txn.transition_to(TransactionStatus::Responded, self.clock.now())
                    .map_err(|e| AppError::Validation(e.to_string()))?;
            }
            DisputeType::Chargeback => {
                self.approvals
                    .enqueue(dispute.id, ApprovalType::DisputeResponse, 10, None)
                    .await?;
            }
        }

        self.transactions
            .update_with_version(&txn)
            .await?
            .ok_or(AppError::VersionConflict { entity: "transaction", id: transaction_id })?;

        Ok(dispute)
    }
}
