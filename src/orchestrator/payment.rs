//! Payment orchestrator (§4.6): drives a `Transaction` from
//! `Initiated` through to `Authorized`/`Captured`, owning every status
//! write. Trust evaluation gates routing; routing picks the primary
//! MID plus an ordered fallback chain the orchestrator walks on a
//! `RetriableDecline`.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::{LimitsConfig, ProcessorConfig};
use crate::error::{AppError, Result};
use crate::events::bus::EventBus;
use crate::events::types::{EventEnvelope, EventType, TransactionStatusChanged};
use crate::ledger::Ledger;
use crate::models::{
    EntryDirection, LedgerEntry, LedgerEntrySet, PaymentRequest, Transaction, TransactionEvent,
    TransactionStatus,
};
use crate::processors::{AuthorizeRequest, CaptureRequest, ProcessorRegistry};
use crate::repositories::{MerchantAccountRepository, TransactionRepository};
use crate::routing::{Router, RoutingDecision};
use crate::trust::{TrustContext, TrustEngine};

use super::locks::StripedLocks;
use super::ApprovalQueue;

fn ledger_accounts(creator_id: Uuid) -> (String, String) {
    (
        "fan_receivable".to_string(),
        format!("creator_payable:{creator_id}"),
    )
}

pub struct PaymentOrchestrator {
    transactions: TransactionRepository,
    merchant_accounts: MerchantAccountRepository,
    ledger: Ledger,
    router: Arc<Router>,
    trust_engine: Arc<TrustEngine>,
    processors: Arc<ProcessorRegistry>,
    approvals: Arc<ApprovalQueue>,
    events: Arc<EventBus>,
    limits: LimitsConfig,
    processor_config: ProcessorConfig,
    clock: SharedClock,
    locks: StripedLocks,
}

impl PaymentOrchestrator {
    pub fn new(
        transactions: TransactionRepository,
        merchant_accounts: MerchantAccountRepository,
        ledger: Ledger,
        router: Arc<Router>,
        trust_engine: Arc<TrustEngine>,
        processors: Arc<ProcessorRegistry>,
        approvals: Arc<ApprovalQueue>,
        events: Arc<EventBus>,
        limits: LimitsConfig,
        processor_config: ProcessorConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            transactions,
            merchant_accounts,
            ledger,
            router,
            trust_engine,
            processors,
            approvals,
            events,
            limits,
            processor_config,
            clock,
            locks: StripedLocks::new(64),
        }
    }

    async fn emit_status_changed(&self, txn: &Transaction, from: Option<TransactionStatus>) {
        let payload = TransactionStatusChanged {
            transaction_id: txn.id,
            fan_id: txn.fan_id,
            creator_id: txn.creator_id,
            from_status: from,
            to_status: txn.status,
            amount_minor: txn.amount_minor,
            currency: txn.currency,
        };
        self.events
            .publish(EventEnvelope::new(EventType::TransactionStatusChanged, txn.id, payload))
            .await;
    }

    async fn transition(&self, txn: &mut Transaction, next: TransactionStatus) -> Result<()> {
        let from = txn.status;
        txn.transition_to(next, self.clock.now()).map_err(|e| AppError::Validation(e.to_string()))?;
        let persisted = self
            .transactions
            .update_with_version(txn)
            .await?
            .ok_or(AppError::VersionConflict { entity: "transaction", id: txn.id })?;
        *txn = persisted;
        self.emit_status_changed(txn, Some(from)).await;
        Ok(())
    }

    /// Runs the full authorize/capture pipeline for a new payment
    /// request. `region` is the fan's resolved billing region, used
    /// only for routing; amount bounds (§6 config table) are enforced
    /// before anything is persisted.
    #[instrument(skip(self, request, trust_ctx), fields(fan_id = %request.fan_id))]
    pub async fn authorize_and_capture(
        &self,
        request: PaymentRequest,
        trust_ctx: TrustContext,
        region: &str,
    ) -> Result<Transaction> {
        if !request.amount_minor.is_within_bounds(
            self.limits.min_transaction_amount_minor,
            self.limits.max_transaction_amount_minor,
        ) {
            return Err(AppError::Validation(format!(
                "amount {} outside configured bounds",
                request.amount_minor
            )));
        }

        let mut txn = Transaction::new(
            request.fan_id,
            request.creator_id,
            request.platform.clone(),
            request.amount_minor,
            request.currency,
            self.clock.now(),
        );
        txn = self.transactions.create(&txn).await?;
        self.emit_status_changed(&txn, None).await;
        crate::observability::get_metrics().record_transaction_created(&request.platform, &txn.currency.to_string());

        let _guard = self.locks.lock(txn.id).await;

        let score = self.trust_engine.evaluate(txn.fan_id, &trust_ctx).await?;
        txn.trust_score = Some(score.score);

        use crate::models::TrustDecision::*;
        match score.decision {
            Block => {
                self.transition(&mut txn, TransactionStatus::Blocked).await?;
                return Ok(txn);
            }
            Challenge | ManualReview => {
                self.transition(&mut txn, TransactionStatus::RequiresVerification).await?;
                self.approvals
                    .enqueue(txn.id, crate::models::ApprovalType::TrustChallenge, score.score, None)
                    .await?;
                return Ok(txn);
            }
            Allow | AutoApproveRefund => {}
        }

        self.transition(&mut txn, TransactionStatus::Verified).await?;

        let routing_ctx = crate::models::RoutingContext {
            platform: &request.platform,
            region,
            currency: request.currency,
            method_kind: request.method.kind(),
            amount_minor: request.amount_minor,
            trust_score: score.score,
            bin: request.method.bin(),
            at: self.clock.now(),
            user_tags: &[],
            fan_id: request.fan_id,
        };
        let decision = self.router.route(&routing_ctx)?;

        txn.processor_id = Some(decision.merchant_account.processor_id.clone());
        txn.merchant_account_id = Some(decision.merchant_account.id);
        self.transition(&mut txn, TransactionStatus::Routed).await?;

        self.run_authorization_chain(&mut txn, &request, decision).await?;

        if txn.status == TransactionStatus::Authorized {
            self.capture(&mut txn).await?;
        }

        Ok(txn)
    }

    /// Attempts authorization against the primary MID, then each
    /// fallback MID in order, on every `RetriableDecline`. Any other
    /// terminal taxonomy code fails the transaction outright.
    async fn run_authorization_chain(
        &self,
        txn: &mut Transaction,
        request: &PaymentRequest,
        decision: RoutingDecision,
    ) -> Result<()> {
        let mut mids = vec![decision.merchant_account.mid.clone()];
        mids.extend(decision.fallback_mids);
        let processor_id = decision.merchant_account.processor_id.clone();

        for (attempt, mid) in mids.iter().enumerate() {
            let account = if attempt == 0 {
                decision.merchant_account.clone()
            } else {
                match self.merchant_accounts.find_by_mid(mid).await? {
                    Some(account) => account,
                    None => continue,
                }
            };

            let req = AuthorizeRequest {
                transaction_id: txn.id,
                merchant_account_id: account.id,
                amount_minor: request.amount_minor,
                currency: request.currency,
                method: request.method.clone(),
                attempt: attempt as u32 + 1,
            };

            let outcome = self
                .processors
                .dispatch(&processor_id, |adapter| async move { adapter.authorize(&req).await })
                .await;

            match outcome {
                Ok(resp) => {
                    txn.processor_response = Some(resp.raw);
                    self.transition(txn, TransactionStatus::Authorized).await?;
                    self.router.record_volume(account.id, request.amount_minor);
                    self.transactions
                        .append_event(
                            &TransactionEvent::new(txn.id, "authorized", "orchestrator", 0, true, self.clock.now())
                                .with_processor_event_id(resp.processor_reference),
                        )
                        .await?;
                    return Ok(());
                }
                Err(err) if err.code.triggers_fallback() => {
                    warn!(mid, code = %err.code, "authorization declined, trying next fallback");
                    continue;
                }
                Err(err) if err.code.is_retryable() => {
                    warn!(mid, code = %err.code, "transient authorization failure");
                    continue;
                }
                Err(err) => {
                    self.transactions
                        .append_event(
                            &TransactionEvent::new(txn.id, "authorize_failed", "orchestrator", 0, false, self.clock.now())
                                .with_error_code(err.code.to_string()),
                        )
                        .await?;
                    self.transition(txn, TransactionStatus::Failed).await?;
                    crate::observability::get_metrics().record_transaction_failed(&err.code.to_string());
                    return Ok(());
                }
            }
        }

        self.transactions
            .append_event(&TransactionEvent::new(
                txn.id,
                "authorize_exhausted",
                "orchestrator",
                0,
                false,
                self.clock.now(),
            ))
            .await?;
        self.transition(txn, TransactionStatus::Failed).await?;
        crate::observability::get_metrics().record_transaction_failed("authorize_exhausted");
        Ok(())
    }

    /// Resumes a transaction held in `RequiresVerification` after its
    /// `TrustChallenge` approval entry is approved. `request`/`region`
    /// must describe the same payment the challenge was raised against;
    /// the caller (whoever processes the approval decision) is
    /// responsible for retaining them, since the transaction row itself
    /// only carries the fields needed post-hoc (§3 data model). Denial
    /// is a plain transition to `Blocked`, not a call into this method.
    pub async fn resume_after_challenge(
        &self,
        transaction_id: Uuid,
        request: PaymentRequest,
        region: &str,
    ) -> Result<Transaction> {
        let mut txn = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))?;

        if txn.status != TransactionStatus::RequiresVerification {
            return Err(AppError::Validation(format!(
                "transaction {transaction_id} is not awaiting verification ({:?})",
                txn.status
            )));
        }

        let _guard = self.locks.lock(txn.id).await;

        self.transition(&mut txn, TransactionStatus::Verified).await?;

        let routing_ctx = crate::models::RoutingContext {
            platform: &request.platform,
            region,
            currency: request.currency,
            method_kind: request.method.kind(),
            amount_minor: request.amount_minor,
            trust_score: txn.trust_score.unwrap_or(0),
            bin: request.method.bin(),
            at: self.clock.now(),
            user_tags: &[],
            fan_id: request.fan_id,
        };
        let decision = self.router.route(&routing_ctx)?;

        txn.processor_id = Some(decision.merchant_account.processor_id.clone());
        txn.merchant_account_id = Some(decision.merchant_account.id);
        self.transition(&mut txn, TransactionStatus::Routed).await?;

        self.run_authorization_chain(&mut txn, &request, decision).await?;

        if txn.status == TransactionStatus::Authorized {
            self.capture(&mut txn).await?;
        }

        Ok(txn)
    }

    /// Denies a transaction held in `RequiresVerification`, e.g. when
    /// its `TrustChallenge` approval entry is denied.
    pub async fn deny_challenge(&self, transaction_id: Uuid) -> Result<Transaction> {
        let mut txn = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))?;
        let _guard = self.locks.lock(txn.id).await;
        self.transition(&mut txn, TransactionStatus::Blocked).await?;
        Ok(txn)
    }

    /// Captures an authorized transaction and posts the balanced
    /// ledger entry set (fan receivable vs. creator payable, platform
    /// fee revenue, processor fee expense).
    async fn capture(&self, txn: &mut Transaction) -> Result<()> {
        let processor_id = txn.processor_id.clone().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("authorized transaction has no processor_id"))
        })?;

        let processor_reference = txn
            .processor_response
            .as_ref()
            .and_then(|r| r.get("id").and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string();

        let req = CaptureRequest {
            transaction_id: txn.id,
            processor_reference,
            amount_minor: txn.amount_minor,
            attempt: 1,
        };
        let resp = self
            .processors
            .dispatch(&processor_id, |adapter| async move { adapter.capture(&req).await })
            .await
            .map_err(AppError::from)?;
        txn.processor_response = Some(resp.raw);

        let platform_fee = crate::models::Money::new(txn.amount_minor, txn.currency)
            .scale_bps(self.limits.platform_fee_rate_bps)
            .amount_minor;
        let processor_fee_rate_bps = self.processor_config.fee_rate_bps.get(&processor_id).copied().unwrap_or(0);
        let processor_fee = crate::models::Money::new(txn.amount_minor, txn.currency)
            .scale_bps(processor_fee_rate_bps)
            .amount_minor;
        let net_to_creator = txn.amount_minor - platform_fee - processor_fee;
        txn.fees_minor = platform_fee + processor_fee;

        let (fan_account, creator_account) = ledger_accounts(txn.creator_id);
        let pair_id = format!("tx:{}:capture", txn.id);
        let set = LedgerEntrySet::new(
            pair_id.clone(),
            vec![
                LedgerEntry::debit(pair_id.clone(), fan_account, txn.amount_minor, txn.currency, Some(txn.id), self.clock.now()),
                LedgerEntry::credit(pair_id.clone(), creator_account, net_to_creator, txn.currency, Some(txn.id), self.clock.now()),
                LedgerEntry::credit(pair_id.clone(), "platform_fee_revenue", platform_fee, txn.currency, Some(txn.id), self.clock.now()),
                LedgerEntry::credit(pair_id, "processor_fee_expense", processor_fee, txn.currency, Some(txn.id), self.clock.now()),
            ],
        )
        .map_err(|e| AppError::LedgerConflict(e.to_string()))?;

        self.ledger.post(set).await?;
        self.transition(txn, TransactionStatus::Captured).await?;
        crate::observability::get_metrics().record_transaction_captured(&txn.currency.to_string());

        // `Settled` is only reached once the settlement engine matches
        // this capture against the processor's settlement file (§4.8).
        info!(transaction_id = %txn.id, "transaction captured");
        Ok(())
    }
}

trait WithinBounds {
    fn is_within_bounds(&self, min: i64, max: i64) -> bool;
}

impl WithinBounds for i64 {
    fn is_within_bounds(&self, min: i64, max: i64) -> bool {
        *self >= min && *self <= max
    }
}
