//! Settlement engine (§4.8). `reconcile_window` is typically driven by
//! a scheduled sweep per processor, not by any single request: it pulls
//! the processor's settlement file for `[window_start, window_end)`,
//! matches each line against the transaction it belongs to, and seals
//! a `Settlement` row with whatever didn't reconcile cleanly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::clock::SharedClock;
use crate::error::{AppError, Result};
use crate::events::bus::EventBus;
use crate::events::types::{EventEnvelope, EventType, SettlementDiscrepancy};
use crate::ledger::Ledger;
use crate::models::{
    AmountMismatch, Currency, DiscrepancyReport, LedgerEntry, LedgerEntrySet, Settlement, Transaction,
    TransactionStatus,
};
use crate::processors::{ProcessorRegistry, SettlementLineKind};
use crate::repositories::{SettlementRepository, TransactionRepository};

pub struct SettlementEngine {
    transactions: TransactionRepository,
    settlements: SettlementRepository,
    processors: Arc<ProcessorRegistry>,
    ledger: Ledger,
    events: Arc<EventBus>,
    clock: SharedClock,
}

impl SettlementEngine {
    pub fn new(
        transactions: TransactionRepository,
        settlements: SettlementRepository,
        processors: Arc<ProcessorRegistry>,
        ledger: Ledger,
        events: Arc<EventBus>,
        clock: SharedClock,
    ) -> Self {
        Self { transactions, settlements, processors, ledger, events, clock }
    }

    /// Reconciles `processor_id`'s settlement file for one window
    /// against locally captured transactions in `currency`, sealing the
    /// resulting `Settlement` row. Matched captures advance to
    /// `Settled`; everything that didn't match goes into the sealed
    /// row's `DiscrepancyReport`.
    pub async fn reconcile_window(
        &self,
        processor_id: &str,
        currency: Currency,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Settlement> {
        let lines = self
            .processors
            .dispatch(processor_id, |adapter| async move {
                adapter.settlement_fetch(window_start, window_end).await
            })
            .await
            .map_err(AppError::from)?;

        // TODO: index transaction_events by (processor_id, captured_at)
        // once settlement volume makes this full-table scan too slow.
        let local = self
            .transactions
            .find_by_status(TransactionStatus::Captured, 10_000)
            .await?
            .into_iter()
            .filter(|t| {
                t.processor_id.as_deref() == Some(processor_id)
                    && t.currency == currency
                    && t.captured_at.map(|at| at >= window_start && at < window_end).unwrap_or(false)
            })
            .collect::<Vec<_>>();

        let mut matched_ids = std::collections::HashSet::new();
        let mut gross_minor = 0i64;
        let mut fees_minor = 0i64;
        let mut refunds_minor = 0i64;
        let mut chargebacks_minor = 0i64;
        let mut unexpected_txids = Vec::new();
        let mut amount_mismatches = Vec::new();

        for line in &lines {
            match line.kind {
                SettlementLineKind::Capture => {
                    match self.find_local_match(&local, &line.processor_reference).await? {
                        Some(txn) => {
                            matched_ids.insert(txn.id);
                            gross_minor += line.amount_minor;
                            fees_minor += line.fee_minor;
                            if txn.amount_minor != line.amount_minor {
                                amount_mismatches.push(AmountMismatch {
                                    transaction_id: txn.id,
                                    expected_minor: txn.amount_minor,
                                    reported_minor: line.amount_minor,
                                });
                            } else {
                                self.settle(txn, line.fee_minor).await?;
                            }
                        }
                        None => unexpected_txids.push(line.processor_reference.clone()),
                    }
                }
                SettlementLineKind::Refund => refunds_minor += line.amount_minor,
                SettlementLineKind::Chargeback => chargebacks_minor += line.amount_minor,
            }
        }

        let missing_txids = local
            .iter()
            .filter(|t| !matched_ids.contains(&t.id))
            .map(|t| t.id)
            .collect::<Vec<_>>();

        let net_minor = gross_minor - fees_minor - refunds_minor - chargebacks_minor;

        let mut settlement = match self.settlements.find_by_window(processor_id, window_start, window_end).await? {
            Some(existing) => existing,
            None => {
                self.settlements
                    .create(&Settlement::new(processor_id, window_start, window_end, currency, self.clock.now()))
                    .await?
            }
        };
        settlement.gross_minor = gross_minor;
        settlement.fees_minor = fees_minor;
        settlement.chargebacks_minor = chargebacks_minor;
        settlement.refunds_minor = refunds_minor;
        settlement.net_minor = net_minor;

        let report = DiscrepancyReport { missing_txids, unexpected_txids, amount_mismatches };
        let has_discrepancies = !report.is_clean();
        settlement.seal(report, self.clock.now());

        let settlement = self
            .settlements
            .seal(&settlement)
            .await?
            .ok_or(AppError::VersionConflict { entity: "settlement", id: settlement.id })?;

        if has_discrepancies {
            if !settlement.discrepancies.0.missing_txids.is_empty() {
                crate::observability::get_metrics().record_settlement_discrepancy(processor_id, "missing");
            }
            if !settlement.discrepancies.0.unexpected_txids.is_empty() {
                crate::observability::get_metrics().record_settlement_discrepancy(processor_id, "unexpected");
            }
            if !settlement.discrepancies.0.amount_mismatches.is_empty() {
                crate::observability::get_metrics().record_settlement_discrepancy(processor_id, "amount_mismatch");
            }
            self.events
                .publish(EventEnvelope::new(
                    EventType::SettlementDiscrepancy,
                    settlement.id,
                    SettlementDiscrepancy {
                        settlement_id: settlement.id,
                        processor_id: processor_id.to_string(),
                        currency,
                        missing_count: settlement.discrepancies.0.missing_txids.len(),
                        unexpected_count: settlement.discrepancies.0.unexpected_txids.len(),
                        mismatch_count: settlement.discrepancies.0.amount_mismatches.len(),
                    },
                ))
                .await;
        }

        Ok(settlement)
    }

    async fn find_local_match(&self, local: &[Transaction], processor_reference: &str) -> Result<Option<Transaction>> {
        if let Some(txn) = local.iter().find(|t| {
            t.processor_response
                .as_ref()
                .and_then(|r| r.get("id").and_then(|v| v.as_str()))
                == Some(processor_reference)
        }) {
            return Ok(Some(txn.clone()));
        }
        self.transactions.find_by_processor_event_id(processor_reference).await
    }

    /// Posts the settlement fee leg and advances `txn` to `Settled`
    /// (§4.8). The ledger post is idempotent on `pair_id`, so
    /// re-reconciling an already settled window is safe to retry.
    async fn settle(&self, mut txn: Transaction, fee_minor: i64) -> Result<()> {
        if fee_minor > 0 {
            let pair_id = format!("tx:{}:settle", txn.id);
            let set = LedgerEntrySet::new(
                pair_id.clone(),
                vec![
                    LedgerEntry::debit(pair_id.clone(), "processor_fee_expense", fee_minor, txn.currency, Some(txn.id), self.clock.now()),
                    LedgerEntry::credit(pair_id, format!("processor_payable:{}", txn.processor_id.clone().unwrap_or_default()), fee_minor, txn.currency, Some(txn.id), self.clock.now()),
                ],
            )
            .map_err(|e| AppError::LedgerConflict(e.to_string()))?;
            self.ledger.post(set).await?;
        }

        if txn.transition_to(TransactionStatus::Settled, self.clock.now()).is_ok() {
            if let Err(err) = self.transactions.update_with_version(&txn).await {
                warn!(transaction_id = %txn.id, error = %err, "failed to persist settlement transition");
            }
        }
        Ok(())
    }
}
