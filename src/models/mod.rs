pub mod account_balance;
pub mod approval;
pub mod currency;
pub mod ledger_entry;
pub mod merchant_account;
pub mod money;
pub mod payment_method;
pub mod payout;
pub mod payout_batch;
pub mod refund;
pub mod routing_rule;
pub mod settlement;
pub mod transaction;
pub mod trust_score;

pub use account_balance::{AccountBalance, InsufficientFundsError};
pub use approval::{
    Approval, ApprovalAlreadyDecidedError, ApprovalHistoryEntry, ApprovalState, ApprovalType,
};
pub use currency::{Currency, CurrencyParseError};
pub use ledger_entry::{EntryDirection, LedgerEntry, LedgerEntrySet, LedgerEntrySetError};
pub use merchant_account::MerchantAccount;
pub use money::{Money, MoneyError};
pub use payment_method::{PaymentMethod, WalletProvider};
pub use payout::{InvalidPayoutTransitionError, Payout, PayoutMethod, PayoutStatus};
pub use payout_batch::{PayoutBatch, PayoutBatchError, PayoutBatchStatus};
pub use refund::{
    Dispute, DisputeStage, DisputeType, Refund, RefundDecisionSource, RefundStatus,
};
pub use routing_rule::{CanaryConfig, RoutingConditions, RoutingContext, RoutingRule, RoutingTarget};
pub use settlement::{AmountMismatch, DiscrepancyReport, Settlement};
pub use transaction::{
    InvalidTransitionError, PaymentRequest, Transaction, TransactionEvent, TransactionStatus,
};
pub use trust_score::{TrustDecision, TrustScore};
