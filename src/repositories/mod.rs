pub mod approval_repository;
pub mod balance_repository;
pub mod ledger_repository;
pub mod merchant_account_repository;
pub mod payout_repository;
pub mod refund_repository;
pub mod routing_rule_repository;
pub mod settlement_repository;
pub mod transaction_repository;
pub mod trust_score_repository;

pub use approval_repository::ApprovalRepository;
pub use balance_repository::BalanceRepository;
pub use ledger_repository::LedgerRepository;
pub use merchant_account_repository::MerchantAccountRepository;
pub use payout_repository::{PayoutBatchRepository, PayoutRepository};
pub use refund_repository::{DisputeRepository, RefundRepository};
pub use routing_rule_repository::RoutingRuleRepository;
pub use settlement_repository::SettlementRepository;
pub use transaction_repository::TransactionRepository;
pub use trust_score_repository::TrustScoreRepository;

use sqlx::PgPool;

/// Database connection pool type alias.
pub type DbPool = PgPool;
