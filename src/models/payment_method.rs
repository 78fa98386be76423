use serde::{Deserialize, Serialize};

/// Wallet rail behind `PaymentMethod::Wallet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletProvider {
    ApplePay,
    GooglePay,
}

/// Tagged payment method, matching the redesign note against
/// dynamically-typed payment detail blobs: every call site matches
/// exhaustively rather than probing optional fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentMethod {
    Card {
        token: String,
        last4: String,
        expiry: String,
    },
    Crypto {
        address: String,
        txid: Option<String>,
        block_height: Option<u64>,
    },
    Bank {
        account_token: String,
        routing: String,
    },
    Wallet {
        provider: WalletProvider,
        token: String,
    },
}

impl PaymentMethod {
    /// Short tag used for metrics labels and routing-rule conditions.
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentMethod::Card { .. } => "card",
            PaymentMethod::Crypto { .. } => "crypto",
            PaymentMethod::Bank { .. } => "bank",
            PaymentMethod::Wallet { provider: WalletProvider::ApplePay, .. } => "apple_pay",
            PaymentMethod::Wallet { provider: WalletProvider::GooglePay, .. } => "google_pay",
        }
    }

    /// BIN (first 6-8 digits) is only meaningful for card payments;
    /// other methods have no BIN to evaluate in routing rules.
    pub fn bin(&self) -> Option<&str> {
        match self {
            PaymentMethod::Card { token, .. } if token.len() >= 6 => Some(&token[..6]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_wallet_provider_to_distinct_tags() {
        let apple = PaymentMethod::Wallet {
            provider: WalletProvider::ApplePay,
            token: "tok".into(),
        };
        let google = PaymentMethod::Wallet {
            provider: WalletProvider::GooglePay,
            token: "tok".into(),
        };
        assert_eq!(apple.kind(), "apple_pay");
        assert_eq!(google.kind(), "google_pay");
    }

    #[test]
    fn bin_only_present_for_card() {
        let card = PaymentMethod::Card {
            token: "411111000000".into(),
            last4: "0000".into(),
            expiry: "12/30".into(),
        };
        assert_eq!(card.bin(), Some("411111"));

        let bank = PaymentMethod::Bank {
            account_token: "acct".into(),
            routing: "021000021".into(),
        };
        assert_eq!(bank.bin(), None);
    }
}
