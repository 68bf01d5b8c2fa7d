//! Customer credit ledger.

use chrono::{DateTime, Utc};
use common::CustomerId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::money::Money;

/// Direction of a ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Debit,
    Credit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Debit => "DEBIT",
            TransactionType::Credit => "CREDIT",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBIT" => Ok(TransactionType::Debit),
            "CREDIT" => Ok(TransactionType::Credit),
            other => Err(DomainError::UnknownTransactionType(other.to_string())),
        }
    }
}

/// A customer's current credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditEntry {
    pub id: Uuid,
    pub customer_id: CustomerId,
    total_credit_amount: Money,
}

impl CreditEntry {
    /// Creates a credit entry with the given opening balance.
    pub fn new(customer_id: CustomerId, total_credit_amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            total_credit_amount,
        }
    }

    /// Rebuilds a credit entry from storage.
    pub fn from_parts(id: Uuid, customer_id: CustomerId, total_credit_amount: Money) -> Self {
        Self {
            id,
            customer_id,
            total_credit_amount,
        }
    }

    pub fn total_credit_amount(&self) -> Money {
        self.total_credit_amount
    }

    /// Subtracts `amount` from the balance.
    ///
    /// Fails without touching the balance when it would go negative.
    pub fn debit(&mut self, amount: Money) -> Result<(), DomainError> {
        if !self.total_credit_amount.covers(amount) {
            return Err(DomainError::InsufficientCredit {
                customer_id: self.customer_id,
                balance: self.total_credit_amount,
                requested: amount,
            });
        }
        self.total_credit_amount -= amount;
        Ok(())
    }

    /// Adds `amount` back to the balance.
    pub fn credit(&mut self, amount: Money) {
        self.total_credit_amount += amount;
    }
}

/// One append-only movement in a customer's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditHistory {
    pub id: Uuid,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub transaction_type: TransactionType,
    pub created_at: DateTime<Utc>,
}

impl CreditHistory {
    pub fn new(customer_id: CustomerId, amount: Money, transaction_type: TransactionType) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            amount,
            transaction_type,
            created_at: Utc::now(),
        }
    }

    pub fn debit(customer_id: CustomerId, amount: Money) -> Self {
        Self::new(customer_id, amount, TransactionType::Debit)
    }

    pub fn credit(customer_id: CustomerId, amount: Money) -> Self {
        Self::new(customer_id, amount, TransactionType::Credit)
    }

    /// Sum of all movements of the given type.
    pub fn total_of(histories: &[CreditHistory], transaction_type: TransactionType) -> Money {
        histories
            .iter()
            .filter(|h| h.transaction_type == transaction_type)
            .map(|h| h.amount)
            .sum()
    }

    /// Balance implied by the history: credits minus debits.
    pub fn balance(histories: &[CreditHistory]) -> Money {
        Self::total_of(histories, TransactionType::Credit)
            - Self::total_of(histories, TransactionType::Debit)
    }
}
