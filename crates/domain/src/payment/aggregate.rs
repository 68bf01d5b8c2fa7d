//! Payment aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

use super::{PaymentError, PaymentStatus};

/// Payment aggregate root.
///
/// Created on the first payment request for an order and mutated only by
/// `PaymentDomainService`. Status changes go through [`Payment::transition_to`],
/// which enforces the state machine in [`PaymentStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique payment identifier.
    id: PaymentId,

    /// Order being paid.
    order_id: OrderId,

    /// Customer whose credit is charged.
    customer_id: CustomerId,

    /// Amount charged.
    price: Money,

    /// When the payment was first recorded.
    created_at: DateTime<Utc>,

    /// Current status.
    status: PaymentStatus,
}

impl Payment {
    /// Creates a new payment in the `Initiated` status.
    pub fn initiate(order_id: OrderId, customer_id: CustomerId, price: Money) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            customer_id,
            price,
            created_at: Utc::now(),
            status: PaymentStatus::Initiated,
        }
    }

    /// Rebuilds a payment from storage.
    pub fn from_parts(
        id: PaymentId,
        order_id: OrderId,
        customer_id: CustomerId,
        price: Money,
        created_at: DateTime<Utc>,
        status: PaymentStatus,
    ) -> Self {
        Self {
            id,
            order_id,
            customer_id,
            price,
            created_at,
            status,
        }
    }

    /// Moves the payment to `target`, refusing illegal transitions.
    pub fn transition_to(&mut self, target: PaymentStatus) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(target) {
            return Err(PaymentError::InvalidStateTransition {
                payment_id: self.id,
                current: self.status,
                target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Returns true if the price is a valid amount to charge.
    pub fn has_valid_price(&self) -> bool {
        self.price.is_greater_than_zero()
    }
}

// Query methods
impl Payment {
    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment(price: Money) -> Payment {
        Payment::initiate(OrderId::new(), CustomerId::new(), price)
    }

    #[test]
    fn test_initiate_starts_in_initiated() {
        let p = payment(Money::new(dec!(10.00)));
        assert_eq!(p.status(), PaymentStatus::Initiated);
        assert!(p.has_valid_price());
    }

    #[test]
    fn test_price_must_be_positive() {
        assert!(!payment(Money::ZERO).has_valid_price());
        assert!(!payment(Money::new(dec!(-5))).has_valid_price());
    }

    #[test]
    fn test_legal_transition_chain() {
        let mut p = payment(Money::new(dec!(10.00)));
        p.transition_to(PaymentStatus::Completed).unwrap();
        p.transition_to(PaymentStatus::Cancelled).unwrap();
        assert_eq!(p.status(), PaymentStatus::Cancelled);
    }

    #[test]
    fn test_illegal_transition_leaves_status_untouched() {
        let mut p = payment(Money::new(dec!(10.00)));
        p.transition_to(PaymentStatus::Failed).unwrap();

        let err = p.transition_to(PaymentStatus::Completed).unwrap_err();
        assert!(matches!(
            err,
            PaymentError::InvalidStateTransition {
                current: PaymentStatus::Failed,
                target: PaymentStatus::Completed,
                ..
            }
        ));
        assert_eq!(p.status(), PaymentStatus::Failed);
    }
}
