//! Payment validation against the customer's credit ledger.

use crate::credit::{CreditEntry, CreditHistory};
use crate::error::DomainError;
use crate::money::Money;

use super::{Payment, PaymentEvent, PaymentStatus};

/// Stateless domain service deciding the outcome of payment requests.
///
/// Rejections are normal outcomes: the reason is appended to
/// `failure_messages` and the payment moves to `Failed`. The ledger is only
/// mutated once every check has passed, so a failed attempt leaves
/// `credit_entry` and `credit_histories` exactly as they were.
///
/// `Err` is reserved for broken invariants, e.g. initiating a payment that is
/// not in the `Initiated` status.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentDomainService;

impl PaymentDomainService {
    pub fn new() -> Self {
        Self
    }

    /// Validates a new payment and, if it passes, debits the customer.
    pub fn validate_and_initiate_payment(
        &self,
        payment: &mut Payment,
        credit_entry: &mut CreditEntry,
        credit_histories: &mut Vec<CreditHistory>,
        failure_messages: &mut Vec<String>,
    ) -> Result<PaymentEvent, DomainError> {
        Self::validate_price(payment, failure_messages);
        Self::validate_credit_entry(payment, credit_entry, failure_messages);
        Self::validate_credit_history(payment, credit_entry, credit_histories, failure_messages);

        if !failure_messages.is_empty() {
            tracing::info!(
                order_id = %payment.order_id(),
                reasons = ?failure_messages,
                "payment initiation failed"
            );
            payment.transition_to(PaymentStatus::Failed)?;
            return Ok(PaymentEvent::failed(
                payment.clone(),
                failure_messages.clone(),
            ));
        }

        credit_entry.debit(payment.price())?;
        credit_histories.push(CreditHistory::debit(payment.customer_id(), payment.price()));
        payment.transition_to(PaymentStatus::Completed)?;

        tracing::info!(order_id = %payment.order_id(), "payment is initiated");
        Ok(PaymentEvent::completed(payment.clone()))
    }

    /// Compensates a completed payment by crediting the amount back.
    pub fn validate_and_cancel_payment(
        &self,
        payment: &mut Payment,
        credit_entry: &mut CreditEntry,
        credit_histories: &mut Vec<CreditHistory>,
        failure_messages: &mut Vec<String>,
    ) -> Result<PaymentEvent, DomainError> {
        if !payment.status().can_cancel() {
            failure_messages.push(format!(
                "Payment with id={} cannot be cancelled from {} status",
                payment.id(),
                payment.status()
            ));
        }
        Self::validate_price(payment, failure_messages);

        if !failure_messages.is_empty() {
            tracing::info!(
                order_id = %payment.order_id(),
                reasons = ?failure_messages,
                "payment cancellation failed"
            );
            if payment.status().can_transition_to(PaymentStatus::Failed) {
                payment.transition_to(PaymentStatus::Failed)?;
            }
            return Ok(PaymentEvent::failed(
                payment.clone(),
                failure_messages.clone(),
            ));
        }

        credit_entry.credit(payment.price());
        credit_histories.push(CreditHistory::credit(payment.customer_id(), payment.price()));
        payment.transition_to(PaymentStatus::Cancelled)?;

        tracing::info!(order_id = %payment.order_id(), "payment is cancelled");
        Ok(PaymentEvent::cancelled(payment.clone()))
    }

    fn validate_price(payment: &Payment, failure_messages: &mut Vec<String>) {
        if !payment.has_valid_price() {
            failure_messages.push("Total price must be greater than zero".to_string());
        }
        if !payment.price().is_storable() {
            failure_messages.push(format!(
                "Total price {} must have at most {} decimal places and {} integer digits",
                payment.price().amount(),
                Money::SCALE,
                Money::MAX_INTEGER_DIGITS
            ));
        }
    }

    fn validate_credit_entry(
        payment: &Payment,
        credit_entry: &CreditEntry,
        failure_messages: &mut Vec<String>,
    ) {
        if !credit_entry.total_credit_amount().covers(payment.price()) {
            failure_messages.push(format!(
                "Customer with id={} has insufficient funds for payment",
                payment.customer_id()
            ));
        }
    }

    fn validate_credit_history(
        payment: &Payment,
        credit_entry: &CreditEntry,
        credit_histories: &[CreditHistory],
        failure_messages: &mut Vec<String>,
    ) {
        let history_balance = CreditHistory::balance(credit_histories);

        if !history_balance.covers(payment.price()) {
            failure_messages.push(format!(
                "Customer with id={} doesn't have enough credit according to credit history",
                payment.customer_id()
            ));
        }

        if history_balance != credit_entry.total_credit_amount() {
            failure_messages.push(format!(
                "Credit history total is not equal to current credit for customer id={}",
                payment.customer_id()
            ));
        }
    }
}
