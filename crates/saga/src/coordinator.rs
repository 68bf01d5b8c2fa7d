//! Saga step coordinator for payment requests.

use domain::{Payment, PaymentDomainService, PaymentEvent};
use store::{OutboxMessage, OutboxStatus, PaymentStore, StoreError};

use crate::dispatcher::ResponseDispatcher;
use crate::error::{Result, SagaError};
use crate::order_processing;
use crate::request::{PaymentCommand, PaymentRequest};

/// Runs the payment step of the order processing saga.
///
/// Every request is handled in one unit of work: idempotency gate, ledger
/// load, domain validation, persistence of the payment and ledger, and
/// staging of the outcome in the outbox. The coordinator never talks to the
/// broker for new outcomes; the outbox publisher does that. It only re-sends
/// outcomes that were already published when a duplicate request arrives.
pub struct PaymentSagaCoordinator<S>
where
    S: PaymentStore,
{
    store: S,
    domain_service: PaymentDomainService,
    dispatcher: ResponseDispatcher,
}

impl<S> PaymentSagaCoordinator<S>
where
    S: PaymentStore,
{
    /// Creates a new coordinator.
    pub fn new(store: S, dispatcher: ResponseDispatcher) -> Self {
        Self {
            store,
            domain_service: PaymentDomainService::new(),
            dispatcher,
        }
    }

    /// Routes a request to the handler for its command.
    pub async fn handle(&self, request: &PaymentRequest) -> Result<PaymentEvent> {
        match request.command {
            PaymentCommand::Initiate => self.persist_payment(request).await,
            PaymentCommand::Cancel => self.persist_cancel_payment(request).await,
        }
    }

    /// Charges the customer for the order in `request`.
    #[tracing::instrument(
        skip(self, request),
        fields(saga_id = %request.saga_id, order_id = %request.order_id)
    )]
    pub async fn persist_payment(&self, request: &PaymentRequest) -> Result<PaymentEvent> {
        self.run(request, PaymentCommand::Initiate).await
    }

    /// Compensates the payment for the order in `request`.
    #[tracing::instrument(
        skip(self, request),
        fields(saga_id = %request.saga_id, order_id = %request.order_id)
    )]
    pub async fn persist_cancel_payment(&self, request: &PaymentRequest) -> Result<PaymentEvent> {
        self.run(request, PaymentCommand::Cancel).await
    }

    async fn run(
        &self,
        request: &PaymentRequest,
        command: PaymentCommand,
    ) -> Result<PaymentEvent> {
        metrics::counter!("payment_requests_total", "command" => command.as_str()).increment(1);
        let start = std::time::Instant::now();

        let result = match self.execute(request, command).await {
            // A concurrent duplicate committed its outcome first.
            Err(SagaError::Store(StoreError::DuplicateOutboxMessage { .. })) => {
                tracing::info!("concurrent duplicate won the race, replaying its outcome");
                self.replay_after_conflict(request, command).await
            }
            other => other,
        };

        metrics::histogram!("payment_request_duration_seconds", "command" => command.as_str())
            .record(start.elapsed().as_secs_f64());
        if let Err(ref err) = result {
            tracing::error!(
                error = %err,
                retryable = err.is_retryable(),
                "payment request failed"
            );
        }
        result
    }

    async fn execute(
        &self,
        request: &PaymentRequest,
        command: PaymentCommand,
    ) -> Result<PaymentEvent> {
        let mut uow = self.store.begin().await?;
        uow.lock_saga(order_processing::SAGA_TYPE, request.saga_id)
            .await?;

        // 1. Idempotency gate
        if let Some(existing) = uow
            .find_outbox_by_saga_id_and_type(
                order_processing::SAGA_TYPE,
                request.saga_id,
                command.outcome_statuses(),
            )
            .await?
        {
            uow.commit().await?;
            tracing::info!(
                payment_status = %existing.payment_status,
                "an outbox message for this saga is already saved"
            );
            return self.replay(existing).await;
        }

        // 2. Load the payment
        let mut payment = match command {
            PaymentCommand::Initiate => {
                tracing::info!("received payment request");
                Payment::initiate(request.order_id, request.customer_id, request.price)
            }
            PaymentCommand::Cancel => {
                tracing::info!("received payment cancellation");
                uow.find_payment_by_order_id(request.order_id)
                    .await?
                    .ok_or(SagaError::PaymentNotFound(request.order_id))?
            }
        };

        // 3. Load the ledger
        let customer_id = payment.customer_id();
        let mut credit_entry = uow
            .find_credit_entry_by_customer_id(customer_id)
            .await?
            .ok_or(SagaError::CreditEntryNotFound(customer_id))?;
        let mut credit_histories = uow
            .find_credit_history_by_customer_id(customer_id)
            .await?
            .ok_or(SagaError::CreditHistoryNotFound(customer_id))?;
        let loaded_histories = credit_histories.len();

        // 4. Validate
        let mut failure_messages = Vec::new();
        let event = match command {
            PaymentCommand::Initiate => self.domain_service.validate_and_initiate_payment(
                &mut payment,
                &mut credit_entry,
                &mut credit_histories,
                &mut failure_messages,
            )?,
            PaymentCommand::Cancel => self.domain_service.validate_and_cancel_payment(
                &mut payment,
                &mut credit_entry,
                &mut credit_histories,
                &mut failure_messages,
            )?,
        };

        // 5. Persist
        uow.save_payment(&payment).await?;
        if failure_messages.is_empty() {
            uow.save_credit_entry(&credit_entry).await?;
            for history in &credit_histories[loaded_histories..] {
                uow.save_credit_history(history).await?;
            }
        }

        // 6. Stage the outcome
        let outbox_message = OutboxMessage::started(
            request.saga_id,
            order_processing::SAGA_TYPE,
            event.payment_status(),
            serde_json::to_value(&event)?,
        );
        uow.save_outbox_message(&outbox_message).await?;

        uow.commit().await?;

        metrics::counter!("payment_outcomes_total", "status" => event.payment_status().as_str())
            .increment(1);
        tracing::info!(
            payment_id = %payment.id(),
            payment_status = %payment.status(),
            "payment outcome staged in outbox"
        );
        Ok(event)
    }

    /// Looks up the winner's outcome after losing an outbox insert race.
    async fn replay_after_conflict(
        &self,
        request: &PaymentRequest,
        command: PaymentCommand,
    ) -> Result<PaymentEvent> {
        let mut uow = self.store.begin().await?;
        let existing = uow
            .find_outbox_by_saga_id_and_type(
                order_processing::SAGA_TYPE,
                request.saga_id,
                command.outcome_statuses(),
            )
            .await?;
        uow.commit().await?;

        match existing {
            Some(existing) => self.replay(existing).await,
            None => Err(SagaError::Store(StoreError::Backend(format!(
                "outbox row for saga {} vanished after a key conflict",
                request.saga_id
            )))),
        }
    }

    /// Returns a stored outcome, re-sending it if it was already published.
    async fn replay(&self, existing: OutboxMessage) -> Result<PaymentEvent> {
        metrics::counter!("payment_duplicates_total").increment(1);
        let event: PaymentEvent = serde_json::from_value(existing.payload.clone())?;

        if existing.outbox_status == OutboxStatus::Completed
            && let Err(err) = self.dispatcher.redeliver(&existing).await
        {
            tracing::error!(
                error = %err,
                saga_id = %existing.saga_id,
                "could not re-send payment response"
            );
        }

        Ok(event)
    }

    /// The store this coordinator writes to.
    pub fn store(&self) -> &S {
        &self.store
    }
}
