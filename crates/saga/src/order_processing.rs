//! Order processing saga constants.

/// Saga type recorded on every outbox row written by the payment step.
pub const SAGA_TYPE: &str = "OrderProcessingSaga";

/// Metric label for payment initiation requests.
pub const COMMAND_INITIATE: &str = "initiate";

/// Metric label for payment cancellation requests.
pub const COMMAND_CANCEL: &str = "cancel";
