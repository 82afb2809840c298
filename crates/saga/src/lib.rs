//! Order-fulfillment saga.
//!
//! Drives an order through the fixed step sequence
//! {reserve inventory → verify payment → allocate shipping → notify},
//! compensating completed work on failure. The webhook ingress is the gate
//! that starts the saga for a paid order; the reaper cancels orders that
//! never paid. Every handler is a stateless unit over a shared
//! [`FulfillmentContext`]; consistency rests on the store's conditional
//! writes and the idempotency keys on each side-effectful step.

pub mod compensation;
pub mod context;
pub mod error;
pub mod ingress;
pub mod notify;
pub mod orchestrator;
pub mod reaper;
pub mod shipping;
pub mod steps;

pub use compensation::{CompensationHandler, CompensationOp, CompensationReport};
pub use context::{FulfillmentConfig, FulfillmentContext};
pub use error::SagaError;
pub use ingress::{IngressOutcome, WebhookIngress};
pub use notify::{InMemoryNotifier, LogNotifier, Notification, Notifier, NotifyError};
pub use orchestrator::Orchestrator;
pub use reaper::{Reaper, ReaperStats};
pub use shipping::ShippingAllocator;
pub use steps::{PaymentOutput, ReservationOutput, ReservedItem, SagaOutcome, ShippingOutput};
