//! Both directions of the task ↔ coordinator exchange.

pub mod delivery;
pub mod registration;

pub use delivery::{DecisionSender, DeliveryError, DeliveryTarget, HttpDecisionClient};
pub use registration::{RegistrationClient, RegistrationError};
