//! Delivery control: acknowledgement, redelivery and dead-lettering

pub mod controller;
pub mod dead_letter;
pub mod redelivery;
pub mod stats;

pub use controller::{ControllerSettings, DeliveryController, Disposition};
pub use dead_letter::{DeadLetterOutcome, DeadLetterRouter};
pub use redelivery::{DeliveryKey, RedeliveryTracker};
pub use stats::ControllerStats;
