//! Wire vocabulary for the liveness session.
//!
//! Inbound messages are JSON objects tagged by `type`; the only outbound
//! message is a single base64 frame. See [`message`] for the exchange.

pub mod direction;
pub mod message;

pub use direction::Direction;
pub use message::{
    FailureReport, InboundMessage, OutboundFrame, STATE_WAITING_ACTION,
    STATE_WAITING_CENTER, ServiceNotice, StepReport,
};
