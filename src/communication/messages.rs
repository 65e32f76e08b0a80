use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Asynchronous notifications exchanged between controllers.
///
/// Delivery is at-most-once and may be dropped without affecting
/// correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinationMessage {
    /// Cars were just pushed to the receiver. Carries no volume or sender.
    IncomingCars,
}

pub type Mailbox = UnboundedSender<CoordinationMessage>;
pub type Inbox = UnboundedReceiver<CoordinationMessage>;
