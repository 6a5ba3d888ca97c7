//! Terminal outcome of a single delivery.

use std::fmt;

/// What the dispatch layer must tell the broker about one delivery.
///
/// Exactly one disposition is produced per delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Positive acknowledgement; the broker drops the message.
    Ack,
    /// Negative acknowledgement without requeue; the message is discarded.
    RejectDiscard,
    /// Negative acknowledgement with requeue; the message is redelivered.
    RejectRequeue,
}

impl Disposition {
    /// Whether the broker should put the message back on the queue.
    pub const fn requeue(self) -> bool {
        matches!(self, Self::RejectRequeue)
    }

    pub const fn is_ack(self) -> bool {
        matches!(self, Self::Ack)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::RejectDiscard => "reject",
            Self::RejectRequeue => "requeue",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
