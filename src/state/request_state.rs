/// Lifecycle states of a work item
///
/// A work item is `Pending` while it sits in the admission queue and `InFlight`
/// while a fetch for it runs. Routing moves it to a terminal state or, through
/// `Retrying`, back to `Pending`.
use std::fmt;

/// Represents the current state of a work item in the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    // ===== Active States =====
    /// Waiting in the admission queue
    Pending,

    /// Dispatched; a fetch is running for it
    InFlight,

    /// Failed with a retryable outcome and is about to be re-admitted
    Retrying,

    // ===== Terminal States =====
    /// Fetched successfully and handed to its producer
    Completed,

    /// Given up on (fatal outcome or exhausted timeout budget)
    Abandoned,
}

impl RequestState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    /// Checks whether `self -> next` is a legal lifecycle step
    ///
    /// `InFlight -> Pending` is legal: it is what happens when an in-flight item
    /// is stopped and pushed back to the front of the queue.
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Completed)
                | (Self::InFlight, Self::Abandoned)
                | (Self::InFlight, Self::Retrying)
                | (Self::InFlight, Self::Pending)
                | (Self::Retrying, Self::Pending)
        )
    }

    /// Name used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
