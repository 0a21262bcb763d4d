use std::time::Duration;

use session_types::{NetMessage, ParticipantId};

/// Where a message goes on the messaging channel. The local peer has always
/// already applied the effect before emitting the send, so `All` targets
/// every remote peer; loopback delivery is harmless because the handlers
/// are idempotent, but never required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    All,
    AllExcept(ParticipantId),
    One(ParticipantId),
}

/// The controller's cancellable delay timers. At most one of each kind is
/// pending at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    /// Delay between RoundComplete and the next host selection.
    NextRound,
    /// Settle delay before a restart re-enters host selection.
    RestartSettle,
    /// Grace period before finalizing with missing guesses.
    FinalizeGrace,
}

/// One per-round (guesser, host, points) outcome destined for the durable
/// pairwise ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairOutcome {
    pub guesser: ParticipantId,
    pub guesser_avatar: u8,
    pub host: ParticipantId,
    pub host_avatar: u8,
    pub points: u32,
}

/// Side effects requested by the round controller. The embedding runtime
/// executes these; the controller itself never touches the network, timers
/// or storage, which keeps every state transition deterministic under test.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Send {
        to: Delivery,
        message: NetMessage,
    },
    /// Arm a timer. A fired timer reports its generation back; a stale
    /// generation means the timer was superseded and must be ignored.
    StartTimer {
        kind: TimerKind,
        generation: u64,
        delay: Duration,
    },
    CancelTimer {
        kind: TimerKind,
    },
    /// Persist per-round outcomes into the stats ledger, write-through.
    RecordOutcomes {
        outcomes: Vec<PairOutcome>,
    },
    /// Population collapsed to one participant; the match is over for good.
    MatchCancelled,
}
