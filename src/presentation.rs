//! Presentation state
//!
//! Tracks whether the NPC is idle, listening to the user type, or talking.
//! Driven by input edits and the orchestrator's playback signals.

use std::fmt;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use crate::config::SettlePolicy;
use crate::dialogue::DialogueEvent;

/// Visible NPC state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentationState {
    /// Nothing happening
    #[default]
    Idle,
    /// The user is typing
    Listening,
    /// A reply is being spoken
    Talking,
}

impl fmt::Display for PresentationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Listening => f.write_str("listening"),
            Self::Talking => f.write_str("talking"),
        }
    }
}

/// Idle / Listening / Talking state machine
///
/// Under [`SettlePolicy::FixedTimer`] the machine owns a settle deadline that
/// each playback start restarts; under [`SettlePolicy::PlaybackCompletion`]
/// it leaves Talking when the orchestrator reports the turn being spoken
/// settled.
#[derive(Debug)]
pub struct PresentationStateMachine {
    state: PresentationState,
    settle: SettlePolicy,
    deadline: Option<Instant>,
    speaking: Option<u64>,
}

impl PresentationStateMachine {
    #[must_use]
    pub const fn new(settle: SettlePolicy) -> Self {
        Self {
            state: PresentationState::Idle,
            settle,
            deadline: None,
            speaking: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> PresentationState {
        self.state
    }

    /// When the Talking state times out, if a timer is running
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Raw input changed
    pub fn input_changed(&mut self) -> bool {
        self.deadline = None;
        self.transition(PresentationState::Listening)
    }

    /// The orchestrator started playback for `turn`
    ///
    /// A repeat while already Talking restarts the settle timer.
    pub fn playback_started(&mut self, turn: u64, now: Instant) -> bool {
        if let SettlePolicy::FixedTimer(wait) = self.settle {
            self.deadline = Some(now + wait);
        }
        self.speaking = Some(self.speaking.map_or(turn, |t| t.max(turn)));
        self.transition(PresentationState::Talking)
    }

    /// The orchestrator reported `turn` settled
    ///
    /// Ignored unless `turn` is the one being spoken.
    pub fn playback_settled(&mut self, turn: u64) -> bool {
        if self.state != PresentationState::Talking || self.speaking != Some(turn) {
            return false;
        }
        match self.settle {
            SettlePolicy::PlaybackCompletion { .. } => self.transition(PresentationState::Idle),
            // The timer owns the transition
            SettlePolicy::FixedTimer(_) => false,
        }
    }

    /// The orchestrator reported a failed turn
    pub fn failed(&mut self) -> bool {
        if self.state == PresentationState::Listening {
            self.transition(PresentationState::Idle)
        } else {
            false
        }
    }

    /// Leave Talking if the settle deadline has passed
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.state == PresentationState::Talking && self.transition(PresentationState::Idle)
            }
            _ => false,
        }
    }

    /// Apply an orchestrator signal
    pub fn handle_event(&mut self, event: &DialogueEvent, now: Instant) -> bool {
        match event {
            DialogueEvent::PlaybackStarted { turn } => self.playback_started(*turn, now),
            DialogueEvent::PlaybackSettled { turn } => self.playback_settled(*turn),
            DialogueEvent::Error { .. } => self.failed(),
            DialogueEvent::Reply { .. } => false,
        }
    }

    fn transition(&mut self, next: PresentationState) -> bool {
        if self.state == next {
            return false;
        }
        tracing::debug!(from = %self.state, to = %next, "presentation state");
        self.state = next;
        true
    }
}

/// Drive `machine` from orchestrator events and input edits
///
/// Every state change is published on `state`. Returns when the event
/// channel closes.
pub async fn run_presenter(
    mut machine: PresentationStateMachine,
    mut events: broadcast::Receiver<DialogueEvent>,
    mut inputs: mpsc::Receiver<String>,
    state: watch::Sender<PresentationState>,
) {
    let mut inputs_open = true;

    loop {
        let deadline = machine.deadline();

        let changed = tokio::select! {
            event = events.recv() => match event {
                Ok(event) => machine.handle_event(&event, Instant::now()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "presenter lagged behind dialogue events");
                    false
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            input = inputs.recv(), if inputs_open => match input {
                Some(_) => machine.input_changed(),
                None => {
                    inputs_open = false;
                    false
                }
            },
            () = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            } => machine.expire(Instant::now()),
        };

        if changed {
            state.send_replace(machine.state());
        }
    }

    tracing::debug!("presenter stopped");
}
