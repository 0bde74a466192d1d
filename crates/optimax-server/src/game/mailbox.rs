//! Per-tick action barrier.
//!
//! Network handlers deposit actions from any task; the lobby's coordinator waits until every
//! expected slot is filled or its timeout fires.

use std::sync::{Mutex, MutexGuard, PoisonError};

use optimax_protocol::{Action, ActionError, AgentSlot};
use tokio::sync::Notify;

/// Why a submission was not deposited
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Submission for tick {got}, but tick {expected} is open")]
    StaleTick { expected: u64, got: u64 },
    #[error("No action window is open")]
    WindowClosed,
    #[error("{0} is not expected to act this tick")]
    NotExpected(AgentSlot),
    #[error("Sender does not control an agent")]
    NotAnAgent,
    #[error("Lobby is not running a game")]
    NotActive,
    #[error("Malformed action: {0}")]
    Malformed(#[from] ActionError),
}

#[derive(Debug, Default)]
struct Window {
    tick: u64,
    open: bool,
    expected: [bool; 2],
    slots: [Option<Action>; 2],
}

impl Window {
    fn is_complete(&self) -> bool {
        AgentSlot::ALL
            .iter()
            .all(|slot| !self.expected[slot.index()] || self.slots[slot.index()].is_some())
    }
}

#[derive(Debug, Default)]
pub struct Mailbox {
    window: Mutex<Window>,
    filled: Notify,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the window for `tick`, discarding anything left from the previous one.
    pub fn open(&self, tick: u64, expected: [bool; 2]) {
        let mut window = self.lock();
        window.tick = tick;
        window.open = true;
        window.expected = expected;
        window.slots = [None; 2];
    }

    /// Deposit an action. A later submission for the same tick replaces an earlier one.
    pub fn submit(&self, slot: AgentSlot, tick: u64, action: Action) -> Result<(), SubmitError> {
        {
            let mut window = self.lock();
            if !window.open {
                return Err(SubmitError::WindowClosed);
            }
            if tick != window.tick {
                return Err(SubmitError::StaleTick {
                    expected: window.tick,
                    got: tick,
                });
            }
            if !window.expected[slot.index()] {
                return Err(SubmitError::NotExpected(slot));
            }
            window.slots[slot.index()] = Some(action);
        }
        self.filled.notify_one();
        Ok(())
    }

    pub fn open_tick(&self) -> Option<u64> {
        let window = self.lock();
        window.open.then_some(window.tick)
    }

    pub fn is_complete(&self) -> bool {
        self.lock().is_complete()
    }

    /// Resolves once every expected slot holds an action.
    pub async fn wait_complete(&self) {
        loop {
            if self.is_complete() {
                return;
            }
            self.filled.notified().await;
        }
    }

    /// Close the window; empty slots become `Stay`.
    pub fn close(&self) -> [Action; 2] {
        let mut window = self.lock();
        window.open = false;
        let slots = std::mem::take(&mut window.slots);
        slots.map(Option::unwrap_or_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimax_protocol::{Direction, Pos};
    use tokio_test::{assert_pending, assert_ready, task};

    const ALL: [bool; 2] = [true, true];

    fn step(direction: Direction) -> Action {
        Action::Move { direction }
    }

    #[test]
    fn last_submission_wins() {
        let mailbox = Mailbox::new();
        mailbox.open(3, ALL);
        mailbox.submit(AgentSlot::First, 3, step(Direction::Up)).unwrap();
        mailbox
            .submit(
                AgentSlot::First,
                3,
                Action::AttackTile {
                    target: Pos::new(2, 2),
                },
            )
            .unwrap();
        let actions = mailbox.close();
        assert_eq!(
            actions,
            [
                Action::AttackTile {
                    target: Pos::new(2, 2)
                },
                Action::Stay
            ]
        );
    }

    #[test]
    fn stale_and_closed_submissions_are_rejected() {
        let mailbox = Mailbox::new();
        assert_eq!(
            mailbox.submit(AgentSlot::First, 0, Action::Heal),
            Err(SubmitError::WindowClosed)
        );

        mailbox.open(5, ALL);
        assert_eq!(
            mailbox.submit(AgentSlot::Second, 4, Action::Heal),
            Err(SubmitError::StaleTick {
                expected: 5,
                got: 4
            })
        );
        assert_eq!(mailbox.open_tick(), Some(5));

        mailbox.close();
        assert_eq!(mailbox.open_tick(), None);
        assert_eq!(
            mailbox.submit(AgentSlot::Second, 5, Action::Heal),
            Err(SubmitError::WindowClosed)
        );
    }

    #[test]
    fn reopening_clears_previous_actions() {
        let mailbox = Mailbox::new();
        mailbox.open(0, ALL);
        mailbox.submit(AgentSlot::Second, 0, Action::Heal).unwrap();
        mailbox.close();
        mailbox.open(1, ALL);
        assert!(!mailbox.is_complete());
        assert_eq!(mailbox.close(), [Action::Stay, Action::Stay]);
    }

    #[test]
    fn unexpected_slot_cannot_submit() {
        let mailbox = Mailbox::new();
        mailbox.open(0, [true, false]);
        assert_eq!(
            mailbox.submit(AgentSlot::Second, 0, Action::Heal),
            Err(SubmitError::NotExpected(AgentSlot::Second))
        );
        mailbox.submit(AgentSlot::First, 0, Action::Stay).unwrap();
        assert!(mailbox.is_complete());
    }

    #[test]
    fn waiter_wakes_only_when_both_slots_filled() {
        let mailbox = Mailbox::new();
        mailbox.open(0, ALL);
        let mut wait = task::spawn(mailbox.wait_complete());
        assert_pending!(wait.poll());

        mailbox.submit(AgentSlot::First, 0, Action::Stay).unwrap();
        assert!(wait.is_woken());
        assert_pending!(wait.poll());

        mailbox.submit(AgentSlot::Second, 0, Action::Heal).unwrap();
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }
}
