//! NDC screen state machine.
//!
//! An NDC terminal walks the customer through numbered screen states. This
//! module fixes which screen may follow which, so the application cannot
//! jump, say, from PIN entry straight to dispensing.
//!
//! # States
//!
//! | Code | State            | Legal next states                               |
//! |------|------------------|-------------------------------------------------|
//! | 000  | `Idle`           | `CardRead`                                      |
//! | 136  | `CardRead`       | `PinEntry`, `Idle`                              |
//! | 137  | `PinEntry`       | `Menu`, `Idle`                                  |
//! | 141  | `Menu`           | `AmountEntry`, `DisplayBalance`, `Idle`         |
//! | 395  | `AmountEntry`    | `Authorization`, `Menu`, `Idle`                 |
//! | 789  | `Authorization`  | `Dispense`, `DisplayBalance`, `Error`, `Idle`   |
//! | 907  | `Dispense`       | `Complete`                                      |
//! | 766  | `DisplayBalance` | `Complete`, `Menu`                              |
//! | 909  | `Complete`       | `Idle`                                          |
//! | 924  | `Error`          | `Idle`                                          |
//!
//! No state may transition to itself.
//!
//! [`request_transition`] answers the question statelessly;
//! [`StateMachine`] tracks the current screen and a bounded history.
//!
//! # Examples
//!
//! ```
//! use cashpoint_emulator::{StateCode, StateMachine};
//!
//! let mut machine = StateMachine::new();
//! machine.transition_to(StateCode::CardRead).unwrap();
//! machine.transition_to(StateCode::PinEntry).unwrap();
//!
//! // PIN entry cannot skip the menu
//! assert!(machine.transition_to(StateCode::Dispense).is_err());
//! assert_eq!(machine.current_state(), &StateCode::PinEntry);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cashpoint_core::{Error, Result};

/// Maximum number of state transitions to keep in history.
const MAX_HISTORY_SIZE: usize = 100;

/// NDC screen state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateCode {
    /// Waiting for a card (000).
    Idle,

    /// Card inserted and read (136).
    CardRead,

    /// Customer keying the PIN (137).
    PinEntry,

    /// Transaction selection (141).
    Menu,

    /// Customer keying the amount (395).
    AmountEntry,

    /// Waiting for the host to authorize (789).
    Authorization,

    /// Notes being dispensed (907).
    Dispense,

    /// Balance on screen (766).
    DisplayBalance,

    /// Transaction finished, thank-you screen (909).
    Complete,

    /// Transaction failed (924).
    Error,
}

impl StateCode {
    /// Every state, in flow order.
    pub const ALL: [StateCode; 10] = [
        StateCode::Idle,
        StateCode::CardRead,
        StateCode::PinEntry,
        StateCode::Menu,
        StateCode::AmountEntry,
        StateCode::Authorization,
        StateCode::Dispense,
        StateCode::DisplayBalance,
        StateCode::Complete,
        StateCode::Error,
    ];

    /// Three-digit NDC screen code.
    ///
    /// # Examples
    ///
    /// ```
    /// use cashpoint_emulator::StateCode;
    ///
    /// assert_eq!(StateCode::Idle.code(), "000");
    /// assert_eq!(StateCode::Dispense.code(), "907");
    /// ```
    pub fn code(&self) -> &'static str {
        match self {
            StateCode::Idle => "000",
            StateCode::CardRead => "136",
            StateCode::PinEntry => "137",
            StateCode::Menu => "141",
            StateCode::AmountEntry => "395",
            StateCode::Authorization => "789",
            StateCode::Dispense => "907",
            StateCode::DisplayBalance => "766",
            StateCode::Complete => "909",
            StateCode::Error => "924",
        }
    }

    /// States that may legally follow this one.
    pub fn successors(&self) -> &'static [StateCode] {
        match self {
            Self::Idle => &[Self::CardRead],
            Self::CardRead => &[Self::PinEntry, Self::Idle],
            Self::PinEntry => &[Self::Menu, Self::Idle],
            Self::Menu => &[Self::AmountEntry, Self::DisplayBalance, Self::Idle],
            Self::AmountEntry => &[Self::Authorization, Self::Menu, Self::Idle],
            Self::Authorization => &[
                Self::Dispense,
                Self::DisplayBalance,
                Self::Error,
                Self::Idle,
            ],
            Self::Dispense => &[Self::Complete],
            Self::DisplayBalance => &[Self::Complete, Self::Menu],
            Self::Complete => &[Self::Idle],
            Self::Error => &[Self::Idle],
        }
    }

    /// Check if `target` may follow this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use cashpoint_emulator::StateCode;
    ///
    /// assert!(StateCode::Idle.can_transition_to(&StateCode::CardRead));
    /// assert!(!StateCode::Idle.can_transition_to(&StateCode::Menu));
    /// ```
    pub fn can_transition_to(&self, target: &StateCode) -> bool {
        self.successors().contains(target)
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateCode::Idle => "Idle",
            StateCode::CardRead => "CardRead",
            StateCode::PinEntry => "PinEntry",
            StateCode::Menu => "Menu",
            StateCode::AmountEntry => "AmountEntry",
            StateCode::Authorization => "Authorization",
            StateCode::Dispense => "Dispense",
            StateCode::DisplayBalance => "DisplayBalance",
            StateCode::Complete => "Complete",
            StateCode::Error => "Error",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for StateCode {
    type Err = Error;

    /// Parse a three-digit NDC screen code.
    fn from_str(s: &str) -> Result<Self> {
        StateCode::ALL
            .into_iter()
            .find(|state| state.code() == s)
            .ok_or_else(|| Error::InvalidStateCode(s.to_string()))
    }
}

/// Outcome of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The target state may be entered.
    Accepted(StateCode),

    /// The target state may not follow the current one.
    Rejected {
        from: StateCode,
        to: StateCode,
        reason: &'static str,
    },
}

impl Transition {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Transition::Accepted(_))
    }
}

/// Decide whether `target` may follow `current`. Pure and stateless.
///
/// # Examples
///
/// ```
/// use cashpoint_emulator::{StateCode, Transition, request_transition};
///
/// assert_eq!(
///     request_transition(StateCode::Idle, StateCode::CardRead),
///     Transition::Accepted(StateCode::CardRead)
/// );
/// assert!(!request_transition(StateCode::Idle, StateCode::Idle).is_accepted());
/// ```
pub fn request_transition(current: StateCode, target: StateCode) -> Transition {
    if current == target {
        Transition::Rejected {
            from: current,
            to: target,
            reason: "already in this state",
        }
    } else if current.can_transition_to(&target) {
        Transition::Accepted(target)
    } else {
        Transition::Rejected {
            from: current,
            to: target,
            reason: "not a legal next screen",
        }
    }
}

/// A recorded state change.
///
/// `timestamp` is process-local and not serialized; deserialized records
/// carry the time of deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: StateCode,
    pub to: StateCode,

    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: StateCode, to: StateCode) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Time since the transition happened.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Current NDC screen with transition history and an optional screen
/// timeout.
///
/// Not thread-safe; wrap it in a mutex to share it between tasks.
pub struct StateMachine {
    current_state: StateCode,
    state_entered_at: Instant,
    history: VecDeque<StateTransition>,
    current_timeout: Option<Duration>,
}

impl StateMachine {
    /// Create a state machine on the Idle screen.
    pub fn new() -> Self {
        Self {
            current_state: StateCode::Idle,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            current_timeout: None,
        }
    }

    /// Create a builder, e.g. to resume on a given screen.
    ///
    /// # Examples
    ///
    /// ```
    /// use cashpoint_emulator::{StateCode, StateMachine};
    /// use std::time::Duration;
    ///
    /// let machine = StateMachine::builder()
    ///     .with_initial_state(StateCode::PinEntry)
    ///     .with_timeout(Duration::from_secs(30))
    ///     .build();
    ///
    /// assert_eq!(machine.current_state(), &StateCode::PinEntry);
    /// ```
    pub fn builder() -> StateMachineBuilder {
        StateMachineBuilder::default()
    }

    pub fn current_state(&self) -> &StateCode {
        &self.current_state
    }

    /// Time spent on the current screen.
    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    pub fn has_timed_out(&self) -> bool {
        self.current_timeout
            .is_some_and(|timeout| self.time_in_current_state() >= timeout)
    }

    /// Remaining time before the screen times out, if a timeout is set and
    /// has not expired.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.current_timeout
            .and_then(|timeout| timeout.checked_sub(self.time_in_current_state()))
    }

    /// Set a timeout for the current screen. Cleared on the next
    /// transition.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.current_timeout = Some(timeout);
    }

    pub fn clear_timeout(&mut self) {
        self.current_timeout = None;
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// The last `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Move to `new_state` if the transition table allows it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` and leaves the machine
    /// untouched if the transition is rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use cashpoint_emulator::{StateCode, StateMachine};
    ///
    /// let mut machine = StateMachine::new();
    ///
    /// let transition = machine.transition_to(StateCode::CardRead).unwrap();
    /// assert_eq!(transition.from, StateCode::Idle);
    ///
    /// assert!(machine.transition_to(StateCode::Complete).is_err());
    /// ```
    pub fn transition_to(&mut self, new_state: StateCode) -> Result<StateTransition> {
        match request_transition(self.current_state, new_state) {
            Transition::Accepted(target) => {
                let transition = StateTransition::new(self.current_state, target);
                self.perform_state_change(target, transition.clone());
                debug!(
                    from = transition.from.code(),
                    to = transition.to.code(),
                    "Screen changed"
                );
                Ok(transition)
            }
            Transition::Rejected { from, to, reason } => {
                warn!(from = from.code(), to = to.code(), reason, "Screen change rejected");
                Err(Error::InvalidStateTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                })
            }
        }
    }

    /// Return a timed-out screen to Idle.
    ///
    /// Applies to every screen that lists Idle as a legal successor:
    /// the customer input screens plus Complete and Error. Returns
    /// `Ok(None)` when no timeout expired or the screen cannot go straight
    /// back to Idle (Dispense, DisplayBalance and Idle itself).
    ///
    /// # Errors
    ///
    /// Propagates a rejected transition, which cannot happen for the
    /// screens that are handled.
    pub fn check_and_handle_timeout(&mut self) -> Result<Option<StateTransition>> {
        if !self.has_timed_out() || !self.current_state.can_transition_to(&StateCode::Idle) {
            return Ok(None);
        }

        info!(state = self.current_state.code(), "Screen timed out");
        self.transition_to(StateCode::Idle).map(Some)
    }

    /// Force a return to Idle from any screen.
    pub fn reset(&mut self) -> StateTransition {
        let transition = StateTransition::new(self.current_state, StateCode::Idle);
        self.perform_state_change(StateCode::Idle, transition.clone());
        transition
    }

    fn perform_state_change(&mut self, new_state: StateCode, transition: StateTransition) {
        self.current_state = new_state;
        self.state_entered_at = Instant::now();
        self.current_timeout = None;

        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current_state", &self.current_state)
            .field("history_len", &self.history.len())
            .field("current_timeout", &self.current_timeout)
            .finish()
    }
}

/// Builder for [`StateMachine`].
#[derive(Debug)]
pub struct StateMachineBuilder {
    initial_state: StateCode,
    history: VecDeque<StateTransition>,
    timeout: Option<Duration>,
}

impl StateMachineBuilder {
    pub fn with_initial_state(mut self, state: StateCode) -> Self {
        self.initial_state = state;
        self
    }

    /// Pre-populate history, keeping at most the newest 100 entries.
    pub fn with_history(mut self, mut history: VecDeque<StateTransition>) -> Self {
        while history.len() > MAX_HISTORY_SIZE {
            history.pop_front();
        }
        self.history = history;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> StateMachine {
        StateMachine {
            current_state: self.initial_state,
            state_entered_at: Instant::now(),
            history: self.history,
            current_timeout: self.timeout,
        }
    }
}

impl Default for StateMachineBuilder {
    fn default() -> Self {
        Self {
            initial_state: StateCode::Idle,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::thread;

    #[test]
    fn test_new_machine_starts_idle() {
        let machine = StateMachine::new();
        assert_eq!(machine.current_state(), &StateCode::Idle);
        assert!(machine.history().is_empty());
    }

    #[rstest]
    #[case(StateCode::Idle, StateCode::CardRead)]
    #[case(StateCode::CardRead, StateCode::PinEntry)]
    #[case(StateCode::CardRead, StateCode::Idle)]
    #[case(StateCode::PinEntry, StateCode::Menu)]
    #[case(StateCode::Menu, StateCode::AmountEntry)]
    #[case(StateCode::Menu, StateCode::DisplayBalance)]
    #[case(StateCode::AmountEntry, StateCode::Authorization)]
    #[case(StateCode::AmountEntry, StateCode::Menu)]
    #[case(StateCode::Authorization, StateCode::Dispense)]
    #[case(StateCode::Authorization, StateCode::Error)]
    #[case(StateCode::Dispense, StateCode::Complete)]
    #[case(StateCode::DisplayBalance, StateCode::Complete)]
    #[case(StateCode::DisplayBalance, StateCode::Menu)]
    #[case(StateCode::Complete, StateCode::Idle)]
    #[case(StateCode::Error, StateCode::Idle)]
    fn test_valid_transition(#[case] from: StateCode, #[case] to: StateCode) {
        assert_eq!(request_transition(from, to), Transition::Accepted(to));
    }

    #[rstest]
    #[case(StateCode::Idle, StateCode::PinEntry)]
    #[case(StateCode::Idle, StateCode::Dispense)]
    #[case(StateCode::PinEntry, StateCode::Dispense)]
    #[case(StateCode::Menu, StateCode::Authorization)]
    #[case(StateCode::Dispense, StateCode::Idle)]
    #[case(StateCode::Dispense, StateCode::Error)]
    #[case(StateCode::DisplayBalance, StateCode::Idle)]
    #[case(StateCode::Complete, StateCode::Menu)]
    #[case(StateCode::Error, StateCode::Menu)]
    fn test_invalid_transition(#[case] from: StateCode, #[case] to: StateCode) {
        assert!(matches!(
            request_transition(from, to),
            Transition::Rejected { reason: "not a legal next screen", .. }
        ));
    }

    #[test]
    fn test_self_transitions_rejected() {
        for state in StateCode::ALL {
            assert_eq!(
                request_transition(state, state),
                Transition::Rejected {
                    from: state,
                    to: state,
                    reason: "already in this state",
                }
            );
        }
    }

    #[test]
    fn test_transition_table_is_exhaustive() {
        let mut accepted = 0;
        for from in StateCode::ALL {
            for to in StateCode::ALL {
                let expected = from.successors().contains(&to);
                assert_eq!(request_transition(from, to).is_accepted(), expected);
                accepted += usize::from(expected);
            }
        }
        assert_eq!(accepted, 20);
    }

    #[rstest]
    #[case("000", StateCode::Idle)]
    #[case("136", StateCode::CardRead)]
    #[case("137", StateCode::PinEntry)]
    #[case("141", StateCode::Menu)]
    #[case("395", StateCode::AmountEntry)]
    #[case("789", StateCode::Authorization)]
    #[case("907", StateCode::Dispense)]
    #[case("766", StateCode::DisplayBalance)]
    #[case("909", StateCode::Complete)]
    #[case("924", StateCode::Error)]
    fn test_parse_state_code(#[case] code: &str, #[case] expected: StateCode) {
        assert_eq!(code.parse::<StateCode>().unwrap(), expected);
        assert_eq!(expected.code(), code);
    }

    #[rstest]
    #[case("999")]
    #[case("00")]
    #[case("")]
    #[case("idle")]
    fn test_parse_unknown_state_code(#[case] code: &str) {
        assert_eq!(
            code.parse::<StateCode>(),
            Err(Error::InvalidStateCode(code.to_string()))
        );
    }

    #[test]
    fn test_rejected_transition_leaves_machine() {
        let mut machine = StateMachine::new();

        let err = machine.transition_to(StateCode::Menu).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidStateTransition {
                from: "Idle".to_string(),
                to: "Menu".to_string(),
            }
        );
        assert_eq!(machine.current_state(), &StateCode::Idle);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_complete_withdrawal_flow() {
        let mut machine = StateMachine::new();
        let flow = [
            StateCode::CardRead,
            StateCode::PinEntry,
            StateCode::Menu,
            StateCode::AmountEntry,
            StateCode::Authorization,
            StateCode::Dispense,
            StateCode::Complete,
            StateCode::Idle,
        ];

        for state in flow {
            machine.transition_to(state).unwrap();
        }

        assert_eq!(machine.current_state(), &StateCode::Idle);
        assert_eq!(machine.history().len(), flow.len());
    }

    #[test]
    fn test_balance_inquiry_flow() {
        let mut machine = StateMachine::new();
        for state in [
            StateCode::CardRead,
            StateCode::PinEntry,
            StateCode::Menu,
            StateCode::DisplayBalance,
            StateCode::Menu,
            StateCode::DisplayBalance,
            StateCode::Complete,
        ] {
            machine.transition_to(state).unwrap();
        }
        assert_eq!(machine.current_state(), &StateCode::Complete);
    }

    #[test]
    fn test_last_transitions_returns_most_recent() {
        let mut machine = StateMachine::new();
        machine.transition_to(StateCode::CardRead).unwrap();
        machine.transition_to(StateCode::PinEntry).unwrap();
        machine.transition_to(StateCode::Menu).unwrap();

        let last = machine.last_transitions(2);
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].to, StateCode::PinEntry);
        assert_eq!(last[1].to, StateCode::Menu);

        assert_eq!(machine.last_transitions(10).len(), 3);
    }

    #[test]
    fn test_history_size_limit() {
        let mut machine = StateMachine::new();
        for _ in 0..60 {
            machine.transition_to(StateCode::CardRead).unwrap();
            machine.transition_to(StateCode::Idle).unwrap();
        }

        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(machine.history().back().unwrap().to, StateCode::Idle);
    }

    #[test]
    fn test_reset_from_dispense() {
        let mut machine = StateMachine::builder()
            .with_initial_state(StateCode::Dispense)
            .build();

        let transition = machine.reset();
        assert_eq!(transition.from, StateCode::Dispense);
        assert_eq!(machine.current_state(), &StateCode::Idle);
        assert_eq!(machine.history().len(), 1);
    }

    #[test]
    fn test_timeout_returns_customer_screen_to_idle() {
        let mut machine = StateMachine::builder()
            .with_initial_state(StateCode::PinEntry)
            .with_timeout(Duration::from_millis(10))
            .build();

        assert_eq!(machine.check_and_handle_timeout().unwrap().map(|t| t.to), None);

        thread::sleep(Duration::from_millis(20));
        assert!(machine.has_timed_out());
        assert_eq!(machine.time_remaining(), None);

        let transition = machine.check_and_handle_timeout().unwrap().unwrap();
        assert_eq!(transition.to, StateCode::Idle);
        assert!(!machine.has_timed_out());
    }

    #[rstest]
    #[case(StateCode::CardRead, Some(StateCode::Idle))]
    #[case(StateCode::Authorization, Some(StateCode::Idle))]
    #[case(StateCode::Complete, Some(StateCode::Idle))]
    #[case(StateCode::Error, Some(StateCode::Idle))]
    #[case(StateCode::Idle, None)]
    #[case(StateCode::DisplayBalance, None)]
    fn test_expired_timeout_by_screen(
        #[case] screen: StateCode,
        #[case] expected: Option<StateCode>,
    ) {
        let mut machine = StateMachine::builder()
            .with_initial_state(screen)
            .with_timeout(Duration::ZERO)
            .build();

        let moved = machine.check_and_handle_timeout().unwrap().map(|t| t.to);
        assert_eq!(moved, expected);
        assert_eq!(machine.current_state(), &expected.unwrap_or(screen));
    }

    #[test]
    fn test_timeout_ignored_while_dispensing() {
        let mut machine = StateMachine::builder()
            .with_initial_state(StateCode::Dispense)
            .with_timeout(Duration::ZERO)
            .build();

        assert!(machine.has_timed_out());
        assert!(machine.check_and_handle_timeout().unwrap().is_none());
        assert_eq!(machine.current_state(), &StateCode::Dispense);
    }

    #[test]
    fn test_timeout_cleared_on_transition() {
        let mut machine = StateMachine::new();
        machine.set_timeout(Duration::from_secs(30));
        assert!(machine.time_remaining().is_some());

        machine.transition_to(StateCode::CardRead).unwrap();
        assert!(machine.time_remaining().is_none());
    }

    #[test]
    fn test_builder_with_history_caps_length() {
        let history: VecDeque<StateTransition> = (0..150)
            .map(|_| StateTransition::new(StateCode::Idle, StateCode::CardRead))
            .collect();

        let machine = StateMachine::builder().with_history(history).build();
        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
    }

    #[test]
    fn test_state_display_and_serialization() {
        assert_eq!(StateCode::DisplayBalance.to_string(), "DisplayBalance");
        assert_eq!(
            serde_json::to_string(&StateCode::AmountEntry).unwrap(),
            r#""amount_entry""#
        );

        let transition = StateTransition::new(StateCode::Idle, StateCode::CardRead);
        let json = serde_json::to_string(&transition).unwrap();
        assert_eq!(json, r#"{"from":"idle","to":"card_read"}"#);
    }
}
