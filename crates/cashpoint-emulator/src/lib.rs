//! Screen-flow layer of the Cashpoint ATM simulator.
//!
//! This crate contains the NDC screen state machine that gates which
//! customer screen may follow which, the session store the application
//! uses to carry transaction data between screens, and the host
//! authorizer that checks PINs and withdrawals against the account.

pub mod host;
pub mod session;
pub mod state_machine;

pub use host::{Authorizer, Decline};
pub use session::{MemorySessionStore, SessionStore, TransactionRecord};
pub use state_machine::{
    StateCode, StateMachine, StateMachineBuilder, StateTransition, Transition, request_transition,
};
