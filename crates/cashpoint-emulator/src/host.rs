//! Host authorization for the demo account.
//!
//! Stands in for the bank host behind the terminal. It verifies the PIN
//! block produced by the PIN pad, counts wrong entries until the card must
//! be retained, and holds the account balance withdrawals are drawn from.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};

use cashpoint_core::constants::{DEFAULT_WITHDRAWAL_LIMIT, MAX_PIN_ATTEMPTS};

/// Reasons the host refuses a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Decline {
    #[error("Invalid PIN, {remaining} attempt(s) left")]
    InvalidPin { remaining: u32 },

    #[error("Card retained after {attempts} invalid PIN attempts")]
    CardRetained { attempts: u32 },

    #[error("PIN has not been verified")]
    PinNotVerified,

    #[error("Withdrawal amount must be positive")]
    ZeroAmount,

    #[error("Amount {amount} exceeds the withdrawal limit of {limit}")]
    LimitExceeded { amount: u32, limit: u32 },

    #[error("Insufficient funds: requested {amount}, balance {balance}")]
    InsufficientFunds { amount: u32, balance: u64 },
}

impl Decline {
    /// Whether the terminal must keep the customer's card.
    pub fn retains_card(&self) -> bool {
        matches!(self, Self::CardRetained { .. })
    }
}

/// One customer account as seen by the host.
///
/// A session starts unverified; [`Authorizer::verify_pin_block`] unlocks
/// balance inquiries and withdrawals until [`Authorizer::end_session`].
///
/// # Examples
///
/// ```
/// use cashpoint_emulator::{Authorizer, Decline};
///
/// let mut host = Authorizer::new("1234", 1500);
/// assert_eq!(host.authorize_withdrawal(50), Err(Decline::PinNotVerified));
///
/// host.verify_pin_block("MTIzNA==").unwrap();
/// assert_eq!(host.debit(50), Ok(1450));
/// ```
pub struct Authorizer {
    pin: String,
    balance: u64,
    withdrawal_limit: u32,
    failed_attempts: u32,
    verified: bool,
}

impl Authorizer {
    pub fn new(pin: impl Into<String>, balance: u64) -> Self {
        Self {
            pin: pin.into(),
            balance,
            withdrawal_limit: DEFAULT_WITHDRAWAL_LIMIT,
            failed_attempts: 0,
            verified: false,
        }
    }

    pub fn with_withdrawal_limit(mut self, limit: u32) -> Self {
        self.withdrawal_limit = limit;
        self
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn withdrawal_limit(&self) -> u32 {
        self.withdrawal_limit
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Check a base64 PIN block against the account PIN.
    ///
    /// A block that does not decode counts as a wrong PIN. Once the
    /// attempts are used up every further block is refused, the correct
    /// one included.
    ///
    /// # Errors
    ///
    /// `InvalidPin` while attempts remain, `CardRetained` from the last
    /// allowed attempt on.
    pub fn verify_pin_block(&mut self, pin_block: &str) -> Result<(), Decline> {
        if self.failed_attempts >= MAX_PIN_ATTEMPTS {
            return Err(Decline::CardRetained {
                attempts: self.failed_attempts,
            });
        }

        let entered = STANDARD.decode(pin_block).unwrap_or_default();
        if bool::from(entered.ct_eq(self.pin.as_bytes())) {
            self.failed_attempts = 0;
            self.verified = true;
            info!("PIN verified");
            return Ok(());
        }

        self.failed_attempts += 1;
        self.verified = false;
        warn!(
            attempts = self.failed_attempts,
            max = MAX_PIN_ATTEMPTS,
            "Invalid PIN"
        );

        if self.failed_attempts >= MAX_PIN_ATTEMPTS {
            Err(Decline::CardRetained {
                attempts: self.failed_attempts,
            })
        } else {
            Err(Decline::InvalidPin {
                remaining: MAX_PIN_ATTEMPTS - self.failed_attempts,
            })
        }
    }

    /// Check a withdrawal against the limit and the balance without
    /// touching the account.
    ///
    /// # Errors
    ///
    /// `PinNotVerified`, `ZeroAmount`, `LimitExceeded` or
    /// `InsufficientFunds`, checked in that order.
    pub fn authorize_withdrawal(&self, amount: u32) -> Result<(), Decline> {
        if !self.verified {
            return Err(Decline::PinNotVerified);
        }
        if amount == 0 {
            return Err(Decline::ZeroAmount);
        }
        if amount > self.withdrawal_limit {
            return Err(Decline::LimitExceeded {
                amount,
                limit: self.withdrawal_limit,
            });
        }
        if u64::from(amount) > self.balance {
            return Err(Decline::InsufficientFunds {
                amount,
                balance: self.balance,
            });
        }
        Ok(())
    }

    /// Take an authorized withdrawal from the account, returning the new
    /// balance.
    ///
    /// # Errors
    ///
    /// Same as [`Authorizer::authorize_withdrawal`]; the balance is only
    /// changed on success.
    pub fn debit(&mut self, amount: u32) -> Result<u64, Decline> {
        self.authorize_withdrawal(amount)?;
        self.balance -= u64::from(amount);
        info!(amount, balance = self.balance, "Account debited");
        Ok(self.balance)
    }

    /// # Errors
    ///
    /// `PinNotVerified` before a successful PIN check.
    pub fn balance_inquiry(&self) -> Result<u64, Decline> {
        if !self.verified {
            return Err(Decline::PinNotVerified);
        }
        info!(balance = self.balance, "Balance inquiry");
        Ok(self.balance)
    }

    /// Forget the PIN verification and the attempt count.
    pub fn end_session(&mut self) {
        self.verified = false;
        self.failed_attempts = 0;
    }
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("balance", &self.balance)
            .field("withdrawal_limit", &self.withdrawal_limit)
            .field("failed_attempts", &self.failed_attempts)
            .field("verified", &self.verified)
            .finish_non_exhaustive()
    }
}
