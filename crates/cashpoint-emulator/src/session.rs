//! Customer session data.
//!
//! During a transaction the application parks data (card number,
//! transaction type, amount) in a key-value session store shared with the
//! host side. [`SessionStore`] is that contract; [`MemorySessionStore`] is
//! the in-process implementation used by tests and the demo.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use cashpoint_core::constants::{
    SESSION_AMOUNT, SESSION_BALANCE, SESSION_CARD_NUMBER, SESSION_TRANSACTION_TYPE,
};

/// Key-value store for the data of the current customer session.
///
/// Writes are last-write-wins. Values are opaque strings.
pub trait SessionStore {
    /// Store `value` under `key`, replacing any previous value.
    fn set_data(&mut self, key: &str, value: &str);

    /// Value stored under `key`, if any.
    fn get_data(&self, key: &str) -> Option<String>;

    /// Remove one key. Returns whether it was present.
    fn remove_data(&mut self, key: &str) -> bool;

    /// Remove every key.
    fn clear_data(&mut self);

    /// Number of stored keys.
    fn len(&self) -> usize;

    fn has_key(&self, key: &str) -> bool {
        self.get_data(key).is_some()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the well-known transaction keys.
    fn transaction_record(&self, atm_id: &str) -> TransactionRecord {
        TransactionRecord {
            card_number: self.get_data(SESSION_CARD_NUMBER),
            transaction_type: self.get_data(SESSION_TRANSACTION_TYPE),
            amount: self.get_data(SESSION_AMOUNT),
            balance: self.get_data(SESSION_BALANCE),
            timestamp: Utc::now(),
            atm_id: atm_id.to_string(),
        }
    }
}

/// Transaction data handed to the host at the end of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactionRecord {
    pub card_number: Option<String>,
    pub transaction_type: Option<String>,
    pub amount: Option<String>,
    pub balance: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "ATMId")]
    pub atm_id: String,
}

impl TransactionRecord {
    /// Pretty-printed JSON form of the record.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; the record only holds strings and a
    /// timestamp, so this does not fail in practice.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// In-memory [`SessionStore`].
///
/// # Examples
///
/// ```
/// use cashpoint_emulator::{MemorySessionStore, SessionStore};
///
/// let mut session = MemorySessionStore::new();
/// session.set_data("Amount", "50");
/// session.set_data("Amount", "60");
///
/// assert_eq!(session.get_data("Amount").as_deref(), Some("60"));
/// assert_eq!(session.get_data("Balance"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    data: HashMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn set_data(&mut self, key: &str, value: &str) {
        debug!(key, "Session data set");
        self.data.insert(key.to_string(), value.to_string());
    }

    fn get_data(&self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }

    fn remove_data(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    fn clear_data(&mut self) {
        debug!(keys = self.data.len(), "Session data cleared");
        self.data.clear();
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn has_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }
}
