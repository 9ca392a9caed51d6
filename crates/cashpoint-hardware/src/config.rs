//! Simulation configuration for the service providers.
//!
//! [`XfsConfig`] seeds the initial state of every provider created at
//! `startup`: cassette contents, paper level, the card presented to the
//! reader and the PIN keyed on the PIN pad. It also selects the latency
//! strategy and the nominal device timings.

use crate::latency::{DeviceTimings, Latency};
use crate::types::CashUnit;
use cashpoint_core::constants::{MAX_PIN_LENGTH, MIN_PIN_LENGTH};
use cashpoint_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Configuration for the simulated devices.
///
/// Missing fields fall back to the defaults when deserializing.
///
/// # Examples
///
/// ```
/// use cashpoint_hardware::config::XfsConfig;
/// use cashpoint_hardware::latency::Latency;
///
/// let config = XfsConfig::from_json_str(r#"{ "paper_level": 3, "latency": "instant" }"#).unwrap();
/// assert_eq!(config.paper_level, 3);
/// assert_eq!(config.latency, Latency::Instant);
/// assert_eq!(config.cash_units.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XfsConfig {
    /// Track 2 data returned by the card reader.
    pub card_track_data: String,

    /// Initial cassette contents of the cash dispenser.
    pub cash_units: Vec<CashUnit>,

    /// Initial number of receipts the printer can print.
    pub paper_level: u32,

    /// Toner level reported by the printer, in percent.
    pub toner_level: u8,

    /// PIN captured when `GetPin` is executed without keyed digits.
    pub simulated_pin: String,

    /// Latency strategy.
    pub latency: Latency,

    /// Nominal operation durations.
    pub timings: DeviceTimings,
}

impl Default for XfsConfig {
    fn default() -> Self {
        Self {
            card_track_data: "4532123456789012=2512101123456789".to_string(),
            cash_units: vec![
                CashUnit::new(20, 100, "GBP"),
                CashUnit::new(10, 200, "GBP"),
                CashUnit::new(5, 150, "GBP"),
            ],
            paper_level: 100,
            toner_level: 80,
            simulated_pin: "1234".to_string(),
            latency: Latency::Realtime,
            timings: DeviceTimings::default(),
        }
    }
}

impl XfsConfig {
    /// Default configuration without simulated latency, for tests.
    pub fn instant() -> Self {
        Self {
            latency: Latency::Instant,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the JSON is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("Invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the cassette contents.
    pub fn with_cash_units(mut self, units: Vec<CashUnit>) -> Self {
        self.cash_units = units;
        self
    }

    /// Set the initial paper level.
    pub fn with_paper_level(mut self, paper_level: u32) -> Self {
        self.paper_level = paper_level;
        self
    }

    /// Set the latency strategy.
    pub fn with_latency(mut self, latency: Latency) -> Self {
        self.latency = latency;
        self
    }

    /// Set the nominal operation durations.
    pub fn with_timings(mut self, timings: DeviceTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Check the configuration for values no device could hold.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero or duplicated denomination, a
    /// simulated PIN that is not 4-6 digits, or a negative/non-finite
    /// latency factor.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for unit in &self.cash_units {
            if unit.denomination == 0 {
                return Err(Error::Config("Denomination must be positive".to_string()));
            }
            if !seen.insert(unit.denomination) {
                return Err(Error::Config(format!(
                    "Duplicate cash unit for denomination {}",
                    unit.denomination
                )));
            }
        }

        let pin = &self.simulated_pin;
        if !(MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&pin.len())
            || !pin.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(Error::Config(format!(
                "Simulated PIN must be {MIN_PIN_LENGTH}-{MAX_PIN_LENGTH} digits"
            )));
        }

        if let Latency::Scaled(factor) = self.latency
            && (!factor.is_finite() || factor < 0.0)
        {
            return Err(Error::Config(format!("Invalid latency factor: {factor}")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = XfsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.latency, Latency::Realtime);
        assert_eq!(XfsConfig::instant().latency, Latency::Instant);
    }

    #[test]
    fn test_from_json_partial() {
        let config = XfsConfig::from_json_str(
            r#"{
                "cash_units": [
                    { "denomination": 50, "count": 10, "currency": "EUR" }
                ],
                "latency": { "scaled": 0.1 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.cash_units, vec![CashUnit::new(50, 10, "EUR")]);
        assert_eq!(config.latency, Latency::Scaled(0.1));
        assert_eq!(config.paper_level, 100);
    }

    #[test]
    fn test_from_json_malformed() {
        let result = XfsConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_denomination_rejected() {
        let config = XfsConfig::instant().with_cash_units(vec![CashUnit::new(0, 5, "GBP")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_denomination_rejected() {
        let config = XfsConfig::instant().with_cash_units(vec![
            CashUnit::new(10, 5, "GBP"),
            CashUnit::new(10, 7, "GBP"),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_simulated_pin_rejected() {
        let mut config = XfsConfig::instant();
        config.simulated_pin = "12a4".to_string();
        assert!(config.validate().is_err());

        config.simulated_pin = "123".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_latency_factor_rejected() {
        let config = XfsConfig::instant().with_latency(Latency::Scaled(-2.0));
        assert!(config.validate().is_err());
    }
}
