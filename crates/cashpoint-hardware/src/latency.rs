//! Simulated device busy-time.
//!
//! Every mechanical operation has a nominal duration ([`DeviceTimings`]).
//! How long the simulation actually waits is decided by the injected
//! [`Latency`] strategy, so tests can run with [`Latency::Instant`] while
//! the demo runs in real time.
//!
//! Timeout decisions are made against the nominal duration, never against
//! the scaled wait. A command whose nominal duration exceeds the caller's
//! timeout fails with `Timeout` under every strategy.

use crate::error::{Result, XfsError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Strategy for turning nominal device durations into real waits.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Latency {
    /// Wait the full nominal duration.
    #[default]
    Realtime,

    /// Wait the nominal duration multiplied by a factor.
    Scaled(f64),

    /// Do not wait at all.
    Instant,
}

impl Latency {
    /// Real wait for a nominal duration under this strategy.
    ///
    /// # Examples
    ///
    /// ```
    /// use cashpoint_hardware::latency::Latency;
    /// use std::time::Duration;
    ///
    /// let nominal = Duration::from_millis(2000);
    /// assert_eq!(Latency::Realtime.scale(nominal), nominal);
    /// assert_eq!(Latency::Scaled(0.5).scale(nominal), Duration::from_millis(1000));
    /// assert_eq!(Latency::Instant.scale(nominal), Duration::ZERO);
    /// ```
    pub fn scale(&self, nominal: Duration) -> Duration {
        match *self {
            Self::Realtime => nominal,
            Self::Scaled(factor) if factor.is_finite() && factor > 0.0 => {
                Duration::try_from_secs_f64(nominal.as_secs_f64() * factor)
                    .unwrap_or(Duration::MAX)
            }
            Self::Scaled(_) | Self::Instant => Duration::ZERO,
        }
    }

    /// Simulate a device operation with the given nominal duration.
    ///
    /// With a caller timeout shorter than `nominal`, waits for the (scaled)
    /// timeout and returns `Timeout`. Providers call this before committing
    /// any state change, so a timed-out command never mutates the device.
    ///
    /// # Errors
    ///
    /// Returns `XfsError::Timeout` if `timeout` is shorter than `nominal`.
    pub async fn simulate(&self, nominal: Duration, timeout: Option<Duration>) -> Result<()> {
        if let Some(limit) = timeout
            && nominal > limit
        {
            self.wait(limit).await;
            let limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            return Err(XfsError::timeout(limit_ms));
        }

        self.wait(nominal).await;
        Ok(())
    }

    async fn wait(&self, nominal: Duration) {
        let delay = self.scale(nominal);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Nominal duration of each mechanical operation, in milliseconds.
///
/// Defaults keep the relative ordering of a real ATM: dispensing takes
/// longer than printing, which takes longer than ejecting a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceTimings {
    pub read_card_ms: u64,
    pub eject_card_ms: u64,
    pub retain_card_ms: u64,
    pub dispense_ms: u64,
    pub retract_ms: u64,
    pub print_ms: u64,
    pub pin_entry_ms: u64,
}

impl DeviceTimings {
    pub fn read_card(&self) -> Duration {
        Duration::from_millis(self.read_card_ms)
    }

    pub fn eject_card(&self) -> Duration {
        Duration::from_millis(self.eject_card_ms)
    }

    pub fn retain_card(&self) -> Duration {
        Duration::from_millis(self.retain_card_ms)
    }

    pub fn dispense(&self) -> Duration {
        Duration::from_millis(self.dispense_ms)
    }

    pub fn retract(&self) -> Duration {
        Duration::from_millis(self.retract_ms)
    }

    pub fn print(&self) -> Duration {
        Duration::from_millis(self.print_ms)
    }

    pub fn pin_entry(&self) -> Duration {
        Duration::from_millis(self.pin_entry_ms)
    }
}

impl Default for DeviceTimings {
    fn default() -> Self {
        Self {
            read_card_ms: 1000,
            eject_card_ms: 500,
            retain_card_ms: 500,
            dispense_ms: 2000,
            retract_ms: 1000,
            print_ms: 1500,
            pin_entry_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_rejects_bad_factors() {
        let nominal = Duration::from_secs(1);
        assert_eq!(Latency::Scaled(-1.0).scale(nominal), Duration::ZERO);
        assert_eq!(Latency::Scaled(f64::NAN).scale(nominal), Duration::ZERO);
        assert_eq!(Latency::Scaled(0.0).scale(nominal), Duration::ZERO);
    }

    #[test]
    fn test_default_timings_ordering() {
        let timings = DeviceTimings::default();
        assert!(timings.dispense() > timings.print());
        assert!(timings.print() > timings.eject_card());
    }

    #[tokio::test]
    async fn test_instant_simulation_succeeds() {
        let result = Latency::Instant
            .simulate(Duration::from_secs(10), None)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_shorter_than_nominal() {
        let result = Latency::Instant
            .simulate(Duration::from_millis(2000), Some(Duration::from_millis(500)))
            .await;
        assert_eq!(result, Err(XfsError::timeout(500)));
    }

    #[tokio::test]
    async fn test_timeout_equal_to_nominal_is_enough() {
        let result = Latency::Instant
            .simulate(Duration::from_millis(500), Some(Duration::from_millis(500)))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_waits_nominal_duration() {
        let start = tokio::time::Instant::now();
        Latency::Realtime
            .simulate(Duration::from_millis(1500), None)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_timeout_waits_for_limit() {
        let start = tokio::time::Instant::now();
        let result = Latency::Realtime
            .simulate(Duration::from_millis(2000), Some(Duration::from_millis(300)))
            .await;

        assert!(matches!(result, Err(XfsError::Timeout { duration_ms: 300 })));
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_huge_timeout_saturates_reported_millis() {
        let limit = Duration::from_secs(u64::MAX);
        let result = Latency::Instant.simulate(Duration::MAX, Some(limit)).await;
        assert!(matches!(
            result,
            Err(XfsError::Timeout {
                duration_ms: u64::MAX
            })
        ));
    }

    #[test]
    fn test_latency_serialization() {
        let json = serde_json::to_string(&Latency::Scaled(0.25)).unwrap();
        assert_eq!(json, r#"{"scaled":0.25}"#);
        let back: Latency = serde_json::from_str(r#""instant""#).unwrap();
        assert_eq!(back, Latency::Instant);
    }
}
