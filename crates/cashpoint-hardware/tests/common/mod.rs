//! Shared helpers for the manager integration tests.

#![allow(dead_code)]

use cashpoint_core::constants::{
    DEFAULT_XFS_VERSION, WFS_CMD_CDM_DISPENSE, WFS_INF_CDM_CASH_UNIT_INFO,
};
use cashpoint_hardware::{
    CashUnit, Completion, InfoReply, Payload, Result, ServiceHandle, XfsConfig, XfsManager,
};
use std::time::Duration;

/// Cassettes small enough to reason about: 5 notes each of 20, 10 and 5.
pub fn small_cassettes() -> Vec<CashUnit> {
    vec![
        CashUnit::new(20, 5, "GBP"),
        CashUnit::new(10, 5, "GBP"),
        CashUnit::new(5, 5, "GBP"),
    ]
}

/// Instant-latency configuration loaded with [`small_cassettes`].
pub fn test_config() -> XfsConfig {
    XfsConfig::instant().with_cash_units(small_cassettes())
}

/// A started manager over `config`.
pub fn started_manager(config: XfsConfig) -> XfsManager {
    let manager = XfsManager::new(config);
    manager
        .startup(DEFAULT_XFS_VERSION)
        .expect("startup should succeed");
    manager
}

pub async fn dispense(
    manager: &XfsManager,
    handle: ServiceHandle,
    amount: u32,
    timeout: Option<Duration>,
) -> Result<Completion> {
    manager
        .execute(handle, WFS_CMD_CDM_DISPENSE, Payload::Amount(amount), timeout)
        .await
}

/// Remaining note counts per cassette, largest denomination first.
pub async fn note_counts(manager: &XfsManager, handle: ServiceHandle) -> Vec<u32> {
    match manager
        .get_info(handle, WFS_INF_CDM_CASH_UNIT_INFO)
        .await
        .expect("cash unit info should be available")
    {
        InfoReply::CashUnits(info) => info.units.iter().map(|u| u.count).collect(),
        other => panic!("unexpected reply {other:?}"),
    }
}
