//! Cash dispenser service provider (CDM).
//!
//! Notes are chosen greedily, largest denomination first. A dispense either
//! takes the whole amount from the cassettes or leaves them untouched.
//!
//! The greedy mix can fail for amounts that another combination would
//! satisfy (for example 60 from {50×1, 20×3}).

use super::{Notice, Outcome, StateCell, emit};
use crate::config::XfsConfig;
use crate::error::{Result, XfsError};
use crate::events::{EventBus, EventPayload};
use crate::latency::{DeviceTimings, Latency};
use crate::traits::ServiceProvider;
use crate::types::{
    CashUnit, CashUnitInfo, Completion, DeviceState, DispenserState, DispenserStatus, InfoReply,
    NoteCount, NoteMix, Payload, ServiceHandle,
};
use cashpoint_core::ServiceClass;
use cashpoint_core::constants::{
    EVENT_CASH_PRESENTED, EVENT_CASH_RETRACTED, EVENT_ID_CASH, WFS_CMD_CDM_DISPENSE,
    WFS_CMD_CDM_PRESENT, WFS_CMD_CDM_RESET, WFS_CMD_CDM_RETRACT, WFS_INF_CDM_CASH_UNIT_INFO,
    WFS_INF_CDM_STATUS,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Compute the notes to dispense for `amount`.
///
/// Walks the cassettes from the largest denomination down, taking as many
/// notes of each as fit in the remaining amount and are available. Returns
/// `None` unless the remainder reaches exactly zero. Only denominations
/// actually used appear in the mix, largest first, with cassettes of the
/// same denomination merged into one entry.
///
/// # Examples
///
/// ```
/// use cashpoint_hardware::providers::calculate_note_mix;
/// use cashpoint_hardware::types::CashUnit;
///
/// let units = vec![
///     CashUnit::new(20, 5, "GBP"),
///     CashUnit::new(10, 5, "GBP"),
///     CashUnit::new(5, 5, "GBP"),
/// ];
///
/// let mix = calculate_note_mix(&units, 35).unwrap();
/// assert_eq!(mix.count_of(20), 1);
/// assert_eq!(mix.count_of(10), 1);
/// assert_eq!(mix.count_of(5), 1);
///
/// assert!(calculate_note_mix(&units, 37).is_none());
/// ```
pub fn calculate_note_mix(units: &[CashUnit], amount: u32) -> Option<NoteMix> {
    plan_takes(units, amount).map(|takes| mix_from_takes(units, &takes))
}

/// Notes to take from each cassette, aligned with `units`.
///
/// Cassettes sharing a denomination are drained in their listed order.
fn plan_takes(units: &[CashUnit], amount: u32) -> Option<Vec<u32>> {
    let mut order: Vec<usize> = (0..units.len())
        .filter(|&i| units[i].denomination > 0)
        .collect();
    order.sort_by(|&a, &b| units[b].denomination.cmp(&units[a].denomination));

    let mut remaining = amount;
    let mut takes = vec![0; units.len()];

    for i in order {
        if remaining == 0 {
            break;
        }
        let unit = &units[i];
        let count = (remaining / unit.denomination).min(unit.count);
        remaining -= count * unit.denomination;
        takes[i] = count;
    }

    (remaining == 0).then_some(takes)
}

/// Collapse per-cassette takes into one entry per denomination, largest first.
fn mix_from_takes(units: &[CashUnit], takes: &[u32]) -> NoteMix {
    let mut notes: Vec<NoteCount> = Vec::new();
    for (unit, &count) in units.iter().zip(takes).filter(|(_, c)| **c > 0) {
        match notes.iter_mut().find(|n| n.denomination == unit.denomination) {
            Some(note) => note.count += count,
            None => notes.push(NoteCount {
                denomination: unit.denomination,
                count,
            }),
        }
    }
    notes.sort_by(|a, b| b.denomination.cmp(&a.denomination));
    NoteMix { notes }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Dispense,
    Present,
    Retract,
    Reset,
}

impl Command {
    fn decode(code: u32) -> Result<Self> {
        match code {
            WFS_CMD_CDM_DISPENSE => Ok(Self::Dispense),
            WFS_CMD_CDM_PRESENT => Ok(Self::Present),
            WFS_CMD_CDM_RETRACT => Ok(Self::Retract),
            WFS_CMD_CDM_RESET => Ok(Self::Reset),
            _ => Err(XfsError::unsupported(format!("CDM command {code}"))),
        }
    }
}

#[derive(Debug)]
struct DispenserInner {
    /// Ordered by denomination, largest first.
    units: Vec<CashUnit>,
    presented: bool,
    last_amount: u32,
}

/// Simulated cash dispenser.
#[derive(Debug)]
pub struct CashDispenser {
    latency: Latency,
    timings: DeviceTimings,
    bus: Option<EventBus>,
    busy: Mutex<()>,
    state: StateCell<DispenserInner>,
}

impl CashDispenser {
    /// Create a dispenser loaded with the configured cassettes.
    pub fn new(config: &XfsConfig) -> Self {
        let mut units = config.cash_units.clone();
        units.sort_by(|a, b| b.denomination.cmp(&a.denomination));

        Self {
            latency: config.latency,
            timings: config.timings,
            bus: None,
            busy: Mutex::new(()),
            state: StateCell::new(DispenserInner {
                units,
                presented: false,
                last_amount: 0,
            }),
        }
    }

    /// Snapshot of the cassettes, largest denomination first.
    pub fn cash_units(&self) -> Vec<CashUnit> {
        self.state.read(|s| s.units.clone())
    }

    /// Whether notes are waiting at the output position.
    pub fn is_presented(&self) -> bool {
        self.state.read(|s| s.presented)
    }

    async fn run(
        &self,
        command: Command,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        let _busy = self.busy.lock().await;

        match command {
            Command::Dispense => {
                let Payload::Amount(amount) = payload else {
                    return Err(XfsError::invalid_payload(format!(
                        "Dispense expects an amount, got {}",
                        payload.kind()
                    )));
                };
                self.dispense(amount, timeout).await
            }
            Command::Present => self.present(),
            Command::Retract => self.retract(timeout).await,
            Command::Reset => {
                info!("Resetting cash dispenser");
                if self.is_presented() {
                    self.retract(None).await
                } else {
                    Ok((Completion::Done, None))
                }
            }
        }
    }

    async fn dispense(&self, amount: u32, timeout: Option<Duration>) -> Result<Outcome> {
        if amount == 0 {
            return Err(XfsError::hardware("Dispense amount must be positive"));
        }

        // The busy lock is held, so the cassettes cannot change before commit.
        let (mix, takes) = self
            .state
            .read(|s| plan_takes(&s.units, amount).map(|t| (mix_from_takes(&s.units, &t), t)))
            .ok_or_else(|| XfsError::hardware(format!("Cannot dispense exact amount: {amount}")))?;

        self.latency
            .simulate(self.timings.dispense(), timeout)
            .await?;

        self.state.commit(|s| {
            for (unit, take) in s.units.iter_mut().zip(&takes) {
                unit.count = unit.count.saturating_sub(*take);
            }
            s.presented = true;
            s.last_amount = amount;
        });

        info!(amount, notes = mix.note_count(), "Cash dispensed");
        Ok((Completion::NoteMix(mix), None))
    }

    fn present(&self) -> Result<Outcome> {
        let (presented, amount) = self.state.read(|s| (s.presented, s.last_amount));
        if !presented {
            return Err(XfsError::hardware("No cash to present"));
        }

        info!(amount, "Cash presented");
        Ok((
            Completion::Done,
            Some(Notice::new(
                EVENT_CASH_PRESENTED,
                EVENT_ID_CASH,
                EventPayload::Amount(amount),
            )),
        ))
    }

    async fn retract(&self, timeout: Option<Duration>) -> Result<Outcome> {
        if !self.is_presented() {
            return Err(XfsError::hardware("No cash to retract"));
        }

        self.latency
            .simulate(self.timings.retract(), timeout)
            .await?;

        let amount = self.state.commit(|s| {
            s.presented = false;
            std::mem::take(&mut s.last_amount)
        });

        info!(amount, "Cash retracted");
        Ok((
            Completion::Done,
            Some(Notice::new(
                EVENT_CASH_RETRACTED,
                EVENT_ID_CASH,
                EventPayload::Amount(amount),
            )),
        ))
    }
}

impl ServiceProvider for CashDispenser {
    fn service_class(&self) -> ServiceClass {
        ServiceClass::CashDispenser
    }

    fn initialize(&mut self, bus: EventBus) {
        self.bus = Some(bus);
        debug!("Cash dispenser initialized");
    }

    async fn execute(
        &self,
        handle: ServiceHandle,
        command: u32,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Completion> {
        debug!(service = %handle, command, "Cash dispenser execute");
        let command = Command::decode(command)?;

        match self.run(command, payload, timeout).await {
            Ok((completion, notice)) => {
                emit(self.bus.as_ref(), handle, notice);
                Ok(completion)
            }
            Err(e) => {
                warn!(service = %handle, ?command, error = %e, "Cash dispenser command failed");
                Err(e)
            }
        }
    }

    async fn get_info(&self, category: u32) -> Result<InfoReply> {
        match category {
            WFS_INF_CDM_STATUS => Ok(self.state.read(|s| {
                InfoReply::DispenserStatus(DispenserStatus {
                    device_state: DeviceState::Online,
                    dispenser_state: if s.presented {
                        DispenserState::Presented
                    } else {
                        DispenserState::Ok
                    },
                    intermediate_stacker_empty: !s.presented,
                    last_dispensed_amount: s.last_amount,
                })
            })),
            WFS_INF_CDM_CASH_UNIT_INFO => Ok(InfoReply::CashUnits(CashUnitInfo {
                units: self.cash_units(),
            })),
            _ => Err(XfsError::unsupported(format!("CDM category {category}"))),
        }
    }

    fn close(&self, handle: ServiceHandle) {
        debug!(service = %handle, "Cash dispenser session closed");
    }
}
