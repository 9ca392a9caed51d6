//! Card reader service provider (IDC).
//!
//! Simulates a motorized card reader: reading track data makes a card
//! present, ejecting or retaining removes it, and retained cards are
//! counted in the retain bin.

use super::{Notice, Outcome, StateCell, emit};
use crate::config::XfsConfig;
use crate::error::{Result, XfsError};
use crate::events::{EventBus, EventPayload};
use crate::latency::{DeviceTimings, Latency};
use crate::traits::ServiceProvider;
use crate::types::{
    CardReaderCapabilities, CardReaderStatus, Completion, DeviceState, InfoReply, Payload,
    ServiceHandle,
};
use cashpoint_core::ServiceClass;
use cashpoint_core::constants::{
    EVENT_CARD_EJECTED, EVENT_CARD_INSERTED, EVENT_CARD_RETAINED, EVENT_ID_CARD,
    WFS_CMD_IDC_EJECT_CARD, WFS_CMD_IDC_READ_RAW_DATA, WFS_CMD_IDC_RESET,
    WFS_CMD_IDC_RETAIN_CARD, WFS_INF_IDC_CAPABILITIES, WFS_INF_IDC_STATUS,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    ReadRawData,
    EjectCard,
    RetainCard,
    Reset,
}

impl Command {
    fn decode(code: u32) -> Result<Self> {
        match code {
            WFS_CMD_IDC_READ_RAW_DATA => Ok(Self::ReadRawData),
            WFS_CMD_IDC_EJECT_CARD => Ok(Self::EjectCard),
            WFS_CMD_IDC_RETAIN_CARD => Ok(Self::RetainCard),
            WFS_CMD_IDC_RESET => Ok(Self::Reset),
            _ => Err(XfsError::unsupported(format!("IDC command {code}"))),
        }
    }
}

#[derive(Debug, Default)]
struct CardReaderState {
    card_present: bool,
    card_data: String,
    retained_count: u32,
}

/// Simulated card reader.
///
/// # Examples
///
/// ```
/// use cashpoint_core::constants::WFS_CMD_IDC_READ_RAW_DATA;
/// use cashpoint_hardware::config::XfsConfig;
/// use cashpoint_hardware::providers::CardReader;
/// use cashpoint_hardware::traits::ServiceProvider;
/// use cashpoint_hardware::types::{Completion, Payload, ServiceHandle};
///
/// #[tokio::main]
/// async fn main() -> cashpoint_hardware::Result<()> {
///     let reader = CardReader::new(&XfsConfig::instant());
///
///     let completion = reader
///         .execute(ServiceHandle::new(1000), WFS_CMD_IDC_READ_RAW_DATA, Payload::Empty, None)
///         .await?;
///
///     assert!(matches!(completion, Completion::TrackData(_)));
///     assert!(reader.is_card_present());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct CardReader {
    track_data: String,
    latency: Latency,
    timings: DeviceTimings,
    bus: Option<EventBus>,
    busy: Mutex<()>,
    state: StateCell<CardReaderState>,
}

impl CardReader {
    /// Create a card reader with no card inserted.
    pub fn new(config: &XfsConfig) -> Self {
        Self {
            track_data: config.card_track_data.clone(),
            latency: config.latency,
            timings: config.timings,
            bus: None,
            busy: Mutex::new(()),
            state: StateCell::new(CardReaderState::default()),
        }
    }

    /// Whether a card is currently in the reader.
    pub fn is_card_present(&self) -> bool {
        self.state.read(|s| s.card_present)
    }

    /// Number of cards captured into the retain bin.
    pub fn retained_count(&self) -> u32 {
        self.state.read(|s| s.retained_count)
    }

    async fn run(&self, command: Command, timeout: Option<Duration>) -> Result<Outcome> {
        let _busy = self.busy.lock().await;

        match command {
            Command::ReadRawData => self.read_raw_data(timeout).await,
            Command::EjectCard => self.eject(timeout).await,
            Command::RetainCard => self.retain(timeout).await,
            Command::Reset => {
                info!("Resetting card reader");
                if self.is_card_present() {
                    self.eject(None).await
                } else {
                    Ok((Completion::Done, None))
                }
            }
        }
    }

    async fn read_raw_data(&self, timeout: Option<Duration>) -> Result<Outcome> {
        self.latency
            .simulate(self.timings.read_card(), timeout)
            .await?;

        let data = self.track_data.clone();
        self.state.commit(|s| {
            s.card_present = true;
            s.card_data = data.clone();
        });

        info!("Card read successfully");
        Ok((
            Completion::TrackData(data.clone()),
            Some(Notice::new(
                EVENT_CARD_INSERTED,
                EVENT_ID_CARD,
                EventPayload::TrackData(data),
            )),
        ))
    }

    async fn eject(&self, timeout: Option<Duration>) -> Result<Outcome> {
        if !self.is_card_present() {
            return Err(XfsError::hardware("No card to eject"));
        }

        self.latency
            .simulate(self.timings.eject_card(), timeout)
            .await?;

        self.state.commit(|s| {
            s.card_present = false;
            s.card_data.clear();
        });

        info!("Card ejected");
        Ok((
            Completion::Done,
            Some(Notice::new(EVENT_CARD_EJECTED, EVENT_ID_CARD, EventPayload::None)),
        ))
    }

    async fn retain(&self, timeout: Option<Duration>) -> Result<Outcome> {
        if !self.is_card_present() {
            return Err(XfsError::hardware("No card to retain"));
        }

        self.latency
            .simulate(self.timings.retain_card(), timeout)
            .await?;

        let retained = self.state.commit(|s| {
            s.card_present = false;
            s.card_data.clear();
            s.retained_count = s.retained_count.saturating_add(1);
            s.retained_count
        });

        info!(retained, "Card retained");
        Ok((
            Completion::Done,
            Some(Notice::new(EVENT_CARD_RETAINED, EVENT_ID_CARD, EventPayload::None)),
        ))
    }
}

impl ServiceProvider for CardReader {
    fn service_class(&self) -> ServiceClass {
        ServiceClass::CardReader
    }

    fn initialize(&mut self, bus: EventBus) {
        self.bus = Some(bus);
        debug!("Card reader initialized");
    }

    async fn execute(
        &self,
        handle: ServiceHandle,
        command: u32,
        _payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Completion> {
        debug!(service = %handle, command, "Card reader execute");
        let command = Command::decode(command)?;

        match self.run(command, timeout).await {
            Ok((completion, notice)) => {
                emit(self.bus.as_ref(), handle, notice);
                Ok(completion)
            }
            Err(e) => {
                warn!(service = %handle, ?command, error = %e, "Card reader command failed");
                Err(e)
            }
        }
    }

    async fn get_info(&self, category: u32) -> Result<InfoReply> {
        match category {
            WFS_INF_IDC_STATUS => Ok(self.state.read(|s| {
                InfoReply::CardReaderStatus(CardReaderStatus {
                    device_state: DeviceState::Online,
                    media_present: s.card_present,
                    retain_bin_count: s.retained_count,
                })
            })),
            WFS_INF_IDC_CAPABILITIES => Ok(InfoReply::CardReaderCapabilities(
                CardReaderCapabilities {
                    can_eject: true,
                    can_retain: true,
                    can_read_track1: true,
                    can_read_track2: true,
                    can_read_track3: true,
                },
            )),
            _ => Err(XfsError::unsupported(format!("IDC category {category}"))),
        }
    }

    fn close(&self, handle: ServiceHandle) {
        debug!(service = %handle, "Card reader session closed");
    }
}
