//! PIN pad service provider (PIN).
//!
//! The captured PIN never leaves the provider in clear text: it is only
//! exposed as a PIN block, and never logged.

use super::{Outcome, StateCell, emit};
use crate::config::XfsConfig;
use crate::error::{Result, XfsError};
use crate::events::EventBus;
use crate::latency::{DeviceTimings, Latency};
use crate::traits::ServiceProvider;
use crate::types::{
    Completion, DeviceState, InfoReply, Payload, PinPadCapabilities, PinPadStatus, ServiceHandle,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cashpoint_core::ServiceClass;
use cashpoint_core::constants::{
    MAX_PIN_LENGTH, MIN_PIN_LENGTH, WFS_CMD_PIN_GET_PIN, WFS_CMD_PIN_GET_PINBLOCK,
    WFS_CMD_PIN_RESET, WFS_INF_PIN_CAPABILITIES, WFS_INF_PIN_STATUS,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    GetPin,
    GetPinBlock,
    Reset,
}

impl Command {
    fn decode(code: u32) -> Result<Self> {
        match code {
            WFS_CMD_PIN_GET_PIN => Ok(Self::GetPin),
            WFS_CMD_PIN_GET_PINBLOCK => Ok(Self::GetPinBlock),
            WFS_CMD_PIN_RESET => Ok(Self::Reset),
            _ => Err(XfsError::unsupported(format!("PIN command {code}"))),
        }
    }
}

fn is_valid_pin(pin: &str) -> bool {
    (MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Simulated encrypting PIN pad.
pub struct PinPad {
    simulated_pin: String,
    latency: Latency,
    timings: DeviceTimings,
    bus: Option<EventBus>,
    busy: Mutex<()>,
    state: StateCell<Option<String>>,
}

impl PinPad {
    /// Create a PIN pad with no PIN captured.
    pub fn new(config: &XfsConfig) -> Self {
        Self {
            simulated_pin: config.simulated_pin.clone(),
            latency: config.latency,
            timings: config.timings,
            bus: None,
            busy: Mutex::new(()),
            state: StateCell::new(None),
        }
    }

    /// Whether a PIN has been captured since the last reset.
    pub fn has_pin(&self) -> bool {
        self.state.read(Option::is_some)
    }

    async fn run(
        &self,
        command: Command,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        let _busy = self.busy.lock().await;

        match command {
            Command::GetPin => {
                let pin = match payload {
                    Payload::Text(keyed) => keyed,
                    Payload::Empty => self.simulated_pin.clone(),
                    other => {
                        return Err(XfsError::invalid_payload(format!(
                            "GetPin expects text, got {}",
                            other.kind()
                        )));
                    }
                };

                if !is_valid_pin(&pin) {
                    return Err(XfsError::user(format!(
                        "PIN must be {MIN_PIN_LENGTH}-{MAX_PIN_LENGTH} digits"
                    )));
                }

                self.latency
                    .simulate(self.timings.pin_entry(), timeout)
                    .await?;

                let digits = pin.len();
                self.state.commit(|s| *s = Some(pin));
                info!(digits, "PIN entered");
                Ok((Completion::Done, None))
            }
            Command::GetPinBlock => {
                let block = self
                    .state
                    .read(|s| s.as_deref().map(|pin| STANDARD.encode(pin.as_bytes())))
                    .ok_or_else(|| XfsError::user("No PIN entered"))?;

                debug!("PIN block generated");
                Ok((Completion::PinBlock(block), None))
            }
            Command::Reset => {
                self.state.commit(|s| *s = None);
                info!("PIN pad reset");
                Ok((Completion::Done, None))
            }
        }
    }
}

impl std::fmt::Debug for PinPad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinPad")
            .field("latency", &self.latency)
            .field("has_pin", &self.has_pin())
            .finish_non_exhaustive()
    }
}

impl ServiceProvider for PinPad {
    fn service_class(&self) -> ServiceClass {
        ServiceClass::PinPad
    }

    fn initialize(&mut self, bus: EventBus) {
        self.bus = Some(bus);
        debug!("PIN pad initialized");
    }

    async fn execute(
        &self,
        handle: ServiceHandle,
        command: u32,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Completion> {
        debug!(service = %handle, command, "PIN pad execute");
        let command = Command::decode(command)?;

        match self.run(command, payload, timeout).await {
            Ok((completion, notice)) => {
                emit(self.bus.as_ref(), handle, notice);
                Ok(completion)
            }
            Err(e) => {
                warn!(service = %handle, ?command, error = %e, "PIN pad command failed");
                Err(e)
            }
        }
    }

    async fn get_info(&self, category: u32) -> Result<InfoReply> {
        match category {
            WFS_INF_PIN_STATUS => Ok(InfoReply::PinPadStatus(PinPadStatus {
                device_state: DeviceState::Online,
                encryption_ready: true,
                keys_loaded: true,
                pin_entered: self.has_pin(),
            })),
            WFS_INF_PIN_CAPABILITIES => Ok(InfoReply::PinPadCapabilities(PinPadCapabilities {
                can_ecb: true,
                can_cbc: true,
                can_mac: true,
                can_triple_des: true,
            })),
            _ => Err(XfsError::unsupported(format!("PIN category {category}"))),
        }
    }

    fn close(&self, handle: ServiceHandle) {
        debug!(service = %handle, "PIN pad session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HANDLE: ServiceHandle = ServiceHandle::new(1002);

    async fn pin_block(pad: &PinPad) -> Result<Completion> {
        pad.execute(HANDLE, WFS_CMD_PIN_GET_PINBLOCK, Payload::Empty, None)
            .await
    }

    #[tokio::test]
    async fn test_pin_block_requires_pin() {
        let pad = PinPad::new(&XfsConfig::instant());
        let result = pin_block(&pad).await;
        assert!(matches!(result, Err(XfsError::User { .. })));
    }

    #[tokio::test]
    async fn test_simulated_pin_block() {
        let pad = PinPad::new(&XfsConfig::instant());

        pad.execute(HANDLE, WFS_CMD_PIN_GET_PIN, Payload::Empty, None)
            .await
            .unwrap();

        assert_eq!(
            pin_block(&pad).await.unwrap(),
            Completion::PinBlock("MTIzNA==".to_string())
        );
    }

    #[tokio::test]
    async fn test_keyed_pin_block() {
        let pad = PinPad::new(&XfsConfig::instant());

        pad.execute(HANDLE, WFS_CMD_PIN_GET_PIN, Payload::Text("987654".into()), None)
            .await
            .unwrap();

        assert_eq!(
            pin_block(&pad).await.unwrap(),
            Completion::PinBlock(STANDARD.encode("987654"))
        );
    }

    #[rstest]
    #[case("123")]
    #[case("1234567")]
    #[case("12a4")]
    #[case("")]
    #[tokio::test]
    async fn test_invalid_keyed_pin(#[case] pin: &str) {
        let pad = PinPad::new(&XfsConfig::instant());

        let result = pad
            .execute(HANDLE, WFS_CMD_PIN_GET_PIN, Payload::Text(pin.into()), None)
            .await;

        assert!(matches!(result, Err(XfsError::User { .. })));
        assert!(!pad.has_pin());
    }

    #[tokio::test]
    async fn test_amount_payload_rejected() {
        let pad = PinPad::new(&XfsConfig::instant());
        let result = pad
            .execute(HANDLE, WFS_CMD_PIN_GET_PIN, Payload::Amount(1234), None)
            .await;
        assert!(matches!(result, Err(XfsError::InvalidPayload { .. })));
    }

    #[tokio::test]
    async fn test_reset_clears_pin() {
        let pad = PinPad::new(&XfsConfig::instant());

        pad.execute(HANDLE, WFS_CMD_PIN_GET_PIN, Payload::Empty, None)
            .await
            .unwrap();
        assert!(pad.has_pin());

        pad.execute(HANDLE, WFS_CMD_PIN_RESET, Payload::Empty, None)
            .await
            .unwrap();
        assert!(!pad.has_pin());
        assert!(pin_block(&pad).await.is_err());
    }

    #[tokio::test]
    async fn test_status_and_capabilities() {
        let pad = PinPad::new(&XfsConfig::instant());

        match pad.get_info(WFS_INF_PIN_STATUS).await.unwrap() {
            InfoReply::PinPadStatus(status) => {
                assert!(status.encryption_ready);
                assert!(!status.pin_entered);
            }
            other => panic!("unexpected reply {other:?}"),
        }

        match pad.get_info(WFS_INF_PIN_CAPABILITIES).await.unwrap() {
            InfoReply::PinPadCapabilities(caps) => assert!(caps.can_triple_des),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_debug_hides_pin() {
        let pad = PinPad::new(&XfsConfig::instant());
        pad.state.commit(|s| *s = Some("1234".to_string()));
        let rendered = format!("{pad:?}");
        assert!(!rendered.contains("1234"));
    }
}
