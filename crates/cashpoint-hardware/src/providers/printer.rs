//! Receipt printer service provider (PTR).

use super::{Notice, Outcome, StateCell, emit};
use crate::config::XfsConfig;
use crate::error::{Result, XfsError};
use crate::events::{EventBus, EventPayload};
use crate::latency::{DeviceTimings, Latency};
use crate::traits::ServiceProvider;
use crate::types::{Completion, DeviceState, InfoReply, Payload, PrinterStatus, ServiceHandle};
use cashpoint_core::ServiceClass;
use cashpoint_core::constants::{
    EVENT_ID_PRINTER, EVENT_PAPER_OUT, WFS_CMD_PTR_PRINT_FORM, WFS_CMD_PTR_RESET,
    WFS_INF_PTR_STATUS,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    PrintForm,
    Reset,
}

impl Command {
    fn decode(code: u32) -> Result<Self> {
        match code {
            WFS_CMD_PTR_PRINT_FORM => Ok(Self::PrintForm),
            WFS_CMD_PTR_RESET => Ok(Self::Reset),
            _ => Err(XfsError::unsupported(format!("PTR command {code}"))),
        }
    }
}

/// Simulated receipt printer. Each printed form consumes one unit of paper.
#[derive(Debug)]
pub struct Printer {
    toner_level: u8,
    latency: Latency,
    timings: DeviceTimings,
    bus: Option<EventBus>,
    busy: Mutex<()>,
    paper_level: StateCell<u32>,
}

impl Printer {
    pub fn new(config: &XfsConfig) -> Self {
        Self {
            toner_level: config.toner_level,
            latency: config.latency,
            timings: config.timings,
            bus: None,
            busy: Mutex::new(()),
            paper_level: StateCell::new(config.paper_level),
        }
    }

    /// Receipts left before the printer runs out of paper.
    pub fn paper_level(&self) -> u32 {
        self.paper_level.read(|level| *level)
    }

    async fn run(
        &self,
        command: Command,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        let _busy = self.busy.lock().await;

        match command {
            Command::PrintForm => {
                let form = match payload {
                    Payload::Text(form) => form,
                    Payload::Empty => String::new(),
                    other => {
                        return Err(XfsError::invalid_payload(format!(
                            "PrintForm expects text, got {}",
                            other.kind()
                        )));
                    }
                };

                if self.paper_level() == 0 {
                    return Err(XfsError::hardware("Out of paper"));
                }

                self.latency
                    .simulate(self.timings.print(), timeout)
                    .await?;

                let remaining = self.paper_level.commit(|level| {
                    *level -= 1;
                    *level
                });

                info!(chars = form.len(), remaining, "Receipt printed");
                let notice = (remaining == 0).then(|| {
                    warn!("Printer out of paper");
                    Notice::new(EVENT_PAPER_OUT, EVENT_ID_PRINTER, EventPayload::None)
                });
                Ok((Completion::Done, notice))
            }
            Command::Reset => {
                info!("Printer reset");
                Ok((Completion::Done, None))
            }
        }
    }
}

impl ServiceProvider for Printer {
    fn service_class(&self) -> ServiceClass {
        ServiceClass::Printer
    }

    fn initialize(&mut self, bus: EventBus) {
        self.bus = Some(bus);
        debug!("Printer initialized");
    }

    async fn execute(
        &self,
        handle: ServiceHandle,
        command: u32,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Completion> {
        debug!(service = %handle, command, "Printer execute");
        let command = Command::decode(command)?;

        match self.run(command, payload, timeout).await {
            Ok((completion, notice)) => {
                emit(self.bus.as_ref(), handle, notice);
                Ok(completion)
            }
            Err(e) => {
                warn!(service = %handle, ?command, error = %e, "Printer command failed");
                Err(e)
            }
        }
    }

    async fn get_info(&self, category: u32) -> Result<InfoReply> {
        match category {
            WFS_INF_PTR_STATUS => Ok(InfoReply::PrinterStatus(PrinterStatus {
                device_state: DeviceState::Online,
                paper_level: self.paper_level(),
                toner_level: self.toner_level,
            })),
            _ => Err(XfsError::unsupported(format!("PTR category {category}"))),
        }
    }

    fn close(&self, handle: ServiceHandle) {
        debug!(service = %handle, "Printer session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HANDLE: ServiceHandle = ServiceHandle::new(1003);

    async fn print(printer: &Printer) -> Result<Completion> {
        printer
            .execute(
                HANDLE,
                WFS_CMD_PTR_PRINT_FORM,
                Payload::Text("RECEIPT".into()),
                None,
            )
            .await
    }

    #[tokio::test]
    async fn test_print_consumes_paper() {
        let printer = Printer::new(&XfsConfig::instant());
        print(&printer).await.unwrap();
        assert_eq!(printer.paper_level(), 99);
    }

    #[tokio::test]
    async fn test_runs_out_of_paper() {
        let paper_out = Arc::new(AtomicUsize::new(0));
        let bus = EventBus::new();
        {
            let paper_out = paper_out.clone();
            bus.subscribe(EVENT_PAPER_OUT, move |_| {
                paper_out.fetch_add(1, Ordering::SeqCst);
            });
        }

        let mut printer = Printer::new(&XfsConfig::instant().with_paper_level(1));
        printer.initialize(bus);

        print(&printer).await.unwrap();
        assert_eq!(printer.paper_level(), 0);
        assert_eq!(paper_out.load(Ordering::SeqCst), 1);

        let result = print(&printer).await;
        assert!(matches!(result, Err(XfsError::Hardware { .. })));
        assert_eq!(printer.paper_level(), 0);
        assert_eq!(paper_out.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_keeps_paper() {
        let printer = Printer::new(&XfsConfig::instant());
        let result = printer
            .execute(
                HANDLE,
                WFS_CMD_PTR_PRINT_FORM,
                Payload::Empty,
                Some(Duration::from_millis(1)),
            )
            .await;
        assert!(matches!(result, Err(XfsError::Timeout { .. })));
        assert_eq!(printer.paper_level(), 100);
    }

    #[tokio::test]
    async fn test_reset_and_status() {
        let printer = Printer::new(&XfsConfig::instant());
        printer
            .execute(HANDLE, WFS_CMD_PTR_RESET, Payload::Empty, None)
            .await
            .unwrap();

        assert_eq!(
            printer.get_info(WFS_INF_PTR_STATUS).await.unwrap(),
            InfoReply::PrinterStatus(PrinterStatus {
                device_state: DeviceState::Online,
                paper_level: 100,
                toner_level: 80,
            })
        );
    }

    #[tokio::test]
    async fn test_amount_payload_rejected() {
        let printer = Printer::new(&XfsConfig::instant());
        let result = printer
            .execute(HANDLE, WFS_CMD_PTR_PRINT_FORM, Payload::Amount(5), None)
            .await;
        assert!(matches!(result, Err(XfsError::InvalidPayload { .. })));
    }
}
