//! The application side of the demo terminal.
//!
//! [`Terminal`] owns the open service handles, the current NDC screen, the
//! session data and the host connection, and walks one customer session
//! through them.

use std::time::Duration;

use anyhow::{Context, bail};
use clap::ValueEnum;
use tracing::{debug, info, warn};

use cashpoint_core::CardNumber;
use cashpoint_core::constants::{
    LOGICAL_NAME_CARD_READER, LOGICAL_NAME_CASH_DISPENSER, LOGICAL_NAME_PIN_PAD,
    LOGICAL_NAME_RECEIPT_PRINTER, SESSION_AMOUNT, SESSION_BALANCE, SESSION_CARD_NUMBER,
    SESSION_TRANSACTION_TYPE, WFS_CMD_CDM_DISPENSE, WFS_CMD_CDM_PRESENT, WFS_CMD_IDC_EJECT_CARD,
    WFS_CMD_IDC_READ_RAW_DATA, WFS_CMD_IDC_RETAIN_CARD, WFS_CMD_PIN_GET_PIN,
    WFS_CMD_PIN_GET_PINBLOCK, WFS_CMD_PTR_PRINT_FORM, WFS_INF_IDC_STATUS,
};
use cashpoint_emulator::{
    Authorizer, Decline, MemorySessionStore, SessionStore, StateCode, StateMachine,
};
use cashpoint_hardware::{Completion, InfoReply, NoteMix, Payload, ServiceHandle, XfsManager};

/// Upper bound for any single device command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub const ATM_ID: &str = "ATM001";

/// Transaction chosen on the menu screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransactionKind {
    Withdrawal,
    Balance,
}

impl TransactionKind {
    fn label(self) -> &'static str {
        match self {
            Self::Withdrawal => "Withdrawal",
            Self::Balance => "Balance",
        }
    }
}

pub struct Terminal<'a> {
    manager: &'a XfsManager,
    host: Authorizer,
    pub screens: StateMachine,
    pub session: MemorySessionStore,
    card_reader: ServiceHandle,
    pub dispenser: ServiceHandle,
    pin_pad: ServiceHandle,
    printer: ServiceHandle,
}

impl<'a> Terminal<'a> {
    pub fn open(manager: &'a XfsManager, host: Authorizer) -> anyhow::Result<Self> {
        Ok(Self {
            manager,
            host,
            screens: StateMachine::new(),
            session: MemorySessionStore::new(),
            card_reader: manager.open(LOGICAL_NAME_CARD_READER)?,
            dispenser: manager.open(LOGICAL_NAME_CASH_DISPENSER)?,
            pin_pad: manager.open(LOGICAL_NAME_PIN_PAD)?,
            printer: manager.open(LOGICAL_NAME_RECEIPT_PRINTER)?,
        })
    }

    fn show(&mut self, screen: StateCode) -> anyhow::Result<()> {
        self.screens.transition_to(screen)?;
        info!(screen = screen.code(), name = %screen, "Screen");
        Ok(())
    }

    async fn execute(
        &self,
        handle: ServiceHandle,
        command: u32,
        payload: Payload,
    ) -> anyhow::Result<Completion> {
        let completion = self
            .manager
            .execute(handle, command, payload, Some(COMMAND_TIMEOUT))
            .await
            .with_context(|| format!("Command {command} on service {handle} failed"))?;
        Ok(completion)
    }

    /// Run one customer session. Returns the dispensed notes for a
    /// withdrawal and `None` for a balance inquiry.
    ///
    /// On error the terminal is left on the screen where the session
    /// failed; call [`Terminal::abort`] to wind it down.
    pub async fn serve(
        &mut self,
        kind: TransactionKind,
        amount: u32,
        pin: Option<String>,
    ) -> anyhow::Result<Option<NoteMix>> {
        self.show(StateCode::CardRead)?;
        let Completion::TrackData(track) = self
            .execute(self.card_reader, WFS_CMD_IDC_READ_RAW_DATA, Payload::Empty)
            .await?
        else {
            bail!("Card reader returned no track data");
        };
        let card = CardNumber::from_track2(&track)?;
        self.session.set_data(SESSION_CARD_NUMBER, &card.masked());
        info!(card = %card, "Card accepted");

        self.show(StateCode::PinEntry)?;
        self.enter_pin(pin).await?;

        self.show(StateCode::Menu)?;
        self.session
            .set_data(SESSION_TRANSACTION_TYPE, kind.label());

        let mix = match kind {
            TransactionKind::Withdrawal => Some(self.withdraw(amount).await?),
            TransactionKind::Balance => {
                let balance = self.host.balance_inquiry()?;
                self.session.set_data(SESSION_BALANCE, &balance.to_string());
                self.show(StateCode::DisplayBalance)?;
                None
            }
        };

        self.show(StateCode::Complete)?;
        self.print_receipt(&card, kind, amount).await;
        self.execute(self.card_reader, WFS_CMD_IDC_EJECT_CARD, Payload::Empty)
            .await?;

        self.show(StateCode::Idle)?;
        self.host.end_session();
        Ok(mix)
    }

    /// Capture PIN blocks until the host accepts one, retaining the card
    /// when the attempts run out.
    async fn enter_pin(&mut self, pin: Option<String>) -> anyhow::Result<()> {
        loop {
            let payload = pin.clone().map_or(Payload::Empty, Payload::Text);
            self.execute(self.pin_pad, WFS_CMD_PIN_GET_PIN, payload)
                .await?;
            let Completion::PinBlock(block) = self
                .execute(self.pin_pad, WFS_CMD_PIN_GET_PINBLOCK, Payload::Empty)
                .await?
            else {
                bail!("PIN pad returned no PIN block");
            };
            debug!(length = block.len(), "PIN block ready");

            match self.host.verify_pin_block(&block) {
                Ok(()) => return Ok(()),
                Err(Decline::InvalidPin { remaining }) => {
                    warn!(remaining, "PIN rejected, asking again");
                }
                Err(decline) => {
                    if decline.retains_card() {
                        self.execute(self.card_reader, WFS_CMD_IDC_RETAIN_CARD, Payload::Empty)
                            .await?;
                        warn!("Card retained");
                    }
                    return Err(decline.into());
                }
            }
        }
    }

    /// Amount entry through presenting the notes. The host check and the
    /// dispense both happen on the Authorization screen so a refusal can
    /// still move to Error.
    async fn withdraw(&mut self, amount: u32) -> anyhow::Result<NoteMix> {
        self.show(StateCode::AmountEntry)?;
        self.session.set_data(SESSION_AMOUNT, &amount.to_string());

        self.show(StateCode::Authorization)?;
        self.host.authorize_withdrawal(amount)?;
        info!(amount, "Withdrawal authorized");

        let Completion::NoteMix(mix) = self
            .execute(self.dispenser, WFS_CMD_CDM_DISPENSE, Payload::Amount(amount))
            .await?
        else {
            bail!("Dispenser returned no note mix");
        };
        self.execute(self.dispenser, WFS_CMD_CDM_PRESENT, Payload::Empty)
            .await?;

        let balance = self.host.debit(amount)?;
        self.session.set_data(SESSION_BALANCE, &balance.to_string());

        self.show(StateCode::Dispense)?;
        Ok(mix)
    }

    async fn print_receipt(&self, card: &CardNumber, kind: TransactionKind, amount: u32) {
        let mut receipt = format!("{ATM_ID}\nCARD {}\n{}", card.masked(), kind.label());
        if kind == TransactionKind::Withdrawal {
            receipt.push_str(&format!(" {amount}"));
        }
        if let Some(balance) = self.session.get_data(SESSION_BALANCE) {
            receipt.push_str(&format!("\nBALANCE {balance}"));
        }

        if let Err(e) = self
            .execute(self.printer, WFS_CMD_PTR_PRINT_FORM, Payload::Text(receipt))
            .await
        {
            warn!(error = %e, "Receipt not printed");
        }
    }

    /// Wind down a failed session: show the error screen when the current
    /// screen allows it, return to Idle and hand back a card still in the
    /// reader.
    ///
    /// # Errors
    ///
    /// Returns the rejected transition if the failed screen has no legal
    /// way back to Idle.
    pub async fn abort(&mut self) -> anyhow::Result<()> {
        self.host.end_session();

        if self.screens.current_state().can_transition_to(&StateCode::Error) {
            self.show(StateCode::Error)?;
        }
        if *self.screens.current_state() != StateCode::Idle {
            self.show(StateCode::Idle)?;
        }

        let card_present = matches!(
            self.manager.get_info(self.card_reader, WFS_INF_IDC_STATUS).await,
            Ok(InfoReply::CardReaderStatus(status)) if status.media_present
        );
        if card_present {
            self.execute(self.card_reader, WFS_CMD_IDC_EJECT_CARD, Payload::Empty)
                .await
                .context("Card could not be returned")?;
        }
        Ok(())
    }

    pub fn close(self) -> anyhow::Result<()> {
        for handle in [self.card_reader, self.dispenser, self.pin_pad, self.printer] {
            self.manager.close(handle)?;
        }
        Ok(())
    }
}
