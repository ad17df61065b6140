//! Device context and the cooperative control loop.
//!
//! [`Device`] owns every piece of mutable state. One [`Device::tick`] services the host channel,
//! scans the buttons, delivers a pending secret and checks the idle timer, in that order.
use alloc::boxed::Box;

use shared::license::BoardIdentity;

use crate::config::DeviceConfig;
use crate::crypto::{CredentialVault, EntropySource};
use crate::error::{DeviceError, HardwareFault, StateError};
use crate::hid::OutputFanout;
use crate::license::LicenseGate;
use crate::session::{LockReason, SessionStateMachine};
use crate::storage::Storage;
use crate::sync::{CommandContext, Inbound, ProtocolDispatcher, handle_request, response_line};
use crate::time::Clock;
use crate::transport::HostChannel;
use crate::ui::{
    ButtonBank, ButtonIntent, ButtonLevels, InputDecoder, StatusIndicator, StatusSignal,
    intent_for,
};

/// Shortest pause between two ticks.
const MIN_SLEEP_MS: u64 = 1;

/// Why normal operation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCause {
    Hardware(HardwareFault),
    /// The derived key and the session phase disagreed.
    InvariantBreach,
}

pub struct Device<S, I> {
    config: DeviceConfig,
    license: LicenseGate,
    session: SessionStateMachine,
    decoder: InputDecoder,
    dispatcher: ProtocolDispatcher,
    storage: S,
    outputs: OutputFanout,
    indicator: I,
    fault: Option<FaultCause>,
}

impl<S, I> Device<S, I>
where
    S: Storage,
    I: StatusIndicator,
{
    /// Build the device from its collaborators and load persisted state.
    ///
    /// An absent or unreadable vault boots as a fresh, never-configured token.
    pub fn boot(
        config: DeviceConfig,
        identity: BoardIdentity,
        entropy: Option<Box<dyn EntropySource>>,
        mut storage: S,
        outputs: OutputFanout,
        mut indicator: I,
    ) -> Self {
        log::info!(
            "booting firmware {} on {} ({})",
            config.version,
            identity.id,
            identity.board_type
        );

        let vault = CredentialVault::new(identity.id.clone(), entropy);
        let mut session = SessionStateMachine::new(vault, config.default_timeout_secs);
        match storage.load() {
            Ok(Some(blob)) => session.restore(blob),
            Ok(None) => log::info!("no stored vault, starting unconfigured"),
            Err(err) => {
                log::error!("vault not loaded ({err}), refusing setup until it loads or RESET");
                session.mark_unreadable(err);
            }
        }

        let mut license = LicenseGate::new(identity);
        let status = license.status(&mut storage);
        log::info!("license {status:?}");

        if outputs.is_empty() {
            log::warn!("no keystroke output configured");
        }
        indicator.show(StatusSignal::Locked);

        Self {
            decoder: InputDecoder::from_config(&config),
            config,
            license,
            session,
            dispatcher: ProtocolDispatcher::new(),
            storage,
            outputs,
            indicator,
            fault: None,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStateMachine {
        &self.session
    }

    pub fn license(&self) -> &LicenseGate {
        &self.license
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn fault(&self) -> Option<FaultCause> {
        self.fault
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Run one iteration of the control loop.
    pub fn tick<K, C, B>(&mut self, clock: &K, channel: &mut C, buttons: &mut B)
    where
        K: Clock + ?Sized,
        C: HostChannel + ?Sized,
        B: ButtonBank + ?Sized,
    {
        if self.fault.is_some() {
            self.indicator.show(StatusSignal::Fault);
            return;
        }

        if let Err(fault) = self.run_steps(clock, channel, buttons) {
            self.enter_fault(FaultCause::Hardware(fault));
            return;
        }

        if self.session.invariant_breached() {
            self.enter_fault(FaultCause::InvariantBreach);
        }
    }

    fn run_steps<K, C, B>(&mut self, clock: &K, channel: &mut C, buttons: &mut B) -> Result<(), HardwareFault>
    where
        K: Clock + ?Sized,
        C: HostChannel + ?Sized,
        B: ButtonBank + ?Sized,
    {
        self.service_host(clock.now_ms(), channel)?;

        let levels = buttons.sample()?;
        self.service_buttons(&levels, clock.now_ms());

        self.deliver_pending(clock, buttons)?;

        if self.session.check_idle(clock.now_ms()) {
            self.indicator.show(StatusSignal::Locked);
        }
        Ok(())
    }

    fn service_host<C>(&mut self, now_ms: u64, channel: &mut C) -> Result<(), HardwareFault>
    where
        C: HostChannel + ?Sized,
    {
        let Some(inbound) = self.dispatcher.poll(channel)? else {
            return Ok(());
        };

        let response = match inbound {
            Inbound::Request(request) => {
                log::debug!("host request {}", request.name());
                let was_unlocked = self.session.is_unlocked();
                self.session.touch(now_ms);
                let response = handle_request(
                    request,
                    now_ms,
                    CommandContext {
                        config: &self.config,
                        license: &mut self.license,
                        session: &mut self.session,
                        storage: &mut self.storage,
                    },
                );
                self.signal_phase_change(was_unlocked);
                response
            }
            Inbound::Rejected { error, detail } => Inbound::rejection(error, &detail),
        };

        if let Some(line) = response_line(&response) {
            channel.write_all(&line)?;
        }
        Ok(())
    }

    fn service_buttons(&mut self, levels: &ButtonLevels, now_ms: u64) {
        let Some(event) = self.decoder.scan(levels, now_ms) else {
            return;
        };
        let Some(intent) = intent_for(&event, self.session.phase()) else {
            let err = DeviceError::from(StateError::LockedOperationDenied);
            log::debug!("button {} ignored: {err}", event.index);
            self.indicator.show(StatusSignal::Error(err.code()));
            return;
        };

        self.session.touch(now_ms);
        match intent {
            ButtonIntent::Lock => {
                if self.session.lock(LockReason::LongPress) {
                    self.indicator.show(StatusSignal::Locked);
                }
            }
            ButtonIntent::AwaitPassphrase => self.indicator.show(StatusSignal::AwaitingPassphrase),
            ButtonIntent::StatusPulse => self.indicator.show(StatusSignal::Pulse),
            ButtonIntent::TypeRequest(slot) => {
                if let Err(err) = self.session.queue_secret(slot as i64) {
                    log::warn!("slot {slot} not typed: {err}");
                    self.indicator.show(StatusSignal::Error(err.code()));
                }
            }
        }
    }

    fn deliver_pending<K, B>(&mut self, clock: &K, buttons: &mut B) -> Result<(), HardwareFault>
    where
        K: Clock + ?Sized,
        B: ButtonBank + ?Sized,
    {
        let Some(secret) = self.session.begin_emission() else {
            return Ok(());
        };

        self.indicator.show(StatusSignal::Typing);
        let report = self.outputs.deliver(&secret);
        drop(secret);
        log::info!(
            "secret delivered to {}/{} outputs",
            report.delivered,
            report.attempted
        );
        if report.any_delivered() {
            self.indicator.show(StatusSignal::Delivered);
        }

        if self.session.finish_emission().is_some() {
            self.indicator.show(StatusSignal::Locked);
        }

        self.decoder.wait_for_release(
            buttons,
            clock,
            self.config.tick_ms,
            self.config.release_wait_ms,
        )?;
        Ok(())
    }

    fn signal_phase_change(&mut self, was_unlocked: bool) {
        match (was_unlocked, self.session.is_unlocked()) {
            (false, true) => self.indicator.show(StatusSignal::Unlocked),
            (true, false) => self.indicator.show(StatusSignal::Locked),
            _ => {}
        }
    }

    fn enter_fault(&mut self, cause: FaultCause) {
        self.session.wipe_volatile();
        log::error!("entering fault state: {cause:?}");
        self.fault = Some(cause);
        self.indicator.show(StatusSignal::Fault);
    }
}

/// Drive `device` forever with a fixed minimum pause between ticks.
pub fn run<S, I, K, C, B>(mut device: Device<S, I>, clock: &K, channel: &mut C, buttons: &mut B) -> !
where
    S: Storage,
    I: StatusIndicator,
    K: Clock + ?Sized,
    C: HostChannel + ?Sized,
    B: ButtonBank + ?Sized,
{
    loop {
        let started = clock.now_ms();
        device.tick(clock, channel, buttons);
        let elapsed = clock.now_ms().saturating_sub(started);
        clock.sleep_ms(device.config.tick_ms.saturating_sub(elapsed).max(MIN_SLEEP_MS));
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod device_tests;
