use super::*;
use crate::config::Capabilities;
use crate::hid::testing::RecordingSink;
use crate::session::Phase;
use crate::storage::{MemoryMedium, MemoryStorage, StorageError, VAULT_FILE};
use crate::time::ManualClock;
use crate::transport::{LinkKind, MemoryChannel};
use crate::ui::testing::RecordingIndicator;
use crate::ui::{BUTTON_COUNT, CONTROL_BUTTON};
use alloc::{rc::Rc, string::String, vec::Vec};
use core::cell::RefCell;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use shared::schema::{DeviceResponse, ErrorCode, decode_device_response};

const TICK: u64 = 10;
/// Pause before each press so consecutive presses clear the debounce window.
const DEBOUNCE_GAP: u64 = 60;

struct Buttons {
    levels: ButtonLevels,
}

impl ButtonBank for Buttons {
    fn sample(&mut self) -> Result<ButtonLevels, HardwareFault> {
        Ok(self.levels)
    }
}

struct DeadChannel;

impl HostChannel for DeadChannel {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, HardwareFault> {
        Err(HardwareFault::new("usb"))
    }

    fn write_all(&mut self, _bytes: &[u8]) -> Result<(), HardwareFault> {
        Err(HardwareFault::new("usb"))
    }
}

struct Rig {
    device: Device<MemoryStorage, RecordingIndicator>,
    clock: ManualClock,
    channel: MemoryChannel,
    buttons: Buttons,
    indicator: RecordingIndicator,
    typed: Rc<RefCell<Vec<String>>>,
}

impl Rig {
    fn new() -> Self {
        Self::with_storage(MemoryStorage::in_memory())
    }

    fn with_storage(storage: MemoryStorage) -> Self {
        let config = DeviceConfig::default();
        let mut outputs = OutputFanout::new();
        let (usb, typed) = RecordingSink::new(LinkKind::Usb);
        outputs.attach(&Capabilities::default(), Box::new(usb));
        let indicator = RecordingIndicator::default();
        let device = Device::boot(
            config,
            BoardIdentity::new("E6614103E7452D2F", "raspberry_pi_pico"),
            Some(Box::new(ChaCha20Rng::from_seed([3u8; 32]))),
            storage,
            outputs,
            indicator.clone(),
        );
        Self {
            device,
            clock: ManualClock::new(1_000),
            channel: MemoryChannel::new(),
            buttons: Buttons {
                levels: [false; BUTTON_COUNT],
            },
            indicator,
            typed,
        }
    }

    fn tick(&mut self) {
        self.device
            .tick(&self.clock, &mut self.channel, &mut self.buttons);
        self.clock.advance(TICK);
    }

    fn request(&mut self, line: &str) -> DeviceResponse {
        self.channel.feed(line.as_bytes());
        self.channel.feed(b"\n");
        self.tick();
        let output = self.channel.take_output();
        decode_device_response(&output).expect("one response line")
    }

    fn press(&mut self, index: usize, hold_ms: u64) {
        self.clock.advance(DEBOUNCE_GAP);
        self.buttons.levels[index] = true;
        self.tick();
        self.clock.advance(hold_ms.saturating_sub(TICK));
        self.buttons.levels[index] = false;
        self.tick();
    }

    fn typed(&self) -> Vec<String> {
        self.typed.borrow().clone()
    }
}

#[test]
fn host_typed_secret_reaches_output() {
    let mut rig = Rig::new();
    assert!(rig.request(r#"{"type":"UNLOCK","password":"abc123"}"#).is_ok());
    assert!(
        rig.request(r#"{"type":"ADD_PASSWORD","slot":0,"password":"hunter2"}"#)
            .is_ok()
    );

    assert!(rig.request(r#"{"type":"TYPE_PASSWORD","slot":0}"#).is_ok());

    assert_eq!(rig.typed(), ["hunter2"]);
    assert!(rig.indicator.saw(StatusSignal::Unlocked));
    assert!(rig.indicator.saw(StatusSignal::Typing));
    assert_eq!(rig.indicator.last(), Some(StatusSignal::Delivered));
    assert!(!rig.device.session().has_pending());
}

#[test]
fn slot_button_types_only_while_unlocked() {
    let mut rig = Rig::new();
    rig.request(r#"{"type":"UNLOCK","password":"abc123"}"#);
    rig.request(r#"{"type":"ADD_PASSWORD","slot":1,"password":"s3cret"}"#);

    rig.press(2, 120);
    assert_eq!(rig.typed(), ["s3cret"]);

    rig.request(r#"{"type":"LOCK"}"#);
    let signals_before = rig.indicator.signals.borrow().len();
    rig.press(2, 120);

    assert_eq!(rig.typed().len(), 1);
    assert_eq!(rig.indicator.signals.borrow().len(), signals_before + 1);
    assert_eq!(
        rig.indicator.last(),
        Some(StatusSignal::Error(ErrorCode::StateError))
    );
    assert_eq!(rig.device.session().phase(), Phase::Locked);
}

#[test]
fn control_long_press_locks_or_asks_for_passphrase() {
    let mut rig = Rig::new();
    rig.request(r#"{"type":"UNLOCK","password":"abc123"}"#);

    rig.press(CONTROL_BUTTON, 1_200);
    assert_eq!(rig.device.session().phase(), Phase::Locked);
    assert_eq!(rig.indicator.last(), Some(StatusSignal::Locked));

    rig.press(CONTROL_BUTTON, 1_200);
    assert_eq!(rig.indicator.last(), Some(StatusSignal::AwaitingPassphrase));
    assert_eq!(rig.device.session().phase(), Phase::Locked);

    rig.press(CONTROL_BUTTON, 200);
    assert_eq!(rig.indicator.last(), Some(StatusSignal::Pulse));
}

#[test]
fn empty_slot_press_shows_error_without_state_change() {
    let mut rig = Rig::new();
    rig.request(r#"{"type":"UNLOCK","password":"abc123"}"#);

    rig.press(4, 100);

    assert_eq!(
        rig.indicator.last(),
        Some(StatusSignal::Error(ErrorCode::SlotError))
    );
    assert!(rig.device.session().is_unlocked());
    assert!(rig.typed().is_empty());
}

#[test]
fn idle_session_locks_after_timeout() {
    let mut rig = Rig::new();
    rig.request(r#"{"type":"UNLOCK","password":"abc123"}"#);
    let unlocked_at = rig.device.session().last_activity_ms();

    rig.clock.advance(unlocked_at + 120_000 - rig.clock.now_ms());
    rig.tick();
    assert!(rig.device.session().is_unlocked());

    rig.tick();
    assert_eq!(rig.device.session().phase(), Phase::Locked);
    assert_eq!(rig.indicator.last(), Some(StatusSignal::Locked));
}

#[test]
fn button_activity_postpones_auto_lock() {
    let mut rig = Rig::new();
    rig.request(r#"{"type":"UNLOCK","password":"abc123"}"#);

    rig.clock.advance(100_000);
    rig.press(CONTROL_BUTTON, 100);
    rig.clock.advance(100_000);
    rig.tick();

    assert!(rig.device.session().is_unlocked());
}

#[test]
fn one_request_is_answered_per_tick() {
    let mut rig = Rig::new();
    rig.channel
        .feed(b"{\"type\":\"PING\"}\n{\"type\":\"STATUS\"}\n");

    rig.tick();
    let first = rig.channel.take_output();
    rig.tick();
    let second = rig.channel.take_output();

    assert_eq!(first.iter().filter(|byte| **byte == b'\n').count(), 1);
    let status = decode_device_response(&second).expect("status");
    assert_eq!(status.timeout, Some(120));
}

#[test]
fn stored_vault_survives_reboot() {
    let mut rig = Rig::new();
    rig.request(r#"{"type":"UNLOCK","password":"abc123"}"#);
    rig.request(r#"{"type":"ADD_PASSWORD","slot":2,"password":"persisted"}"#);
    rig.request(r#"{"type":"SET_TIMEOUT","timeout":300}"#);
    let medium = rig.device.storage().medium().clone();

    let mut rebooted = Rig::with_storage(MemoryStorage::new(medium));

    assert_eq!(rebooted.device.session().phase(), Phase::Locked);
    let status = rebooted.request(r#"{"type":"STATUS"}"#);
    assert_eq!(status.slots, Some(alloc::vec![false, false, true, false]));
    assert_eq!(status.timeout, Some(300));
    assert!(
        rebooted
            .request(r#"{"type":"UNLOCK","password":"abc123"}"#)
            .is_ok()
    );
    rebooted.request(r#"{"type":"TYPE_PASSWORD","slot":2}"#);
    assert_eq!(rebooted.typed(), ["persisted"]);
}

fn owner_medium() -> MemoryMedium {
    let mut rig = Rig::new();
    rig.request(r#"{"type":"UNLOCK","password":"owner"}"#);
    rig.request(r#"{"type":"ADD_PASSWORD","slot":0,"password":"owner-secret"}"#);
    rig.device.storage().medium().clone()
}

#[test]
fn unreadable_vault_is_never_replaced_by_a_fresh_one() {
    let mut medium = owner_medium();
    let stored = medium.document(VAULT_FILE).map(String::from);
    medium.fail_reads = true;

    let mut rig = Rig::with_storage(MemoryStorage::new(medium));
    assert_eq!(
        rig.device.session().load_error(),
        Some(StorageError::IoFailure)
    );

    let stranger = rig.request(r#"{"type":"UNLOCK","password":"stranger"}"#);
    assert_eq!(stranger.code, Some(ErrorCode::StorageError));
    let timeout = rig.request(r#"{"type":"SET_TIMEOUT","timeout":300}"#);
    assert_eq!(timeout.code, Some(ErrorCode::StorageError));
    assert_eq!(rig.device.session().phase(), Phase::Locked);
    assert_eq!(
        rig.device.storage().medium().document(VAULT_FILE).map(String::from),
        stored
    );
}

#[test]
fn vault_is_reloaded_once_reads_recover() {
    let mut medium = owner_medium();
    medium.fail_reads = true;
    let mut rig = Rig::with_storage(MemoryStorage::new(medium));

    rig.device.storage_mut().medium_mut().fail_reads = false;
    let stranger = rig.request(r#"{"type":"UNLOCK","password":"stranger"}"#);
    assert_eq!(stranger.code, Some(ErrorCode::AuthError));

    assert!(rig.request(r#"{"type":"UNLOCK","password":"owner"}"#).is_ok());
    rig.request(r#"{"type":"TYPE_PASSWORD","slot":0}"#);
    assert_eq!(rig.typed(), ["owner-secret"]);
}

#[test]
fn corrupt_vault_requires_reset_before_setup() {
    let mut storage = MemoryStorage::in_memory();
    storage.medium_mut().insert(VAULT_FILE, "{{{{ not json");

    let mut rig = Rig::with_storage(storage);

    assert!(!rig.device.session().is_bootstrapped());
    let refused = rig.request(r#"{"type":"UNLOCK","password":"fresh"}"#);
    assert_eq!(refused.code, Some(ErrorCode::StorageError));
    assert_eq!(
        rig.device.storage().medium().document(VAULT_FILE),
        Some("{{{{ not json")
    );

    assert!(rig.request(r#"{"type":"RESET"}"#).is_ok());
    assert!(
        rig.request(r#"{"type":"UNLOCK","password":"fresh"}"#)
            .is_ok()
    );
}

#[test]
fn channel_fault_is_terminal() {
    let mut rig = Rig::new();
    rig.request(r#"{"type":"UNLOCK","password":"abc123"}"#);

    rig.device
        .tick(&rig.clock, &mut DeadChannel, &mut rig.buttons);

    assert_eq!(
        rig.device.fault(),
        Some(FaultCause::Hardware(HardwareFault::new("usb")))
    );
    assert_eq!(rig.device.session().phase(), Phase::Locked);
    assert!(!rig.device.session().invariant_breached());

    rig.channel.take_output();
    rig.channel.feed(b"{\"type\":\"PING\"}\n");
    rig.tick();
    rig.tick();
    assert!(rig.channel.take_output().is_empty());
    assert_eq!(rig.indicator.last(), Some(StatusSignal::Fault));
    assert!(rig.device.is_faulted());
}

#[test]
fn rejected_line_gets_error_response() {
    let mut rig = Rig::new();

    let response = rig.request("not json at all");

    assert_eq!(response.code, Some(ErrorCode::ProtocolError));
}
