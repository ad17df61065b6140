//! Debounced decoding of the physical buttons into press events and intents.
use shared::vault::SLOT_COUNT;

use crate::config::DeviceConfig;
use crate::error::HardwareFault;
use crate::session::Phase;
use crate::time::Clock;

/// Control button plus one button per slot.
pub const BUTTON_COUNT: usize = SLOT_COUNT + 1;
/// Index of the control button.
pub const CONTROL_BUTTON: usize = 0;

/// Snapshot of every button level, `true` meaning pressed.
pub type ButtonLevels = [bool; BUTTON_COUNT];

/// Source of raw button levels, already normalized for pull-up wiring.
pub trait ButtonBank {
    fn sample(&mut self) -> Result<ButtonLevels, HardwareFault>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressKind {
    Short,
    Long,
}

/// One completed press, reported at release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonEvent {
    pub index: usize,
    pub kind: PressKind,
    pub duration_ms: u64,
}

/// What a button event asks the device to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonIntent {
    /// Control long press while unlocked.
    Lock,
    /// Control long press while locked; the passphrase has to come from the host.
    AwaitPassphrase,
    /// Control short press; no state change.
    StatusPulse,
    /// Slot button while unlocked.
    TypeRequest(usize),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ButtonState {
    pressed: bool,
    last_transition_ms: Option<u64>,
    press_start_ms: u64,
    /// Release of the current press must not be reported.
    suppressed: bool,
}

#[derive(Clone, Debug)]
pub struct InputDecoder {
    buttons: [ButtonState; BUTTON_COUNT],
    debounce_ms: u64,
    long_press_ms: u64,
}

impl InputDecoder {
    pub fn new(debounce_ms: u64, long_press_ms: u64) -> Self {
        Self {
            buttons: [ButtonState::default(); BUTTON_COUNT],
            debounce_ms,
            long_press_ms,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.debounce_ms, config.long_press_ms)
    }

    /// Apply one sample of every button and report at most one completed press.
    ///
    /// When several buttons are released in the same tick the lowest index wins; the others keep
    /// their pressed state and are reported on a later scan.
    pub fn scan(&mut self, levels: &ButtonLevels, now_ms: u64) -> Option<ButtonEvent> {
        let mut reported = None;

        for (index, (state, &level)) in self.buttons.iter_mut().zip(levels.iter()).enumerate() {
            if level == state.pressed {
                continue;
            }
            if let Some(last) = state.last_transition_ms
                && now_ms.saturating_sub(last) < self.debounce_ms
            {
                continue;
            }

            if level {
                state.pressed = true;
                state.last_transition_ms = Some(now_ms);
                state.press_start_ms = now_ms;
                state.suppressed = false;
                continue;
            }

            if state.suppressed {
                state.pressed = false;
                state.last_transition_ms = Some(now_ms);
                state.suppressed = false;
                continue;
            }

            if reported.is_some() {
                continue;
            }

            state.pressed = false;
            state.last_transition_ms = Some(now_ms);
            let duration_ms = now_ms.saturating_sub(state.press_start_ms);
            let kind = if duration_ms >= self.long_press_ms {
                PressKind::Long
            } else {
                PressKind::Short
            };
            reported = Some(ButtonEvent {
                index,
                kind,
                duration_ms,
            });
        }

        reported
    }

    /// Wait, bounded by `limit_ms`, until every button reads released.
    ///
    /// Presses still in progress when this returns are suppressed so that keys held during an
    /// emission never turn into a second event. Returns `true` when all buttons were released.
    pub fn wait_for_release<B, C>(
        &mut self,
        bank: &mut B,
        clock: &C,
        poll_ms: u64,
        limit_ms: u64,
    ) -> Result<bool, HardwareFault>
    where
        B: ButtonBank + ?Sized,
        C: Clock + ?Sized,
    {
        let started = clock.now_ms();
        loop {
            let levels = bank.sample()?;
            let now = clock.now_ms();
            let all_released = levels.iter().all(|pressed| !pressed);

            if all_released || now.saturating_sub(started) >= limit_ms {
                for (state, &level) in self.buttons.iter_mut().zip(levels.iter()) {
                    if level {
                        if !state.pressed {
                            state.press_start_ms = now;
                        }
                        state.pressed = true;
                        state.suppressed = true;
                    } else {
                        state.pressed = false;
                        state.suppressed = false;
                    }
                    state.last_transition_ms = Some(now);
                }
                if !all_released {
                    log::warn!("buttons still held after {limit_ms} ms, suppressing");
                }
                return Ok(all_released);
            }

            clock.sleep_ms(poll_ms.max(1));
        }
    }
}

/// Map a press to the intent it stands for in the given phase.
pub fn intent_for(event: &ButtonEvent, phase: Phase) -> Option<ButtonIntent> {
    if event.index == CONTROL_BUTTON {
        return Some(match (event.kind, phase) {
            (PressKind::Long, Phase::Unlocked) => ButtonIntent::Lock,
            (PressKind::Long, Phase::Locked) => ButtonIntent::AwaitPassphrase,
            (PressKind::Short, _) => ButtonIntent::StatusPulse,
        });
    }
    if event.index >= BUTTON_COUNT {
        return None;
    }
    match phase {
        Phase::Unlocked => Some(ButtonIntent::TypeRequest(event.index - 1)),
        Phase::Locked => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use alloc::collections::VecDeque;

    fn decoder() -> InputDecoder {
        InputDecoder::new(50, 1_000)
    }

    fn levels(pressed: &[usize]) -> ButtonLevels {
        let mut levels = [false; BUTTON_COUNT];
        for &index in pressed {
            levels[index] = true;
        }
        levels
    }

    fn press_for(decoder: &mut InputDecoder, index: usize, start: u64, duration: u64) -> Option<ButtonEvent> {
        assert_eq!(decoder.scan(&levels(&[index]), start), None);
        decoder.scan(&levels(&[]), start + duration)
    }

    #[test]
    fn long_press_boundary() {
        let cases = [(999, PressKind::Short), (1_000, PressKind::Long), (1_001, PressKind::Long)];

        for (duration, expected) in cases {
            let mut decoder = decoder();
            let event = press_for(&mut decoder, 1, 100, duration).expect("event");
            assert_eq!(event.kind, expected, "duration {duration}");
            assert_eq!(event.duration_ms, duration);
        }
    }

    #[test]
    fn bounce_within_window_collapses_into_one_press() {
        let mut decoder = decoder();

        assert_eq!(decoder.scan(&levels(&[2]), 1_000), None);
        assert_eq!(decoder.scan(&levels(&[]), 1_020), None);
        assert_eq!(decoder.scan(&levels(&[2]), 1_030), None);
        let event = decoder.scan(&levels(&[]), 1_200).expect("one press");

        assert_eq!(event.index, 2);
        assert_eq!(event.duration_ms, 200);
        assert_eq!(decoder.scan(&levels(&[]), 1_400), None);
    }

    #[test]
    fn press_is_reported_once() {
        let mut decoder = decoder();

        assert!(press_for(&mut decoder, 3, 0, 120).is_some());
        assert_eq!(decoder.scan(&levels(&[]), 500), None);
        assert_eq!(decoder.scan(&levels(&[]), 900), None);
    }

    #[test]
    fn simultaneous_releases_are_reported_on_separate_ticks() {
        let mut decoder = decoder();
        assert_eq!(decoder.scan(&levels(&[1, 4]), 100), None);

        let first = decoder.scan(&levels(&[]), 300).expect("first");
        let second = decoder.scan(&levels(&[]), 310).expect("second");

        assert_eq!(first.index, 1);
        assert_eq!(second.index, 4);
        assert_eq!(second.duration_ms, 210);
    }

    #[test]
    fn intents_depend_on_phase() {
        let control_long = ButtonEvent {
            index: CONTROL_BUTTON,
            kind: PressKind::Long,
            duration_ms: 1_500,
        };
        let control_short = ButtonEvent {
            kind: PressKind::Short,
            duration_ms: 80,
            ..control_long
        };
        let slot = ButtonEvent {
            index: 2,
            kind: PressKind::Short,
            duration_ms: 80,
        };

        assert_eq!(intent_for(&control_long, Phase::Unlocked), Some(ButtonIntent::Lock));
        assert_eq!(
            intent_for(&control_long, Phase::Locked),
            Some(ButtonIntent::AwaitPassphrase)
        );
        assert_eq!(
            intent_for(&control_short, Phase::Locked),
            Some(ButtonIntent::StatusPulse)
        );
        assert_eq!(
            intent_for(&slot, Phase::Unlocked),
            Some(ButtonIntent::TypeRequest(1))
        );
        assert_eq!(intent_for(&slot, Phase::Locked), None);
    }

    struct ScriptedBank {
        samples: VecDeque<ButtonLevels>,
    }

    impl ButtonBank for ScriptedBank {
        fn sample(&mut self) -> Result<ButtonLevels, HardwareFault> {
            Ok(self.samples.pop_front().unwrap_or([false; BUTTON_COUNT]))
        }
    }

    #[test]
    fn release_wait_returns_once_buttons_are_up() {
        let mut decoder = decoder();
        let clock = ManualClock::new(0);
        let mut bank = ScriptedBank {
            samples: VecDeque::from([levels(&[2]), levels(&[2]), levels(&[])]),
        };

        let released = decoder
            .wait_for_release(&mut bank, &clock, 10, 5_000)
            .expect("sample");

        assert!(released);
        assert_eq!(clock.now_ms(), 20);
    }

    #[test]
    fn held_button_is_suppressed_after_release_wait_times_out() {
        let mut decoder = decoder();
        let clock = ManualClock::new(0);
        let mut bank = ScriptedBank {
            samples: core::iter::repeat_n(levels(&[3]), 20).collect(),
        };

        let released = decoder
            .wait_for_release(&mut bank, &clock, 10, 100)
            .expect("sample");
        assert!(!released);

        assert_eq!(decoder.scan(&levels(&[]), 400), None);
        assert!(press_for(&mut decoder, 3, 600, 100).is_some());
    }

    #[test]
    fn faulty_bank_propagates() {
        struct Broken;
        impl ButtonBank for Broken {
            fn sample(&mut self) -> Result<ButtonLevels, HardwareFault> {
                Err(HardwareFault::new("gpio"))
            }
        }

        let result = decoder().wait_for_release(&mut Broken, &ManualClock::new(0), 10, 100);

        assert_eq!(result, Err(HardwareFault::new("gpio")));
    }
}
