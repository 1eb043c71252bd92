use crate::hal::ButtonInput;

pub const DEFAULT_LONG_PRESS_MS: u64 = 1500;
/// Shorter presses are contact bounce.
const MIN_PRESS_MS: u64 = 5;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Released,
    Pressed,
    /// Released after a short press, reported once.
    PressedAndReleased,
    /// Held for at least the long press time, reported while held.
    LongPressed,
}

/// Turns the raw button level into press gestures, sampled once per loop.
pub struct Button<B: ButtonInput> {
    input: B,
    long_press_ms: u64,
    was_pressed: bool,
    pressed_at_ms: u64,
}

impl<B: ButtonInput> Button<B> {
    pub fn new(input: B) -> Self {
        Self::with_long_press(input, DEFAULT_LONG_PRESS_MS)
    }

    pub fn with_long_press(input: B, long_press_ms: u64) -> Self {
        Self {
            input,
            long_press_ms,
            was_pressed: false,
            pressed_at_ms: 0,
        }
    }

    pub fn state(&mut self, now_ms: u64) -> ButtonState {
        let pressed = self.input.is_pressed();
        let was_pressed = core::mem::replace(&mut self.was_pressed, pressed);

        match (was_pressed, pressed) {
            (false, false) => ButtonState::Released,
            (false, true) => {
                self.pressed_at_ms = now_ms;
                ButtonState::Pressed
            }
            (true, true) => {
                if now_ms.saturating_sub(self.pressed_at_ms) >= self.long_press_ms {
                    ButtonState::LongPressed
                } else {
                    ButtonState::Pressed
                }
            }
            (true, false) => {
                let held = now_ms.saturating_sub(self.pressed_at_ms);
                if held > MIN_PRESS_MS && held < self.long_press_ms {
                    ButtonState::PressedAndReleased
                } else {
                    ButtonState::Released
                }
            }
        }
    }
}
