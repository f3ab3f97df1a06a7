use std::cell::Cell;

use keyboard_query::{DeviceQuery, DeviceState};

use soc_control::bsp::pin::Pin;

pub struct KeyboardPin {
    device_state: DeviceState,
    key_code: u16,
}

impl KeyboardPin {
    /// Factory function to create a [KeyboardPin]
    pub fn create(key_code: u16) -> KeyboardPin {
        let device_state = DeviceState::new();
        KeyboardPin {
            device_state,
            key_code,
        }
    }
}

impl Pin for KeyboardPin {
    /// returns true is pin is tied to the ground
    fn is_down(&self) -> bool {
        let keys = &self.device_state.get_keys();
        keys.contains(&self.key_code)
    }
}

/// Key of the simulator itself, reacts once per press
pub struct KeyboardKey {
    pin: KeyboardPin,
    was_down: Cell<bool>,
}

impl KeyboardKey {
    pub fn create(key_code: u16) -> KeyboardKey {
        KeyboardKey {
            pin: KeyboardPin::create(key_code),
            was_down: Cell::new(false),
        }
    }

    pub fn pressed(&self) -> bool {
        let down = self.pin.is_down();
        let was_down = self.was_down.replace(down);
        down && !was_down
    }
}

pub struct Keys {
    pub esc: KeyboardPin,
    pub recalibrate: KeyboardPin,
    pub more_load: KeyboardKey,
    pub less_load: KeyboardKey,
    pub no_load: KeyboardKey,
    pub probe: KeyboardKey,
}

/// evdev key codes
#[cfg(target_os = "linux")]
pub fn keys() -> Keys {
    Keys {
        esc: KeyboardPin::create(1),
        recalibrate: KeyboardPin::create(46),
        more_load: KeyboardKey::create(103),
        less_load: KeyboardKey::create(108),
        no_load: KeyboardKey::create(11),
        probe: KeyboardKey::create(20),
    }
}

/// virtual key codes
#[cfg(not(target_os = "linux"))]
pub fn keys() -> Keys {
    Keys {
        esc: KeyboardPin::create(27),
        recalibrate: KeyboardPin::create(67),
        more_load: KeyboardKey::create(38),
        less_load: KeyboardKey::create(40),
        no_load: KeyboardKey::create(48),
        probe: KeyboardKey::create(84),
    }
}
