//! Device wide force feedback state and gain configuration
use crate::effect::EffectType;
use crate::report::PidStateReport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceState {
    pub actuators_enabled: bool,
    pub paused: bool,
    /// 0..255, applied on top of every effect
    pub gain: u8,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            actuators_enabled: true,
            paused: false,
            gain: 0xFF,
        }
    }
}

impl DeviceState {
    /// Whether forces should reach the actuators at all
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.actuators_enabled && !self.paused
    }

    /// Status byte of the PID State report
    #[must_use]
    pub fn status(&self) -> u8 {
        let mut status = PidStateReport::ACTUATOR_POWER;
        if self.paused {
            status |= PidStateReport::DEVICE_PAUSED;
        }
        if self.actuators_enabled {
            status |= PidStateReport::ACTUATORS_ENABLED;
        }
        status
    }
}

/// Firmware side gain trims, 0..255 each
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gains {
    pub total: u8,
    pub constant: u8,
    pub ramp: u8,
    pub square: u8,
    pub sine: u8,
    pub triangle: u8,
    pub sawtooth_down: u8,
    pub sawtooth_up: u8,
    pub spring: u8,
    pub damper: u8,
    pub inertia: u8,
    pub friction: u8,
    pub custom: u8,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            total: 0xFF,
            constant: 0xFF,
            ramp: 0xFF,
            square: 0xFF,
            sine: 0xFF,
            triangle: 0xFF,
            sawtooth_down: 0xFF,
            sawtooth_up: 0xFF,
            spring: 0xFF,
            damper: 0xFF,
            inertia: 0xFF,
            friction: 0xFF,
            custom: 0xFF,
        }
    }
}

impl Gains {
    #[must_use]
    pub fn for_type(&self, effect_type: EffectType) -> u8 {
        match effect_type {
            EffectType::Constant => self.constant,
            EffectType::Ramp => self.ramp,
            EffectType::Square => self.square,
            EffectType::Sine => self.sine,
            EffectType::Triangle => self.triangle,
            EffectType::SawtoothDown => self.sawtooth_down,
            EffectType::SawtoothUp => self.sawtooth_up,
            EffectType::Spring => self.spring,
            EffectType::Damper => self.damper,
            EffectType::Inertia => self.inertia,
            EffectType::Friction => self.friction,
            EffectType::Custom => self.custom,
        }
    }
}
