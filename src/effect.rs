//! Force feedback effect parameters and force synthesis
//!
//! All arithmetic is fixed point. Magnitude like values use the PID wire range (-255..255 for the usual host
//! drivers), times are milliseconds and direction/waveform ratios are Q15 (`Q15_ONE` == 1.0).
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::MillisInstant;

pub const MAX_FFB_AXIS_COUNT: usize = 2;

/// Duration value meaning "play until stopped"
pub const DURATION_INFINITE: u16 = 0xFFFF;

pub const X_AXIS_ENABLE: u8 = 0x01;
pub const Y_AXIS_ENABLE: u8 = 0x02;
pub const DIRECTION_ENABLE: u8 = 0x04;

pub const Q15_ONE: i32 = 32767;

/// Full turn in the angle unit used by [`sin_q15`]
const TURN: u32 = 1024;
const QUARTER_TURN: u32 = TURN / 4;

#[rustfmt::skip]
const QUARTER_SINE: [i32; 65] = [
    0, 804, 1608, 2410, 3212, 4011, 4808, 5602,
    6393, 7179, 7962, 8739, 9512, 10278, 11039, 11793,
    12539, 13279, 14010, 14732, 15446, 16151, 16846, 17530,
    18204, 18868, 19519, 20159, 20787, 21403, 22005, 22594,
    23170, 23731, 24279, 24811, 25329, 25832, 26319, 26790,
    27245, 27683, 28105, 28510, 28898, 29268, 29621, 29956,
    30273, 30571, 30852, 31113, 31356, 31580, 31785, 31971,
    32137, 32285, 32412, 32521, 32609, 32678, 32728, 32757,
    32767,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum EffectType {
    Constant = 0x01,
    Ramp = 0x02,
    Square = 0x03,
    Sine = 0x04,
    Triangle = 0x05,
    SawtoothDown = 0x06,
    SawtoothUp = 0x07,
    Spring = 0x08,
    Damper = 0x09,
    Inertia = 0x0A,
    Friction = 0x0B,
    Custom = 0x0C,
}

impl EffectType {
    #[must_use]
    pub fn is_periodic(self) -> bool {
        matches!(
            self,
            Self::Square | Self::Sine | Self::Triangle | Self::SawtoothDown | Self::SawtoothUp
        )
    }

    #[must_use]
    pub fn is_condition(self) -> bool {
        matches!(
            self,
            Self::Spring | Self::Damper | Self::Inertia | Self::Friction
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EffectState {
    #[default]
    Free,
    Allocated,
    Playing,
}

/// Per axis spring/damper/inertia/friction parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Condition {
    pub cp_offset: i16,
    pub positive_coefficient: i16,
    pub negative_coefficient: i16,
    pub positive_saturation: u16,
    pub negative_saturation: u16,
    pub dead_band: u16,
}

impl Condition {
    /// Restoring force for `metric`, zero inside the dead band around the center point. A saturation of zero
    /// leaves that side unlimited.
    #[must_use]
    pub fn force(&self, metric: i32) -> i32 {
        let cp = i64::from(self.cp_offset);
        let dead_band = i64::from(self.dead_band);
        let metric = i64::from(metric);

        let force = if metric < cp - dead_band {
            saturate(
                (metric - (cp - dead_band)) * i64::from(self.negative_coefficient) / 255,
                self.negative_saturation,
            )
        } else if metric > cp + dead_band {
            saturate(
                (metric - (cp + dead_band)) * i64::from(self.positive_coefficient) / 255,
                self.positive_saturation,
            )
        } else {
            0
        };

        clamp_i32(-force)
    }
}

/// Joystick state fed to condition effects, in the same scale as force magnitudes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AxisMetrics {
    pub position: i16,
    pub velocity: i16,
    pub acceleration: i16,
}

/// One effect block
#[derive(Clone, Copy, Debug, Default)]
pub struct Effect {
    pub state: EffectState,
    pub effect_type: Option<EffectType>,
    pub offset: i16,
    pub gain: u8,
    // envelope
    pub attack_level: i16,
    pub fade_level: i16,
    pub attack_time: u16,
    pub fade_time: u16,
    pub magnitude: i16,
    // direction
    /// bits: 0=X, 1=Y, 2=DirectionEnable
    pub enable_axis: u8,
    /// angle, 0..255 = 0..360deg
    pub direction_x: u8,
    pub direction_y: u8,
    // condition
    pub condition_block_count: u8,
    pub conditions: [Condition; MAX_FFB_AXIS_COUNT],
    // periodic
    /// 0..255 = 0..360deg
    pub phase: u16,
    pub start_magnitude: i16,
    pub end_magnitude: i16,
    /// ms
    pub period: u16,
    pub duration: u16,
    pub elapsed_time: u32,
    pub start_time: Option<MillisInstant>,
}

impl Effect {
    /// A freshly allocated, zeroed effect block
    #[must_use]
    pub fn allocated() -> Self {
        Self {
            state: EffectState::Allocated,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == EffectState::Playing
    }

    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.duration == DURATION_INFINITE
    }

    /// Magnitude after gain and attack/fade shaping at `elapsed` ms
    #[must_use]
    pub fn envelope(&self, gain: u8, elapsed: u32) -> i32 {
        self.shape(apply_gain(self.magnitude.into(), gain), gain, elapsed)
    }

    /// Apply the envelope to an already gain scaled `level`
    fn shape(&self, level: i32, gain: u8, elapsed: u32) -> i32 {
        let level = i64::from(level);
        let attack_level = i64::from(apply_gain(self.attack_level.into(), gain));
        let fade_level = i64::from(apply_gain(self.fade_level.into(), gain));
        let attack_time = i64::from(self.attack_time);
        let fade_time = i64::from(self.fade_time);
        let duration = i64::from(self.duration);
        let elapsed = i64::from(elapsed);

        let mut value = level;
        if attack_time > 0 && elapsed < attack_time {
            value = attack_level + (level - attack_level) * elapsed / attack_time;
        }
        if !self.is_infinite() && fade_time > 0 && elapsed > duration - fade_time {
            let remaining = (duration - elapsed).max(0);
            value = fade_level + (level - fade_level) * remaining / fade_time;
        }
        clamp_i32(value)
    }

    /// Per axis Q15 ratio the effect's value is distributed with
    #[must_use]
    pub fn direction_ratios(&self) -> [i32; MAX_FFB_AXIS_COUNT] {
        if self.enable_axis & DIRECTION_ENABLE != 0 {
            let angle = u32::from(self.direction_x) * TURN / 255;
            [sin_q15(angle), -cos_q15(angle)]
        } else {
            [X_AXIS_ENABLE, Y_AXIS_ENABLE].map(|bit| {
                if self.enable_axis & bit != 0 {
                    Q15_ONE
                } else {
                    0
                }
            })
        }
    }

    fn ramp_level(&self, elapsed: u32) -> i32 {
        let start = i64::from(self.start_magnitude);
        let end = i64::from(self.end_magnitude);
        if self.is_infinite() || self.duration == 0 {
            return clamp_i32(start);
        }
        let duration = u32::from(self.duration);
        clamp_i32(start + (end - start) * i64::from(elapsed.min(duration)) / i64::from(duration))
    }

    /// Position inside the waveform cycle as a fraction of [`TURN`]
    fn cycle_angle(&self, elapsed: u32) -> u32 {
        let phase = u32::from(self.phase) * TURN / 256;
        let period = u32::from(self.period);
        let progress = if period == 0 {
            0
        } else {
            elapsed % period * TURN / period
        };
        (progress + phase) % TURN
    }

    fn waveform(&self, effect_type: EffectType, elapsed: u32) -> i32 {
        let angle = self.cycle_angle(elapsed);
        let angle_i = angle as i32;
        let turn = TURN as i32;
        let quarter = turn / 4;
        match effect_type {
            EffectType::Square => {
                if angle < TURN / 2 {
                    Q15_ONE
                } else {
                    -Q15_ONE
                }
            }
            EffectType::Sine => sin_q15(angle),
            EffectType::Triangle => {
                if angle_i < quarter {
                    angle_i * Q15_ONE / quarter
                } else if angle_i < 3 * quarter {
                    (2 * quarter - angle_i) * Q15_ONE / quarter
                } else {
                    (angle_i - turn) * Q15_ONE / quarter
                }
            }
            EffectType::SawtoothUp => -Q15_ONE + angle_i * 2 * Q15_ONE / turn,
            EffectType::SawtoothDown => Q15_ONE - angle_i * 2 * Q15_ONE / turn,
            _ => 0,
        }
    }

    /// Force contributed on each axis at `elapsed` ms with the combined `gain`
    #[must_use]
    pub fn force(
        &self,
        elapsed: u32,
        gain: u8,
        metrics: &[AxisMetrics; MAX_FFB_AXIS_COUNT],
    ) -> [i32; MAX_FFB_AXIS_COUNT] {
        let Some(effect_type) = self.effect_type else {
            return [0; MAX_FFB_AXIS_COUNT];
        };

        let value = match effect_type {
            EffectType::Constant => self.envelope(gain, elapsed),
            EffectType::Ramp => self.shape(apply_gain(self.ramp_level(elapsed), gain), gain, elapsed),
            t if t.is_periodic() => {
                let amplitude = i64::from(self.envelope(gain, elapsed));
                let offset = i64::from(apply_gain(self.offset.into(), gain));
                clamp_i32(offset + amplitude * i64::from(self.waveform(t, elapsed)) / i64::from(Q15_ONE))
            }
            t if t.is_condition() => return self.condition_forces(t, gain, metrics),
            _ => 0,
        };

        self.direction_ratios()
            .map(|ratio| clamp_i32(i64::from(value) * i64::from(ratio) / i64::from(Q15_ONE)))
    }

    fn condition_forces(
        &self,
        effect_type: EffectType,
        gain: u8,
        metrics: &[AxisMetrics; MAX_FFB_AXIS_COUNT],
    ) -> [i32; MAX_FFB_AXIS_COUNT] {
        let mut forces = [0; MAX_FFB_AXIS_COUNT];
        if self.condition_block_count == 0 {
            return forces;
        }
        let all_axes = self.enable_axis & DIRECTION_ENABLE != 0;
        let last_block = usize::from(self.condition_block_count) - 1;

        for (axis, (force, metric)) in forces.iter_mut().zip(metrics).enumerate() {
            if !all_axes && self.enable_axis & (1 << axis) == 0 {
                continue;
            }
            let metric = match effect_type {
                EffectType::Spring => metric.position,
                EffectType::Inertia => metric.acceleration,
                _ => metric.velocity,
            };
            if let Some(condition) = self.conditions.get(axis.min(last_block)) {
                *force = apply_gain(condition.force(metric.into()), gain);
            }
        }
        forces
    }
}

/// `value * gain / 255`, truncating
#[must_use]
pub fn apply_gain(value: i32, gain: u8) -> i32 {
    clamp_i32(i64::from(value) * i64::from(gain) / 255)
}

/// Chain two 0..255 gains
#[must_use]
pub fn combine_gain(a: u8, b: u8) -> u8 {
    u8::try_from(u16::from(a) * u16::from(b) / 255).unwrap_or(u8::MAX)
}

/// Q15 sine of `angle`, a full turn being 1024
#[must_use]
pub fn sin_q15(angle: u32) -> i32 {
    let angle = angle % TURN;
    let position = angle % QUARTER_TURN;
    match angle / QUARTER_TURN {
        0 => quarter_sine(position),
        1 => quarter_sine(QUARTER_TURN - position),
        2 => -quarter_sine(position),
        _ => -quarter_sine(QUARTER_TURN - position),
    }
}

#[must_use]
pub fn cos_q15(angle: u32) -> i32 {
    sin_q15(angle + QUARTER_TURN)
}

/// Interpolated table lookup for `position` in 0..=QUARTER_TURN
fn quarter_sine(position: u32) -> i32 {
    let step = QUARTER_TURN / (QUARTER_SINE.len() as u32 - 1);
    let index = (position / step) as usize;
    let fraction = i32::try_from(position % step).unwrap_or(0);
    match (QUARTER_SINE.get(index), QUARTER_SINE.get(index + 1)) {
        (Some(&low), Some(&high)) => low + (high - low) * fraction / step as i32,
        (Some(&low), None) => low,
        _ => Q15_ONE,
    }
}

fn saturate(value: i64, saturation: u16) -> i64 {
    if saturation == 0 {
        value
    } else {
        let limit = i64::from(saturation);
        value.clamp(-limit, limit)
    }
}

fn clamp_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}
