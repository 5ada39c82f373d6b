//! PID report layouts
//!
//! Every report starts with a one byte report ID followed by a fixed, little endian payload. The records in this
//! module describe the payload only, the ID is written by [`PidReport::encode`] and checked by
//! [`PidReport::decode`].
use heapless::Vec;
use log::error;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use packed_struct::prelude::*;

use crate::effect::EffectType;
use crate::PidError;

/// Largest frame that fits a full speed interrupt endpoint
pub const MAX_REPORT_SIZE: usize = 64;

/// Report ID prefixed bytes, as sent to or received from the host
pub type Frame = Vec<u8, MAX_REPORT_SIZE>;

/// Block index addressing every effect in Block Free
pub const ALL_EFFECTS: u8 = 0xFF;

/// Loop count requesting endless playback in Effect Operation
pub const LOOP_INFINITE: u8 = 0xFF;

/// Interrupt OUT report IDs
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum OutputReportId {
    SetEffect = 0x01,
    SetEnvelope = 0x02,
    SetCondition = 0x03,
    SetPeriodic = 0x04,
    SetConstantForce = 0x05,
    SetRampForce = 0x06,
    SetCustomForceData = 0x07,
    SetDownloadForceSample = 0x08,
    EffectOperation = 0x0A,
    BlockFree = 0x0B,
    DeviceControl = 0x0C,
    DeviceGain = 0x0D,
    SetCustomForce = 0x0E,
}

/// Feature report IDs, exchanged over the control endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FeatureReportId {
    CreateNewEffect = 0x05,
    PidBlockLoad = 0x06,
    PidPool = 0x07,
}

/// Input report IDs, sent on the interrupt IN endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum InputReportId {
    PidState = 0x02,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum EffectOperation {
    Start = 0x01,
    StartSolo = 0x02,
    Stop = 0x03,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DeviceControl {
    EnableActuators = 0x01,
    DisableActuators = 0x02,
    StopAllEffects = 0x04,
    Reset = 0x08,
    Pause = 0x10,
    Continue = 0x20,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum LoadStatus {
    Success = 0x01,
    Full = 0x02,
    Error = 0x03,
}

/// A fixed layout PID report with an `N` byte payload
pub trait PidReport<const N: usize>: PackedStruct<ByteArray = [u8; N]> + Sized {
    const ID: u8;
    /// Length on the wire, report ID included
    const SIZE: usize = N + 1;

    fn encode(&self) -> Result<Frame, PidError> {
        let payload = self.pack().map_err(|e| {
            error!("Error packing report id={:#04X}: {:?}", Self::ID, e);
            PidError::SerializationError
        })?;
        let mut frame = Frame::new();
        frame
            .push(Self::ID)
            .map_err(|_| PidError::SerializationError)?;
        frame
            .extend_from_slice(&payload)
            .map_err(|_| PidError::SerializationError)?;
        Ok(frame)
    }

    /// Decode a report, trailing bytes beyond the fixed layout are ignored
    fn decode(data: &[u8]) -> Result<Self, PidError> {
        let truncated = || PidError::Truncated {
            expected: Self::SIZE,
            actual: data.len(),
        };
        let (&id, payload) = data.split_first().ok_or_else(truncated)?;
        if id != Self::ID {
            return Err(PidError::UnexpectedReportId(id));
        }
        let bytes: [u8; N] = payload
            .get(..N)
            .and_then(|p| p.try_into().ok())
            .ok_or_else(truncated)?;
        Self::unpack(&bytes).map_err(PidError::from)
    }
}

macro_rules! pid_report {
    ($report: ident, $id: expr, $size: literal) => {
        impl PidReport<$size> for $report {
            const ID: u8 = $id as u8;
        }
    };
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "15")]
pub struct SetEffectReport {
    pub effect_block_index: u8,
    pub effect_type: u8,
    /// ms, `0xFFFF` is infinite
    pub duration: u16,
    pub trigger_repeat_interval: u16,
    pub sample_period: u16,
    pub gain: u8,
    pub trigger_button: u8,
    /// bits: 0=X, 1=Y, 2=DirectionEnable
    pub enable_axis: u8,
    /// angle, 0..255 = 0..360deg
    pub direction_x: u8,
    pub direction_y: u8,
    pub start_delay: u16,
}

impl SetEffectReport {
    #[must_use]
    pub fn effect_type(&self) -> Option<EffectType> {
        EffectType::try_from(self.effect_type).ok()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "13")]
pub struct SetEnvelopeReport {
    pub effect_block_index: u8,
    pub attack_level: u16,
    pub fade_level: u16,
    pub attack_time: u32,
    pub fade_time: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "14")]
pub struct SetConditionReport {
    pub effect_block_index: u8,
    /// bits: 0..3=parameter block offset (axis), 4..5=instance 1, 6..7=instance 2
    pub parameter_block_offset: u8,
    pub cp_offset: i16,
    pub positive_coefficient: i16,
    pub negative_coefficient: i16,
    pub positive_saturation: u16,
    pub negative_saturation: u16,
    pub dead_band: u16,
}

impl SetConditionReport {
    #[must_use]
    pub fn axis(&self) -> u8 {
        self.parameter_block_offset & 0x0F
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "11")]
pub struct SetPeriodicReport {
    pub effect_block_index: u8,
    pub magnitude: u16,
    pub offset: i16,
    /// 0..255 = 0..360deg
    pub phase: u16,
    /// ms
    pub period: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "3")]
pub struct SetConstantForceReport {
    pub effect_block_index: u8,
    /// -255..255
    pub magnitude: i16,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "5")]
pub struct SetRampForceReport {
    pub effect_block_index: u8,
    pub start_magnitude: i16,
    pub end_magnitude: i16,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "15")]
pub struct SetCustomForceDataReport {
    pub effect_block_index: u8,
    pub data_offset: u16,
    data: [u8; 12],
}

impl SetCustomForceDataReport {
    #[must_use]
    pub fn new(effect_block_index: u8, data_offset: u16, samples: [i8; 12]) -> Self {
        Self {
            effect_block_index,
            data_offset,
            data: samples.map(|s| s.to_le_bytes()[0]),
        }
    }

    #[must_use]
    pub fn samples(&self) -> [i8; 12] {
        self.data.map(|b| i8::from_le_bytes([b]))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "2")]
pub struct SetDownloadForceSampleReport {
    pub x: i8,
    pub y: i8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "3")]
pub struct EffectOperationReport {
    pub effect_block_index: u8,
    /// 1=Start, 2=StartSolo, 3=Stop
    pub operation: u8,
    pub loop_count: u8,
}

impl EffectOperationReport {
    #[must_use]
    pub fn operation(&self) -> Option<EffectOperation> {
        EffectOperation::try_from(self.operation).ok()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "1")]
pub struct BlockFreeReport {
    pub effect_block_index: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "1")]
pub struct DeviceControlReport {
    pub control: u8,
}

impl DeviceControlReport {
    #[must_use]
    pub fn control(&self) -> Option<DeviceControl> {
        DeviceControl::try_from(self.control).ok()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "1")]
pub struct DeviceGainReport {
    pub gain: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "4")]
pub struct SetCustomForceReport {
    pub effect_block_index: u8,
    pub sample_count: u8,
    pub sample_period: u16,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "2")]
pub struct PidStateReport {
    /// bits: 0=Device Paused, 1=Actuators Enabled, 2=Safety Switch, 3=Actuator Override Switch, 4=Actuator Power
    pub status: u8,
    /// bit 7=Effect Playing, bits 0..6=effect block index
    pub effect: u8,
}

impl PidStateReport {
    pub const DEVICE_PAUSED: u8 = 0x01;
    pub const ACTUATORS_ENABLED: u8 = 0x02;
    pub const SAFETY_SWITCH: u8 = 0x04;
    pub const ACTUATOR_OVERRIDE_SWITCH: u8 = 0x08;
    pub const ACTUATOR_POWER: u8 = 0x10;
    const EFFECT_PLAYING: u8 = 0x80;

    #[must_use]
    pub fn new(status: u8, effect_block_index: u8, playing: bool) -> Self {
        let playing = if playing { Self::EFFECT_PLAYING } else { 0 };
        Self {
            status,
            effect: (effect_block_index & !Self::EFFECT_PLAYING) | playing,
        }
    }

    #[must_use]
    pub fn effect_block_index(&self) -> u8 {
        self.effect & !Self::EFFECT_PLAYING
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.effect & Self::EFFECT_PLAYING != 0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "3")]
pub struct CreateNewEffectReport {
    pub effect_type: u8,
    /// 0..511
    pub byte_count: u16,
}

impl CreateNewEffectReport {
    #[must_use]
    pub fn effect_type(&self) -> Option<EffectType> {
        EffectType::try_from(self.effect_type).ok()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "4")]
pub struct PidBlockLoadReport {
    pub effect_block_index: u8,
    /// 1=Success, 2=Full, 3=Error
    pub load_status: u8,
    pub ram_pool_available: u16,
}

impl PidBlockLoadReport {
    #[must_use]
    pub fn load_status(&self) -> Option<LoadStatus> {
        LoadStatus::try_from(self.load_status).ok()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "4")]
pub struct PidPoolReport {
    pub ram_pool_size: u16,
    pub max_simultaneous_effects: u8,
    /// bits: 0=Device Managed Pool, 1=Shared Parameter Blocks
    pub memory_management: u8,
}

impl PidPoolReport {
    pub const DEVICE_MANAGED_POOL: u8 = 0x01;
    pub const SHARED_PARAMETER_BLOCKS: u8 = 0x02;
}

pid_report!(SetEffectReport, OutputReportId::SetEffect, 15);
pid_report!(SetEnvelopeReport, OutputReportId::SetEnvelope, 13);
pid_report!(SetConditionReport, OutputReportId::SetCondition, 14);
pid_report!(SetPeriodicReport, OutputReportId::SetPeriodic, 11);
pid_report!(SetConstantForceReport, OutputReportId::SetConstantForce, 3);
pid_report!(SetRampForceReport, OutputReportId::SetRampForce, 5);
pid_report!(SetCustomForceDataReport, OutputReportId::SetCustomForceData, 15);
pid_report!(SetDownloadForceSampleReport, OutputReportId::SetDownloadForceSample, 2);
pid_report!(EffectOperationReport, OutputReportId::EffectOperation, 3);
pid_report!(BlockFreeReport, OutputReportId::BlockFree, 1);
pid_report!(DeviceControlReport, OutputReportId::DeviceControl, 1);
pid_report!(DeviceGainReport, OutputReportId::DeviceGain, 1);
pid_report!(SetCustomForceReport, OutputReportId::SetCustomForce, 4);
pid_report!(PidStateReport, InputReportId::PidState, 2);
pid_report!(CreateNewEffectReport, FeatureReportId::CreateNewEffect, 3);
pid_report!(PidBlockLoadReport, FeatureReportId::PidBlockLoad, 4);
pid_report!(PidPoolReport, FeatureReportId::PidPool, 4);

/// A decoded interrupt OUT report
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputReport {
    SetEffect(SetEffectReport),
    SetEnvelope(SetEnvelopeReport),
    SetCondition(SetConditionReport),
    SetPeriodic(SetPeriodicReport),
    SetConstantForce(SetConstantForceReport),
    SetRampForce(SetRampForceReport),
    SetCustomForceData(SetCustomForceDataReport),
    SetDownloadForceSample(SetDownloadForceSampleReport),
    EffectOperation(EffectOperationReport),
    BlockFree(BlockFreeReport),
    DeviceControl(DeviceControlReport),
    DeviceGain(DeviceGainReport),
    SetCustomForce(SetCustomForceReport),
    /// Report ID not part of the PID output reports, left to the caller's fallback
    Unknown(u8),
}

impl OutputReport {
    /// Classify and decode an interrupt OUT report by its leading report ID
    pub fn parse(data: &[u8]) -> Result<Self, PidError> {
        let Some(&id) = data.first() else {
            return Err(PidError::Truncated {
                expected: 1,
                actual: 0,
            });
        };

        let Ok(report_id) = OutputReportId::try_from(id) else {
            return Ok(OutputReport::Unknown(id));
        };

        Ok(match report_id {
            OutputReportId::SetEffect => OutputReport::SetEffect(SetEffectReport::decode(data)?),
            OutputReportId::SetEnvelope => {
                OutputReport::SetEnvelope(SetEnvelopeReport::decode(data)?)
            }
            OutputReportId::SetCondition => {
                OutputReport::SetCondition(SetConditionReport::decode(data)?)
            }
            OutputReportId::SetPeriodic => {
                OutputReport::SetPeriodic(SetPeriodicReport::decode(data)?)
            }
            OutputReportId::SetConstantForce => {
                OutputReport::SetConstantForce(SetConstantForceReport::decode(data)?)
            }
            OutputReportId::SetRampForce => {
                OutputReport::SetRampForce(SetRampForceReport::decode(data)?)
            }
            OutputReportId::SetCustomForceData => {
                OutputReport::SetCustomForceData(SetCustomForceDataReport::decode(data)?)
            }
            OutputReportId::SetDownloadForceSample => {
                OutputReport::SetDownloadForceSample(SetDownloadForceSampleReport::decode(data)?)
            }
            OutputReportId::EffectOperation => {
                OutputReport::EffectOperation(EffectOperationReport::decode(data)?)
            }
            OutputReportId::BlockFree => OutputReport::BlockFree(BlockFreeReport::decode(data)?),
            OutputReportId::DeviceControl => {
                OutputReport::DeviceControl(DeviceControlReport::decode(data)?)
            }
            OutputReportId::DeviceGain => OutputReport::DeviceGain(DeviceGainReport::decode(data)?),
            OutputReportId::SetCustomForce => {
                OutputReport::SetCustomForce(SetCustomForceReport::decode(data)?)
            }
        })
    }
}
