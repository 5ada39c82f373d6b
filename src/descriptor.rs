//! HID descriptor constants and enumerations
use num_enum::{IntoPrimitive, TryFromPrimitive};
use packed_struct::prelude::*;

pub const USB_CLASS_HID: u8 = 0x03;
pub(crate) const SPEC_VERSION_1_11: u16 = 0x0111; //1.11 in BCD
pub(crate) const COUNTRY_CODE_NOT_SUPPORTED: u8 = 0x0;
pub(crate) const SUBCLASS_NONE: u8 = 0x00;
pub(crate) const PROTOCOL_NONE: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PrimitiveEnum, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub(crate) enum DescriptorType {
    Hid = 0x21,
    Report = 0x22,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum HidProtocol {
    Boot = 0x00,
    Report = 0x01,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum HidRequest {
    GetReport = 0x01,
    GetIdle = 0x02,
    GetProtocol = 0x03,
    SetReport = 0x09,
    SetIdle = 0x0A,
    SetProtocol = 0x0B,
}

/// Report type carried in the high byte of `wValue` for Get/Set Report
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ReportType {
    Input = 0x01,
    Output = 0x02,
    Feature = 0x03,
}

#[derive(Debug, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = 7)]
pub(crate) struct HidDescriptorBody {
    pub bcd_hid: u16,
    pub country_code: u8,
    pub num_descriptors: u8,
    #[packed_field(ty = "enum", size_bytes = "1")]
    pub descriptor_type: DescriptorType,
    pub descriptor_length: u16,
}
