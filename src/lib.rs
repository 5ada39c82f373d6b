//! Force feedback joystick device logic for [usb-device](https://crates.io/crates/usb-device), implementing
//! the USB HID Physical Interface Device (PID) usage page.
//!
//! The crate is split into a transport agnostic core and a thin [`usb-device`](usb_device) adapter:
//!
//! * [`report`] - bit exact encode/decode of every PID report layout
//! * [`store`] - the fixed capacity effect block table and its allocator
//! * [`effect`] - per effect parameters and force synthesis (gain, envelope, direction, waveforms, conditions)
//! * [`handler`] - the PID protocol dispatcher for interrupt OUT reports and class control requests
//! * [`queue`] - the single flight outbound packet queue for the interrupt IN endpoint
//! * [`registry`] - an ordered table of HID handlers sharing one interrupt IN completion
//! * [`usb_class`] - [`UsbClass`](usb_device::class::UsbClass) implementation wiring it all to a USB bus
//!
//! ```rust, no_run
//! # use usb_device::class_prelude::*;
//! # use usb_device::prelude::*;
//! use usbd_pid_joystick::prelude::*;
//!
//! static QUEUE: OutboundQueue = OutboundQueue::new(1);
//!
//! # fn run<B: UsbBus>(usb_alloc: &UsbBusAllocator<B>, report_descriptor: &'static [u8], millis: impl Fn() -> u32) {
//! let mut joystick = PidClassBuilder::new(report_descriptor)
//!     .unwrap()
//!     .description("Force feedback joystick")
//!     .build(usb_alloc, PidHandler::new(&QUEUE));
//!
//! let mut usb_dev = UsbDeviceBuilder::new(usb_alloc, UsbVidPid(0x1209, 0x0001))
//!     .product("FFB Joystick")
//!     .build();
//!
//! loop {
//!     usb_dev.poll(&mut [&mut joystick]);
//!     let forces = joystick.update(MillisInstant::from_ticks(millis()));
//!     // drive the motors with forces.x / forces.y
//! #   let _ = forces;
//! }
//! # }
//! ```
#![no_std]

//Allow the use of std in tests
#[cfg(test)]
#[macro_use]
extern crate std;

use usb_device::UsbError;

pub mod descriptor;
pub mod device;
pub mod effect;
pub mod handler;
pub mod prelude;
pub mod queue;
pub mod registry;
pub mod report;
pub mod store;
pub mod usb_class;

/// Millisecond timestamp supplied by the caller, the core does not own a clock
pub type MillisInstant = fugit::TimerInstantU32<1000>;

#[derive(Debug)]
pub enum PidError {
    /// Report shorter than its fixed layout
    Truncated { expected: usize, actual: usize },
    /// Leading report ID does not match the expected report
    UnexpectedReportId(u8),
    SerializationError,
    /// No free effect block
    PoolFull,
    InvalidEffectIndex(u8),
    QueueFull,
    RegistryFull,
    WouldBlock,
    UsbError(UsbError),
}

impl PartialEq for PidError {
    fn eq(&self, other: &Self) -> bool {
        use PidError::*;
        match (self, other) {
            (
                Truncated {
                    expected: a,
                    actual: b,
                },
                Truncated {
                    expected: c,
                    actual: d,
                },
            ) => a == c && b == d,
            (UnexpectedReportId(a), UnexpectedReportId(b)) => a == b,
            (InvalidEffectIndex(a), InvalidEffectIndex(b)) => a == b,
            (UsbError(a), UsbError(b)) => core::mem::discriminant(a) == core::mem::discriminant(b),
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl Eq for PidError {}

impl From<UsbError> for PidError {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::WouldBlock => PidError::WouldBlock,
            _ => PidError::UsbError(e),
        }
    }
}

impl From<packed_struct::PackingError> for PidError {
    fn from(_: packed_struct::PackingError) -> Self {
        PidError::SerializationError
    }
}

/// Interrupt IN side of the transport
pub trait PacketSink {
    /// Start transmission of one frame on `endpoint`
    fn send_in_packet(&mut self, endpoint: u8, data: &[u8]) -> Result<(), PidError>;
}

/// Control endpoint side of the transport, scoped to a single setup request
pub trait ControlPipe {
    /// Data stage of a device-to-host request
    fn send_data(&mut self, data: &[u8]) -> Result<(), PidError>;
    /// Zero length status stage
    fn send_empty_handshake(&mut self) -> Result<(), PidError>;
    /// Pull the data stage of a host-to-device request into `buf`, returning the number of bytes read
    fn request_control_read_back(&mut self, buf: &mut [u8]) -> Result<usize, PidError>;
}
