//! The PID joystick Prelude.
//!
//! The purpose of this module is to alleviate imports of structs and enums
//! required to instance the force feedback class and drive it:
//!
//! ```
//! # #![allow(unused_imports)]
//! use usbd_pid_joystick::prelude::*;
//! ```

pub use crate::device::{DeviceState, Gains};
pub use crate::effect::{AxisMetrics, EffectType};
pub use crate::handler::{Forces, PidHandler, SetupRequest};
pub use crate::queue::OutboundQueue;
pub use crate::registry::{Handler, HandlerRegistry, ReportReceiver, TransmitHandler};
pub use crate::usb_class::{PidClass, PidClassBuilder, PidClassBuilderError};
pub use crate::{ControlPipe, MillisInstant, PacketSink, PidError};
