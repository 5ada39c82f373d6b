//! PID protocol dispatcher
//!
//! [`PidHandler`] owns the effect table and device state. Interrupt OUT reports arrive through
//! [`PidHandler::on_report_received`], class control requests through [`PidHandler::on_setup`] and the
//! resulting forces are polled with [`PidHandler::compute_forces`].
use log::{error, info, trace, warn};
use usb_device::control::{Recipient, Request, RequestType};
use usb_device::UsbDirection;

use crate::descriptor::{HidProtocol, HidRequest, ReportType};
use crate::device::{DeviceState, Gains};
use crate::effect::{combine_gain, AxisMetrics, MAX_FFB_AXIS_COUNT};
use crate::queue::OutboundQueue;
use crate::report::{
    CreateNewEffectReport, DeviceControl, EffectOperation, EffectOperationReport, FeatureReportId,
    Frame, InputReportId, LoadStatus, OutputReport, PidBlockLoadReport, PidPoolReport, PidReport,
    PidStateReport, ALL_EFFECTS, MAX_REPORT_SIZE,
};
use crate::store::{EffectStore, MAX_EFFECTS, MEMORY_SIZE};
use crate::{ControlPipe, MillisInstant, PacketSink, PidError};

/// A control setup packet, decoupled from the USB stack that received it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetupRequest {
    pub direction: UsbDirection,
    pub request_type: RequestType,
    pub recipient: Recipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupRequest {
    #[must_use]
    pub fn value_low(&self) -> u8 {
        (self.value & 0xFF) as u8
    }

    #[must_use]
    pub fn value_high(&self) -> u8 {
        (self.value >> 8) as u8
    }
}

impl From<&Request> for SetupRequest {
    fn from(request: &Request) -> Self {
        Self {
            direction: request.direction,
            request_type: request.request_type,
            recipient: request.recipient,
            request: request.request,
            value: request.value,
            index: request.index,
            length: request.length,
        }
    }
}

/// Signed force per axis, ready for the motor driver
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Forces {
    pub x: i16,
    pub y: i16,
}

pub struct PidHandler<'q> {
    queue: &'q OutboundQueue,
    effects: EffectStore,
    device: DeviceState,
    gains: Gains,
    block_load: PidBlockLoadReport,
    /// Last effect block reported in the PID State
    status_effect: u8,
    idle: u8,
    protocol: HidProtocol,
}

impl<'q> PidHandler<'q> {
    #[must_use]
    pub fn new(queue: &'q OutboundQueue) -> Self {
        Self {
            queue,
            effects: EffectStore::new(),
            device: DeviceState::default(),
            gains: Gains::default(),
            block_load: empty_block_load(),
            status_effect: 0,
            idle: 0,
            protocol: HidProtocol::Report,
        }
    }

    #[must_use]
    pub fn with_gains(mut self, gains: Gains) -> Self {
        self.gains = gains;
        self
    }

    pub fn set_gains(&mut self, gains: Gains) {
        self.gains = gains;
    }

    #[must_use]
    pub fn gains(&self) -> &Gains {
        &self.gains
    }

    #[must_use]
    pub fn queue(&self) -> &'q OutboundQueue {
        self.queue
    }

    #[must_use]
    pub fn block_load(&self) -> &PidBlockLoadReport {
        &self.block_load
    }

    #[must_use]
    pub fn pool(&self) -> PidPoolReport {
        PidPoolReport {
            ram_pool_size: MEMORY_SIZE,
            max_simultaneous_effects: MAX_EFFECTS as u8,
            memory_management: PidPoolReport::DEVICE_MANAGED_POOL
                | PidPoolReport::SHARED_PARAMETER_BLOCKS,
        }
    }

    #[must_use]
    pub fn device(&self) -> &DeviceState {
        &self.device
    }

    #[must_use]
    pub fn effects(&self) -> &EffectStore {
        &self.effects
    }

    #[must_use]
    pub fn idle(&self) -> u8 {
        self.idle
    }

    #[must_use]
    pub fn protocol(&self) -> HidProtocol {
        self.protocol
    }

    /// Back to power on state, e.g. after a bus reset
    pub fn reset(&mut self) {
        self.effects.free(ALL_EFFECTS);
        self.device = DeviceState::default();
        self.block_load = empty_block_load();
        self.status_effect = 0;
        self.idle = 0;
        self.protocol = HidProtocol::Report;
        self.queue.clear();
    }

    /// Handle one interrupt OUT report. Malformed or unknown reports are logged and dropped.
    pub fn on_report_received(&mut self, data: &[u8], now: MillisInstant) {
        let report = match OutputReport::parse(data) {
            Ok(report) => report,
            Err(e) => {
                warn!("Dropping malformed output report: {:?}", e);
                return;
            }
        };
        trace!("Output report: {:?}", report);

        let result = match report {
            OutputReport::SetEffect(r) => self.effects.set_effect(&r),
            OutputReport::SetEnvelope(r) => self.effects.set_envelope(&r),
            OutputReport::SetCondition(r) => self.effects.set_condition(&r),
            OutputReport::SetPeriodic(r) => self.effects.set_periodic(&r),
            OutputReport::SetConstantForce(r) => self.effects.set_constant_force(&r),
            OutputReport::SetRampForce(r) => self.effects.set_ramp_force(&r),
            OutputReport::EffectOperation(r) => self.effect_operation(&r, now),
            OutputReport::BlockFree(r) => {
                self.free_effects(r.effect_block_index);
                Ok(())
            }
            OutputReport::DeviceControl(r) => {
                match r.control() {
                    Some(control) => self.device_control(control),
                    None => warn!("Unknown device control {:#04X}", r.control),
                }
                Ok(())
            }
            OutputReport::DeviceGain(r) => {
                self.device.gain = r.gain;
                Ok(())
            }
            OutputReport::SetCustomForceData(_)
            | OutputReport::SetDownloadForceSample(_)
            | OutputReport::SetCustomForce(_) => {
                trace!("Custom force reports are not supported");
                Ok(())
            }
            OutputReport::Unknown(id) => {
                warn!("Unknown output report id={:#04X}", id);
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Ignoring output report: {:?}", e);
        }
    }

    fn effect_operation(
        &mut self,
        report: &EffectOperationReport,
        now: MillisInstant,
    ) -> Result<(), PidError> {
        let index = report.effect_block_index;
        match report.operation() {
            Some(EffectOperation::Start) => self.effects.start(index, false, report.loop_count, now)?,
            Some(EffectOperation::StartSolo) => {
                self.effects.start(index, true, report.loop_count, now)?;
            }
            Some(EffectOperation::Stop) => self.effects.stop(index)?,
            None => {
                warn!("Unknown effect operation {:#04X}", report.operation);
                return Ok(());
            }
        }
        self.status_effect = index;
        Ok(())
    }

    /// Free `index` (or every block) and keep the Block Load pool figure current
    fn free_effects(&mut self, index: u8) {
        self.effects.free(index);
        self.block_load.ram_pool_available = self.effects.ram_pool_available();
    }

    fn device_control(&mut self, control: DeviceControl) {
        info!("Device control: {:?}", control);
        match control {
            DeviceControl::EnableActuators => self.device.actuators_enabled = true,
            DeviceControl::DisableActuators => self.device.actuators_enabled = false,
            DeviceControl::StopAllEffects => self.effects.stop_all(),
            DeviceControl::Reset => self.free_effects(ALL_EFFECTS),
            DeviceControl::Pause => self.device.paused = true,
            DeviceControl::Continue => self.device.paused = false,
        }
    }

    /// Handle a class request addressed to the interface. Returns `false` for anything unsupported so
    /// the caller can stall the request.
    pub fn on_setup(&mut self, request: &SetupRequest, pipe: &mut dyn ControlPipe) -> bool {
        if !(request.request_type == RequestType::Class && request.recipient == Recipient::Interface) {
            return false;
        }

        trace!(
            "setup: direction: {:?}, request: {}, value: {:#06X}, length: {}",
            request.direction,
            request.request,
            request.value,
            request.length
        );

        match (request.direction, HidRequest::try_from(request.request)) {
            (UsbDirection::In, Ok(HidRequest::GetReport)) => self.get_report(request, pipe),
            (UsbDirection::In, Ok(HidRequest::GetIdle)) => {
                if request.length != 1 {
                    warn!("Expected GetIdle to have length 1, received {}", request.length);
                }
                accept(pipe.send_data(&[self.idle]))
            }
            (UsbDirection::In, Ok(HidRequest::GetProtocol)) => {
                if request.length != 1 {
                    warn!("Expected GetProtocol to have length 1, received {}", request.length);
                }
                accept(pipe.send_data(&[self.protocol.into()]))
            }
            (UsbDirection::Out, Ok(HidRequest::SetReport)) => self.set_report(request, pipe),
            (UsbDirection::Out, Ok(HidRequest::SetIdle)) => {
                if request.length != 0 {
                    warn!("Expected SetIdle to have length 0, received {}", request.length);
                }
                self.idle = request.value_high();
                info!("Set idle for ID{}: {}", request.value_low(), self.idle);
                accept(pipe.send_empty_handshake())
            }
            (UsbDirection::Out, Ok(HidRequest::SetProtocol)) => {
                match HidProtocol::try_from(request.value_low()) {
                    Ok(protocol) => {
                        self.protocol = protocol;
                        info!("Set protocol: {:?}", protocol);
                        accept(pipe.send_empty_handshake())
                    }
                    Err(_) => {
                        error!("Unable to set protocol, unsupported value:{}", request.value);
                        false
                    }
                }
            }
            _ => {
                warn!(
                    "Unsupported class request: {:?}, request: {}, value: {}",
                    request.direction, request.request, request.value
                );
                false
            }
        }
    }

    fn get_report(&mut self, request: &SetupRequest, pipe: &mut dyn ControlPipe) -> bool {
        let report_id = request.value_low();
        let frame = match ReportType::try_from(request.value_high()) {
            Ok(ReportType::Feature) => match FeatureReportId::try_from(report_id) {
                Ok(FeatureReportId::PidBlockLoad) => self.block_load.encode(),
                Ok(FeatureReportId::PidPool) => self.pool().encode(),
                _ => Err(PidError::UnexpectedReportId(report_id)),
            },
            Ok(ReportType::Input) if InputReportId::try_from(report_id).is_ok() => {
                self.status_report(self.status_effect).encode()
            }
            _ => Err(PidError::UnexpectedReportId(report_id)),
        };

        match frame {
            Ok(frame) => {
                trace!("GetReport id={:#04X} response: {:02X?}", report_id, &frame[..]);
                accept(pipe.send_data(&frame))
            }
            Err(e) => {
                warn!("Unsupported GetReport value: {:#06X}, {:?}", request.value, e);
                false
            }
        }
    }

    fn set_report(&mut self, request: &SetupRequest, pipe: &mut dyn ControlPipe) -> bool {
        let is_feature = matches!(ReportType::try_from(request.value_high()), Ok(ReportType::Feature));

        if is_feature && request.length == 0 {
            let mut buf = [0_u8; MAX_REPORT_SIZE];
            if let Err(e) = pipe.request_control_read_back(&mut buf) {
                warn!("Failed to read empty SetReport data: {:?}", e);
            }
            return accept(pipe.send_empty_handshake());
        }

        if is_feature && request.value_low() == u8::from(FeatureReportId::CreateNewEffect) {
            let mut buf = [0_u8; MAX_REPORT_SIZE];
            let received = match pipe.request_control_read_back(&mut buf) {
                Ok(n) => buf.get(..n).unwrap_or_default(),
                Err(e) => {
                    error!("Failed to read Create New Effect data: {:?}", e);
                    return false;
                }
            };
            match CreateNewEffectReport::decode(received) {
                Ok(report) => self.create_new_effect(&report),
                Err(e) => {
                    warn!("Malformed Create New Effect report: {:?}", e);
                    self.set_block_load(0, LoadStatus::Error);
                }
            }
            return accept(pipe.send_empty_handshake());
        }

        trace!("Ignoring SetReport value: {:#06X}", request.value);
        accept(pipe.send_empty_handshake())
    }

    fn create_new_effect(&mut self, report: &CreateNewEffectReport) {
        match self.effects.allocate() {
            Ok(index) => {
                match report.effect_type() {
                    Some(effect_type) => {
                        self.effects.set_effect_type(index, effect_type).ok();
                    }
                    None => warn!("Unknown effect type {:#04X}", report.effect_type),
                }
                info!("Created effect index={} type={:?}", index, report.effect_type());
                self.set_block_load(index, LoadStatus::Success);
            }
            Err(e) => {
                warn!("Unable to create effect: {:?}", e);
                self.set_block_load(0, LoadStatus::Full);
            }
        }
    }

    fn set_block_load(&mut self, index: u8, status: LoadStatus) {
        self.block_load = PidBlockLoadReport {
            effect_block_index: index,
            load_status: status.into(),
            ram_pool_available: self.effects.ram_pool_available(),
        };
    }

    fn status_report(&self, index: u8) -> PidStateReport {
        let playing = self.effects.get(index).map_or(false, |e| e.is_playing());
        PidStateReport::new(self.device.status(), index, playing)
    }

    /// Queue a PID State report for effect block `index`
    pub fn send_status(&mut self, index: u8, sink: &mut dyn PacketSink) -> Result<(), PidError> {
        let frame = self.status_report(index).encode()?;
        self.queue.enqueue(frame, sink)
    }

    /// Queue `payload` behind report ID `id`, e.g. the joystick axis and button state
    pub fn send_report(
        &mut self,
        id: u8,
        payload: &[u8],
        sink: &mut dyn PacketSink,
    ) -> Result<(), PidError> {
        let mut frame = Frame::new();
        frame.push(id).map_err(|_| PidError::SerializationError)?;
        frame.extend_from_slice(payload).map_err(|_| {
            error!("Report id={:#04X} payload of {} bytes too long", id, payload.len());
            PidError::SerializationError
        })?;
        self.queue.enqueue(frame, sink)
    }

    pub fn on_transmit_complete(&mut self, sink: &mut dyn PacketSink) -> bool {
        self.queue.on_transmit_complete(sink)
    }

    /// Forces at `now` with condition effects at rest
    pub fn compute_forces(&mut self, now: MillisInstant) -> Forces {
        self.compute_forces_with(now, &[AxisMetrics::default(); MAX_FFB_AXIS_COUNT])
    }

    /// Sum of every playing effect at `now`, condition effects reacting to `metrics`
    pub fn compute_forces_with(
        &mut self,
        now: MillisInstant,
        metrics: &[AxisMetrics; MAX_FFB_AXIS_COUNT],
    ) -> Forces {
        self.effects.advance(now);
        if !self.device.is_active() {
            return Forces::default();
        }

        let mut totals = [0_i32; MAX_FFB_AXIS_COUNT];
        for (_, effect) in self.effects.iter().filter(|(_, e)| e.is_playing()) {
            let Some(effect_type) = effect.effect_type else {
                continue;
            };
            let gain = [self.gains.for_type(effect_type), self.gains.total, self.device.gain]
                .into_iter()
                .fold(effect.gain, combine_gain);

            let force = effect.force(effect.elapsed_time, gain, metrics);
            for (total, axis) in totals.iter_mut().zip(force) {
                *total = total.saturating_add(axis);
            }
        }

        let [x, y] = totals.map(saturate_i16);
        Forces { x, y }
    }
}

fn empty_block_load() -> PidBlockLoadReport {
    PidBlockLoadReport {
        ram_pool_available: MEMORY_SIZE,
        ..PidBlockLoadReport::default()
    }
}

fn accept(result: Result<(), PidError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to complete control transfer: {:?}", e);
            false
        }
    }
}

fn saturate_i16(value: i32) -> i16 {
    i16::try_from(value).unwrap_or(if value < 0 { i16::MIN } else { i16::MAX })
}
