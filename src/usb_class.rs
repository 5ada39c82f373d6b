//! USB Class for a force feedback joystick

use crate::descriptor::{
    DescriptorType, HidDescriptorBody, COUNTRY_CODE_NOT_SUPPORTED, PROTOCOL_NONE,
    SPEC_VERSION_1_11, SUBCLASS_NONE, USB_CLASS_HID,
};
use crate::effect::{AxisMetrics, MAX_FFB_AXIS_COUNT};
use crate::handler::{Forces, PidHandler, SetupRequest};
use crate::report::MAX_REPORT_SIZE;
use crate::{ControlPipe, MillisInstant, PacketSink, PidError};
use fugit::MillisDurationU32;
use log::{error, info, trace, warn};
use packed_struct::prelude::*;
#[allow(clippy::wildcard_imports)]
use usb_device::class_prelude::*;
use usb_device::control::{Recipient, Request, RequestType};
use usb_device::Result;

/// [`PidClassBuilder`] error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidClassBuilderError {
    /// A value is greater than the acceptable range of input values
    ValueOverflow,
    /// A slice of data is longer than permitted
    SliceLengthOverflow,
}

pub type BuilderResult<B> = core::result::Result<B, PidClassBuilderError>;

const DEFAULT_POLL_INTERVAL: u8 = 1;

/// Builder for [`PidClass`]
#[must_use = "this `PidClassBuilder` must be assigned or consumed by `::build()`"]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PidClassBuilder<'a> {
    report_descriptor: &'a [u8],
    report_descriptor_length: u16,
    description: Option<&'a str>,
    in_poll_interval: u8,
    out_poll_interval: u8,
}

impl<'a> PidClassBuilder<'a> {
    /// `report_descriptor` must describe the joystick input report and every PID report the device handles
    pub fn new(report_descriptor: &'a [u8]) -> BuilderResult<Self> {
        Ok(Self {
            report_descriptor,
            report_descriptor_length: u16::try_from(report_descriptor.len())
                .map_err(|_| PidClassBuilderError::SliceLengthOverflow)?,
            description: None,
            in_poll_interval: DEFAULT_POLL_INTERVAL,
            out_poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn description(mut self, s: &'a str) -> Self {
        self.description = Some(s);
        self
    }

    pub fn in_endpoint(mut self, poll_interval: MillisDurationU32) -> BuilderResult<Self> {
        self.in_poll_interval = u8::try_from(poll_interval.to_millis())
            .map_err(|_| PidClassBuilderError::ValueOverflow)?;
        Ok(self)
    }

    pub fn out_endpoint(mut self, poll_interval: MillisDurationU32) -> BuilderResult<Self> {
        self.out_poll_interval = u8::try_from(poll_interval.to_millis())
            .map_err(|_| PidClassBuilderError::ValueOverflow)?;
        Ok(self)
    }

    pub fn build<'q, B: UsbBus>(
        self,
        usb_alloc: &'a UsbBusAllocator<B>,
        handler: PidHandler<'q>,
    ) -> PidClass<'a, 'q, B> {
        let in_endpoint: EndpointIn<'a, B> =
            usb_alloc.interrupt(MAX_REPORT_SIZE as u16, self.in_poll_interval);
        if usize::from(handler.queue().endpoint()) != in_endpoint.address().index() {
            warn!(
                "Queue endpoint {} does not match allocated IN endpoint {}",
                handler.queue().endpoint(),
                in_endpoint.address().index()
            );
        }

        PidClass {
            id: usb_alloc.interface(),
            in_endpoint,
            out_endpoint: usb_alloc.interrupt(MAX_REPORT_SIZE as u16, self.out_poll_interval),
            description_index: self.description.map(|_| usb_alloc.string()),
            config: self,
            handler,
            now: MillisInstant::from_ticks(0),
        }
    }
}

/// HID interface with one interrupt IN and one interrupt OUT endpoint, speaking the PID protocol
pub struct PidClass<'a, 'q, B: UsbBus> {
    id: InterfaceNumber,
    in_endpoint: EndpointIn<'a, B>,
    out_endpoint: EndpointOut<'a, B>,
    description_index: Option<StringIndex>,
    config: PidClassBuilder<'a>,
    handler: PidHandler<'q>,
    /// Time of the last [`PidClass::update`], stamped onto OUT reports
    now: MillisInstant,
}

impl<'a, 'q, B: UsbBus> PidClass<'a, 'q, B> {
    #[must_use]
    pub fn handler(&self) -> &PidHandler<'q> {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut PidHandler<'q> {
        &mut self.handler
    }

    #[must_use]
    pub fn out_endpoint_address(&self) -> EndpointAddress {
        self.out_endpoint.address()
    }

    #[must_use]
    pub fn in_endpoint_address(&self) -> EndpointAddress {
        self.in_endpoint.address()
    }

    /// Advance to `now` and return the forces to apply. Call this every 1ms / at 1KHz
    pub fn update(&mut self, now: MillisInstant) -> Forces {
        self.now = now;
        self.handler.compute_forces(now)
    }

    /// As [`PidClass::update`], with the current axis state for condition effects
    pub fn update_with(
        &mut self,
        now: MillisInstant,
        metrics: &[AxisMetrics; MAX_FFB_AXIS_COUNT],
    ) -> Forces {
        self.now = now;
        self.handler.compute_forces_with(now, metrics)
    }

    pub fn send_report(&mut self, id: u8, payload: &[u8]) -> core::result::Result<(), PidError> {
        self.handler.send_report(id, payload, &mut self.in_endpoint)
    }

    pub fn send_status(&mut self, index: u8) -> core::result::Result<(), PidError> {
        self.handler.send_status(index, &mut self.in_endpoint)
    }

    fn hid_descriptor_body(&self) -> core::result::Result<[u8; 7], PackingError> {
        HidDescriptorBody {
            bcd_hid: SPEC_VERSION_1_11,
            country_code: COUNTRY_CODE_NOT_SUPPORTED,
            num_descriptors: 1,
            descriptor_type: DescriptorType::Report,
            descriptor_length: self.config.report_descriptor_length,
        }
        .pack()
    }

    fn is_for_interface(&self, request: &Request) -> bool {
        request.recipient == Recipient::Interface && request.index == u16::from(u8::from(self.id))
    }

    fn get_descriptor(&self, transfer: ControlIn<B>) {
        let request: &Request = transfer.request();
        match DescriptorType::try_from((request.value >> 8) as u8) {
            Ok(DescriptorType::Report) => match transfer.accept_with(self.config.report_descriptor) {
                Err(e) => error!("Failed to send report descriptor - {:?}", e),
                Ok(_) => {
                    trace!("Sent report descriptor");
                }
            },
            Ok(DescriptorType::Hid) => {
                const LEN: u8 = 9;
                let Ok(body) = self.hid_descriptor_body() else {
                    error!("Failed to pack Hid descriptor");
                    transfer.reject().ok();
                    return;
                };
                let mut buffer = [0; LEN as usize];
                buffer[0] = LEN;
                buffer[1] = u8::from(DescriptorType::Hid);
                (buffer[2..LEN as usize]).copy_from_slice(&body);
                match transfer.accept_with(&buffer) {
                    Err(e) => {
                        error!("Failed to send Hid descriptor - {:?}", e);
                    }
                    Ok(_) => {
                        trace!("Sent hid descriptor");
                    }
                }
            }
            _ => {
                warn!(
                    "Unsupported descriptor type, request type:{:?}, request:{}, value:{}",
                    request.request_type, request.request, request.value
                );
            }
        }
    }
}

impl<B: UsbBus> PacketSink for EndpointIn<'_, B> {
    fn send_in_packet(&mut self, _endpoint: u8, data: &[u8]) -> core::result::Result<(), PidError> {
        self.write(data)?;
        Ok(())
    }
}

/// Device-to-host control transfer, answered at most once
struct ControlInPipe<'a, 'p, 'r, B: UsbBus> {
    transfer: Option<ControlIn<'a, 'p, 'r, B>>,
}

impl<B: UsbBus> ControlPipe for ControlInPipe<'_, '_, '_, B> {
    fn send_data(&mut self, data: &[u8]) -> core::result::Result<(), PidError> {
        let transfer = self.transfer.take().ok_or(PidError::UsbError(UsbError::InvalidState))?;
        Ok(transfer.accept_with(data)?)
    }

    fn send_empty_handshake(&mut self) -> core::result::Result<(), PidError> {
        self.send_data(&[])
    }

    fn request_control_read_back(&mut self, _buf: &mut [u8]) -> core::result::Result<usize, PidError> {
        Ok(0)
    }
}

/// Host-to-device control transfer, its data stage is already buffered by usb-device
struct ControlOutPipe<'a, 'p, 'r, B: UsbBus> {
    transfer: Option<ControlOut<'a, 'p, 'r, B>>,
}

impl<B: UsbBus> ControlPipe for ControlOutPipe<'_, '_, '_, B> {
    fn send_data(&mut self, _data: &[u8]) -> core::result::Result<(), PidError> {
        Err(PidError::UsbError(UsbError::InvalidState))
    }

    fn send_empty_handshake(&mut self) -> core::result::Result<(), PidError> {
        let transfer = self.transfer.take().ok_or(PidError::UsbError(UsbError::InvalidState))?;
        Ok(transfer.accept()?)
    }

    fn request_control_read_back(&mut self, buf: &mut [u8]) -> core::result::Result<usize, PidError> {
        let data = self
            .transfer
            .as_ref()
            .map(ControlOut::data)
            .ok_or(PidError::UsbError(UsbError::InvalidState))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

impl<'a, 'q, B> UsbClass<B> for PidClass<'a, 'q, B>
where
    B: UsbBus + 'a,
{
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> Result<()> {
        writer.interface_alt(
            self.id,
            usb_device::device::DEFAULT_ALTERNATE_SETTING,
            USB_CLASS_HID,
            SUBCLASS_NONE,
            PROTOCOL_NONE,
            self.description_index,
        )?;

        //Hid descriptor
        let body = self.hid_descriptor_body().map_err(|_| UsbError::ParseError)?;
        writer.write(DescriptorType::Hid.into(), &body)?;

        //Endpoint descriptors
        writer.endpoint(&self.in_endpoint)?;
        writer.endpoint(&self.out_endpoint)?;

        info!("wrote class config descriptor");
        Ok(())
    }

    fn get_string(&self, index: StringIndex, _lang_id: u16) -> Option<&str> {
        self.description_index
            .filter(|&i| i == index)
            .and(self.config.description)
    }

    fn reset(&mut self) {
        info!("Reset");
        self.handler.reset();
    }

    fn control_out(&mut self, transfer: ControlOut<B>) {
        let request: &Request = transfer.request();

        //only respond to Class requests for this interface
        if !(request.request_type == RequestType::Class && self.is_for_interface(request)) {
            return;
        }

        trace!(
            "ctrl_out: request type: {:?}, request: {}, value: {}",
            request.request_type,
            request.request,
            request.value
        );

        let setup = SetupRequest::from(request);
        let mut pipe = ControlOutPipe {
            transfer: Some(transfer),
        };
        if !self.handler.on_setup(&setup, &mut pipe) {
            if let Some(transfer) = pipe.transfer.take() {
                transfer.reject().ok();
            }
        }
    }

    fn control_in(&mut self, transfer: ControlIn<B>) {
        let request: &Request = transfer.request();
        //only respond to requests for this interface
        if !self.is_for_interface(request) {
            return;
        }

        trace!(
            "ctrl_in: request type: {:?}, request: {}, value: {}",
            request.request_type,
            request.request,
            request.value
        );

        match request.request_type {
            RequestType::Standard => {
                if request.request == Request::GET_DESCRIPTOR {
                    info!("Get descriptor");
                    self.get_descriptor(transfer);
                }
            }
            RequestType::Class => {
                let setup = SetupRequest::from(request);
                let mut pipe = ControlInPipe {
                    transfer: Some(transfer),
                };
                if !self.handler.on_setup(&setup, &mut pipe) {
                    if let Some(transfer) = pipe.transfer.take() {
                        transfer.reject().ok();
                    }
                }
            }
            _ => {}
        }
    }

    fn endpoint_out(&mut self, addr: EndpointAddress) {
        if addr != self.out_endpoint.address() {
            return;
        }

        let mut buf = [0_u8; MAX_REPORT_SIZE];
        match self.out_endpoint.read(&mut buf) {
            Ok(n) => self.handler.on_report_received(&buf[..n], self.now),
            Err(UsbError::WouldBlock) => {}
            Err(e) => error!("Failed to read output report - {:?}", e),
        }
    }

    fn endpoint_in_complete(&mut self, addr: EndpointAddress) {
        if addr == self.in_endpoint.address() {
            self.handler.on_transmit_complete(&mut self.in_endpoint);
        }
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::cell::RefCell;
    use std::sync::Mutex;
    use std::vec::Vec;

    use crate::descriptor::{HidProtocol, HidRequest};
    use crate::queue::OutboundQueue;
    use env_logger::Env;
    use log::SetLoggerError;
    use packed_struct::prelude::*;
    use usb_device::bus::PollResult;
    use usb_device::prelude::*;
    use usb_device::UsbDirection;

    use super::*;

    // Usage page PID, a minimal stand-in for a full joystick descriptor
    const REPORT_DESCRIPTOR: &[u8] = &[
        0x05, 0x0F, 0x09, 0x92, 0xA1, 0x02, 0x85, 0x02, 0x09, 0x9F, 0xC0, 0x00, 0xC0,
    ];

    fn init_logging() {
        let _: core::result::Result<(), SetLoggerError> =
            env_logger::Builder::from_env(Env::default().default_filter_or("trace"))
                .is_test(true)
                .try_init();
    }

    #[derive(Default)]
    struct UsbTestManager {
        in_buf: Mutex<RefCell<Vec<u8>>>,
        out_buf: Mutex<RefCell<Vec<u8>>>,
    }

    impl UsbTestManager {
        fn host_write(&self, data: &[u8]) -> Result<()> {
            let buf = self.out_buf.lock().unwrap();
            if buf.borrow().is_empty() {
                buf.borrow_mut().extend_from_slice(data);
                Ok(())
            } else {
                Err(UsbError::WouldBlock)
            }
        }

        fn host_read_in(&self) -> Vec<u8> {
            self.in_buf.lock().unwrap().take()
        }

        fn has_out_data(&self) -> bool {
            !self.out_buf.lock().unwrap().borrow().is_empty()
        }

        fn device_read(&self, data: &mut [u8]) -> Result<usize> {
            let buf = self.out_buf.lock().unwrap();
            if buf.borrow().is_empty() {
                Err(UsbError::WouldBlock)
            } else {
                let tmp = buf.take();
                data[..tmp.len()].copy_from_slice(&tmp);
                Ok(tmp.len())
            }
        }

        fn device_write(&self, data: &[u8]) -> Result<usize> {
            let buf = self.in_buf.lock().unwrap();
            if buf.borrow().is_empty() {
                buf.borrow_mut().extend_from_slice(data);
                Ok(data.len())
            } else {
                Err(UsbError::WouldBlock)
            }
        }
    }

    struct TestUsbBus<'a> {
        next_ep_index: usize,
        manager: &'a UsbTestManager,
    }

    impl<'a> TestUsbBus<'a> {
        fn new(manager: &'a UsbTestManager) -> Self {
            TestUsbBus {
                next_ep_index: 0,
                manager,
            }
        }
    }

    impl UsbBus for TestUsbBus<'_> {
        fn alloc_ep(
            &mut self,
            ep_dir: UsbDirection,
            _ep_addr: Option<EndpointAddress>,
            _ep_type: EndpointType,
            _max_packet_size: u16,
            _interval: u8,
        ) -> Result<EndpointAddress> {
            let ep = EndpointAddress::from_parts(self.next_ep_index, ep_dir);
            self.next_ep_index += 1;
            Ok(ep)
        }

        fn enable(&mut self) {}
        fn reset(&self) {
            todo!()
        }
        fn set_device_address(&self, _addr: u8) {
            todo!()
        }
        fn write(&self, _ep_addr: EndpointAddress, buf: &[u8]) -> Result<usize> {
            self.manager.device_write(buf)
        }
        fn read(&self, _ep_addr: EndpointAddress, buf: &mut [u8]) -> Result<usize> {
            self.manager.device_read(buf)
        }
        fn set_stalled(&self, _ep_addr: EndpointAddress, _stalled: bool) {}
        fn is_stalled(&self, _ep_addr: EndpointAddress) -> bool {
            todo!()
        }
        fn suspend(&self) {
            todo!()
        }
        fn resume(&self) {
            todo!()
        }
        fn poll(&self) -> PollResult {
            PollResult::Data {
                ep_out: 0,
                ep_in_complete: 1,
                ep_setup: u16::from(self.manager.has_out_data()),
            }
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, PackedStruct)]
    #[packed_struct(endian = "lsb", bit_numbering = "msb0", size_bytes = "8")]
    struct UsbRequest {
        #[packed_field(bits = "0")]
        direction: bool,
        #[packed_field(bits = "1:2")]
        request_type: u8,
        #[packed_field(bits = "4:7")]
        recipient: u8,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    }

    fn class_request(direction: UsbDirection, request: HidRequest, value: u16, length: u16) -> [u8; 8] {
        UsbRequest {
            direction: direction == UsbDirection::In,
            request_type: RequestType::Class as u8,
            recipient: Recipient::Interface as u8,
            request: request.into(),
            value,
            index: 0x0,
            length,
        }
        .pack()
        .unwrap()
    }

    fn get_descriptor(recipient: Recipient, value: u16) -> [u8; 8] {
        UsbRequest {
            direction: true,
            request_type: RequestType::Standard as u8,
            recipient: recipient as u8,
            request: Request::GET_DESCRIPTOR,
            value,
            index: 0,
            length: 0xFFFF,
        }
        .pack()
        .unwrap()
    }

    fn read_all<B: UsbBus>(
        manager: &UsbTestManager,
        usb_dev: &mut UsbDevice<B>,
        pid: &mut PidClass<B>,
    ) -> Vec<u8> {
        let mut data = Vec::new();
        loop {
            let read = manager.host_read_in();
            if read.is_empty() {
                break;
            }
            data.extend_from_slice(&read);
            assert!(usb_dev.poll(&mut [&mut *pid]));
        }
        data
    }

    #[test]
    fn descriptor_ordering() {
        init_logging();

        let manager = UsbTestManager::default();
        let queue = OutboundQueue::new(0);
        let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

        let mut pid = PidClassBuilder::new(REPORT_DESCRIPTOR)
            .unwrap()
            .build(&usb_alloc, PidHandler::new(&queue));

        let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x1209, 0x0001)).build();

        // Get Configuration
        manager
            .host_write(&get_descriptor(
                Recipient::Device,
                u16::from(usb_device::descriptor::descriptor_type::CONFIGURATION) << 8,
            ))
            .unwrap();

        assert!(usb_dev.poll(&mut [&mut pid]));
        let data = read_all(&manager, &mut usb_dev, &mut pid);

        let mut it = data.iter();

        let len = *it.next().unwrap();
        assert_eq!(*(it.next().unwrap()), 0x02, "Expected Configuration descriptor");
        for _ in 0..(len - 2) {
            it.next().unwrap();
        }

        let len = *it.next().unwrap();
        assert_eq!(*it.next().unwrap(), 0x04, "Expected Interface descriptor");
        let interface: Vec<u8> = it.by_ref().take(usize::from(len - 2)).copied().collect();
        assert_eq!(interface[3], USB_CLASS_HID, "Expected HID interface class");

        let len = *it.next().unwrap();
        assert_eq!(*(it.next().unwrap()), 0x21, "Expected Hid descriptor");
        let hid: Vec<u8> = it.by_ref().take(usize::from(len - 2)).copied().collect();
        assert_eq!(
            hid,
            [0x11, 0x01, 0x00, 0x01, 0x22, REPORT_DESCRIPTOR.len() as u8, 0x00]
        );

        let mut endpoints = 0;
        while let Some(&len) = it.next() {
            assert_eq!(*(it.next().unwrap()), 0x05, "Expected Endpoint descriptor");
            endpoints += 1;
            for _ in 0..(len - 2) {
                it.next().unwrap();
            }
        }
        assert_eq!(endpoints, 2, "Expected interrupt IN and OUT endpoints");
    }

    #[test]
    fn get_report_descriptor() {
        init_logging();

        let manager = UsbTestManager::default();
        let queue = OutboundQueue::new(0);
        let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

        let mut pid = PidClassBuilder::new(REPORT_DESCRIPTOR)
            .unwrap()
            .build(&usb_alloc, PidHandler::new(&queue));

        let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x1209, 0x0001)).build();

        manager
            .host_write(&get_descriptor(
                Recipient::Interface,
                u16::from(u8::from(DescriptorType::Report)) << 8,
            ))
            .unwrap();

        assert!(usb_dev.poll(&mut [&mut pid]));
        assert_eq!(read_all(&manager, &mut usb_dev, &mut pid), REPORT_DESCRIPTOR);
    }

    #[test]
    fn get_protocol_default_to_report() {
        init_logging();

        let manager = UsbTestManager::default();
        let queue = OutboundQueue::new(0);
        let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

        let mut pid = PidClassBuilder::new(REPORT_DESCRIPTOR)
            .unwrap()
            .build(&usb_alloc, PidHandler::new(&queue));

        let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x1209, 0x0001)).build();

        manager
            .host_write(&class_request(UsbDirection::In, HidRequest::GetProtocol, 0, 1))
            .unwrap();

        assert!(usb_dev.poll(&mut [&mut pid]));

        let data = manager.host_read_in();
        assert_eq!(
            data,
            [HidProtocol::Report.into()],
            "Expected protocol to be Report by default"
        );
    }

    #[test]
    fn get_protocol_default_post_reset() {
        init_logging();

        let manager = UsbTestManager::default();
        let queue = OutboundQueue::new(0);
        let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

        let mut pid = PidClassBuilder::new(REPORT_DESCRIPTOR)
            .unwrap()
            .build(&usb_alloc, PidHandler::new(&queue));

        let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x1209, 0x0001)).build();

        // Set protocol to boot
        manager
            .host_write(&class_request(
                UsbDirection::Out,
                HidRequest::SetProtocol,
                HidProtocol::Boot as u16,
                0,
            ))
            .unwrap();
        assert!(usb_dev.poll(&mut [&mut pid]));
        assert_eq!(pid.handler().protocol(), HidProtocol::Boot);

        // simulate a bus reset after setting protocol to boot
        pid.reset();

        manager
            .host_write(&class_request(UsbDirection::In, HidRequest::GetProtocol, 0, 1))
            .unwrap();
        assert!(usb_dev.poll(&mut [&mut pid]));

        let data = manager.host_read_in();
        assert_eq!(
            data,
            [HidProtocol::Report.into()],
            "Expected protocol to be Report post reset"
        );
    }

    #[test]
    fn set_idle_get_idle() {
        init_logging();

        let manager = UsbTestManager::default();
        let queue = OutboundQueue::new(0);
        let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

        let mut pid = PidClassBuilder::new(REPORT_DESCRIPTOR)
            .unwrap()
            .build(&usb_alloc, PidHandler::new(&queue));

        let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x1209, 0x0001)).build();

        manager
            .host_write(&class_request(UsbDirection::Out, HidRequest::SetIdle, 0x0400, 0))
            .unwrap();
        assert!(usb_dev.poll(&mut [&mut pid]));

        manager
            .host_write(&class_request(UsbDirection::In, HidRequest::GetIdle, 0, 1))
            .unwrap();
        assert!(usb_dev.poll(&mut [&mut pid]));

        assert_eq!(manager.host_read_in(), [0x04]);
    }

    #[test]
    fn get_pool_feature_report() {
        init_logging();

        let manager = UsbTestManager::default();
        let queue = OutboundQueue::new(0);
        let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

        let mut pid = PidClassBuilder::new(REPORT_DESCRIPTOR)
            .unwrap()
            .build(&usb_alloc, PidHandler::new(&queue));

        let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x1209, 0x0001)).build();

        manager
            .host_write(&class_request(UsbDirection::In, HidRequest::GetReport, 0x0307, 5))
            .unwrap();
        assert!(usb_dev.poll(&mut [&mut pid]));

        assert_eq!(manager.host_read_in(), [0x07, 0x80, 0x03, 0x0E, 0x03]);
    }

    #[test]
    fn output_reports_reach_handler() {
        init_logging();

        let manager = UsbTestManager::default();
        let queue = OutboundQueue::new(0);
        let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

        let mut pid = PidClassBuilder::new(REPORT_DESCRIPTOR)
            .unwrap()
            .build(&usb_alloc, PidHandler::new(&queue));
        let _usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x1209, 0x0001)).build();

        pid.update(MillisInstant::from_ticks(10));
        manager.host_write(&[0x0D, 0x20]).unwrap();
        let out = pid.out_endpoint_address();
        pid.endpoint_out(out);

        assert_eq!(pid.handler().device().gain, 0x20);
    }

    #[test]
    fn input_reports_are_queued_on_in_endpoint() {
        init_logging();

        let manager = UsbTestManager::default();
        let queue = OutboundQueue::new(0);
        let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

        let mut pid = PidClassBuilder::new(REPORT_DESCRIPTOR)
            .unwrap()
            .build(&usb_alloc, PidHandler::new(&queue));
        let _usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x1209, 0x0001)).build();

        pid.send_report(0x01, &[0x7F, 0x80]).unwrap();
        pid.send_status(0).unwrap();
        assert_eq!(manager.host_read_in(), [0x01, 0x7F, 0x80]);
        assert!(manager.host_read_in().is_empty());

        let address = pid.in_endpoint_address();
        pid.endpoint_in_complete(address);
        assert_eq!(manager.host_read_in(), [0x02, 0x12, 0x00]);
    }

    #[test]
    fn builder_limits() {
        init_logging();

        let too_long = vec![0_u8; usize::from(u16::MAX) + 1];
        assert_eq!(
            PidClassBuilder::new(&too_long),
            Err(PidClassBuilderError::SliceLengthOverflow)
        );

        let builder = PidClassBuilder::new(REPORT_DESCRIPTOR).unwrap();
        assert_eq!(
            builder.in_endpoint(MillisDurationU32::millis(256)),
            Err(PidClassBuilderError::ValueOverflow)
        );
        assert_eq!(
            builder.out_endpoint(MillisDurationU32::millis(256)),
            Err(PidClassBuilderError::ValueOverflow)
        );
        assert!(builder
            .description("FFB")
            .in_endpoint(MillisDurationU32::millis(10))
            .is_ok());
    }
}
