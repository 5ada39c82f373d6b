//! Ordered table of HID handlers sharing one interrupt IN completion and control pipe
use heapless::Vec;
use log::{trace, warn};
use usb_device::control::{Recipient, RequestType};
use usb_device::UsbDirection;

use crate::descriptor::HidRequest;
use crate::handler::{PidHandler, SetupRequest};
use crate::{ControlPipe, MillisInstant, PacketSink, PidError};

pub const MAX_HANDLERS: usize = 5;

/// A handler interested in interrupt IN completions
pub trait TransmitHandler {
    /// Returns `true` if this handler started a new transmission
    fn on_transmit_complete(&mut self, sink: &mut dyn PacketSink) -> bool;
}

/// A handler that also consumes OUT reports and class requests
pub trait ReportReceiver: TransmitHandler {
    fn on_report_received(&mut self, data: &[u8], now: MillisInstant);
    fn on_setup(&mut self, request: &SetupRequest, pipe: &mut dyn ControlPipe) -> bool;
}

impl TransmitHandler for PidHandler<'_> {
    fn on_transmit_complete(&mut self, sink: &mut dyn PacketSink) -> bool {
        PidHandler::on_transmit_complete(self, sink)
    }
}

impl ReportReceiver for PidHandler<'_> {
    fn on_report_received(&mut self, data: &[u8], now: MillisInstant) {
        PidHandler::on_report_received(self, data, now);
    }

    fn on_setup(&mut self, request: &SetupRequest, pipe: &mut dyn ControlPipe) -> bool {
        PidHandler::on_setup(self, request, pipe)
    }
}

pub enum Handler<'a> {
    WithReceiver(&'a mut dyn ReportReceiver),
    WithoutReceiver(&'a mut dyn TransmitHandler),
}

impl Handler<'_> {
    fn on_transmit_complete(&mut self, sink: &mut dyn PacketSink) -> bool {
        match self {
            Handler::WithReceiver(h) => h.on_transmit_complete(sink),
            Handler::WithoutReceiver(h) => h.on_transmit_complete(sink),
        }
    }
}

#[derive(Default)]
pub struct HandlerRegistry<'a> {
    handlers: Vec<Handler<'a>, MAX_HANDLERS>,
}

impl<'a> HandlerRegistry<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: Handler<'a>) -> Result<(), PidError> {
        self.handlers.push(handler).map_err(|_| {
            warn!("Handler registry full");
            PidError::RegistryFull
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Offer the completion to each handler in registration order, stopping at the first that claims it
    pub fn on_transmit_complete(&mut self, sink: &mut dyn PacketSink) -> bool {
        self.handlers
            .iter_mut()
            .any(|h| h.on_transmit_complete(sink))
    }

    fn receiver(&mut self) -> Option<&mut (dyn ReportReceiver + 'a)> {
        match self.handlers.first_mut() {
            Some(Handler::WithReceiver(h)) => Some(&mut **h),
            _ => None,
        }
    }

    pub fn on_report_received(&mut self, data: &[u8], now: MillisInstant) {
        match self.receiver() {
            Some(receiver) => receiver.on_report_received(data, now),
            None => trace!("No receiver for report of {} bytes", data.len()),
        }
    }

    pub fn on_setup(&mut self, request: &SetupRequest, pipe: &mut dyn ControlPipe) -> bool {
        if let Some(receiver) = self.receiver() {
            return receiver.on_setup(request, pipe);
        }

        let is_set_idle = request.direction == UsbDirection::Out
            && request.request_type == RequestType::Class
            && request.recipient == Recipient::Interface
            && HidRequest::try_from(request.request).map_or(false, |r| r == HidRequest::SetIdle);

        is_set_idle && pipe.send_empty_handshake().is_ok()
    }
}

#[cfg(test)]
mod test {
    use env_logger::Env;
    use std::vec::Vec;

    use super::*;
    use crate::queue::OutboundQueue;

    fn init_logging() {
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or("trace"))
            .is_test(true)
            .try_init();
    }

    struct NullSink;

    impl PacketSink for NullSink {
        fn send_in_packet(&mut self, _endpoint: u8, _data: &[u8]) -> Result<(), PidError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct TestPipe {
        handshakes: usize,
    }

    impl ControlPipe for TestPipe {
        fn send_data(&mut self, _data: &[u8]) -> Result<(), PidError> {
            Ok(())
        }

        fn send_empty_handshake(&mut self) -> Result<(), PidError> {
            self.handshakes += 1;
            Ok(())
        }

        fn request_control_read_back(&mut self, _buf: &mut [u8]) -> Result<usize, PidError> {
            Ok(0)
        }
    }

    struct CountingHandler {
        claims: bool,
        calls: usize,
    }

    impl CountingHandler {
        fn new(claims: bool) -> Self {
            Self { claims, calls: 0 }
        }
    }

    impl TransmitHandler for CountingHandler {
        fn on_transmit_complete(&mut self, _sink: &mut dyn PacketSink) -> bool {
            self.calls += 1;
            self.claims
        }
    }

    #[derive(Default)]
    struct RecordingReceiver {
        reports: Vec<Vec<u8>>,
        setups: usize,
    }

    impl TransmitHandler for RecordingReceiver {
        fn on_transmit_complete(&mut self, _sink: &mut dyn PacketSink) -> bool {
            false
        }
    }

    impl ReportReceiver for RecordingReceiver {
        fn on_report_received(&mut self, data: &[u8], _now: MillisInstant) {
            self.reports.push(data.to_vec());
        }

        fn on_setup(&mut self, _request: &SetupRequest, _pipe: &mut dyn ControlPipe) -> bool {
            self.setups += 1;
            true
        }
    }

    fn set_idle() -> SetupRequest {
        SetupRequest {
            direction: UsbDirection::Out,
            request_type: RequestType::Class,
            recipient: Recipient::Interface,
            request: HidRequest::SetIdle.into(),
            value: 0,
            index: 0,
            length: 0,
        }
    }

    #[test]
    fn transmit_complete_stops_at_first_claim() {
        init_logging();
        let mut first = CountingHandler::new(false);
        let mut second = CountingHandler::new(true);
        let mut third = CountingHandler::new(true);

        let mut registry = HandlerRegistry::new();
        registry.register(Handler::WithoutReceiver(&mut first)).unwrap();
        registry.register(Handler::WithoutReceiver(&mut second)).unwrap();
        registry.register(Handler::WithoutReceiver(&mut third)).unwrap();

        assert!(registry.on_transmit_complete(&mut NullSink));
        drop(registry);

        assert_eq!(first.calls, 1);
        assert_eq!(second.calls, 1);
        assert_eq!(third.calls, 0);
    }

    #[test]
    fn transmit_complete_unclaimed() {
        init_logging();
        let mut first = CountingHandler::new(false);
        let mut receiver = RecordingReceiver::default();

        let mut registry = HandlerRegistry::new();
        registry.register(Handler::WithReceiver(&mut receiver)).unwrap();
        registry.register(Handler::WithoutReceiver(&mut first)).unwrap();

        assert!(!registry.on_transmit_complete(&mut NullSink));
        drop(registry);
        assert_eq!(first.calls, 1);
    }

    #[test]
    fn register_past_capacity() {
        init_logging();
        let mut handlers: Vec<CountingHandler> =
            (0..=MAX_HANDLERS).map(|_| CountingHandler::new(false)).collect();
        let mut registry = HandlerRegistry::new();
        let mut iter = handlers.iter_mut();

        for handler in iter.by_ref().take(MAX_HANDLERS) {
            registry.register(Handler::WithoutReceiver(handler)).unwrap();
        }
        let last = iter.next().unwrap();
        assert_eq!(
            registry.register(Handler::WithoutReceiver(last)),
            Err(PidError::RegistryFull)
        );
        assert_eq!(registry.len(), MAX_HANDLERS);
    }

    #[test]
    fn first_receiver_gets_reports_and_setup() {
        init_logging();
        let mut receiver = RecordingReceiver::default();
        let mut pipe = TestPipe::default();

        let mut registry = HandlerRegistry::new();
        registry.register(Handler::WithReceiver(&mut receiver)).unwrap();

        registry.on_report_received(&[0x0D, 0x80], MillisInstant::from_ticks(0));
        assert!(registry.on_setup(&set_idle(), &mut pipe));
        drop(registry);

        assert_eq!(receiver.reports, vec![vec![0x0D, 0x80]]);
        assert_eq!(receiver.setups, 1);
        assert_eq!(pipe.handshakes, 0);
    }

    #[test]
    fn default_setup_only_acknowledges_set_idle() {
        init_logging();
        let mut first = CountingHandler::new(false);
        let mut receiver = RecordingReceiver::default();
        let mut pipe = TestPipe::default();

        let mut registry = HandlerRegistry::new();
        registry.register(Handler::WithoutReceiver(&mut first)).unwrap();
        registry.register(Handler::WithReceiver(&mut receiver)).unwrap();

        assert!(registry.on_setup(&set_idle(), &mut pipe));

        let mut get_idle = set_idle();
        get_idle.direction = UsbDirection::In;
        get_idle.request = HidRequest::GetIdle.into();
        assert!(!registry.on_setup(&get_idle, &mut pipe));

        registry.on_report_received(&[0x0D, 0x80], MillisInstant::from_ticks(0));
        drop(registry);

        assert_eq!(pipe.handshakes, 1);
        assert!(receiver.reports.is_empty());
        assert_eq!(receiver.setups, 0);
    }

    #[test]
    fn empty_registry() {
        init_logging();
        let mut registry = HandlerRegistry::new();
        let mut pipe = TestPipe::default();

        assert!(registry.is_empty());
        assert!(!registry.on_transmit_complete(&mut NullSink));
        assert!(registry.on_setup(&set_idle(), &mut pipe));
    }

    #[test]
    fn pid_handler_as_receiver() {
        init_logging();
        let queue = OutboundQueue::new(1);
        let mut pid = PidHandler::new(&queue);
        let mut pipe = TestPipe::default();

        let mut registry = HandlerRegistry::new();
        registry.register(Handler::WithReceiver(&mut pid)).unwrap();

        registry.on_report_received(&[0x0D, 0x40], MillisInstant::from_ticks(0));
        let mut request = set_idle();
        request.value = 0x0500;
        assert!(registry.on_setup(&request, &mut pipe));
        drop(registry);

        assert_eq!(pid.device().gain, 0x40);
        assert_eq!(pid.idle(), 0x05);
    }
}
