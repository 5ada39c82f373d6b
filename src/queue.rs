//! Single flight packet queue in front of the interrupt IN endpoint
use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;
use log::{error, trace, warn};

use crate::report::Frame;
use crate::{PacketSink, PidError};

pub const QUEUE_CAPACITY: usize = 8;

struct QueueState {
    frames: Deque<Frame, QUEUE_CAPACITY>,
    in_flight: bool,
}

/// Serializes frames onto one IN endpoint. Shared between the main context, which enqueues, and the
/// transfer complete interrupt, which drains.
pub struct OutboundQueue {
    endpoint: u8,
    state: Mutex<RefCell<QueueState>>,
}

impl OutboundQueue {
    #[must_use]
    pub const fn new(endpoint: u8) -> Self {
        Self {
            endpoint,
            state: Mutex::new(RefCell::new(QueueState {
                frames: Deque::new(),
                in_flight: false,
            })),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    /// Send `frame` straight away when the endpoint is idle, otherwise queue it behind the frames already waiting
    pub fn enqueue(&self, frame: Frame, sink: &mut dyn PacketSink) -> Result<(), PidError> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();

            if state.in_flight || !state.frames.is_empty() {
                return state.frames.push_back(frame).map_err(|dropped| {
                    warn!("Outbound queue full, dropping report id={:#04X}", frame_id(&dropped));
                    PidError::QueueFull
                });
            }

            sink.send_in_packet(self.endpoint, &frame).map_err(|e| {
                error!("Failed to send report id={:#04X}: {:?}", frame_id(&frame), e);
                e
            })?;
            state.in_flight = true;
            Ok(())
        })
    }

    /// Release the in flight slot and start the oldest queued frame, returns `true` if a transmission started
    pub fn on_transmit_complete(&self, sink: &mut dyn PacketSink) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            state.in_flight = false;

            while let Some(frame) = state.frames.pop_front() {
                match sink.send_in_packet(self.endpoint, &frame) {
                    Ok(()) => {
                        trace!("Sent queued report id={:#04X}", frame_id(&frame));
                        state.in_flight = true;
                        return true;
                    }
                    Err(e) => {
                        error!("Failed to send queued report id={:#04X}: {:?}", frame_id(&frame), e);
                    }
                }
            }
            false
        })
    }

    /// Drop queued frames and forget the in flight one
    pub fn clear(&self) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            state.frames.clear();
            state.in_flight = false;
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.state.borrow(cs).borrow().frames.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        critical_section::with(|cs| self.state.borrow(cs).borrow().in_flight)
    }
}

fn frame_id(frame: &Frame) -> u8 {
    frame.first().copied().unwrap_or_default()
}
