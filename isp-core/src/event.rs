//! Event identifiers and the interrupt-safe FIFO that carries them.
//!
//! Interrupt handlers push events without blocking; the task-side drain pops
//! them one at a time inside a short critical section so producers are only
//! held off for the duration of a single pop.

use core::cell::{Cell, RefCell};
use core::fmt;

use critical_section::Mutex;
use heapless::Deque;

/// Default queue depth for a context.
pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 32;

/// Discrete conditions consumed by the state machines.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Event {
    ResetSensorHw,
    AeStatsReady,
    AfStatsReady,
    AfRefocus,
    AwbStatsReady,
    AntiflickerChanged,
    CropUpdated,
    FrameBufReinit,
    FrameBufferDsReady,
    FrameBufferFrReady,
    FrameBufferMetadata,
    FrameEnd,
    SensorNotReady,
    SensorReady,
    SensorSwReset,
    SharpLutUpdate,
    UpdateIridix,
}

impl Event {
    /// All events, in discriminant order.
    pub const ALL: [Event; 17] = [
        Event::ResetSensorHw,
        Event::AeStatsReady,
        Event::AfStatsReady,
        Event::AfRefocus,
        Event::AwbStatsReady,
        Event::AntiflickerChanged,
        Event::CropUpdated,
        Event::FrameBufReinit,
        Event::FrameBufferDsReady,
        Event::FrameBufferFrReady,
        Event::FrameBufferMetadata,
        Event::FrameEnd,
        Event::SensorNotReady,
        Event::SensorReady,
        Event::SensorSwReset,
        Event::SharpLutUpdate,
        Event::UpdateIridix,
    ];

    /// Encodes the event as a compact numeric code.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        self as u8
    }

    /// Decodes a numeric code produced by [`Event::to_raw`].
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(usize::from(raw)).copied()
    }

    /// Events that still flow while the firmware is frozen so frame buffers keep moving.
    #[must_use]
    pub const fn passes_freeze(self) -> bool {
        matches!(
            self,
            Event::FrameBufferFrReady
                | Event::FrameBufferDsReady
                | Event::FrameBufferMetadata
        )
    }

    /// Short label used by logs and the console.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Event::ResetSensorHw => "reset-sensor-hw",
            Event::AeStatsReady => "ae-stats-ready",
            Event::AfStatsReady => "af-stats-ready",
            Event::AfRefocus => "af-refocus",
            Event::AwbStatsReady => "awb-stats-ready",
            Event::AntiflickerChanged => "antiflicker-changed",
            Event::CropUpdated => "crop-updated",
            Event::FrameBufReinit => "frame-buf-reinit",
            Event::FrameBufferDsReady => "frame-buffer-ds-ready",
            Event::FrameBufferFrReady => "frame-buffer-fr-ready",
            Event::FrameBufferMetadata => "frame-buffer-metadata",
            Event::FrameEnd => "frame-end",
            Event::SensorNotReady => "sensor-not-ready",
            Event::SensorReady => "sensor-ready",
            Event::SensorSwReset => "sensor-sw-reset",
            Event::SharpLutUpdate => "sharp-lut-update",
            Event::UpdateIridix => "update-iridix",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error surfaced when an event cannot be queued.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum QueueError {
    /// Queue has reached its maximum capacity; the event was dropped.
    Full(Event),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Bounded FIFO shared between interrupt and task context.
pub struct EventQueue<const N: usize = DEFAULT_EVENT_QUEUE_DEPTH> {
    inner: Mutex<RefCell<Deque<Event, N>>>,
    dropped: Mutex<Cell<u32>>,
}

impl<const N: usize> EventQueue<N> {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Deque::new())),
            dropped: Mutex::new(Cell::new(0)),
        }
    }

    /// Appends an event without blocking. A full queue drops the event and counts it.
    pub fn push(&self, event: Event) -> Result<(), QueueError> {
        let result = critical_section::with(|cs| {
            self.inner
                .borrow_ref_mut(cs)
                .push_back(event)
                .map_err(QueueError::Full)
        });

        if result.is_err() {
            let dropped = critical_section::with(|cs| {
                let counter = self.dropped.borrow(cs);
                let next = counter.get().saturating_add(1);
                counter.set(next);
                next
            });
            isp_error!(
                "event queue full, dropping {} (dropped={})",
                event.label(),
                dropped
            );
        }

        result
    }

    /// Removes the oldest event. Producers are held off only for this call.
    pub fn pop(&self) -> Option<Event> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pop_front())
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).is_empty())
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).len())
    }

    /// Maximum number of pending events.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of events dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u32 {
        critical_section::with(|cs| self.dropped.borrow(cs).get())
    }

    /// Discards every pending event.
    pub fn clear(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).clear());
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_push_order() {
        let queue: EventQueue<8> = EventQueue::new();
        let pushed = [
            Event::FrameEnd,
            Event::AeStatsReady,
            Event::SensorReady,
            Event::FrameEnd,
            Event::CropUpdated,
        ];

        for event in pushed {
            queue.push(event).expect("queue has room");
        }

        let mut popped = heapless::Vec::<Event, 8>::new();
        while let Some(event) = queue.pop() {
            popped.push(event).expect("room for popped events");
        }

        assert_eq!(popped.as_slice(), &pushed);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_drops_newest_and_counts() {
        let queue: EventQueue<2> = EventQueue::new();
        queue.push(Event::FrameEnd).expect("first push");
        queue.push(Event::AfRefocus).expect("second push");

        assert_eq!(
            queue.push(Event::SensorReady),
            Err(QueueError::Full(Event::SensorReady))
        );
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop(), Some(Event::FrameEnd));
        assert_eq!(queue.pop(), Some(Event::AfRefocus));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn raw_codes_round_trip() {
        for event in Event::ALL {
            assert_eq!(Event::from_raw(event.to_raw()), Some(event));
        }
        assert_eq!(Event::from_raw(200), None);
    }

    #[test]
    fn only_frame_buffer_events_pass_freeze() {
        assert!(Event::FrameBufferFrReady.passes_freeze());
        assert!(Event::FrameBufferMetadata.passes_freeze());
        assert!(!Event::FrameEnd.passes_freeze());
        assert!(!Event::AeStatsReady.passes_freeze());
    }
}
