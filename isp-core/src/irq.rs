//! ISP interrupt sources and the per-machine request masks.

use core::fmt;

/// Interrupt lines the control plane reacts to. Discriminants are bit positions
/// in the hardware status vector.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Irq {
    FrameStart = 0,
    FrameEnd = 1,
    AeStats = 2,
    AwbStats = 3,
    AfStats = 4,
    AntifogHist = 5,
    FrameWriterFr = 6,
    FrameWriterDs = 7,
    BrokenFrame = 8,
    DmaError = 9,
    WatchdogExpired = 10,
    FrameCollision = 11,
}

impl Irq {
    /// Lines scanned from the highest bit down, as the status vector is serviced.
    pub const ALL: [Irq; 12] = [
        Irq::FrameCollision,
        Irq::WatchdogExpired,
        Irq::DmaError,
        Irq::BrokenFrame,
        Irq::FrameWriterDs,
        Irq::FrameWriterFr,
        Irq::AntifogHist,
        Irq::AfStats,
        Irq::AwbStats,
        Irq::AeStats,
        Irq::FrameEnd,
        Irq::FrameStart,
    ];

    /// Bit position inside the status vector.
    #[must_use]
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Single-bit mask for this line.
    #[must_use]
    pub const fn mask(self) -> u32 {
        1 << self.bit()
    }

    /// Decodes a bit position.
    #[must_use]
    pub fn from_bit(bit: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|irq| irq.bit() == bit)
    }

    /// Error lines that indicate the pipeline must be recovered.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(
            self,
            Irq::BrokenFrame | Irq::DmaError | Irq::WatchdogExpired | Irq::FrameCollision
        )
    }

    /// Lines delivered to the machines even while the firmware is frozen.
    #[must_use]
    pub const fn passes_freeze(self) -> bool {
        matches!(
            self,
            Irq::FrameStart | Irq::FrameEnd | Irq::FrameWriterFr | Irq::FrameWriterDs
        )
    }

    /// Iterates the lines set in a raw status vector, highest bit first.
    pub fn iter_vector(vector: u32) -> impl Iterator<Item = Irq> {
        Self::ALL
            .into_iter()
            .filter(move |irq| vector & irq.mask() != 0)
    }
}

impl fmt::Display for Irq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Interrupts a machine has asked to see.
///
/// A line outside `irq_mask` is ignored. Delivered lines are cleared unless they
/// are also in `repeat_irq_mask`, so one-shot requests must be re-armed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IrqMask {
    pub irq_mask: u32,
    pub repeat_irq_mask: u32,
}

impl IrqMask {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            irq_mask: 0,
            repeat_irq_mask: 0,
        }
    }

    /// Mask that keeps every listed line armed permanently.
    #[must_use]
    pub const fn repeating(mask: u32) -> Self {
        Self {
            irq_mask: mask,
            repeat_irq_mask: mask,
        }
    }

    /// Arms the listed lines for their next occurrence.
    pub fn request(&mut self, mask: u32) {
        self.irq_mask |= mask;
    }

    /// Returns `true` when the line should be skipped. Consumes one-shot requests.
    pub fn is_ignored(&mut self, irq: Irq) -> bool {
        let bit = irq.mask();
        if self.irq_mask & bit == 0 {
            return true;
        }
        if self.repeat_irq_mask & bit == 0 {
            self.irq_mask &= !bit;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_request_is_consumed() {
        let mut mask = IrqMask::new();
        assert!(mask.is_ignored(Irq::FrameEnd));

        mask.request(Irq::FrameEnd.mask());
        assert!(!mask.is_ignored(Irq::FrameEnd));
        assert!(mask.is_ignored(Irq::FrameEnd));
    }

    #[test]
    fn repeating_request_stays_armed() {
        let mut mask = IrqMask::repeating(Irq::AeStats.mask());
        assert!(!mask.is_ignored(Irq::AeStats));
        assert!(!mask.is_ignored(Irq::AeStats));
        assert!(mask.is_ignored(Irq::AwbStats));
    }

    #[test]
    fn vector_iterates_highest_bit_first() {
        let vector = Irq::FrameStart.mask() | Irq::AeStats.mask() | Irq::FrameWriterFr.mask();
        let mut iter = Irq::iter_vector(vector);
        assert_eq!(iter.next(), Some(Irq::FrameWriterFr));
        assert_eq!(iter.next(), Some(Irq::AeStats));
        assert_eq!(iter.next(), Some(Irq::FrameStart));
        assert_eq!(iter.next(), None);
    }
}
