//! Region-of-interest packing shared by the AE and AF machines.
//!
//! A ROI travels over the command surface as four bytes,
//! `x1 << 24 | y1 << 16 | x2 << 8 | y2`, in units of 1/255 of the frame.

use crate::stats::{ZONES, ZONES_HOR, ZONES_VERT};

/// Zone weight used inside a ROI.
pub const ROI_WEIGHT_MAX: u8 = 15;

/// Rectangle in 0..=255 frame units.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Roi {
    pub x1: u8,
    pub y1: u8,
    pub x2: u8,
    pub y2: u8,
}

impl Roi {
    /// The whole frame.
    pub const FULL: Self = Self {
        x1: 0,
        y1: 0,
        x2: 0xFF,
        y2: 0xFF,
    };

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        let [x1, y1, x2, y2] = raw.to_be_bytes();
        Self { x1, y1, x2, y2 }
    }

    #[must_use]
    pub const fn to_raw(self) -> u32 {
        u32::from_be_bytes([self.x1, self.y1, self.x2, self.y2])
    }

    /// Non-empty in both directions.
    #[must_use]
    pub const fn is_strictly_ordered(self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }

    /// Ordered, allowing a single-column or single-row window.
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        self.x2 >= self.x1 && self.y2 >= self.y1
    }

    /// Mirrors the rectangle vertically, as seen by a flipped DMA writer.
    #[must_use]
    pub const fn flipped(self, vflip: bool) -> Self {
        if vflip {
            Self {
                x1: self.x1,
                y1: 0xFF - self.y2,
                x2: self.x2,
                y2: 0xFF - self.y1,
            }
        } else {
            self
        }
    }

    /// Zone index range `[start, end)` covered along one axis.
    fn zone_span(start: u8, end: u8, zones: usize) -> (usize, usize) {
        let first = usize::from(start) * zones / 256;
        let last = (usize::from(end) * zones).div_ceil(256).max(first + 1);
        (first, last.min(zones))
    }

    /// Expands the rectangle into a metering weight map.
    #[must_use]
    pub fn zone_weights(self) -> [u8; ZONES] {
        let mut weights = [0; ZONES];
        let (x_first, x_last) = Self::zone_span(self.x1, self.x2, ZONES_HOR);
        let (y_first, y_last) = Self::zone_span(self.y1, self.y2, ZONES_VERT);
        for row in y_first..y_last {
            for col in x_first..x_last {
                weights[row * ZONES_HOR + col] = ROI_WEIGHT_MAX;
            }
        }
        weights
    }

    /// Whether zone `(col, row)` falls inside the rectangle.
    #[must_use]
    pub fn contains_zone(self, col: usize, row: usize) -> bool {
        let (x_first, x_last) = Self::zone_span(self.x1, self.x2, ZONES_HOR);
        let (y_first, y_last) = Self::zone_span(self.y1, self.y2, ZONES_VERT);
        (x_first..x_last).contains(&col) && (y_first..y_last).contains(&row)
    }
}

impl Default for Roi {
    fn default() -> Self {
        Self::FULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_corners_high_byte_first() {
        let roi = Roi::from_raw(0x1020_3040);
        assert_eq!(
            roi,
            Roi {
                x1: 0x10,
                y1: 0x20,
                x2: 0x30,
                y2: 0x40
            }
        );
        assert_eq!(roi.to_raw(), 0x1020_3040);
    }

    #[test]
    fn vflip_mirrors_rows() {
        let roi = Roi::from_raw(0x0010_20F0).flipped(true);
        assert_eq!(roi.y1, 0x0F);
        assert_eq!(roi.y2, 0xEF);
        assert_eq!(roi.x1, 0x00);
        assert_eq!(roi.flipped(false), roi);
    }

    #[test]
    fn full_frame_weights_every_zone() {
        assert!(Roi::FULL.zone_weights().iter().all(|w| *w == ROI_WEIGHT_MAX));
    }

    #[test]
    fn centre_window_leaves_border_unweighted() {
        let weights = Roi::from_raw(0x5555_AAAA).zone_weights();
        assert_eq!(weights[0], 0);
        assert_eq!(weights[ZONES - 1], 0);
        assert_eq!(weights[7 * ZONES_HOR + 7], ROI_WEIGHT_MAX);
        assert!(Roi::from_raw(0x5555_AAAA).contains_zone(7, 7));
    }

    #[test]
    fn ordering_checks_differ_on_degenerate_windows() {
        let line = Roi::from_raw(0x1010_1020);
        assert!(line.is_ordered());
        assert!(!line.is_strictly_ordered());
    }
}
