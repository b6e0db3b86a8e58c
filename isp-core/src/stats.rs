//! Per-frame statistics snapshot.
//!
//! The hardware exposes metering results in memory that is only valid until the
//! next frame. The firmware copies it into a [`FrameStats`] before fanning out
//! the matching interrupt, so machines read a stable snapshot from task context.

/// Bins in the global AE histogram.
pub const HISTOGRAM_BINS: usize = 1024;

/// Horizontal metering zones.
pub const ZONES_HOR: usize = 15;

/// Vertical metering zones.
pub const ZONES_VERT: usize = 15;

/// Total metering zones.
pub const ZONES: usize = ZONES_HOR * ZONES_VERT;

/// Expands a 4.12 companded histogram bin.
#[must_use]
pub const fn decompress_bin(raw: u16) -> u32 {
    let shift = (raw >> 12) & 0xF;
    let mantissa = (raw & 0xFFF) as u32;
    if shift == 0 {
        mantissa
    } else {
        (mantissa | 0x1000) << (shift - 1)
    }
}

/// Compresses a bin count into 4.12 format, truncating low bits.
///
/// Counts beyond the representable range saturate at `0xFFFF`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn compress_bin(value: u32) -> u16 {
    if value < 0x1000 {
        return value as u16;
    }

    let msb = 31 - value.leading_zeros();
    let shift = msb - 11;
    if shift > 15 {
        return 0xFFFF;
    }
    let mantissa = (value >> (shift - 1)) & 0xFFF;
    ((shift << 12) | mantissa) as u16
}

/// White-balance statistics for a single zone.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AwbZone {
    /// Red/green ratio in 4.8.
    pub rg: u16,
    /// Blue/green ratio in 4.8.
    pub bg: u16,
    /// Number of pixels that qualified for the zone.
    pub count: u32,
}

/// Focus statistics for a single zone.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AfZone {
    pub contrast: u32,
}

/// Snapshot of the metering memory for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame identifier current when the snapshot was captured.
    pub frame_id: u32,
    /// Global histogram, 4.12 companded.
    pub histogram: [u16; HISTOGRAM_BINS],
    /// Per-zone mean luminance, 0..=1023.
    pub zone_hist: [u16; ZONES],
    pub awb_zones: [AwbZone; ZONES],
    pub af_zones: [AfZone; ZONES],
}

impl FrameStats {
    /// Snapshot with every bin and zone empty.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frame_id: 0,
            histogram: [0; HISTOGRAM_BINS],
            zone_hist: [0; ZONES],
            awb_zones: [AwbZone {
                rg: 0,
                bg: 0,
                count: 0,
            }; ZONES],
            af_zones: [AfZone { contrast: 0 }; ZONES],
        }
    }

    /// Iterates the decompressed histogram.
    pub fn histogram_bins(&self) -> impl Iterator<Item = u32> + '_ {
        self.histogram.iter().map(|raw| decompress_bin(*raw))
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_are_stored_verbatim() {
        for value in [0_u32, 1, 255, 0x0FFF] {
            assert_eq!(decompress_bin(compress_bin(value)), value);
        }
    }

    #[test]
    fn round_trip_stays_within_quantization_step() {
        for value in [0x1000_u32, 0x1001, 0x2345, 0x0001_0000, 0x00AB_CDEF, 0x07FF_FFFF] {
            let compressed = compress_bin(value);
            let expanded = decompress_bin(compressed);
            let shift = u32::from(compressed >> 12);
            let step = 1_u32 << (shift - 1);
            assert!(expanded <= value, "{value:#x} -> {expanded:#x}");
            assert!(value - expanded < step, "{value:#x} -> {expanded:#x}");
        }
    }

    #[test]
    fn decompress_matches_hardware_layout() {
        assert_eq!(decompress_bin(0x1000), 0x1000);
        assert_eq!(decompress_bin(0x2001), 0x2002);
        assert_eq!(decompress_bin(0x0ABC), 0x0ABC);
    }

    #[test]
    fn oversized_counts_saturate() {
        assert_eq!(compress_bin(u32::MAX), 0xFFFF);
    }
}
