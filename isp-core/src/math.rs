//! Fixed-point helpers used by the algorithm state machines.
//!
//! Gains and exposures travel through the firmware as base-2 logarithms with
//! [`LOG2_GAIN_SHIFT`] fractional bits. Calibration curves are sampled with
//! [`calc_modulation_u16`], which linearly interpolates between knots.

/// Fractional bits carried by every `*_log2` gain or exposure value.
pub const LOG2_GAIN_SHIFT: u32 = 18;

/// `2^(1/2^k)` for `k = 1..=20`, in Q1.31.
const EXP2_ROOTS: [u32; 20] = [
    0xB504_F334,
    0x9837_F052,
    0x8B95_C1E4,
    0x85AA_C368,
    0x82CD_8699,
    0x8164_D1F4,
    0x80B1_ED50,
    0x8058_D7D3,
    0x802C_6437,
    0x8016_302F,
    0x800B_179D,
    0x8005_8BAF,
    0x8002_C5D0,
    0x8001_62E6,
    0x8000_B173,
    0x8000_58B9,
    0x8000_2C5D,
    0x8000_162E,
    0x8000_0B17,
    0x8000_058C,
];

const Q31_ONE: u64 = 1 << 31;

/// Returns `log2(value / 2^in_frac)` with `out_frac` fractional bits.
///
/// Zero has no logarithm and maps to `0`, matching the register-level helpers the
/// calibration tables were tuned against.
#[must_use]
pub fn log2_fixed_to_fixed(value: u32, in_frac: u32, out_frac: u32) -> i32 {
    if value == 0 {
        return 0;
    }

    let int_part = 31 - value.leading_zeros();
    // Normalise into [1, 2) as Q1.31.
    let mut mantissa = (u64::from(value) << (31 - int_part)) & 0xFFFF_FFFF;
    let mut frac: i32 = 0;
    for _ in 0..out_frac {
        mantissa = (mantissa * mantissa) >> 31;
        frac <<= 1;
        if mantissa >= 2 * Q31_ONE {
            mantissa >>= 1;
            frac |= 1;
        }
    }

    ((int_part as i32 - in_frac as i32) << out_frac) + frac
}

/// Returns `log2(value)` for an integer input with `out_frac` fractional bits.
#[must_use]
pub fn log2_int_to_fixed(value: u32, out_frac: u32) -> i32 {
    log2_fixed_to_fixed(value, 0, out_frac)
}

/// Returns `2^(value / 2^in_frac)` scaled by `2^out_frac`, saturating at `u32::MAX`.
#[must_use]
pub fn exp2_fixed(value: i32, in_frac: u32, out_frac: u32) -> u32 {
    let int_part = value >> in_frac;
    let frac = (value - (int_part << in_frac)) as u32;

    let mut acc = Q31_ONE;
    for k in 1..=in_frac.min(EXP2_ROOTS.len() as u32) {
        let bit = in_frac - k;
        if (frac >> bit) & 1 == 1 {
            acc = (acc * u64::from(EXP2_ROOTS[(k - 1) as usize])) >> 31;
        }
    }

    let shift = int_part + out_frac as i32 - 31;
    if shift >= 32 {
        u32::MAX
    } else if shift >= 0 {
        u32::try_from(acc << shift).unwrap_or(u32::MAX)
    } else if shift <= -64 {
        0
    } else {
        u32::try_from(acc >> (-shift)).unwrap_or(u32::MAX)
    }
}

/// Integer square root, rounded down.
#[must_use]
pub fn sqrt32(value: u32) -> u32 {
    if value < 2 {
        return value;
    }

    let mut result: u32 = 0;
    let mut bit: u32 = 1 << 30;
    let mut rem = value;
    while bit > rem {
        bit >>= 2;
    }
    while bit != 0 {
        if rem >= result + bit {
            rem -= result + bit;
            result = (result >> 1) + bit;
        } else {
            result >>= 1;
        }
        bit >>= 2;
    }
    result
}

/// Knot of a modulation curve: `x` is usually log2 gain in 8.8, `y` the strength.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ModulationEntry {
    pub x: u16,
    pub y: u16,
}

impl ModulationEntry {
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// Samples a monotonic curve at `x`, clamping outside the first/last knot.
///
/// An empty table yields `0`.
pub fn calc_modulation_u16<I>(x: u16, table: I) -> u16
where
    I: IntoIterator<Item = ModulationEntry>,
{
    let mut iter = table.into_iter();
    let Some(mut previous) = iter.next() else {
        return 0;
    };

    if x <= previous.x {
        return previous.y;
    }

    for knot in iter {
        if x <= knot.x {
            let dx = i32::from(knot.x) - i32::from(previous.x);
            if dx == 0 {
                return knot.y;
            }
            let dy = i32::from(knot.y) - i32::from(previous.y);
            let offset = i32::from(x) - i32::from(previous.x);
            let y = i32::from(previous.y) + dy * offset / dx;
            return y.clamp(0, i32::from(u16::MAX)) as u16;
        }
        previous = knot;
    }

    previous.y
}

/// Sign-magnitude 16-bit value, as carried by colour matrix tables, to two's complement.
#[must_use]
pub fn direct_to_complement(value: u32) -> i16 {
    let magnitude = i16::try_from(value & 0x7FFF).unwrap_or(i16::MAX);
    if value & 0x8000 != 0 { -magnitude } else { magnitude }
}

/// Two's complement to the sign-magnitude form used on the command surface.
#[must_use]
pub fn complement_to_direct(value: i16) -> u32 {
    if value < 0 {
        0x8000 | u32::from(value.unsigned_abs())
    } else {
        u32::from(value.unsigned_abs())
    }
}

/// Linear blend `a + (b - a) * alpha / 256` used for gradual transitions.
#[must_use]
pub fn blend_i32(a: i32, b: i32, alpha: u32) -> i32 {
    let alpha = alpha.min(256) as i32;
    a + (b - a) * alpha / 256
}

/// Clamps a signed log2 value to a non-negative register field of `bits` width.
#[must_use]
pub fn clamp_to_bits(value: i32, bits: u32) -> u32 {
    let max = (1u32 << bits) - 1;
    if value <= 0 {
        0
    } else {
        (value as u32).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log2_of_powers_of_two_is_exact() {
        assert_eq!(log2_int_to_fixed(1, LOG2_GAIN_SHIFT), 0);
        assert_eq!(log2_int_to_fixed(2, LOG2_GAIN_SHIFT), 1 << LOG2_GAIN_SHIFT);
        assert_eq!(log2_int_to_fixed(1024, 8), 10 << 8);
        assert_eq!(log2_fixed_to_fixed(0x200, 8, 8), 1 << 8);
        assert_eq!(log2_fixed_to_fixed(0x080, 8, 8), -(1 << 8));
    }

    #[test]
    fn log2_of_three_is_close() {
        // log2(3) = 1.58496
        let value = log2_int_to_fixed(3, 16);
        let expected = (1.584_962_5_f64 * 65536.0) as i32;
        assert!((value - expected).abs() <= 1, "{value} vs {expected}");
    }

    #[test]
    fn exp2_inverts_log2() {
        for sample in [1_u32, 3, 100, 256, 1_000, 4_095, 70_000] {
            let log = log2_int_to_fixed(sample, LOG2_GAIN_SHIFT);
            let back = exp2_fixed(log, LOG2_GAIN_SHIFT, 0);
            let tolerance = sample / 1_000 + 1;
            assert!(
                back.abs_diff(sample) <= tolerance,
                "{sample} -> {log} -> {back}"
            );
        }
    }

    #[test]
    fn exp2_handles_negative_and_saturating_inputs() {
        assert_eq!(exp2_fixed(-(1 << 8), 8, 8), 128);
        assert_eq!(exp2_fixed(40 << 8, 8, 0), u32::MAX);
        assert_eq!(exp2_fixed(-(40 << 8), 8, 0), 0);
    }

    #[test]
    fn sqrt_rounds_down() {
        assert_eq!(sqrt32(0), 0);
        assert_eq!(sqrt32(15), 3);
        assert_eq!(sqrt32(16), 4);
        assert_eq!(sqrt32(u32::MAX), 65_535);
    }

    #[test]
    fn sign_magnitude_conversions_are_inverse() {
        assert_eq!(complement_to_direct(-32), 0x8020);
        assert_eq!(complement_to_direct(256), 0x0100);
        for value in [-300_i16, -1, 0, 1, 0x1FF] {
            assert_eq!(direct_to_complement(complement_to_direct(value)), value);
        }
    }

    #[test]
    fn modulation_interpolates_and_clamps() {
        let table = [
            ModulationEntry::new(0, 100),
            ModulationEntry::new(256, 200),
            ModulationEntry::new(512, 50),
        ];
        assert_eq!(calc_modulation_u16(0, table), 100);
        assert_eq!(calc_modulation_u16(128, table), 150);
        assert_eq!(calc_modulation_u16(384, table), 125);
        assert_eq!(calc_modulation_u16(9_000, table), 50);
        assert_eq!(calc_modulation_u16(5, [] as [ModulationEntry; 0]), 0);
    }
}
