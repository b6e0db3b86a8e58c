//! ISP register window access.
//!
//! [`BusIsp`] implements the core's hardware boundary on top of any
//! [`RegisterBus`]. On the target the bus is the memory-mapped window at each
//! context's base address; host tests substitute a map-backed bus.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use isp_core::IspHardware;
use isp_core::firmware::InputPortMode;
use isp_core::regs::{CropRegs, DmaRegs, IspRegisters};
use isp_core::stats::FrameStats;

/// Register offsets relative to an ISP instance's base address.
pub mod map {
    pub const IRQ_STATUS: u32 = 0x0000;
    /// Write-one-to-clear companion of [`IRQ_STATUS`].
    pub const IRQ_CLEAR: u32 = 0x0004;
    pub const INPUT_PORT_REQUEST: u32 = 0x0010;
    pub const INPUT_PORT_STATUS: u32 = 0x0014;

    pub const ISP_DIGITAL_GAIN: u32 = 0x0100;
    pub const WB_GAINS: u32 = 0x0104;
    pub const BLACK_LEVEL: u32 = 0x0114;
    pub const CCM: u32 = 0x0124;
    pub const IRIDIX: u32 = 0x0180;
    pub const CROP_FR: u32 = 0x0200;
    pub const CROP_DS: u32 = 0x0210;
    pub const DMA_FR: u32 = 0x0300;
    pub const DMA_DS: u32 = 0x0310;
    pub const TEST_PATTERN: u32 = 0x0400;
    pub const GAMMA: u32 = 0x1000;
    pub const AE_ZONE_WEIGHTS: u32 = 0x2000;

    pub const STATS_HISTOGRAM: u32 = 0x8000;
    pub const STATS_ZONE_MEANS: u32 = 0x8800;
    pub const STATS_AWB_ZONES: u32 = 0x9000;
    pub const STATS_AF_ZONES: u32 = 0xA000;

    pub const PORT_SAFE_START: u32 = 1;
    pub const PORT_SAFE_STOP: u32 = 2;
}

/// Word access to the ISP address space.
pub trait RegisterBus {
    fn read(&mut self, address: u32) -> u32;

    fn write(&mut self, address: u32, value: u32);

    fn delay_ms(&mut self, ms: u32);
}

/// Volatile access to the memory-mapped register window.
#[cfg(target_os = "none")]
pub struct Mmio;

#[cfg(target_os = "none")]
impl RegisterBus for Mmio {
    fn read(&mut self, address: u32) -> u32 {
        // Addresses come from `config::ISP_BASE` plus offsets in `map`.
        unsafe { core::ptr::read_volatile(address as usize as *const u32) }
    }

    fn write(&mut self, address: u32, value: u32) {
        unsafe { core::ptr::write_volatile(address as usize as *mut u32, value) }
    }

    fn delay_ms(&mut self, ms: u32) {
        embassy_time::block_for(embassy_time::Duration::from_millis(u64::from(ms)));
    }
}

/// [`IspHardware`] backed by a register bus.
pub struct BusIsp<B> {
    bus: B,
}

impl<B: RegisterBus> BusIsp<B> {
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn write_pair(&mut self, address: u32, low: u16, high: u16) {
        self.bus
            .write(address, u32::from(low) | (u32::from(high) << 16));
    }

    fn write_flag(&mut self, address: u32, flag: bool) {
        self.bus.write(address, u32::from(flag));
    }

    fn write_crop(&mut self, address: u32, crop: &CropRegs) {
        self.write_flag(address, crop.enable);
        self.write_pair(address + 4, crop.start_x, crop.start_y);
        self.write_pair(address + 8, crop.size_x, crop.size_y);
    }

    fn write_dma(&mut self, address: u32, dma: &DmaRegs) {
        let control = u32::from(dma.enable)
            | (u32::from(dma.format) << 8)
            | (u32::from(dma.vflip) << 16)
            | (u32::from(dma.frame_write_cancel) << 17);
        self.bus.write(address, control);
        self.bus.write(address + 4, dma.base_address);
        self.bus.write(address + 8, dma.line_offset);
        self.write_pair(address + 12, dma.active_width, dma.active_height);
    }
}

/// Address of the `index`th 32-bit word after `base + offset`.
fn word(base: u32, offset: u32, index: usize) -> u32 {
    let index = u32::try_from(index).unwrap_or(u32::MAX);
    base.wrapping_add(offset).wrapping_add(index.wrapping_mul(4))
}

impl<B: RegisterBus> IspHardware for BusIsp<B> {
    fn take_irq_status(&mut self, isp_base: u32) -> u32 {
        let status = self.bus.read(isp_base + map::IRQ_STATUS);
        if status != 0 {
            self.bus.write(isp_base + map::IRQ_CLEAR, status);
        }
        status
    }

    fn read_stats(&mut self, isp_base: u32, stats: &mut FrameStats) {
        for (pair, bins) in stats.histogram.chunks_mut(2).enumerate() {
            let packed = self.bus.read(word(isp_base, map::STATS_HISTOGRAM, pair));
            for (lane, bin) in bins.iter_mut().enumerate() {
                *bin = u16::try_from((packed >> (16 * lane)) & 0xFFFF).unwrap_or(u16::MAX);
            }
        }
        for (pair, means) in stats.zone_hist.chunks_mut(2).enumerate() {
            let packed = self.bus.read(word(isp_base, map::STATS_ZONE_MEANS, pair));
            for (lane, mean) in means.iter_mut().enumerate() {
                *mean = u16::try_from((packed >> (16 * lane)) & 0x3FF).unwrap_or(0);
            }
        }
        for (index, zone) in stats.awb_zones.iter_mut().enumerate() {
            let ratios = self.bus.read(word(isp_base, map::STATS_AWB_ZONES, index * 2));
            zone.rg = u16::try_from(ratios & 0xFFFF).unwrap_or(u16::MAX);
            zone.bg = u16::try_from(ratios >> 16).unwrap_or(u16::MAX);
            zone.count = self.bus.read(word(isp_base, map::STATS_AWB_ZONES, index * 2 + 1));
        }
        for (index, zone) in stats.af_zones.iter_mut().enumerate() {
            zone.contrast = self.bus.read(word(isp_base, map::STATS_AF_ZONES, index));
        }
    }

    fn commit(&mut self, isp_base: u32, regs: &IspRegisters) {
        self.bus.write(
            isp_base + map::ISP_DIGITAL_GAIN,
            u32::from(regs.isp_digital_gain),
        );

        let wb = &regs.wb_gains;
        for (index, gain) in [wb.r, wb.gr, wb.gb, wb.b].into_iter().enumerate() {
            self.bus
                .write(word(isp_base, map::WB_GAINS, index), u32::from(gain));
        }
        let black = &regs.black_level;
        for (index, level) in [black.r, black.gr, black.gb, black.b].into_iter().enumerate() {
            self.bus.write(word(isp_base, map::BLACK_LEVEL, index), level);
        }
        for (index, coefficient) in regs.color.ccm.iter().enumerate() {
            // Two's complement in the low half-word.
            let raw = u32::from(u16::from_ne_bytes(coefficient.to_ne_bytes()));
            self.bus.write(word(isp_base, map::CCM, index), raw);
        }

        let iridix = &regs.iridix;
        self.write_flag(isp_base + map::IRIDIX, iridix.enable);
        self.write_pair(isp_base + map::IRIDIX + 4, iridix.strength, iridix.dark_enh);
        self.write_pair(isp_base + map::IRIDIX + 8, iridix.contrast, iridix.global_dg);

        self.write_crop(isp_base + map::CROP_FR, &regs.crop_fr);
        self.write_crop(isp_base + map::CROP_DS, &regs.crop_ds);
        self.write_dma(isp_base + map::DMA_FR, &regs.dma_fr);
        self.write_dma(isp_base + map::DMA_DS, &regs.dma_ds);

        let pattern = &regs.test_pattern;
        self.bus.write(
            isp_base + map::TEST_PATTERN,
            u32::from(pattern.enable) | (u32::from(pattern.mode) << 8),
        );

        for (pair, points) in regs.gamma.chunks(2).enumerate() {
            let low = points.first().copied().unwrap_or(0);
            let high = points.get(1).copied().unwrap_or(0);
            self.write_pair(word(isp_base, map::GAMMA, pair), low, high);
        }
        for (quad, weights) in regs.ae_zone_weights.chunks(4).enumerate() {
            let packed = weights
                .iter()
                .enumerate()
                .fold(0u32, |acc, (lane, weight)| acc | (u32::from(*weight) << (8 * lane)));
            self.bus.write(word(isp_base, map::AE_ZONE_WEIGHTS, quad), packed);
        }
    }

    fn request_input_port(&mut self, isp_base: u32, mode: InputPortMode) {
        let request = match mode {
            InputPortMode::SafeStart => map::PORT_SAFE_START,
            InputPortMode::SafeStop => map::PORT_SAFE_STOP,
        };
        self.bus.write(isp_base + map::INPUT_PORT_REQUEST, request);
    }

    fn input_port_status(&mut self, isp_base: u32) -> InputPortMode {
        if self.bus.read(isp_base + map::INPUT_PORT_STATUS) == map::PORT_SAFE_START {
            InputPortMode::SafeStart
        } else {
            InputPortMode::SafeStop
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.bus.delay_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[derive(Default)]
    struct MapBus {
        words: BTreeMap<u32, u32>,
        writes: Vec<(u32, u32)>,
    }

    impl RegisterBus for MapBus {
        fn read(&mut self, address: u32) -> u32 {
            self.words.get(&address).copied().unwrap_or(0)
        }

        fn write(&mut self, address: u32, value: u32) {
            self.words.insert(address, value);
            self.writes.push((address, value));
        }

        fn delay_ms(&mut self, _: u32) {}
    }

    const BASE: u32 = 0x6000_0000;

    #[test]
    fn status_is_cleared_after_reading() {
        let mut bus = MapBus::default();
        bus.words.insert(BASE + map::IRQ_STATUS, 0b110);
        let mut isp = BusIsp::new(bus);
        assert_eq!(isp.take_irq_status(BASE), 0b110);
        assert!(isp.bus().writes.contains(&(BASE + map::IRQ_CLEAR, 0b110)));
    }

    #[test]
    fn statistics_unpack_half_words() {
        let mut bus = MapBus::default();
        bus.words.insert(BASE + map::STATS_HISTOGRAM, 0x0002_0001);
        bus.words.insert(BASE + map::STATS_AWB_ZONES, 0x0120_0100);
        bus.words.insert(BASE + map::STATS_AWB_ZONES + 4, 900);
        bus.words.insert(BASE + map::STATS_AF_ZONES + 8, 77);
        let mut isp = BusIsp::new(bus);
        let mut stats = FrameStats::new();
        isp.read_stats(BASE, &mut stats);
        assert_eq!(&stats.histogram[..3], &[1, 2, 0]);
        assert_eq!(stats.awb_zones[0].rg, 0x100);
        assert_eq!(stats.awb_zones[0].bg, 0x120);
        assert_eq!(stats.awb_zones[0].count, 900);
        assert_eq!(stats.af_zones[2].contrast, 77);
    }

    #[test]
    fn commit_packs_crop_and_port_requests() {
        let mut regs = IspRegisters::default();
        regs.crop_fr.enable = true;
        regs.crop_fr.start_x = 16;
        regs.crop_fr.start_y = 8;
        regs.crop_fr.size_x = 640;
        regs.crop_fr.size_y = 480;
        let mut isp = BusIsp::new(MapBus::default());
        isp.commit(BASE, &regs);
        isp.request_input_port(BASE, InputPortMode::SafeStart);

        let words = &isp.bus().words;
        assert_eq!(words[&(BASE + map::CROP_FR)], 1);
        assert_eq!(words[&(BASE + map::CROP_FR + 4)], 8 << 16 | 16);
        assert_eq!(words[&(BASE + map::CROP_FR + 8)], 480 << 16 | 640);
        assert_eq!(words[&(BASE + map::INPUT_PORT_REQUEST)], map::PORT_SAFE_START);
    }
}
