//! Firmware lifecycle across contexts.
//!
//! [`IspFirmware`] owns one [`Dispatcher`] per camera pipeline and the
//! [`IspHardware`] they share. The interrupt path reads each context's status
//! vector, snapshots statistics, fans the lines out and commits the shadow
//! registers at frame start. The task path drains every context's queue.

use core::fmt;

use heapless::Vec;

use crate::calibration::CalibrationSet;
use crate::context::ContextShared;
use crate::dispatcher::Dispatcher;
use crate::event::DEFAULT_EVENT_QUEUE_DEPTH;
use crate::irq::Irq;
use crate::machines::{AeAlgorithm, IsoBaseGains};
use crate::regs::IspRegisters;
use crate::registry::RegistryError;
use crate::sensor::SensorBackend;
use crate::stats::FrameStats;

/// Contexts one firmware instance can host.
pub const MAX_CONTEXTS: usize = 4;

/// Sleep between safe stop/start polls.
pub const SAFE_MODE_POLL_MS: u32 = 2;

/// Polls before a safe stop/start is reported as timed out.
pub const SAFE_MODE_POLL_LIMIT: u32 = 50;

/// Input port mode requested from, and reported by, the ISP.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InputPortMode {
    SafeStart,
    SafeStop,
}

/// Access to the ISP block behind each context's base address.
pub trait IspHardware {
    /// Reads and clears the interrupt status vector.
    fn take_irq_status(&mut self, isp_base: u32) -> u32;

    /// Copies the metering memory into `stats`.
    fn read_stats(&mut self, isp_base: u32, stats: &mut FrameStats);

    /// Writes the shadow register file to the configuration space.
    fn commit(&mut self, isp_base: u32, regs: &IspRegisters);

    fn request_input_port(&mut self, isp_base: u32, mode: InputPortMode);

    fn input_port_status(&mut self, isp_base: u32) -> InputPortMode;

    fn delay_ms(&mut self, ms: u32);
}

/// Hardware that accepts everything and reports no interrupts.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullHardware {
    port: Option<InputPortMode>,
    commits: u32,
}

impl NullHardware {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            port: None,
            commits: 0,
        }
    }

    /// Register commits seen so far.
    #[must_use]
    pub const fn commits(&self) -> u32 {
        self.commits
    }
}

impl IspHardware for NullHardware {
    fn take_irq_status(&mut self, _: u32) -> u32 {
        0
    }

    fn read_stats(&mut self, _: u32, _: &mut FrameStats) {}

    fn commit(&mut self, _: u32, _: &IspRegisters) {
        self.commits = self.commits.wrapping_add(1);
    }

    fn request_input_port(&mut self, _: u32, mode: InputPortMode) {
        self.port = Some(mode);
    }

    fn input_port_status(&mut self, _: u32) -> InputPortMode {
        self.port.unwrap_or(InputPortMode::SafeStart)
    }

    fn delay_ms(&mut self, _: u32) {}
}

/// Everything needed to bring up one context.
#[derive(Clone, Debug)]
pub struct ContextSettings {
    pub sensor: SensorBackend,
    pub ae: AeAlgorithm,
    pub calibrations: CalibrationSet,
    pub iso_base: IsoBaseGains,
    pub isp_base: u32,
    /// Events handled per [`IspFirmware::process`] call; `None` drains the queue.
    pub event_budget: Option<usize>,
}

/// Failures of the lifecycle entry points.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LifecycleError {
    NotInitialized,
    AlreadyInitialized,
    /// No settings were supplied.
    NoContexts,
    TooManyContexts { requested: usize, max: usize },
    /// Context index outside `0..context_count`.
    BadContext(usize),
    Registry(RegistryError),
    /// The input port did not reach the requested mode in time.
    Timeout(InputPortMode),
}

impl From<RegistryError> for LifecycleError {
    fn from(error: RegistryError) -> Self {
        LifecycleError::Registry(error)
    }
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

struct ContextSlot<const Q: usize> {
    dispatcher: Dispatcher<Q>,
    isp_base: u32,
    event_budget: Option<usize>,
}

/// The control plane for every configured camera pipeline.
pub struct IspFirmware<H, const C: usize = MAX_CONTEXTS, const Q: usize = DEFAULT_EVENT_QUEUE_DEPTH>
where
    H: IspHardware,
{
    hardware: H,
    contexts: Vec<ContextSlot<Q>, C>,
    active: usize,
    skipped_frames: u32,
}

impl<H, const C: usize, const Q: usize> IspFirmware<H, C, Q>
where
    H: IspHardware,
{
    #[must_use]
    pub const fn new(hardware: H) -> Self {
        Self {
            hardware,
            contexts: Vec::new(),
            active: 0,
            skipped_frames: 0,
        }
    }

    /// Builds and initializes one context per settings entry. The first one
    /// becomes the active context.
    pub fn init<I>(&mut self, settings: I) -> Result<(), LifecycleError>
    where
        I: IntoIterator<Item = ContextSettings>,
    {
        if !self.contexts.is_empty() {
            return Err(LifecycleError::AlreadyInitialized);
        }

        for (index, settings) in settings.into_iter().enumerate() {
            let context_id = u8::try_from(index).unwrap_or(u8::MAX);
            let shared = ContextShared::new(context_id, settings.calibrations, settings.iso_base);
            let dispatcher = Dispatcher::new(shared, settings.sensor, settings.ae)?;
            let slot = ContextSlot {
                dispatcher,
                isp_base: settings.isp_base,
                event_budget: settings.event_budget,
            };
            if self.contexts.push(slot).is_err() {
                self.contexts.clear();
                return Err(LifecycleError::TooManyContexts {
                    requested: index + 1,
                    max: C,
                });
            }
        }
        if self.contexts.is_empty() {
            return Err(LifecycleError::NoContexts);
        }

        for slot in &mut self.contexts {
            slot.dispatcher.init();
        }
        self.active = 0;
        isp_info!("firmware initialized with {} context(s)", self.contexts.len());
        Ok(())
    }

    /// Deinitializes and drops every context.
    pub fn terminate(&mut self) -> Result<(), LifecycleError> {
        if self.contexts.is_empty() {
            return Err(LifecycleError::NotInitialized);
        }
        for slot in &mut self.contexts {
            slot.dispatcher.deinit();
        }
        self.contexts.clear();
        self.active = 0;
        isp_info!("firmware terminated");
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        !self.contexts.is_empty()
    }

    /// Drains every context's queue within its budget. Returns the events handled.
    pub fn process(&mut self) -> Result<usize, LifecycleError> {
        if self.contexts.is_empty() {
            isp_error!("process called before init");
            return Err(LifecycleError::NotInitialized);
        }
        Ok(self
            .contexts
            .iter_mut()
            .map(|slot| slot.dispatcher.process_events(slot.event_budget))
            .sum())
    }

    /// Services pending interrupts of every context.
    pub fn interrupt_handler(&mut self) -> Result<(), LifecycleError> {
        if self.contexts.is_empty() {
            return Err(LifecycleError::NotInitialized);
        }
        for index in 0..self.contexts.len() {
            let base = self.contexts[index].isp_base;
            let vector = self.hardware.take_irq_status(base);
            if vector != 0 {
                self.service_vector(index, vector);
            }
        }
        Ok(())
    }

    /// Delivers a status vector to one context as the interrupt path would.
    pub fn service_vector(&mut self, index: usize, vector: u32) {
        let Some(slot) = self.contexts.get_mut(index) else {
            return;
        };
        let stats_lines = Irq::AeStats.mask() | Irq::AwbStats.mask() | Irq::AfStats.mask();
        if vector & stats_lines != 0 {
            let shared = slot.dispatcher.shared_mut();
            self.hardware.read_stats(slot.isp_base, &mut shared.stats);
            shared.stats.frame_id = shared.frame_id;
        }

        for irq in Irq::iter_vector(vector) {
            if irq.is_error() {
                isp_error!(
                    "context {}: error interrupt {}",
                    slot.dispatcher.shared().context_id,
                    irq.bit()
                );
            }
            match irq {
                Irq::FrameStart => {
                    if !Self::frame_start(&mut self.hardware, slot) {
                        self.skipped_frames = self.skipped_frames.wrapping_add(1);
                    }
                }
                Irq::FrameEnd => {
                    // Blanking runs from frame end until the next frame start.
                    slot.dispatcher.shared_mut().in_vblank = true;
                    slot.dispatcher.process_interrupt(irq);
                }
                _ => slot.dispatcher.process_interrupt(irq),
            }
        }
    }

    /// Returns `false` when the frame was skipped.
    fn frame_start(hardware: &mut H, slot: &mut ContextSlot<Q>) -> bool {
        let dispatcher = &mut slot.dispatcher;
        if !dispatcher.events().is_empty() {
            isp_error!(
                "context {}: previous frame still processing, skipping frame start",
                dispatcher.shared().context_id
            );
            dispatcher.shared_mut().in_vblank = false;
            return false;
        }

        let shared = dispatcher.shared_mut();
        shared.frame_id = shared.frame_id.wrapping_add(1);
        dispatcher.process_interrupt(Irq::FrameStart);
        let shared = dispatcher.shared_mut();
        shared.in_vblank = false;
        hardware.commit(slot.isp_base, &shared.regs);
        true
    }

    /// Frame starts dropped because the previous frame was still in flight.
    #[must_use]
    pub const fn skipped_frames(&self) -> u32 {
        self.skipped_frames
    }

    #[must_use]
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub const fn active_context(&self) -> usize {
        self.active
    }

    /// Selects the context that commands are routed to.
    pub fn set_active_context(&mut self, index: usize) -> Result<(), LifecycleError> {
        if index >= self.contexts.len() {
            return Err(LifecycleError::BadContext(index));
        }
        self.active = index;
        Ok(())
    }

    #[must_use]
    pub fn context(&self, index: usize) -> Option<&Dispatcher<Q>> {
        self.contexts.get(index).map(|slot| &slot.dispatcher)
    }

    pub fn context_mut(&mut self, index: usize) -> Option<&mut Dispatcher<Q>> {
        self.contexts.get_mut(index).map(|slot| &mut slot.dispatcher)
    }

    /// Dispatcher of the active context.
    pub fn active_mut(&mut self) -> Result<&mut Dispatcher<Q>, LifecycleError> {
        let active = self.active;
        self.context_checked(active)
    }

    /// Dispatcher of context `index`, distinguishing a missing context from
    /// a firmware that was never initialized.
    pub fn context_checked(&mut self, index: usize) -> Result<&mut Dispatcher<Q>, LifecycleError> {
        if self.contexts.is_empty() {
            return Err(LifecycleError::NotInitialized);
        }
        self.context_mut(index)
            .ok_or(LifecycleError::BadContext(index))
    }

    /// Freezes or thaws context `index`.
    pub fn freeze(&mut self, index: usize, frozen: bool) -> Result<(), LifecycleError> {
        let dispatcher = self.context_checked(index)?;
        dispatcher.shared_mut().frozen = frozen;
        isp_info!(
            "context {} {}",
            dispatcher.shared().context_id,
            if frozen { "frozen" } else { "running" }
        );
        Ok(())
    }

    /// Stops the input port of context `index` at the next frame boundary.
    pub fn safe_stop(&mut self, index: usize) -> Result<(), LifecycleError> {
        self.request_port(index, InputPortMode::SafeStop)
    }

    /// Restarts the input port of context `index`.
    pub fn safe_start(&mut self, index: usize) -> Result<(), LifecycleError> {
        self.request_port(index, InputPortMode::SafeStart)
    }

    fn request_port(&mut self, index: usize, mode: InputPortMode) -> Result<(), LifecycleError> {
        self.context_checked(index)?;
        let base = self.contexts[index].isp_base;
        self.hardware.request_input_port(base, mode);
        let mut polls = 0;
        while self.hardware.input_port_status(base) != mode {
            self.hardware.delay_ms(SAFE_MODE_POLL_MS);
            polls += 1;
            if polls >= SAFE_MODE_POLL_LIMIT {
                isp_error!(
                    "input port mode change timed out after {} ms",
                    polls * SAFE_MODE_POLL_MS
                );
                return Err(LifecycleError::Timeout(mode));
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};
    use crate::event::Event;

    fn settings(isp_base: u32) -> ContextSettings {
        ContextSettings {
            sensor: SensorBackend::default(),
            ae: AeAlgorithm::default(),
            calibrations: dummy_calibrations().expect("defaults fit"),
            iso_base: DEFAULT_ISO_BASE_GAINS,
            isp_base,
            event_budget: None,
        }
    }

    /// Input port that never reaches the requested mode.
    #[derive(Default)]
    struct StuckPort {
        delays: u32,
    }

    impl IspHardware for StuckPort {
        fn take_irq_status(&mut self, _: u32) -> u32 {
            0
        }
        fn read_stats(&mut self, _: u32, _: &mut FrameStats) {}
        fn commit(&mut self, _: u32, _: &IspRegisters) {}
        fn request_input_port(&mut self, _: u32, _: InputPortMode) {}
        fn input_port_status(&mut self, _: u32) -> InputPortMode {
            InputPortMode::SafeStart
        }
        fn delay_ms(&mut self, _: u32) {
            self.delays += 1;
        }
    }

    #[test]
    fn process_requires_init() {
        let mut firmware: IspFirmware<NullHardware, 2> = IspFirmware::new(NullHardware::new());
        assert_eq!(firmware.process(), Err(LifecycleError::NotInitialized));
        assert_eq!(firmware.init([]), Err(LifecycleError::NoContexts));
    }

    #[test]
    fn too_many_contexts_are_rejected() {
        let mut firmware: IspFirmware<NullHardware, 1> = IspFirmware::new(NullHardware::new());
        assert_eq!(
            firmware.init([settings(0), settings(0x1000)]),
            Err(LifecycleError::TooManyContexts {
                requested: 2,
                max: 1
            })
        );
        assert!(!firmware.is_initialized());
    }

    #[test]
    fn frame_start_commits_registers() {
        let mut firmware: IspFirmware<NullHardware, 1> = IspFirmware::new(NullHardware::new());
        firmware.init([settings(0)]).expect("init");
        firmware.process().expect("drain init events");

        firmware.service_vector(0, Irq::FrameStart.mask());
        assert_eq!(firmware.hardware().commits(), 1);
        assert_eq!(firmware.context(0).map(|c| c.shared().frame_id), Some(1));
    }

    #[test]
    fn busy_queue_skips_the_frame_start() {
        let mut firmware: IspFirmware<NullHardware, 1> = IspFirmware::new(NullHardware::new());
        firmware.init([settings(0)]).expect("init");
        firmware.process().expect("drain init events");
        firmware
            .context_mut(0)
            .expect("context")
            .raise(Event::AeStatsReady);

        firmware.service_vector(0, Irq::FrameStart.mask());
        assert_eq!(firmware.hardware().commits(), 0);
        assert_eq!(firmware.skipped_frames(), 1);
    }

    #[test]
    fn active_context_is_bounds_checked() {
        let mut firmware: IspFirmware<NullHardware, 2> = IspFirmware::new(NullHardware::new());
        firmware.init([settings(0), settings(0x1000)]).expect("init");
        firmware.set_active_context(1).expect("second context");
        assert_eq!(firmware.active_context(), 1);
        assert_eq!(
            firmware.set_active_context(2),
            Err(LifecycleError::BadContext(2))
        );
        assert!(firmware.context_checked(1).is_ok());
        assert_eq!(
            firmware.freeze(2, true),
            Err(LifecycleError::BadContext(2))
        );
    }

    #[test]
    fn safe_stop_gives_up_after_the_poll_limit() {
        let mut firmware: IspFirmware<StuckPort, 1> = IspFirmware::new(StuckPort::default());
        firmware.init([settings(0)]).expect("init");
        assert_eq!(
            firmware.safe_stop(0),
            Err(LifecycleError::Timeout(InputPortMode::SafeStop))
        );
        assert_eq!(firmware.hardware().delays, SAFE_MODE_POLL_LIMIT);
        assert_eq!(firmware.safe_start(0), Ok(()));
    }
}
