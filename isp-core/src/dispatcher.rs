//! Per-context dispatcher.
//!
//! Owns one context's registry, shared state and event queue. Interrupts fan
//! out to every machine in registry order; events are drained FIFO, each one
//! offered to every machine, until the queue is empty or the budget runs out.

use crate::context::ContextShared;
use crate::event::{DEFAULT_EVENT_QUEUE_DEPTH, Event, EventQueue};
use crate::irq::Irq;
use crate::machines::{
    AeAlgorithm, AeMachine, AfMachine, AwbMachine, CmosMachine, ColorMatrixMachine, CropMachine,
    DmaWriterMachine, GeneralMachine, GeneralSet, IridixMachine, Machine, MatrixYuvMachine,
    MonitorMachine, NoiseReductionMachine, PurpleFringeMachine, SharpeningMachine,
};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::{Registry, RegistryError, error_label};
use crate::sensor::{SensorBackend, SensorMachine};

/// Registry, shared state and queue of one camera pipeline.
pub struct Dispatcher<const Q: usize = DEFAULT_EVENT_QUEUE_DEPTH> {
    registry: Registry,
    shared: ContextShared,
    events: EventQueue<Q>,
    initialized: bool,
}

impl<const Q: usize> Dispatcher<Q> {
    /// Builds every machine of the context. Nothing runs until [`Self::init`].
    pub fn new(
        shared: ContextShared,
        sensor: SensorBackend,
        ae: AeAlgorithm,
    ) -> Result<Self, RegistryError> {
        let mut registry = Registry::empty();
        for machine in [
            Machine::Sensor(SensorMachine::new(sensor)),
            Machine::Cmos(CmosMachine::new()),
            Machine::General(GeneralMachine::new()),
            Machine::Ae(AeMachine::new(ae)),
            Machine::Awb(AwbMachine::new()),
            Machine::Af(AfMachine::new()),
            Machine::ColorMatrix(ColorMatrixMachine::new()),
            Machine::PurpleFringe(PurpleFringeMachine::new()),
            Machine::Iridix(IridixMachine::new()),
            Machine::NoiseReduction(NoiseReductionMachine::new()),
            Machine::Crop(CropMachine::new()),
            Machine::Sharpening(SharpeningMachine::new()),
            Machine::MatrixYuv(MatrixYuvMachine::new()),
            Machine::DmaWriter(DmaWriterMachine::new()),
            Machine::Monitor(MonitorMachine::new()),
        ] {
            registry.register(machine)?;
        }
        registry.validate()?;

        Ok(Self {
            registry,
            shared,
            events: EventQueue::new(),
            initialized: false,
        })
    }

    /// Initializes every machine, then reloads calibration once.
    pub fn init(&mut self) {
        if self.initialized {
            isp_warn!("context {} already initialized", self.shared.context_id);
            return;
        }
        self.registry.init_all(&mut self.shared, &self.events);
        self.initialized = true;
        if let Err(error) = self.set(Set::General(GeneralSet::ReloadCalibration)) {
            isp_error!(
                "context {}: calibration reload failed ({})",
                self.shared.context_id,
                error_label(error)
            );
        }
        isp_info!(
            "context {} initialized ({} events pending)",
            self.shared.context_id,
            self.events.len()
        );
    }

    /// Deinitializes every machine and discards pending events.
    pub fn deinit(&mut self) {
        if !self.initialized {
            return;
        }
        self.registry.deinit_all(&mut self.shared, &self.events);
        self.events.clear();
        self.initialized = false;
        isp_info!("context {} deinitialized", self.shared.context_id);
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Fans an interrupt out to the machines that asked for it.
    pub fn process_interrupt(&mut self, irq: Irq) {
        if !self.initialized {
            return;
        }
        if self.shared.frozen && !irq.passes_freeze() {
            isp_trace!("frozen: interrupt {} not delivered", irq.bit());
            return;
        }
        self.registry
            .process_interrupt(irq, &mut self.shared, &self.events);
    }

    /// Drains the queue. `budget` caps how many events one call handles.
    /// Returns the number of events popped.
    pub fn process_events(&mut self, budget: Option<usize>) -> usize {
        let mut processed = 0;
        while budget.is_none_or(|limit| processed < limit) {
            let Some(event) = self.events.pop() else {
                break;
            };
            processed += 1;

            if self.shared.frozen && !event.passes_freeze() {
                isp_trace!("frozen: event {} discarded", event.label());
                continue;
            }
            let handled = self
                .registry
                .process_event(event, &mut self.shared, &self.events);
            if handled == 0 {
                isp_trace!("event {} not consumed", event.label());
            }
        }
        processed
    }

    /// Queues an event as if an interrupt handler had raised it.
    pub fn raise(&self, event: Event) {
        // Overflow is counted and logged by the queue itself.
        let _ = self.events.push(event);
    }

    pub fn get(&mut self, request: Get) -> Result<ParamValue, ParamError> {
        self.registry.get(request, &mut self.shared, &self.events)
    }

    pub fn set(&mut self, request: Set) -> Result<(), ParamError> {
        self.registry.set(request, &mut self.shared, &self.events)
    }

    #[must_use]
    pub const fn shared(&self) -> &ContextShared {
        &self.shared
    }

    pub fn shared_mut(&mut self) -> &mut ContextShared {
        &mut self.shared
    }

    #[must_use]
    pub const fn events(&self) -> &EventQueue<Q> {
        &self.events
    }

    #[must_use]
    pub fn machine(&self, id: MachineId) -> Option<&Machine> {
        self.registry.machine(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};

    fn dispatcher() -> Dispatcher<16> {
        let shared = ContextShared::new(
            0,
            dummy_calibrations().expect("defaults fit"),
            DEFAULT_ISO_BASE_GAINS,
        );
        Dispatcher::new(shared, SensorBackend::default(), AeAlgorithm::default())
            .expect("every machine registered")
    }

    #[test]
    fn nothing_runs_before_init() {
        let mut dispatcher = dispatcher();
        dispatcher.process_interrupt(Irq::FrameEnd);
        assert!(dispatcher.events().is_empty());
    }

    #[test]
    fn init_announces_the_sensor() {
        let mut dispatcher = dispatcher();
        dispatcher.init();
        assert!(dispatcher.is_initialized());
        assert!(!dispatcher.events().is_empty());
        let drained = dispatcher.process_events(None);
        assert!(drained >= 1);
    }

    #[test]
    fn budget_limits_one_drain() {
        let mut dispatcher = dispatcher();
        dispatcher.init();
        dispatcher.process_events(None);
        for _ in 0..5 {
            dispatcher.raise(Event::SharpLutUpdate);
        }
        assert_eq!(dispatcher.process_events(Some(2)), 2);
        assert_eq!(dispatcher.events().len(), 3);
        assert_eq!(dispatcher.process_events(None), 3);
    }

    #[test]
    fn frozen_context_drops_algorithm_events() {
        let mut dispatcher = dispatcher();
        dispatcher.init();
        dispatcher.process_events(None);
        dispatcher.shared_mut().frozen = true;
        dispatcher.process_interrupt(Irq::AeStats);
        assert!(dispatcher.events().is_empty());

        dispatcher.process_interrupt(Irq::FrameEnd);
        assert_eq!(dispatcher.events().pop(), Some(Event::FrameEnd));
    }

    #[test]
    fn deinit_clears_pending_events() {
        let mut dispatcher = dispatcher();
        dispatcher.init();
        dispatcher.raise(Event::FrameEnd);
        dispatcher.deinit();
        assert!(dispatcher.events().is_empty());
        assert!(!dispatcher.is_initialized());
    }
}
