//! Ordered registry of state machines and the bus view handed to them.
//!
//! A request is served by taking the owning machine out of its slot, calling it
//! with an [`Env`] that borrows the rest of the registry, and putting it back.
//! Nested requests therefore work, while a request that loops back to a machine
//! already in service finds an empty slot and fails with
//! [`ParamError::Unsupported`].

use core::fmt;

use crate::context::ContextShared;
use crate::event::{Event, EventQueue};
use crate::irq::Irq;
use crate::machines::{Machine, StateMachine};
use crate::param::{Get, MACHINE_COUNT, MachineId, ParamError, ParamValue, Set};
use crate::sensor::SensorInfo;

/// Destination for events raised by machines.
pub trait EventSink {
    fn raise(&self, event: Event);
}

impl<const N: usize> EventSink for EventQueue<N> {
    fn raise(&self, event: Event) {
        // Overflow is counted and logged by the queue itself.
        let _ = self.push(event);
    }
}

/// Failures reported while assembling a registry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegistryError {
    /// A machine was registered twice.
    Duplicate(MachineId),
    /// A slot is still empty when the registry is sealed.
    Missing(MachineId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Machines of one context, indexed by [`MachineId`].
pub struct Registry {
    machines: [Option<Machine>; MACHINE_COUNT],
}

impl Registry {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            machines: [const { None }; MACHINE_COUNT],
        }
    }

    /// Places a machine in its slot.
    pub fn register(&mut self, machine: Machine) -> Result<(), RegistryError> {
        let id = machine.id();
        let slot = &mut self.machines[id.index()];
        if slot.is_some() {
            return Err(RegistryError::Duplicate(id));
        }
        *slot = Some(machine);
        Ok(())
    }

    /// Checks that every slot is populated.
    pub fn validate(&self) -> Result<(), RegistryError> {
        MachineId::ALL
            .iter()
            .find(|id| self.machines[id.index()].is_none())
            .map_or(Ok(()), |id| Err(RegistryError::Missing(*id)))
    }

    /// Borrow of a machine, for inspection outside a dispatch.
    #[must_use]
    pub fn machine(&self, id: MachineId) -> Option<&Machine> {
        self.machines[id.index()].as_ref()
    }

    /// Runs `op` on the machine in slot `id` with a bus view of the others.
    fn with_machine<R>(
        &mut self,
        id: MachineId,
        shared: &mut ContextShared,
        events: &dyn EventSink,
        op: impl FnOnce(&mut Machine, &mut Env<'_>) -> R,
    ) -> Option<R> {
        let mut machine = self.machines[id.index()].take()?;
        let result = {
            let mut env = Env {
                shared,
                events,
                registry: self,
            };
            op(&mut machine, &mut env)
        };
        self.machines[id.index()] = Some(machine);
        Some(result)
    }

    pub fn get(
        &mut self,
        request: Get,
        shared: &mut ContextShared,
        events: &dyn EventSink,
    ) -> Result<ParamValue, ParamError> {
        let owner = request.owner();
        self.with_machine(owner, shared, events, |machine, env| {
            machine.get_param(request, env)
        })
        .unwrap_or_else(|| {
            isp_error!("get: no handler available in {}", owner.label());
            Err(ParamError::Unsupported)
        })
    }

    pub fn set(
        &mut self,
        request: Set,
        shared: &mut ContextShared,
        events: &dyn EventSink,
    ) -> Result<(), ParamError> {
        let owner = request.owner();
        self.with_machine(owner, shared, events, |machine, env| {
            machine.set_param(request, env)
        })
        .unwrap_or_else(|| {
            isp_error!("set: no handler available in {}", owner.label());
            Err(ParamError::Unsupported)
        })
    }

    /// Calls `init` on every machine in registry order.
    pub fn init_all(&mut self, shared: &mut ContextShared, events: &dyn EventSink) {
        for id in MachineId::ALL {
            self.with_machine(id, shared, events, |machine, env| machine.init(env));
        }
    }

    /// Calls `deinit` on every machine in registry order.
    pub fn deinit_all(&mut self, shared: &mut ContextShared, events: &dyn EventSink) {
        for id in MachineId::ALL {
            self.with_machine(id, shared, events, |machine, env| machine.deinit(env));
        }
    }

    /// Delivers an interrupt to every machine that asked for it.
    pub fn process_interrupt(
        &mut self,
        irq: Irq,
        shared: &mut ContextShared,
        events: &dyn EventSink,
    ) {
        for id in MachineId::ALL {
            self.with_machine(id, shared, events, |machine, env| {
                let wanted = machine.irq_mask().is_some_and(|mask| !mask.is_ignored(irq));
                if wanted {
                    machine.process_interrupt(irq, env);
                }
            });
        }
    }

    /// Delivers an event to every machine. Returns how many consumed it.
    pub fn process_event(
        &mut self,
        event: Event,
        shared: &mut ContextShared,
        events: &dyn EventSink,
    ) -> usize {
        let mut handled = 0;
        for id in MachineId::ALL {
            let consumed = self
                .with_machine(id, shared, events, |machine, env| {
                    machine.process_event(event, env)
                })
                .unwrap_or(false);
            if consumed {
                handled += 1;
            }
        }
        handled
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::empty()
    }
}

/// What a machine sees while it is being serviced.
pub struct Env<'a> {
    pub shared: &'a mut ContextShared,
    events: &'a dyn EventSink,
    registry: &'a mut Registry,
}

impl Env<'_> {
    /// Queues an event for the task-side drain.
    pub fn raise(&self, event: Event) {
        self.events.raise(event);
    }

    pub fn get(&mut self, request: Get) -> Result<ParamValue, ParamError> {
        self.registry.get(request, self.shared, self.events)
    }

    pub fn set(&mut self, request: Set) -> Result<(), ParamError> {
        self.registry.set(request, self.shared, self.events)
    }

    pub fn get_u32(&mut self, request: Get) -> Result<u32, ParamError> {
        self.get(request)?.as_u32()
    }

    pub fn get_i32(&mut self, request: Get) -> Result<i32, ParamError> {
        self.get(request)?.as_i32()
    }

    pub fn get_bool(&mut self, request: Get) -> Result<bool, ParamError> {
        self.get(request)?.as_bool()
    }

    /// Sensor summary, or defaults when the sensor machine is unavailable.
    pub fn sensor_info(&mut self) -> SensorInfo {
        self.get(Get::Sensor(crate::sensor::SensorGet::Info))
            .and_then(ParamValue::as_sensor)
            .unwrap_or_default()
    }

    /// Sends a best-effort notification, logging when the owner rejects it.
    pub fn notify(&mut self, request: Set) {
        if let Err(error) = self.set(request) {
            isp_debug!(
                "notification to {} rejected ({})",
                request.owner().label(),
                error_label(error)
            );
        }
    }
}

/// Short name of a bus error for log lines.
#[must_use]
pub const fn error_label(error: ParamError) -> &'static str {
    match error {
        ParamError::Unsupported => "unsupported",
        ParamError::NotPermitted => "not-permitted",
        ParamError::BadArgument => "bad-argument",
        ParamError::NotExists => "not-exists",
        ParamError::Busy => "busy",
        ParamError::TypeMismatch => "type-mismatch",
        ParamError::Sensor(_) => "sensor",
        ParamError::Calibration(_) => "calibration",
        ParamError::Failed => "failed",
    }
}
