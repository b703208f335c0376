/*!
    protocol engine driving all gateway modules of a controller

    the engine owns the ethernet driver, the clock, the packet pool and one [Module] per populated slot. It does nothing on its own: [Engine::tick] must be called once per control cycle, and the host exchanges process data between ticks.
*/

use log::*;

use crate::{
    application::{Module, State, Shared, Diagnostics},
    config::{Config, SlotId, MAX_MODULES, FIELDBUS_OFFLINE},
    driver::{EthernetDriver, Clock},
    error::Error,
    frame::IdentityRecord,
    image::ProcessImage,
    link::Interface,
    pool::PacketPool,
    status::{StatusAggregator, PowerLedState, GatewayStatus},
    };


/// default size in bytes of each process image region
pub const PD_LEN: usize = 512;


pub struct Engine<D, C, const PD: usize = PD_LEN> {
    io: Interface<D, C>,
    config: Config,
    own: IdentityRecord,
    modules: [Option<Module<PD>>; MAX_MODULES],
    status: StatusAggregator,
    fieldbus_status: u8,
    bridge_running: bool,
    fatal: Option<Error>,
    /// last state logged for each slot
    reported: [Option<State>; MAX_MODULES],
}

impl<D: EthernetDriver, C: Clock, const PD: usize> Engine<D, C, PD> {
    /// reset the ethernet hardware and initialize every populated slot
    pub fn new(driver: D, clock: C, config: Config) -> Result<Self, Error> {
        config.validate(PD)?;
        let mut io = Interface {driver, clock, pool: PacketPool::new()};
        io.driver.hardware_reset();

        let mut modules = [const {None}; MAX_MODULES];
        for slot in SlotId::ALL {
            if ! config.is_active(slot)
                {continue}
            io.driver.select(slot);
            modules[slot.index()] = Some(Module::new(&mut io, &config, slot)?);
            debug!("{}: module slot initialized", slot.name());
        }
        info!("modgate engine started, input {} bytes, output {} bytes",
            config.input_length, config.output_length);

        Ok(Self {
            io,
            own: config.own_identity(),
            config,
            modules,
            status: StatusAggregator::new(),
            fieldbus_status: FIELDBUS_OFFLINE,
            bridge_running: false,
            fatal: None,
            reported: [None; MAX_MODULES],
        })
    }

    /**
        run one control cycle

        does nothing once a fatal error is latched, the caller should stop ticking when [Self::fatal_error] reports one
    */
    pub fn tick(&mut self) {
        if self.fatal.is_some()
            {return}
        if let Err(error) = self.cycle() {
            if error.is_fatal() {
                error!("communication stopped: {}", error);
                self.fatal = Some(error);
            }
            else {
                warn!("cycle aborted: {}", error);
            }
        }
    }

    fn cycle(&mut self) -> Result<(), Error> {
        let shared = Shared {
            config: &self.config,
            own: &self.own,
            fieldbus_status: self.fieldbus_status,
        };
        for slot in SlotId::ALL {
            let Some(module) = self.modules[slot.index()].as_mut()
                else {continue};
            self.io.driver.select(slot);
            module.receive(&mut self.io, &shared, self.bridge_running)?;
            if self.bridge_running
                {module.step(&mut self.io, &shared)?}
        }
        self.report();

        let now = self.io.clock.now_ms();
        let slots = SlotId::ALL.map(|slot| self.modules[slot.index()].as_ref()
            .map_or(PowerLedState::Init, Module::status));
        self.status.update(now, self.config.green_phase_ms, slots);
        Ok(())
    }

    /// log slot state changes
    fn report(&mut self) {
        for slot in SlotId::ALL {
            // the transient state is shown as the identification it belongs to
            let state = self.modules[slot.index()].as_ref()
                .map(|module| match module.state() {
                    State::IdResponse => State::IdRequest,
                    state => state,
                });
            if state != self.reported[slot.index()] {
                if let Some(state) = state
                    {info!("{}: {:?}", slot.name(), state)}
                self.reported[slot.index()] = state;
            }
        }
    }

    /// error that stopped the engine, if any
    pub fn fatal_error(&self) -> Option<Error> {self.fatal}

    /// frames are only handled while the bridge is running, they are dropped otherwise
    pub fn set_bridge_running(&mut self, running: bool) {
        if running != self.bridge_running
            {info!("bridge {}", if running {"running"} else {"stopped"})}
        self.bridge_running = running;
    }
    pub fn bridge_running(&self) -> bool {self.bridge_running}

    /// fieldbus status sent to the modules in the next cyclic frames
    pub fn set_own_fieldbus_status(&mut self, status: u8) {
        self.fieldbus_status = status;
    }
    pub fn own_fieldbus_status(&self) -> u8 {self.fieldbus_status}
    /// fieldbus status last reported by a module
    pub fn peer_fieldbus_status(&self, slot: SlotId) -> Option<u8> {
        self.module(slot).map(Module::peer_fieldbus_status)
    }

    /// module in the given slot, `None` if the slot is not populated
    pub fn module(&self, slot: SlotId) -> Option<&Module<PD>> {
        self.modules[slot.index()].as_ref()
    }
    pub fn state(&self, slot: SlotId) -> Option<State> {
        self.module(slot).map(Module::state)
    }
    pub fn active_input_length(&self, slot: SlotId) -> Option<u16> {
        self.module(slot).map(Module::active_input_length)
    }
    pub fn active_output_length(&self, slot: SlotId) -> Option<u16> {
        self.module(slot).map(Module::active_output_length)
    }
    pub fn peer_identity(&self, slot: SlotId) -> Option<&IdentityRecord> {
        self.module(slot).and_then(Module::peer)
    }
    pub fn own_identity(&self) -> &IdentityRecord {&self.own}
    pub fn diagnostics(&self, slot: SlotId) -> Option<Diagnostics> {
        self.module(slot).map(Module::diagnostics)
    }

    /// process data of a slot
    pub fn image(&self, slot: SlotId) -> Option<&ProcessImage<PD>> {
        self.module(slot).map(Module::image)
    }
    pub fn image_mut(&mut self, slot: SlotId) -> Option<&mut ProcessImage<PD>> {
        self.modules[slot.index()].as_mut().map(Module::image_mut)
    }

    /// combined status of all modules, `None` during the startup phase
    pub fn composite_status(&self) -> Option<PowerLedState> {self.status.composite()}
    /// combined status if it changed since the last call
    pub fn take_status_change(&mut self) -> Option<PowerLedState> {self.status.take_change()}
    /// running bits of the modules
    pub fn gateway_status(&self) -> GatewayStatus {
        let running = |slot| self.state(slot) == Some(State::Run);
        GatewayStatus::from_running(running(SlotId::Left), running(SlotId::Right))
    }

    pub fn config(&self) -> &Config {&self.config}
    pub fn pool(&self) -> &PacketPool {&self.io.pool}
    pub fn clock(&self) -> &C {&self.io.clock}
    pub fn driver(&self) -> &D {&self.io.driver}
    pub fn driver_mut(&mut self) -> &mut D {&mut self.io.driver}
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;
    use crate::{
        error::AllocTag,
        frame::Command,
        pool::POOL_CAPACITY,
        testing::{Wire, Fixed, peer_frame},
        };

    #[test]
    fn exhausted_pool_is_fatal() {
        let config = Config {active: [true, false], input_length: 32, output_length: 32, .. Config::default()};
        let mut engine = Engine::<Wire, Fixed, 64>::new(Wire::default(), Fixed(1), config).unwrap();
        engine.set_bridge_running(true);
        engine.tick();
        assert_eq!(engine.state(SlotId::Right), Some(State::LinkCheck));

        let held: Vec<_> = (0 .. POOL_CAPACITY)
            .map(|_| engine.io.pool.allocate(AllocTag::CyclicData, 10).unwrap())
            .collect();
        engine.tick();
        assert_eq!(engine.fatal_error(), Some(Error::OutOfMemory(AllocTag::Receive)));
        assert_eq!(engine.state(SlotId::Right), Some(State::LinkCheck));

        // the error is sticky, later ticks do nothing even with resources back
        for packet in held {
            engine.io.pool.release(packet).unwrap();
        }
        engine.io.driver.inbound.push_back(peer_frame(1, Command::IdRequest, &[]));
        let polled = engine.driver().polled;
        for _ in 0 .. 3 {
            engine.tick();
        }
        assert_eq!(engine.fatal_error(), Some(Error::OutOfMemory(AllocTag::Receive)));
        assert_eq!(engine.driver().polled, polled);
        assert_eq!(engine.driver().inbound.len(), 1);
        assert!(engine.driver().outbound.is_empty());
        assert_eq!(engine.state(SlotId::Right), Some(State::LinkCheck));
    }
}
