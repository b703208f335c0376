//! in memory ethernet link to simulated gateway modules, and a manual clock
#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    };

use modgatecom::{
    frame::{self, Command, LinkHeader, TransportHeader, IdentityRecord, CyclicHeader, Features,
            HEADER, LINK_HEADER, CYCLIC_HEADER},
    Clock, EthernetDriver, SlotId,
    };


/// wire to the module of one slot
#[derive(Default)]
pub struct Wire {
    pub down: bool,
    pub fail_send: bool,
    pub fail_init: bool,
    /// frames sent by the module, waiting to be received by the engine
    pub inbound: VecDeque<Vec<u8>>,
    /// frames sent by the engine
    pub outbound: Vec<Vec<u8>>,
}

#[derive(Default)]
pub struct Bus {
    pub selected: Option<SlotId>,
    pub wires: [Wire; 2],
    pub resets: usize,
}

/// driver handle, cloned to keep access to the bus while the engine owns it
#[derive(Clone, Default)]
pub struct SimDriver(pub Rc<RefCell<Bus>>);

impl SimDriver {
    pub fn wire<R>(&self, slot: SlotId, f: impl FnOnce(&mut Wire) -> R) -> R {
        f(&mut self.0.borrow_mut().wires[slot.index()])
    }
    pub fn push(&self, slot: SlotId, frame: Vec<u8>) {
        self.wire(slot, |wire| wire.inbound.push_back(frame))
    }
    pub fn set_link(&self, slot: SlotId, up: bool) {
        self.wire(slot, |wire| wire.down = ! up)
    }
    /// take the frames sent to a module so far
    pub fn sent(&self, slot: SlotId) -> Vec<Vec<u8>> {
        self.wire(slot, |wire| std::mem::take(&mut wire.outbound))
    }
    fn current<R>(&mut self, f: impl FnOnce(&mut Wire) -> R) -> R {
        let mut bus = self.0.borrow_mut();
        let slot = bus.selected.unwrap_or(SlotId::Right);
        f(&mut bus.wires[slot.index()])
    }
}

impl EthernetDriver for SimDriver {
    type Error = &'static str;

    fn hardware_reset(&mut self) {
        self.0.borrow_mut().resets += 1;
    }
    fn init(&mut self) -> Result<(), Self::Error> {
        if self.current(|wire| wire.fail_init) {Err("no phy")} else {Ok(())}
    }
    fn select(&mut self, slot: SlotId) {
        self.0.borrow_mut().selected = Some(slot);
    }
    fn link_up(&mut self) -> bool {
        self.current(|wire| ! wire.down)
    }
    fn send(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        self.current(|wire| {
            if wire.fail_send {return Err("tx busy")}
            wire.outbound.push(frame.to_vec());
            Ok(())
        })
    }
    fn receive(&mut self, buffer: &mut [u8]) -> Option<usize> {
        self.current(|wire| {
            if wire.down {return None}
            let frame = wire.inbound.pop_front()?;
            buffer[.. frame.len()].copy_from_slice(&frame);
            Some(frame.len())
        })
    }
}

#[derive(Clone, Default)]
pub struct ManualClock(pub Rc<Cell<u32>>);

impl ManualClock {
    pub fn advance(&self, ms: u32) {
        self.0.set(self.0.get().wrapping_add(ms))
    }
}
impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {self.0.get()}
}


/// frame builder of a simulated module
pub struct Peer {
    header: LinkHeader,
}
impl Peer {
    pub fn new() -> Self {
        Self {header: LinkHeader::new(96, 0x10)}
    }
    fn frame(&mut self, command: Command, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0; HEADER + payload.len()];
        frame::encode(&mut frame, self.header).unwrap();
        frame::encode(&mut frame[LINK_HEADER ..], TransportHeader::new(command, payload.len() as u16)).unwrap();
        frame[HEADER ..].copy_from_slice(payload);
        self.header.counter = match self.header.counter.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        frame
    }
    pub fn id_request(&mut self) -> Vec<u8> {
        self.frame(Command::IdRequest, &[])
    }
    pub fn id_response(&mut self, identity: IdentityRecord) -> Vec<u8> {
        let mut payload = [0; frame::IDENTITY];
        frame::encode(&mut payload, identity).unwrap();
        self.frame(Command::IdResponse, &payload)
    }
    pub fn cyclic(&mut self, fieldbus_status: u8, offset: u16, data: &[u8]) -> Vec<u8> {
        let mut payload = vec![0; CYCLIC_HEADER + data.len()];
        let header = CyclicHeader {fieldbus_status, length: data.len() as u16, offset};
        frame::encode(&mut payload, header).unwrap();
        payload[CYCLIC_HEADER ..].copy_from_slice(data);
        self.frame(Command::CyclicData, &payload)
    }
    pub fn raw(&mut self, command: Command, payload: &[u8]) -> Vec<u8> {
        self.frame(command, payload)
    }
}

/// identity of a module able to exchange the given amount of data
pub fn module_identity(input_length: u16, output_length: u16) -> IdentityRecord {
    IdentityRecord {
        serial: 4242,
        module_type: 93,
        hardware_revision: 1,
        software_major: 1,
        software_minor: 3,
        build_revision: 1234,
        input_length,
        output_length,
        features: Features::data_exchange(),
    }
}

/// command and payload of a frame sent by the engine
pub fn parse(frame: &[u8]) -> (Command, Vec<u8>) {
    let header = frame::transport(frame).unwrap();
    (header.command, frame::payload(frame).unwrap().to_vec())
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
