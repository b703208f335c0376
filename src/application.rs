/*!
    application layer: identity exchange and cyclic process data of one module

    each populated slot owns a [Module], advanced by the engine once per cycle in two steps: [Module::receive] handles all frames received since the last cycle, [Module::step] runs the state machine and sends what is due.
*/

use log::*;

use crate::{
    config::{Config, SlotId},
    driver::{EthernetDriver, Clock, Timer},
    error::{Error, AllocTag},
    frame::{self, Command, IdentityRecord, CyclicHeader, HEADER, IDENTITY, CYCLIC_HEADER},
    image::ProcessImage,
    link::{Interface, Link},
    pool::Packet,
    status::PowerLedState,
    };


/// number of frame level log messages allowed between two refills
pub const LOG_BUDGET: u16 = 100;


/// communication state of a module
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    HwCheck,
    LinkCheck,
    IdRequest,
    /// transient, while answering an accepted identity
    IdResponse,
    RunNoData,
    Run,
}

/// event counters of a module
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub received: u32,
    pub sent: u32,
    /// discarded because the bridge was not running
    pub dropped: u32,
    /// discarded by the link layer filter
    pub filtered: u32,
    pub invalid_size: u32,
    pub invalid_offset: u32,
    pub rejected_identities: u32,
    pub unknown_commands: u32,
    pub send_failures: u32,
    /// frames not acknowledged in time by the link layer
    pub ack_timeouts: u32,
    /// cycles where the module did not answer cyclic data in time
    pub data_timeouts: u32,
}

/// settings common to all modules, borrowed from the engine for one cycle
pub struct Shared<'a> {
    pub config: &'a Config,
    pub own: &'a IdentityRecord,
    pub fieldbus_status: u8,
}

/// frame to send in answer to a received one
enum Reply {
    Nothing,
    IdRequest,
    IdResponse,
}

/// limits frame level logging, so a chatty peer cannot flood the log
struct LogBudget(u16);
impl LogBudget {
    fn allow(&mut self) -> bool {
        match self.0.checked_sub(1) {
            Some(remaining) => {self.0 = remaining; true},
            None => false,
        }
    }
    fn refill(&mut self) {self.0 = LOG_BUDGET}
}

pub struct Module<const PD: usize> {
    slot: SlotId,
    link: Link,
    state: State,
    status: PowerLedState,
    peer: Option<IdentityRecord>,
    peer_fieldbus_status: u8,
    /// declared lengths of this controller
    input_length: u16,
    output_length: u16,
    active_input: u16,
    active_output: u16,
    image: ProcessImage<PD>,
    timer: Timer,
    send_due: bool,
    retry: u8,
    budget: LogBudget,
    diagnostics: Diagnostics,
}

impl<const PD: usize> Module<PD> {
    /// initialize the controller of the currently selected slot
    pub fn new<D: EthernetDriver, C>(io: &mut Interface<D, C>, config: &Config, slot: SlotId) -> Result<Self, Error> {
        config.validate(PD)?;
        Ok(Self {
            slot,
            link: Link::init(io, config.device_type, slot)?,
            state: State::HwCheck,
            status: PowerLedState::Init,
            peer: None,
            peer_fieldbus_status: crate::config::FIELDBUS_OFFLINE,
            input_length: config.input_length,
            output_length: config.output_length,
            active_input: 0,
            active_output: 0,
            image: ProcessImage::new(usize::from(config.input_length), usize::from(config.output_length)),
            timer: Timer::new(),
            send_due: false,
            retry: 0,
            budget: LogBudget(LOG_BUDGET),
            diagnostics: Diagnostics::default(),
        })
    }

    pub fn slot(&self) -> SlotId {self.slot}
    pub fn state(&self) -> State {self.state}
    pub fn status(&self) -> PowerLedState {self.status}
    /// identity of the module, once accepted
    pub fn peer(&self) -> Option<&IdentityRecord> {self.peer.as_ref()}
    pub fn peer_fieldbus_status(&self) -> u8 {self.peer_fieldbus_status}
    pub fn active_input_length(&self) -> u16 {self.active_input}
    pub fn active_output_length(&self) -> u16 {self.active_output}
    pub fn image(&self) -> &ProcessImage<PD> {&self.image}
    pub fn image_mut(&mut self) -> &mut ProcessImage<PD> {&mut self.image}
    pub fn link(&self) -> &Link {&self.link}
    /// consecutive cyclic sends without answer
    pub fn retries(&self) -> u8 {self.retry}
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {filtered: self.link.filtered(), .. self.diagnostics}
    }

    /**
        handle all frames received since the last cycle

        frames are dropped while the bridge is not running. Only fatal errors are returned.
    */
    pub fn receive<D: EthernetDriver, C: Clock>(&mut self, io: &mut Interface<D, C>, shared: &Shared, bridge_running: bool) -> Result<(), Error> {
        loop {
            match self.link.receive(io) {
                Ok(packet) if ! bridge_running => {
                    self.diagnostics.dropped = self.diagnostics.dropped.wrapping_add(1);
                    if self.budget.allow()
                        {debug!("{}: bridge not running, frame dropped", self.slot.name())}
                    io.pool.release(packet)?;
                },
                Ok(packet) => {
                    self.diagnostics.received = self.diagnostics.received.wrapping_add(1);
                    self.dispatch(io, shared, packet)?;
                },
                Err(Error::NoPacket) => return Ok(()),
                Err(Error::NoLink) => {
                    if self.state != State::LinkCheck {
                        warn!("{}: link lost", self.slot.name());
                        self.state = State::LinkCheck;
                        self.timer.stop();
                        self.send_due = false;
                    }
                    return Ok(())
                },
                Err(error) => return Err(error),
            }
        }
    }

    fn dispatch<D: EthernetDriver, C: Clock>(&mut self, io: &mut Interface<D, C>, shared: &Shared, packet: Packet) -> Result<(), Error> {
        let reply = self.handle(io.pool.buffer(&packet)?);
        io.pool.release(packet)?;
        match reply {
            Reply::Nothing => Ok(()),
            Reply::IdRequest => {
                let result = self.send_id_request(io);
                self.absorb("identity request", result).map(|_| ())
            },
            Reply::IdResponse => {
                let result = self.send_id_response(io, shared);
                self.absorb("identity response", result)?;
                self.state = State::RunNoData;
                self.status = PowerLedState::DataMissing;
                self.retry = 0;
                self.send_due = true;
                self.timer.stop();
                Ok(())
            },
        }
    }

    /// interpret a received frame
    fn handle(&mut self, frame: &[u8]) -> Reply {
        // the link layer only passes complete frames
        let (Some(header), Some(payload)) = (frame::transport(frame), frame::payload(frame))
            else {return Reply::Nothing};
        if self.budget.allow()
            {trace!("{}: received {:?} in {:?}", self.slot.name(), header.command, self.state)}

        match header.command {
            Command::IdRequest => Reply::IdRequest,
            Command::IdResponse if self.state >= State::IdRequest => {
                match self.negotiate(payload) {
                    Ok(()) => {
                        info!("{}: module identified, input {} bytes, output {} bytes",
                            self.slot.name(), self.active_input, self.active_output);
                        Reply::IdResponse
                    },
                    Err(error) => {
                        self.diagnostics.rejected_identities = self.diagnostics.rejected_identities.wrapping_add(1);
                        warn!("{}: identity rejected: {}", self.slot.name(), error);
                        Reply::Nothing
                    },
                }
            },
            Command::CyclicData if self.state >= State::RunNoData => {
                match self.apply_cyclic(payload) {
                    Ok(()) => {
                        self.state = State::Run;
                        self.status = PowerLedState::Run;
                        self.retry = 0;
                        self.send_due = true;
                        self.timer.stop();
                    },
                    Err(error) => {
                        match error {
                            Error::InvalidDataOffset => self.diagnostics.invalid_offset = self.diagnostics.invalid_offset.wrapping_add(1),
                            _ => self.diagnostics.invalid_size = self.diagnostics.invalid_size.wrapping_add(1),
                        }
                        if self.budget.allow()
                            {warn!("{}: cyclic data rejected: {}", self.slot.name(), error)}
                    },
                }
                Reply::Nothing
            },
            Command::IdResponse | Command::CyclicData => {
                if self.budget.allow()
                    {debug!("{}: {:?} ignored in {:?}", self.slot.name(), header.command, self.state)}
                Reply::Nothing
            },
            command => {
                self.diagnostics.unknown_commands = self.diagnostics.unknown_commands.wrapping_add(1);
                if self.budget.allow()
                    {warn!("{}: unsupported command {:?}", self.slot.name(), command)}
                Reply::Nothing
            },
        }
    }

    /// accept the identity of the module and agree on the process data lengths
    fn negotiate(&mut self, payload: &[u8]) -> Result<(), Error> {
        let peer: IdentityRecord = frame::decode(payload).ok_or(Error::Truncated)?;
        if ! peer.features.io_data_exchange()
            {return Err(Error::UnsupportedPeer)}
        let (active_input, active_output) = negotiate(self.input_length, self.output_length, &peer);
        self.active_input = active_input;
        self.active_output = active_output;
        self.peer = Some(peer);
        self.state = State::IdResponse;
        self.image.input_mut().fill(0);
        Ok(())
    }

    /// copy the data of a cyclic frame in the input region, if it fits the negotiated length
    fn apply_cyclic(&mut self, payload: &[u8]) -> Result<(), Error> {
        let header: CyclicHeader = frame::decode(payload).ok_or(Error::InvalidDataSize)?;
        let (offset, length) = (usize::from(header.offset), usize::from(header.length));
        let data = check_cyclic(payload, self.active_input, &header)?;
        self.image.input_mut()[offset ..][.. length] .copy_from_slice(data);
        self.peer_fieldbus_status = header.fieldbus_status;
        Ok(())
    }

    /**
        advance the state machine, to be called once per cycle while the bridge is running

        only fatal errors are returned
    */
    pub fn step<D: EthernetDriver, C: Clock>(&mut self, io: &mut Interface<D, C>, shared: &Shared) -> Result<(), Error> {
        let now = io.clock.now_ms();
        self.link.poll(now, shared.config.ack_timeout_ms);
        if self.link.timed_out() {
            self.diagnostics.ack_timeouts = self.diagnostics.ack_timeouts.wrapping_add(1);
            if self.budget.allow()
                {trace!("{}: frame {} not acknowledged", self.slot.name(), self.link.counter().wrapping_sub(1))}
        }

        match self.state {
            State::HwCheck => {
                self.status = PowerLedState::LinkMissing;
                self.state = State::LinkCheck;
            },
            State::LinkCheck => {
                self.clear_input();
                if io.driver.link_up() {
                    info!("{}: link up", self.slot.name());
                    self.budget.refill();
                    self.status = PowerLedState::DataMissing;
                    self.state = State::IdRequest;
                }
                else {
                    self.status = PowerLedState::LinkMissing;
                }
            },
            // driven by the module
            State::IdRequest | State::IdResponse => {},
            State::RunNoData | State::Run => {
                if self.state == State::RunNoData
                    {self.clear_input()}
                if self.send_due {
                    let result = self.send_cyclic(io, shared.fieldbus_status);
                    if self.absorb("cyclic data", result)? {
                        self.send_due = false;
                        self.timer.start(now, shared.config.al_timeout_ms);
                    }
                }
                else if self.timer.expired(now) {
                    self.timer.stop();
                    self.retry += 1;
                    self.diagnostics.data_timeouts = self.diagnostics.data_timeouts.wrapping_add(1);
                    if self.retry >= shared.config.max_retry {
                        warn!("{}: no data after {} retries, restarting identification", self.slot.name(), self.retry);
                        self.fallback();
                    }
                    else {
                        self.send_due = true;
                    }
                }
            },
        }
        Ok(())
    }

    /// restart identity exchange
    fn fallback(&mut self) {
        self.clear_input();
        self.budget.refill();
        self.retry = 0;
        self.send_due = false;
        self.peer_fieldbus_status = crate::config::FIELDBUS_OFFLINE;
        self.status = PowerLedState::DataMissing;
        self.state = State::IdRequest;
    }

    fn clear_input(&mut self) {
        let active = usize::from(self.active_input);
        self.image.input_mut()[.. active].fill(0);
    }

    fn send_id_request<D: EthernetDriver, C: Clock>(&mut self, io: &mut Interface<D, C>) -> Result<(), Error> {
        send_frame(&mut self.link, io, AllocTag::IdRequest, Command::IdRequest, 0, |_| Ok(()))
    }

    fn send_id_response<D: EthernetDriver, C: Clock>(&mut self, io: &mut Interface<D, C>, shared: &Shared) -> Result<(), Error> {
        let own = *shared.own;
        send_frame(&mut self.link, io, AllocTag::IdResponse, Command::IdResponse, IDENTITY, |payload| {
            frame::encode(payload, own).ok_or(Error::FrameTooLarge)?;
            Ok(())
        })
    }

    fn send_cyclic<D: EthernetDriver, C: Clock>(&mut self, io: &mut Interface<D, C>, fieldbus_status: u8) -> Result<(), Error> {
        let header = CyclicHeader {
            fieldbus_status,
            length: self.active_output,
            offset: 0,
        };
        let data = &self.image.output()[.. usize::from(self.active_output)];
        send_frame(&mut self.link, io, AllocTag::CyclicData, Command::CyclicData, CYCLIC_HEADER + data.len(), |payload| {
            frame::encode(payload, header).ok_or(Error::FrameTooLarge)?;
            payload[CYCLIC_HEADER ..] .copy_from_slice(data);
            Ok(())
        })
    }

    /// count and log the outcome of a send, returning whether the frame left, or a fatal error
    fn absorb(&mut self, what: &str, result: Result<(), Error>) -> Result<bool, Error> {
        match result {
            Ok(()) => {
                self.diagnostics.sent = self.diagnostics.sent.wrapping_add(1);
                if self.budget.allow()
                    {trace!("{}: sent {}", self.slot.name(), what)}
                Ok(true)
            },
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                if error == Error::SendFailed
                    {self.diagnostics.send_failures = self.diagnostics.send_failures.wrapping_add(1)}
                if self.budget.allow()
                    {debug!("{}: cannot send {}: {}", self.slot.name(), what, error)}
                Ok(false)
            },
        }
    }
}

/// build an outbound frame in a new packet and pass it to the link layer
fn send_frame<D, C, F>(link: &mut Link, io: &mut Interface<D, C>, tag: AllocTag, command: Command, length: usize, fill: F) -> Result<(), Error>
where
    D: EthernetDriver,
    C: Clock,
    F: FnOnce(&mut [u8]) -> Result<(), Error>,
{
    let packet = io.pool.allocate(tag, HEADER + length)?;
    let built = io.pool.buffer_mut(&packet)
        .and_then(|buffer| fill(frame::write_transport(buffer, command, length)?));
    if let Err(error) = built {
        io.pool.release(packet)?;
        return Err(error);
    }
    link.send(io, packet)
}

/**
    process data lengths agreed with a module: `(active input, active output)`

    each direction is limited by what the sender can send and what the receiver can take
*/
pub fn negotiate(own_input: u16, own_output: u16, peer: &IdentityRecord) -> (u16, u16) {
    (own_input.min(peer.output_length), own_output.min(peer.input_length))
}

/// data of a cyclic frame payload, if it fits in an input of `active` bytes
pub fn check_cyclic<'p>(payload: &'p [u8], active: u16, header: &CyclicHeader) -> Result<&'p [u8], Error> {
    let (offset, length, active) = (usize::from(header.offset), usize::from(header.length), usize::from(active));
    let data = payload.get(CYCLIC_HEADER ..)
        .and_then(|data| data.get(.. length))
        .ok_or(Error::InvalidDataSize)?;
    if length > active
        {return Err(Error::InvalidDataSize)}
    if offset + length > active
        {return Err(Error::InvalidDataOffset)}
    Ok(data)
}
