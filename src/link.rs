/*!
    link layer: addressing, rolling counters and acknowledgment tracking of one module

    at most one frame is in flight per module. The last transmitted frame stays owned by the link until it is replaced by the next one or the link is aborted.
*/

use log::*;

use crate::{
    config::SlotId,
    driver::{EthernetDriver, Clock, stamp},
    error::{Error, AllocTag},
    frame::{self, LinkHeader, HEADER, MAX_FRAME},
    pool::{PacketPool, Packet},
    };


/// resources shared by all modules of an engine
pub struct Interface<D, C> {
    pub driver: D,
    pub clock: C,
    pub pool: PacketPool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingAck,
}

pub struct Link {
    /// header template stamped on every outbound frame
    header: LinkHeader,
    phase: Phase,
    /// time of last successful send, 0 when not waiting
    send_tick: u32,
    /// time of last valid reception since the last send, 0 if none
    recv_tick: u32,
    timed_out: bool,
    send_retry: u8,
    /// last transmitted frame
    last: Option<Packet>,
    /// inbound frames discarded by the filter
    filtered: u32,
}

impl Link {
    /// prepare the link for the given module and initialize its ethernet controller
    pub fn init<D: EthernetDriver, C>(io: &mut Interface<D, C>, device_type: u8, slot: SlotId) -> Result<Self, Error> {
        if let Err(error) = io.driver.init() {
            error!("{}: ethernet controller init failed: {:?}", slot.name(), error);
            return Err(Error::HardwareReset);
        }
        Ok(Self {
            header: LinkHeader::new(device_type, slot.position()),
            phase: Phase::Idle,
            send_tick: 0,
            recv_tick: 0,
            timed_out: false,
            send_retry: 0,
            last: None,
            filtered: 0,
        })
    }

    /// true while waiting for an acknowledgment
    pub fn pending(&self) -> bool {self.send_tick != 0}
    pub fn phase(&self) -> Phase {self.phase}
    /// true once after a timeout occured
    pub fn timed_out(&mut self) -> bool {
        core::mem::take(&mut self.timed_out)
    }
    /// stop waiting for an acknowledgment and free the retained frame
    pub fn abort(&mut self, pool: &mut PacketPool) -> Result<(), Error> {
        self.send_tick = 0;
        self.phase = Phase::Idle;
        match self.last.take() {
            Some(packet) => pool.release(packet),
            None => Ok(()),
        }
    }

    /**
        stamp and transmit a frame built by the application layer

        the packet is consumed on all paths: retained as last frame on success, released otherwise
    */
    pub fn send<D: EthernetDriver, C: Clock>(&mut self, io: &mut Interface<D, C>, packet: Packet) -> Result<(), Error> {
        if ! io.driver.link_up() {
            io.pool.release(packet)?;
            self.abort(&mut io.pool)?;
            return Err(Error::NoLink);
        }
        let header = self.header;
        let result = io.pool.buffer_mut(&packet).and_then(|buffer| {
            frame::encode(buffer, header).ok_or(Error::FrameTooLarge)?;
            io.driver.send(buffer).map_err(|error| {
                warn!("transmit failed: {:?}", error);
                Error::SendFailed
            })
        });
        if let Err(error) = result {
            io.pool.release(packet)?;
            return Err(error);
        }

        self.phase = Phase::AwaitingAck;
        self.recv_tick = 0;
        self.send_retry = 0;
        self.send_tick = stamp(io.clock.now_ms());
        if let Some(previous) = self.last.replace(packet) {
            io.pool.release(previous)?;
        }
        self.header.counter = next_counter(self.header.counter);
        Ok(())
    }

    /**
        fetch the next valid frame from the controller

        frames from other protocols and truncated frames are skipped. The returned packet is owned by the caller.
    */
    pub fn receive<D: EthernetDriver, C: Clock>(&mut self, io: &mut Interface<D, C>) -> Result<Packet, Error> {
        let mut packet = io.pool.allocate(AllocTag::Receive, MAX_FRAME)?;
        if ! io.driver.link_up() {
            io.pool.release(packet)?;
            self.abort(&mut io.pool)?;
            return Err(Error::NoLink);
        }
        loop {
            match read(io, &mut packet) {
                Ok(Some(Ok(header))) => {
                    // echoed in the next frame we send
                    self.header.ack = header.counter;
                    self.recv_tick = stamp(io.clock.now_ms());
                    return Ok(packet);
                },
                Ok(Some(Err(reason))) => {
                    self.filtered = self.filtered.wrapping_add(1);
                    debug!("discard frame of {} bytes: {}", packet.len(), reason);
                },
                Ok(None) => {
                    io.pool.release(packet)?;
                    return Err(Error::NoPacket);
                },
                Err(error) => {
                    io.pool.release(packet)?;
                    return Err(error);
                },
            }
        }
    }

    /**
        update acknowledgment tracking, to be called once per cycle

        any valid frame received after a send ends the wait. Without one the wait ends after `timeout` and raises the timed out flag, the retained frame is not sent again.
    */
    pub fn poll(&mut self, now: u32, timeout: u32) {
        if self.phase != Phase::AwaitingAck
            {return}
        if self.recv_tick != 0 {
            self.phase = Phase::Idle;
            self.send_tick = 0;
        }
        else if now.wrapping_sub(self.send_tick) >= timeout {
            self.phase = Phase::Idle;
            self.send_tick = 0;
            self.timed_out = true;
            self.send_retry = self.send_retry.saturating_add(1);
        }
    }

    /// counter that will be stamped on the next frame
    pub fn counter(&self) -> u8 {self.header.counter}
    /// counter echoed in the next frame
    pub fn ack(&self) -> u8 {self.header.ack}
    /// frame retained since the last successful send
    pub fn last_sent(&self) -> Option<&Packet> {self.last.as_ref()}
    /// timeouts since the last successful send
    pub fn retries(&self) -> u8 {self.send_retry}
    pub fn filtered(&self) -> u32 {self.filtered}
}

/// rolling counter skipping 0
fn next_counter(counter: u8) -> u8 {
    match counter.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

/// copy the next frame from the controller in `packet`, and check it
fn read<D: EthernetDriver, C>(io: &mut Interface<D, C>, packet: &mut Packet) -> Result<Option<Result<LinkHeader, &'static str>>, Error> {
    io.pool.resize(packet, MAX_FRAME)?;
    let Some(size) = io.driver.receive(io.pool.buffer_mut(packet)?)
        else {return Ok(None)};
    io.pool.resize(packet, size.min(MAX_FRAME))?;
    Ok(Some(accept(io.pool.buffer(packet)?)))
}

/// check the addressing and completeness of a received frame
fn accept(frame: &[u8]) -> Result<LinkHeader, &'static str> {
    let header: LinkHeader = frame::decode(frame).ok_or("shorter than link header")?;
    if ! header.is_modgate()
        {return Err("other protocol")}
    let transport = frame::transport(frame).ok_or("shorter than transport header")?;
    if frame.len() < HEADER + usize::from(transport.length)
        {return Err("incomplete payload")}
    Ok(header)
}
