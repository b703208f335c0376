//! in memory ethernet controller and fixed clock for unit tests

use std::{vec, vec::Vec, collections::VecDeque};

use crate::{
    driver::{EthernetDriver, Clock},
    frame::{self, Command, LinkHeader, TransportHeader, HEADER, LINK_HEADER, MAX_FRAME},
    };


#[derive(Default)]
pub struct Wire {
    pub down: bool,
    pub fail: bool,
    /// report more bytes than a frame can hold
    pub oversize: bool,
    pub inbound: VecDeque<Vec<u8>>,
    pub outbound: Vec<Vec<u8>>,
    /// calls to `receive`
    pub polled: usize,
}
impl EthernetDriver for Wire {
    type Error = ();
    fn hardware_reset(&mut self) {}
    fn init(&mut self) -> Result<(), ()> {Ok(())}
    fn link_up(&mut self) -> bool {! self.down}
    fn send(&mut self, frame: &[u8]) -> Result<(), ()> {
        if self.fail {return Err(())}
        self.outbound.push(frame.to_vec());
        Ok(())
    }
    fn receive(&mut self, buffer: &mut [u8]) -> Option<usize> {
        self.polled += 1;
        let frame = self.inbound.pop_front()?;
        buffer[.. frame.len()].copy_from_slice(&frame);
        Some(if self.oversize {MAX_FRAME + 100} else {frame.len()})
    }
}

pub struct Fixed(pub u32);
impl Clock for Fixed {
    fn now_ms(&self) -> u32 {self.0}
}

/// frame as sent by a module
pub fn peer_frame(counter: u8, command: Command, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0; HEADER + payload.len()];
    let mut header = LinkHeader::new(95, 0x10);
    header.counter = counter;
    frame::encode(&mut frame, header).unwrap();
    frame::encode(&mut frame[LINK_HEADER ..], TransportHeader::new(command, payload.len() as u16)).unwrap();
    frame[HEADER ..].copy_from_slice(payload);
    frame
}
