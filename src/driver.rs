/*!
    collaborators consumed by the engine: the ethernet controller and a monotonic millisecond clock
*/

use core::fmt::Debug;
use crate::config::SlotId;


/**
    ethernet controller attached to the gateway modules

    all methods must return immediately, the engine polls them once per cycle
*/
pub trait EthernetDriver {
    type Error: Debug;

    /// reset the controller hardware, once before any module is initialized
    fn hardware_reset(&mut self);
    /// initialize the controller for the currently selected module
    fn init(&mut self) -> Result<(), Self::Error>;
    /// route the following calls to the controller of the given module
    fn select(&mut self, _slot: SlotId) {}
    /// whether the physical link is up
    fn link_up(&mut self) -> bool;
    /// transmit a complete frame
    fn send(&mut self, frame: &[u8]) -> Result<(), Self::Error>;
    /// copy the next received frame in `buffer` and return its size, `None` if nothing was received
    fn receive(&mut self, buffer: &mut [u8]) -> Option<usize>;
}

/// monotonic millisecond clock, wrapping
pub trait Clock {
    fn now_ms(&self) -> u32;
}

impl<C: Clock> Clock for &C {
    fn now_ms(&self) -> u32 {(*self).now_ms()}
}


/// cooperative one-shot timer, polled against a [Clock]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Timer {
    start: u32,
    duration: u32,
    armed: bool,
}
impl Timer {
    pub const fn new() -> Self {
        Self {start: 0, duration: 0, armed: false}
    }
    pub fn start(&mut self, now: u32, duration: u32) {
        self.start = now;
        self.duration = duration;
        self.armed = true;
    }
    pub fn stop(&mut self) {
        self.armed = false;
    }
    pub fn is_armed(&self) -> bool {self.armed}
    /// true once the duration elapsed since start, as long as the timer is armed
    pub fn expired(&self, now: u32) -> bool {
        self.armed && now.wrapping_sub(self.start) >= self.duration
    }
}

/// replace a timestamp of 0 which is reserved for "not armed"
pub fn stamp(now: u32) -> u32 {
    if now == 0 {1} else {now}
}


/// [Clock] counting from its creation
#[cfg(feature = "std")]
#[derive(Copy, Clone, Debug)]
pub struct StdClock {
    origin: std::time::Instant,
}
#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {origin: std::time::Instant::now()}
    }
}
#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {Self::new()}
}
#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&self) -> u32 {
        // truncation gives the wrapping behavior of a hardware tick counter
        self.origin.elapsed().as_millis() as u32
    }
}
