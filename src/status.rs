/*!
    status reported to the outside: composite state of the power indicator and gateway status bits
*/

use bilge::prelude::*;
use log::*;

use crate::{
    config::MAX_MODULES,
    driver::Timer,
    };


/// connection status of a module, ordered from most to least severe
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PowerLedState {
    #[default]
    Init,
    LinkMissing,
    DataMissing,
    Run,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndicatorPhase {
    Init,
    /// unconditional green after start, module status is ignored
    GreenPhase,
    Run,
}

/// combines the status of all modules into the state of one indicator
pub struct StatusAggregator {
    phase: IndicatorPhase,
    green: Timer,
    recorded: PowerLedState,
    changed: Option<PowerLedState>,
}
impl StatusAggregator {
    pub const fn new() -> Self {
        Self {
            phase: IndicatorPhase::Init,
            green: Timer::new(),
            recorded: PowerLedState::Init,
            changed: None,
        }
    }
    /// advance once per cycle with the current status of each slot
    pub fn update(&mut self, now: u32, green_phase_ms: u32, slots: [PowerLedState; MAX_MODULES]) {
        match self.phase {
            IndicatorPhase::Init => {
                self.green.start(now, green_phase_ms);
                self.phase = IndicatorPhase::GreenPhase;
            },
            IndicatorPhase::GreenPhase => if self.green.expired(now) {
                self.green.stop();
                self.phase = IndicatorPhase::Run;
                // next computed state is always reported
                self.recorded = PowerLedState::Init;
            },
            IndicatorPhase::Run => {
                let current = combine(slots[0], slots[1]);
                if current != self.recorded {
                    info!("status indicator {:?} -> {:?}", self.recorded, current);
                    self.recorded = current;
                    self.changed = Some(current);
                }
            },
        }
    }
    pub fn phase(&self) -> IndicatorPhase {self.phase}
    /// composite status, `None` until the green phase is over
    pub fn composite(&self) -> Option<PowerLedState> {
        (self.phase == IndicatorPhase::Run).then_some(self.recorded)
    }
    /// composite status if it changed since the last call
    pub fn take_change(&mut self) -> Option<PowerLedState> {
        self.changed.take()
    }
}
impl Default for StatusAggregator {
    fn default() -> Self {Self::new()}
}

/**
    composite of two module status

    a module without link is treated as absent, otherwise the most severe status wins, the first module on ties
*/
pub fn combine(first: PowerLedState, second: PowerLedState) -> PowerLedState {
    if first <= PowerLedState::LinkMissing
        {second}
    else if second <= PowerLedState::LinkMissing
        {first}
    else
        {first.min(second)}
}


/// device status bits published for the gateway modules
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq, Default)]
pub struct GatewayStatus {
    _reserved: u4,
    /// left module exchanges process data
    pub left_running: bool,
    /// right module exchanges process data
    pub right_running: bool,
    _padding: u2,
}

impl GatewayStatus {
    pub fn from_running(left: bool, right: bool) -> Self {
        let mut status = Self::from(0u8);
        status.set_left_running(left);
        status.set_right_running(right);
        status
    }
}
