/*!
    periodic execution of an [Engine] on a tokio runtime
*/

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use log::*;

use crate::{
    driver::{EthernetDriver, Clock},
    engine::Engine,
    error::Error,
    mutex::BusyMutex,
    };


/**
    tick the engine every `period` until it reports a fatal error, which is returned

    the engine is only locked during a tick, so the host can lock it in between to exchange process data. Late ticks are delayed rather than run in a burst.
*/
pub async fn run<D, C, const PD: usize>(engine: &BusyMutex<Engine<D, C, PD>>, period: Duration) -> Error
where
    D: EthernetDriver,
    C: Clock,
{
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("cycle started, period {:?}", period);
    loop {
        ticks.tick().await;
        let mut engine = engine.lock().await;
        engine.tick();
        if let Some(error) = engine.fatal_error() {
            error!("cycle stopped: {}", error);
            return error;
        }
    }
}
