/*!
    modgate communication between a controller and its gateway modules

    A gateway module sits on each side of the controller and is reached through its own ethernet controller. The [Engine] identifies each module, negotiates the process data lengths and then exchanges process data with it every control cycle.

    The engine is `no_std` and allocation free. The ethernet controller and the clock are provided by implementing [EthernetDriver] and [Clock].
*/
#![no_std]
#[cfg(any(test, feature = "std"))]
extern crate std;

mod utils;
pub mod error;
pub mod config;
pub mod frame;
pub mod pool;
pub mod driver;
pub mod link;
pub mod application;
pub mod status;
pub mod image;
pub mod engine;
pub mod mutex;
#[cfg(feature = "runner")]
pub mod runner;
#[cfg(test)]
mod testing;

pub use error::{Error, AllocTag};
pub use config::{Config, DeviceIdentity, SlotId};
pub use driver::{EthernetDriver, Clock, Timer};
#[cfg(feature = "std")]
pub use driver::StdClock;
pub use application::{State, Diagnostics};
pub use status::{PowerLedState, GatewayStatus};
pub use image::{ProcessImage, Register};
pub use engine::Engine;
pub use mutex::BusyMutex;
