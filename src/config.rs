use crate::{
    error::Error,
    frame::{IdentityRecord, Features, MAX_CYCLIC_DATA},
    };


/// maximum number of gateway modules managed by an engine
pub const MAX_MODULES: usize = 2;

/// application layer: time to wait for the peer's cyclic data after each send
pub const AL_TIMEOUT_MS: u32 = 80;
/// application layer: consecutive missed answers before identity exchange is restarted
pub const AL_MAX_RETRY: u8 = 5;
/// link layer: time after which an unanswered frame is reported timed out
pub const ACK_TIMEOUT_MS: u32 = 40;
/// duration of the green phase of the status indicator after start
pub const GREEN_PHASE_MS: u32 = 2000;
/// device type byte of the controller, used in the source address
pub const DEVICE_TYPE_CORE: u8 = 95;
/// fieldbus state reported before anything else is known
pub const FIELDBUS_OFFLINE: u8 = 0;


/// physical position of a gateway module
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlotId {
    Right = 0,
    Left = 1,
}
impl SlotId {
    pub const ALL: [SlotId; MAX_MODULES] = [SlotId::Right, SlotId::Left];

    pub const fn index(self) -> usize {self as usize}
    /// last byte of the source address of frames sent to this module
    pub const fn position(self) -> u8 {
        match self {
            Self::Right => 0x02,
            Self::Left => 0x01,
        }
    }
    /// short name used in logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Right => "R",
            Self::Left => "L",
        }
    }
}

/// identity of the controller, announced to the modules
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DeviceIdentity {
    pub serial: u32,
    pub module_type: u16,
    pub hardware_revision: u16,
    pub software_major: u16,
    pub software_minor: u16,
    pub build_revision: u32,
}

/// engine settings
#[derive(Clone, Debug)]
pub struct Config {
    /// which module positions are populated
    pub active: [bool; MAX_MODULES],
    /// process data bytes this controller can receive from each module
    pub input_length: u16,
    /// process data bytes this controller can send to each module
    pub output_length: u16,
    pub identity: DeviceIdentity,
    /// fifth byte of the source address
    pub device_type: u8,
    pub al_timeout_ms: u32,
    pub max_retry: u8,
    pub ack_timeout_ms: u32,
    pub green_phase_ms: u32,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            active: [true; MAX_MODULES],
            input_length: 512,
            output_length: 512,
            identity: DeviceIdentity::default(),
            device_type: DEVICE_TYPE_CORE,
            al_timeout_ms: AL_TIMEOUT_MS,
            max_retry: AL_MAX_RETRY,
            ack_timeout_ms: ACK_TIMEOUT_MS,
            green_phase_ms: GREEN_PHASE_MS,
        }
    }
}
impl Config {
    pub fn is_active(&self, slot: SlotId) -> bool {
        self.active[slot.index()]
    }
    /// check settings against the capacity of a process image of `image` bytes per direction
    pub fn validate(&self, image: usize) -> Result<(), Error> {
        let (input, output) = (usize::from(self.input_length), usize::from(self.output_length));
        if input > image || output > image
            {return Err(Error::Config("declared length exceeds process image"))}
        if input > MAX_CYCLIC_DATA || output > MAX_CYCLIC_DATA
            {return Err(Error::Config("declared length exceeds frame capacity"))}
        if self.max_retry == 0
            {return Err(Error::Config("retry budget must not be empty"))}
        Ok(())
    }
    /// identity record sent to the modules
    pub fn own_identity(&self) -> IdentityRecord {
        IdentityRecord {
            serial: self.identity.serial,
            module_type: self.identity.module_type,
            hardware_revision: self.identity.hardware_revision,
            software_major: self.identity.software_major,
            software_minor: self.identity.software_minor,
            build_revision: self.identity.build_revision,
            input_length: self.input_length,
            output_length: self.output_length,
            features: Features::data_exchange(),
        }
    }
}
