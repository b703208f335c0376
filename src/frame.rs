/*!
    wire format of modgate frames

    every frame is a [LinkHeader], followed by a [TransportHeader], followed by a payload depending on the command. All fields are packed little endian.
*/

use bilge::prelude::*;
use packbytes::{FromBytes, ToBytes, ByteArray};

use crate::{
    pack_bits,
    error::Error,
    };
pub use crate::utils::{decode, encode};


/// ethernet type of modgate frames
pub const ETHERTYPE: u16 = 0x9C41;
/// destination of all modgate frames
pub const BROADCAST: [u8; 6] = [0xff; 6];
/// first bytes of the source address
pub const VENDOR_PREFIX: [u8; 4] = [0xC8, 0x3E, 0xA7, 0x00];
/// protocol version tag in every transport header
pub const VERSION: u8 = 0xAA;
/// maximum frame size on the wire, also the size of a packet buffer
pub const MAX_FRAME: usize = 1518;

pub const LINK_HEADER: usize = <LinkHeader as FromBytes>::Bytes::SIZE;
pub const TRANSPORT_HEADER: usize = <TransportHeader as FromBytes>::Bytes::SIZE;
/// size of both headers, offset of the payload
pub const HEADER: usize = LINK_HEADER + TRANSPORT_HEADER;
pub const IDENTITY: usize = <IdentityRecord as FromBytes>::Bytes::SIZE;
pub const CYCLIC_HEADER: usize = <CyclicHeader as FromBytes>::Bytes::SIZE;
/// maximum amount of process data a cyclic frame can carry
pub const MAX_CYCLIC_DATA: usize = MAX_FRAME - HEADER - CYCLIC_HEADER;


/// ethernet part of the frame, stamped by the link layer
#[derive(Copy, Clone, FromBytes, ToBytes, Debug, Default, PartialEq)]
pub struct LinkHeader {
    pub destination: [u8; 6],
    pub source: [u8; 6],
    pub ethertype: u16,
    /// echo of the last counter received from the peer
    pub ack: u8,
    /// rolling counter of this frame, never 0
    pub counter: u8,
}
impl LinkHeader {
    /// header sent by the module at the given position byte
    pub fn new(device_type: u8, position: u8) -> Self {
        let mut source = [0; 6];
        source[.. VENDOR_PREFIX.len()] .copy_from_slice(&VENDOR_PREFIX);
        source[4] = device_type;
        source[5] = position;
        Self {
            destination: BROADCAST,
            source,
            ethertype: ETHERTYPE,
            ack: 0,
            counter: 1,
        }
    }
    /// whether a received frame belongs to this protocol
    pub fn is_modgate(&self) -> bool {
        self.destination == BROADCAST && self.ethertype == ETHERTYPE
    }
}

/// protocol part of the frame, describing the payload
#[derive(Copy, Clone, FromBytes, ToBytes, Debug, PartialEq)]
pub struct TransportHeader {
    pub command: Command,
    /// payload size following the headers
    pub length: u16,
    pub error: u32,
    pub version: u8,
    /// diagnostic tag identifying the sender routine
    pub tag: u8,
}
impl TransportHeader {
    pub fn new(command: Command, length: u16) -> Self {
        Self {
            command,
            length,
            error: 0,
            version: VERSION,
            tag: command.tag(),
        }
    }
}

/// application command carried by a frame
#[bitsize(16)]
#[derive(Copy, Clone, FromBits, Debug, PartialEq)]
pub enum Command {
    IdRequest = 0,
    IdResponse = 1,
    CyclicData = 2,
    /// not used by this protocol version
    StatusRequest = 3,
    /// not used by this protocol version
    StatusResponse = 4,
    /// not used by this protocol version
    UpdateData = 5,
    #[fallback]
    Unknown = 0xffff,
}
pack_bits!(Command);

impl Command {
    fn tag(self) -> u8 {
        match self {
            Self::IdRequest => 0x51,
            Self::IdResponse => 0x52,
            Self::CyclicData => 0x53,
            _ => 0,
        }
    }
}

/// capabilities advertised in an identity record
#[bitsize(16)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq, Default)]
pub struct Features {
    /// module can exchange cyclic process data
    pub io_data_exchange: bool,
    _reserved: u15,
}
pack_bits!(Features);

impl Features {
    pub fn data_exchange() -> Self {
        let mut features = Self::from(0u16);
        features.set_io_data_exchange(true);
        features
    }
}

/// identity of a module, payload of [Command::IdResponse]
#[derive(Copy, Clone, FromBytes, ToBytes, Debug, Default, PartialEq)]
pub struct IdentityRecord {
    pub serial: u32,
    pub module_type: u16,
    pub hardware_revision: u16,
    pub software_major: u16,
    pub software_minor: u16,
    pub build_revision: u32,
    /// process data bytes the module can receive
    pub input_length: u16,
    /// process data bytes the module can send
    pub output_length: u16,
    pub features: Features,
}

/// header of the payload of [Command::CyclicData], followed by `length` bytes of data
#[derive(Copy, Clone, FromBytes, ToBytes, Debug, Default, PartialEq)]
pub struct CyclicHeader {
    /// fieldbus state of the sender
    pub fieldbus_status: u8,
    pub length: u16,
    /// start of data in the receiver's input
    pub offset: u16,
}


/// transport header of a complete frame
pub fn transport(frame: &[u8]) -> Option<TransportHeader> {
    decode(frame.get(LINK_HEADER ..)?)
}
/// payload of a complete frame, as declared by its transport header
pub fn payload(frame: &[u8]) -> Option<&[u8]> {
    let header = transport(frame)?;
    frame.get(HEADER ..)?.get(.. usize::from(header.length))
}
/// write the transport header of an outbound frame, the link header is left to the link layer
pub fn write_transport(frame: &mut [u8], command: Command, length: usize) -> Result<&mut [u8], Error> {
    let length = u16::try_from(length).map_err(|_| Error::FrameTooLarge)?;
    let (headers, payload) = frame.split_at_mut_checked(HEADER)
        .ok_or(Error::FrameTooLarge)?;
    encode(&mut headers[LINK_HEADER ..], TransportHeader::new(command, length))
        .ok_or(Error::FrameTooLarge)?;
    payload.get_mut(.. usize::from(length))
        .ok_or(Error::FrameTooLarge)
}
