use thiserror::Error;


/// call site of a pool allocation, reported when the pool is exhausted
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocTag {
    /// buffer for an inbound frame
    Receive,
    /// outbound identity request
    IdRequest,
    /// outbound identity response
    IdResponse,
    /// outbound cyclic process data
    CyclicData,
}

/// error regarding modgate communication
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("physical link is down")]
    NoLink,
    #[error("no frame available")]
    NoPacket,
    #[error("packet pool exhausted ({0:?})")]
    OutOfMemory(AllocTag),
    #[error("ethernet controller failed to reset")]
    HardwareReset,
    #[error("frame transmission failed")]
    SendFailed,
    #[error("cyclic data longer than the negotiated input length")]
    InvalidDataSize,
    #[error("cyclic data offset outside the negotiated input length")]
    InvalidDataOffset,
    #[error("payload too short for its command")]
    Truncated,
    #[error("peer does not support process data exchange")]
    UnsupportedPeer,
    #[error("requested frame exceeds packet capacity")]
    FrameTooLarge,
    #[error("packet does not belong to this pool or was already released")]
    ForeignPacket,
    #[error("register out of process image")]
    RegisterOutOfRange,
    #[error("invalid configuration: {0}")]
    Config(&'static str),
}

impl Error {
    /**
        true for conditions after which the engine must not be ticked anymore

        everything else is absorbed by the state machines
    */
    pub fn is_fatal(&self) -> bool {
        matches!(self,
            Self::OutOfMemory(_)
            | Self::HardwareReset
            | Self::ForeignPacket)
    }
}
