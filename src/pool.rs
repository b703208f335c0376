/*!
    fixed capacity allocator for frame buffers

    buffers are referenced by [Packet] handles which are neither `Copy` nor `Clone`: whoever holds the handle owns the buffer and must give it back with [PacketPool::release]. The pool never grows, exhaustion is reported as [Error::OutOfMemory].
*/

use heapless::Vec;

use crate::{
    error::{Error, AllocTag},
    frame::MAX_FRAME,
    };


/// number of frames that can exist at the same time: one retained frame per slot plus transient receive and build buffers
pub const POOL_CAPACITY: usize = 6;


/// owning handle to a buffer of a [PacketPool]
#[derive(Debug, PartialEq, Eq)]
#[must_use = "packets must be released to their pool"]
pub struct Packet {
    index: u8,
    generation: u16,
    len: u16,
}
impl Packet {
    /// number of meaningful bytes in the buffer
    pub fn len(&self) -> usize {usize::from(self.len)}
    pub fn is_empty(&self) -> bool {self.len == 0}
}

pub struct PacketPool {
    buffers: [[u8; MAX_FRAME]; POOL_CAPACITY],
    /// bumped on each release, so stale handles are detected
    generations: [u16; POOL_CAPACITY],
    /// allocation site of buffers currently in use
    owners: [Option<AllocTag>; POOL_CAPACITY],
    free: Vec<u8, POOL_CAPACITY>,
}

impl PacketPool {
    pub fn new() -> Self {
        Self {
            buffers: [[0; MAX_FRAME]; POOL_CAPACITY],
            generations: [0; POOL_CAPACITY],
            owners: [None; POOL_CAPACITY],
            free: (0 .. POOL_CAPACITY as u8).rev().collect(),
        }
    }
    /// take a zeroed buffer of `size` bytes
    pub fn allocate(&mut self, tag: AllocTag, size: usize) -> Result<Packet, Error> {
        let len = u16::try_from(size).ok()
            .filter(|&len| usize::from(len) <= MAX_FRAME)
            .ok_or(Error::FrameTooLarge)?;
        let index = self.free.pop().ok_or(Error::OutOfMemory(tag))?;
        let slot = usize::from(index);
        self.owners[slot] = Some(tag);
        self.buffers[slot][.. size].fill(0);
        Ok(Packet {
            index,
            generation: self.generations[slot],
            len,
        })
    }
    /// give a buffer back to the pool
    pub fn release(&mut self, packet: Packet) -> Result<(), Error> {
        let slot = self.check(&packet)?;
        self.owners[slot] = None;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(packet.index).map_err(|_| Error::ForeignPacket)
    }
    /// content of a packet, up to its length
    pub fn buffer(&self, packet: &Packet) -> Result<&[u8], Error> {
        let slot = self.check(packet)?;
        Ok(&self.buffers[slot][.. packet.len()])
    }
    pub fn buffer_mut(&mut self, packet: &Packet) -> Result<&mut [u8], Error> {
        let slot = self.check(packet)?;
        Ok(&mut self.buffers[slot][.. packet.len()])
    }
    /// change the meaningful length of a packet, within the buffer capacity
    pub fn resize(&self, packet: &mut Packet, len: usize) -> Result<(), Error> {
        self.check(packet)?;
        packet.len = u16::try_from(len).ok()
            .filter(|&len| usize::from(len) <= MAX_FRAME)
            .ok_or(Error::FrameTooLarge)?;
        Ok(())
    }
    /// number of buffers that can still be allocated
    pub fn available(&self) -> usize {self.free.len()}
    /// allocation sites of the buffers currently in use
    pub fn owners(&self) -> impl Iterator<Item=AllocTag> + '_ {
        self.owners.iter().flatten().copied()
    }

    fn check(&self, packet: &Packet) -> Result<usize, Error> {
        let slot = usize::from(packet.index);
        if slot < POOL_CAPACITY
        && self.owners[slot].is_some()
        && self.generations[slot] == packet.generation
            {Ok(slot)}
        else
            {Err(Error::ForeignPacket)}
    }
}
impl Default for PacketPool {
    fn default() -> Self {Self::new()}
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion() {
        let mut pool = PacketPool::new();
        let packets: [Packet; POOL_CAPACITY] = core::array::from_fn(|i| {
            let packet = pool.allocate(AllocTag::Receive, 10 + i).unwrap();
            pool.buffer_mut(&packet).unwrap().fill(i as u8);
            packet
        });
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.allocate(AllocTag::CyclicData, 10), Err(Error::OutOfMemory(AllocTag::CyclicData)));

        // prior allocations are untouched by the failure
        for (i, packet) in packets.iter().enumerate() {
            let buffer = pool.buffer(packet).unwrap();
            assert_eq!(buffer.len(), 10 + i);
            assert!(buffer.iter().all(|&b| b == i as u8));
        }
        for packet in packets {
            pool.release(packet).unwrap();
        }
        assert_eq!(pool.available(), POOL_CAPACITY);
        assert_eq!(pool.owners().count(), 0);
    }

    #[test]
    fn stale_handle() {
        let mut pool = PacketPool::new();
        let packet = pool.allocate(AllocTag::IdRequest, 26).unwrap();
        let forged = Packet {index: packet.index, generation: packet.generation, len: packet.len};
        pool.release(packet).unwrap();
        assert_eq!(pool.release(forged), Err(Error::ForeignPacket));
        assert_eq!(pool.available(), POOL_CAPACITY);

        // the slot is reused, the stale handle still does not match
        let fresh = pool.allocate(AllocTag::IdRequest, 26).unwrap();
        let stale = Packet {index: fresh.index, generation: fresh.generation.wrapping_sub(1), len: 26};
        assert_eq!(pool.buffer(&stale), Err(Error::ForeignPacket));
        let foreign = Packet {index: 200, generation: 0, len: 1};
        assert_eq!(pool.release(foreign), Err(Error::ForeignPacket));
        pool.release(fresh).unwrap();
    }

    #[test]
    fn sizes() {
        let mut pool = PacketPool::new();
        assert_eq!(pool.allocate(AllocTag::CyclicData, MAX_FRAME + 1), Err(Error::FrameTooLarge));
        let mut packet = pool.allocate(AllocTag::Receive, MAX_FRAME).unwrap();
        pool.resize(&mut packet, 60).unwrap();
        assert_eq!(pool.buffer(&packet).unwrap().len(), 60);
        assert_eq!(pool.resize(&mut packet, MAX_FRAME + 1), Err(Error::FrameTooLarge));
        pool.release(packet).unwrap();
    }
}
