/*!
    process data exchanged with a module

    each module has an input region, written by the engine from the module's cyclic frames, and an output region, written by the host and sent in the engine's cyclic frames.
*/

use core::marker::PhantomData;
use packbytes::{FromBytes, ToBytes, ByteArray};

use crate::{
    error::Error,
    utils::{decode, encode},
    };


/**
    a register is a typed offset in a process image region

    it only holds the offset of the starting byte of the referenced value, hence can be created, copied or destroyed at no cost
*/
#[derive(PartialEq, Hash)]
pub struct Register<T> {
    offset: u16,
    ty: PhantomData<T>,
}
impl<T> Register<T> {
    pub const fn new(offset: u16) -> Self {
        Self{offset, ty: PhantomData}
    }
    /// starting byte in the region
    pub const fn offset(&self) -> u16 {self.offset}
}
impl<T: FromBytes> Register<T> {
    pub const fn size(&self) -> usize {T::Bytes::SIZE}
}
impl<T> Clone for Register<T> {
    fn clone(&self) -> Self {
        Self::new(self.offset())
    }
}
impl<T> Copy for Register<T> {}


pub struct ProcessImage<const LEN: usize> {
    input: [u8; LEN],
    output: [u8; LEN],
    input_length: usize,
    output_length: usize,
}
impl<const LEN: usize> ProcessImage<LEN> {
    /// zeroed image with the declared lengths, clamped to the capacity
    pub fn new(input_length: usize, output_length: usize) -> Self {
        Self {
            input: [0; LEN],
            output: [0; LEN],
            input_length: input_length.min(LEN),
            output_length: output_length.min(LEN),
        }
    }
    /// data received from the module, within the declared input length
    pub fn input(&self) -> &[u8] {&self.input[.. self.input_length]}
    pub(crate) fn input_mut(&mut self) -> &mut [u8] {&mut self.input[.. self.input_length]}
    /// data sent to the module, within the declared output length
    pub fn output(&self) -> &[u8] {&self.output[.. self.output_length]}
    pub fn output_mut(&mut self) -> &mut [u8] {&mut self.output[.. self.output_length]}

    /// read a value from the input region
    pub fn get<T: FromBytes>(&self, register: Register<T>) -> Result<T, Error> {
        self.input().get(usize::from(register.offset()) ..)
            .and_then(decode)
            .ok_or(Error::RegisterOutOfRange)
    }
    /// write a value to the output region
    pub fn set<T: ToBytes>(&mut self, register: Register<T>, value: T) -> Result<(), Error> {
        self.output_mut().get_mut(usize::from(register.offset()) ..)
            .and_then(|dst| encode(dst, value))
            .map(|_| ())
            .ok_or(Error::RegisterOutOfRange)
    }
}
