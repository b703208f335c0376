use packbytes::{FromBytes, ToBytes, ByteArray};


/// decode a packed value from the start of `data`, `None` if `data` is too short
pub fn decode<T: FromBytes>(data: &[u8]) -> Option<T> {
    let mut bytes = T::Bytes::zeroed();
    bytes.as_mut().copy_from_slice(data.get(.. T::Bytes::SIZE)?);
    Some(T::from_le_bytes(bytes))
}
/// encode a packed value at the start of `data`, returning the number of bytes written
pub fn encode<T: ToBytes>(data: &mut [u8], value: T) -> Option<usize> {
    let bytes = value.to_le_bytes();
    data.get_mut(.. T::Bytes::SIZE)?.copy_from_slice(bytes.as_ref());
    Some(T::Bytes::SIZE)
}


/// implement packbytes traits for a bilge type (bitfield struct, or enum with a fallback variant)
#[macro_export]
macro_rules! pack_bits {
    ($t:ty) => {

        impl packbytes::ToBytes for $t {
            type Bytes = [u8; core::mem::size_of::<<$t as bilge::Bitsized>::ArbitraryInt>()];

            fn to_le_bytes(self) -> Self::Bytes {
                <$t as bilge::Bitsized>::ArbitraryInt::from(self).to_le_bytes()
            }
            fn to_be_bytes(self) -> Self::Bytes {
                <$t as bilge::Bitsized>::ArbitraryInt::from(self).to_be_bytes()
            }
        }
        impl packbytes::FromBytes for $t {
            type Bytes = [u8; core::mem::size_of::<<$t as bilge::Bitsized>::ArbitraryInt>()];

            fn from_le_bytes(bytes: Self::Bytes) -> Self {
                <$t>::from(<$t as bilge::Bitsized>::ArbitraryInt::from_le_bytes(bytes))
            }
            fn from_be_bytes(bytes: Self::Bytes) -> Self {
                <$t>::from(<$t as bilge::Bitsized>::ArbitraryInt::from_be_bytes(bytes))
            }
        }
    };
}
