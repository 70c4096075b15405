//! The byte-moving boundary between the engine and a bus backend.

use crate::register::{Address, Width};

/// Up to two data bytes, least significant first.
pub type RawValue = heapless::Vec<u8, 2>;

/// A backend that performs raw PMBus transfers.
///
/// Implementations handle framing, addressing of the device on the bus, retries and timeouts.
/// The engine calls these methods synchronously and never retries a failed call.
pub trait Transport {
    type Error: embedded_io::Error;

    /// Read `width` data bytes from `address`.
    ///
    /// `page_selected` tells the backend that the engine has just made sure the right page is
    /// active, for backends that would otherwise select it themselves.
    fn read_raw(
        &mut self,
        page_selected: bool,
        address: Address,
        width: Width,
    ) -> Result<RawValue, Self::Error>;

    /// Write `payload` to `address`. A [`Width::Zero`] write is a send-byte with no data.
    fn write_raw(
        &mut self,
        address: Address,
        payload: &[u8],
        width: Width,
    ) -> Result<(), Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn read_raw(
        &mut self,
        page_selected: bool,
        address: Address,
        width: Width,
    ) -> Result<RawValue, Self::Error> {
        T::read_raw(self, page_selected, address, width)
    }

    fn write_raw(
        &mut self,
        address: Address,
        payload: &[u8],
        width: Width,
    ) -> Result<(), Self::Error> {
        T::write_raw(self, address, payload, width)
    }
}

/// Interpret up to two bytes as a little-endian word.
pub fn word_from_bytes(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .take(2)
        .enumerate()
        .fold(0, |word, (i, byte)| word | (*byte as u16) << (8 * i))
}

/// The low `width` bytes of `value`, least significant first.
pub fn bytes_from_word(value: u16, width: Width) -> RawValue {
    value
        .to_le_bytes()
        .iter()
        .take(width.bytes())
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_from_bytes() {
        assert_eq!(word_from_bytes(&[0x34, 0x12]), 0x1234);
        assert_eq!(word_from_bytes(&[0x7F]), 0x7F);
        assert_eq!(word_from_bytes(&[]), 0);
    }

    #[test]
    fn test_bytes_from_word() {
        assert_eq!(bytes_from_word(0x1234, Width::Word).as_slice(), &[0x34, 0x12]);
        assert_eq!(bytes_from_word(0x1234, Width::Byte).as_slice(), &[0x34]);
        assert!(bytes_from_word(0x1234, Width::Zero).is_empty());
    }
}
