//! We use this mocking module in unit tests to emulate a two-rail PMBus controller.

use std::collections::BTreeMap;

use crate::{
    register::{Address, PAGE_COMMAND, Width},
    transport::{RawValue, Transport, bytes_from_word},
};

/// A transfer the mock has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Read {
        page_selected: bool,
        address: Address,
        width: Width,
    },
    Write {
        address: Address,
        payload: Vec<u8>,
        width: Width,
    },
}

/// Our mock type used to emulate the device behind a bus.
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Device side `PAGE` register.
    page: u8,
    /// Direct command registers, stored per page.
    paged: BTreeMap<(u8, Address), u16>,
    /// Extended sub-registers, shared by both pages.
    shared: BTreeMap<Address, u16>,
    /// Registers that acknowledge writes but keep their old value.
    discarding: Vec<Address>,
    /// Every successful transfer, in order.
    log: Vec<Operation>,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
    /// Return one byte fewer than asked for.
    short_reads: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MockError {
    /// Simulated missing acknowledge
    #[error("device did not acknowledge")]
    Nack,
    /// Simulated bus timeout
    #[error("bus timed out")]
    Timeout,
}

impl embedded_io::Error for MockError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockError::Nack => embedded_io::ErrorKind::NotConnected,
            MockError::Timeout => embedded_io::ErrorKind::TimedOut,
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_paged(address: Address) -> bool {
        matches!(address, Address::Command(code) if code != PAGE_COMMAND)
    }

    /// Preload a register on one page.
    pub fn set_register(&mut self, page: u8, code: u8, value: u16) {
        self.paged.insert((page, Address::Command(code)), value);
    }

    /// Preload a register on both pages.
    pub fn set_register_all(&mut self, code: u8, value: u16) {
        for page in 0..2 {
            self.set_register(page, code, value);
        }
    }

    pub fn set_extended(&mut self, address: u16, value: u16) {
        self.shared.insert(Address::Extended(address), value);
    }

    pub fn register(&self, page: u8, code: u8) -> Option<u16> {
        self.paged.get(&(page, Address::Command(code))).copied()
    }

    /// Make writes to `code` succeed without changing the stored value.
    pub fn discard_writes_to(&mut self, code: u8) {
        self.discarding.push(Address::Command(code));
    }

    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }

    pub fn set_short_reads(&mut self, short: bool) {
        self.short_reads = short;
    }

    pub fn operations(&self) -> &[Operation] {
        &self.log
    }

    /// Values written to `PAGE`, in order.
    pub fn page_selects(&self) -> Vec<u8> {
        self.log
            .iter()
            .filter_map(|op| match op {
                Operation::Write {
                    address: Address::Command(PAGE_COMMAND),
                    payload,
                    ..
                } => payload.first().copied(),
                _ => None,
            })
            .collect()
    }

    /// Writes other than page selects, as (address, payload).
    pub fn data_writes(&self) -> Vec<(Address, Vec<u8>)> {
        self.log
            .iter()
            .filter_map(|op| match op {
                Operation::Write {
                    address, payload, ..
                } if *address != Address::Command(PAGE_COMMAND) => {
                    Some((*address, payload.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn slot(&mut self, address: Address) -> &mut u16 {
        if Self::is_paged(address) {
            self.paged.entry((self.page, address)).or_default()
        } else {
            self.shared.entry(address).or_default()
        }
    }
}

impl Transport for MockTransport {
    type Error = MockError;

    fn read_raw(
        &mut self,
        page_selected: bool,
        address: Address,
        width: Width,
    ) -> Result<RawValue, Self::Error> {
        if self.should_error_on_read {
            return Err(MockError::Timeout);
        }
        let value = if address == Address::Command(PAGE_COMMAND) {
            self.page as u16
        } else {
            *self.slot(address)
        };
        let mut raw = bytes_from_word(value, width);
        if self.short_reads {
            raw.pop();
        }
        self.log.push(Operation::Read {
            page_selected,
            address,
            width,
        });
        Ok(raw)
    }

    fn write_raw(
        &mut self,
        address: Address,
        payload: &[u8],
        width: Width,
    ) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockError::Nack);
        }
        let value = payload
            .iter()
            .enumerate()
            .fold(0u16, |word, (i, byte)| word | (*byte as u16) << (8 * i));
        if address == Address::Command(PAGE_COMMAND) {
            self.page = value as u8;
        } else if !self.discarding.contains(&address) && width != Width::Zero {
            *self.slot(address) = value;
        }
        self.log.push(Operation::Write {
            address,
            payload: payload.to_vec(),
            width,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_are_per_page() {
        let mut mock = MockTransport::new();
        mock.set_register(0, 0x8B, 0x0333);
        mock.set_register(1, 0x8B, 0x0400);

        let read = mock.read_raw(false, Address::Command(0x8B), Width::Word).unwrap();
        assert_eq!(read.as_slice(), &[0x33, 0x03]);

        mock.write_raw(Address::Command(PAGE_COMMAND), &[1], Width::Byte)
            .unwrap();
        let read = mock.read_raw(true, Address::Command(0x8B), Width::Word).unwrap();
        assert_eq!(read.as_slice(), &[0x00, 0x04]);
    }

    #[test]
    fn test_extended_registers_ignore_page() {
        let mut mock = MockTransport::new();
        mock.set_extended(0x0C00, 0x1234);
        mock.write_raw(Address::Command(PAGE_COMMAND), &[1], Width::Byte)
            .unwrap();
        let read = mock
            .read_raw(false, Address::Extended(0x0C00), Width::Word)
            .unwrap();
        assert_eq!(read.as_slice(), &[0x34, 0x12]);
    }

    #[test]
    fn test_errors_are_not_logged() {
        let mut mock = MockTransport::new();
        mock.set_write_error(true);
        assert_eq!(
            mock.write_raw(Address::Command(0x21), &[0, 0], Width::Word),
            Err(MockError::Nack)
        );
        mock.set_read_error(true);
        assert_eq!(
            mock.read_raw(false, Address::Command(0x21), Width::Word),
            Err(MockError::Timeout)
        );
        assert!(mock.operations().is_empty());
    }

    #[test]
    fn test_discarded_writes() {
        let mut mock = MockTransport::new();
        mock.set_register(0, 0x4A, 0x0010);
        mock.discard_writes_to(0x4A);
        mock.write_raw(Address::Command(0x4A), &[0x20, 0x00], Width::Word)
            .unwrap();
        assert_eq!(mock.register(0, 0x4A), Some(0x0010));
        assert_eq!(mock.data_writes().len(), 1);
    }

    #[test]
    fn test_error_kinds() {
        use embedded_io::Error;
        assert_eq!(MockError::Nack.kind(), embedded_io::ErrorKind::NotConnected);
        assert_eq!(MockError::Timeout.kind(), embedded_io::ErrorKind::TimedOut);
        assert_eq!(MockError::Nack.to_string(), "device did not acknowledge");
    }
}
