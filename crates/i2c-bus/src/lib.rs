//! Shared access to one I2C bus.
//!
//! Every device opened on an [`I2cBus`] shares that bus's admission lock.
//! A single `write`, `read` or `write_read` takes the lock for just that
//! transaction. Drivers that need a write, a settle delay and then a read
//! to happen without another device talking in between open a [`Session`],
//! which keeps the lock for as long as it lives.
//!
//! [`I2cDevice`] implements the `embedded-hal-async` I2C trait and a
//! [`Session`] the blocking `embedded-hal` one, so drivers written against
//! those traits run on top of the shared bus too.

use std::fmt;
use std::io;

mod address;
mod bus;
mod device;
mod error;
#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use address::Address;
pub use bus::I2cBus;
pub use device::{I2cDevice, Session};
pub use embedded_hal::i2c::{Operation, SevenBitAddress, TenBitAddress};
pub use error::Error;

/// Longest transfer a single message can describe, its length is a u16
pub const MAX_TRANSFER: usize = u16::MAX as usize;

/// Bytes moved by one operation
pub(crate) fn operation_len(operation: &Operation<'_>) -> usize {
    match operation {
        Operation::Write(buf) => buf.len(),
        Operation::Read(buf) => buf.len(),
    }
}

/// The transaction types an adapter supports, as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Functionality(pub u64);

impl Functionality {
    /// Plain i2c messages, needed for combined (repeated start) transfers
    pub const I2C: Functionality = Functionality(0x0000_0001);
    pub const TEN_BIT_ADDR: Functionality = Functionality(0x0000_0002);

    #[must_use]
    pub const fn contains(self, other: Functionality) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn combined_transactions(self) -> bool {
        self.contains(Self::I2C)
    }
}

/// One open endpoint on the physical link, bound to a single address.
///
/// Implementations only move bytes. Length checks, partial transfer
/// detection and locking happen in [`I2cDevice`].
pub trait RawDevice: Send {
    /// Returns the number of bytes the target accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    /// Returns the number of bytes read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Executes all operations as one combined transaction. Returns the
    /// number of operations (messages) that completed.
    fn transfer(&mut self, operations: &mut [Operation<'_>]) -> io::Result<usize>;
    /// Queried once when the device was opened.
    fn functionality(&self) -> Functionality;
}

/// A physical bus that can open devices.
pub trait Adapter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn open(&self, address: Address) -> Result<Box<dyn RawDevice>, Error>;
}
