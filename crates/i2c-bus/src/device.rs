use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use crate::bus::{BusGuard, BusLock};
use embedded_hal::i2c::{ErrorType, SevenBitAddress, TenBitAddress};

use crate::{operation_len, Address, Error, Functionality, Operation, RawDevice, MAX_TRANSFER};

/// Handle to one address on a bus. Owned by exactly one driver.
///
/// Dropping (or [closing](Self::close)) the handle releases the
/// underlying descriptor.
pub struct I2cDevice {
    raw: Box<dyn RawDevice>,
    address: Address,
    functionality: Functionality,
    lock: BusLock,
    bus: Arc<str>,
}

impl std::fmt::Debug for I2cDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I2cDevice")
            .field("bus", &self.bus)
            .field("address", &self.address)
            .field("functionality", &self.functionality)
            .finish_non_exhaustive()
    }
}

impl I2cDevice {
    pub(crate) fn new(
        raw: Box<dyn RawDevice>,
        address: Address,
        functionality: Functionality,
        lock: BusLock,
        bus: Arc<str>,
    ) -> Self {
        Self {
            raw,
            address,
            functionality,
            lock,
            bus,
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn bus(&self) -> &str {
        &self.bus
    }

    #[must_use]
    pub fn functionality(&self) -> Functionality {
        self.functionality
    }

    /// `S Addr Wr [A] data.. P`, holds the bus lock for just this transfer
    pub async fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        check_len(buf.len())?;
        self.session().await.write(buf)
    }

    /// `S Addr Rd [A] data.. NA P`, holds the bus lock for just this transfer
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        check_len(buf.len())?;
        self.session().await.read(buf)
    }

    /// Write then read while holding the bus lock.
    pub async fn write_read(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Error> {
        check_combined_len(write.len(), read.len())?;
        self.session().await.write_read(write, read)
    }

    /// Exclusive use of the bus until the returned session is dropped.
    #[instrument(level = "trace", skip_all, fields(bus = %self.bus, address = %self.address))]
    pub async fn session(&mut self) -> Session<'_> {
        let guard = self.lock.acquire().await;
        Session {
            device: self,
            _guard: guard,
        }
    }

    /// Like [`session`](Self::session) but gives up waiting for the bus
    /// once `cancel` fires.
    pub async fn session_cancellable(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Session<'_>, Error> {
        let guard = self.lock.acquire_cancellable(cancel).await?;
        Ok(Session {
            device: self,
            _guard: guard,
        })
    }

    /// Release the descriptor. Consumes the handle so it can not be used
    /// afterwards.
    pub fn close(self) {
        trace!("closing {} on {}", self.address, self.bus);
        drop(self);
    }

    fn raw_write(&mut self, buf: &[u8]) -> Result<(), Error> {
        check_len(buf.len())?;
        trace!(address = %self.address, "write {buf:02x?}");
        let transferred = self.raw.write(buf).map_err(|source| Error::Io {
            address: self.address,
            source,
        })?;
        self.check_transferred(buf.len(), transferred)
    }

    fn raw_read(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        check_len(buf.len())?;
        let transferred = self.raw.read(buf).map_err(|source| Error::Io {
            address: self.address,
            source,
        })?;
        trace!(address = %self.address, "read {:02x?}", &buf[..transferred.min(buf.len())]);
        self.check_transferred(buf.len(), transferred)
    }

    fn raw_write_read(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Error> {
        check_combined_len(write.len(), read.len())?;
        if write.is_empty() {
            return self.raw_read(read);
        }
        if read.is_empty() {
            return self.raw_write(write);
        }
        self.raw_transaction(&mut [Operation::Write(write), Operation::Read(read)])
    }

    /// All `operations` as one combined transaction, or one after the
    /// other if the adapter can not combine them.
    fn raw_transaction(&mut self, operations: &mut [Operation<'_>]) -> Result<(), Error> {
        let mut requested = 0;
        for operation in operations.iter() {
            let len = operation_len(operation);
            if len > MAX_TRANSFER {
                return Err(Error::TransferTooLong { len });
            }
            requested += len;
        }
        if requested == 0 {
            return Err(Error::EmptyTransfer);
        }

        if !self.functionality.combined_transactions() {
            // Not atomic by itself, the caller's session keeps other
            // devices off the bus in between.
            for operation in operations.iter_mut() {
                match operation {
                    Operation::Write(buf) if !buf.is_empty() => self.raw_write(buf)?,
                    Operation::Read(buf) if !buf.is_empty() => self.raw_read(buf)?,
                    _ => (),
                }
            }
            return Ok(());
        }

        trace!(address = %self.address, "combined transaction of {} operations", operations.len());
        let completed = self
            .raw
            .transfer(operations)
            .map_err(|source| Error::Io {
                address: self.address,
                source,
            })?;
        let transferred = operations.iter().take(completed).map(operation_len).sum();
        self.check_transferred(requested, transferred)
    }

    /// Transfers addressed to anything other than this handle's address
    /// are refused.
    fn check_address(&self, requested: u16) -> Result<(), Error> {
        if requested == self.address.raw() {
            Ok(())
        } else {
            Err(Error::AddressMismatch {
                bound: self.address,
                requested,
            })
        }
    }

    fn check_transferred(&self, requested: usize, transferred: usize) -> Result<(), Error> {
        if transferred == requested {
            Ok(())
        } else {
            Err(Error::PartialTransfer {
                address: self.address,
                requested,
                transferred,
            })
        }
    }
}

fn check_len(len: usize) -> Result<(), Error> {
    match len {
        0 => Err(Error::EmptyTransfer),
        len if len > MAX_TRANSFER => Err(Error::TransferTooLong { len }),
        _ => Ok(()),
    }
}

fn check_combined_len(write: usize, read: usize) -> Result<(), Error> {
    if write == 0 && read == 0 {
        return Err(Error::EmptyTransfer);
    }
    for len in [write, read] {
        if len > MAX_TRANSFER {
            return Err(Error::TransferTooLong { len });
        }
    }
    Ok(())
}

/// Holds the bus lock. Every transfer made through a session happens
/// without another device on the same bus getting a turn in between.
pub struct Session<'d> {
    device: &'d mut I2cDevice,
    _guard: BusGuard,
}

impl Session<'_> {
    pub fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.device.raw_write(buf)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.device.raw_read(buf)
    }

    /// One combined repeated start transaction if the bus supports it,
    /// otherwise a write followed by a read.
    pub fn write_read(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Error> {
        self.device.raw_write_read(write, read)
    }

    /// Runs `operations` back to back, combined into one transaction when
    /// the adapter supports it.
    pub fn transaction(&mut self, operations: &mut [Operation<'_>]) -> Result<(), Error> {
        self.device.raw_transaction(operations)
    }

    /// Wait for the device to process a command. The bus stays locked.
    pub async fn settle(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.device.address
    }
}

impl ErrorType for I2cDevice {
    type Error = Error;
}

/// Each call is one transaction under the bus lock. Open a [`Session`]
/// to keep the lock across calls.
impl embedded_hal_async::i2c::I2c<SevenBitAddress> for I2cDevice {
    async fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.check_address(address.into())?;
        self.session().await.transaction(operations)
    }
}

impl embedded_hal_async::i2c::I2c<TenBitAddress> for I2cDevice {
    async fn transaction(
        &mut self,
        address: TenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.check_address(address)?;
        self.session().await.transaction(operations)
    }
}

impl ErrorType for Session<'_> {
    type Error = Error;
}

/// Blocking access for code that does its own timing while holding the
/// bus.
impl embedded_hal::i2c::I2c<SevenBitAddress> for Session<'_> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.device.check_address(address.into())?;
        self.transaction(operations)
    }
}
