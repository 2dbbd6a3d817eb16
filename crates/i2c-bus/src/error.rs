use std::io;
use std::path::PathBuf;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

use crate::Address;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Could not open i2c bus {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("Could not bind to address {address}: {source}")]
    Bind { address: Address, source: io::Error },
    #[error("I/O error talking to {address}: {source}")]
    Io { address: Address, source: io::Error },
    #[error("Only {transferred} of {requested} bytes were transferred to/from {address}")]
    PartialTransfer {
        address: Address,
        requested: usize,
        transferred: usize,
    },
    #[error("Transfers need at least one byte")]
    EmptyTransfer,
    #[error("Transfer of {len} bytes is longer then the maximum of {max}", max = crate::MAX_TRANSFER)]
    TransferTooLong { len: usize },
    #[error("{0:#x} is not a valid i2c address")]
    InvalidAddress(u16),
    #[error("Bus does not support {0} bit addressing")]
    AddressingNotSupported(u8),
    #[error("Cancelled while waiting for the bus")]
    Cancelled,
    #[error("Handle is bound to {bound}, can not talk to {requested:#x}")]
    AddressMismatch { bound: Address, requested: u16 },
}

impl Error {
    /// The os error code for failures the kernel reported.
    #[must_use]
    pub fn os_error(&self) -> Option<i32> {
        match self {
            Error::Open { source, .. } | Error::Bind { source, .. } | Error::Io { source, .. } => {
                source.raw_os_error()
            }
            _ => None,
        }
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { source, .. } => match source.raw_os_error() {
                // what i2c-dev reports when nobody acks the address
                Some(libc::ENXIO | libc::EREMOTEIO) => {
                    ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
                }
                Some(libc::EAGAIN) => ErrorKind::ArbitrationLoss,
                _ => ErrorKind::Bus,
            },
            _ => ErrorKind::Other,
        }
    }
}
