use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Adapter, Address, Error, I2cDevice};

/// Admission lock, at most one transaction (or session) on the bus at a
/// time. Fair: waiters are admitted in the order they started waiting.
#[derive(Debug, Clone, Default)]
pub(crate) struct BusLock(Arc<Mutex<()>>);

pub(crate) type BusGuard = OwnedMutexGuard<()>;

impl BusLock {
    pub(crate) async fn acquire(&self) -> BusGuard {
        self.0.clone().lock_owned().await
    }

    /// Waiting stops when the token is cancelled. Dropping the pending
    /// acquire never leaves the lock held.
    pub(crate) async fn acquire_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BusGuard, Error> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            guard = self.acquire() => Ok(guard),
        }
    }
}

/// One physical bus. Cheap to clone, clones share the adapter and the
/// admission lock.
#[derive(Debug, Clone)]
pub struct I2cBus {
    adapter: Arc<dyn Adapter>,
    lock: BusLock,
}

impl I2cBus {
    pub fn new(adapter: impl Adapter + 'static) -> Self {
        Self {
            adapter: Arc::new(adapter),
            lock: BusLock::default(),
        }
    }

    /// Open a linux i2c-dev bus such as `/dev/i2c-1`
    #[cfg(target_os = "linux")]
    pub fn open(path: impl Into<std::path::PathBuf>) -> Result<Self, Error> {
        crate::linux::LinuxAdapter::new(path).map(Self::new)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Bind a new handle to `address`. Can be called for any number of
    /// addresses, all handles share this bus's lock.
    pub fn open_device(&self, address: Address) -> Result<I2cDevice, Error> {
        let raw = self.adapter.open(address)?;
        let functionality = raw.functionality();
        debug!(
            "opened {address} on {}, combined transactions: {}",
            self.name(),
            functionality.combined_transactions()
        );
        Ok(I2cDevice::new(
            raw,
            address,
            functionality,
            self.lock.clone(),
            self.name().into(),
        ))
    }
}
