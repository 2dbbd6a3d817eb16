//! In memory bus for tests.
//!
//! Attach simulated chips ([`Target`]) at addresses, then inspect what went
//! over the wire with [`MockBus::transfers`]. Faults can be queued per
//! address to exercise error paths.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Adapter, Address, Error, Functionality, Operation, RawDevice};

/// A simulated chip.
pub trait Target: Send {
    fn on_write(&mut self, data: &[u8]);
    /// Fill `buf` with whatever the chip sends back.
    fn on_read(&mut self, buf: &mut [u8]);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    Write { address: u16, data: Vec<u8> },
    Read { address: u16, len: usize },
    Combined {
        address: u16,
        write: Vec<u8>,
        read_len: usize,
    },
}

impl Transfer {
    #[must_use]
    pub fn address(&self) -> u16 {
        match self {
            Transfer::Write { address, .. }
            | Transfer::Read { address, .. }
            | Transfer::Combined { address, .. } => *address,
        }
    }

    /// The bytes written, empty for a plain read
    #[must_use]
    pub fn written(&self) -> &[u8] {
        match self {
            Transfer::Write { data, .. } => data,
            Transfer::Combined { write, .. } => write,
            Transfer::Read { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call fails with this os error code
    Io(i32),
    /// Only this many bytes (messages, for a combined transfer) complete
    Partial(usize),
}

#[derive(Default)]
struct State {
    targets: HashMap<u16, Box<dyn Target>>,
    log: Vec<Transfer>,
    faults: HashMap<u16, VecDeque<Fault>>,
    open_handles: HashMap<u16, usize>,
    no_combined: bool,
}

impl State {
    fn next_fault(&mut self, address: u16) -> Option<Fault> {
        self.faults.get_mut(&address).and_then(VecDeque::pop_front)
    }

    fn target(&mut self, address: u16) -> io::Result<&mut Box<dyn Target>> {
        self.targets
            .get_mut(&address)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENXIO))
    }
}

#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for MockBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBus").finish_non_exhaustive()
    }
}

impl MockBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The adapter will report it can not do combined transactions.
    #[must_use]
    pub fn without_combined_transactions(self) -> Self {
        self.state().no_combined = true;
        self
    }

    pub fn attach(&self, address: u16, target: impl Target + 'static) {
        self.state().targets.insert(address, Box::new(target));
    }

    pub fn fail_next(&self, address: u16, fault: Fault) {
        self.state()
            .faults
            .entry(address)
            .or_default()
            .push_back(fault);
    }

    #[must_use]
    pub fn transfers(&self) -> Vec<Transfer> {
        self.state().log.clone()
    }

    #[must_use]
    pub fn transfers_to(&self, address: u16) -> Vec<Transfer> {
        self.state()
            .log
            .iter()
            .filter(|t| t.address() == address)
            .cloned()
            .collect()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }

    /// Handles opened and not yet dropped
    #[must_use]
    pub fn open_handles(&self, address: u16) -> usize {
        self.state()
            .open_handles
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mock bus state is never poisoned")
    }
}

impl Adapter for MockBus {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&self, address: Address) -> Result<Box<dyn RawDevice>, Error> {
        let mut state = self.state();
        *state.open_handles.entry(address.raw()).or_default() += 1;
        let functionality = if state.no_combined {
            Functionality::default()
        } else {
            Functionality::I2C
        };
        Ok(Box::new(MockDevice {
            address: address.raw(),
            functionality,
            state: self.state.clone(),
        }))
    }
}

struct MockDevice {
    address: u16,
    functionality: Functionality,
    state: Arc<Mutex<State>>,
}

impl MockDevice {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mock bus state is never poisoned")
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        let address = self.address;
        if let Some(open) = self.state().open_handles.get_mut(&address) {
            *open -= 1;
        }
    }
}

impl RawDevice for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let address = self.address;
        let mut state = self.state();
        let accepted = match state.next_fault(address) {
            Some(Fault::Io(code)) => return Err(io::Error::from_raw_os_error(code)),
            Some(Fault::Partial(n)) => n.min(buf.len()),
            None => buf.len(),
        };
        state.target(address)?.on_write(&buf[..accepted]);
        state.log.push(Transfer::Write {
            address,
            data: buf[..accepted].to_vec(),
        });
        Ok(accepted)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let address = self.address;
        let mut state = self.state();
        let received = match state.next_fault(address) {
            Some(Fault::Io(code)) => return Err(io::Error::from_raw_os_error(code)),
            Some(Fault::Partial(n)) => n.min(buf.len()),
            None => buf.len(),
        };
        state.target(address)?.on_read(&mut buf[..received]);
        state.log.push(Transfer::Read {
            address,
            len: received,
        });
        Ok(received)
    }

    fn transfer(&mut self, operations: &mut [Operation<'_>]) -> io::Result<usize> {
        let address = self.address;
        let mut state = self.state();
        if state.no_combined {
            return Err(io::Error::from_raw_os_error(libc::EOPNOTSUPP));
        }
        let completed = match state.next_fault(address) {
            Some(Fault::Io(code)) => return Err(io::Error::from_raw_os_error(code)),
            Some(Fault::Partial(n)) => n.min(operations.len()),
            None => operations.len(),
        };

        let mut write = Vec::new();
        let mut read_len = 0;
        let target = state.target(address)?;
        for op in operations.iter_mut().take(completed) {
            match op {
                Operation::Write(buf) => {
                    target.on_write(buf);
                    write.extend_from_slice(buf);
                }
                Operation::Read(buf) => {
                    target.on_read(buf);
                    read_len += buf.len();
                }
            }
        }
        state.log.push(Transfer::Combined {
            address,
            write,
            read_len,
        });
        Ok(completed)
    }

    fn functionality(&self) -> Functionality {
        self.functionality
    }
}

/// Answers every read with the queued responses, in order. Records writes.
#[derive(Clone, Default)]
pub struct Scripted {
    inner: Arc<Mutex<ScriptedInner>>,
}

#[derive(Default)]
struct ScriptedInner {
    responses: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
}

impl Scripted {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, bytes: impl Into<Vec<u8>>) {
        self.lock().responses.push_back(bytes.into());
    }

    #[must_use]
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptedInner> {
        self.inner.lock().expect("never poisoned")
    }
}

impl Target for Scripted {
    fn on_write(&mut self, data: &[u8]) {
        self.lock().writes.push(data.to_vec());
    }

    fn on_read(&mut self, buf: &mut [u8]) {
        let response = self.lock().responses.pop_front().unwrap_or_default();
        for (out, byte) in buf.iter_mut().zip(response.into_iter().chain(std::iter::repeat(0xFF))) {
            *out = byte;
        }
    }
}
