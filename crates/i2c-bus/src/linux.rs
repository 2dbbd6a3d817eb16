//! The linux i2c-dev backend.
//!
//! All `unsafe` in this crate lives in [`ioctl`], the rest of the module
//! goes through std's file handling.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{operation_len, Adapter, Address, Error, Functionality, Operation, RawDevice};

/// Kernel ABI of `linux/i2c-dev.h` and `linux/i2c.h`. Layout and
/// numbers must match the kernel exactly.
#[allow(non_camel_case_types)]
pub mod ioctl {
    use std::io;
    use std::os::fd::RawFd;

    use libc::c_ulong;

    /// Use this target address for plain read/write
    pub const I2C_SLAVE: c_ulong = 0x0703;
    /// Non zero argument enables 10 bit addressing
    pub const I2C_TENBIT: c_ulong = 0x0704;
    /// Get the adapter functionality mask
    pub const I2C_FUNCS: c_ulong = 0x0705;
    /// Combined read/write transfer, one STOP only
    pub const I2C_RDWR: c_ulong = 0x0707;

    pub const I2C_M_RD: u16 = 0x0001;
    pub const I2C_M_TEN: u16 = 0x0010;

    /// Maximum number of messages in one `I2C_RDWR` call
    pub const I2C_RDWR_IOCTL_MAX_MSGS: usize = 42;

    #[repr(C)]
    #[derive(Debug)]
    pub struct i2c_msg {
        pub addr: u16,
        pub flags: u16,
        pub len: u16,
        pub buf: *mut u8,
    }

    #[repr(C)]
    #[derive(Debug)]
    pub struct i2c_rdwr_ioctl_data {
        pub msgs: *mut i2c_msg,
        pub nmsgs: u32,
    }

    fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    pub fn set_address(fd: RawFd, address: u16, ten_bit: bool) -> io::Result<()> {
        // SAFETY: both requests take an integer argument by value
        unsafe {
            check(libc::ioctl(fd, I2C_TENBIT as _, c_ulong::from(ten_bit)))?;
            check(libc::ioctl(fd, I2C_SLAVE as _, c_ulong::from(address)))?;
        }
        Ok(())
    }

    pub fn functionality(fd: RawFd) -> io::Result<u64> {
        let mut funcs: c_ulong = 0;
        // SAFETY: the kernel writes one unsigned long to the pointer
        unsafe { check(libc::ioctl(fd, I2C_FUNCS as _, &mut funcs as *mut c_ulong))? };
        Ok(funcs.into())
    }

    /// Returns the number of messages the kernel completed.
    ///
    /// # Safety
    /// Every `buf` must point to at least `len` bytes that stay valid (and
    /// are writable for reads) for the duration of the call.
    pub unsafe fn transfer(fd: RawFd, msgs: &mut [i2c_msg]) -> io::Result<usize> {
        let mut data = i2c_rdwr_ioctl_data {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };
        let done = check(libc::ioctl(
            fd,
            I2C_RDWR as _,
            &mut data as *mut i2c_rdwr_ioctl_data,
        ))?;
        Ok(done as usize)
    }
}

/// A `/dev/i2c-N` character device.
#[derive(Debug)]
pub struct LinuxAdapter {
    path: PathBuf,
    name: String,
}

impl LinuxAdapter {
    /// Checks the bus can be opened, each device opens its own descriptor
    /// later.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        open_file(&path)?;
        let name = path.display().to_string();
        Ok(Self { path, name })
    }
}

fn open_file(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })
}

impl Adapter for LinuxAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, address: Address) -> Result<Box<dyn RawDevice>, Error> {
        let file = open_file(&self.path)?;
        let fd = file.as_raw_fd();

        let funcs = ioctl::functionality(fd)
            .map(Functionality)
            .map_err(|source| Error::Bind { address, source })?;
        if address.is_ten_bit() && !funcs.contains(Functionality::TEN_BIT_ADDR) {
            return Err(Error::AddressingNotSupported(10));
        }
        ioctl::set_address(fd, address.raw(), address.is_ten_bit())
            .map_err(|source| Error::Bind { address, source })?;
        debug!("bound {} to {address}, functionality: {:#x}", self.name, funcs.0);

        Ok(Box::new(LinuxDevice {
            file,
            address,
            functionality: funcs,
        }))
    }
}

/// The descriptor closes once, when the file drops.
#[derive(Debug)]
struct LinuxDevice {
    file: File,
    address: Address,
    functionality: Functionality,
}

impl RawDevice for LinuxDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn transfer(&mut self, operations: &mut [Operation<'_>]) -> io::Result<usize> {
        if operations.len() > ioctl::I2C_RDWR_IOCTL_MAX_MSGS {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }

        let addr = self.address.raw();
        let ten_bit = if self.address.is_ten_bit() {
            ioctl::I2C_M_TEN
        } else {
            0
        };
        let mut msgs = Vec::with_capacity(operations.len());
        for op in operations.iter_mut() {
            let len = u16::try_from(operation_len(op))
                .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
            let msg = match op {
                Operation::Write(buf) => ioctl::i2c_msg {
                    addr,
                    flags: ten_bit,
                    len,
                    // the kernel only reads from write buffers
                    buf: buf.as_ptr().cast_mut(),
                },
                Operation::Read(buf) => ioctl::i2c_msg {
                    addr,
                    flags: ten_bit | ioctl::I2C_M_RD,
                    len,
                    buf: buf.as_mut_ptr(),
                },
            };
            msgs.push(msg);
        }

        // SAFETY: the messages borrow `operations`, which outlives the
        // call, and each length is that of its buffer
        unsafe { ioctl::transfer(self.file.as_raw_fd(), &mut msgs) }
    }

    fn functionality(&self) -> Functionality {
        self.functionality
    }
}

#[cfg(test)]
mod tests {
    use super::ioctl::*;

    #[test]
    fn kernel_layout() {
        #[cfg(target_pointer_width = "64")]
        {
            assert_eq!(std::mem::size_of::<i2c_msg>(), 16);
            assert_eq!(std::mem::size_of::<i2c_rdwr_ioctl_data>(), 16);
        }
        assert_eq!(std::mem::offset_of!(i2c_msg, flags), 2);
        assert_eq!(std::mem::offset_of!(i2c_msg, len), 4);
    }
}
