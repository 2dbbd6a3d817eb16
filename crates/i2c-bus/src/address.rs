use std::fmt;

use crate::{Error, SevenBitAddress, TenBitAddress};

/// A 7 or 10 bit bus address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    SevenBit(u8),
    TenBit(u16),
}

impl Address {
    pub fn seven_bit(address: SevenBitAddress) -> Result<Self, Error> {
        if address > 0x7F {
            return Err(Error::InvalidAddress(address.into()));
        }
        Ok(Self::SevenBit(address))
    }

    pub fn ten_bit(address: TenBitAddress) -> Result<Self, Error> {
        if address > 0x3FF {
            return Err(Error::InvalidAddress(address));
        }
        Ok(Self::TenBit(address))
    }

    #[must_use]
    pub fn raw(self) -> u16 {
        match self {
            Address::SevenBit(a) => a.into(),
            Address::TenBit(a) => a,
        }
    }

    #[must_use]
    pub fn is_ten_bit(self) -> bool {
        matches!(self, Address::TenBit(_))
    }
}

/// Anything up to 0x7F is taken as a 7 bit address
impl TryFrom<u16> for Address {
    type Error = Error;

    fn try_from(address: u16) -> Result<Self, Self::Error> {
        match u8::try_from(address) {
            Ok(short) if short <= 0x7F => Ok(Self::SevenBit(short)),
            _ => Self::ten_bit(address),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::SevenBit(a) => write!(f, "{a:#04x}"),
            Address::TenBit(a) => write!(f, "{a:#05x} (10 bit)"),
        }
    }
}
