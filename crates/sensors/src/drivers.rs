pub mod bmp280;
mod sensirion;
pub mod scd4x;
pub mod sgp40;
pub mod sht4x;
pub mod sps30;

pub use bmp280::Bmp280;
pub use scd4x::Scd4x;
pub use sgp40::Sgp40;
pub use sht4x::{Precision, Sht4x};
pub use sps30::Sps30;
