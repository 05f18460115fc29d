mod entity;
mod iot;
mod subscription;
mod timeseries;

pub use entity::*;
pub use iot::*;
pub use subscription::*;
pub use timeseries::*;
