//! Image normalization, the detector seam and everything that turns raw
//! detector output into a `DetectionSet`.

pub mod adapter;
pub mod command;
pub mod detector;
pub mod error;
pub mod normalize;
pub mod plot;

pub use adapter::*;
pub use command::*;
pub use detector::*;
pub use error::*;
pub use normalize::*;
pub use plot::*;
