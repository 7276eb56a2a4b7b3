pub mod code;
pub mod memory;
pub mod protocol;
pub mod traits;

pub use code::*;
pub use memory::*;
pub use protocol::*;
pub use traits::*;
