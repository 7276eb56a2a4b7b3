pub mod analyze;
pub mod config;
pub mod error;
pub mod runner;
pub mod session;
pub mod util;

pub use analyze::*;
pub use config::*;
pub use error::*;
pub use runner::*;
pub use session::*;
pub use util::*;
