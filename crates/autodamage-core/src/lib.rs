pub mod detection;
pub mod engine;
pub mod ids;
pub mod model;
pub mod time;

pub use detection::*;
pub use engine::*;
pub use ids::*;
pub use model::*;
pub use time::*;
