pub mod document;
pub mod download;
pub mod manifest;
pub mod report;
pub mod store;
pub mod text;

pub use document::*;
pub use download::*;
pub use manifest::*;
pub use report::*;
pub use store::*;
pub use text::*;
