mod storage;

pub use storage::SqliteOccupancyStore;
