pub mod analyzer;
pub mod database;
pub mod storage;
