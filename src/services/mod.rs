pub mod analyzer;
pub mod content_store;
pub mod error;
pub mod file_service;
pub mod repository;
pub mod search;
pub mod tag_processor;
