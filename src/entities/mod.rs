pub mod prelude;

pub mod file_tags;
pub mod processed_files;
