pub use super::file_tags::Entity as FileTags;
pub use super::processed_files::Entity as ProcessedFiles;
