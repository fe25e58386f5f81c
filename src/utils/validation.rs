use crate::config::PipelinePolicy;
use crate::models::FileCategory;
use std::path::Path;
use thiserror::Error;

/// MIME types the pipeline accepts after content inspection
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
    "application/pdf",
];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

const FORBIDDEN_FILENAME_CHARS: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("file type '{0}' is not allowed")]
    UnsupportedType(String),

    #[error("file size {size} bytes exceeds maximum allowed {max} bytes ({} MB)", max / 1024 / 1024)]
    TooLarge { size: usize, max: usize },

    #[error("file is empty")]
    EmptyFile,

    #[error("file content ({detected}) does not match the expected {expected} type")]
    TypeMismatch { expected: String, detected: String },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidFilename(_) => "INVALID_FILENAME",
            ValidationError::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            ValidationError::TooLarge { .. } => "FILE_TOO_LARGE",
            ValidationError::EmptyFile => "EMPTY_FILE",
            ValidationError::TypeMismatch { .. } => "TYPE_MISMATCH",
        }
    }
}

/// What the content actually is, as opposed to what the client claimed
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedType {
    pub mime_type: String,
    pub category: FileCategory,
    pub extension: String,
}

impl DetectedType {
    pub fn is_image(&self) -> bool {
        self.category == FileCategory::Image
    }
}

/// Rejects empty names, overlong names and names carrying path or reserved characters.
pub fn validate_filename(filename: &str) -> Result<(), ValidationError> {
    if filename.trim().is_empty() {
        return Err(ValidationError::InvalidFilename(
            "filename cannot be empty".to_string(),
        ));
    }

    if filename.len() > MAX_FILENAME_LEN {
        return Err(ValidationError::InvalidFilename(format!(
            "filename longer than {} bytes",
            MAX_FILENAME_LEN
        )));
    }

    if filename
        .chars()
        .any(|c| c.is_control() || FORBIDDEN_FILENAME_CHARS.contains(&c))
    {
        if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
            tracing::warn!("Path traversal attempt detected: {}", filename);
        }
        return Err(ValidationError::InvalidFilename(
            "filename contains reserved characters".to_string(),
        ));
    }

    Ok(())
}

/// Lowercase extension of the declared filename, if any
pub fn declared_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| !e.is_empty())
}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ValidationError> {
    if size == 0 {
        return Err(ValidationError::EmptyFile);
    }
    if size > max_size {
        return Err(ValidationError::TooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}

/// Checks if file content appears to be executable
pub fn is_executable_content(header: &[u8]) -> bool {
    if header.len() < 4 {
        return header.starts_with(b"#!") || header.starts_with(&[0x4D, 0x5A]);
    }

    // ELF binary (Linux)
    if header.starts_with(&[0x7F, 0x45, 0x4C, 0x46]) {
        return true;
    }

    // PE/COFF (Windows .exe, .dll)
    if header.starts_with(&[0x4D, 0x5A]) {
        return true;
    }

    // Mach-O (macOS)
    if header.starts_with(&[0xFE, 0xED, 0xFA, 0xCE])
        || header.starts_with(&[0xFE, 0xED, 0xFA, 0xCF])
        || header.starts_with(&[0xCE, 0xFA, 0xED, 0xFE])
        || header.starts_with(&[0xCF, 0xFA, 0xED, 0xFE])
    {
        return true;
    }

    // Shebang (shell scripts)
    header.starts_with(b"#!")
}

fn expected_category(extension: &str) -> Option<FileCategory> {
    if IMAGE_EXTENSIONS.contains(&extension) {
        Some(FileCategory::Image)
    } else if extension == "pdf" {
        Some(FileCategory::Document)
    } else {
        None
    }
}

/// Full validation for an intake: filename, extension allow-list, size, then content signature.
/// Pure check, no side effects.
pub fn validate(
    bytes: &[u8],
    filename: &str,
    policy: &PipelinePolicy,
) -> Result<DetectedType, ValidationError> {
    // 1. Filename
    validate_filename(filename)?;

    // 2. Extension allow-list
    let extension = declared_extension(filename)
        .ok_or_else(|| ValidationError::UnsupportedType("(no extension)".to_string()))?;
    if !policy.is_extension_allowed(&extension) {
        return Err(ValidationError::UnsupportedType(format!(".{}", extension)));
    }
    let expected = expected_category(&extension)
        .ok_or_else(|| ValidationError::UnsupportedType(format!(".{}", extension)))?;

    // 3. Size
    validate_file_size(bytes.len(), policy.max_file_size)?;

    // 4. Content signature
    if is_executable_content(bytes) {
        return Err(ValidationError::TypeMismatch {
            expected: expected.as_str().to_string(),
            detected: "executable".to_string(),
        });
    }

    let detected = infer::get(bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");

    let detected_category = if detected.starts_with("image/") {
        Some(FileCategory::Image)
    } else if detected == "application/pdf" {
        Some(FileCategory::Document)
    } else {
        None
    };

    if detected_category != Some(expected) || !ALLOWED_MIME_TYPES.contains(&detected) {
        return Err(ValidationError::TypeMismatch {
            expected: expected.as_str().to_string(),
            detected: detected.to_string(),
        });
    }

    Ok(DetectedType {
        mime_type: detected.to_string(),
        category: expected,
        extension,
    })
}
