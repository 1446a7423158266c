use std::path::Path;

/// Characters that are never accepted in a case filename
const RESERVED_CHARACTERS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Longest accepted case filename, in characters; matches the width of the
/// `original_filename` column
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Error type for case filename and archive member name validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilenameValidationError {
    Empty,
    TooLong,
    ContainsNullByte,
    ContainsPathSeparator,
    IsSpecialDirectory,
    InvalidFileName,
    ContainsInvalidCharacters,
    MissingExtension,
    AbsolutePath,
    TraversalSegment,
    EmptySegment,
}

impl FilenameValidationError {
    pub fn message(&self) -> &'static str {
        match self {
            FilenameValidationError::Empty => "Filename cannot be empty",
            FilenameValidationError::TooLong => "Filename cannot exceed 255 characters",
            FilenameValidationError::ContainsNullByte => "Filename cannot contain null bytes",
            FilenameValidationError::ContainsPathSeparator => {
                "Filename cannot contain path separators (/ or \\)"
            }
            FilenameValidationError::IsSpecialDirectory => "Filename cannot be '.' or '..'",
            FilenameValidationError::InvalidFileName => {
                "Invalid filename: must be a valid file name"
            }
            FilenameValidationError::ContainsInvalidCharacters => {
                "Invalid filename: contains invalid characters"
            }
            FilenameValidationError::MissingExtension => {
                "Invalid filename: expected a base name, a dot and a word-character extension"
            }
            FilenameValidationError::AbsolutePath => "Member name cannot be an absolute path",
            FilenameValidationError::TraversalSegment => {
                "Member name cannot contain '.' or '..' segments"
            }
            FilenameValidationError::EmptySegment => "Member name cannot contain empty segments",
        }
    }
}

impl std::fmt::Display for FilenameValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for FilenameValidationError {}

/// Validate the original filename of a case before anything is written.
/// Checks that:
/// - Filename is not empty, at most [`MAX_FILENAME_LENGTH`] characters
///   long and holds no null byte
/// - Filename contains no path separators (/, \) and is not "." or ".."
/// - Filename holds no reserved or control characters
/// - Filename is a base name, a dot, then one or more word characters
pub fn validate_case_filename(filename: &str) -> Result<(), FilenameValidationError> {
    if filename.is_empty() {
        return Err(FilenameValidationError::Empty);
    }

    if filename.chars().count() > MAX_FILENAME_LENGTH {
        return Err(FilenameValidationError::TooLong);
    }

    if filename.contains('\0') {
        return Err(FilenameValidationError::ContainsNullByte);
    }

    if filename.contains('/') || filename.contains('\\') {
        return Err(FilenameValidationError::ContainsPathSeparator);
    }

    if filename == "." || filename == ".." {
        return Err(FilenameValidationError::IsSpecialDirectory);
    }

    // Path::file_name must give the filename back unchanged
    let path = Path::new(filename);
    if path.file_name().is_none() {
        return Err(FilenameValidationError::InvalidFileName);
    }
    if path.file_name().and_then(|n| n.to_str()) != Some(filename) {
        return Err(FilenameValidationError::ContainsInvalidCharacters);
    }

    if filename
        .chars()
        .any(|c| c.is_control() || RESERVED_CHARACTERS.contains(&c))
    {
        return Err(FilenameValidationError::ContainsInvalidCharacters);
    }

    match filename.rsplit_once('.') {
        Some((base, ext))
            if !base.is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_alphanumeric() || c == '_') =>
        {
            Ok(())
        }
        _ => Err(FilenameValidationError::MissingExtension),
    }
}

/// Validate an archive member name so that its stored key stays inside the
/// case prefix. Members may live in sub-directories ("dir/a.xml") but never
/// climb out of them.
pub fn validate_member_name(name: &str) -> Result<(), FilenameValidationError> {
    if name.is_empty() {
        return Err(FilenameValidationError::Empty);
    }

    if name.contains('\0') {
        return Err(FilenameValidationError::ContainsNullByte);
    }

    if name.contains('\\') {
        return Err(FilenameValidationError::ContainsPathSeparator);
    }

    if name.starts_with('/') {
        return Err(FilenameValidationError::AbsolutePath);
    }

    for segment in name.split('/') {
        match segment {
            "" => return Err(FilenameValidationError::EmptySegment),
            "." | ".." => return Err(FilenameValidationError::TraversalSegment),
            _ => {}
        }
    }

    Ok(())
}
