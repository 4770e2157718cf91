use core::fmt;

/// Failure kinds surfaced by file system operations.
///
/// Mutating operations that fail leave nothing written back, with one
/// documented exception: directories created on the way to a deeper
/// component during [`FileSystem::create`](crate::FileSystem::create)
/// persist immediately and are not rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Not enough free sectors for a header or its data chain.
    NoSpace,
    /// The fixed-capacity directory table has no vacant slot.
    DirectoryFull,
    AlreadyExists,
    NotFound,
    DirectoryNotEmpty,
    /// Missing `/` structure, empty leaf, over-long name, or a file
    /// standing where a directory component was expected.
    InvalidPath,
    /// On-disk state contradicts a structural invariant; a bug or a
    /// damaged image, not a caller mistake.
    Corrupted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NoSpace => "no free sectors left",
            Self::DirectoryFull => "directory table is full",
            Self::AlreadyExists => "name already exists",
            Self::NotFound => "no such file or directory",
            Self::DirectoryNotEmpty => "directory is not empty",
            Self::InvalidPath => "malformed path",
            Self::Corrupted => "on-disk structure is corrupted",
        };
        f.write_str(msg)
    }
}
