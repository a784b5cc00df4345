//! The syscall-facing error ABI, and the host-facing error type used by the
//! `nachos` binary and its tests.
use std::fmt;

/// Error codes returned to user programs through the syscall return
/// register. Each variant corresponds to a POSIX-ish errno the original
/// Nachos syscalls would have returned, trimmed to what this kernel's
/// syscall surface can actually produce.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum KernelError {
    /// No such file or directory. (ENOENT)
    NoSuchEntry,
    /// IO error from the disk or console. (EIO)
    IOError,
    /// Bad file descriptor. (EBADF)
    BadFileDescriptor,
    /// Out of memory: no free frame and swap is full. (ENOMEM)
    NoMemory,
    /// Bad user pointer. (EFAULT)
    BadAddress,
    /// File already exists. (EEXIST)
    FileExist,
    /// Not a directory. (ENOTDIR)
    NotDirectory,
    /// Is a directory. (EISDIR)
    IsDirectory,
    /// Invalid argument. (EINVAL)
    InvalidArgument,
    /// Too many open files for this thread. (EMFILE)
    TooManyOpenFile,
    /// No space left on the disk. (ENOSPC)
    NoSpace,
    /// File name component too long. (ENAMETOOLONG)
    NameTooLong,
    /// Invalid syscall number. (ENOSYS)
    NoSuchSyscall,
    /// Directory not empty. (ENOTEMPTY)
    DirectoryNotEmpty,
}

impl KernelError {
    /// Convert into the negative `usize` error code a syscall dispatcher
    /// returns in the calling convention's return register.
    pub fn into_usize(self) -> usize {
        (match self {
            KernelError::NoSuchEntry => -2isize,
            KernelError::IOError => -5,
            KernelError::BadFileDescriptor => -9,
            KernelError::NoMemory => -12,
            KernelError::BadAddress => -14,
            KernelError::FileExist => -17,
            KernelError::NotDirectory => -20,
            KernelError::IsDirectory => -21,
            KernelError::InvalidArgument => -22,
            KernelError::TooManyOpenFile => -24,
            KernelError::NoSpace => -28,
            KernelError::NameTooLong => -36,
            KernelError::NoSuchSyscall => -38,
            KernelError::DirectoryNotEmpty => -39,
        }) as usize
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for KernelError {}

/// The given `isize` does not correspond to a known [`KernelError`].
#[derive(Debug, Eq, PartialEq)]
pub struct TryFromError(isize);

impl TryFrom<isize> for KernelError {
    type Error = TryFromError;

    fn try_from(value: isize) -> Result<Self, Self::Error> {
        Ok(match value {
            -2 => KernelError::NoSuchEntry,
            -5 => KernelError::IOError,
            -9 => KernelError::BadFileDescriptor,
            -12 => KernelError::NoMemory,
            -14 => KernelError::BadAddress,
            -17 => KernelError::FileExist,
            -20 => KernelError::NotDirectory,
            -21 => KernelError::IsDirectory,
            -22 => KernelError::InvalidArgument,
            -24 => KernelError::TooManyOpenFile,
            -28 => KernelError::NoSpace,
            -36 => KernelError::NameTooLong,
            -38 => KernelError::NoSuchSyscall,
            -39 => KernelError::DirectoryNotEmpty,
            other => return Err(TryFromError(other)),
        })
    }
}

/// Errors surfaced at the host boundary: booting the machine, formatting a
/// disk image, loading a program. Kept distinct from [`KernelError`], which
/// is the in-kernel syscall ABI and must stay a plain enum so it can be
/// encoded as a register value.
#[derive(Debug, thiserror::Error)]
pub enum NachosError {
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("disk I/O error: {0}")]
    Disk(#[from] std::io::Error),
    #[error("filesystem corrupted: {0}")]
    Corrupted(&'static str),
    #[error("fatal kernel invariant violated: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, NachosError>;
