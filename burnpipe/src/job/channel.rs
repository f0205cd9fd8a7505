//! Inter-stage channels: an OS pipe or a shared path.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use crate::error::{BurnError, EngineResult};

/// Output side of a stage.
#[derive(Debug)]
pub enum Output {
    /// Write end of the pipe to the successor.
    Pipe(File),
    /// File the stage writes to: a temporary handed to the successor, or
    /// the leader's final output.
    Path(PathBuf),
}

impl Output {
    pub fn pipe(&self) -> Option<&File> {
        match self {
            Self::Pipe(file) => Some(file),
            Self::Path(_) => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Pipe(_) => None,
            Self::Path(path) => Some(path),
        }
    }

    /// Duplicate the pipe end so a worker thread can own it.
    ///
    /// The downstream reader only sees end-of-data once every duplicate is
    /// closed.
    pub fn try_clone_pipe(&self) -> io::Result<Option<File>> {
        self.pipe().map(File::try_clone).transpose()
    }
}

/// Input side of a stage, mirroring the predecessor's [`Output`].
#[derive(Debug)]
pub enum Input {
    /// Read end of the pipe from the predecessor.
    Pipe(File),
    /// File the predecessor wrote.
    Path(PathBuf),
}

impl Input {
    pub fn pipe(&self) -> Option<&File> {
        match self {
            Self::Pipe(file) => Some(file),
            Self::Path(_) => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Pipe(_) => None,
            Self::Path(path) => Some(path),
        }
    }

    /// Duplicate the pipe end so a worker thread can own it.
    pub fn try_clone_pipe(&self) -> io::Result<Option<File>> {
        self.pipe().map(File::try_clone).transpose()
    }
}

/// Allocate a pipe with both ends in non-blocking mode.
///
/// Returns `(read, write)`.
pub fn nonblocking_pipe() -> EngineResult<(File, File)> {
    let mut fds: [libc::c_int; 2] = [-1; 2];
    // SAFETY: `fds` is a valid two-element buffer for pipe(2).
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret < 0 {
        return Err(BurnError::resource("pipe", io::Error::last_os_error()));
    }

    // SAFETY: pipe(2) succeeded, so both descriptors are open and owned by
    // nobody else.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    set_nonblocking(read.as_raw_fd()).map_err(|e| BurnError::resource("pipe", e))?;
    set_nonblocking(write.as_raw_fd()).map_err(|e| BurnError::resource("pipe", e))?;

    Ok((File::from(read), File::from(write)))
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own; no pointers involved.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Returns true if `file` is in non-blocking mode.
pub fn is_nonblocking(file: &File) -> io::Result<bool> {
    // SAFETY: fcntl on a borrowed, open descriptor.
    let flags = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags & libc::O_NONBLOCK != 0)
}
