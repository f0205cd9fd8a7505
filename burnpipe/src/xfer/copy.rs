//! Chunked, cancellable copy of a file or directory tree.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::progress::XferProgress;
use super::XferOutcome;
use crate::error::{BurnError, EngineResult};

/// Default chunk size for file copies.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Copy `src` to `dest`, reporting bytes into `progress`.
///
/// Cancellation is checked before every directory child and between file
/// chunks. Whatever was copied before a cancellation or error stays in
/// place.
pub fn copy(
    src: &Path,
    dest: &Path,
    cancel: &CancellationToken,
    progress: &XferProgress,
    buffer_size: usize,
) -> EngineResult<XferOutcome> {
    if cancel.is_cancelled() {
        return Ok(XferOutcome::Cancelled);
    }

    let metadata = fs::symlink_metadata(src).map_err(|e| BurnError::transfer(src, e))?;
    let file_type = metadata.file_type();

    if file_type.is_dir() {
        fs::create_dir_all(dest).map_err(|e| BurnError::transfer(dest, e))?;
        for entry in fs::read_dir(src).map_err(|e| BurnError::transfer(src, e))? {
            if cancel.is_cancelled() {
                return Ok(XferOutcome::Cancelled);
            }
            let entry = entry.map_err(|e| BurnError::transfer(src, e))?;
            let outcome = copy(
                &entry.path(),
                &dest.join(entry.file_name()),
                cancel,
                progress,
                buffer_size,
            )?;
            if outcome == XferOutcome::Cancelled {
                return Ok(outcome);
            }
        }
        Ok(XferOutcome::Completed)
    } else if file_type.is_symlink() {
        let target = fs::read_link(src).map_err(|e| BurnError::transfer(src, e))?;
        std::os::unix::fs::symlink(&target, dest).map_err(|e| BurnError::transfer(dest, e))?;
        progress.add_current(metadata.len());
        progress.finish_entry();
        Ok(XferOutcome::Completed)
    } else {
        copy_file(src, dest, cancel, progress, buffer_size)
    }
}

fn copy_file(
    src: &Path,
    dest: &Path,
    cancel: &CancellationToken,
    progress: &XferProgress,
    buffer_size: usize,
) -> EngineResult<XferOutcome> {
    let mut reader = File::open(src).map_err(|e| BurnError::transfer(src, e))?;
    let mut writer = File::create(dest).map_err(|e| BurnError::transfer(dest, e))?;
    let mut buf = vec![0u8; buffer_size.max(1)];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BurnError::transfer(src, e)),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| BurnError::transfer(dest, e))?;
        progress.add_current(n as u64);

        if cancel.is_cancelled() {
            progress.finish_entry();
            return Ok(XferOutcome::Cancelled);
        }
    }

    writer.flush().map_err(|e| BurnError::transfer(dest, e))?;
    progress.finish_entry();
    Ok(XferOutcome::Completed)
}
