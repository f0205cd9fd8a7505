//! The session boundary.
//!
//! A [`Session`] is the burn session the pipeline works for: it owns the
//! track list, the flags chosen by the user, the target drive, and the
//! allocation of temporary and output paths. The engine only talks to it
//! through this trait. [`LocalSession`] is an in-process implementation
//! backed by a temporary directory.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{BurnError, EngineResult};
use crate::track::{Track, TrackKind};

/// Options selected for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// Simulate the write (laser off).
    pub dummy: bool,
    /// Leave the disc open for further sessions.
    pub multi: bool,
    /// Append to the existing data on the disc.
    pub append: bool,
    /// Merge the new session with the previous one.
    pub merge: bool,
    /// Enable buffer underrun protection.
    pub burnproof: bool,
    /// Eject when done.
    pub eject: bool,
    /// Stream between stages without temporary files where possible.
    pub no_tmp_files: bool,
}

/// Handle on the recorder a session targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drive {
    /// Display name of the drive.
    pub name: String,
    /// Device node.
    pub device: PathBuf,
    /// Next writable address on the loaded medium, if it is appendable.
    pub next_writable_address: Option<u64>,
    /// Start address of the last session on the loaded medium.
    pub last_session_address: Option<u64>,
}

impl Drive {
    pub fn new(name: impl Into<String>, device: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            device: device.into(),
            next_writable_address: None,
            last_session_address: None,
        }
    }
}

/// The burn session a pipeline runs for.
///
/// Implementations must be thread-safe: the task context calls into the
/// session from the control thread while the UI may read the track list.
pub trait Session: Send + Sync {
    /// Current track list.
    fn tracks(&self) -> Vec<Track>;

    /// Append a track to the current list.
    fn add_track(&self, track: Track);

    /// Save the current track list and start an empty one.
    fn push_tracks(&self);

    /// Restore the track list saved by the last [`Session::push_tracks`].
    ///
    /// Returns false when nothing was saved.
    fn pop_tracks(&self) -> bool;

    fn flags(&self) -> SessionFlags;

    /// Target drive, if the session records to one.
    fn drive(&self) -> Option<Drive>;

    /// Requested write rate in bytes per second.
    fn rate(&self) -> Option<u64>;

    /// Disc label / audio title.
    fn label(&self) -> Option<String>;

    /// Path the leader stage should write `kind` content to.
    ///
    /// Either the final image location chosen by the user or a fresh
    /// temporary file.
    fn output_path(&self, kind: TrackKind) -> EngineResult<PathBuf>;

    /// Allocate a fresh temporary file path.
    fn tmp_file(&self, suffix: Option<&str>) -> EngineResult<PathBuf>;

    /// Allocate a fresh temporary directory.
    fn tmp_dir(&self) -> EngineResult<PathBuf>;
}

#[derive(Debug, Default)]
struct TrackStack {
    current: Vec<Track>,
    saved: Vec<Vec<Track>>,
}

/// In-process session keeping temporary entries under one directory.
#[derive(Debug)]
pub struct LocalSession {
    tracks: Mutex<TrackStack>,
    flags: SessionFlags,
    drive: Option<Drive>,
    rate: Option<u64>,
    label: Option<String>,
    tmp_root: PathBuf,
    image_output: Option<PathBuf>,
}

impl LocalSession {
    /// Create a session that allocates temporary entries under `tmp_root`.
    pub fn new(tmp_root: impl Into<PathBuf>) -> Self {
        Self {
            tracks: Mutex::new(TrackStack::default()),
            flags: SessionFlags::default(),
            drive: None,
            rate: None,
            label: None,
            tmp_root: tmp_root.into(),
            image_output: None,
        }
    }

    /// Builder: initial track list.
    pub fn with_tracks(self, tracks: Vec<Track>) -> Self {
        self.tracks.lock().current = tracks;
        self
    }

    pub fn with_flags(mut self, flags: SessionFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_drive(mut self, drive: Drive) -> Self {
        self.drive = Some(drive);
        self
    }

    pub fn with_rate(mut self, rate: u64) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Builder: final location for image output instead of a temporary file.
    pub fn with_image_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_output = Some(path.into());
        self
    }

    /// Root directory for temporary entries.
    pub fn tmp_root(&self) -> &Path {
        &self.tmp_root
    }
}

impl Session for LocalSession {
    fn tracks(&self) -> Vec<Track> {
        self.tracks.lock().current.clone()
    }

    fn add_track(&self, track: Track) {
        self.tracks.lock().current.push(track);
    }

    fn push_tracks(&self) {
        let mut stack = self.tracks.lock();
        let current = std::mem::take(&mut stack.current);
        stack.saved.push(current);
    }

    fn pop_tracks(&self) -> bool {
        let mut stack = self.tracks.lock();
        match stack.saved.pop() {
            Some(saved) => {
                stack.current = saved;
                true
            }
            None => false,
        }
    }

    fn flags(&self) -> SessionFlags {
        self.flags
    }

    fn drive(&self) -> Option<Drive> {
        self.drive.clone()
    }

    fn rate(&self) -> Option<u64> {
        self.rate
    }

    fn label(&self) -> Option<String> {
        self.label.clone()
    }

    fn output_path(&self, kind: TrackKind) -> EngineResult<PathBuf> {
        match (&self.image_output, kind) {
            (Some(path), TrackKind::Image) => Ok(path.clone()),
            (_, TrackKind::Audio) => self.tmp_file(Some(".wav")),
            (_, TrackKind::Image) => self.tmp_file(Some(".iso")),
            _ => self.tmp_file(Some(".bin")),
        }
    }

    fn tmp_file(&self, suffix: Option<&str>) -> EngineResult<PathBuf> {
        std::fs::create_dir_all(&self.tmp_root)
            .map_err(|e| BurnError::resource("temporary directory", e))?;

        let file = tempfile::Builder::new()
            .prefix("burnpipe-")
            .suffix(suffix.unwrap_or(""))
            .tempfile_in(&self.tmp_root)
            .map_err(|e| BurnError::resource("temporary file", e))?;

        file.into_temp_path()
            .keep()
            .map_err(|e| BurnError::resource("temporary file", e.error))
    }

    #[allow(deprecated)]
    fn tmp_dir(&self) -> EngineResult<PathBuf> {
        std::fs::create_dir_all(&self.tmp_root)
            .map_err(|e| BurnError::resource("temporary directory", e))?;

        let dir = tempfile::Builder::new()
            .prefix("burnpipe-")
            .tempdir_in(&self.tmp_root)
            .map_err(|e| BurnError::resource("temporary directory", e))?;

        Ok(dir.into_path())
    }
}
