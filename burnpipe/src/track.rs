//! Tracks: the units of burnable content flowing through a pipeline.
//!
//! A [`Track`] is a shared handle. The orchestrator creates it, whichever
//! stage currently owns it may update it, and the terminal stage hands it to
//! the session when the run finishes.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Kind of content a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio stream (one song).
    Audio,
    /// Data file tree.
    Data,
    /// Disc image file.
    Image,
    /// A whole disc, read or written directly.
    Disc,
}

impl TrackKind {
    /// Default block size for this kind of content.
    pub fn default_block_size(&self) -> u64 {
        match self {
            Self::Audio => 2352,
            Self::Data | Self::Image | Self::Disc => 2048,
        }
    }

    /// Short human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Data => "data",
            Self::Image => "image",
            Self::Disc => "disc",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Estimated size of a track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackSize {
    /// Size of one block in bytes.
    pub block_size: u64,
    /// Number of blocks.
    pub blocks: u64,
    /// Size in bytes.
    pub bytes: u64,
}

impl TrackSize {
    /// Size estimate from a byte count, rounding blocks up.
    pub fn from_bytes(bytes: u64, block_size: u64) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            blocks: bytes.div_ceil(block_size),
            bytes,
        }
    }
}

#[derive(Debug)]
struct TrackInner {
    kind: TrackKind,
    source: Option<PathBuf>,
    output: Option<PathBuf>,
    label: Option<String>,
    size: TrackSize,
    tags: HashMap<String, String>,
}

/// Reference-counted unit of burnable content.
///
/// Cloning is cheap and yields another handle to the same track; use
/// [`Track::ptr_eq`] to compare identity.
#[derive(Clone)]
pub struct Track {
    id: u64,
    inner: Arc<Mutex<TrackInner>>,
}

impl Track {
    /// Create a new track of the given kind with an empty size estimate.
    pub fn new(kind: TrackKind) -> Self {
        Self {
            id: NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed),
            inner: Arc::new(Mutex::new(TrackInner {
                kind,
                source: None,
                output: None,
                label: None,
                size: TrackSize {
                    block_size: kind.default_block_size(),
                    ..TrackSize::default()
                },
                tags: HashMap::new(),
            })),
        }
    }

    /// Builder: set the source path.
    pub fn with_source(self, source: impl Into<PathBuf>) -> Self {
        self.inner.lock().source = Some(source.into());
        self
    }

    /// Builder: set the estimated size from a byte count.
    pub fn with_bytes(self, bytes: u64) -> Self {
        {
            let mut inner = self.inner.lock();
            let block_size = inner.size.block_size;
            inner.size = TrackSize::from_bytes(bytes, block_size);
        }
        self
    }

    /// Builder: set the label.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        self.inner.lock().label = Some(label.into());
        self
    }

    /// Unique id of this track within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns true if both handles refer to the same track.
    pub fn ptr_eq(&self, other: &Track) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.lock().kind
    }

    pub fn source(&self) -> Option<PathBuf> {
        self.inner.lock().source.clone()
    }

    /// Where the stage that produced this track wrote it, if anywhere.
    pub fn output(&self) -> Option<PathBuf> {
        self.inner.lock().output.clone()
    }

    pub fn set_output(&self, path: &Path) {
        self.inner.lock().output = Some(path.to_path_buf());
    }

    pub fn label(&self) -> Option<String> {
        self.inner.lock().label.clone()
    }

    /// Estimated size.
    pub fn size(&self) -> TrackSize {
        self.inner.lock().size
    }

    pub fn set_size(&self, size: TrackSize) {
        self.inner.lock().size = size;
    }

    /// Attach a string tag; returns the previous value.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.inner.lock().tags.insert(key.into(), value.into())
    }

    pub fn tag(&self, key: &str) -> Option<String> {
        self.inner.lock().tags.get(key).cloned()
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("kind", &inner.kind)
            .field("source", &inner.source)
            .field("output", &inner.output)
            .field("size", &inner.size)
            .finish_non_exhaustive()
    }
}
