//! Timestamps and the filesystem seam.
//!
//! Incremental decisions compare modification times across builds, so every
//! stat and read goes through [`FileSystem`]. Production code uses
//! [`LocalFileSystem`]; tests use [`VirtualFileSystem`] to pin times exactly.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A point in time, in nanoseconds relative to the Unix epoch.
///
/// Two sentinels bound every real timestamp: [`Timestamp::DISTANT_PAST`] and
/// [`Timestamp::DISTANT_FUTURE`]. They stand in for "no previous build" so
/// comparisons degrade to the conservative answer instead of needing `Option`
/// checks at every call site.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Older than any real modification time.
    pub const DISTANT_PAST: Self = Self(i64::MIN);
    /// Newer than any real modification time.
    pub const DISTANT_FUTURE: Self = Self(i64::MAX);

    /// Create a timestamp from nanoseconds since the Unix epoch.
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Create a timestamp from whole seconds since the Unix epoch.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Nanoseconds since the Unix epoch.
    #[must_use]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Whether this is one of the two sentinels.
    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        self.0 == i64::MIN || self.0 == i64::MAX
    }

    /// Shift by a signed number of nanoseconds, saturating at the sentinels.
    #[must_use]
    pub const fn offset_nanos(self, nanos: i64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Default for a missing build start time.
    pub fn distant_past() -> Self {
        Self::DISTANT_PAST
    }

    /// Default for a missing build end time.
    pub fn distant_future() -> Self {
        Self::DISTANT_FUTURE
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self(i64::try_from(after.as_nanos()).unwrap_or(i64::MAX - 1)),
            Err(before) => {
                let nanos = i64::try_from(before.duration().as_nanos()).unwrap_or(i64::MAX - 1);
                Self(-nanos)
            }
        }
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> Self {
        let magnitude = Duration::from_nanos(ts.0.unsigned_abs());
        if ts.0 >= 0 {
            UNIX_EPOCH + magnitude
        } else {
            UNIX_EPOCH - magnitude
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DISTANT_PAST => f.write_str("<distant past>"),
            Self::DISTANT_FUTURE => f.write_str("<distant future>"),
            Self(nanos) => {
                let secs = nanos.div_euclid(1_000_000_000);
                let frac = nanos.rem_euclid(1_000_000_000);
                write!(f, "{secs}.{frac:09}s")
            }
        }
    }
}

/// Filesystem operations used by the incremental core.
pub trait FileSystem: Send + Sync {
    /// Modification time of `path`. Fails if the path cannot be stat'd.
    fn last_modification_time(&self, path: &Path) -> io::Result<Timestamp>;

    /// Read the whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or replace a file.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Remove a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Whether `path` can be stat'd.
    fn exists(&self, path: &Path) -> bool {
        self.last_modification_time(path).is_ok()
    }
}

/// The real filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn last_modification_time(&self, path: &Path) -> io::Result<Timestamp> {
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(Timestamp::from(modified))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, contents)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

#[derive(Clone, Debug)]
struct VirtualFile {
    contents: Vec<u8>,
    modified: Timestamp,
}

/// An in-memory filesystem with an explicit clock.
///
/// Writes through the [`FileSystem`] trait are stamped with the current
/// clock value; [`VirtualFileSystem::set_modification_time`] overrides a
/// single file's time afterwards.
#[derive(Debug)]
pub struct VirtualFileSystem {
    files: RwLock<FxHashMap<PathBuf, VirtualFile>>,
    clock: RwLock<Timestamp>,
}

impl Default for VirtualFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFileSystem {
    /// Create an empty filesystem whose clock reads one second after the epoch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: RwLock::new(FxHashMap::default()),
            clock: RwLock::new(Timestamp::from_secs(1)),
        }
    }

    /// Current clock value.
    pub fn clock(&self) -> Timestamp {
        *self.clock.read()
    }

    /// Move the clock.
    pub fn set_clock(&self, now: Timestamp) {
        *self.clock.write() = now;
    }

    /// Insert a file with an explicit modification time.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>, modified: Timestamp) {
        self.files.write().insert(
            path.into(),
            VirtualFile {
                contents: contents.into(),
                modified,
            },
        );
    }

    /// Change the modification time of an existing file.
    ///
    /// Returns `false` if the file does not exist.
    pub fn set_modification_time(&self, path: &Path, modified: Timestamp) -> bool {
        match self.files.write().get_mut(path) {
            Some(file) => {
                file.modified = modified;
                true
            }
            None => false,
        }
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Returns `true` if no files exist.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
}

impl FileSystem for VirtualFileSystem {
    fn last_modification_time(&self, path: &Path) -> io::Result<Timestamp> {
        self.files
            .read()
            .get(path)
            .map(|file| file.modified)
            .ok_or_else(|| not_found(path))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .read()
            .get(path)
            .map(|file| file.contents.clone())
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let modified = self.clock();
        self.insert(path, contents, modified);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.files
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }
}
