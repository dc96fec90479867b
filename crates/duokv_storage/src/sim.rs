//! Simulated filesystem with rule-based fault injection.

use crate::error::{StorageError, StorageResult};
use crate::memory::MemVfs;
use crate::vfs::{Vfs, VfsFile};
use parking_lot::Mutex;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The filesystem operation a fault rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    /// Opening (or creating) a file.
    Open,
    /// Positional reads.
    Read,
    /// Positional writes.
    Write,
    /// Flushing buffered writes.
    Flush,
    /// Syncing to durable storage.
    Sync,
    /// Truncation.
    Truncate,
    /// File removal.
    Remove,
}

/// The error kind a fault rule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// No space left on device.
    DiskFull,
    /// Operation not permitted.
    PermissionDenied,
    /// Generic I/O failure.
    IoError,
    /// File does not exist.
    FileNotFound,
    /// Device temporarily busy.
    DeviceBusy,
    /// Network-backed filesystem failure.
    NetworkError,
    /// Backing bytes are damaged.
    CorruptedData,
}

impl FaultKind {
    fn into_error(self, path: &Path) -> StorageError {
        let path = path.to_path_buf();
        match self {
            Self::DiskFull => StorageError::DiskFull { path },
            Self::PermissionDenied => StorageError::PermissionDenied { path },
            Self::IoError => StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected I/O error: {}", path.display()),
            )),
            Self::FileNotFound => StorageError::FileNotFound { path },
            Self::DeviceBusy => StorageError::DeviceBusy { path },
            Self::NetworkError => StorageError::NetworkError { path },
            Self::CorruptedData => StorageError::CorruptedData { path },
        }
    }
}

/// A single injection rule: `{operation, path-glob} -> error`.
///
/// A rule with `remaining: Some(n)` fires `n` times and then disarms;
/// `remaining: None` fires on every match until cleared.
#[derive(Debug, Clone)]
pub struct FaultRule {
    /// Operation to match.
    pub op: FaultOp,
    /// Glob pattern matched against the file path (`*` and `?` wildcards).
    pub pattern: String,
    /// Error kind to produce.
    pub kind: FaultKind,
    /// Number of remaining firings, or `None` for a persistent rule.
    pub remaining: Option<u32>,
}

impl FaultRule {
    /// Creates a one-shot rule that fires once and disarms.
    #[must_use]
    pub fn once(op: FaultOp, pattern: impl Into<String>, kind: FaultKind) -> Self {
        Self {
            op,
            pattern: pattern.into(),
            kind,
            remaining: Some(1),
        }
    }

    /// Creates a persistent rule that fires on every match.
    #[must_use]
    pub fn persistent(op: FaultOp, pattern: impl Into<String>, kind: FaultKind) -> Self {
        Self {
            op,
            pattern: pattern.into(),
            kind,
            remaining: None,
        }
    }
}

/// An in-memory filesystem that injects configured faults.
///
/// Operations are checked against the installed [`FaultRule`]s before they
/// reach the backing bytes. The harness can also reach around the file
/// handles with [`SimVfs::corrupt_at`] / [`SimVfs::truncate_raw`] to
/// simulate physical media damage the filesystem itself never observes.
///
/// # Example
///
/// ```rust
/// use duokv_storage::{FaultKind, FaultOp, FaultRule, SimVfs, StorageError, Vfs};
/// use std::path::Path;
///
/// let vfs = SimVfs::new();
/// vfs.inject(FaultRule::once(FaultOp::Write, "*.wal", FaultKind::DiskFull));
///
/// let mut file = vfs.open(Path::new("intent.wal")).unwrap();
/// assert!(matches!(
///     file.write_at(0, b"x"),
///     Err(StorageError::DiskFull { .. })
/// ));
/// // The rule was one-shot; the next write goes through.
/// file.write_at(0, b"x").unwrap();
/// ```
#[derive(Debug, Default, Clone)]
pub struct SimVfs {
    inner: MemVfs,
    rules: Arc<Mutex<Vec<FaultRule>>>,
}

impl SimVfs {
    /// Creates a new simulated filesystem with no rules installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a fault rule.
    pub fn inject(&self, rule: FaultRule) {
        self.rules.lock().push(rule);
    }

    /// Removes all installed rules.
    pub fn clear_faults(&self) {
        self.rules.lock().clear();
    }

    /// Returns the number of currently armed rules.
    #[must_use]
    pub fn armed_rules(&self) -> usize {
        self.rules.lock().len()
    }

    /// Overwrites bytes of a file directly, bypassing fault rules.
    ///
    /// Writing past the current size extends the file. Used to simulate
    /// bit rot and other media faults between operations.
    pub fn corrupt_at(&self, path: &Path, offset: u64, bytes: &[u8]) {
        if let Some(data) = self.inner.contents(path) {
            let mut data = data.lock();
            let end = offset as usize + bytes.len();
            if end > data.len() {
                data.resize(end, 0);
            }
            data[offset as usize..end].copy_from_slice(bytes);
        }
    }

    /// Flips a single bit of a file directly, bypassing fault rules.
    pub fn flip_bit(&self, path: &Path, offset: u64, bit: u8) {
        if let Some(data) = self.inner.contents(path) {
            let mut data = data.lock();
            if let Some(byte) = data.get_mut(offset as usize) {
                *byte ^= 1 << (bit % 8);
            }
        }
    }

    /// Truncates a file directly, bypassing fault rules.
    pub fn truncate_raw(&self, path: &Path, new_size: u64) {
        if let Some(data) = self.inner.contents(path) {
            let mut data = data.lock();
            data.truncate(new_size as usize);
        }
    }

    /// Returns a copy of a file's raw bytes, or `None` if it does not exist.
    #[must_use]
    pub fn raw_bytes(&self, path: &Path) -> Option<Vec<u8>> {
        self.inner.contents(path).map(|data| data.lock().clone())
    }

    fn check(&self, op: FaultOp, path: &Path) -> StorageResult<()> {
        let mut rules = self.rules.lock();
        for i in 0..rules.len() {
            if rules[i].op != op || !glob_match(&rules[i].pattern, &path.to_string_lossy()) {
                continue;
            }
            let kind = rules[i].kind;
            let disarm = match rules[i].remaining.as_mut() {
                Some(n) if *n <= 1 => true,
                Some(n) => {
                    *n -= 1;
                    false
                }
                None => false,
            };
            if disarm {
                rules.remove(i);
            }
            return Err(kind.into_error(path));
        }
        Ok(())
    }
}

impl Vfs for SimVfs {
    fn open(&self, path: &Path) -> StorageResult<Box<dyn VfsFile>> {
        self.check(FaultOp::Open, path)?;
        let inner = self.inner.open(path)?;
        Ok(Box::new(SimFile {
            path: path.to_path_buf(),
            vfs: self.clone(),
            inner,
        }))
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        self.check(FaultOp::Remove, path)?;
        self.inner.remove(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }
}

/// An open handle on the simulated filesystem.
struct SimFile {
    path: PathBuf,
    vfs: SimVfs,
    inner: Box<dyn VfsFile>,
}

impl VfsFile for SimFile {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.vfs.check(FaultOp::Read, &self.path)?;
        self.inner.read_at(offset, len)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.vfs.check(FaultOp::Write, &self.path)?;
        self.inner.write_at(offset, data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.vfs.check(FaultOp::Flush, &self.path)?;
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.vfs.check(FaultOp::Sync, &self.path)?;
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.vfs.check(FaultOp::Truncate, &self.path)?;
        self.inner.truncate(new_size)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

/// Matches `text` against a glob `pattern` supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    // Iterative wildcard match with backtracking over the last `*`.
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matching() {
        assert!(glob_match("*.wal", "intent.wal"));
        assert!(glob_match("*.wal", "/tmp/db/completion.wal"));
        assert!(!glob_match("*.wal", "intent.log"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("intent.???", "intent.wal"));
        assert!(glob_match("*intent*", "db/intent.wal"));
        assert!(!glob_match("intent.wal", "completion.wal"));
    }

    #[test]
    fn no_rules_behaves_like_memory() {
        let vfs = SimVfs::new();
        let mut file = vfs.open(Path::new("a.wal")).unwrap();
        file.write_at(0, b"hello").unwrap();
        assert_eq!(&file.read_at(0, 5).unwrap(), b"hello");
    }

    #[test]
    fn one_shot_rule_disarms() {
        let vfs = SimVfs::new();
        vfs.inject(FaultRule::once(FaultOp::Write, "*.wal", FaultKind::DiskFull));

        let mut file = vfs.open(Path::new("intent.wal")).unwrap();
        assert!(matches!(
            file.write_at(0, b"x"),
            Err(StorageError::DiskFull { .. })
        ));
        assert_eq!(vfs.armed_rules(), 0);
        file.write_at(0, b"x").unwrap();
    }

    #[test]
    fn persistent_rule_keeps_firing() {
        let vfs = SimVfs::new();
        vfs.inject(FaultRule::persistent(
            FaultOp::Sync,
            "*",
            FaultKind::DeviceBusy,
        ));

        let mut file = vfs.open(Path::new("a.bin")).unwrap();
        assert!(file.sync().is_err());
        assert!(file.sync().is_err());

        vfs.clear_faults();
        file.sync().unwrap();
    }

    #[test]
    fn rule_only_matches_its_operation() {
        let vfs = SimVfs::new();
        vfs.inject(FaultRule::once(
            FaultOp::Write,
            "*.wal",
            FaultKind::PermissionDenied,
        ));

        let mut file = vfs.open(Path::new("a.wal")).unwrap();
        // Reads are unaffected by a write rule.
        file.write_at(0, b"x").unwrap_err();
        file.write_at(0, b"abc").unwrap();
        assert_eq!(&file.read_at(0, 3).unwrap(), b"abc");
    }

    #[test]
    fn rule_only_matches_its_glob() {
        let vfs = SimVfs::new();
        vfs.inject(FaultRule::persistent(
            FaultOp::Write,
            "*intent*",
            FaultKind::DiskFull,
        ));

        let mut intent = vfs.open(Path::new("intent.wal")).unwrap();
        let mut other = vfs.open(Path::new("completion.wal")).unwrap();

        assert!(intent.write_at(0, b"x").is_err());
        other.write_at(0, b"x").unwrap();
    }

    #[test]
    fn corruption_bypasses_rules() {
        let vfs = SimVfs::new();
        let mut file = vfs.open(Path::new("a.wal")).unwrap();
        file.write_at(0, b"\x00\x00").unwrap();

        vfs.flip_bit(Path::new("a.wal"), 1, 0);
        assert_eq!(&file.read_at(0, 2).unwrap(), &[0x00, 0x01]);

        vfs.corrupt_at(Path::new("a.wal"), 0, b"\xff");
        assert_eq!(&file.read_at(0, 2).unwrap(), &[0xff, 0x01]);

        vfs.truncate_raw(Path::new("a.wal"), 1);
        assert_eq!(file.size().unwrap(), 1);
    }

    #[test]
    fn open_fault() {
        let vfs = SimVfs::new();
        vfs.inject(FaultRule::once(
            FaultOp::Open,
            "*.wal",
            FaultKind::FileNotFound,
        ));

        assert!(matches!(
            vfs.open(Path::new("x.wal")),
            Err(StorageError::FileNotFound { .. })
        ));
        assert!(vfs.open(Path::new("x.wal")).is_ok());
    }
}
