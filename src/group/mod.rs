//! Experiment group membership.
//!
//! Cooperating collectors register their experiments in one group file: a
//! header line followed by one member path per line. Registration goes
//! through [`GroupJoiner::join`], which serializes writers with an exclusive
//! advisory lock and survives the race where one process has just created
//! the (still empty) file.
//!
//! The filesystem is reached through [`GroupFs`] so the retry and timeout
//! logic can be driven without real files or sleeps.

pub mod local;

pub use local::LocalGroupFs;

use crate::error::GroupError;
use nix::errno::Errno;
use nix::unistd::{access, AccessFlags};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// First line of every group file.
pub const GROUP_HEADER: &str = "#analyzer experiment group";

/// Lock attempts before giving up, about two minutes at 10ms each.
pub const MAX_LOCK_ATTEMPTS: usize = 11_900;

/// File operations used by the join protocol. Dropping a file closes it and
/// releases any lock held on it.
pub trait GroupFs {
    type File;

    fn open_existing(&self, path: &Path) -> io::Result<Self::File>;

    /// Create exclusively; `AlreadyExists` when another process won.
    fn create_new(&self, path: &Path) -> io::Result<Self::File>;

    /// Non-blocking exclusive lock; `Ok(false)` when held elsewhere.
    fn try_lock(&self, file: &mut Self::File) -> io::Result<bool>;

    /// Blocking exclusive lock.
    fn lock(&self, file: &mut Self::File) -> io::Result<()>;

    fn len(&self, file: &Self::File) -> io::Result<u64>;

    fn append(&self, file: &mut Self::File, text: &str) -> io::Result<()>;

    /// Wait before the next attempt.
    fn pause(&self);
}

/// Runs the join protocol against a [`GroupFs`].
pub struct GroupJoiner<F: GroupFs> {
    fs: F,
    interrupted: Arc<AtomicBool>,
    max_attempts: usize,
}

impl GroupJoiner<LocalGroupFs> {
    pub fn local(interrupted: Arc<AtomicBool>) -> Self {
        GroupJoiner::new(LocalGroupFs, interrupted)
    }
}

impl<F: GroupFs> GroupJoiner<F> {
    pub fn new(fs: F, interrupted: Arc<AtomicBool>) -> Self {
        GroupJoiner {
            fs,
            interrupted,
            max_attempts: MAX_LOCK_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Count one failed attempt and pause before the next.
    fn backoff(&self, attempts: &mut usize, path: &Path) -> Result<(), GroupError> {
        if self.interrupted() {
            return Err(GroupError::Interrupted);
        }
        *attempts += 1;
        if *attempts >= self.max_attempts {
            return Err(GroupError::Timeout(path.to_path_buf()));
        }
        self.fs.pause();
        Ok(())
    }

    /// Register `member` in the group file at `path`, creating it if needed.
    pub fn join(&self, path: &Path, member: &str) -> Result<(), GroupError> {
        let mut attempts = 0;
        loop {
            match self.fs.open_existing(path) {
                Ok(mut file) => {
                    if self.interrupted() {
                        return Err(GroupError::Interrupted);
                    }
                    let locked = self.fs.try_lock(&mut file).map_err(|source| GroupError::Lock {
                        path: path.to_path_buf(),
                        source,
                    })?;
                    if !locked {
                        drop(file);
                        self.backoff(&mut attempts, path)?;
                        continue;
                    }
                    let len = self.fs.len(&file).map_err(|source| GroupError::Open {
                        path: path.to_path_buf(),
                        source,
                    })?;
                    if len == 0 {
                        // the creator has not written the header yet
                        drop(file);
                        log::debug!("[Group] {} is still being created", path.display());
                        self.backoff(&mut attempts, path)?;
                        continue;
                    }
                    self.fs
                        .append(&mut file, &format!("{}\n", member))
                        .map_err(|source| GroupError::Write {
                            path: path.to_path_buf(),
                            source,
                        })?;
                    log::debug!("[Group] joined {} as {}", path.display(), member);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(GroupError::Open {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }

            let mut file = match self.fs.create_new(path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => {
                    return Err(GroupError::Create {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            };
            self.fs.lock(&mut file).map_err(|source| GroupError::Lock {
                path: path.to_path_buf(),
                source,
            })?;
            self.fs
                .append(&mut file, &format!("{}\n{}\n", GROUP_HEADER, member))
                .map_err(|source| GroupError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
            log::debug!("[Group] created {} with {}", path.display(), member);
            return Ok(());
        }
    }
}

/// Location of the group file: relative group names live in the user
/// directory when one is set.
pub fn group_file_path(group: &str, user_dir: Option<&str>) -> PathBuf {
    match user_dir.filter(|d| !d.is_empty()) {
        Some(dir) if !group.starts_with('/') => Path::new(dir).join(group),
        _ => PathBuf::from(group),
    }
}

/// Verify the group file, or the directory it would be created in, is
/// writable.
pub fn check_group(path: &Path) -> Result<(), GroupError> {
    match access(path, AccessFlags::W_OK) {
        Ok(()) => Ok(()),
        Err(Errno::ENOENT) => {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            access(&dir, AccessFlags::W_OK).map_err(|errno| GroupError::DirNotWritable {
                dir,
                path: path.to_path_buf(),
                source: io::Error::from(errno),
            })
        }
        Err(errno) => Err(GroupError::NotWritable {
            path: path.to_path_buf(),
            source: io::Error::from(errno),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Scripted filesystem: one shared in-memory file.
    #[derive(Default)]
    struct ScriptedFs {
        exists: Cell<bool>,
        contents: RefCell<String>,
        lock_results: RefCell<VecDeque<bool>>,
        empty_reads: Cell<usize>,
        pauses: Cell<usize>,
        create_races: Cell<usize>,
    }

    impl GroupFs for &ScriptedFs {
        type File = ();

        fn open_existing(&self, _path: &Path) -> io::Result<()> {
            if self.exists.get() {
                Ok(())
            } else {
                Err(io::Error::from(io::ErrorKind::NotFound))
            }
        }

        fn create_new(&self, _path: &Path) -> io::Result<()> {
            if self.create_races.get() > 0 {
                self.create_races.set(self.create_races.get() - 1);
                self.exists.set(true);
                self.contents.borrow_mut().push_str("#analyzer experiment group\nother\n");
                return Err(io::Error::from(io::ErrorKind::AlreadyExists));
            }
            self.exists.set(true);
            Ok(())
        }

        fn try_lock(&self, _file: &mut ()) -> io::Result<bool> {
            Ok(self.lock_results.borrow_mut().pop_front().unwrap_or(true))
        }

        fn lock(&self, _file: &mut ()) -> io::Result<()> {
            Ok(())
        }

        fn len(&self, _file: &()) -> io::Result<u64> {
            if self.empty_reads.get() > 0 {
                self.empty_reads.set(self.empty_reads.get() - 1);
                return Ok(0);
            }
            Ok(self.contents.borrow().len() as u64)
        }

        fn append(&self, _file: &mut (), text: &str) -> io::Result<()> {
            self.contents.borrow_mut().push_str(text);
            Ok(())
        }

        fn pause(&self) {
            self.pauses.set(self.pauses.get() + 1);
        }
    }

    fn flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn test_join_creates_file_with_header() {
        let fs = ScriptedFs::default();
        GroupJoiner::new(&fs, flag()).join(Path::new("g.erg"), "a.1.er").unwrap();
        assert_eq!(*fs.contents.borrow(), "#analyzer experiment group\na.1.er\n");
        assert_eq!(fs.pauses.get(), 0);
    }

    #[test]
    fn test_join_appends_after_lock_contention() {
        let fs = ScriptedFs::default();
        fs.exists.set(true);
        fs.contents.borrow_mut().push_str("#analyzer experiment group\nfirst\n");
        fs.lock_results.borrow_mut().extend([false, false, false]);
        GroupJoiner::new(&fs, flag()).join(Path::new("g.erg"), "second").unwrap();
        assert_eq!(fs.pauses.get(), 3);
        assert!(fs.contents.borrow().ends_with("first\nsecond\n"));
    }

    #[test]
    fn test_join_retries_empty_file() {
        let fs = ScriptedFs::default();
        fs.exists.set(true);
        fs.contents.borrow_mut().push_str("#analyzer experiment group\n");
        fs.empty_reads.set(2);
        GroupJoiner::new(&fs, flag()).join(Path::new("g.erg"), "m").unwrap();
        assert_eq!(fs.pauses.get(), 2);
        assert_eq!(*fs.contents.borrow(), "#analyzer experiment group\nm\n");
    }

    #[test]
    fn test_join_handles_creation_race() {
        let fs = ScriptedFs::default();
        fs.create_races.set(1);
        GroupJoiner::new(&fs, flag()).join(Path::new("g.erg"), "mine").unwrap();
        let contents = fs.contents.borrow();
        assert_eq!(contents.matches(GROUP_HEADER).count(), 1);
        assert!(contents.ends_with("other\nmine\n"));
    }

    #[test]
    fn test_join_times_out() {
        let fs = ScriptedFs::default();
        fs.exists.set(true);
        fs.lock_results.borrow_mut().extend(std::iter::repeat(false).take(100));
        let err = GroupJoiner::new(&fs, flag())
            .with_max_attempts(5)
            .join(Path::new("g.erg"), "m")
            .unwrap_err();
        assert!(matches!(err, GroupError::Timeout(_)));
        assert_eq!(fs.pauses.get(), 4);
    }

    #[test]
    fn test_join_interrupted() {
        let fs = ScriptedFs::default();
        fs.exists.set(true);
        fs.lock_results.borrow_mut().push_back(false);
        let interrupted = flag();
        interrupted.store(true, Ordering::SeqCst);
        let err = GroupJoiner::new(&fs, interrupted)
            .join(Path::new("g.erg"), "m")
            .unwrap_err();
        assert!(matches!(err, GroupError::Interrupted));
        assert_eq!(err.to_string(), "user interrupt");
    }

    #[test]
    fn test_group_file_path() {
        assert_eq!(group_file_path("g.erg", None), PathBuf::from("g.erg"));
        assert_eq!(group_file_path("g.erg", Some("/data")), PathBuf::from("/data/g.erg"));
        assert_eq!(group_file_path("/abs/g.erg", Some("/data")), PathBuf::from("/abs/g.erg"));
        assert_eq!(group_file_path("g.erg", Some("")), PathBuf::from("g.erg"));
    }

    #[test]
    fn test_check_group_absent_file_in_writable_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(check_group(&dir.path().join("new.erg")).is_ok());
    }

    #[test]
    fn test_check_group_missing_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = check_group(&dir.path().join("missing/new.erg")).unwrap_err();
        assert!(matches!(err, GroupError::DirNotWritable { .. }));
    }
}
