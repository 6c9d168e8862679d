//! Real files with `flock(2)` advisory locks.

use super::GroupFs;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Delay between lock attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Group files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalGroupFs;

fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    // SAFETY: the descriptor is owned by `file` and open for the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

impl GroupFs for LocalGroupFs {
    type File = File;

    fn open_existing(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new().read(true).write(true).open(path)
    }

    fn create_new(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o666)
            .open(path)
    }

    fn try_lock(&self, file: &mut File) -> io::Result<bool> {
        match flock(file, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn lock(&self, file: &mut File) -> io::Result<()> {
        loop {
            match flock(file, libc::LOCK_EX) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn len(&self, file: &File) -> io::Result<u64> {
        Ok(file.metadata()?.len())
    }

    fn append(&self, file: &mut File, text: &str) -> io::Result<()> {
        file.seek(SeekFrom::End(0))?;
        file.write_all(text.as_bytes())?;
        file.flush()
    }

    fn pause(&self) {
        thread::sleep(POLL_INTERVAL);
    }
}
