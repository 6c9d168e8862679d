//! Filesystem type detection for the store directory.

use nix::sys::statfs::statfs;
use std::path::Path;

const NFS_SUPER_MAGIC: i64 = 0x6969;
const SMB_SUPER_MAGIC: i64 = 0x517B;
const CIFS_MAGIC_NUMBER: i64 = 0xFF53_4D42;
const SMB2_MAGIC_NUMBER: i64 = 0xFE53_4D42;
const FUSE_SUPER_MAGIC: i64 = 0x6573_5546;

/// Name of a filesystem magic that is known to distort timing.
pub fn remote_fs_name(magic: i64) -> Option<&'static str> {
    match magic & 0xFFFF_FFFF {
        NFS_SUPER_MAGIC => Some("nfs"),
        SMB_SUPER_MAGIC => Some("smbfs"),
        CIFS_MAGIC_NUMBER => Some("cifs"),
        SMB2_MAGIC_NUMBER => Some("smb2"),
        FUSE_SUPER_MAGIC => Some("fuse"),
        _ => None,
    }
}

/// Remote or user-space filesystem holding `dir`, if any.
pub fn remote_fs_type(dir: &Path) -> Option<&'static str> {
    match statfs(dir) {
        Ok(stat) => remote_fs_name(stat.filesystem_type().0 as i64),
        Err(e) => {
            log::debug!("[Naming] statfs {} failed: {}", dir.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_fs_names() {
        assert_eq!(remote_fs_name(0x6969), Some("nfs"));
        assert_eq!(remote_fs_name(0xFF53_4D42), Some("cifs"));
        // sign-extended form of the same magic
        assert_eq!(remote_fs_name(0xFF53_4D42u32 as i32 as i64), Some("cifs"));
        assert_eq!(remote_fs_name(0xEF53), None);
    }

    #[test]
    fn test_temp_dir_is_not_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let _ = remote_fs_type(dir.path());
    }
}
