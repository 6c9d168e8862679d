//! Experiment naming and versioning.
//!
//! Names are derived from the user's experiment name, directory, group and
//! default stem. Default names carry a version number (`test.1.er`); when a
//! name is taken the store directory is scanned and the version bumped past
//! the highest sibling, so concurrent collectors never share a directory.

pub mod fstype;

use crate::error::NamingError;
use crate::models::{EXPERIMENT_SUFFIX, GROUP_SUFFIX};
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

/// Bound on directory creation attempts.
pub const MAX_CREATE_ATTEMPTS: usize = 4095;

/// User inputs the derived names depend on.
#[derive(Debug, Clone, Copy)]
pub struct NameInputs<'a> {
    pub user_name: Option<&'a str>,
    pub user_dir: Option<&'a str>,
    pub group: Option<&'a str>,
    pub default_stem: &'a str,
}

/// Derived experiment location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentNames {
    /// Experiment name, possibly with a directory part.
    pub expt_name: String,
    /// Directory part of `expt_name`, `.` when there is none.
    pub expt_dir: String,
    pub base_name: String,
    pub store_dir: String,
    /// `<store_dir>/<base_name>`, or the bare base name in `.`.
    pub store_path: String,
    pub expno: u32,
    prev_store_dir: String,
}

impl Default for ExperimentNames {
    fn default() -> Self {
        ExperimentNames {
            expt_name: String::new(),
            expt_dir: ".".to_string(),
            base_name: String::new(),
            store_dir: ".".to_string(),
            store_path: String::new(),
            expno: 1,
            prev_store_dir: String::new(),
        }
    }
}

/// Stem of default names for a group: suffix and directory stripped.
pub fn group_stem<'a>(group: &'a str, default_stem: &'a str) -> &'a str {
    let stem = group.strip_suffix(GROUP_SUFFIX).unwrap_or(group);
    let base = stem.rsplit('/').next().unwrap_or(stem);
    if base.is_empty() {
        default_stem
    } else {
        base
    }
}

/// Collapse `//` and `/./` in a path.
pub fn canonical_path(path: &str) -> String {
    let mut out = path.to_string();
    loop {
        let next = out.replace("/./", "/").replace("//", "/");
        if next == out {
            return out;
        }
        out = next;
    }
}

/// Split `<prefix>.<digits>.er` into `"<prefix>."` and the version.
fn split_version(base: &str) -> Option<(&str, u32)> {
    let stem = base.strip_suffix(EXPERIMENT_SUFFIX)?;
    let head_len = stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if head_len == stem.len() {
        return None;
    }
    let head = &stem[..head_len];
    if head.len() < 2 || !head.ends_with('.') {
        return None;
    }
    let version = stem[head_len..].parse().ok()?;
    Some((head, version))
}

/// Version of a sibling entry sharing `head`, if it has that form.
fn sibling_version(entry: &str, head: &str) -> Option<i64> {
    let digits = entry.strip_suffix(EXPERIMENT_SUFFIX)?.strip_prefix(head)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl ExperimentNames {
    /// Names for `inputs` without any warnings.
    pub fn derive(inputs: NameInputs<'_>) -> Self {
        let mut names = ExperimentNames::default();
        names.preprocess(inputs, false);
        names
    }

    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    /// Recompute every derived field from the inputs.
    ///
    /// Returns the accumulated non-fatal warnings. The filesystem type of a
    /// store directory is only reported once, and only when `fs_warning`.
    pub fn preprocess(&mut self, inputs: NameInputs<'_>, fs_warning: bool) -> Option<String> {
        let mut warnings = String::new();
        let user_dir = inputs.user_dir.filter(|d| !d.is_empty());

        self.expno = 1;
        self.expt_name = match inputs.user_name {
            Some(name) => name.to_string(),
            None => {
                let stem = match inputs.group {
                    Some(group) => group_stem(group, inputs.default_stem),
                    None => inputs.default_stem,
                };
                format!("{}.{}{}", stem, self.expno, EXPERIMENT_SUFFIX)
            }
        };

        if let (true, Some(dir)) = (self.expt_name.starts_with('/'), user_dir) {
            warnings.push_str(&format!(
                "Warning: Experiment name is an absolute path; directory name {} ignored.\n",
                dir
            ));
        }

        match self.expt_name.rfind('/') {
            Some(slash) => {
                self.expt_dir = self.expt_name[..slash].to_string();
                self.base_name = self.expt_name[slash + 1..].to_string();
            }
            None => {
                self.expt_dir = ".".to_string();
                self.base_name = self.expt_name.clone();
            }
        }

        self.store_dir = if self.expt_dir.starts_with('/') {
            self.expt_dir.clone()
        } else {
            match user_dir {
                None if self.expt_dir.is_empty() => ".".to_string(),
                None => self.expt_dir.clone(),
                Some(dir) if self.expt_dir.is_empty() || self.expt_dir == "." => dir.to_string(),
                Some(dir) => format!("{}/{}", dir, self.expt_dir),
            }
        };
        self.rebuild_store_path();

        if self.store_dir != self.prev_store_dir {
            self.prev_store_dir = self.store_dir.clone();
            if fs_warning {
                if let Some(fstype) = fstype::remote_fs_type(Path::new(&self.store_dir)) {
                    warnings.push_str(&format!(
                        "Experiment directory is set to a file system of type \"{}\",\n  which may distort the measured performance;\n  it is preferable to record to a local disk.\n",
                        fstype
                    ));
                }
            }
        }

        (!warnings.is_empty()).then_some(warnings)
    }

    fn rebuild_store_path(&mut self) {
        self.store_path = if self.store_dir == "." {
            self.base_name.clone()
        } else {
            format!("{}/{}", self.store_dir, self.base_name)
        };
    }

    /// Make sure the experiment name is not taken, bumping its version when
    /// it is.
    ///
    /// With `check_only` the name is only verified to be renamable. With
    /// `force_new` a new version is chosen even when the current name is
    /// free. `change_msg` reports a rename as the returned message.
    ///
    /// # Panics
    ///
    /// If the base name does not end in `.er`; every name source guarantees
    /// the suffix.
    pub fn reserve_unique_name(
        &mut self,
        change_msg: bool,
        check_only: bool,
        force_new: bool,
    ) -> Result<Option<String>, NamingError> {
        if self.base_name.len() < 4 || !self.base_name.ends_with(EXPERIMENT_SUFFIX) {
            panic!("experiment base name `{}' lacks the {} suffix", self.base_name, EXPERIMENT_SUFFIX);
        }

        if !force_new {
            let full = format!("{}/{}", self.store_dir, self.base_name);
            if let Err(e) = fs::metadata(&full) {
                if e.kind() == io::ErrorKind::NotFound {
                    return Ok(None);
                }
            }
        } else if check_only {
            return Ok(None);
        }

        let Some((head, version)) = split_version(&self.base_name) else {
            return Err(NamingError::NameInUse(self.base_name.clone()));
        };
        if check_only {
            return Ok(None);
        }
        let head = head.to_string();

        let mut version = i64::from(version);
        if force_new {
            version += 1;
        }
        let mut max_version = version - 1;

        let entries = match fs::read_dir(&self.store_dir) {
            Ok(entries) => entries,
            // reported again when the directory is created
            Err(_) => return Ok(None),
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if let Some(v) = name.to_str().and_then(|n| sibling_version(n, &head)) {
                max_version = max_version.max(v);
            }
        }

        let version = max_version + 1;
        let new_base = format!("{}{}{}", head, version, EXPERIMENT_SUFFIX);
        let message = (change_msg && new_base != self.base_name)
            .then(|| format!("name {} is in use; changed to {}\n", self.base_name, new_base));
        if new_base != self.base_name {
            log::debug!("[Naming] {} -> {}", self.base_name, new_base);
        }

        self.base_name = new_base;
        self.expno = u32::try_from(version).unwrap_or(u32::MAX);
        self.expt_name = if self.expt_dir.is_empty() || self.expt_dir == "." {
            self.base_name.clone()
        } else {
            format!("{}/{}", self.expt_dir, self.base_name)
        };
        self.rebuild_store_path();
        Ok(message)
    }

    /// Create the experiment directory, renaming on every collision.
    pub fn create_experiment_dir(&mut self) -> Result<(), NamingError> {
        for attempt in 0..MAX_CREATE_ATTEMPTS {
            match DirBuilder::new().mode(0o755).create(&self.store_path) {
                Ok(()) => {
                    log::debug!("[Naming] created experiment directory {}", self.store_path);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    return Err(NamingError::NotWritable {
                        dir: self.store_dir.clone(),
                        source: e,
                    });
                }
                Err(e) => {
                    if attempt + 1 >= MAX_CREATE_ATTEMPTS {
                        return Err(NamingError::Exhausted {
                            path: self.store_path.clone(),
                            attempts: MAX_CREATE_ATTEMPTS,
                            source: e,
                        });
                    }
                    if let Err(err) = self.reserve_unique_name(false, false, true) {
                        return Err(NamingError::CreateFailed {
                            path: self.store_path.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }
        Err(NamingError::CreateFailed {
            path: self.store_path.clone(),
            reason: "no attempt made".to_string(),
        })
    }

    /// Remove the (empty) experiment directory.
    pub fn remove_experiment_dir(&self) {
        if let Err(e) = fs::remove_dir(&self.store_path) {
            log::debug!("[Naming] rmdir {} failed: {}", self.store_path, e);
        }
    }
}
