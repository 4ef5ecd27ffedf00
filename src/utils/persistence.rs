use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use uuid::Uuid;

const TMP_SUFFIX: &str = "tmp";

/// Returns a unique temporary path in the same directory as `path`.
///
/// Keeping the temporary file beside its target guarantees the final rename never
/// crosses a volume boundary.
pub fn tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("staged");
    let token = Uuid::new_v4().simple().to_string();
    path.with_file_name(format!(".{}.{}.{}", file_name, &token[..12], TMP_SUFFIX))
}

/// Creates `path` (truncating), writes `data`, and flushes it to stable storage.
pub fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

/// Writes `data` to `path` through a staged temporary file and an atomic rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    StagedFile::stage(path, data)?.commit()
}

/// Flushes directory metadata so a completed rename survives a crash.
#[cfg(unix)]
pub fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
pub fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Bytes fully written to a temporary sibling of `target`, waiting to be renamed into place.
///
/// Dropping an uncommitted stage removes the temporary file; the target is never touched
/// until [`StagedFile::commit`] performs the rename.
#[derive(Debug)]
pub struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn stage(target: &Path, data: &[u8]) -> io::Result<Self> {
        let tmp = tmp_path(target);
        let staged = Self {
            tmp,
            target: target.to_path_buf(),
            committed: false,
        };
        write_synced(&staged.tmp, data)?;
        Ok(staged)
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically replaces the target with the staged bytes.
    pub fn commit(mut self) -> io::Result<()> {
        fs::rename(&self.tmp, &self.target)?;
        self.committed = true;
        sync_parent_dir(&self.target)
    }

    /// Like [`StagedFile::commit`] but refuses to replace an existing target.
    ///
    /// Publishes by hard-linking the staged file to the target, which the filesystem
    /// refuses atomically when the name is taken. Filesystems without hard links fall
    /// back to a checked rename.
    pub fn commit_new(mut self) -> io::Result<()> {
        match fs::hard_link(&self.tmp, &self.target) {
            Ok(()) => {
                self.committed = true;
                if let Err(err) = fs::remove_file(&self.tmp) {
                    tracing::warn!(
                        path = %self.tmp.display(),
                        error = %err,
                        "staged file left behind"
                    );
                }
                sync_parent_dir(&self.target)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(already_exists(&self.target))
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
                ) =>
            {
                if self.target.exists() {
                    return Err(already_exists(&self.target));
                }
                self.commit()
            }
            Err(err) => Err(err),
        }
    }
}

fn already_exists(target: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("`{}` already exists", target.display()),
    )
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}
