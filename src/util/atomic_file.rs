use errors::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A file that has been completely written to a temporary location next to
/// its destination but not yet moved into place.
///
/// Dropping a `StagedFile` without calling `commit` removes the temporary,
/// so nothing ever shows up at `dest` unless the whole write went through.
pub struct StagedFile {
    tmp: NamedTempFile,
    dest: PathBuf,
}

/// Writes `contents` to a temporary file in the same directory as `dest` (so
/// the final rename stays on one file system).
pub fn stage(dest: &Path, contents: &[u8]) -> Result<StagedFile> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    Ok(StagedFile { tmp, dest: dest.to_path_buf() })
}

impl StagedFile {
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Move the file into place, replacing anything already at `dest`.
    pub fn commit(self) -> Result<PathBuf> {
        let StagedFile { tmp, dest } = self;
        tmp.persist(&dest)?;
        Ok(dest)
    }
}

#[test]
fn test_uncommitted_file_leaves_nothing() {
    let dir = ::tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.dae");

    let staged = stage(&dest, b"<COLLADA/>").unwrap();
    assert!(!dest.exists());
    drop(staged);
    assert!(!dest.exists());
    assert_eq!(::std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let staged = stage(&dest, b"<COLLADA/>").unwrap();
    assert_eq!(staged.commit().unwrap(), dest);
    assert_eq!(::std::fs::read(&dest).unwrap(), b"<COLLADA/>");
}
