//! Reading and writing persisted cache values.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::error::{ReadError, WriteError};

/// Serializes `value` to `path`, replacing any existing file.
///
/// The value is written to a sibling temp file first and then persisted
/// over the target, so readers never observe a half-written file. Returns
/// the resolved path that was written.
pub fn write_value<T: Serialize>(
    value: &T,
    path: &Path,
    create_dir: bool,
) -> Result<PathBuf, WriteError> {
    let path = std::path::absolute(path).map_err(|source| WriteError::Io {
        path: path.to_owned(),
        source,
    })?;
    let parent = path.parent().unwrap_or(Path::new("."));

    if create_dir {
        std::fs::create_dir_all(parent).map_err(|source| WriteError::CreateDir {
            path: parent.to_owned(),
            source,
        })?;
    }

    let temp_file = NamedTempFile::new_in(parent).map_err(|source| WriteError::Io {
        path: path.clone(),
        source,
    })?;
    let mut writer = BufWriter::new(temp_file.as_file());
    serde_json::to_writer(&mut writer, value).map_err(WriteError::Serialize)?;
    writer.flush().map_err(|source| WriteError::Io {
        path: path.clone(),
        source,
    })?;
    drop(writer);

    temp_file.persist(&path).map_err(|e| WriteError::Io {
        path: path.clone(),
        source: e.error,
    })?;

    Ok(path)
}

/// Deserializes a value previously written by [`write_value`].
pub fn read_value<T: DeserializeOwned>(path: &Path) -> Result<T, ReadError> {
    let path = std::path::absolute(path)?;

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ReadError::MissingPath(path));
        }
        Err(e) => return Err(ReadError::Io(e)),
    };

    serde_json::from_reader(BufReader::new(file)).map_err(ReadError::Malformed)
}

/// The modification time of `path`, or `None` when it cannot be read.
///
/// One metadata read answers both "does the file exist" and "when was it
/// last written".
pub(crate) fn mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use crate::test;

    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = test::tempdir();
        let path = dir.path().join("value.json");

        let written = write_value(&vec![1u32, 2, 3], &path, false).unwrap();
        assert!(written.is_absolute());

        let value: Vec<u32> = read_value(&path).unwrap();
        assert_eq!(value, vec![1, 2, 3]);

        // Overwrites replace the previous value.
        write_value(&vec![4u32], &path, false).unwrap();
        let value: Vec<u32> = read_value(&path).unwrap();
        assert_eq!(value, vec![4]);
    }

    #[test]
    fn test_missing_path() {
        let dir = test::tempdir();
        let path = dir.path().join("nope.json");

        let err = read_value::<u32>(&path).unwrap_err();
        assert!(matches!(err, ReadError::MissingPath(_)));
    }

    #[test]
    fn test_malformed_contents() {
        let dir = test::tempdir();
        let path = dir.path().join("value.json");
        File::create(&path)
            .unwrap()
            .write_all(b"honk honk beep beep")
            .unwrap();

        let err = read_value::<u32>(&path).unwrap_err();
        assert!(matches!(err, ReadError::Malformed(_)));
    }

    #[test]
    fn test_create_dir() {
        let dir = test::tempdir();
        let path = dir.path().join("deeply/nested/value.json");

        let err = write_value(&1u32, &path, false).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));

        write_value(&1u32, &path, true).unwrap();
        let value: u32 = read_value(&path).unwrap();
        assert_eq!(value, 1);
    }
}
