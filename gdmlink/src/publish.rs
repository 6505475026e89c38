//! Hands measurements to an external consumer through a file. The consumer deletes the file
//! once it has read it, and a new value is only written when the previous one was taken.
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tempfile::NamedTempFile;

use crate::{DecodedMeasurement, Error};

#[cfg(unix)]
const FILE_MODE: u32 = 0o606;

pub struct Publisher {
    path: PathBuf,
}

impl Publisher {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Publisher { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `false` if the previous measurement was not consumed yet.
    pub fn publish(&self, measurement: &DecodedMeasurement) -> crate::Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        let dir = match self.path.parent() {
            Some(x) if !x.as_os_str().is_empty() => x,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(Error::internal)?;
        file.write_all(measurement.publish_line().as_bytes())
            .map_err(Error::internal)?;
        set_mode(&file)?;
        match file.persist_noclobber(&self.path) {
            Ok(_) => Ok(true),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(Error::internal(anyhow!(
                "Cannot publish to {}: {}",
                self.path.display(),
                err.error
            ))),
        }
    }
}

#[cfg(unix)]
fn set_mode(file: &NamedTempFile) -> crate::Result<()> {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;
    file.as_file()
        .set_permissions(Permissions::from_mode(FILE_MODE))
        .map_err(Error::internal)
}

#[cfg(not(unix))]
fn set_mode(_file: &NamedTempFile) -> crate::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mode;
    use std::fs;

    fn measurement(value: &str) -> DecodedMeasurement {
        DecodedMeasurement {
            mode: Mode::Resistance,
            display_value: value.to_string(),
            display_range_label: "500\u{03A9}".to_string(),
            mode_label: "Ohms".to_string(),
        }
    }

    #[test]
    fn writes_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gdm.txt");
        let publisher = Publisher::new(&path);
        assert!(publisher.publish(&measurement("123.45 \u{03A9}")).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "123.45 \u{03A9}\tOHMS");
        // no temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn keeps_unconsumed_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gdm.txt");
        let publisher = Publisher::new(&path);
        assert!(publisher.publish(&measurement("1")).unwrap());
        assert!(!publisher.publish(&measurement("2")).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\tOHMS");

        fs::remove_file(&path).unwrap();
        assert!(publisher.publish(&measurement("3")).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "3\tOHMS");
    }

    #[cfg(unix)]
    #[test]
    fn file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gdm.txt");
        Publisher::new(&path).publish(&measurement("1")).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o606);
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("gdm.txt");
        assert!(matches!(
            Publisher::new(path).publish(&measurement("1")),
            Err(Error::Internal(_))
        ));
    }
}
