use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

const MAX_SUFFIX: u32 = 1000;

/// Write `contents` to a new `<dir>/<stem>-<timestamp>.<ext>` file.
///
/// The name carries a microsecond timestamp; if it is taken anyway a `-N`
/// suffix is added. Existing files are never overwritten.
pub fn write_unique(dir: &Path, stem: &str, ext: &str, contents: &str) -> io::Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S-%6f").to_string();

    for attempt in 0..MAX_SUFFIX {
        let name = if attempt == 0 {
            format!("{stem}-{stamp}.{ext}")
        } else {
            format!("{stem}-{stamp}-{attempt}.{ext}")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(contents.as_bytes())?;
                file.flush()?;
                return Ok(path);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free export file name for {stem} in {}", dir.display()),
    ))
}
