//! Small helpers shared by the object parsers.

use std::{fmt, io};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use bytes::Bytes;
use ring::digest;


//------------ read_file -----------------------------------------------------

/// Reads a file, optionally checking its SHA-256 digest on the way.
///
/// The digest is computed while streaming the file in so the data is only
/// traversed once, mirroring what a message-digest filter on the input
/// stream would do.
pub fn read_file(
    path: &Path,
    expected_digest: Option<&[u8]>,
) -> Result<Bytes, FileError> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    match expected_digest {
        Some(expected) => {
            let mut context = digest::Context::new(&digest::SHA256);
            let mut buf = [0u8; 8192];
            loop {
                let read = file.read(&mut buf)?;
                if read == 0 {
                    break
                }
                context.update(&buf[..read]);
                data.extend_from_slice(&buf[..read]);
            }
            if context.finish().as_ref() != expected {
                return Err(FileError::DigestMismatch)
            }
        }
        None => {
            file.read_to_end(&mut data)?;
        }
    }
    Ok(data.into())
}

/// Returns the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> digest::Digest {
    digest::digest(&digest::SHA256, data)
}


//------------ FileError -----------------------------------------------------

#[derive(Debug)]
pub enum FileError {
    /// Reading the file failed.
    Io(io::Error),

    /// The file’s digest didn’t match the expected digest.
    DigestMismatch,
}

impl From<io::Error> for FileError {
    fn from(err: io::Error) -> Self {
        FileError::Io(err)
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FileError::Io(ref err) => err.fmt(f),
            FileError::DigestMismatch => f.write_str("bad message digest"),
        }
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn digest_check() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();

        let good = sha256(b"hello world");
        let data = read_file(file.path(), Some(good.as_ref())).unwrap();
        assert_eq!(data.as_ref(), b"hello world");

        let bad = sha256(b"something else");
        match read_file(file.path(), Some(bad.as_ref())) {
            Err(FileError::DigestMismatch) => { }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_file() {
        match read_file(Path::new("/nonexistent/file"), None) {
            Err(FileError::Io(_)) => { }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
