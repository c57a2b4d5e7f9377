//! Trust Anchor Locators.
//!
//! A TAL is a small out-of-band text file that bootstraps validation: one
//! or more URIs pointing at the trust-anchor certificate, a blank line,
//! and the base64 encoded subject public key info the fetched certificate
//! must carry. The format is defined in RFC 7730.

use std::{fmt, io};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use bytes::Bytes;
use log::{debug, error};
use crate::binio::{Compose, Parse, ParseError};
use crate::der;
use crate::error::Failed;
use crate::x509::{SubjectPublicKeyInfo, ValidationError, X509};


//------------ parse ---------------------------------------------------------

/// Reads and parses a TAL file. All diagnostics are logged.
pub fn parse(path: &Path) -> Result<Tal, Failed> {
    let mut file = File::open(path).map_err(|err| {
        error!("{}: {}", path.display(), err);
        Failed
    })?;
    match Tal::read(&mut file) {
        Ok(tal) => {
            debug!("{}: parsed trust anchor locator", path.display());
            Ok(tal)
        }
        Err(err) => {
            error!("{}: {}", path.display(), err);
            Err(Failed)
        }
    }
}


//------------ Tal -----------------------------------------------------------

/// A trust anchor locator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tal {
    uris: Vec<String>,
    key_info: SubjectPublicKeyInfo,
}

impl Tal {
    /// Reads a TAL from `reader`.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ReadError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let mut data = data.as_slice();
        let mut uris = Vec::new();
        while let Some(uri) = Self::take_uri(&mut data)? {
            uris.push(uri)
        }
        if uris.is_empty() {
            return Err(ReadError::NoUris)
        }

        // What remains is the base64 key, wrapped over any number of
        // lines.
        let mut base64 = Vec::new();
        for line in data.split(|&ch| ch == b'\n') {
            base64.extend(
                line.iter().cloned().filter(|ch| !ch.is_ascii_whitespace())
            );
        }
        let key = base64::decode(&base64)?;
        let key_info = SubjectPublicKeyInfo::decode(&key)?;
        Ok(Tal { uris, key_info })
    }

    /// Takes the next URI line off `data`.
    ///
    /// Returns `None` when the blank separator line is reached. Running
    /// out of input before that is an error since the key block has to
    /// follow.
    fn take_uri(data: &mut &[u8]) -> Result<Option<String>, ReadError> {
        let mut split = data.splitn(2, |&ch| ch == b'\n');
        let mut line = split.next().ok_or(ReadError::UnexpectedEof)?;
        *data = split.next().ok_or(ReadError::UnexpectedEof)?;
        if line.ends_with(b"\r") {
            line = &line[..line.len() - 1];
        }
        if line.is_empty() {
            return Ok(None)
        }
        if !line.starts_with(b"rsync://") && !line.starts_with(b"https://") {
            return Err(ReadError::BadUri(
                String::from_utf8_lossy(line).into_owned()
            ))
        }
        match std::str::from_utf8(line) {
            Ok(line) => Ok(Some(line.into())),
            Err(_) => Err(ReadError::BadUri(
                String::from_utf8_lossy(line).into_owned()
            ))
        }
    }
}

impl Tal {
    /// The URIs in the order they appear in the file.
    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// The URI to try first: the first rsync URI if there is one.
    pub fn preferred_uri(&self) -> &str {
        self.uris.iter()
            .find(|uri| uri.starts_with("rsync://"))
            .unwrap_or(&self.uris[0])
    }

    /// The subject public key info the trust anchor must carry.
    pub fn key_info(&self) -> &SubjectPublicKeyInfo {
        &self.key_info
    }

    /// Checks a fetched trust-anchor certificate against the locator.
    ///
    /// The certificate’s subject public key info must be byte-for-byte
    /// identical with the key pinned in the TAL.
    pub fn check_anchor(&self, anchor: &X509) -> Result<(), ValidationError> {
        if self.key_info.raw() == anchor.spki() {
            Ok(())
        }
        else {
            Err(ValidationError)
        }
    }

    pub(crate) fn new(
        uris: Vec<String>,
        key_info: SubjectPublicKeyInfo
    ) -> Self {
        Tal { uris, key_info }
    }
}


//------------ Serialization -------------------------------------------------

impl<W: io::Write> Compose<W> for Tal {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        (self.uris.len() as u64).compose(target)?;
        for uri in &self.uris {
            uri.compose(target)?;
        }
        self.key_info.raw().compose(target)
    }
}

impl<R: io::Read> Parse<R> for Tal {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let count = u64::parse(source)?;
        if count == 0 {
            return Err(ParseError::format("trust anchor without URIs"))
        }
        let mut uris = Vec::new();
        for _ in 0..count {
            uris.push(String::parse(source)?);
        }
        let key = Bytes::parse(source)?;
        let key_info = SubjectPublicKeyInfo::decode(&key).map_err(|_| {
            ParseError::format("bad key info")
        })?;
        Ok(Tal::new(uris, key_info))
    }
}


//------------ ReadError -----------------------------------------------------

#[derive(Debug)]
pub enum ReadError {
    /// Reading the file failed.
    Io(io::Error),

    /// The file ended before the blank separator line.
    UnexpectedEof,

    /// The file does not contain a single URI.
    NoUris,

    /// A URI line does not carry an rsync or HTTPS URI.
    BadUri(String),

    /// The key block is not valid base64.
    BadKeyInfoEncoding(base64::DecodeError),

    /// The decoded key is not a well-formed SubjectPublicKeyInfo.
    BadKeyInfo(der::Error),
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> ReadError {
        ReadError::Io(err)
    }
}

impl From<base64::DecodeError> for ReadError {
    fn from(err: base64::DecodeError) -> ReadError {
        ReadError::BadKeyInfoEncoding(err)
    }
}

impl From<der::Error> for ReadError {
    fn from(err: der::Error) -> ReadError {
        ReadError::BadKeyInfo(err)
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ReadError::Io(ref err) => err.fmt(f),
            ReadError::UnexpectedEof => f.write_str("unexpected end of file"),
            ReadError::NoUris => f.write_str("no trust anchor URIs"),
            ReadError::BadUri(ref uri) => {
                write!(f, "bad trust anchor URI: {}", uri)
            }
            ReadError::BadKeyInfoEncoding(ref err) => {
                write!(f, "bad key info: {}", err)
            }
            ReadError::BadKeyInfo(ref err) => {
                write!(f, "bad key info: {}", err)
            }
        }
    }
}


//============ Testing =======================================================
