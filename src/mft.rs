//! RPKI manifests.
//!
//! A manifest lists every file a CA currently publishes together with its
//! SHA-256 hash, so a relying party can detect withheld or substituted
//! objects. Manifests are CMS signed objects; their payload is defined in
//! RFC 6486.

use std::{fmt, io};
use std::path::Path;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{error, warn};
use untrusted::{Input, Reader};
use crate::binio::{Compose, Parse, ParseError};
use crate::cms::{self, oid};
use crate::der::{self, Error, Oid, Tag};
use crate::error::Failed;
use crate::x509::{Time, X509};

/// The eContentType of a manifest.
pub const CONTENT_TYPE: Oid<&[u8]>
    = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 26]);


//------------ parse ---------------------------------------------------------

/// Parses and validates a manifest file.
///
/// The CMS layer checks digest, content type and, when `parent` is given,
/// the signatures. A manifest whose validity window does not contain the
/// current time is reported but not rejected; whether a stale manifest
/// makes its publication point unusable is the caller’s policy.
pub fn parse(
    parent: Option<&X509>,
    path: &Path,
    expected_digest: Option<&[u8]>,
) -> Result<Mft, Failed> {
    let object = cms::parse_validate(
        parent, path, &CONTENT_TYPE, expected_digest
    )?;
    let mft = Mft::decode_content(
        path.display().to_string(), object.content()
    ).map_err(|err| {
        error!("{}: {}", path.display(), err);
        Failed
    })?;
    if !mft.is_current(Utc::now()) {
        warn!("{}: manifest outside its validity window", path.display());
    }
    Ok(mft)
}


//------------ Mft -----------------------------------------------------------

/// The content of a manifest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mft {
    file: String,
    manifest_number: Bytes,
    this_update: Time,
    next_update: Time,
    files: Vec<FileAndHash>,
}

impl Mft {
    /// Decodes the eContent of a manifest.
    ///
    /// `file` is the name of the file the manifest came from; it is kept
    /// with the result so the aggregator can refer back to it.
    pub fn decode_content(
        file: String,
        content: &Bytes
    ) -> Result<Self, Error> {
        Input::from(content.as_ref()).read_all(Error::Malformed, |reader| {
            Self::parse_econtent(file, reader)
        })
    }

    /// Parses the manifest eContent, RFC 6486 section 4.2.
    ///
    /// ```text
    /// Manifest ::= SEQUENCE {
    ///     version     [0] INTEGER DEFAULT 0,
    ///     manifestNumber  INTEGER (0..MAX),
    ///     thisUpdate      GeneralizedTime,
    ///     nextUpdate      GeneralizedTime,
    ///     fileHashAlg     OBJECT IDENTIFIER,
    ///     fileList        SEQUENCE SIZE (0..MAX) OF FileAndHash }
    /// ```
    ///
    /// We're supposed to have six elements. But it appears that some
    /// manifests don't have the version, and published objects disagree
    /// on how an explicit version zero is tagged, so all three forms are
    /// accepted as long as the version is zero.
    fn parse_econtent(
        file: String,
        reader: &mut Reader
    ) -> Result<Self, Error> {
        der::parse_nested(reader, Tag::SEQUENCE, |reader| {
            if Tag::CTX_0.peek(reader) {
                let version = der::parse_expected(reader, Tag::CTX_0)?;
                if version.as_slice_less_safe() != [0] {
                    return Err(Error::Malformed)
                }
            }
            else if Tag::CTX_CON_0.peek(reader) {
                der::parse_nested(reader, Tag::CTX_CON_0, |reader| {
                    der::skip_u8_if(reader, 0)
                })?;
            }
            let first = der::parse_unsigned(reader)?;
            let manifest_number = if Tag::INTEGER.peek(reader) {
                // Two integers up front: the first was a bare version.
                if first.as_slice_less_safe() != [0] {
                    return Err(Error::Malformed)
                }
                der::parse_unsigned(reader)?
            }
            else {
                first
            };
            if manifest_number.len() > 20 {
                return Err(Error::Malformed)
            }
            let this_update = Time::parse_generalized(reader)?;
            let next_update = Time::parse_generalized(reader)?;
            if this_update > next_update {
                return Err(Error::Malformed)
            }
            oid::SHA256.skip_if(reader)?;
            let files = der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                let mut files = Vec::new();
                while !reader.at_end() {
                    files.push(FileAndHash::take_from(reader)?);
                }
                Ok(files)
            })?;
            Ok(Mft {
                file,
                manifest_number: Bytes::copy_from_slice(
                    manifest_number.as_slice_less_safe()
                ),
                this_update,
                next_update,
                files,
            })
        })
    }
}

impl Mft {
    /// The name of the file the manifest was parsed from.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The manifest number as big-endian octets.
    ///
    /// The number can be up to twenty octets long, so it is kept raw.
    /// Comparing reissues for monotonicity is up to a consumer that keeps
    /// state across runs.
    pub fn manifest_number(&self) -> &Bytes {
        &self.manifest_number
    }

    pub fn this_update(&self) -> Time {
        self.this_update
    }

    pub fn next_update(&self) -> Time {
        self.next_update
    }

    /// The files the issuing CA currently publishes.
    pub fn files(&self) -> &[FileAndHash] {
        &self.files
    }

    /// Returns whether `now` falls into the manifest’s validity window.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        let now = Time::from(now);
        self.this_update <= now && now <= self.next_update
    }
}


//------------ FileAndHash ---------------------------------------------------

/// One entry of the manifest’s file list.
///
/// ```text
/// FileAndHash ::= SEQUENCE {
///     file    IA5String,
///     hash    BIT STRING }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileAndHash {
    file: String,
    hash: Bytes,
}

impl FileAndHash {
    fn take_from(reader: &mut Reader) -> Result<Self, Error> {
        der::parse_nested(reader, Tag::SEQUENCE, |reader| {
            let file = der::parse_ia5_string(reader)?;
            let file = file.as_slice_less_safe();
            // File names are relative to the publication point. Anything
            // empty or with a path separator is hostile.
            if file.is_empty() || file.contains(&b'/') {
                return Err(Error::Malformed)
            }
            let hash = der::BitString::parse_filled(reader)?;
            if hash.len() != 32 {
                return Err(Error::Malformed)
            }
            Ok(FileAndHash {
                file: String::from_utf8_lossy(file).into_owned(),
                hash: Bytes::copy_from_slice(hash.as_slice_less_safe()),
            })
        })
    }

    /// The file name, relative to the publication point.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The SHA-256 hash the file must have.
    ///
    /// The fetcher layer uses this to validate the referenced object
    /// before it is ever parsed.
    pub fn hash(&self) -> &Bytes {
        &self.hash
    }
}

impl fmt::Display for FileAndHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.file)
    }
}


//------------ Serialization -------------------------------------------------

impl<W: io::Write> Compose<W> for Mft {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        self.file.compose(target)?;
        self.manifest_number.compose(target)?;
        self.this_update.timestamp().compose(target)?;
        self.next_update.timestamp().compose(target)?;
        (self.files.len() as u64).compose(target)?;
        for item in &self.files {
            item.file.compose(target)?;
            item.hash.compose(target)?;
        }
        Ok(())
    }
}

impl<R: io::Read> Parse<R> for Mft {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let file = String::parse(source)?;
        let manifest_number = Bytes::parse(source)?;
        let this_update = parse_time(source)?;
        let next_update = parse_time(source)?;
        if this_update > next_update {
            return Err(ParseError::format("inverted manifest window"))
        }
        let mut files = Vec::new();
        for _ in 0..u64::parse(source)? {
            let file = String::parse(source)?;
            let hash = Bytes::parse(source)?;
            if file.is_empty() || file.contains('/') || hash.len() != 32 {
                return Err(ParseError::format("illegal file list entry"))
            }
            files.push(FileAndHash { file, hash });
        }
        Ok(Mft { file, manifest_number, this_update, next_update, files })
    }
}

fn parse_time<R: io::Read>(source: &mut R) -> Result<Time, ParseError> {
    Time::from_timestamp(i64::parse(source)?).ok_or_else(|| {
        ParseError::format("illegal timestamp")
    })
}


//============ Testing =======================================================
