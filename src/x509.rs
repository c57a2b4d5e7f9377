//! X.509 plumbing shared by certificates and signed objects.
//!
//! The types herein cover the generic parts of the certificate profile:
//! times, algorithm identifiers, subject public key info, and the raw
//! certificate handle used for the one-hop signature checks.

use std::fmt;
use bytes::Bytes;
use chrono::{DateTime, LocalResult, TimeZone, Utc};
use ring::signature;
use untrusted::{Input, Reader};
use crate::der::{self, BitString, Error, Oid, Tag};


//------------ X509 ----------------------------------------------------------

/// A raw X.509 certificate handle.
///
/// This keeps the pieces of a decoded certificate that are needed after
/// parsing: the complete encoding, the to-be-signed span and signature for
/// verification against an issuer key, the subject public key info for
/// trust-anchor comparison, and the subject key identifier for matching a
/// CMS signer. Ownership transfers to the caller of the certificate
/// parser; the semantic [`Cert`][crate::cert::Cert] value is independent
/// of it.
#[derive(Clone, Debug)]
pub struct X509 {
    raw: Bytes,
    tbs: Bytes,
    signature: Bytes,
    spki: Bytes,
    public_key: Bytes,
    subject_key_id: Bytes,
}

impl X509 {
    pub(crate) fn new(
        raw: Bytes,
        tbs: Bytes,
        signature: Bytes,
        spki: Bytes,
        public_key: Bytes,
        subject_key_id: Bytes,
    ) -> Self {
        X509 { raw, tbs, signature, spki, public_key, subject_key_id }
    }

    /// The complete DER encoding of the certificate.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The DER encoding of the SubjectPublicKeyInfo.
    pub fn spki(&self) -> &Bytes {
        &self.spki
    }

    /// The subject public key, i.e., the content of the key bit string.
    pub fn public_key(&self) -> &Bytes {
        &self.public_key
    }

    /// The value of the Subject Key Identifier extension.
    pub fn subject_key_id(&self) -> &Bytes {
        &self.subject_key_id
    }

    /// Verifies that this certificate was signed by `issuer`’s key.
    ///
    /// This is a direct, one-hop check. Building a chain is not this
    /// crate’s job: the issuer is already trusted by construction since
    /// it was itself validated on the way down from the trust anchor.
    pub fn verify_signed_by(
        &self,
        issuer: &X509
    ) -> Result<(), ValidationError> {
        verify_signature(issuer.public_key(), &self.tbs, &self.signature)
    }
}

/// Verifies an RSA PKCS#1 SHA-256 signature.
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature_value: &[u8],
) -> Result<(), ValidationError> {
    signature::UnparsedPublicKey::new(
        &signature::RSA_PKCS1_2048_8192_SHA256,
        public_key
    ).verify(message, signature_value).map_err(|_| ValidationError)
}


//------------ Time ----------------------------------------------------------

/// A UTCTime or GeneralizedTime value.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Time(DateTime<Utc>);

impl Time {
    /// Parses either time form.
    ///
    /// RFC 5280 requires the formats YYMMDDHHMMSSZ and YYYYMMDDHHMMSSZ
    /// respectively; anything else is rejected.
    pub fn parse(reader: &mut Reader) -> Result<Self, Error> {
        let (tag, content) = der::parse_value(reader)?;
        if tag == Tag::UTC_TIME {
            Self::parse_utc_content(content)
        }
        else if tag == Tag::GENERALIZED_TIME {
            Self::parse_generalized_content(content)
        }
        else {
            Err(Error::Malformed)
        }
    }

    /// Parses a time that must be in the GeneralizedTime form.
    pub fn parse_generalized(reader: &mut Reader) -> Result<Self, Error> {
        let content = der::parse_expected(reader, Tag::GENERALIZED_TIME)?;
        Self::parse_generalized_content(content)
    }

    fn parse_utc_content(content: Input) -> Result<Self, Error> {
        content.read_all(Error::Malformed, |reader| {
            let year = read_two_digits(reader)? as i32;
            let year = if year >= 50 { year + 1900 } else { year + 2000 };
            let res = Self::from_parts(
                year,
                read_two_digits(reader)?,
                read_two_digits(reader)?,
                read_two_digits(reader)?,
                read_two_digits(reader)?,
                read_two_digits(reader)?,
            );
            if reader.read_byte()? != b'Z' {
                return Err(Error::Malformed)
            }
            res
        })
    }

    fn parse_generalized_content(content: Input) -> Result<Self, Error> {
        content.read_all(Error::Malformed, |reader| {
            let year = read_two_digits(reader)? as i32 * 100
                     + read_two_digits(reader)? as i32;
            let res = Self::from_parts(
                year,
                read_two_digits(reader)?,
                read_two_digits(reader)?,
                read_two_digits(reader)?,
                read_two_digits(reader)?,
                read_two_digits(reader)?,
            );
            if reader.read_byte()? != b'Z' {
                return Err(Error::Malformed)
            }
            res
        })
    }

    fn from_parts(
        year: i32, month: u32, day: u32,
        hour: u32, minute: u32, second: u32,
    ) -> Result<Self, Error> {
        match Utc.with_ymd_and_hms(year, month, day, hour, minute, second) {
            LocalResult::Single(dt) => Ok(Time(dt)),
            _ => Err(Error::Malformed)
        }
    }

    pub fn to_date_time(self) -> DateTime<Utc> {
        self.0
    }

    pub fn timestamp(self) -> i64 {
        self.0.timestamp()
    }

    pub fn from_timestamp(secs: i64) -> Option<Self> {
        match Utc.timestamp_opt(secs, 0) {
            LocalResult::Single(dt) => Some(Time(dt)),
            _ => None
        }
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(dt: DateTime<Utc>) -> Self {
        Time(dt)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.format("%Y-%m-%d %H:%M:%S").fmt(f)
    }
}

fn read_two_digits(reader: &mut Reader) -> Result<u32, Error> {
    let mut res = 0;
    for _ in 0..2 {
        let ch = reader.read_byte()?;
        if !ch.is_ascii_digit() {
            return Err(Error::Malformed)
        }
        res = res * 10 + u32::from(ch - b'0');
    }
    Ok(res)
}


//------------ Validity ------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Validity {
    not_before: Time,
    not_after: Time,
}

impl Validity {
    pub fn parse(reader: &mut Reader) -> Result<Self, Error> {
        der::parse_nested(reader, Tag::SEQUENCE, |reader| {
            let not_before = Time::parse(reader)?;
            let not_after = Time::parse(reader)?;
            if not_before > not_after {
                return Err(Error::Malformed)
            }
            Ok(Validity { not_before, not_after })
        })
    }

    pub fn not_before(&self) -> Time {
        self.not_before
    }

    pub fn not_after(&self) -> Time {
        self.not_after
    }
}


//------------ SignatureAlgorithm --------------------------------------------

/// The signature algorithm of certificates and signed objects.
///
/// The profile allows only RSA PKCS#1 with SHA-256. RFC 6488 permits the
/// signature algorithm of a signer info to be given as plain rsaEncryption,
/// so both identifiers are accepted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    Sha256WithRsaEncryption,
}

impl SignatureAlgorithm {
    pub fn parse(reader: &mut Reader) -> Result<Self, Error> {
        der::parse_nested(reader, Tag::SEQUENCE, |reader| {
            let oid = Oid::take_from(reader)?;
            if oid != oid::RSA_ENCRYPTION
                && oid != oid::SHA256_WITH_RSA_ENCRYPTION
            {
                return Err(Error::Malformed)
            }
            der::skip_opt_null(reader)?;
            Ok(SignatureAlgorithm::Sha256WithRsaEncryption)
        })
    }
}


//------------ PublicKeyAlgorithm --------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PublicKeyAlgorithm {
    RsaEncryption,
}

impl PublicKeyAlgorithm {
    pub fn parse(reader: &mut Reader) -> Result<Self, Error> {
        der::parse_nested(reader, Tag::SEQUENCE, |reader| {
            oid::RSA_ENCRYPTION.skip_if(reader)?;
            der::skip_opt_null(reader)?;
            Ok(PublicKeyAlgorithm::RsaEncryption)
        })
    }
}


//------------ SubjectPublicKeyInfo ------------------------------------------

/// A SubjectPublicKeyInfo value.
///
/// Keeps both the complete encoding, which is what a trust anchor locator
/// pins, and the content of the key bit string, which is what the
/// signature verifier needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubjectPublicKeyInfo {
    raw: Bytes,
    public_key: Bytes,
}

impl SubjectPublicKeyInfo {
    pub fn parse(reader: &mut Reader) -> Result<Self, Error> {
        let (inner, whole) = der::parse_spanned(reader, Tag::SEQUENCE)?;
        inner.read_all(Error::Malformed, |reader| {
            PublicKeyAlgorithm::parse(reader)?;
            let key = BitString::parse_filled(reader)?;
            Ok(SubjectPublicKeyInfo {
                raw: Bytes::copy_from_slice(whole.as_slice_less_safe()),
                public_key: Bytes::copy_from_slice(key.as_slice_less_safe()),
            })
        })
    }

    /// Decodes a standalone SubjectPublicKeyInfo value.
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        Input::from(data).read_all(Error::Malformed, Self::parse)
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn public_key(&self) -> &Bytes {
        &self.public_key
    }
}


//------------ Helpers -------------------------------------------------------

/// Parses a certificate serial number, checking shape only.
///
/// RFC 5280 demands support for serials of up to twenty octets; no use
/// for the value exists here, so it is merely validated.
pub fn parse_serial_number(reader: &mut Reader) -> Result<(), Error> {
    let content = der::parse_unsigned(reader)?;
    if content.len() > 20 {
        return Err(Error::Malformed)
    }
    Ok(())
}

/// Skips over a Name value.
pub fn skip_name(reader: &mut Reader) -> Result<(), Error> {
    der::parse_expected(reader, Tag::SEQUENCE).map(|_| ())
}

/// Stores a value produced by `op` in `opt` which must still be empty.
///
/// Extensions and signed attributes may appear at most once each; this is
/// the shared guard for that rule.
pub fn update_once<F, T>(opt: &mut Option<T>, op: F) -> Result<(), Error>
where F: FnOnce() -> Result<T, Error> {
    if opt.is_some() {
        Err(Error::Malformed)
    }
    else {
        *opt = Some(op()?);
        Ok(())
    }
}


//------------ ValidationError -----------------------------------------------

/// A cryptographic check has failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidationError;

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("validation failed")
    }
}


//------------ OIDs ----------------------------------------------------------

pub mod oid {
    use crate::der::Oid;

    pub const RSA_ENCRYPTION: Oid<&[u8]>
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 1]);
    pub const SHA256_WITH_RSA_ENCRYPTION: Oid<&[u8]>
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 11]);
}


//============ Testing =======================================================
