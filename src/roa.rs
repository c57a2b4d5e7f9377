//! Route Origin Authorizations.
//!
//! A ROA is a CMS signed object binding a set of IP prefixes to the AS
//! number authorized to originate routes for them; the payload is defined
//! in RFC 6482. Beyond decoding, the fundamental safety property is
//! enforced here: a ROA may only speak for addresses its own EE
//! certificate was delegated.

use std::{fmt, io};
use std::path::Path;
use bytes::Bytes;
use log::error;
use untrusted::{Input, Reader};
use crate::binio::{Compose, Parse, ParseError};
use crate::cert::Cert;
use crate::cms;
use crate::der::{self, BitString, Error, Oid, Tag};
use crate::error::Failed;
use crate::ip::{AddressFamily, IpAddr};
use crate::x509::{ValidationError, X509};

/// The eContentType of a ROA.
pub const CONTENT_TYPE: Oid<&[u8]>
    = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 24]);


//------------ parse ---------------------------------------------------------

/// Parses and validates a ROA file.
///
/// On top of the CMS checks, every prefix in the ROA must be covered by
/// an explicit IP delegation on the embedded EE certificate.
pub fn parse(
    parent: Option<&X509>,
    path: &Path,
    expected_digest: Option<&[u8]>,
) -> Result<Roa, Failed> {
    let object = cms::parse_validate(
        parent, path, &CONTENT_TYPE, expected_digest
    )?;
    let roa = Roa::decode_content(object.content()).map_err(|err| {
        error!("{}: {}", path.display(), err);
        Failed
    })?;
    if roa.check_coverage(object.cert()).is_err() {
        error!(
            "{}: prefixes not covered by EE certificate resources",
            path.display()
        );
        return Err(Failed)
    }
    Ok(roa)
}


//------------ Roa -----------------------------------------------------------

/// The content of a route origin authorization.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Roa {
    as_id: u32,
    prefixes: Vec<RoaPrefix>,
}

impl Roa {
    /// Decodes the eContent of a ROA.
    pub fn decode_content(content: &Bytes) -> Result<Self, Error> {
        Input::from(content.as_ref()).read_all(
            Error::Malformed, Self::parse_econtent
        )
    }

    /// Parses the ROA eContent, RFC 6482 section 3.
    ///
    /// ```text
    /// RouteOriginAttestation ::= SEQUENCE {
    ///     version [0] INTEGER DEFAULT 0,
    ///     asID  ASID,
    ///     ipAddrBlocks SEQUENCE (SIZE(1..MAX)) OF ROAIPAddressFamily }
    ///
    /// ROAIPAddressFamily ::= SEQUENCE {
    ///     addressFamily OCTET STRING (SIZE (2..3)),
    ///     addresses SEQUENCE (SIZE (1..MAX)) OF ROAIPAddress }
    ///
    /// ROAIPAddress ::= SEQUENCE {
    ///     address IPAddress,
    ///     maxLength INTEGER OPTIONAL }
    /// ```
    fn parse_econtent(reader: &mut Reader) -> Result<Self, Error> {
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
            let as_id = der::parse_u32(reader)?;
            let prefixes = der::parse_nested(
                reader, Tag::SEQUENCE, Self::parse_addr_blocks
            )?;
            Ok(Roa { as_id, prefixes })
        })
    }

    fn parse_addr_blocks(
        reader: &mut Reader
    ) -> Result<Vec<RoaPrefix>, Error> {
        let mut res = Vec::new();
        let mut v4 = false;
        let mut v6 = false;
        while !reader.at_end() {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                let family = AddressFamily::take_from(reader)?;
                let seen = match family {
                    AddressFamily::Ipv4 => &mut v4,
                    AddressFamily::Ipv6 => &mut v6,
                };
                if *seen {
                    return Err(Error::Malformed)
                }
                *seen = true;
                der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                    let mut any = false;
                    while !reader.at_end() {
                        res.push(RoaPrefix::take_from(reader, family)?);
                        any = true;
                    }
                    if !any {
                        return Err(Error::Malformed)
                    }
                    Ok(())
                })
            })?;
        }
        if res.is_empty() {
            return Err(Error::Malformed)
        }
        Ok(res)
    }
}

impl Roa {
    /// The AS number authorized to originate the prefixes.
    pub fn as_id(&self) -> u32 {
        self.as_id
    }

    /// The authorized prefixes.
    pub fn prefixes(&self) -> &[RoaPrefix] {
        &self.prefixes
    }

    /// Checks that the EE certificate covers every prefix.
    ///
    /// This is the core safety property of RFC 6482: a ROA must not
    /// authorize addresses its issuer was never delegated. The EE
    /// certificate has to carry the addresses explicitly; an inherit
    /// marker cannot prove coverage and is rejected.
    pub fn check_coverage(&self, cert: &Cert) -> Result<(), ValidationError> {
        for prefix in &self.prefixes {
            let family = prefix.addr().family();
            if cert.has_inherited_ips(family) {
                return Err(ValidationError)
            }
            let (min, max) = prefix.addr().range();
            if !cert.covers_addrs(family, min, max) {
                return Err(ValidationError)
            }
        }
        Ok(())
    }
}


//------------ RoaPrefix -----------------------------------------------------

/// One authorized prefix with its maximum announced length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RoaPrefix {
    addr: IpAddr,
    max_length: u8,
}

impl RoaPrefix {
    /// Creates a prefix entry, checking the maxLength bounds.
    ///
    /// The maximum length must not be shorter than the prefix itself and
    /// must fit the address family.
    pub fn new(addr: IpAddr, max_length: u8) -> Result<Self, Error> {
        if max_length < addr.prefix_len()
            || usize::from(max_length) > addr.family().width() * 8
        {
            return Err(Error::Malformed)
        }
        Ok(RoaPrefix { addr, max_length })
    }

    fn take_from(
        reader: &mut Reader,
        family: AddressFamily
    ) -> Result<Self, Error> {
        der::parse_nested(reader, Tag::SEQUENCE, |reader| {
            let addr = IpAddr::from_bits(family, BitString::parse(reader)?)?;
            let max_length = if Tag::INTEGER.peek(reader) {
                let value = der::parse_u32(reader)?;
                if value > 128 {
                    return Err(Error::Malformed)
                }
                value as u8
            }
            else {
                addr.prefix_len()
            };
            RoaPrefix::new(addr, max_length)
        })
    }

    pub fn addr(&self) -> &IpAddr {
        &self.addr
    }

    pub fn max_length(&self) -> u8 {
        self.max_length
    }
}

impl fmt::Display for RoaPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} maxlen {}", self.addr, self.max_length)
    }
}


//------------ Serialization -------------------------------------------------

impl<W: io::Write> Compose<W> for Roa {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        self.as_id.compose(target)?;
        (self.prefixes.len() as u64).compose(target)?;
        for prefix in &self.prefixes {
            prefix.addr.compose(target)?;
            prefix.max_length.compose(target)?;
        }
        Ok(())
    }
}

impl<R: io::Read> Parse<R> for Roa {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let as_id = u32::parse(source)?;
        let mut prefixes = Vec::new();
        for _ in 0..u64::parse(source)? {
            let addr = IpAddr::parse(source)?;
            let max_length = u8::parse(source)?;
            prefixes.push(RoaPrefix::new(addr, max_length).map_err(|_| {
                ParseError::format("illegal max length")
            })?);
        }
        Ok(Roa { as_id, prefixes })
    }
}


//============ Testing =======================================================
