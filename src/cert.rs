//! RPKI certificates.
//!
//! Certificates are defined by the profile in RFC 6487 on top of RFC 5280,
//! with the IP address and AS number delegations of RFC 3779 attached as
//! extensions. Parsing produces two values: the semantic [`Cert`] with the
//! repository pointers and the delegated resources, and the raw
//! [`X509`][crate::x509::X509] handle the caller needs to verify objects
//! signed under this certificate.

use std::{fmt, io};
use std::path::Path;
use bytes::Bytes;
use log::{debug, error};
use untrusted::{Input, Reader};
use crate::binio::{Compose, Parse, ParseError};
use crate::der::{self, BitString, Error, Oid, Tag};
use crate::error::Failed;
use crate::ip::{AddressFamily, IpAddr, IpAddrRange};
use crate::utils;
use crate::x509::{
    self, update_once, SignatureAlgorithm, SubjectPublicKeyInfo, Validity,
    X509,
};


//------------ parse ---------------------------------------------------------

/// Parses and validates a certificate file.
///
/// If `expected_digest` is given, the file’s SHA-256 digest must match it.
/// On success, returns the semantic certificate value and the raw handle.
/// All diagnostics are logged.
pub fn parse(
    path: &Path,
    expected_digest: Option<&[u8]>,
) -> Result<(Cert, X509), Failed> {
    let data = utils::read_file(path, expected_digest).map_err(|err| {
        error!("{}: {}", path.display(), err);
        Failed
    })?;
    match Cert::decode(data) {
        Ok(res) => {
            debug!("{}: parsed certificate", path.display());
            Ok(res)
        }
        Err(err) => {
            error!("{}: {}", path.display(), err);
            Err(Failed)
        }
    }
}


//------------ Cert ----------------------------------------------------------

/// The semantic content of an RPKI certificate.
///
/// Only what downstream processing needs survives parsing: the Subject
/// Information Access pointers and the delegated resources. The value is
/// self-contained; the raw certificate lives in the separately returned
/// handle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cert {
    ca_repository: Option<String>,
    rpki_manifest: Option<String>,
    ips: Vec<CertIp>,
    as_resources: Vec<CertAs>,
}

impl Cert {
    /// Decodes a certificate from its DER encoding.
    pub fn decode(data: Bytes) -> Result<(Cert, X509), Error> {
        Input::from(data.as_ref()).read_all(Error::Malformed, Self::take_from)
    }

    /// Parses a certificate value off a reader.
    pub(crate) fn take_from(
        reader: &mut Reader
    ) -> Result<(Cert, X509), Error> {
        let (inner, whole) = der::parse_spanned(reader, Tag::SEQUENCE)?;
        inner.read_all(Error::Malformed, |reader| {
            Self::parse_signed_content(reader, whole)
        })
    }

    fn parse_signed_content(
        reader: &mut Reader,
        whole: Input,
    ) -> Result<(Cert, X509), Error> {
        let (tbs_inner, tbs_raw) = der::parse_spanned(reader, Tag::SEQUENCE)?;
        SignatureAlgorithm::parse(reader)?;
        let signature = BitString::parse_filled(reader)?;

        let (spki, extensions) = tbs_inner.read_all(
            Error::Malformed, Self::parse_tbs
        )?;

        let cert = Cert {
            ca_repository: extensions.ca_repository,
            rpki_manifest: extensions.rpki_manifest,
            ips: extensions.ips.unwrap_or_default(),
            as_resources: extensions.as_resources.unwrap_or_default(),
        };
        let handle = X509::new(
            Bytes::copy_from_slice(whole.as_slice_less_safe()),
            Bytes::copy_from_slice(tbs_raw.as_slice_less_safe()),
            Bytes::copy_from_slice(signature.as_slice_less_safe()),
            spki.raw().clone(),
            spki.public_key().clone(),
            extensions.subject_key_id,
        );
        Ok((cert, handle))
    }

    /// Parses the content of the TBSCertificate sequence.
    fn parse_tbs(
        reader: &mut Reader
    ) -> Result<(SubjectPublicKeyInfo, Extensions), Error> {
        // version [0] EXPLICIT Version.
        //  -- we need extensions so apparently, we want v3 which,
        //     confusingly, is 2.
        der::parse_nested(reader, Tag::CTX_CON_0, |reader| {
            der::skip_u8_if(reader, 2)
        })?;
        x509::parse_serial_number(reader)?;
        SignatureAlgorithm::parse(reader)?;
        x509::skip_name(reader)?;
        Validity::parse(reader)?;
        x509::skip_name(reader)?;
        let spki = SubjectPublicKeyInfo::parse(reader)?;
        // The unique identifier fields must not appear in RPKI
        // certificates.
        let extensions = der::parse_nested(
            reader, Tag::CTX_CON_3, Extensions::parse
        )?;
        Ok((spki, extensions))
    }
}

impl Cert {
    /// The URI of the CA repository from the SIA extension, if present.
    pub fn ca_repository(&self) -> Option<&str> {
        self.ca_repository.as_deref()
    }

    /// The URI of the manifest from the SIA extension, if present.
    pub fn rpki_manifest(&self) -> Option<&str> {
        self.rpki_manifest.as_deref()
    }

    /// The delegated IP resources.
    pub fn ips(&self) -> &[CertIp] {
        &self.ips
    }

    /// The delegated AS resources.
    pub fn as_resources(&self) -> &[CertAs] {
        &self.as_resources
    }

    /// Returns whether the given family delegates via the inherit marker.
    pub fn has_inherited_ips(&self, family: AddressFamily) -> bool {
        self.ips.iter().any(|ip| {
            ip.family() == family
                && matches!(ip.choice(), CertIpChoice::Inherit)
        })
    }

    /// Returns whether the address range is covered by an explicit
    /// delegation of the given family on this certificate.
    pub fn covers_addrs(
        &self,
        family: AddressFamily,
        min: u128,
        max: u128,
    ) -> bool {
        self.ips.iter().filter(|ip| ip.family() == family).any(|ip| {
            match ip.choice() {
                CertIpChoice::Inherit => false,
                CertIpChoice::Addr(addr) => {
                    addr.min() <= min && addr.max() >= max
                }
                CertIpChoice::Range(range) => {
                    let (rmin, rmax) = range.range();
                    rmin <= min && rmax >= max
                }
            }
        })
    }

    pub(crate) fn new(
        ca_repository: Option<String>,
        rpki_manifest: Option<String>,
        ips: Vec<CertIp>,
        as_resources: Vec<CertAs>,
    ) -> Self {
        Cert { ca_repository, rpki_manifest, ips, as_resources }
    }
}


//------------ CertIp --------------------------------------------------------

/// One entry of the delegated IP resources of a certificate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CertIp {
    family: AddressFamily,
    choice: CertIpChoice,
}

/// The three shapes an IP delegation entry can take.
///
/// The variants share no behavior; every consumer switches on them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CertIpChoice {
    /// The resources of this family are those of the issuer.
    Inherit,

    /// A single prefix.
    Addr(IpAddr),

    /// A range between two prefixes.
    Range(IpAddrRange),
}

impl CertIp {
    pub fn new(family: AddressFamily, choice: CertIpChoice) -> Self {
        CertIp { family, choice }
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn choice(&self) -> &CertIpChoice {
        &self.choice
    }
}

impl fmt::Display for CertIp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.choice {
            CertIpChoice::Inherit => f.write_str("inherit"),
            CertIpChoice::Addr(ref addr) => addr.fmt(f),
            CertIpChoice::Range(ref range) => range.fmt(f),
        }
    }
}


//------------ CertAs --------------------------------------------------------

/// One entry of the delegated AS resources of a certificate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CertAs {
    /// The resources are those of the issuer.
    Inherit,

    /// A single AS number.
    Id(u32),

    /// An inclusive range of AS numbers.
    Range { min: u32, max: u32 },
}

impl fmt::Display for CertAs {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CertAs::Inherit => f.write_str("inherit"),
            CertAs::Id(id) => write!(f, "{}", id),
            CertAs::Range { min, max } => write!(f, "{}--{}", min, max),
        }
    }
}


//------------ Extensions ----------------------------------------------------

/// The recognized certificate extensions.
///
/// Known extensions are decoded, unknown non-critical ones skipped, and
/// unknown critical ones rejected as RFC 6487 demands. Each extension may
/// appear at most once.
struct Extensions {
    subject_key_id: Bytes,
    ca_repository: Option<String>,
    rpki_manifest: Option<String>,
    ips: Option<Vec<CertIp>>,
    as_resources: Option<Vec<CertAs>>,
}

impl Extensions {
    fn parse(reader: &mut Reader) -> Result<Self, Error> {
        der::parse_nested(reader, Tag::SEQUENCE, |reader| {
            let mut basic_ca = None;
            let mut subject_key_id = None;
            let mut authority_key_id = None;
            let mut key_usage_ca = None;
            let mut extended_key_usage = None;
            let mut crl_distribution = None;
            let mut authority_info_access = None;
            let mut sia = None;
            let mut certificate_policies = None;
            let mut ips = None;
            let mut as_resources = None;
            while !reader.at_end() {
                der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                    let id = Oid::take_from(reader)?;
                    let critical
                        = der::parse_opt_bool(reader)?.unwrap_or(false);
                    let value = der::parse_octet_string(reader)?;
                    value.read_all(Error::Malformed, |content| {
                        if id == oid::CE_BASIC_CONSTRAINTS {
                            Self::parse_basic_ca(content, &mut basic_ca)
                        }
                        else if id == oid::CE_SUBJECT_KEY_IDENTIFIER {
                            Self::parse_subject_key_identifier(
                                content, &mut subject_key_id
                            )
                        }
                        else if id == oid::CE_AUTHORITY_KEY_IDENTIFIER {
                            Self::parse_authority_key_identifier(
                                content, &mut authority_key_id
                            )
                        }
                        else if id == oid::CE_KEY_USAGE {
                            Self::parse_key_usage(content, &mut key_usage_ca)
                        }
                        else if id == oid::CE_EXTENDED_KEY_USAGE {
                            Self::parse_extended_key_usage(
                                content, &mut extended_key_usage
                            )
                        }
                        else if id == oid::CE_CRL_DISTRIBUTION_POINTS {
                            Self::parse_crl_distribution_points(
                                content, &mut crl_distribution
                            )
                        }
                        else if id == oid::PE_AUTHORITY_INFO_ACCESS {
                            Self::parse_authority_info_access(
                                content, &mut authority_info_access
                            )
                        }
                        else if id == oid::PE_SUBJECT_INFO_ACCESS {
                            Self::parse_subject_info_access(content, &mut sia)
                        }
                        else if id == oid::CE_CERTIFICATE_POLICIES {
                            Self::parse_certificate_policies(
                                content, &mut certificate_policies
                            )
                        }
                        else if id == oid::PE_IP_ADDR_BLOCK {
                            Self::parse_ip_resources(content, &mut ips)
                        }
                        else if id == oid::PE_AUTONOMOUS_SYS_IDS {
                            Self::parse_as_resources(content, &mut as_resources)
                        }
                        else if critical {
                            Err(Error::Malformed)
                        }
                        else {
                            // RFC 5280 says we can ignore non-critical
                            // extensions we don’t know of. RFC 6487
                            // agrees. So let’s do that.
                            content.read_bytes_to_end();
                            Ok(())
                        }
                    })
                })?;
            }
            if ips.is_none() && as_resources.is_none() {
                return Err(Error::Malformed)
            }
            if key_usage_ca.is_none() || certificate_policies.is_none() {
                return Err(Error::Malformed)
            }
            let sia: Sia = sia.ok_or(Error::Malformed)?;
            Ok(Extensions {
                subject_key_id: subject_key_id.ok_or(Error::Malformed)?,
                ca_repository: sia.ca_repository,
                rpki_manifest: sia.rpki_manifest,
                ips,
                as_resources,
            })
        })
    }

    /// Parses the Basic Constraints extension.
    ///
    /// ```text
    ///   BasicConstraints ::= SEQUENCE {
    ///        cA                      BOOLEAN DEFAULT FALSE,
    ///        pathLenConstraint       INTEGER (0..MAX) OPTIONAL }
    /// ```
    ///
    /// The pathLenConstraint field must not be present.
    fn parse_basic_ca(
        reader: &mut Reader,
        basic_ca: &mut Option<bool>,
    ) -> Result<(), Error> {
        update_once(basic_ca, || {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                Ok(der::parse_opt_bool(reader)?.unwrap_or(false))
            })
        })
    }

    /// Parses the Subject Key Identifier extension.
    ///
    /// The value is the 160 bit SHA-1 hash of the subject public key, so
    /// it must be exactly twenty octets long.
    ///
    /// ```text
    /// SubjectKeyIdentifier ::= KeyIdentifier
    /// KeyIdentifier        ::= OCTET STRING
    /// ```
    fn parse_subject_key_identifier(
        reader: &mut Reader,
        subject_key_id: &mut Option<Bytes>,
    ) -> Result<(), Error> {
        update_once(subject_key_id, || {
            let id = der::parse_octet_string(reader)?;
            if id.len() != 20 {
                return Err(Error::Malformed)
            }
            Ok(Bytes::copy_from_slice(id.as_slice_less_safe()))
        })
    }

    /// Parses the Authority Key Identifier extension.
    ///
    /// ```text
    /// AuthorityKeyIdentifier ::= SEQUENCE {
    ///   keyIdentifier             [0] KeyIdentifier           OPTIONAL,
    ///   authorityCertIssuer       [1] GeneralNames            OPTIONAL,
    ///   authorityCertSerialNumber [2] CertificateSerialNumber OPTIONAL  }
    /// ```
    ///
    /// Only keyIdentifier must be present.
    fn parse_authority_key_identifier(
        reader: &mut Reader,
        authority_key_id: &mut Option<()>,
    ) -> Result<(), Error> {
        update_once(authority_key_id, || {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                let id = der::parse_expected(reader, Tag::CTX_0)?;
                if id.len() != 20 {
                    return Err(Error::Malformed)
                }
                Ok(())
            })
        })
    }

    /// Parses the Key Usage extension.
    ///
    /// In CA certificates, keyCertSign and cRLSign must be set, in EE
    /// certificates digitalSignature must be set. The flag therefore
    /// simply describes whether the certificate is for a CA.
    fn parse_key_usage(
        reader: &mut Reader,
        key_usage_ca: &mut Option<bool>,
    ) -> Result<(), Error> {
        update_once(key_usage_ca, || {
            let bits = BitString::parse(reader)?;
            if bits.bit(5) && bits.bit(6) {
                Ok(true)
            }
            else if bits.bit(0) {
                Ok(false)
            }
            else {
                Err(Error::Malformed)
            }
        })
    }

    /// Parses the Extended Key Usage extension.
    ///
    /// ```text
    /// ExtKeyUsageSyntax ::= SEQUENCE SIZE (1..MAX) OF KeyPurposeId
    /// KeyPurposeId ::= OBJECT IDENTIFIER
    /// ```
    fn parse_extended_key_usage(
        reader: &mut Reader,
        extended_key_usage: &mut Option<()>,
    ) -> Result<(), Error> {
        update_once(extended_key_usage, || {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                Oid::take_from(reader)?;
                while !reader.at_end() {
                    Oid::take_from(reader)?;
                }
                Ok(())
            })
        })
    }

    /// Parses the CRL Distribution Points extension.
    ///
    /// It must contain exactly one DistributionPoint whose only field is
    /// distributionPoint with the fullName choice carrying URIs.
    fn parse_crl_distribution_points(
        reader: &mut Reader,
        crl_distribution: &mut Option<()>,
    ) -> Result<(), Error> {
        update_once(crl_distribution, || {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                    der::parse_nested(reader, Tag::CTX_CON_0, |reader| {
                        der::parse_nested(reader, Tag::CTX_CON_0, |reader| {
                            parse_uri(reader)?;
                            while !reader.at_end() {
                                parse_uri(reader)?;
                            }
                            Ok(())
                        })
                    })
                })
            })
        })
    }

    /// Parses the Authority Information Access extension.
    ///
    /// Must contain exactly one entry with accessMethod id-ad-caIssuers
    /// and a URI as the accessLocation.
    fn parse_authority_info_access(
        reader: &mut Reader,
        authority_info_access: &mut Option<()>,
    ) -> Result<(), Error> {
        update_once(authority_info_access, || {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                    oid::AD_CA_ISSUERS.skip_if(reader)?;
                    parse_uri(reader)?;
                    Ok(())
                })
            })
        })
    }

    /// Parses the Subject Information Access extension.
    ///
    /// ```text
    /// SubjectInfoAccessSyntax  ::=
    ///         SEQUENCE SIZE (1..MAX) OF AccessDescription
    ///
    /// AccessDescription  ::=  SEQUENCE {
    ///         accessMethod          OBJECT IDENTIFIER,
    ///         accessLocation        GeneralName  }
    /// ```
    ///
    /// The id-ad-caRepository and id-ad-rpkiManifest methods are each
    /// recorded at most once; a second occurrence is an error. Other
    /// methods, such as id-ad-signedObject on EE certificates, are
    /// skipped.
    fn parse_subject_info_access(
        reader: &mut Reader,
        sia: &mut Option<Sia>,
    ) -> Result<(), Error> {
        update_once(sia, || {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                let mut res = Sia {
                    ca_repository: None,
                    rpki_manifest: None,
                };
                let mut seen = false;
                while !reader.at_end() {
                    der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                        seen = true;
                        let method = Oid::take_from(reader)?;
                        if method == oid::AD_CA_REPOSITORY {
                            update_once(&mut res.ca_repository, || {
                                parse_uri(reader)
                            })
                        }
                        else if method == oid::AD_RPKI_MANIFEST {
                            update_once(&mut res.rpki_manifest, || {
                                parse_uri(reader)
                            })
                        }
                        else {
                            der::skip_value(reader)
                        }
                    })?;
                }
                if !seen {
                    return Err(Error::Malformed)
                }
                Ok(res)
            })
        })
    }

    /// Parses the Certificate Policies extension.
    ///
    /// Exactly one policy must be present. Its content is not otherwise
    /// interpreted.
    fn parse_certificate_policies(
        reader: &mut Reader,
        certificate_policies: &mut Option<()>,
    ) -> Result<(), Error> {
        update_once(certificate_policies, || {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                    Oid::take_from(reader)?;
                    while !reader.at_end() {
                        der::skip_value(reader)?;
                    }
                    Ok(())
                })
            })
        })
    }

    /// Parses the IP Resources extension, RFC 3779.
    ///
    /// ```text
    /// IPAddrBlocks        ::= SEQUENCE OF IPAddressFamily
    /// IPAddressFamily     ::= SEQUENCE {
    ///     addressFamily      OCTET STRING (SIZE (2..3)),
    ///     ipAddressChoice    IPAddressChoice }
    /// IPAddressChoice     ::= CHOICE {
    ///     inherit            NULL,
    ///     addressesOrRanges  SEQUENCE OF IPAddressOrRange }
    /// IPAddressOrRange    ::= CHOICE {
    ///     addressPrefix      IPAddress,
    ///     addressRange       IPAddressRange }
    /// ```
    ///
    /// Each family may appear at most once and the choice structure keeps
    /// the inherit marker and explicit entries mutually exclusive within
    /// a family.
    fn parse_ip_resources(
        reader: &mut Reader,
        ips: &mut Option<Vec<CertIp>>,
    ) -> Result<(), Error> {
        update_once(ips, || {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
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
                        Self::parse_ip_choice(reader, family, &mut res)
                    })?;
                }
                if res.is_empty() {
                    return Err(Error::Malformed)
                }
                Ok(res)
            })
        })
    }

    fn parse_ip_choice(
        reader: &mut Reader,
        family: AddressFamily,
        res: &mut Vec<CertIp>,
    ) -> Result<(), Error> {
        let (tag, content) = der::parse_value(reader)?;
        if tag == Tag::NULL {
            if !content.is_empty() {
                return Err(Error::Malformed)
            }
            res.push(CertIp::new(family, CertIpChoice::Inherit));
            return Ok(())
        }
        if tag != Tag::SEQUENCE {
            return Err(Error::Malformed)
        }
        content.read_all(Error::Malformed, |reader| {
            let mut any = false;
            while !reader.at_end() {
                let (tag, content) = der::parse_value(reader)?;
                let choice = if tag == Tag::BIT_STRING {
                    CertIpChoice::Addr(IpAddr::from_bits(
                        family, BitString::parse_content(content)?
                    )?)
                }
                else if tag == Tag::SEQUENCE {
                    let range = content.read_all(
                        Error::Malformed,
                        |reader| {
                            let min = IpAddr::from_bits(
                                family, BitString::parse(reader)?
                            )?;
                            let max = IpAddr::from_bits(
                                family, BitString::parse(reader)?
                            )?;
                            IpAddrRange::new(min, max)
                        }
                    )?;
                    CertIpChoice::Range(range)
                }
                else {
                    return Err(Error::Malformed)
                };
                res.push(CertIp::new(family, choice));
                any = true;
            }
            if !any {
                return Err(Error::Malformed)
            }
            Ok(())
        })
    }

    /// Parses the AS Resources extension, RFC 3779.
    ///
    /// ```text
    /// ASIdentifiers       ::= SEQUENCE {
    ///     asnum              [0] EXPLICIT ASIdentifierChoice OPTIONAL,
    ///     rdi                [1] EXPLICIT ASIdentifierChoice OPTIONAL }
    /// ASIdentifierChoice  ::= CHOICE {
    ///     inherit            NULL,
    ///     asIdsOrRanges      SEQUENCE OF ASIdOrRange }
    /// ASIdOrRange         ::= CHOICE {
    ///     id                 ASId,
    ///     range              ASRange }
    /// ```
    ///
    /// RFC 6487 requires asnum to be present and prohibits rdi.
    fn parse_as_resources(
        reader: &mut Reader,
        as_resources: &mut Option<Vec<CertAs>>,
    ) -> Result<(), Error> {
        update_once(as_resources, || {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                der::parse_nested(reader, Tag::CTX_CON_0, |reader| {
                    let (tag, content) = der::parse_value(reader)?;
                    if tag == Tag::NULL {
                        if !content.is_empty() {
                            return Err(Error::Malformed)
                        }
                        return Ok(vec![CertAs::Inherit])
                    }
                    if tag != Tag::SEQUENCE {
                        return Err(Error::Malformed)
                    }
                    content.read_all(Error::Malformed, |reader| {
                        let mut res = Vec::new();
                        while !reader.at_end() {
                            res.push(Self::parse_as_block(reader)?);
                        }
                        if res.is_empty() {
                            return Err(Error::Malformed)
                        }
                        Ok(res)
                    })
                })
            })
        })
    }

    fn parse_as_block(reader: &mut Reader) -> Result<CertAs, Error> {
        if Tag::INTEGER.peek(reader) {
            der::parse_u32(reader).map(CertAs::Id)
        }
        else {
            der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                let min = der::parse_u32(reader)?;
                let max = der::parse_u32(reader)?;
                if min > max {
                    return Err(Error::Malformed)
                }
                Ok(CertAs::Range { min, max })
            })
        }
    }
}


//------------ Serialization -------------------------------------------------

impl<W: io::Write> Compose<W> for Cert {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        self.ca_repository.compose(target)?;
        self.rpki_manifest.compose(target)?;
        (self.ips.len() as u64).compose(target)?;
        for ip in &self.ips {
            ip.compose(target)?;
        }
        (self.as_resources.len() as u64).compose(target)?;
        for id in &self.as_resources {
            id.compose(target)?;
        }
        Ok(())
    }
}

impl<R: io::Read> Parse<R> for Cert {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let ca_repository = Option::<String>::parse(source)?;
        let rpki_manifest = Option::<String>::parse(source)?;
        let mut ips = Vec::new();
        for _ in 0..u64::parse(source)? {
            ips.push(CertIp::parse(source)?);
        }
        let mut as_resources = Vec::new();
        for _ in 0..u64::parse(source)? {
            as_resources.push(CertAs::parse(source)?);
        }
        Ok(Cert::new(ca_repository, rpki_manifest, ips, as_resources))
    }
}

impl<W: io::Write> Compose<W> for CertIp {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        match self.choice {
            CertIpChoice::Inherit => {
                0u8.compose(target)?;
                (self.family.afi() as u8).compose(target)
            }
            CertIpChoice::Addr(ref addr) => {
                1u8.compose(target)?;
                addr.compose(target)
            }
            CertIpChoice::Range(ref range) => {
                2u8.compose(target)?;
                range.compose(target)
            }
        }
    }
}

impl<R: io::Read> Parse<R> for CertIp {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        match u8::parse(source)? {
            0 => {
                let family = AddressFamily::from_afi(
                    u8::parse(source)?.into()
                ).ok_or_else(|| {
                    ParseError::format("illegal address family")
                })?;
                Ok(CertIp::new(family, CertIpChoice::Inherit))
            }
            1 => {
                let addr = IpAddr::parse(source)?;
                Ok(CertIp::new(addr.family(), CertIpChoice::Addr(addr)))
            }
            2 => {
                let range = IpAddrRange::parse(source)?;
                Ok(CertIp::new(range.family(), CertIpChoice::Range(range)))
            }
            _ => Err(ParseError::format("illegal IP resource tag"))
        }
    }
}

impl<W: io::Write> Compose<W> for CertAs {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        match *self {
            CertAs::Inherit => 0u8.compose(target),
            CertAs::Id(id) => {
                1u8.compose(target)?;
                id.compose(target)
            }
            CertAs::Range { min, max } => {
                2u8.compose(target)?;
                min.compose(target)?;
                max.compose(target)
            }
        }
    }
}

impl<R: io::Read> Parse<R> for CertAs {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        match u8::parse(source)? {
            0 => Ok(CertAs::Inherit),
            1 => Ok(CertAs::Id(u32::parse(source)?)),
            2 => {
                let min = u32::parse(source)?;
                let max = u32::parse(source)?;
                if min > max {
                    return Err(ParseError::format("illegal AS range"))
                }
                Ok(CertAs::Range { min, max })
            }
            _ => Err(ParseError::format("illegal AS resource tag"))
        }
    }
}


//------------ Sia -----------------------------------------------------------

struct Sia {
    ca_repository: Option<String>,
    rpki_manifest: Option<String>,
}


//------------ Helpers -------------------------------------------------------

/// Parses a GeneralName that must be the uniformResourceIdentifier choice.
///
/// ```text
/// GeneralName ::= CHOICE {
///    ...
///    uniformResourceIdentifier       [6]     IA5String,
///    ... }
/// ```
fn parse_uri(reader: &mut Reader) -> Result<String, Error> {
    let content = der::parse_expected(reader, Tag::CTX_6)?;
    let slice = content.as_slice_less_safe();
    if slice.is_empty() || !slice.is_ascii() {
        return Err(Error::Malformed)
    }
    // IA5 is a subset of UTF-8, checked above.
    Ok(String::from_utf8_lossy(slice).into_owned())
}


//------------ OIDs ----------------------------------------------------------

pub(crate) mod oid {
    use crate::der::Oid;

    pub const AD_CA_ISSUERS: Oid<&[u8]> = Oid(&[43, 6, 1, 5, 5, 7, 48, 2]);
    pub const AD_CA_REPOSITORY: Oid<&[u8]> = Oid(&[43, 6, 1, 5, 5, 7, 48, 5]);
    pub const AD_RPKI_MANIFEST: Oid<&[u8]> = Oid(&[43, 6, 1, 5, 5, 7, 48, 10]);
    pub const CE_SUBJECT_KEY_IDENTIFIER: Oid<&[u8]> = Oid(&[85, 29, 14]);
    pub const CE_KEY_USAGE: Oid<&[u8]> = Oid(&[85, 29, 15]);
    pub const CE_BASIC_CONSTRAINTS: Oid<&[u8]> = Oid(&[85, 29, 19]);
    pub const CE_CRL_DISTRIBUTION_POINTS: Oid<&[u8]> = Oid(&[85, 29, 31]);
    pub const CE_CERTIFICATE_POLICIES: Oid<&[u8]> = Oid(&[85, 29, 32]);
    pub const CE_AUTHORITY_KEY_IDENTIFIER: Oid<&[u8]> = Oid(&[85, 29, 35]);
    pub const CE_EXTENDED_KEY_USAGE: Oid<&[u8]> = Oid(&[85, 29, 37]);
    pub const PE_AUTHORITY_INFO_ACCESS: Oid<&[u8]>
        = Oid(&[43, 6, 1, 5, 5, 7, 1, 1]);
    pub const PE_IP_ADDR_BLOCK: Oid<&[u8]> = Oid(&[43, 6, 1, 5, 5, 7, 1, 7]);
    pub const PE_AUTONOMOUS_SYS_IDS: Oid<&[u8]>
        = Oid(&[43, 6, 1, 5, 5, 7, 1, 8]);
    pub const PE_SUBJECT_INFO_ACCESS: Oid<&[u8]>
        = Oid(&[43, 6, 1, 5, 5, 7, 1, 11]);
}


//============ Testing =======================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn decode_ca_cert() {
        let data = test::ca_cert(
            &[7u8; 20],
            "rsync://repo.example.net/repo/",
            "rsync://repo.example.net/repo/manifest.mft",
        );
        let (cert, handle) = Cert::decode(data.into()).unwrap();
        assert_eq!(
            cert.ca_repository(), Some("rsync://repo.example.net/repo/")
        );
        assert_eq!(
            cert.rpki_manifest(),
            Some("rsync://repo.example.net/repo/manifest.mft")
        );
        assert_eq!(handle.subject_key_id().as_ref(), &[7u8; 20]);
        assert_eq!(cert.ips().len(), 2);
        assert_eq!(cert.ips()[0].to_string(), "10.64/12");
        assert_eq!(cert.ips()[1].to_string(), "10.0.0.0--10.63.255.255");
        assert_eq!(
            cert.as_resources(),
            &[CertAs::Id(64496), CertAs::Range { min: 64500, max: 64510 }]
        );
    }

    #[test]
    fn decode_v6_resources() {
        let blocks = test::ip_family_v6(
            &test::ip_prefix(&[0x20, 0x01, 0x0d, 0xb8], 0)
        );
        let data = test::ee_cert(
            &[7u8; 20], Some(&test::ip_blocks_ext(&blocks)), None
        );
        let (cert, _) = Cert::decode(data.into()).unwrap();
        assert_eq!(cert.ips().len(), 1);
        assert_eq!(cert.ips()[0].family(), AddressFamily::Ipv6);
        assert_eq!(cert.ips()[0].to_string(), "2001:db8/32");
    }

    #[test]
    fn decode_inherit() {
        let ip_blocks = test::ip_blocks_ext(
            &test::ip_family_inherit(&[0, 1])
        );
        let data = test::ee_cert(&[9u8; 20], Some(&ip_blocks), None);
        let (cert, _) = Cert::decode(data.into()).unwrap();
        assert_eq!(cert.ips().len(), 1);
        assert!(cert.has_inherited_ips(AddressFamily::Ipv4));
        assert!(!cert.has_inherited_ips(AddressFamily::Ipv6));
    }

    #[test]
    fn reject_unknown_critical_extension() {
        let unknown = test::extension(
            &[43, 6, 1, 4, 1, 1], true, &test::null()
        );
        let data = test::cert_with_raw_extensions(&test::cat(&[
            &test::ski_ext(&[7u8; 20]),
            &test::key_usage_ee(),
            &test::policies_ext(),
            &test::sia_ee("rsync://repo.example.net/x.roa"),
            &test::ip_blocks_ext(&test::ip_family_v4(
                &test::ip_prefix(&[0x0a], 0)
            )),
            &unknown,
        ]));
        assert!(Cert::decode(data.into()).is_err());

        // The same extension as non-critical is skipped.
        let unknown = test::extension(
            &[43, 6, 1, 4, 1, 1], false, &test::null()
        );
        let data = test::cert_with_raw_extensions(&test::cat(&[
            &test::ski_ext(&[7u8; 20]),
            &test::key_usage_ee(),
            &test::policies_ext(),
            &test::sia_ee("rsync://repo.example.net/x.roa"),
            &test::ip_blocks_ext(&test::ip_family_v4(
                &test::ip_prefix(&[0x0a], 0)
            )),
            &unknown,
        ]));
        assert!(Cert::decode(data.into()).is_ok());
    }

    #[test]
    fn reject_duplicate_sia_method() {
        let sia = test::extension(
            &[43, 6, 1, 5, 5, 7, 1, 11], false,
            &test::seq(&[
                &test::access_description(
                    &[43, 6, 1, 5, 5, 7, 48, 5],
                    "rsync://repo.example.net/a/"
                ),
                &test::access_description(
                    &[43, 6, 1, 5, 5, 7, 48, 5],
                    "rsync://repo.example.net/b/"
                ),
            ])
        );
        let data = test::cert_with_raw_extensions(&test::cat(&[
            &test::ski_ext(&[7u8; 20]),
            &test::key_usage_ca(),
            &test::policies_ext(),
            &sia,
            &test::ip_blocks_ext(&test::ip_family_v4(
                &test::ip_prefix(&[0x0a], 0)
            )),
        ]));
        assert!(Cert::decode(data.into()).is_err());
    }

    #[test]
    fn reject_missing_resources() {
        let data = test::cert_with_raw_extensions(&test::cat(&[
            &test::ski_ext(&[7u8; 20]),
            &test::key_usage_ee(),
            &test::policies_ext(),
            &test::sia_ee("rsync://repo.example.net/x.roa"),
        ]));
        assert!(Cert::decode(data.into()).is_err());
    }

    #[test]
    fn reject_bad_afi() {
        let block = test::seq(&[
            &test::octets(&[0, 3]),
            &test::seq(&[&test::ip_prefix(&[0x0a], 0)]),
        ]);
        let data = test::ee_cert(
            &[7u8; 20], Some(&test::ip_blocks_ext(&block)), None
        );
        assert!(Cert::decode(data.into()).is_err());
    }

    #[test]
    fn reject_inverted_as_range() {
        let as_blocks = test::as_blocks_ext(&test::cat(&[
            &test::seq(&[&test::int(100), &test::int(50)]),
        ]));
        let data = test::ee_cert(&[7u8; 20], None, Some(&as_blocks));
        assert!(Cert::decode(data.into()).is_err());
    }

    #[test]
    fn reject_duplicate_family() {
        let blocks = test::cat(&[
            &test::ip_family_v4(&test::ip_prefix(&[0x0a], 0)),
            &test::ip_family_v4(&test::ip_prefix(&[0x0b], 0)),
        ]);
        let data = test::ee_cert(
            &[7u8; 20], Some(&test::ip_blocks_ext(&blocks)), None
        );
        assert!(Cert::decode(data.into()).is_err());
    }

    #[test]
    fn write_read() {
        let data = test::ca_cert(
            &[7u8; 20],
            "rsync://repo.example.net/repo/",
            "rsync://repo.example.net/repo/manifest.mft",
        );
        let (cert, _) = Cert::decode(data.into()).unwrap();
        test::write_read(cert);

        let data = test::ee_cert(
            &[9u8; 20],
            Some(&test::ip_blocks_ext(&test::ip_family_inherit(&[0, 2]))),
            Some(&test::as_inherit_ext()),
        );
        let (cert, _) = Cert::decode(data.into()).unwrap();
        test::write_read(cert);
    }

    #[test]
    fn reject_bad_frame_tags() {
        use crate::binio::Parse;

        let mut slice = &[3u8][..];
        assert!(CertAs::parse(&mut slice).is_err());

        let mut slice = &[3u8][..];
        assert!(CertIp::parse(&mut slice).is_err());

        // An AS range with min above max must not get through either.
        let mut frame = vec![2u8];
        frame.extend_from_slice(&100u32.to_le_bytes());
        frame.extend_from_slice(&50u32.to_le_bytes());
        let mut slice = frame.as_slice();
        assert!(CertAs::parse(&mut slice).is_err());
    }

    #[test]
    fn coverage() {
        let blocks = test::ip_family_v4(&test::cat(&[
            &test::ip_prefix(&[0x0a, 0x40], 4),
        ]));
        let data = test::ee_cert(
            &[7u8; 20], Some(&test::ip_blocks_ext(&blocks)), None
        );
        let (cert, _) = Cert::decode(data.into()).unwrap();

        let inside = IpAddr::new(
            AddressFamily::Ipv4, &[0x0a, 0x41], 0
        ).unwrap();
        let (min, max) = inside.range();
        assert!(cert.covers_addrs(AddressFamily::Ipv4, min, max));
        assert!(!cert.covers_addrs(AddressFamily::Ipv6, min, max));

        let outside = IpAddr::new(
            AddressFamily::Ipv4, &[0x0b], 0
        ).unwrap();
        let (min, max) = outside.range();
        assert!(!cert.covers_addrs(AddressFamily::Ipv4, min, max));
    }
}
