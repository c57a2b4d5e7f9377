//! CMS signed objects.
//!
//! Manifests and ROAs are wrapped in a Cryptographic Message Syntax
//! signed-data structure. RPKI uses a very strict profile of CMS: RFC 6488
//! narrows almost every optional piece of RFC 5652 down to exactly one
//! choice, which the decoder here enforces.
//!
//! Validation deliberately does not build a certification chain out of the
//! CMS structure. The chain is delivered externally through manifest
//! traversal, so the only cryptographic question left is a one-hop one:
//! was the embedded signer certificate issued by the CA certificate the
//! caller already trusts, and does the signature verify under the signer
//! certificate’s key.

use std::fmt;
use std::path::Path;
use bytes::Bytes;
use log::{debug, error};
use untrusted::{Input, Reader};
use crate::cert::Cert;
use crate::der::{self, Error, Oid, Tag};
use crate::error::Failed;
use crate::utils;
use crate::x509::{
    self, update_once, SignatureAlgorithm, Time, ValidationError, X509,
};


//------------ parse_validate ------------------------------------------------

/// Parses and validates a CMS file.
///
/// The file’s SHA-256 digest is checked against `expected_digest` if one
/// is given and the declared eContentType must equal `expected_type`.
/// When `parent` is present, the object’s signature is verified and the
/// embedded signer certificate is checked to be signed by the parent’s
/// key. Without a parent, only structure and content type are checked,
/// which is the trust-anchor bootstrap case.
///
/// All diagnostics are logged; the caller just learns that the object is
/// a write-off.
pub fn parse_validate(
    parent: Option<&X509>,
    path: &Path,
    expected_type: &Oid<&'static [u8]>,
    expected_digest: Option<&[u8]>,
) -> Result<SignedObject, Failed> {
    let data = utils::read_file(path, expected_digest).map_err(|err| {
        error!("{}: {}", path.display(), err);
        Failed
    })?;
    let object = SignedObject::decode(data).map_err(|err| {
        error!("{}: {}", path.display(), err);
        Failed
    })?;
    if *object.content_type() != *expected_type {
        error!(
            "{}: incorrect OID value {}",
            path.display(), object.content_type()
        );
        return Err(Failed)
    }
    if let Some(parent) = parent {
        if let Err(err) = object.verify(parent) {
            error!("{}: {}", path.display(), err);
            return Err(Failed)
        }
        debug!("{}: verified CMS", path.display());
    }
    Ok(object)
}


//------------ SignedObject --------------------------------------------------

/// A decoded RPKI signed object.
///
/// The structure has been checked against the profile but the signatures
/// have not necessarily been verified yet; that happens in [`verify`]
/// against a caller-supplied issuer.
///
/// [`verify`]: Self::verify
#[derive(Clone, Debug)]
pub struct SignedObject {
    content_type: Oid<Bytes>,
    content: Bytes,
    cert: Cert,
    cert_handle: X509,
    signer_info: SignerInfo,
}

impl SignedObject {
    /// Decodes a signed object from its DER encoding.
    pub fn decode(data: Bytes) -> Result<Self, DecodeError> {
        Input::from(data.as_ref()).read_all(
            DecodeError::Der(Error::Malformed), Self::take_from
        )
    }

    /// Parses the outer ContentInfo.
    ///
    /// ```text
    /// ContentInfo ::= SEQUENCE {
    ///     contentType ContentType,
    ///     content [0] EXPLICIT ANY DEFINED BY contentType }
    /// ```
    ///
    /// The content type must be id-signedData.
    fn take_from(reader: &mut Reader) -> Result<Self, DecodeError> {
        let inner = der::parse_expected(reader, Tag::SEQUENCE)?;
        inner.read_all(DecodeError::Der(Error::Malformed), |reader| {
            oid::SIGNED_DATA.skip_if(reader)?;
            let content = der::parse_expected(reader, Tag::CTX_CON_0)?;
            content.read_all(
                DecodeError::Der(Error::Malformed), Self::take_signed_data
            )
        })
    }

    /// Parses the SignedData value.
    ///
    /// RFC 6488:
    ///
    /// ```text
    /// SignedData ::= SEQUENCE {
    ///     version CMSVersion,
    ///     digestAlgorithms DigestAlgorithmIdentifiers,
    ///     encapContentInfo EncapsulatedContentInfo,
    ///     certificates [0] IMPLICIT CertificateSet OPTIONAL,
    ///     crls [1] IMPLICIT RevocationInfoChoices OPTIONAL,
    ///     signerInfos SignerInfos }
    /// ```
    ///
    /// `version` must be 3, `certificates` present and `crls` not.
    fn take_signed_data(reader: &mut Reader) -> Result<Self, DecodeError> {
        let inner = der::parse_expected(reader, Tag::SEQUENCE)?;
        inner.read_all(DecodeError::Der(Error::Malformed), |reader| {
            der::skip_u8_if(reader, 3)?;
            DigestAlgorithm::skip_set(reader)?;
            let (content_type, content)
                = Self::take_encap_content_info(reader)?;
            let (cert, cert_handle) = Self::take_certificates(reader)?;
            let signer_info = SignerInfo::take_set_from(reader)?;
            Ok(SignedObject {
                content_type, content, cert, cert_handle, signer_info
            })
        })
    }

    /// Parses the EncapsulatedContentInfo value.
    ///
    /// ```text
    /// EncapsulatedContentInfo ::= SEQUENCE {
    ///       eContentType ContentType,
    ///       eContent [0] EXPLICIT OCTET STRING OPTIONAL }
    /// ```
    ///
    /// RFC 6488 requires the eContent to be present.
    fn take_encap_content_info(
        reader: &mut Reader
    ) -> Result<(Oid<Bytes>, Bytes), Error> {
        der::parse_nested(reader, Tag::SEQUENCE, |reader| {
            let content_type = Oid::take_from(reader)?;
            let content = der::parse_nested(
                reader, Tag::CTX_CON_0,
                |reader| {
                    let os = der::parse_octet_string(reader)?;
                    Ok(Bytes::copy_from_slice(os.as_slice_less_safe()))
                }
            )?;
            Ok((content_type, content))
        })
    }

    /// Parses the certificates field.
    ///
    /// The field is `[0] IMPLICIT CertificateSet`, a set of certificate
    /// choices of which only a plain Certificate is implemented. RFC 6488
    /// limits the set to exactly the one EE certificate the object was
    /// signed with.
    fn take_certificates(
        reader: &mut Reader
    ) -> Result<(Cert, X509), DecodeError> {
        let content = der::parse_expected(reader, Tag::CTX_CON_0)?;
        let mut reader = Reader::new(content);
        let res = Cert::take_from(&mut reader)?;
        if !reader.at_end() {
            return Err(DecodeError::MultipleCerts)
        }
        Ok(res)
    }
}

impl SignedObject {
    /// The declared eContentType.
    pub fn content_type(&self) -> &Oid<Bytes> {
        &self.content_type
    }

    /// The eContent octets.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// The semantic content of the embedded EE certificate.
    pub fn cert(&self) -> &Cert {
        &self.cert
    }

    /// The raw handle of the embedded EE certificate.
    pub fn cert_handle(&self) -> &X509 {
        &self.cert_handle
    }

    /// Verifies the object against its issuing certificate.
    ///
    /// The requirements are those of section 3 of RFC 6488: the signer
    /// identifier must match the EE certificate’s subject key identifier,
    /// the signed content-type attribute must repeat the eContentType, the
    /// message digest attribute must match the eContent, the signature
    /// over the signed attributes must verify under the EE key, and the
    /// EE certificate must be signed by the parent’s key.
    pub fn verify(&self, parent: &X509) -> Result<(), ValidationError> {
        if self.signer_info.sid != *self.cert_handle.subject_key_id() {
            return Err(ValidationError)
        }
        if self.content_type != self.signer_info.signed_attrs.content_type {
            return Err(ValidationError)
        }
        if utils::sha256(&self.content).as_ref()
            != self.signer_info.signed_attrs.message_digest.as_ref()
        {
            return Err(ValidationError)
        }
        let msg = self.signer_info.signed_attrs.encode_verify()?;
        x509::verify_signature(
            self.cert_handle.public_key(),
            &msg,
            &self.signer_info.signature_value,
        )?;
        self.cert_handle.verify_signed_by(parent)
    }
}


//------------ DigestAlgorithm -----------------------------------------------

/// The digest algorithm, which the profile fixes to SHA-256.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DigestAlgorithm {
    Sha256,
}

impl DigestAlgorithm {
    pub fn parse(reader: &mut Reader) -> Result<Self, Error> {
        der::parse_nested(reader, Tag::SEQUENCE, |reader| {
            oid::SHA256.skip_if(reader)?;
            der::skip_opt_null(reader)?;
            Ok(DigestAlgorithm::Sha256)
        })
    }

    /// Parses the digestAlgorithms SET of a SignedData value.
    ///
    /// Section 2.1.2 of RFC 6488 requires exactly one element.
    pub fn skip_set(reader: &mut Reader) -> Result<(), Error> {
        der::parse_nested(reader, Tag::SET, |reader| {
            Self::parse(reader).map(|_| ())
        })
    }
}


//------------ SignerInfo ----------------------------------------------------

/// The single SignerInfo of a signed object.
#[derive(Clone, Debug)]
struct SignerInfo {
    sid: Bytes,
    signed_attrs: SignedAttributes,
    signature_value: Bytes,
}

impl SignerInfo {
    /// Parses the signerInfos SET which must hold exactly one element.
    fn take_set_from(reader: &mut Reader) -> Result<Self, DecodeError> {
        let content = der::parse_expected(reader, Tag::SET)?;
        let mut reader = Reader::new(content);
        let res = Self::take_from(&mut reader)?;
        if !reader.at_end() {
            return Err(DecodeError::MultipleSigners)
        }
        Ok(res)
    }

    /// Parses a SignerInfo.
    ///
    /// The version must be 3 since the signer is identified by its
    /// subject key identifier:
    ///
    /// ```text
    /// SignerIdentifier ::= CHOICE {
    ///     issuerAndSerialNumber IssuerAndSerialNumber,
    ///     subjectKeyIdentifier [0] SubjectKeyIdentifier }
    /// ```
    fn take_from(reader: &mut Reader) -> Result<Self, Error> {
        der::parse_nested(reader, Tag::SEQUENCE, |reader| {
            der::skip_u8_if(reader, 3)?;
            let sid = der::parse_expected(reader, Tag::CTX_0)?;
            DigestAlgorithm::parse(reader)?;
            let signed_attrs = SignedAttributes::take_from(reader)?;
            SignatureAlgorithm::parse(reader)?;
            let signature_value = der::parse_octet_string(reader)?;
            Ok(SignerInfo {
                sid: Bytes::copy_from_slice(sid.as_slice_less_safe()),
                signed_attrs,
                signature_value: Bytes::copy_from_slice(
                    signature_value.as_slice_less_safe()
                ),
            })
        })
    }
}


//------------ SignedAttributes ----------------------------------------------

/// The signed attributes of a signer info.
///
/// The content-type and message-digest attributes must be present exactly
/// once; signing-time and binary-signing-time may each appear once and are
/// only shape-checked. Anything else is rejected. The raw encoding is
/// retained since the signature covers a re-encoding of it.
#[derive(Clone, Debug)]
struct SignedAttributes {
    raw: Bytes,
    content_type: Oid<Bytes>,
    message_digest: Bytes,
}

impl SignedAttributes {
    fn take_from(reader: &mut Reader) -> Result<Self, Error> {
        let raw = der::parse_expected(reader, Tag::CTX_CON_0)?;
        raw.read_all(Error::Malformed, |reader| {
            let mut content_type = None;
            let mut message_digest = None;
            let mut signing_time = None;
            let mut binary_signing_time = None;
            while !reader.at_end() {
                der::parse_nested(reader, Tag::SEQUENCE, |reader| {
                    let attr_type = Oid::take_from(reader)?;
                    if attr_type == oid::CONTENT_TYPE {
                        update_once(&mut content_type, || {
                            der::parse_nested(
                                reader, Tag::SET, Oid::take_from
                            )
                        })
                    }
                    else if attr_type == oid::MESSAGE_DIGEST {
                        update_once(&mut message_digest, || {
                            der::parse_nested(reader, Tag::SET, |reader| {
                                let os = der::parse_octet_string(reader)?;
                                Ok(Bytes::copy_from_slice(
                                    os.as_slice_less_safe()
                                ))
                            })
                        })
                    }
                    else if attr_type == oid::SIGNING_TIME {
                        update_once(&mut signing_time, || {
                            der::parse_nested(reader, Tag::SET, Time::parse)
                        })
                    }
                    else if attr_type == oid::AA_BINARY_SIGNING_TIME {
                        update_once(&mut binary_signing_time, || {
                            der::parse_nested(
                                reader, Tag::SET, der::parse_u64
                            )
                        })
                    }
                    else {
                        Err(Error::Malformed)
                    }
                })?;
            }
            Ok(SignedAttributes {
                raw: Bytes::copy_from_slice(raw.as_slice_less_safe()),
                content_type: content_type.ok_or(Error::Malformed)?,
                message_digest: message_digest.ok_or(Error::Malformed)?,
            })
        })
    }

    /// Re-encodes the attributes for signature verification.
    ///
    /// The signature covers the attributes as a proper `SET OF`, not the
    /// implicitly tagged form they appear in on the wire, so the header
    /// has to be rewritten.
    fn encode_verify(&self) -> Result<Vec<u8>, ValidationError> {
        let len = self.raw.len();
        let mut res = Vec::with_capacity(len + 4);
        res.push(0x31); // SET
        if len < 0x80 {
            res.push(len as u8);
        }
        else if len < 0x100 {
            res.push(0x81);
            res.push(len as u8);
        }
        else if len < 0x10000 {
            res.push(0x82);
            res.push((len >> 8) as u8);
            res.push(len as u8);
        }
        else {
            return Err(ValidationError)
        }
        res.extend_from_slice(self.raw.as_ref());
        Ok(res)
    }
}


//------------ DecodeError ---------------------------------------------------

/// A signed object failed to decode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The DER structure is broken or off-profile.
    Der(Error),

    /// The signerInfos set holds more than one signer.
    MultipleSigners,

    /// The certificates set holds more than one certificate.
    MultipleCerts,
}

impl From<Error> for DecodeError {
    fn from(err: Error) -> Self {
        DecodeError::Der(err)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DecodeError::Der(ref err) => err.fmt(f),
            DecodeError::MultipleSigners => f.write_str("need single signer"),
            DecodeError::MultipleCerts => {
                f.write_str("need single signer certificate")
            }
        }
    }
}


//------------ OIDs ----------------------------------------------------------

pub mod oid {
    use crate::der::Oid;

    pub const SIGNED_DATA: Oid<&[u8]>
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 2]);
    pub const SHA256: Oid<&[u8]> = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 1]);

    pub const CONTENT_TYPE: Oid<&[u8]>
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 3]);
    pub const MESSAGE_DIGEST: Oid<&[u8]>
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 4]);
    pub const SIGNING_TIME: Oid<&[u8]>
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 5]);
    pub const AA_BINARY_SIGNING_TIME: Oid<&[u8]>
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 2, 46]);
}


//============ Testing =======================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use crate::test;

    #[test]
    fn decode_object() {
        let data = test::signed_object(
            test::OID_ROA_CONTENT, b"payload"
        );
        let object = SignedObject::decode(data.into()).unwrap();
        assert_eq!(object.content().as_ref(), b"payload");
        assert_eq!(
            *object.content_type(),
            Oid(test::OID_ROA_CONTENT)
        );
        assert_eq!(
            object.cert_handle().subject_key_id().as_ref(),
            &[0x51u8; 20]
        );
    }

    #[test]
    fn reject_two_signers() {
        let ski = [0x51u8; 20];
        let cert = test::ee_cert(
            &ski,
            Some(&test::ip_blocks_ext(&test::ip_family_inherit(&[0, 1]))),
            None,
        );
        let data = test::signed_object_with_cert(
            test::OID_ROA_CONTENT, b"payload", &cert, &ski, 2
        );
        assert!(matches!(
            SignedObject::decode(data.into()),
            Err(DecodeError::MultipleSigners)
        ));
    }

    #[test]
    fn reject_two_certs() {
        let ski = [0x51u8; 20];
        let cert = test::ee_cert(
            &ski,
            Some(&test::ip_blocks_ext(&test::ip_family_inherit(&[0, 1]))),
            None,
        );
        let two = test::cat(&[&cert, &cert]);
        let digest = crate::utils::sha256(b"payload");
        let signer = test::signer_info(
            &ski, test::OID_ROA_CONTENT, digest.as_ref()
        );
        let data = test::seq(&[
            &test::oid(test::OID_SIGNED_DATA),
            &test::ctx_con(0, &[&test::seq(&[
                &test::int(3),
                &test::set(&[&test::seq(&[&test::oid(test::OID_SHA256)])]),
                &test::seq(&[
                    &test::oid(test::OID_ROA_CONTENT),
                    &test::ctx_con(0, &[&test::octets(b"payload")]),
                ]),
                &test::ctx_con(0, &[&two]),
                &test::set(&[&signer]),
            ])]),
        ]);
        assert!(matches!(
            SignedObject::decode(data.into()),
            Err(DecodeError::MultipleCerts)
        ));
    }

    #[test]
    fn reject_wrong_version() {
        let good = test::signed_object(test::OID_ROA_CONTENT, b"payload");
        // Patch the SignedData version from 3 to 2. It sits right behind
        // the ContentInfo and SignedData headers.
        let mut data = good.clone();
        let pos = data.windows(3).position(|w| w == [0x02, 0x01, 0x03])
            .unwrap();
        data[pos + 2] = 0x02;
        assert!(SignedObject::decode(data.into()).is_err());
    }

    #[test]
    fn reject_unknown_signed_attribute() {
        let ski = [0x51u8; 20];
        let cert = test::ee_cert(
            &ski,
            Some(&test::ip_blocks_ext(&test::ip_family_inherit(&[0, 1]))),
            None,
        );
        let digest = crate::utils::sha256(b"payload");
        let signer = test::seq(&[
            &test::int(3),
            &test::ctx(0, &ski),
            &test::seq(&[&test::oid(test::OID_SHA256)]),
            &test::ctx_con(0, &[
                &test::attribute(
                    test::OID_CONTENT_TYPE,
                    &test::oid(test::OID_ROA_CONTENT)
                ),
                &test::attribute(
                    test::OID_MESSAGE_DIGEST,
                    &test::octets(digest.as_ref())
                ),
                // An attribute the profile doesn’t know.
                &test::attribute(
                    &[42, 134, 72, 134, 247, 13, 1, 9, 99],
                    &test::null()
                ),
            ]),
            &test::seq(&[
                &test::oid(test::OID_RSA), &test::null()
            ]),
            &test::octets(&[0xCD; 64]),
        ]);
        let data = test::seq(&[
            &test::oid(test::OID_SIGNED_DATA),
            &test::ctx_con(0, &[&test::seq(&[
                &test::int(3),
                &test::set(&[&test::seq(&[&test::oid(test::OID_SHA256)])]),
                &test::seq(&[
                    &test::oid(test::OID_ROA_CONTENT),
                    &test::ctx_con(0, &[&test::octets(b"payload")]),
                ]),
                &test::ctx_con(0, &[&cert]),
                &test::set(&[&signer]),
            ])]),
        ]);
        assert!(SignedObject::decode(data.into()).is_err());
    }

    #[test]
    fn digest_mismatch_fails_file() {
        let data = test::signed_object(test::OID_ROA_CONTENT, b"payload");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        let wrong = crate::utils::sha256(b"other file");
        assert!(
            parse_validate(
                None,
                file.path(),
                &Oid(test::OID_ROA_CONTENT),
                Some(wrong.as_ref()),
            ).is_err()
        );

        let right = crate::utils::sha256(&data);
        assert!(
            parse_validate(
                None,
                file.path(),
                &Oid(test::OID_ROA_CONTENT),
                Some(right.as_ref()),
            ).is_ok()
        );
    }

    #[test]
    fn wrong_content_type_fails() {
        let data = test::signed_object(test::OID_MFT_CONTENT, b"payload");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        assert!(
            parse_validate(
                None, file.path(), &Oid(test::OID_ROA_CONTENT), None
            ).is_err()
        );
    }
}
