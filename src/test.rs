//! Test helpers.
//!
//! Tiny DER encoders used to build synthetic certificates and signed
//! objects for the parser tests. Encoding stays deliberately simple; the
//! builders panic on inputs the tests never produce.
#![cfg(test)]

use crate::binio::{Compose, Parse};
use crate::utils;


//------------ Round-trip helper ---------------------------------------------

/// Serializes a value, reads it back and checks both for equality and
/// for the encoding having been consumed completely.
pub fn write_read<T>(value: T)
where T: Compose<Vec<u8>> + for<'a> Parse<&'a [u8]> + Eq + std::fmt::Debug {
    let mut encoded = Vec::new();
    value.compose(&mut encoded).unwrap();
    let mut slice = encoded.as_slice();
    let decoded = T::parse(&mut slice).unwrap();
    assert!(slice.is_empty());
    assert_eq!(value, decoded)
}


//------------ Primitive encoders --------------------------------------------

pub fn cat(parts: &[&[u8]]) -> Vec<u8> {
    let mut res = Vec::new();
    for part in parts {
        res.extend_from_slice(part);
    }
    res
}

pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut res = vec![tag];
    let len = content.len();
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
        panic!("overly long test value");
    }
    res.extend_from_slice(content);
    res
}

pub fn seq(parts: &[&[u8]]) -> Vec<u8> {
    tlv(0x30, &cat(parts))
}

pub fn set(parts: &[&[u8]]) -> Vec<u8> {
    tlv(0x31, &cat(parts))
}

pub fn ctx(num: u8, content: &[u8]) -> Vec<u8> {
    tlv(0x80 | num, content)
}

pub fn ctx_con(num: u8, parts: &[&[u8]]) -> Vec<u8> {
    tlv(0xa0 | num, &cat(parts))
}

pub fn oid(content: &[u8]) -> Vec<u8> {
    tlv(0x06, content)
}

pub fn int(value: u64) -> Vec<u8> {
    let mut content = Vec::new();
    let mut value = value;
    loop {
        content.insert(0, (value & 0xFF) as u8);
        value >>= 8;
        if value == 0 {
            break
        }
    }
    if content[0] & 0x80 != 0 {
        content.insert(0, 0);
    }
    tlv(0x02, &content)
}

pub fn octets(content: &[u8]) -> Vec<u8> {
    tlv(0x04, content)
}

pub fn bits(unused: u8, content: &[u8]) -> Vec<u8> {
    let mut inner = vec![unused];
    inner.extend_from_slice(content);
    tlv(0x03, &inner)
}

pub fn ia5(content: &str) -> Vec<u8> {
    tlv(0x16, content.as_bytes())
}

pub fn utc_time(content: &str) -> Vec<u8> {
    tlv(0x17, content.as_bytes())
}

pub fn gen_time(content: &str) -> Vec<u8> {
    tlv(0x18, content.as_bytes())
}

pub fn null() -> Vec<u8> {
    vec![0x05, 0x00]
}

pub fn boolean_true() -> Vec<u8> {
    vec![0x01, 0x01, 0xFF]
}


//------------ Object identifier contents ------------------------------------

pub const OID_SHA256: &[u8] = &[96, 134, 72, 1, 101, 3, 4, 2, 1];
pub const OID_RSA: &[u8] = &[42, 134, 72, 134, 247, 13, 1, 1, 1];
pub const OID_SHA256_RSA: &[u8] = &[42, 134, 72, 134, 247, 13, 1, 1, 11];
pub const OID_SIGNED_DATA: &[u8] = &[42, 134, 72, 134, 247, 13, 1, 7, 2];
pub const OID_CONTENT_TYPE: &[u8] = &[42, 134, 72, 134, 247, 13, 1, 9, 3];
pub const OID_MESSAGE_DIGEST: &[u8] = &[42, 134, 72, 134, 247, 13, 1, 9, 4];
pub const OID_MFT_CONTENT: &[u8]
    = &[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 26];
pub const OID_ROA_CONTENT: &[u8]
    = &[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 24];

fn alg(oid_content: &[u8]) -> Vec<u8> {
    seq(&[&oid(oid_content), &null()])
}


//------------ Certificate building ------------------------------------------

pub fn extension(
    oid_content: &[u8],
    critical: bool,
    value: &[u8]
) -> Vec<u8> {
    if critical {
        seq(&[&oid(oid_content), &boolean_true(), &octets(value)])
    }
    else {
        seq(&[&oid(oid_content), &octets(value)])
    }
}

pub fn ski_ext(id: &[u8; 20]) -> Vec<u8> {
    extension(&[85, 29, 14], false, &octets(id))
}

pub fn key_usage_ee() -> Vec<u8> {
    // digitalSignature only.
    extension(&[85, 29, 15], true, &bits(7, &[0x80]))
}

pub fn key_usage_ca() -> Vec<u8> {
    // keyCertSign and cRLSign.
    extension(&[85, 29, 15], true, &bits(1, &[0x06]))
}

pub fn policies_ext() -> Vec<u8> {
    // The ipAddr-asNumber policy, no qualifiers.
    extension(
        &[85, 29, 32], true,
        &seq(&[&seq(&[&oid(&[43, 6, 1, 5, 5, 7, 14, 2])])])
    )
}

pub fn access_description(method: &[u8], uri: &str) -> Vec<u8> {
    seq(&[&oid(method), &ctx(6, uri.as_bytes())])
}

pub fn sia_ee(uri: &str) -> Vec<u8> {
    extension(
        &[43, 6, 1, 5, 5, 7, 1, 11], false,
        &seq(&[&access_description(&[43, 6, 1, 5, 5, 7, 48, 11], uri)])
    )
}

pub fn sia_ca(repository: &str, manifest: &str) -> Vec<u8> {
    extension(
        &[43, 6, 1, 5, 5, 7, 1, 11], false,
        &seq(&[
            &access_description(&[43, 6, 1, 5, 5, 7, 48, 5], repository),
            &access_description(&[43, 6, 1, 5, 5, 7, 48, 10], manifest),
        ])
    )
}

pub fn ip_prefix(addr: &[u8], unused: u8) -> Vec<u8> {
    bits(unused, addr)
}

pub fn ip_range(
    min_addr: &[u8], min_unused: u8,
    max_addr: &[u8], max_unused: u8,
) -> Vec<u8> {
    seq(&[&bits(min_unused, min_addr), &bits(max_unused, max_addr)])
}

pub fn ip_family_v4(entries: &[u8]) -> Vec<u8> {
    seq(&[&octets(&[0, 1]), &tlv(0x30, entries)])
}

pub fn ip_family_v6(entries: &[u8]) -> Vec<u8> {
    seq(&[&octets(&[0, 2]), &tlv(0x30, entries)])
}

pub fn ip_family_inherit(afi: &[u8]) -> Vec<u8> {
    seq(&[&octets(afi), &null()])
}

pub fn ip_blocks_ext(blocks: &[u8]) -> Vec<u8> {
    extension(&[43, 6, 1, 5, 5, 7, 1, 7], true, &tlv(0x30, blocks))
}

pub fn as_blocks_ext(entries: &[u8]) -> Vec<u8> {
    extension(
        &[43, 6, 1, 5, 5, 7, 1, 8], true,
        &seq(&[&ctx_con(0, &[&tlv(0x30, entries)])])
    )
}

pub fn as_inherit_ext() -> Vec<u8> {
    extension(
        &[43, 6, 1, 5, 5, 7, 1, 8], true,
        &seq(&[&ctx_con(0, &[&null()])])
    )
}

fn spki() -> Vec<u8> {
    seq(&[&alg(OID_RSA), &bits(0, &[0x99; 16])])
}

/// Builds a certificate around the given concatenated extensions.
///
/// The signature is a placeholder; these certificates only work for tests
/// that skip cryptographic verification.
pub fn cert_with_raw_extensions(extensions: &[u8]) -> Vec<u8> {
    let tbs = seq(&[
        &ctx_con(0, &[&int(2)]),
        &int(12345),
        &alg(OID_SHA256_RSA),
        &seq(&[]),
        &seq(&[&utc_time("230101000000Z"), &utc_time("380119000000Z")]),
        &seq(&[]),
        &spki(),
        &ctx_con(3, &[&tlv(0x30, extensions)]),
    ]);
    seq(&[&tbs, &alg(OID_SHA256_RSA), &bits(0, &[0xAB; 32])])
}

/// An end-entity certificate with the given resources.
pub fn ee_cert(
    ski: &[u8; 20],
    ip_blocks: Option<&[u8]>,
    as_blocks: Option<&[u8]>,
) -> Vec<u8> {
    let mut extensions = cat(&[
        &ski_ext(ski),
        &key_usage_ee(),
        &policies_ext(),
        &sia_ee("rsync://repo.example.net/obj.roa"),
    ]);
    if let Some(blocks) = ip_blocks {
        extensions.extend_from_slice(blocks);
    }
    if let Some(blocks) = as_blocks {
        extensions.extend_from_slice(blocks);
    }
    cert_with_raw_extensions(&extensions)
}

/// A CA certificate with a fixed set of v4 and AS resources.
pub fn ca_cert(ski: &[u8; 20], repository: &str, manifest: &str) -> Vec<u8> {
    let ip_entries = cat(&[
        &ip_prefix(&[0x0a, 0x40], 4),
        &ip_range(&[0x0a, 0x00, 0x00, 0x00], 0, &[0x0a, 0x3f, 0xff, 0xff], 0),
    ]);
    let as_entries = cat(&[
        &int(64496),
        &seq(&[&int(64500), &int(64510)]),
    ]);
    let extensions = cat(&[
        &ski_ext(ski),
        &key_usage_ca(),
        &policies_ext(),
        &sia_ca(repository, manifest),
        &ip_blocks_ext(&ip_family_v4(&ip_entries)),
        &as_blocks_ext(&as_entries),
    ]);
    cert_with_raw_extensions(&extensions)
}


//------------ Signed object building ----------------------------------------

pub fn attribute(oid_content: &[u8], value: &[u8]) -> Vec<u8> {
    seq(&[&oid(oid_content), &set(&[value])])
}

pub fn signer_info(
    sid: &[u8],
    econtent_type: &[u8],
    digest: &[u8]
) -> Vec<u8> {
    seq(&[
        &int(3),
        &ctx(0, sid),
        &seq(&[&oid(OID_SHA256)]),
        &ctx_con(0, &[
            &attribute(OID_CONTENT_TYPE, &oid(econtent_type)),
            &attribute(OID_MESSAGE_DIGEST, &octets(digest)),
        ]),
        &alg(OID_RSA),
        &octets(&[0xCD; 64]),
    ])
}

/// Builds a complete CMS signed object around the given eContent.
///
/// The message digest attribute is real, the signatures are placeholders.
pub fn signed_object_with_cert(
    econtent_type: &[u8],
    econtent: &[u8],
    cert_der: &[u8],
    ski: &[u8],
    signer_count: usize,
) -> Vec<u8> {
    let digest = utils::sha256(econtent);
    let signer = signer_info(ski, econtent_type, digest.as_ref());
    let mut signers = Vec::new();
    for _ in 0..signer_count {
        signers.extend_from_slice(&signer);
    }
    seq(&[
        &oid(OID_SIGNED_DATA),
        &ctx_con(0, &[&seq(&[
            &int(3),
            &set(&[&seq(&[&oid(OID_SHA256)])]),
            &seq(&[
                &oid(econtent_type),
                &ctx_con(0, &[&octets(econtent)]),
            ]),
            &ctx_con(0, &[cert_der]),
            &tlv(0x31, &signers),
        ])]),
    ])
}

/// A signed object whose EE certificate inherits all v4 resources.
pub fn signed_object(econtent_type: &[u8], econtent: &[u8]) -> Vec<u8> {
    let ski = [0x51u8; 20];
    let cert = ee_cert(
        &ski,
        Some(&ip_blocks_ext(&ip_family_inherit(&[0, 1]))),
        None,
    );
    signed_object_with_cert(econtent_type, econtent, &cert, &ski, 1)
}
