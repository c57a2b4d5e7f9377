//! Strict DER decoding.
//!
//! All RPKI objects are DER encoded and arrive from untrusted repositories,
//! so the decoder herein is strict: definite, minimally encoded lengths
//! only, and every nested value is handed to its parser as an exact byte
//! slice that must be consumed completely. The functions operate on
//! [`untrusted::Reader`] values so that no parser can ever read past the
//! value it was given.

use std::fmt;
use bytes::Bytes;
use untrusted::{EndOfInput, Input, Reader};


//------------ Tag -----------------------------------------------------------

/// An ASN.1 tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tag(u8);

impl Tag {
    const CONSTRUCTED: u8 = 0x20;
    const CONTEXT_SPECIFIC: u8 = 0x80;

    pub const BOOLEAN: Self = Tag(0x01);
    pub const INTEGER: Self = Tag(0x02);
    pub const BIT_STRING: Self = Tag(0x03);
    pub const OCTET_STRING: Self = Tag(0x04);
    pub const NULL: Self = Tag(0x05);
    pub const OID: Self = Tag(0x06);
    pub const IA5_STRING: Self = Tag(0x16);
    pub const UTC_TIME: Self = Tag(0x17);
    pub const GENERALIZED_TIME: Self = Tag(0x18);
    pub const SEQUENCE: Self = Tag(Tag::CONSTRUCTED | 0x10);
    pub const SET: Self = Tag(Tag::CONSTRUCTED | 0x11);

    pub const CTX_0: Self = Tag(Tag::CONTEXT_SPECIFIC);
    pub const CTX_1: Self = Tag(Tag::CONTEXT_SPECIFIC | 1);
    pub const CTX_2: Self = Tag(Tag::CONTEXT_SPECIFIC | 2);
    pub const CTX_6: Self = Tag(Tag::CONTEXT_SPECIFIC | 6);
    pub const CTX_CON_0: Self
        = Tag(Tag::CONTEXT_SPECIFIC | Tag::CONSTRUCTED);
    pub const CTX_CON_1: Self
        = Tag(Tag::CONTEXT_SPECIFIC | Tag::CONSTRUCTED | 1);
    pub const CTX_CON_3: Self
        = Tag(Tag::CONTEXT_SPECIFIC | Tag::CONSTRUCTED | 3);
}

impl Tag {
    pub fn parse(reader: &mut Reader) -> Result<Self, Error> {
        let byte = reader.read_byte()?;
        if (byte & 0x1F) == 0x1F {
            // All five lower bits set means the tag number follows in
            // subsequent bytes. The RPKI profiles never need that.
            Err(Error::Unimplemented)
        }
        else {
            Ok(Tag(byte))
        }
    }

    /// Returns whether the next byte of `reader` carries this tag.
    pub fn peek(self, reader: &Reader) -> bool {
        reader.peek(self.0)
    }
}


//------------ Basic value parsing -------------------------------------------

/// Parses the length octets of a value.
///
/// Only the definite form is allowed and the long form must be minimal,
/// i.e., it must not have fit into fewer octets.
fn parse_length(reader: &mut Reader) -> Result<usize, Error> {
    match reader.read_byte()? {
        // Bit 7 clear: the byte is the length.
        n if (n & 0x80) == 0 => Ok(n as usize),

        // Bit 7 set: the lower bits give the number of length octets.
        0x81 => {
            let n = reader.read_byte()? as usize;
            if n < 0x80 {
                return Err(Error::Malformed)
            }
            Ok(n)
        }
        0x82 => {
            let n = ((reader.read_byte()? as usize) << 8)
                  | (reader.read_byte()? as usize);
            if n < 0x100 {
                return Err(Error::Malformed)
            }
            Ok(n)
        }
        0x83 => {
            let n = ((reader.read_byte()? as usize) << 16)
                  | ((reader.read_byte()? as usize) << 8)
                  | (reader.read_byte()? as usize);
            if n < 0x1_0000 {
                return Err(Error::Malformed)
            }
            Ok(n)
        }
        0x84 => {
            let n = ((reader.read_byte()? as usize) << 24)
                  | ((reader.read_byte()? as usize) << 16)
                  | ((reader.read_byte()? as usize) << 8)
                  | (reader.read_byte()? as usize);
            if n < 0x100_0000 {
                return Err(Error::Malformed)
            }
            Ok(n)
        }

        // 0x80 would be the indefinite form which DER prohibits. Anything
        // needing more than four length octets cannot describe a real
        // object.
        _ => Err(Error::Malformed)
    }
}

/// Parses tag and content of the next value.
pub fn parse_value<'a>(
    reader: &mut Reader<'a>
) -> Result<(Tag, Input<'a>), Error> {
    let tag = Tag::parse(reader)?;
    let length = parse_length(reader)?;
    Ok((tag, reader.read_bytes(length)?))
}

/// Parses the next value, requiring the given tag.
pub fn parse_expected<'a>(
    reader: &mut Reader<'a>,
    expected: Tag,
) -> Result<Input<'a>, Error> {
    let (tag, inner) = parse_value(reader)?;
    if tag != expected {
        Err(Error::Malformed)
    }
    else {
        Ok(inner)
    }
}

/// Parses the next value if it carries the given tag.
pub fn parse_opt_expected<'a>(
    reader: &mut Reader<'a>,
    expected: Tag,
) -> Result<Option<Input<'a>>, Error> {
    if expected.peek(reader) {
        parse_expected(reader, expected).map(Some)
    }
    else {
        Ok(None)
    }
}

/// Parses a value with the given tag, handing its content to `op`.
///
/// The closure receives a reader over exactly the content octets and must
/// consume all of them.
pub fn parse_nested<'a, F, T>(
    reader: &mut Reader<'a>,
    expected: Tag,
    op: F
) -> Result<T, Error>
where F: FnOnce(&mut Reader<'a>) -> Result<T, Error> {
    let inner = parse_expected(reader, expected)?;
    inner.read_all(Error::Malformed, op)
}

/// Parses a value with the given tag if one is present.
pub fn parse_opt_nested<'a, F, T>(
    reader: &mut Reader<'a>,
    expected: Tag,
    op: F
) -> Result<Option<T>, Error>
where F: FnOnce(&mut Reader<'a>) -> Result<T, Error> {
    match parse_opt_expected(reader, expected)? {
        Some(inner) => inner.read_all(Error::Malformed, op).map(Some),
        None => Ok(None)
    }
}

/// Parses a value with the given tag and also returns its complete
/// encoding, header octets included.
///
/// This is how the to-be-signed portion of a certificate is captured for
/// later signature verification.
pub fn parse_spanned<'a>(
    reader: &mut Reader<'a>,
    expected: Tag,
) -> Result<(Input<'a>, Input<'a>), Error> {
    reader.read_partial(|reader| parse_expected(reader, expected))
}

/// Skips over the next value whatever it is.
pub fn skip_value(reader: &mut Reader) -> Result<(), Error> {
    parse_value(reader).map(|_| ())
}


//------------ Integers ------------------------------------------------------

/// Checks that `content` is a minimally encoded INTEGER and returns whether
/// it is negative.
fn check_int(content: &[u8]) -> Result<bool, Error> {
    match content.len() {
        0 => return Err(Error::Malformed),
        1 => { }
        _ => {
            // The first nine bits must not be all zero or all one, or the
            // encoding wasn’t minimal.
            if (content[0] == 0x00 && content[1] < 0x80)
                || (content[0] == 0xFF && content[1] >= 0x80)
            {
                return Err(Error::Malformed)
            }
        }
    }
    Ok(content[0] & 0x80 != 0)
}

/// Parses a non-negative INTEGER, returning its content octets with the
/// sign padding removed.
pub fn parse_unsigned<'a>(
    reader: &mut Reader<'a>
) -> Result<Input<'a>, Error> {
    let content = parse_expected(reader, Tag::INTEGER)?;
    if check_int(content.as_slice_less_safe())? {
        return Err(Error::Malformed)
    }
    content.read_all(Error::Malformed, |reader| {
        if content.len() > 1 && reader.peek(0) {
            reader.read_byte()?;
        }
        Ok(reader.read_bytes_to_end())
    })
}

/// Parses a non-negative INTEGER that must fit into a `u32`.
pub fn parse_u32(reader: &mut Reader) -> Result<u32, Error> {
    let content = parse_unsigned(reader)?;
    let slice = content.as_slice_less_safe();
    if slice.len() > 4 {
        return Err(Error::Malformed)
    }
    let mut res = 0u32;
    for &octet in slice {
        res = (res << 8) | u32::from(octet);
    }
    Ok(res)
}

/// Parses a non-negative INTEGER that must fit into a `u64`.
pub fn parse_u64(reader: &mut Reader) -> Result<u64, Error> {
    let content = parse_unsigned(reader)?;
    let slice = content.as_slice_less_safe();
    if slice.len() > 8 {
        return Err(Error::Malformed)
    }
    let mut res = 0u64;
    for &octet in slice {
        res = (res << 8) | u64::from(octet);
    }
    Ok(res)
}

/// Parses a non-negative INTEGER that must fit into a `u8`.
pub fn parse_u8(reader: &mut Reader) -> Result<u8, Error> {
    let content = parse_unsigned(reader)?;
    let slice = content.as_slice_less_safe();
    if slice.len() > 1 {
        return Err(Error::Malformed)
    }
    Ok(slice[0])
}

/// Parses an INTEGER that must carry the given small value.
pub fn skip_u8_if(reader: &mut Reader, expected: u8) -> Result<(), Error> {
    if parse_u8(reader)? != expected {
        Err(Error::Malformed)
    }
    else {
        Ok(())
    }
}


//------------ Other primitives ----------------------------------------------

/// Parses a BOOLEAN if one is present.
pub fn parse_opt_bool(reader: &mut Reader) -> Result<Option<bool>, Error> {
    match parse_opt_expected(reader, Tag::BOOLEAN)? {
        Some(content) => {
            match content.as_slice_less_safe() {
                [0x00] => Ok(Some(false)),
                [0xFF] => Ok(Some(true)),
                _ => Err(Error::Malformed)
            }
        }
        None => Ok(None)
    }
}

/// Parses a NULL value.
pub fn parse_null(reader: &mut Reader) -> Result<(), Error> {
    let content = parse_expected(reader, Tag::NULL)?;
    if content.is_empty() {
        Ok(())
    }
    else {
        Err(Error::Malformed)
    }
}

/// Skips over a NULL value if one is present.
pub fn skip_opt_null(reader: &mut Reader) -> Result<(), Error> {
    if Tag::NULL.peek(reader) {
        parse_null(reader)
    }
    else {
        Ok(())
    }
}

/// Parses an OCTET STRING, returning its content.
///
/// DER only allows the primitive form.
pub fn parse_octet_string<'a>(
    reader: &mut Reader<'a>
) -> Result<Input<'a>, Error> {
    parse_expected(reader, Tag::OCTET_STRING)
}

/// Parses an IA5String, returning its content.
pub fn parse_ia5_string<'a>(
    reader: &mut Reader<'a>
) -> Result<Input<'a>, Error> {
    let content = parse_expected(reader, Tag::IA5_STRING)?;
    if !content.as_slice_less_safe().is_ascii() {
        return Err(Error::Malformed)
    }
    Ok(content)
}


//------------ BitString -----------------------------------------------------

/// A BIT STRING value.
///
/// The first content octet gives the number of unused bits in the last
/// octet, which is how RFC 3779 encodes address prefixes.
#[derive(Clone, Copy, Debug)]
pub struct BitString<'a> {
    unused: u8,
    octets: Input<'a>,
}

impl<'a> BitString<'a> {
    pub fn parse(reader: &mut Reader<'a>) -> Result<Self, Error> {
        let content = parse_expected(reader, Tag::BIT_STRING)?;
        Self::parse_content(content)
    }

    pub fn parse_content(content: Input<'a>) -> Result<Self, Error> {
        content.read_all(Error::Malformed, |reader| {
            let unused = reader.read_byte()?;
            let octets = reader.read_bytes_to_end();
            if unused > 7 || (unused > 0 && octets.is_empty()) {
                return Err(Error::Malformed)
            }
            if unused > 0 {
                // DER requires the unused bits to be zero.
                let slice = octets.as_slice_less_safe();
                if slice[slice.len() - 1] & ((1u8 << unused) - 1) != 0 {
                    return Err(Error::Malformed)
                }
            }
            Ok(BitString { unused, octets })
        })
    }

    /// Parses a BIT STRING that must not have any unused bits.
    ///
    /// Returns the content octets. Signature values and key data are
    /// required to be of this form.
    pub fn parse_filled(reader: &mut Reader<'a>) -> Result<Input<'a>, Error> {
        let bs = Self::parse(reader)?;
        if bs.unused != 0 {
            return Err(Error::Malformed)
        }
        Ok(bs.octets)
    }

    pub fn unused(self) -> u8 {
        self.unused
    }

    pub fn octet_len(self) -> usize {
        self.octets.len()
    }

    pub fn octets(self) -> &'a [u8] {
        self.octets.as_slice_less_safe()
    }

    /// Returns the given bit, counted from the most significant.
    ///
    /// Bits beyond the string are zero.
    pub fn bit(self, bit: usize) -> bool {
        let octets = self.octets();
        let idx = bit >> 3;
        if idx >= octets.len() {
            return false
        }
        let mask = 0x80 >> (bit & 7);
        octets[idx] & mask != 0
    }
}


//------------ Oid -----------------------------------------------------------

/// An object identifier in its DER content encoding.
#[derive(Clone, Debug)]
pub struct Oid<T: AsRef<[u8]> = Bytes>(pub T);

impl Oid<Bytes> {
    pub fn take_from(reader: &mut Reader) -> Result<Self, Error> {
        let content = parse_expected(reader, Tag::OID)?;
        if content.is_empty() {
            return Err(Error::Malformed)
        }
        Ok(Oid(Bytes::copy_from_slice(content.as_slice_less_safe())))
    }
}

impl<T: AsRef<[u8]>> Oid<T> {
    /// Parses the next value which must be this very object identifier.
    pub fn skip_if(&self, reader: &mut Reader) -> Result<(), Error> {
        let content = parse_expected(reader, Tag::OID)?;
        if content.as_slice_less_safe() == self.0.as_ref() {
            Ok(())
        }
        else {
            Err(Error::Malformed)
        }
    }
}

impl<T: AsRef<[u8]>, U: AsRef<[u8]>> PartialEq<Oid<U>> for Oid<T> {
    fn eq(&self, other: &Oid<U>) -> bool {
        self.0.as_ref() == other.0.as_ref()
    }
}

impl<T: AsRef<[u8]>> Eq for Oid<T> { }

impl<T: AsRef<[u8]>> fmt::Display for Oid<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut arc = 0u32;
        let mut first = true;
        for &octet in self.0.as_ref() {
            arc = (arc << 7) | u32::from(octet & 0x7F);
            if octet & 0x80 == 0 {
                if first {
                    // The first subidentifier folds in the first two arcs.
                    write!(f, "{}.{}", arc / 40, arc % 40)?;
                    first = false;
                }
                else {
                    write!(f, ".{}", arc)?;
                }
                arc = 0;
            }
        }
        Ok(())
    }
}


//------------ Error ---------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// Malformed DER.
    Malformed,

    /// DER uses features we haven’t implemented.
    Unimplemented,
}

impl From<EndOfInput> for Error {
    fn from(_: EndOfInput) -> Error {
        Error::Malformed
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Malformed => f.write_str("malformed DER"),
            Error::Unimplemented => f.write_str("unimplemented DER feature"),
        }
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn with_reader<'a, F, T>(data: &'a [u8], op: F) -> Result<T, Error>
    where F: FnOnce(&mut Reader<'a>) -> Result<T, Error> {
        Input::from(data).read_all(Error::Malformed, op)
    }

    #[test]
    fn short_and_long_lengths() {
        let mut data = vec![0x04, 0x02, 0xab, 0xcd];
        assert_eq!(
            with_reader(&data, parse_octet_string)
                .unwrap().as_slice_less_safe(),
            b"\xab\xcd"
        );

        data = vec![0x04, 0x81, 0x80];
        data.extend_from_slice(&[0u8; 0x80]);
        assert_eq!(
            with_reader(&data, parse_octet_string).unwrap().len(),
            0x80
        );

        // Non-minimal long form must fail.
        data = vec![0x04, 0x81, 0x02, 0xab, 0xcd];
        assert!(with_reader(&data, parse_octet_string).is_err());
        data = vec![0x04, 0x82, 0x00, 0x02, 0xab, 0xcd];
        assert!(with_reader(&data, parse_octet_string).is_err());

        // Indefinite form is not DER.
        data = vec![0x04, 0x80, 0x00, 0x00];
        assert!(with_reader(&data, parse_octet_string).is_err());
    }

    #[test]
    fn truncated_value() {
        assert!(with_reader(&[0x04, 0x04, 0xab], parse_octet_string).is_err());
    }

    #[test]
    fn leftover_content_fails_nested() {
        // A sequence with more content than the inner parser takes.
        let data = [0x30, 0x04, 0x02, 0x01, 0x2a, 0xff];
        assert!(
            with_reader(&data, |reader| {
                parse_nested(reader, Tag::SEQUENCE, parse_u8)
            }).is_err()
        );
    }

    #[test]
    fn integers() {
        assert_eq!(with_reader(&[0x02, 0x01, 0x2a], parse_u32).unwrap(), 42);
        assert_eq!(
            with_reader(
                &[0x02, 0x05, 0x00, 0xff, 0xff, 0xff, 0xff], parse_u32
            ).unwrap(),
            0xFFFF_FFFF
        );

        // Negative values are not unsigned.
        assert!(with_reader(&[0x02, 0x01, 0x80], parse_u32).is_err());

        // Non-minimal encodings.
        assert!(with_reader(&[0x02, 0x02, 0x00, 0x2a], parse_u32).is_err());
        assert!(with_reader(&[0x02, 0x00], parse_u32).is_err());
    }

    #[test]
    fn bit_strings() {
        let bs = with_reader(
            &[0x03, 0x03, 0x04, 0x0a, 0x40], BitString::parse
        ).unwrap();
        assert_eq!(bs.unused(), 4);
        assert_eq!(bs.octets(), &[0x0a, 0x40]);

        // More than seven unused bits.
        assert!(
            with_reader(&[0x03, 0x02, 0x08, 0x00], BitString::parse).is_err()
        );

        // Unused bits without content.
        assert!(
            with_reader(&[0x03, 0x01, 0x03], BitString::parse).is_err()
        );

        assert!(
            with_reader(
                &[0x03, 0x02, 0x01, 0x00], BitString::parse_filled
            ).is_err()
        );
    }

    #[test]
    fn oid_display() {
        assert_eq!(
            Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 26][..])
                .to_string(),
            "1.2.840.113549.1.9.16.1.26"
        );
        assert_eq!(
            Oid(&[43, 6, 1, 5, 5, 7, 48, 10][..]).to_string(),
            "1.3.6.1.5.5.7.48.10"
        );
    }
}
