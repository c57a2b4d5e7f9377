//! IP addresses in their RFC 3779 encoding.
//!
//! Certificates and ROAs carry IP address prefixes as bit strings: the
//! number of unused bits in the final octet followed by the minimum number
//! of octets needed to cover the prefix. The types herein decode that
//! encoding, keep it in canonical form, and format it back into the usual
//! human-readable notation.

use std::{fmt, io};
use untrusted::Reader;
use crate::binio::{Compose, Parse, ParseError};
use crate::der::{self, BitString, Error};


//------------ AddressFamily -------------------------------------------------

/// The address family of an address block.
///
/// RFC 6487 limits the families to IPv4 and IPv6 and prohibits the
/// optional SAFI octet, so the encoded family is always exactly two
/// octets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Parses the addressFamily OCTET STRING of a resource block.
    pub fn take_from(reader: &mut Reader) -> Result<Self, Error> {
        let content = der::parse_octet_string(reader)?;
        match content.as_slice_less_safe() {
            [0, 1] => Ok(AddressFamily::Ipv4),
            [0, 2] => Ok(AddressFamily::Ipv6),
            _ => Err(Error::Malformed),
        }
    }

    /// The address family identifier: 1 for IPv4, 2 for IPv6.
    pub fn afi(self) -> u16 {
        match self {
            AddressFamily::Ipv4 => 1,
            AddressFamily::Ipv6 => 2,
        }
    }

    pub fn from_afi(afi: u16) -> Option<Self> {
        match afi {
            1 => Some(AddressFamily::Ipv4),
            2 => Some(AddressFamily::Ipv6),
            _ => None,
        }
    }

    /// The width of an address in octets.
    pub fn width(self) -> usize {
        match self {
            AddressFamily::Ipv4 => 4,
            AddressFamily::Ipv6 => 16,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AddressFamily::Ipv4 => f.write_str("IPv4"),
            AddressFamily::Ipv6 => f.write_str("IPv6"),
        }
    }
}


//------------ IpAddr --------------------------------------------------------

/// An IP address prefix in canonical prefix form.
///
/// Only the octets covering the prefix are kept; `unused` gives the number
/// of insignificant bits in the final octet. The value is canonical: all
/// unused bits are zero. A value with zero octets is the zero-length
/// prefix covering the entire address space.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IpAddr {
    family: AddressFamily,
    addr: [u8; 16],
    len: u8,
    unused: u8,
}

impl IpAddr {
    /// Creates an address from its encoded parts, enforcing canonicality.
    pub fn new(
        family: AddressFamily,
        octets: &[u8],
        unused: u8
    ) -> Result<Self, Error> {
        if octets.len() > family.width() || unused > 7 {
            return Err(Error::Malformed)
        }
        if octets.is_empty() {
            if unused != 0 {
                return Err(Error::Malformed)
            }
        }
        else if octets[octets.len() - 1] & ((1u8 << unused) - 1) != 0 {
            // Trailing bits beyond the prefix length must be zero.
            return Err(Error::Malformed)
        }
        let mut addr = [0u8; 16];
        addr[..octets.len()].copy_from_slice(octets);
        Ok(IpAddr { family, addr, len: octets.len() as u8, unused })
    }

    /// Creates an address from a decoded BIT STRING.
    pub fn from_bits(
        family: AddressFamily,
        bits: BitString
    ) -> Result<Self, Error> {
        Self::new(family, bits.octets(), bits.unused())
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn octets(&self) -> &[u8] {
        &self.addr[..self.len as usize]
    }

    pub fn unused(&self) -> u8 {
        self.unused
    }

    /// The length of the prefix in bits.
    pub fn prefix_len(&self) -> u8 {
        self.len * 8 - self.unused
    }

    /// The lowest address covered by the prefix.
    ///
    /// Addresses of both families are expanded into the upper bits of a
    /// `u128` so the same arithmetic works for either.
    pub fn min(&self) -> u128 {
        let mut res = 0u128;
        for &octet in self.octets() {
            res = (res << 8) | u128::from(octet);
        }
        res << ((16 - self.len as usize) * 8)
    }

    /// The highest address covered by the prefix.
    pub fn max(&self) -> u128 {
        if self.len == 0 {
            return !0
        }
        let mut res = 0u128;
        for &octet in self.octets() {
            res = (res << 8) | u128::from(octet);
        }
        res |= u128::from((1u8 << self.unused) - 1);
        for _ in self.len as usize..16 {
            res = (res << 8) | 0xFF;
        }
        res
    }

    /// The full address range covered by the prefix.
    pub fn range(&self) -> (u128, u128) {
        (self.min(), self.max())
    }

    /// Formats the address.
    ///
    /// With `set_unused`, the insignificant bits of the final octet are
    /// printed as ones. That form is used for the upper endpoint of a
    /// range.
    fn fmt_endpoint(
        &self,
        f: &mut fmt::Formatter,
        set_unused: bool
    ) -> fmt::Result {
        let len = self.len as usize;
        let mut octets = self.addr;
        if set_unused && len > 0 {
            octets[len - 1] |= (1u8 << self.unused) - 1;
        }
        match self.family {
            AddressFamily::Ipv4 => {
                if len == 0 {
                    f.write_str("0")?;
                }
                for (i, octet) in octets[..len].iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write!(f, "{}", octet)?;
                }
            }
            AddressFamily::Ipv6 => {
                if len == 0 {
                    f.write_str("0")?;
                }
                // An odd trailing octet forms a group with an implied
                // zero low octet.
                for i in 0..(len + 1) / 2 {
                    let hi = octets[i * 2];
                    let lo = if i * 2 + 1 < len { octets[i * 2 + 1] }
                             else { 0 };
                    if i > 0 {
                        f.write_str(":")?;
                    }
                    write!(f, "{:x}", (u16::from(hi) << 8) | u16::from(lo))?;
                }
            }
        }
        if len < self.family.width() || self.unused != 0 {
            write!(f, "/{}", self.prefix_len())?;
        }
        Ok(())
    }
}

impl fmt::Display for IpAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_endpoint(f, false)
    }
}


//------------ IpAddrRange ---------------------------------------------------

/// A range of addresses given by its two endpoints.
///
/// Both endpoints are kept in canonical prefix form; the upper endpoint
/// covers addresses up to and including its [`IpAddr::max`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IpAddrRange {
    min: IpAddr,
    max: IpAddr,
}

impl IpAddrRange {
    pub fn new(min: IpAddr, max: IpAddr) -> Result<Self, Error> {
        if min.family != max.family || min.min() > max.max() {
            return Err(Error::Malformed)
        }
        Ok(IpAddrRange { min, max })
    }

    pub fn family(&self) -> AddressFamily {
        self.min.family
    }

    pub fn min(&self) -> &IpAddr {
        &self.min
    }

    pub fn max(&self) -> &IpAddr {
        &self.max
    }

    /// The full address range covered.
    pub fn range(&self) -> (u128, u128) {
        (self.min.min(), self.max.max())
    }
}

impl fmt::Display for IpAddrRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.min.fmt_endpoint(f, false)?;
        f.write_str("--")?;
        self.max.fmt_endpoint(f, true)
    }
}


//------------ Serialization -------------------------------------------------

impl<W: io::Write> Compose<W> for IpAddr {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        (self.family.afi() as u8).compose(target)?;
        self.len.compose(target)?;
        self.unused.compose(target)?;
        target.write_all(self.octets())
    }
}

impl<R: io::Read> Parse<R> for IpAddr {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let family = AddressFamily::from_afi(
            u8::parse(source)?.into()
        ).ok_or_else(|| ParseError::format("illegal address family"))?;
        let len = usize::from(u8::parse(source)?);
        if len > family.width() {
            return Err(ParseError::format("illegal prefix length"))
        }
        let unused = u8::parse(source)?;
        let mut octets = [0u8; 16];
        source.read_exact(&mut octets[..len])?;
        IpAddr::new(family, &octets[..len], unused).map_err(|_| {
            ParseError::format("illegal address prefix")
        })
    }
}

impl<W: io::Write> Compose<W> for IpAddrRange {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        self.min.compose(target)?;
        self.max.compose(target)
    }
}

impl<R: io::Read> Parse<R> for IpAddrRange {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let min = IpAddr::parse(source)?;
        let max = IpAddr::parse(source)?;
        IpAddrRange::new(min, max).map_err(|_| {
            ParseError::format("illegal address range")
        })
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(family: AddressFamily, octets: &[u8], unused: u8) -> IpAddr {
        IpAddr::new(family, octets, unused).unwrap()
    }

    #[test]
    fn print_v4() {
        assert_eq!(
            addr(
                AddressFamily::Ipv4, &[0x0a, 0x05, 0x00, 0x04], 0
            ).to_string(),
            "10.5.0.4"
        );
        assert_eq!(
            addr(AddressFamily::Ipv4, &[0x0a, 0x05, 0x00], 1).to_string(),
            "10.5.0/23"
        );
        assert_eq!(
            addr(AddressFamily::Ipv4, &[], 0).to_string(),
            "0/0"
        );
        assert_eq!(
            addr(AddressFamily::Ipv4, &[0x0a, 0x40], 4).to_string(),
            "10.64/12"
        );
        assert_eq!(
            addr(AddressFamily::Ipv4, &[0x0a, 0x40, 0x00], 4).to_string(),
            "10.64.0/20"
        );
    }

    #[test]
    fn print_v6() {
        assert_eq!(
            addr(
                AddressFamily::Ipv6,
                &[0x20, 0x01, 0x00, 0x00, 0x02, 0x00, 0x00, 0x03,
                  0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01],
                0
            ).to_string(),
            "2001:0:200:3:0:0:0:1"
        );
        assert_eq!(
            addr(
                AddressFamily::Ipv6,
                &[0x20, 0x01, 0x00, 0x00, 0x02], 1
            ).to_string(),
            "2001:0:200/39"
        );
    }

    #[test]
    fn reject_nonzero_trailing_bits() {
        // The lowest bit of the final octet lies beyond the /23 prefix.
        assert!(
            IpAddr::new(AddressFamily::Ipv4, &[0x0a, 0x05, 0x01], 1).is_err()
        );
        assert!(
            IpAddr::new(AddressFamily::Ipv6, &[0x20, 0x01, 0x03], 2).is_err()
        );
    }

    #[test]
    fn reject_bad_shape() {
        // Too many octets for the family.
        assert!(
            IpAddr::new(
                AddressFamily::Ipv4, &[0x0a, 0x05, 0x00, 0x04, 0x01], 0
            ).is_err()
        );
        // More than seven unused bits.
        assert!(
            IpAddr::new(AddressFamily::Ipv4, &[0x0a, 0x05], 8).is_err()
        );
        // Unused bits on an empty prefix.
        assert!(IpAddr::new(AddressFamily::Ipv4, &[], 1).is_err());
    }

    #[test]
    fn canonical_form() {
        let addr = addr(AddressFamily::Ipv4, &[0x0a, 0x40], 4);
        let last = addr.octets()[1];
        assert_eq!(last & !((1u8 << addr.unused()) - 1), last);
    }

    #[test]
    fn range_endpoints() {
        let min = addr(AddressFamily::Ipv4, &[0x0a, 0x00], 0);
        let max = addr(AddressFamily::Ipv4, &[0x0a, 0x3f], 0);
        let range = IpAddrRange::new(min, max).unwrap();
        assert_eq!(range.to_string(), "10.0/16--10.63/16");

        // Unused bits of the upper endpoint print as ones.
        let max = addr(AddressFamily::Ipv4, &[0x0a, 0x3e], 1);
        let range = IpAddrRange::new(min, max).unwrap();
        assert_eq!(range.to_string(), "10.0/16--10.63/15");
    }

    #[test]
    fn range_order_and_family() {
        let low = addr(AddressFamily::Ipv4, &[0x0a, 0x00], 0);
        let high = addr(AddressFamily::Ipv4, &[0x0b, 0x00], 0);
        assert!(IpAddrRange::new(high, low).is_err());

        let v6 = addr(AddressFamily::Ipv6, &[0x20, 0x01], 0);
        assert!(IpAddrRange::new(low, v6).is_err());
    }

    #[test]
    fn write_read() {
        use crate::test::write_read;

        write_read(addr(AddressFamily::Ipv4, &[0x0a, 0x40], 4));
        write_read(addr(AddressFamily::Ipv6, &[0x20, 0x01], 0));
        write_read(addr(AddressFamily::Ipv4, &[], 0));
        write_read(IpAddrRange::new(
            addr(AddressFamily::Ipv4, &[0x0a, 0x00], 0),
            addr(AddressFamily::Ipv4, &[0x0a, 0x3f], 0),
        ).unwrap());
    }

    #[test]
    fn reject_noncanonical_frame() {
        use crate::binio::Parse;

        // family 1, two octets, one unused bit, but the low bit of the
        // final octet is set.
        let frame = [1u8, 2, 1, 0x0a, 0x41];
        let mut slice = &frame[..];
        assert!(IpAddr::parse(&mut slice).is_err());

        // Unknown address family.
        let frame = [3u8, 1, 0, 0x0a];
        let mut slice = &frame[..];
        assert!(IpAddr::parse(&mut slice).is_err());
    }

    #[test]
    fn numeric_range() {
        let addr = addr(AddressFamily::Ipv4, &[0x0a, 0x40], 4);
        assert_eq!(addr.min() >> 96, 0x0a40_0000);
        assert_eq!(addr.max() >> 96, 0x0a4f_ffff);

        let all = super::IpAddr::new(AddressFamily::Ipv4, &[], 0).unwrap();
        assert_eq!(all.min(), 0);
        assert_eq!(all.max(), !0);
    }
}
