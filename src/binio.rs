//! Simple binary data serialization.
//!
//! Parsed objects travel from a parser worker to the aggregating process
//! over a pipe. The traits [`Compose`] and [`Parse`] are implemented by
//! every type that crosses that boundary. The framing is deliberately
//! bare: little-endian fixed-width integers and length-prefixed byte
//! strings, fields in declaration order, no version field since both ends
//! are built from the same binary.
//!
//! The reader is strict. A short read, a length field beyond the sanity
//! limit, or an out-of-range tag value fails the frame, and a failed
//! frame means the channel is dead: no partial values are ever handed
//! out.

use std::{error, fmt, io, slice};
use bytes::Bytes;

/// The largest length-prefixed item the reader accepts.
///
/// Nothing the parsers produce comes close; a larger length means the
/// channel is corrupt.
const MAX_DATA_LEN: u64 = 1 << 24;


//------------ Compose + Parse -----------------------------------------------

pub trait Compose<W> {
    fn compose(&self, target: &mut W) -> Result<(), io::Error>;
}

pub trait Parse<R>
where Self: Sized {
    fn parse(source: &mut R) -> Result<Self, ParseError>;
}


//------------ u8 ------------------------------------------------------------

impl<W: io::Write> Compose<W> for u8 {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        target.write_all(slice::from_ref(self))
    }
}

impl<R: io::Read> Parse<R> for u8 {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let mut res = 0u8;
        source.read_exact(slice::from_mut(&mut res))?;
        Ok(res)
    }
}


//------------ u32 -----------------------------------------------------------

impl<W: io::Write> Compose<W> for u32 {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        target.write_all(&self.to_le_bytes())
    }
}

impl<R: io::Read> Parse<R> for u32 {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let mut res = 0u32.to_ne_bytes();
        source.read_exact(&mut res)?;
        Ok(u32::from_le_bytes(res))
    }
}


//------------ u64 -----------------------------------------------------------

impl<W: io::Write> Compose<W> for u64 {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        target.write_all(&self.to_le_bytes())
    }
}

impl<R: io::Read> Parse<R> for u64 {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let mut res = 0u64.to_ne_bytes();
        source.read_exact(&mut res)?;
        Ok(u64::from_le_bytes(res))
    }
}


//------------ i64 -----------------------------------------------------------

impl<W: io::Write> Compose<W> for i64 {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        target.write_all(&self.to_le_bytes())
    }
}

impl<R: io::Read> Parse<R> for i64 {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let mut res = 0i64.to_ne_bytes();
        source.read_exact(&mut res)?;
        Ok(i64::from_le_bytes(res))
    }
}


//------------ String --------------------------------------------------------
//
// Encoded as a u64 for the length and then that many bytes, no
// terminator.

impl<W: io::Write> Compose<W> for String {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        (self.len() as u64).compose(target)?;
        target.write_all(self.as_bytes())
    }
}

impl<R: io::Read> Parse<R> for String {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        let bits = parse_block(source)?;
        String::from_utf8(bits).map_err(|_| {
            ParseError::format("illegal UTF-8 in string")
        })
    }
}


//------------ Option<String> ------------------------------------------------
//
// Encoding starts with a single octet marking the option. If this is 0,
// the option is `None` and nothing follows. If this is 1, the option is
// `Some(_)` and the value follows.

impl<W: io::Write> Compose<W> for Option<String> {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        match *self {
            Some(ref value) => {
                1u8.compose(target)?;
                value.compose(target)
            }
            None => 0u8.compose(target)
        }
    }
}

impl<R: io::Read> Parse<R> for Option<String> {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        match u8::parse(source)? {
            0 => Ok(None),
            1 => String::parse(source).map(Some),
            _ => Err(ParseError::format("illegally encoded option"))
        }
    }
}


//------------ Bytes ---------------------------------------------------------
//
// Encoded as a u64 for the length and then that many bytes.

impl<W: io::Write> Compose<W> for Bytes {
    fn compose(&self, target: &mut W) -> Result<(), io::Error> {
        (self.len() as u64).compose(target)?;
        target.write_all(self.as_ref())
    }
}

impl<R: io::Read> Parse<R> for Bytes {
    fn parse(source: &mut R) -> Result<Self, ParseError> {
        parse_block(source).map(Into::into)
    }
}

/// Reads a length-prefixed block of bytes.
fn parse_block<R: io::Read>(source: &mut R) -> Result<Vec<u8>, ParseError> {
    let len = u64::parse(source)?;
    if len > MAX_DATA_LEN {
        return Err(ParseError::format("excessively large data block"))
    }
    let mut bits = vec![0u8; len as usize];
    source.read_exact(&mut bits)?;
    Ok(bits)
}


//------------ ParseError ----------------------------------------------------

/// Reading a value off the channel failed.
///
/// Whatever the cause, the channel is considered failed as a whole;
/// there is no way to resynchronize on a frame boundary.
#[derive(Debug)]
pub struct ParseError {
    err: io::Error,
}

impl ParseError {
    /// Creates an error for bad framing.
    pub fn format(
        err: impl Into<Box<dyn error::Error + Send + Sync>>
    ) -> Self {
        ParseError {
            err: io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        ParseError { err }
    }
}

impl From<ParseError> for io::Error {
    fn from(err: ParseError) -> Self {
        err.err
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.err.fmt(f)
    }
}


//============ Testing =======================================================
