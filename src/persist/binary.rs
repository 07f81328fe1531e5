//! Binary encoding of [`DataDict`] trees.
//!
//! Every value is a one-byte type id followed by its payload. Scalars are big-endian, strings
//! are a `u16` byte length plus UTF-8, collections are an `i32` element count.

use std::io::{Read, Write};

use crate::foundation::error::{ReelError, ReelResult};
use crate::persist::data::{DataDict, DataValue};

const TAG_DICT: u8 = 1;
const TAG_LIST: u8 = 2;
const TAG_BYTE: u8 = 3;
const TAG_SHORT: u8 = 4;
const TAG_INT: u8 = 5;
const TAG_LONG: u8 = 6;
const TAG_FLOAT: u8 = 7;
const TAG_DOUBLE: u8 = 8;
const TAG_STRING: u8 = 9;
const TAG_BOOL: u8 = 10;
const TAG_BYTE_ARRAY: u8 = 11;
const TAG_INT_ARRAY: u8 = 12;
const TAG_LONG_ARRAY: u8 = 13;

const MAX_DEPTH: usize = 256;
// Upper bound on up-front allocation; longer collections still decode, they just grow.
const MAX_PREALLOC: usize = 4096;

impl DataDict {
    /// Encode this dictionary as a root value.
    pub fn write_to(&self, w: &mut impl Write) -> ReelResult<()> {
        w.write_all(&[TAG_DICT])?;
        write_dict(self, w)
    }

    /// Decode a root dictionary written by [`DataDict::write_to`].
    pub fn read_from(r: &mut impl Read) -> ReelResult<Self> {
        match read_u8(r)? {
            TAG_DICT => read_dict(r, 0),
            tag => Err(ReelError::serde(format!(
                "root value must be a dict, found tag {tag}"
            ))),
        }
    }

    pub fn to_bytes(&self) -> ReelResult<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    pub fn from_bytes(mut bytes: &[u8]) -> ReelResult<Self> {
        let dict = Self::read_from(&mut bytes)?;
        if !bytes.is_empty() {
            return Err(ReelError::serde(format!(
                "{} trailing bytes after root dict",
                bytes.len()
            )));
        }
        Ok(dict)
    }
}

fn tag_of(v: &DataValue) -> u8 {
    match v {
        DataValue::Dict(_) => TAG_DICT,
        DataValue::List(_) => TAG_LIST,
        DataValue::Byte(_) => TAG_BYTE,
        DataValue::Short(_) => TAG_SHORT,
        DataValue::Int(_) => TAG_INT,
        DataValue::Long(_) => TAG_LONG,
        DataValue::Float(_) => TAG_FLOAT,
        DataValue::Double(_) => TAG_DOUBLE,
        DataValue::String(_) => TAG_STRING,
        DataValue::Bool(_) => TAG_BOOL,
        DataValue::ByteArray(_) => TAG_BYTE_ARRAY,
        DataValue::IntArray(_) => TAG_INT_ARRAY,
        DataValue::LongArray(_) => TAG_LONG_ARRAY,
    }
}

fn write_count(len: usize, w: &mut impl Write) -> ReelResult<()> {
    let n = i32::try_from(len).map_err(|_| ReelError::serde("collection too large"))?;
    w.write_all(&n.to_be_bytes())?;
    Ok(())
}

fn write_string(s: &str, w: &mut impl Write) -> ReelResult<()> {
    let n = u16::try_from(s.len())
        .map_err(|_| ReelError::serde(format!("string of {} bytes is too long", s.len())))?;
    w.write_all(&n.to_be_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_dict(d: &DataDict, w: &mut impl Write) -> ReelResult<()> {
    write_count(d.len(), w)?;
    for (key, value) in d.iter() {
        write_string(key, w)?;
        w.write_all(&[tag_of(value)])?;
        write_payload(value, w)?;
    }
    Ok(())
}

fn write_payload(v: &DataValue, w: &mut impl Write) -> ReelResult<()> {
    match v {
        DataValue::Dict(d) => write_dict(d, w)?,
        DataValue::List(items) => {
            write_count(items.len(), w)?;
            for item in items {
                w.write_all(&[tag_of(item)])?;
                write_payload(item, w)?;
            }
        }
        DataValue::Byte(x) => w.write_all(&[*x])?,
        DataValue::Short(x) => w.write_all(&x.to_be_bytes())?,
        DataValue::Int(x) => w.write_all(&x.to_be_bytes())?,
        DataValue::Long(x) => w.write_all(&x.to_be_bytes())?,
        DataValue::Float(x) => w.write_all(&x.to_be_bytes())?,
        DataValue::Double(x) => w.write_all(&x.to_be_bytes())?,
        DataValue::String(s) => write_string(s, w)?,
        DataValue::Bool(b) => w.write_all(&[u8::from(*b)])?,
        DataValue::ByteArray(xs) => {
            write_count(xs.len(), w)?;
            w.write_all(xs)?;
        }
        DataValue::IntArray(xs) => {
            write_count(xs.len(), w)?;
            for x in xs {
                w.write_all(&x.to_be_bytes())?;
            }
        }
        DataValue::LongArray(xs) => {
            write_count(xs.len(), w)?;
            for x in xs {
                w.write_all(&x.to_be_bytes())?;
            }
        }
    }
    Ok(())
}

fn read_exact<const N: usize>(r: &mut impl Read) -> ReelResult<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u8(r: &mut impl Read) -> ReelResult<u8> {
    Ok(read_exact::<1>(r)?[0])
}

fn read_count(r: &mut impl Read) -> ReelResult<usize> {
    let n = i32::from_be_bytes(read_exact(r)?);
    usize::try_from(n).map_err(|_| ReelError::serde(format!("negative collection length {n}")))
}

fn read_string(r: &mut impl Read) -> ReelResult<String> {
    let n = u16::from_be_bytes(read_exact(r)?) as usize;
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| ReelError::serde(format!("invalid utf-8 string: {e}")))
}

fn read_dict(r: &mut impl Read, depth: usize) -> ReelResult<DataDict> {
    if depth > MAX_DEPTH {
        return Err(ReelError::serde("data tree nested too deeply"));
    }
    let n = read_count(r)?;
    let mut d = DataDict::new();
    for _ in 0..n {
        let key = read_string(r)?;
        let tag = read_u8(r)?;
        let value = read_payload(tag, r, depth + 1)?;
        d.set(key, value);
    }
    Ok(d)
}

fn read_payload(tag: u8, r: &mut impl Read, depth: usize) -> ReelResult<DataValue> {
    Ok(match tag {
        TAG_DICT => DataValue::Dict(read_dict(r, depth)?),
        TAG_LIST => {
            if depth > MAX_DEPTH {
                return Err(ReelError::serde("data tree nested too deeply"));
            }
            let n = read_count(r)?;
            let mut items = Vec::with_capacity(n.min(MAX_PREALLOC));
            for _ in 0..n {
                let tag = read_u8(r)?;
                items.push(read_payload(tag, r, depth + 1)?);
            }
            DataValue::List(items)
        }
        TAG_BYTE => DataValue::Byte(read_u8(r)?),
        TAG_SHORT => DataValue::Short(i16::from_be_bytes(read_exact(r)?)),
        TAG_INT => DataValue::Int(i32::from_be_bytes(read_exact(r)?)),
        TAG_LONG => DataValue::Long(i64::from_be_bytes(read_exact(r)?)),
        TAG_FLOAT => DataValue::Float(f32::from_be_bytes(read_exact(r)?)),
        TAG_DOUBLE => DataValue::Double(f64::from_be_bytes(read_exact(r)?)),
        TAG_STRING => DataValue::String(read_string(r)?),
        TAG_BOOL => DataValue::Bool(read_u8(r)? != 0),
        TAG_BYTE_ARRAY => {
            let n = read_count(r)?;
            let mut buf = Vec::with_capacity(n.min(MAX_PREALLOC));
            (&mut *r).take(n as u64).read_to_end(&mut buf)?;
            if buf.len() != n {
                return Err(ReelError::serde("truncated byte array"));
            }
            DataValue::ByteArray(buf)
        }
        TAG_INT_ARRAY => {
            let n = read_count(r)?;
            let mut xs = Vec::with_capacity(n.min(MAX_PREALLOC));
            for _ in 0..n {
                xs.push(i32::from_be_bytes(read_exact(r)?));
            }
            DataValue::IntArray(xs)
        }
        TAG_LONG_ARRAY => {
            let n = read_count(r)?;
            let mut xs = Vec::with_capacity(n.min(MAX_PREALLOC));
            for _ in 0..n {
                xs.push(i64::from_be_bytes(read_exact(r)?));
            }
            DataValue::LongArray(xs)
        }
        other => return Err(ReelError::serde(format!("unknown value tag {other}"))),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/persist/binary.rs"]
mod tests;
