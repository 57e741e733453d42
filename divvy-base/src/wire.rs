//! Length-framed MessagePack encoding for tuples passed between master and worker.
//!
//! Each item is a 4-byte big-endian length prefix followed by a MessagePack-encoded
//! [`Tuple`], the same length-prefix shape used elsewhere in the corpus for framing
//! messages over a stream socket. MessagePack (rather than JSON) is used because the
//! value domain distinguishes byte strings from text strings, and MessagePack's `bin`
//! type carries raw bytes natively.

use crate::value::Tuple;
use std::io::{self, Read, Write};

/// Frames larger than this are rejected rather than allocated; real tuples are small,
/// and this guards against a corrupt or hostile length prefix driving an unbounded
/// allocation.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("frame length {0} exceeds maximum of {MAX_FRAME_LEN}")]
    FrameTooLarge(u32),
    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("MessagePack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

pub type WireResult<T> = std::result::Result<T, WireError>;

/// Serialize a tuple into a length-prefixed frame ready to be written whole.
pub fn encode(tuple: &Tuple) -> WireResult<Vec<u8>> {
    let payload = rmp_serde::to_vec(tuple)?;
    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| WireError::FrameTooLarge(u32::MAX))?;
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Write a single length-framed tuple to `w`.
pub fn write_tuple<W: Write>(w: &mut W, tuple: &Tuple) -> WireResult<()> {
    let framed = encode(tuple)?;
    w.write_all(&framed)?;
    Ok(())
}

/// Read a single length-framed tuple from `r`. Returns `Ok(None)` on a clean
/// end-of-stream encountered before any byte of the length prefix is read — the
/// signal a worker uses to recognize the listener has closed and it should exit.
pub fn read_tuple<R: Read>(r: &mut R) -> WireResult<Option<Tuple>> {
    let mut len_bytes = [0u8; 4];
    match read_exact_or_eof(r, &mut len_bytes)? {
        false => return Ok(None),
        true => {}
    }
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;
    let tuple: Tuple = rmp_serde::from_slice(&payload)?;
    Ok(Some(tuple))
}

/// Like `Read::read_exact`, but returns `Ok(false)` instead of erroring when zero
/// bytes were available before EOF (a clean, expected end-of-stream), and still
/// errors on a *partial* read followed by EOF (a truncated, unexpected frame).
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut read_so_far = 0;
    while read_so_far < buf.len() {
        match r.read(&mut buf[read_so_far..]) {
            Ok(0) => {
                if read_so_far == 0 {
                    return Ok(false);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated frame length prefix",
                ));
            }
            Ok(n) => read_so_far += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_tuple() {
        let tuple: Tuple = vec![
            Value::Int(7),
            Value::Str("hello".into()),
            Value::Bytes(vec![0, 1, 2, 255]),
            Value::Bool(true),
            Value::Float(1.5),
            Value::Seq(vec![Value::Int(1), Value::Int(2)]),
            Value::Map(vec![("k".into(), Value::Int(9))]),
        ];
        let framed = encode(&tuple).unwrap();
        let mut cursor = Cursor::new(framed);
        let decoded = read_tuple(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, tuple);
    }

    #[test]
    fn clean_eof_before_any_bytes_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_tuple(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncated_length_prefix_is_an_error() {
        let mut cursor = Cursor::new(vec![0u8, 1]);
        assert!(read_tuple(&mut cursor).is_err());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut bytes = (MAX_FRAME_LEN + 1).to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            read_tuple(&mut cursor),
            Err(WireError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn write_then_read_via_vec_buffer() {
        let tuple: Tuple = vec![Value::Str("just one thing".into())];
        let mut buf = Vec::new();
        write_tuple(&mut buf, &tuple).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_tuple(&mut cursor).unwrap().unwrap(), tuple);
    }
}
