//! Length-prefixed framing of protocol messages.
//!
//! Each frame is a single length byte followed by that many bytes of an
//! encoded [`Message`]. Raw bucket payloads are never framed.
use std::io::{self, ErrorKind, Read, Write};

use crate::error::{LoftError, Result};
use crate::protocol::Message;

/// Largest message body a frame can carry.
pub const MAX_FRAME_LEN: usize = u8::MAX as usize;

/// Encode `message`, write it behind its length byte and flush.
pub fn write_frame<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let body = message.encode();
    let len = u8::try_from(body.len()).map_err(|_| LoftError::FrameTooLarge(body.len()))?;
    writer.write_all(&[len])?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read and decode one frame.
///
/// Returns `Ok(None)` when the peer closed the stream on a frame boundary.
/// A stream that ends inside a frame is an error.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Message>> {
    let mut len = [0u8; 1];
    loop {
        match reader.read(&mut len) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // tls peers that hang up without close_notify
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    }
    let expected = len[0] as usize;
    let mut body = vec![0u8; expected];
    reader.read_exact(&mut body).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => LoftError::IOError(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("stream closed inside a {expected}-byte frame"),
        )),
        _ => LoftError::IOError(e),
    })?;
    Message::decode(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GetRequest, GetResponse, PutResponse};
    use std::io::Cursor;

    #[test]
    fn frame_is_length_then_body() {
        let message: Message = PutResponse::new(0).into();
        let mut out = Vec::new();
        write_frame(&mut out, &message).unwrap();
        assert_eq!(out[0] as usize, out.len() - 1);
        assert_eq!(&out[1..], message.encode().as_slice());
    }

    #[test]
    fn frames_read_back_in_order() {
        let first: Message = GetRequest::new("abcdef".parse().unwrap()).into();
        let second: Message = GetResponse::new(0, 12).into();
        let mut out = Vec::new();
        write_frame(&mut out, &first).unwrap();
        write_frame(&mut out, &second).unwrap();

        let mut reader = Cursor::new(out);
        assert_eq!(read_frame(&mut reader).unwrap(), Some(first));
        assert_eq!(read_frame(&mut reader).unwrap(), Some(second));
        assert_eq!(read_frame(&mut reader).unwrap(), None);
    }

    #[test]
    fn eof_inside_frame_is_an_error() {
        let mut out = Vec::new();
        write_frame(&mut out, &GetResponse::new(0, 12).into()).unwrap();
        out.truncate(5);
        let err = read_frame(&mut Cursor::new(out)).unwrap_err();
        assert!(matches!(err, LoftError::IOError(e) if e.kind() == ErrorKind::UnexpectedEof));
    }

    #[test]
    fn short_length_prefix_is_truncation() {
        // declares 4 bytes: a header fragment
        let bytes = vec![4, 0, 0, 0x03, 0xe8];
        let err = read_frame(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, LoftError::TruncatedMessage { .. }));
    }

    #[test]
    fn unknown_type_in_frame() {
        let bytes = vec![8, 0, 0, 0, 42, 0, 0, 0, 1];
        let err = read_frame(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, LoftError::UnmappedMessageType(42)));
    }
}
