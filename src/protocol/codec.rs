//! Frame codec for the test host control connection
//!
//! A frame is laid out the way .NET's `BinaryWriter.Write(string)` writes a
//! string: the body length as an unsigned LEB128 integer (seven bits per byte,
//! high bit set on every byte but the last) followed by the UTF-8 body.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::error::ChannelError;

/// Largest frame body accepted in either direction
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// A 32-bit length never needs more than five 7-bit groups
const MAX_PREFIX_LEN: usize = 5;

/// Appends one frame carrying `body` to `dst`.
pub fn encode_frame(body: &[u8], dst: &mut BytesMut) -> Result<(), ChannelError> {
    if body.len() > MAX_FRAME_LEN {
        return Err(ChannelError::MalformedFrame(format!(
            "frame body of {} bytes exceeds the {} byte limit",
            body.len(),
            MAX_FRAME_LEN
        )));
    }

    dst.reserve(body.len() + MAX_PREFIX_LEN);

    let mut len = body.len();
    while len >= 0x80 {
        dst.put_u8((len as u8) | 0x80);
        len >>= 7;
    }
    dst.put_u8(len as u8);
    dst.put_slice(body);

    Ok(())
}

/// Removes one complete frame from the front of `src`.
///
/// Returns `Ok(None)` while the buffered bytes do not yet hold a whole frame;
/// `src` is left untouched in that case.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Bytes>, ChannelError> {
    let mut len: u64 = 0;
    let mut prefix_len = 0;

    loop {
        if prefix_len == MAX_PREFIX_LEN {
            return Err(ChannelError::MalformedFrame(
                "length prefix longer than 5 bytes".to_string(),
            ));
        }
        let Some(&byte) = src.get(prefix_len) else {
            return Ok(None);
        };

        len |= u64::from(byte & 0x7f) << (7 * prefix_len);
        prefix_len += 1;

        if byte & 0x80 == 0 {
            break;
        }
    }

    if len > MAX_FRAME_LEN as u64 {
        return Err(ChannelError::MalformedFrame(format!(
            "frame body of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_LEN
        )));
    }

    let len = len as usize;
    if src.len() < prefix_len + len {
        src.reserve(prefix_len + len - src.len());
        return Ok(None);
    }

    let _ = src.split_to(prefix_len);
    Ok(Some(src.split_to(len).freeze()))
}

/// [`Decoder`]/[`Encoder`] pair for use with `tokio_util::codec::Framed`
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ChannelError> {
        decode_frame(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ChannelError> {
        match decode_frame(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ChannelError::MalformedFrame(format!(
                "stream ended inside a frame ({} bytes pending)",
                src.len()
            ))),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ChannelError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<(), ChannelError> {
        encode_frame(&body, dst)
    }
}
