//! TLV payload encoding and length-prefixed framing
//!
//! Wire layout of one frame:
//!
//! ```text
//! [10-byte ASCII decimal length, left-justified, space padded][payload]
//! payload = record*
//! record  = tag (4 ASCII chars) + length + value
//! ```
//!
//! Values are always even in length: an odd value gets a single pad character
//! prepended. The record length counts two-byte units and is written in hex,
//! `XX` below 0x80, `81XX` up to 0xFF and `82XXXX` up to 0xFFFF.
//!
//! `TlvCodec` plugs the format into `tokio_util::codec`, so sockets are read
//! through `FramedRead` and written through `FramedWrite`.

use crate::error::CodecError;
use crate::message::Message;
use crate::tag::{Tag, TAG_LEN};
use crate::PAD_CHAR;
use bytes::{Buf, BufMut, BytesMut};
use futures::{Stream, StreamExt};
use log::{trace, warn};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

/// Size of the decimal length header in front of every payload
pub const HEADER_LEN: usize = 10;

/// Upper bound on a payload. Protects against allocating for garbage headers.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Largest value a record length field can describe
pub const MAX_VALUE_LEN: usize = 2 * 0xFFFF;

/// Serializes the records of a message without the frame header
pub fn encode_payload(message: &Message) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::new();

    for (tag, value) in message.iter() {
        if value.contains(PAD_CHAR) {
            return Err(CodecError::ReservedCharacter { tag });
        }

        let mut padded = String::with_capacity(value.len() + 1);
        if value.len() % 2 == 1 {
            padded.push(PAD_CHAR);
        }
        padded.push_str(value);

        if padded.len() > MAX_VALUE_LEN {
            return Err(CodecError::ValueTooLong {
                tag,
                len: value.len(),
            });
        }

        payload.extend_from_slice(tag.code().as_bytes());
        payload.extend_from_slice(encode_length(padded.len() / 2).as_bytes());
        payload.extend_from_slice(padded.as_bytes());
    }

    Ok(payload)
}

/// Serializes a message into a complete frame
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let mut frame = BytesMut::new();
    TlvCodec::new().encode(message, &mut frame)?;
    Ok(frame.to_vec())
}

/// Decodes exactly one complete frame
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    let mut buf = BytesMut::from(bytes);
    match TlvCodec::new().decode(&mut buf)? {
        Some(message) if buf.is_empty() => Ok(message),
        Some(_) => Err(CodecError::Frame("trailing bytes after frame".into())),
        None => Err(CodecError::ConnectionClosed),
    }
}

/// Decodes a payload (records only, no header)
pub fn decode_payload(payload: &[u8]) -> Result<Message, CodecError> {
    let mut message = Message::new();
    let mut pos = 0;

    while pos < payload.len() {
        let code = payload
            .get(pos..pos + TAG_LEN)
            .ok_or_else(|| CodecError::Frame("truncated tag".into()))?;
        let code = std::str::from_utf8(code)
            .map_err(|_| CodecError::Frame("tag is not ASCII".into()))?;
        pos += TAG_LEN;

        let (units, consumed) = decode_length(&payload[pos..])?;
        pos += consumed;

        let value_len = units * 2;
        let raw = payload
            .get(pos..pos + value_len)
            .ok_or_else(|| CodecError::Frame(format!("truncated value for tag {}", code)))?;
        pos += value_len;

        let value = std::str::from_utf8(raw)
            .map_err(|_| CodecError::Frame(format!("value for tag {} is not UTF-8", code)))?;
        let value = value.strip_prefix(PAD_CHAR).unwrap_or(value);

        match code.parse::<Tag>() {
            Ok(tag) => message.insert(tag, value),
            Err(e) => warn!("Skipping record: {}", e),
        }
    }

    Ok(message)
}

fn encode_length(units: usize) -> String {
    if units < 0x80 {
        format!("{:02X}", units)
    } else if units <= 0xFF {
        format!("81{:02X}", units)
    } else {
        format!("82{:04X}", units)
    }
}

/// Returns (length in two-byte units, bytes consumed)
fn decode_length(bytes: &[u8]) -> Result<(usize, usize), CodecError> {
    let first = parse_hex(bytes, 0, 2)?;
    match first {
        0x81 => Ok((parse_hex(bytes, 2, 2)?, 4)),
        0x82 => Ok((parse_hex(bytes, 2, 4)?, 6)),
        n if n < 0x80 => Ok((n, 2)),
        n => Err(CodecError::Frame(format!("invalid length prefix {:02X}", n))),
    }
}

fn parse_hex(bytes: &[u8], start: usize, width: usize) -> Result<usize, CodecError> {
    let digits = bytes
        .get(start..start + width)
        .ok_or_else(|| CodecError::Frame("truncated length field".into()))?;
    let digits = std::str::from_utf8(digits)
        .map_err(|_| CodecError::Frame("length field is not ASCII".into()))?;
    usize::from_str_radix(digits, 16)
        .map_err(|_| CodecError::Frame(format!("invalid length field {:?}", digits)))
}

fn parse_header(header: &[u8], max_len: usize) -> Result<usize, CodecError> {
    let text = std::str::from_utf8(header)
        .map_err(|_| CodecError::Frame("length header is not ASCII".into()))?;
    let len = text
        .trim()
        .parse::<usize>()
        .map_err(|_| CodecError::Frame(format!("invalid length header {:?}", text)))?;
    if len > max_len {
        return Err(CodecError::Frame(format!(
            "frame of {} bytes exceeds {}",
            len, max_len
        )));
    }
    Ok(len)
}

/// `tokio_util` codec for whole messages: the 10-byte decimal header plus
/// TLV records
#[derive(Debug, Clone)]
pub struct TlvCodec {
    max_frame_len: usize,
}

impl TlvCodec {
    pub fn new() -> Self {
        Self {
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    pub fn with_max_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for TlvCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TlvCodec {
    type Item = Message;
    type Error = CodecError;

    /// A malformed header is reported as soon as all 10 bytes are present
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = parse_header(&src[..HEADER_LEN], self.max_frame_len)?;
        let total = HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len);
        let message = decode_payload(&payload)?;
        trace!("Decoded frame of {} bytes: {:?}", len, message);
        Ok(Some(message))
    }

    /// EOF between frames ends the stream; EOF inside a frame is a closed
    /// connection, not a malformed frame
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => {
                warn!(
                    "Stream closed with {} bytes of an incomplete frame",
                    src.len()
                );
                src.clear();
                Err(CodecError::ConnectionClosed)
            }
        }
    }
}

impl<'a> Encoder<&'a Message> for TlvCodec {
    type Error = CodecError;

    fn encode(&mut self, message: &'a Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let payload = encode_payload(message)?;
        if payload.len() > self.max_frame_len {
            return Err(CodecError::Frame(format!(
                "payload of {} bytes exceeds {}",
                payload.len(),
                self.max_frame_len
            )));
        }

        let header = format!("{:<width$}", payload.len(), width = HEADER_LEN);
        dst.reserve(header.len() + payload.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&payload);
        Ok(())
    }
}

/// Read half of a socket yielding whole messages
pub type MessageReader<R> = FramedRead<R, TlvCodec>;

/// Write half of a socket accepting whole messages through `SinkExt::send`
pub type MessageWriter<W> = FramedWrite<W, TlvCodec>;

pub fn message_reader<R: tokio::io::AsyncRead>(reader: R) -> MessageReader<R> {
    FramedRead::new(reader, TlvCodec::new())
}

pub fn message_writer<W: tokio::io::AsyncWrite>(writer: W) -> MessageWriter<W> {
    FramedWrite::new(writer, TlvCodec::new())
}

/// Waits for the next message on a framed stream. The end of the stream is
/// `ConnectionClosed`.
///
/// Cancel safe: the framed reader keeps partial frames in its own buffer, so
/// dropping this future inside `select!` loses nothing.
pub async fn read_message<S>(stream: &mut S) -> Result<Message, CodecError>
where
    S: Stream<Item = Result<Message, CodecError>> + Unpin,
{
    stream.next().await.unwrap_or(Err(CodecError::ConnectionClosed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use tokio_test::io::Builder;

    fn sample() -> Message {
        Message::single(Tag::Ok, "Rolled a six")
            .with(Tag::RollDiceResult, "6")
            .with_list(Tag::OptionMove, &["1", "2"])
            .with_list(Tag::OptionPut, &["3"])
    }

    #[test]
    fn test_encode_single_even_value() {
        let frame = encode(&Message::single(Tag::Nickname, "alice1")).unwrap();
        assert_eq!(frame, b"12        000103alice1".to_vec());
    }

    #[test]
    fn test_encode_pads_odd_value() {
        let frame = encode(&Message::single(Tag::Nickname, "alice")).unwrap();
        assert_eq!(frame, b"12        000103|alice".to_vec());

        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.get(Tag::Nickname), Some("alice"));
    }

    #[test]
    fn test_empty_value() {
        let msg = Message::single(Tag::OptionSkip, "");
        let frame = encode(&msg).unwrap();
        assert_eq!(frame, b"6         600200".to_vec());
        assert_eq!(decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_roundtrip_multi_tag() {
        let msg = sample();
        assert_eq!(decode(&encode(&msg).unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_roundtrip_long_values() {
        let medium = "m".repeat(200);
        let long = "l".repeat(1001);
        let msg = Message::single(Tag::Info, long.clone()).with(Tag::Ok, medium.clone());
        let payload = encode_payload(&msg).unwrap();

        // 0100 + 82 01F5 + "|" + 1001 chars, then 1111 + 64 + 200 chars
        assert_eq!(&payload[..10], b"01008201F5");
        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded.get(Tag::Info), Some(long.as_str()));
        assert_eq!(decoded.get(Tag::Ok), Some(medium.as_str()));
    }

    #[test]
    fn test_rejects_pad_character() {
        let msg = Message::single(Tag::Nickname, "al|ce");
        match encode(&msg) {
            Err(CodecError::ReservedCharacter { tag }) => assert_eq!(tag, Tag::Nickname),
            other => panic!("expected reserved character error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_oversized_value() {
        let msg = Message::single(Tag::Info, "x".repeat(MAX_VALUE_LEN + 2));
        assert!(matches!(
            encode(&msg),
            Err(CodecError::ValueTooLong { tag: Tag::Info, .. })
        ));
    }

    #[test]
    fn test_non_numeric_header() {
        let mut buf = BytesMut::from(&b"abc       000103|bob"[..]);
        assert!(matches!(
            TlvCodec::new().decode(&mut buf),
            Err(CodecError::Frame(_))
        ));
    }

    #[test]
    fn test_header_above_limit() {
        let mut codec = TlvCodec::with_max_len(8);
        let mut buf = BytesMut::from(&b"12        000103|alice"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(CodecError::Frame(_))));
        assert_eq!(codec.max_frame_len(), 8);
    }

    #[test]
    fn test_truncated_record_is_frame_error() {
        // header claims 8 bytes, record claims 3 units but carries 2 bytes
        let bytes = b"8         000103ab";
        assert!(matches!(decode(bytes), Err(CodecError::Frame(_))));
    }

    #[test]
    fn test_unknown_tag_is_skipped() {
        let mut payload = b"999901ab".to_vec();
        payload.extend_from_slice(&encode_payload(&Message::single(Tag::Info, "hi")).unwrap());
        let msg = decode_payload(&payload).unwrap();
        assert_eq!(msg.len(), 1);
        assert_eq!(msg.get(Tag::Info), Some("hi"));
    }

    #[test]
    fn test_decoder_partial_chunks() {
        let msg = sample();
        let frame = encode(&msg).unwrap();

        for chunk_size in [1, 3, 7, 10, 11, frame.len()] {
            let mut codec = TlvCodec::new();
            let mut buf = BytesMut::new();
            let mut decoded = None;
            for chunk in frame.chunks(chunk_size) {
                assert!(decoded.is_none());
                buf.extend_from_slice(chunk);
                decoded = codec.decode(&mut buf).unwrap();
            }
            assert_eq!(decoded, Some(msg.clone()), "chunk size {}", chunk_size);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_decoder_back_to_back_frames() {
        let first = Message::single(Tag::NewTurn, "alice");
        let second = Message::single(Tag::Info, "board");
        let mut buf = BytesMut::new();
        let mut codec = TlvCodec::new();
        codec.encode(&first, &mut buf).unwrap();
        codec.encode(&second, &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(first));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(second));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_eof_mid_frame() {
        let frame = encode(&sample()).unwrap();
        let mut codec = TlvCodec::new();

        let mut empty = BytesMut::new();
        assert!(codec.decode_eof(&mut empty).unwrap().is_none());

        let mut partial = BytesMut::from(&frame[..frame.len() - 3]);
        assert!(matches!(
            codec.decode_eof(&mut partial),
            Err(CodecError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_reader_reassembles_short_reads() {
        let msg = sample();
        let frame = encode(&msg).unwrap();
        let (head, rest) = frame.split_at(4);
        let (middle, tail) = rest.split_at(9);

        let mock = Builder::new().read(head).read(middle).read(tail).build();
        let mut reader = message_reader(mock);
        assert_eq!(read_message(&mut reader).await.unwrap(), msg);
    }

    #[tokio::test]
    async fn test_reader_eof_between_frames() {
        let mut reader = message_reader(Builder::new().build());
        assert!(matches!(
            read_message(&mut reader).await,
            Err(CodecError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_reader_eof_mid_frame_is_closed_not_frame_error() {
        let frame = encode(&sample()).unwrap();
        let mock = Builder::new().read(&frame[..frame.len() - 3]).build();
        let mut reader = message_reader(mock);
        assert!(matches!(
            read_message(&mut reader).await,
            Err(CodecError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_writer_sends_whole_frame() {
        let msg = Message::single(Tag::Room, "3");
        let expected = encode(&msg).unwrap();
        let mut writer = message_writer(Builder::new().write(&expected).build());
        writer.send(&msg).await.unwrap();
    }
}
