//! # Shared protocol
//!
//! Everything the server and the client agree on: the registered tag table,
//! the `Message` type, the TLV payload codec and the length-prefixed framing
//! used on the TCP stream, exposed as a `tokio_util` codec.
//!
//! ## Wire format
//!
//! Every frame is a 10-byte ASCII decimal length (left-justified, space
//! padded) followed by that many payload bytes. The payload is a sequence of
//! `tag + length + value` records. Values are padded to an even length with
//! [`PAD_CHAR`]; list values are joined with [`LIST_DELIMITER`] before padding.
//! Neither character may appear inside a value.
//!
//! ## Usage
//!
//! ```rust
//! use shared::{decode, encode, Message, Tag};
//!
//! let msg = Message::single(Tag::Nickname, "alice");
//! let frame = encode(&msg).unwrap();
//! assert_eq!(decode(&frame).unwrap(), msg);
//! ```

pub mod codec;
pub mod error;
pub mod message;
pub mod tag;

pub use codec::{
    decode, encode, message_reader, message_writer, read_message, MessageReader, MessageWriter,
    TlvCodec,
};
pub use error::CodecError;
pub use message::Message;
pub use tag::Tag;

/// Reserved character used to pad odd-length values
pub const PAD_CHAR: char = '|';

/// Reserved character separating items of a list value
pub const LIST_DELIMITER: char = ',';

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 65432;

/// Capacity of the client's reader-to-foreground queue
pub const PIPELINE_CAPACITY: usize = 50;

/// Figures owned by each player
pub const FIGURES_PER_PLAYER: u8 = 4;

/// Placeholder value for requests that carry no payload
pub const EMPTY_VALUE: &str = "-";

/// Nicknames identify players case-insensitively, both for uniqueness on the
/// server and for matching NEWTURN on the client
pub fn same_nickname(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
