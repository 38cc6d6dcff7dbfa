#![forbid(unsafe_code)]

//! Incremental keystroke parsing for Telnet-tunneled terminal sessions.
//!
//! Bytes arrive in whatever chunks the transport delivers; a
//! [`KeystrokeStream`] turns them into [`Keystroke`] events — ordinary
//! characters, `ESC X` sequences, ANSI control sequences, and Telnet
//! in-band commands — and buffers completed events until the consumer
//! fetches them one at a time. Telnet commands may appear in the middle of
//! any other sequence and are delimited transparently.
//!
//! The parser is byte-transparent: values above 0x7F pass through
//! unchanged, CSI parameters are delivered raw, and Telnet options are
//! delimited but never answered.
//!
//! # Example
//!
//! ```
//! use keywire_core::{KeystrokeKind, KeystrokeStream};
//!
//! let mut stream = KeystrokeStream::default();
//! stream.input(Some(b"a\x1b[3~"));
//!
//! let a = stream.get();
//! assert_eq!(a.kind, KeystrokeKind::Char);
//! assert_eq!(a.value, u32::from(b'a'));
//!
//! let delete = stream.get();
//! assert_eq!(delete.kind, KeystrokeKind::Csi);
//! assert_eq!(delete.value, u32::from(b'~'));
//! assert_eq!(delete.bytes(), b"3");
//!
//! assert!(stream.get().is_null());
//! ```

pub mod keystroke;
pub mod stream;
pub mod telnet;

pub use keystroke::{
    Keystroke, KeystrokeFlags, KeystrokeKind, KEYSTROKE_MAX_LEN, KNULL_EOF, KNULL_NOT_EOF,
};
pub use stream::KeystrokeStream;
