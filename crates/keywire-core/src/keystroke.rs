#![forbid(unsafe_code)]

//! Keystroke event model.
//!
//! A [`Keystroke`] is the unit the stream hands to consumers: an ordinary
//! character, a single-character `ESC X` sequence, an ANSI control sequence
//! (`ESC [ ... X` or `CSI ... X`), a Telnet in-band command (`IAC ...`), or
//! the `Null` placeholder returned when nothing is available.
//!
//! # Per-kind semantics
//!
//! | kind   | `value`                      | `buf[..len]`                                    |
//! |--------|------------------------------|-------------------------------------------------|
//! | `Null` | [`KNULL_EOF`] / [`KNULL_NOT_EOF`] | unused                                     |
//! | `Char` | character code, 0 if no good | representation bytes, or raw bytes if no good   |
//! | `Esc`  | the byte X, 0 if end of input| X (empty if end of input)                       |
//! | `Csi`  | terminating byte X, 0 if bad | parameter bytes, NUL terminated                 |
//! | `Iac`  | command byte, 0 if end of input | command bytes, without lead IAC / trailing IAC SE |
//!
//! Malformed input never fails the stream; it surfaces here as the
//! [`KeystrokeFlags::BROKEN`] and [`KeystrokeFlags::TRUNCATED`] flags.

use bitflags::bitflags;

/// Capacity of the inline byte buffer carried by every keystroke and by the
/// in-progress sequence collectors. Anything longer is truncated.
pub const KEYSTROKE_MAX_LEN: usize = 8;

/// `value` of a `Null` keystroke while more input may still arrive.
pub const KNULL_NOT_EOF: u32 = 0;

/// `value` of a `Null` keystroke once input has ended and the stream has
/// been fully drained.
pub const KNULL_EOF: u32 = 1;

/// What a keystroke is.
///
/// The discriminants double as the type tags of the stream's internal FIFO
/// encoding; `Null` never appears in the FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum KeystrokeKind {
    /// Nothing available; `value` distinguishes "no data yet" from "end of
    /// input".
    #[default]
    Null = 0,

    /// An ordinary character, passed through byte-transparently.
    Char = 1,

    /// `ESC X` where X is a single character other than `[`.
    Esc = 2,

    /// `ESC [ ... X` or `CSI ... X` ANSI control sequence.
    Csi = 3,

    /// Telnet in-band command: `IAC X`, `IAC X O`, or `IAC SB O ... IAC SE`.
    Iac = 4,
}

impl KeystrokeKind {
    /// Decode a FIFO type tag.
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Null),
            1 => Some(Self::Char),
            2 => Some(Self::Esc),
            3 => Some(Self::Csi),
            4 => Some(Self::Iac),
            _ => None,
        }
    }
}

bitflags! {
    /// Status flags carried by a keystroke.
    ///
    /// The bit values are the corresponding bits of the FIFO record header,
    /// so a header byte decodes with `from_bits_truncate`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeystrokeFlags: u8 {
        /// The sequence ended unexpectedly or contained a disallowed byte.
        const BROKEN = 0x20;
        /// The sequence outgrew [`KEYSTROKE_MAX_LEN`]; only the leading
        /// bytes were kept.
        const TRUNCATED = 0x10;
    }
}

/// One decoded keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keystroke {
    /// What this keystroke is.
    pub kind: KeystrokeKind,

    /// Scalar value; see the module table for the per-kind meaning.
    pub value: u32,

    /// Zero or more of `BROKEN` / `TRUNCATED`.
    pub flags: KeystrokeFlags,

    /// Number of meaningful bytes in `buf`.
    pub len: usize,

    /// Inline payload; only `buf[..len]` is meaningful.
    pub buf: [u8; KEYSTROKE_MAX_LEN],
}

impl Keystroke {
    /// The `Null` keystroke: nothing available, possibly because the stream
    /// has ended.
    pub(crate) fn null(at_eof: bool) -> Self {
        Self {
            kind: KeystrokeKind::Null,
            value: if at_eof { KNULL_EOF } else { KNULL_NOT_EOF },
            flags: KeystrokeFlags::empty(),
            len: 0,
            buf: [0; KEYSTROKE_MAX_LEN],
        }
    }

    /// A well-formed one-byte keystroke (`Char` or `Esc`).
    pub(crate) fn single(kind: KeystrokeKind, u: u8) -> Self {
        let mut buf = [0; KEYSTROKE_MAX_LEN];
        buf[0] = u;
        Self {
            kind,
            value: u32::from(u),
            flags: KeystrokeFlags::empty(),
            len: 1,
            buf,
        }
    }

    /// True when no keystroke was available.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.kind == KeystrokeKind::Null
    }

    /// True when this is the `Null` keystroke that marks end of input.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.kind == KeystrokeKind::Null && self.value == KNULL_EOF
    }

    /// True when neither `BROKEN` nor `TRUNCATED` is set.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.flags.is_empty()
    }

    /// The meaningful payload bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Default for Keystroke {
    fn default() -> Self {
        Self::null(false)
    }
}
