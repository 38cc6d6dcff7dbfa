#![forbid(unsafe_code)]

//! Keystroke stream: incremental byte-to-keystroke parsing.
//!
//! Raw bytes arrive in arbitrary-sized chunks from a terminal that may be
//! tunneled through a Telnet transport. [`KeystrokeStream`] resolves them
//! into [`Keystroke`] events and buffers completed events in an internal
//! byte FIFO until the consumer fetches them with [`KeystrokeStream::get`].
//!
//! # Design
//!
//! The parser is a state machine with three interleaved concerns:
//!
//! - character framing (plain bytes, `ESC X`),
//! - ANSI control sequences (`ESC [ ... X` or a configurable one-byte CSI),
//! - Telnet `IAC` command extraction.
//!
//! Any of the three may suspend mid-sequence on a chunk boundary, and a
//! Telnet command may appear *inside* another partially-collected sequence.
//! Commands are invisible to the surrounding sequence: the `IAC` event is
//! emitted first and the interrupted sequence then carries on. Only one
//! level of interruption is possible, so a single saved collector suffices.
//!
//! # FIFO encoding
//!
//! A byte with the high bit clear is itself a complete simple character.
//! A byte with the high bit set starts a compound record:
//!
//! ```text
//! b7 = 1   compound marker
//! b6 = 0   reserved
//! b5       broken
//! b4       truncated
//! b3..b0   keystroke kind tag
//! ```
//!
//! followed by one length byte and that many payload bytes. Simple ASCII
//! therefore costs one byte, and everything else carries its own record
//! boundary without an out-of-band index.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::keystroke::{Keystroke, KeystrokeFlags, KeystrokeKind, KEYSTROKE_MAX_LEN};
use crate::telnet;

const ESC: u8 = 0x1B;

/// FIFO record header: compound marker bit.
const COMPOUND: u8 = 0x80;
/// FIFO record header: kind tag mask.
const KIND_MASK: u8 = 0x0F;

/// Initial FIFO allocation; plenty for an interactive burst.
const FIFO_CAPACITY: usize = 2000;

/// Collection state of an in-progress sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StreamState {
    /// Between keystrokes.
    #[default]
    Idle,
    /// Reserved: collecting a multi-byte character. Never entered.
    #[allow(dead_code)]
    CharMulti,
    /// Seen `ESC`, waiting for the next byte.
    Esc,
    /// Collecting an `ESC [` or CSI sequence.
    Csi,
    /// Seen `IAC X` with X ≥ SB, waiting for the option byte.
    IacOption,
    /// Inside `IAC SB <option> ...`, waiting for `IAC SE`.
    IacSub,
}

/// A sequence in the course of being collected.
///
/// `len` counts every byte of the sequence and may exceed the buffer;
/// writes stay bounded and the overflow surfaces as `TRUNCATED` when the
/// sequence is emitted.
#[derive(Debug, Clone, Copy, Default)]
struct Partial {
    state: StreamState,
    len: usize,
    raw: [u8; KEYSTROKE_MAX_LEN],
}

impl Partial {
    fn add_raw(&mut self, u: u8) {
        if self.len < KEYSTROKE_MAX_LEN {
            self.raw[self.len] = u;
        }
        self.len += 1;
    }

    /// Plant the sequence terminator as the last byte, over the last
    /// stored byte if the sequence outgrew the buffer. Returns whether it
    /// fit without overwriting anything.
    fn plant_terminator(&mut self, u: u8) -> bool {
        let mut at = self.len;
        self.len += 1;

        let fits = at < KEYSTROKE_MAX_LEN;
        if !fits {
            at = KEYSTROKE_MAX_LEN - 1;
        }
        self.raw[at] = u;
        fits
    }
}

/// Claim the steal slot, but only while stealing is armed.
fn claim<'k>(armed: bool, steal: &mut Option<&'k mut Keystroke>) -> Option<&'k mut Keystroke> {
    if armed {
        steal.take()
    } else {
        None
    }
}

/// Incremental keystroke parser with an embedded event FIFO.
///
/// One logical task owns a stream at a time; every call completes
/// synchronously after consuming its input. Feed bytes with
/// [`input`](Self::input) (or [`input_steal`](Self::input_steal) to divert
/// the next complete keystroke), then fetch events with
/// [`get`](Self::get).
#[derive(Debug)]
pub struct KeystrokeStream {
    /// Completed keystrokes, encoded as simple bytes or compound records.
    fifo: VecDeque<u8>,

    /// One-byte CSI introducer. `ESC` here means "none": `ESC` is matched
    /// first, so the value can never be reached.
    csi: u8,

    /// End of input has been signalled; nothing more will be accepted.
    eof_met: bool,

    /// Divert the next keystroke that completes, if it is clean.
    steal_this: bool,

    /// The last consumed byte was an unescaped `IAC`.
    iac: bool,

    /// Sequence currently being collected.
    cur: Partial,

    /// Sequence displaced by an in-flight Telnet command.
    pushed: Partial,
}

impl KeystrokeStream {
    /// Create a stream recognizing `csi` as a one-byte control sequence
    /// introducer. Pass 0 (or `ESC`) for terminals that only use `ESC [`.
    #[must_use]
    pub fn new(csi: u8) -> Self {
        Self {
            fifo: VecDeque::with_capacity(FIFO_CAPACITY),
            csi: if csi == 0 { ESC } else { csi },
            eof_met: false,
            steal_this: false,
            iac: false,
            cur: Partial::default(),
            pushed: Partial::default(),
        }
    }

    /// Feed a chunk of raw bytes; `None` signals end of input.
    ///
    /// Every byte is consumed. Completed keystrokes land in the internal
    /// FIFO; a sequence cut off by the end of the chunk persists and
    /// resumes on the next call. On end of input any partial sequence is
    /// flushed as a broken keystroke.
    pub fn input(&mut self, data: Option<&[u8]>) {
        self.run(data, None);
    }

    /// Like [`input`](Self::input), but ask for the next complete keystroke
    /// to be diverted to the caller instead of enqueued.
    ///
    /// Returns the stolen keystroke, or a `Null` keystroke when nothing
    /// could be stolen on this call (with the EOF sub-value once the stream
    /// has ended). Only clean keystrokes are diverted: broken or truncated
    /// sequences and Telnet commands always go through the FIFO. A partial
    /// sequence already in flight completes into the FIFO first; the caller
    /// may need several calls to obtain a keystroke.
    #[must_use]
    pub fn input_steal(&mut self, data: Option<&[u8]>) -> Keystroke {
        let mut slot = Keystroke::default();
        self.run(data, Some(&mut slot));
        slot
    }

    fn run(&mut self, data: Option<&[u8]>, mut steal: Option<&mut Keystroke>) {
        let mut bytes = match data {
            Some(bytes) => bytes,
            None => {
                self.flush_eof();
                &[]
            }
        };

        // Stealing is only armed between keystrokes; a partial sequence
        // must finish (into the FIFO) before one can be diverted.
        self.steal_this = steal.is_some() && self.cur.state == StreamState::Idle;

        // Nothing further is accepted once end of input has been seen.
        if self.eof_met {
            bytes = &[];
        }

        let mut i = 0;
        while i < bytes.len() {
            let u = bytes[i];
            i += 1;

            // Telnet escape resolution. IAC is transparent to everything
            // except the option byte, which may itself be 0xFF.
            if u == telnet::IAC && self.cur.state != StreamState::IacOption {
                if self.iac {
                    self.iac = false; // IAC IAC: a literal 0xFF data byte
                } else {
                    self.iac = true;
                    continue;
                }
            }

            if self.iac {
                // Consume the pending IAC with `u` as its argument.
                self.iac = false;

                match self.cur.state {
                    StreamState::Idle | StreamState::Esc | StreamState::Csi => {
                        if u < telnet::SB {
                            self.put_iac_short(Some(u));
                        } else {
                            // WILL/WONT/DO/DONT/SB displace whatever was
                            // being collected until the command completes.
                            self.pushed = self.cur;
                            self.cur.len = 1;
                            self.cur.raw[0] = u;
                            self.cur.state = StreamState::IacOption;
                        }
                    }
                    StreamState::IacSub => {
                        debug_assert_eq!(self.cur.raw[0], telnet::SB);

                        let complete = u == telnet::SE;
                        if !complete {
                            // IAC X with X ≠ SE inside a subnegotiation:
                            // close the command broken and reprocess both
                            // bytes as the start of a fresh command.
                            trace!(byte = u, "unexpected IAC inside subnegotiation");
                            i -= 1;
                            self.iac = true;
                        }
                        self.put_iac_long(!complete);
                    }
                    StreamState::CharMulti | StreamState::IacOption => {
                        unreachable!("keystroke stream state cannot follow an IAC")
                    }
                }
                continue;
            }

            match self.cur.state {
                StreamState::Idle => {
                    self.steal_this = steal.is_some();

                    if u == ESC {
                        self.cur.state = StreamState::Esc;
                    } else if u == self.csi {
                        self.cur.len = 0;
                        self.cur.state = StreamState::Csi;
                    } else {
                        match claim(self.steal_this, &mut steal) {
                            Some(slot) => {
                                *slot = Keystroke::single(KeystrokeKind::Char, u);
                                self.steal_this = false;
                            }
                            None => self.put_char(u32::from(u)),
                        }
                    }
                }

                StreamState::CharMulti => {
                    unreachable!("multi-byte character collection is not implemented")
                }

                StreamState::Esc => {
                    if u == b'[' {
                        self.cur.len = 0;
                        self.cur.state = StreamState::Csi;
                    } else {
                        match claim(self.steal_this, &mut steal) {
                            Some(slot) => {
                                *slot = Keystroke::single(KeystrokeKind::Esc, u);
                                self.steal_this = false;
                            }
                            None => self.put_esc(Some(u)),
                        }
                        self.cur.state = StreamState::Idle;
                    }
                }

                StreamState::Csi => {
                    if (0x20..=0x3F).contains(&u) {
                        self.cur.add_raw(u);
                    } else {
                        let mut terminator = u;
                        let mut ok = true;

                        if !(0x40..=0x7F).contains(&u) {
                            // Not part of the sequence: put the byte back
                            // for reprocessing (re-escaping it if it was an
                            // IAC) and close the sequence broken.
                            trace!(byte = u, "stray byte terminates control sequence");
                            i -= 1;
                            self.iac = u == telnet::IAC;
                            terminator = 0;
                            ok = false;
                        }

                        let fits = self.cur.plant_terminator(terminator);
                        let ok = ok && fits;

                        match claim(self.steal_this && ok, &mut steal) {
                            Some(slot) => {
                                *slot = self.stolen_csi(terminator);
                                self.steal_this = false;
                            }
                            None => self.put_csi(terminator),
                        }
                        self.cur.state = StreamState::Idle;
                    }
                }

                StreamState::IacOption => {
                    debug_assert_eq!(self.cur.len, 1);
                    self.cur.add_raw(u);

                    if self.cur.raw[0] == telnet::SB {
                        self.cur.state = StreamState::IacSub;
                    } else {
                        self.put_iac_long(false);
                    }
                }

                StreamState::IacSub => {
                    debug_assert_eq!(self.cur.raw[0], telnet::SB);
                    self.cur.add_raw(u);
                }
            }
        }

        // Nothing was stolen: report Null, which may carry the EOF mark.
        if let Some(slot) = steal {
            *slot = Keystroke::null(self.eof_met);
        }
    }

    /// End of input: flush any partial sequence as a broken keystroke.
    fn flush_eof(&mut self) {
        self.eof_met = true;
        self.steal_this = false;

        if self.iac && self.cur.state == StreamState::Idle {
            self.put_iac_short(None);
        }

        // A partial Telnet command may itself have interrupted a partial
        // sequence; popping it restores the outer one, which the next pass
        // of the loop then closes.
        while self.cur.state != StreamState::Idle {
            match self.cur.state {
                StreamState::Esc => {
                    self.put_esc(None);
                    self.cur.state = StreamState::Idle;
                }
                StreamState::Csi => {
                    // NUL in the terminator slot keeps the parameters
                    // recoverable and marks the sequence broken.
                    self.cur.plant_terminator(0);
                    self.put_csi(0);
                    self.cur.state = StreamState::Idle;
                }
                StreamState::IacOption | StreamState::IacSub => self.put_iac_long(true),
                StreamState::CharMulti => {
                    unreachable!("multi-byte character collection is not implemented")
                }
                StreamState::Idle => unreachable!(),
            }
        }

        debug!("end of input reached; partial sequences flushed");
    }

    /// Fetch the next keystroke.
    ///
    /// Yields a `Null` keystroke when the FIFO is empty, with the EOF
    /// sub-value once end of input has been signalled and everything
    /// buffered has been fetched.
    pub fn get(&mut self) -> Keystroke {
        let Some(first) = self.fifo.pop_front() else {
            return Keystroke::null(self.eof_met);
        };

        if first & COMPOUND == 0 {
            return Keystroke::single(KeystrokeKind::Char, first);
        }

        let kind = match KeystrokeKind::from_tag(first & KIND_MASK) {
            Some(kind) => kind,
            None => panic!("unknown keystroke kind tag in FIFO: {:#04x}", first),
        };
        let flags = KeystrokeFlags::from_bits_truncate(first);
        let len = usize::from(self.fifo_byte());

        let mut stroke = Keystroke {
            kind,
            value: 0,
            flags,
            len,
            buf: [0; KEYSTROKE_MAX_LEN],
        };
        for slot in stroke.buf.iter_mut().take(len) {
            *slot = self.fifo_byte();
        }

        match stroke.kind {
            KeystrokeKind::Null => panic!("null keystroke found in FIFO"),

            KeystrokeKind::Char => {
                // Clean characters carry their scalar value; broken or
                // truncated ones keep value 0 and the raw bytes.
                if stroke.flags.is_empty() {
                    assert!((1..=4).contains(&stroke.len));
                    for &byte in &stroke.buf[..stroke.len] {
                        stroke.value = (stroke.value << 8) | u32::from(byte);
                    }
                }
            }

            KeystrokeKind::Esc => {
                if stroke.len == 1 {
                    stroke.value = u32::from(stroke.buf[0]);
                } else {
                    debug_assert_eq!(stroke.len, 0);
                }
            }

            KeystrokeKind::Csi => {
                // The last byte is the terminator; expose it as the value
                // and NUL-terminate the parameter bytes in its place.
                if stroke.len > 0 {
                    stroke.len -= 1;
                    stroke.value = u32::from(stroke.buf[stroke.len]);
                }
                stroke.buf[stroke.len] = 0;
            }

            KeystrokeKind::Iac => {
                if stroke.len > 0 {
                    stroke.value = u32::from(stroke.buf[0]);
                }
            }
        }

        stroke
    }

    /// True when no completed keystroke is buffered. A partial sequence in
    /// collection does not count.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    /// True once end of input has been signalled and every buffered
    /// keystroke has been fetched.
    #[must_use]
    pub fn at_eof(&self) -> bool {
        self.fifo.is_empty() && self.eof_met
    }

    /// Force the stream to end of input, discarding buffered keystrokes
    /// and any partial sequence. Unlike signalling EOF through
    /// [`input`](Self::input), nothing is flushed as broken.
    pub fn set_eof(&mut self) {
        self.fifo.clear();

        self.eof_met = true;

        self.steal_this = false;
        self.iac = false;
        self.cur.state = StreamState::Idle;
        self.pushed.state = StreamState::Idle;

        debug!("keystroke stream forced to end of input");
    }

    // ── FIFO encoding ────────────────────────────────────────────────────

    /// Continuation byte of a compound record. Records are written whole,
    /// so running dry mid-record means the FIFO is corrupt.
    fn fifo_byte(&mut self) -> u8 {
        self.fifo
            .pop_front()
            .expect("keystroke FIFO truncated mid-record")
    }

    /// Append one compound record: header, length, payload. `len` is the
    /// logical sequence length and may exceed the stored payload.
    fn put(&mut self, kind: KeystrokeKind, broken: bool, payload: &[u8], len: usize) {
        let mut header = COMPOUND | kind as u8;
        if broken {
            header |= KeystrokeFlags::BROKEN.bits();
        }

        let stored = if len > KEYSTROKE_MAX_LEN {
            trace!(kind = ?kind, len, "keystroke truncated");
            header |= KeystrokeFlags::TRUNCATED.bits();
            KEYSTROKE_MAX_LEN
        } else {
            len
        };

        self.fifo.push_back(header);
        self.fifo.push_back(stored as u8);
        self.fifo.extend(&payload[..stored]);
    }

    /// Store a character. Values below 0x80 are the one-byte simple form;
    /// anything else goes big-endian with leading zero bytes stripped.
    fn put_char(&mut self, u: u32) {
        if u < 0x80 {
            self.fifo.push_back(u as u8);
        } else {
            let be = u.to_be_bytes();
            let skip = be.iter().position(|&b| b != 0).unwrap_or(3);
            let bytes = &be[skip..];
            self.put(KeystrokeKind::Char, false, bytes, bytes.len());
        }
    }

    /// Store `ESC X`; broken when end of input arrived before X.
    fn put_esc(&mut self, x: Option<u8>) {
        match x {
            Some(u) => self.put(KeystrokeKind::Esc, false, &[u], 1),
            None => self.put(KeystrokeKind::Esc, true, &[], 0),
        }
    }

    /// Store a control sequence from the accumulated bytes. The terminator
    /// has already been planted as the last byte; NUL there means broken.
    fn put_csi(&mut self, terminator: u8) {
        let raw = self.cur.raw;
        let len = self.cur.len;
        self.put(KeystrokeKind::Csi, terminator == 0, &raw, len);
    }

    /// Store a two-byte `IAC X` command; broken when end of input arrived
    /// before X.
    fn put_iac_short(&mut self, x: Option<u8>) {
        match x {
            Some(u) => self.put(KeystrokeKind::Iac, false, &[u], 1),
            None => self.put(KeystrokeKind::Iac, true, &[], 0),
        }
    }

    /// Store a long Telnet command from the accumulated bytes and restore
    /// whatever sequence the command displaced.
    fn put_iac_long(&mut self, broken: bool) {
        let raw = self.cur.raw;
        let len = self.cur.len;
        self.put(KeystrokeKind::Iac, broken, &raw, len);

        self.cur = self.pushed;
        self.pushed.state = StreamState::Idle;
    }

    /// Build a stolen control-sequence keystroke from the accumulated
    /// bytes: parameters NUL-terminated in `buf`, terminator as the value.
    ///
    /// NB: stolen control sequences report kind `Esc`; consumers key off
    /// `value` and `buf`.
    fn stolen_csi(&self, terminator: u8) -> Keystroke {
        let len = self.cur.len; // includes the terminator
        debug_assert!((1..=KEYSTROKE_MAX_LEN).contains(&len));

        let mut stroke = Keystroke {
            kind: KeystrokeKind::Esc,
            value: u32::from(terminator),
            flags: KeystrokeFlags::empty(),
            len: len - 1,
            buf: [0; KEYSTROKE_MAX_LEN],
        };
        stroke.buf[..len - 1].copy_from_slice(&self.cur.raw[..len - 1]);
        // buf is zeroed, so the parameters already end in NUL.
        stroke
    }
}

impl Default for KeystrokeStream {
    /// A stream with no distinct one-byte CSI introducer.
    fn default() -> Self {
        Self::new(0)
    }
}
