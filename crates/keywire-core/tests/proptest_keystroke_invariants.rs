//! Property-based invariant tests for the keystroke stream.
//!
//! Verifies:
//! 1.  Chunk invariance: splitting the input at arbitrary boundaries never
//!     changes the event sequence
//! 2.  Telnet transparency: dropping the IAC events equals parsing the
//!     stream with the commands excised
//! 3.  Simple characters round-trip one byte to one event
//! 4.  Arbitrary input never panics, never overflows an event buffer, and
//!     never surfaces a Null record
//! 5.  EOF is monotonic: once reached, only the EOF marker comes out
//! 6.  set_eof discards everything immediately
//! 7.  Stealing takes exactly one clean keystroke and preserves the rest

use keywire_core::{
    telnet, Keystroke, KeystrokeKind, KeystrokeStream, KEYSTROKE_MAX_LEN,
};
use proptest::prelude::*;
use proptest::sample::Index;

// ── Harness helpers ───────────────────────────────────────────────────

fn drain(stream: &mut KeystrokeStream) -> Vec<Keystroke> {
    let mut out = Vec::new();
    loop {
        let stroke = stream.get();
        if stroke.is_null() {
            return out;
        }
        out.push(stroke);
    }
}

/// Feed `bytes` split at `cuts`, signal EOF, and collect every event.
fn events_chunked(bytes: &[u8], cuts: &[usize]) -> Vec<Keystroke> {
    let mut stream = KeystrokeStream::default();
    let mut start = 0;
    for &cut in cuts {
        stream.input(Some(&bytes[start..cut]));
        start = cut;
    }
    stream.input(Some(&bytes[start..]));
    stream.input(None);
    drain(&mut stream)
}

fn events_whole(bytes: &[u8]) -> Vec<Keystroke> {
    events_chunked(bytes, &[])
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Chunk invariance
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn chunk_boundaries_never_change_events(
        bytes in proptest::collection::vec(any::<u8>(), 0..160),
        cut_points in proptest::collection::vec(any::<Index>(), 0..6),
    ) {
        let mut cuts: Vec<usize> = cut_points
            .iter()
            .map(|point| point.index(bytes.len() + 1))
            .collect();
        cuts.sort_unstable();

        let whole = events_whole(&bytes);
        let split = events_chunked(&bytes, &cuts);
        prop_assert_eq!(whole, split);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Telnet transparency
// ═════════════════════════════════════════════════════════════════════════

/// One well-formed element of a Telnet-tunneled stream.
#[derive(Debug, Clone)]
enum TelnetItem {
    /// A plain data byte (never 0xFF).
    Data(u8),
    /// A literal 0xFF data byte, carried as `IAC IAC` on the wire.
    LiteralFf,
    /// Two-byte command `IAC X`, X below SB.
    Command(u8),
    /// `IAC WILL/WONT/DO/DONT <option>`.
    Negotiate(u8, u8),
    /// `IAC SB <option> <data...> IAC SE`, data IAC-escaped.
    Subnegotiation(u8, Vec<u8>),
}

fn arb_item() -> impl Strategy<Value = TelnetItem> {
    prop_oneof![
        (0u8..=0xFE).prop_map(TelnetItem::Data),
        Just(TelnetItem::LiteralFf),
        (0u8..telnet::SB).prop_map(TelnetItem::Command),
        ((telnet::WILL..=telnet::DONT), any::<u8>())
            .prop_map(|(cmd, opt)| TelnetItem::Negotiate(cmd, opt)),
        (any::<u8>(), proptest::collection::vec(any::<u8>(), 0..5))
            .prop_map(|(opt, data)| TelnetItem::Subnegotiation(opt, data)),
    ]
}

fn render_wire(items: &[TelnetItem]) -> Vec<u8> {
    let mut out = Vec::new();
    for item in items {
        match item {
            TelnetItem::Data(b) => out.push(*b),
            TelnetItem::LiteralFf => out.extend_from_slice(&[telnet::IAC, telnet::IAC]),
            TelnetItem::Command(x) => out.extend_from_slice(&[telnet::IAC, *x]),
            TelnetItem::Negotiate(cmd, opt) => {
                out.extend_from_slice(&[telnet::IAC, *cmd, *opt]);
            }
            TelnetItem::Subnegotiation(opt, data) => {
                out.extend_from_slice(&[telnet::IAC, telnet::SB, *opt]);
                for b in data {
                    if *b == telnet::IAC {
                        out.push(telnet::IAC);
                    }
                    out.push(*b);
                }
                out.extend_from_slice(&[telnet::IAC, telnet::SE]);
            }
        }
    }
    out
}

/// The same stream with every command excised. Literal 0xFF data stays
/// escaped, since `IAC IAC` is how the byte is carried on the wire.
fn render_without_commands(items: &[TelnetItem]) -> Vec<u8> {
    let mut out = Vec::new();
    for item in items {
        match item {
            TelnetItem::Data(b) => out.push(*b),
            TelnetItem::LiteralFf => out.extend_from_slice(&[telnet::IAC, telnet::IAC]),
            TelnetItem::Command(_)
            | TelnetItem::Negotiate(..)
            | TelnetItem::Subnegotiation(..) => {}
        }
    }
    out
}

proptest! {
    #[test]
    fn commands_are_invisible_to_the_keystroke_stream(
        items in proptest::collection::vec(arb_item(), 0..24),
    ) {
        let with_commands = events_whole(&render_wire(&items));
        let keystrokes_only: Vec<Keystroke> = with_commands
            .into_iter()
            .filter(|stroke| stroke.kind != KeystrokeKind::Iac)
            .collect();

        let excised = events_whole(&render_without_commands(&items));
        prop_assert_eq!(keystrokes_only, excised);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Simple characters round-trip
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn plain_bytes_round_trip_one_to_one(
        bytes in proptest::collection::vec(
            (0u8..0x80).prop_filter("not ESC", |b| *b != 0x1B),
            0..80,
        ),
    ) {
        let mut stream = KeystrokeStream::default();
        stream.input(Some(&bytes));
        let events = drain(&mut stream);

        prop_assert_eq!(events.len(), bytes.len());
        for (stroke, byte) in events.iter().zip(&bytes) {
            prop_assert_eq!(stroke.kind, KeystrokeKind::Char);
            prop_assert_eq!(stroke.value, u32::from(*byte));
            prop_assert!(stroke.is_well_formed());
            prop_assert_eq!(stroke.bytes(), &[*byte]);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Arbitrary input: bounded buffers, valid records, no panic
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn arbitrary_input_yields_only_valid_events(
        chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..40),
            0..6,
        ),
    ) {
        let mut stream = KeystrokeStream::default();
        let mut events = Vec::new();

        // Interleave feeding and draining to exercise every FIFO prefix.
        for chunk in &chunks {
            stream.input(Some(chunk));
            events.extend(drain(&mut stream));
        }
        stream.input(None);
        events.extend(drain(&mut stream));

        for stroke in &events {
            prop_assert_ne!(stroke.kind, KeystrokeKind::Null);
            prop_assert!(stroke.len <= KEYSTROKE_MAX_LEN);
            if stroke.kind == KeystrokeKind::Char && stroke.is_well_formed() {
                prop_assert!((1..=4).contains(&stroke.len));
            }
        }
        prop_assert!(stream.at_eof());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. EOF monotonicity
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn after_eof_only_the_marker_comes_out(
        bytes in proptest::collection::vec(any::<u8>(), 0..60),
    ) {
        let mut stream = KeystrokeStream::default();
        stream.input(Some(&bytes));
        stream.input(None);
        let _ = drain(&mut stream);

        for _ in 0..3 {
            prop_assert!(stream.get().is_eof());
        }

        // Late bytes are not accepted.
        stream.input(Some(b"late"));
        prop_assert!(stream.get().is_eof());
        prop_assert!(stream.at_eof());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. set_eof discards immediately
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn set_eof_discards_buffered_and_partial_state(
        bytes in proptest::collection::vec(any::<u8>(), 0..60),
    ) {
        let mut stream = KeystrokeStream::default();
        stream.input(Some(&bytes));
        stream.set_eof();

        prop_assert!(stream.is_empty());
        prop_assert!(stream.at_eof());
        prop_assert!(stream.get().is_eof());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. Steal correctness
// ═════════════════════════════════════════════════════════════════════════

/// A keystroke that is guaranteed to arrive clean.
#[derive(Debug, Clone)]
enum CleanKey {
    Char(u8),
    Esc(u8),
    Csi(Vec<u8>, u8),
}

fn arb_clean_key() -> impl Strategy<Value = CleanKey> {
    prop_oneof![
        (0u8..=0xFE)
            .prop_filter("not ESC", |b| *b != 0x1B)
            .prop_map(CleanKey::Char),
        (0x20u8..=0x7E)
            .prop_filter("not CSI introducer", |b| *b != b'[')
            .prop_map(CleanKey::Esc),
        (
            proptest::collection::vec(0x20u8..=0x3F, 0..6),
            0x40u8..=0x7F,
        )
            .prop_map(|(params, term)| CleanKey::Csi(params, term)),
    ]
}

fn render_keys(keys: &[CleanKey]) -> Vec<u8> {
    let mut out = Vec::new();
    for key in keys {
        match key {
            CleanKey::Char(b) => out.push(*b),
            CleanKey::Esc(x) => out.extend_from_slice(&[0x1B, *x]),
            CleanKey::Csi(params, term) => {
                out.extend_from_slice(&[0x1B, b'[']);
                out.extend_from_slice(params);
                out.push(*term);
            }
        }
    }
    out
}

proptest! {
    #[test]
    fn steal_takes_one_clean_keystroke_and_keeps_order(
        keys in proptest::collection::vec(arb_clean_key(), 0..12),
    ) {
        let bytes = render_keys(&keys);

        // Reference: the same input without stealing.
        let mut reference = KeystrokeStream::default();
        reference.input(Some(&bytes));
        let full = drain(&mut reference);

        let mut stream = KeystrokeStream::default();
        let stolen = stream.input_steal(Some(&bytes));
        let rest = drain(&mut stream);

        if keys.is_empty() {
            prop_assert!(stolen.is_null());
            prop_assert!(rest.is_empty());
            return Ok(());
        }

        // The stolen keystroke is clean and never a Telnet command.
        prop_assert!(stolen.is_well_formed());
        prop_assert_ne!(stolen.kind, KeystrokeKind::Iac);
        prop_assert_ne!(stolen.kind, KeystrokeKind::Null);

        // It matches what a plain parse would have produced first, except
        // that stolen control sequences report kind Esc.
        let first = &full[0];
        prop_assert_eq!(stolen.value, first.value);
        prop_assert_eq!(stolen.len, first.len);
        prop_assert_eq!(stolen.bytes(), first.bytes());
        if first.kind == KeystrokeKind::Csi {
            prop_assert_eq!(stolen.kind, KeystrokeKind::Esc);
        } else {
            prop_assert_eq!(stolen.kind, first.kind);
        }

        // Everything after the stolen keystroke is untouched.
        prop_assert_eq!(rest.as_slice(), &full[1..]);
    }
}
