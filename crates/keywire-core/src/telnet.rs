#![forbid(unsafe_code)]

//! Telnet in-band command bytes.
//!
//! Only the bytes the keystroke stream must recognize to *delimit* commands
//! are named here. Responding to option negotiation is the caller's concern;
//! the stream hands commands over verbatim as [`Iac`] keystrokes.
//!
//! [`Iac`]: crate::keystroke::KeystrokeKind::Iac

/// "Interpret As Command": introduces every Telnet command. `IAC IAC` is
/// the escape for a literal 0xFF data byte.
pub const IAC: u8 = 255;

/// End of subnegotiation parameters.
pub const SE: u8 = 240;

/// Begin subnegotiation: `IAC SB <option> ... IAC SE`.
pub const SB: u8 = 250;

/// Option negotiation, sender offers to enable: `IAC WILL <option>`.
pub const WILL: u8 = 251;

/// Option negotiation, sender refuses to enable: `IAC WONT <option>`.
pub const WONT: u8 = 252;

/// Option negotiation, sender asks peer to enable: `IAC DO <option>`.
pub const DO: u8 = 253;

/// Option negotiation, sender asks peer not to: `IAC DONT <option>`.
pub const DONT: u8 = 254;
