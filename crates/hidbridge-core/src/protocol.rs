//! Wire protocol between the paired peer and the bridge.
//!
//! The peer sends raw payloads of at most [`MAX_PAYLOAD`] bytes; the bridge
//! answers with one bare status token per payload (no terminator, no framing).
//!
//! ```text
//! bridge -> peer   READY_FOR_AUDIT            (on connect)
//! peer   -> bridge [{"Command": ...}, ...]    (structured script)
//! bridge -> peer   AUDIT_COMPLETE
//! peer   -> bridge hello                      (literal text)
//! bridge -> peer   OK | PARTIAL_FAIL | IGNORED
//! ```

use std::fmt;

/// Maximum number of bytes read from the peer per receive.
pub const MAX_PAYLOAD: usize = 1024;

/// Status tokens sent to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reply {
    /// Greeting sent as soon as a connection is accepted.
    ReadyForAudit,
    /// A structured script was executed.
    AuditComplete,
    /// Every printable character of a text payload was typed.
    Ok,
    /// Some characters of a text payload could not be typed.
    PartialFail,
    /// The text payload contained nothing printable.
    Ignored,
}

impl Reply {
    /// The exact token written to the peer.
    pub fn as_str(self) -> &'static str {
        match self {
            Reply::ReadyForAudit => "READY_FOR_AUDIT",
            Reply::AuditComplete => "AUDIT_COMPLETE",
            Reply::Ok => "OK",
            Reply::PartialFail => "PARTIAL_FAIL",
            Reply::Ignored => "IGNORED",
        }
    }

    /// Token bytes as written to the stream.
    pub fn as_bytes(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes a received payload as UTF-8, falling back to Latin-1.
///
/// The fallback maps every byte to the code point of the same value, so no
/// input byte is ever lost.
pub fn decode_payload(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Drops non-printable characters, keeping newline and tab.
///
/// Space is the only other whitespace kept; carriage returns, form feeds and
/// Unicode separators are removed along with control characters, invisible
/// format characters (soft hyphen, zero-width space, BOM, bidi controls),
/// private-use code points and noncharacters.
pub fn printable_text(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\n' || c == '\t' || is_printable(c))
        .collect()
}

/// Format characters (general category `Cf`).
const FORMAT_RANGES: &[(u32, u32)] = &[
    (0x00AD, 0x00AD),
    (0x0600, 0x0605),
    (0x061C, 0x061C),
    (0x06DD, 0x06DD),
    (0x070F, 0x070F),
    (0x0890, 0x0891),
    (0x08E2, 0x08E2),
    (0x180E, 0x180E),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x2066, 0x206F),
    (0xFEFF, 0xFEFF),
    (0xFFF9, 0xFFFB),
    (0x110BD, 0x110BD),
    (0x110CD, 0x110CD),
    (0x13430, 0x1343F),
    (0x1BCA0, 0x1BCA3),
    (0x1D173, 0x1D17A),
    (0xE0001, 0xE0001),
    (0xE0020, 0xE007F),
];

/// Private-use areas (general category `Co`).
const PRIVATE_USE_RANGES: &[(u32, u32)] = &[
    (0xE000, 0xF8FF),
    (0xF0000, 0xFFFFD),
    (0x100000, 0x10FFFD),
];

fn in_ranges(ranges: &[(u32, u32)], cp: u32) -> bool {
    ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp))
}

/// Permanently unassigned code points: U+FDD0..U+FDEF and the last two code
/// points of every plane.
fn is_noncharacter(cp: u32) -> bool {
    (0xFDD0..=0xFDEF).contains(&cp) || cp & 0xFFFE == 0xFFFE
}

fn is_printable(c: char) -> bool {
    if c.is_control() || (c != ' ' && c.is_whitespace()) {
        return false;
    }
    let cp = u32::from(c);
    !in_ranges(FORMAT_RANGES, cp) && !in_ranges(PRIVATE_USE_RANGES, cp) && !is_noncharacter(cp)
}
