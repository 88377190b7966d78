//! # Vault Primitives
//!
//! Hardcoded constants for the Tessera core. They are compiled into the
//! binary and immutable at runtime.
//!
//! ## Primitives
//!
//! 1. **Wire symbols**: the four reserved frame delimiters plus the escape
//!    character and blob sigil.
//! 2. **Chain genesis**: the `prev_hash` of every org's first audit event.
//! 3. **Windows**: the rate window and cost day used by model admission.
//! 4. **Input limits**: upper bounds on frames and objects.

// =============================================================================
// WIRE SYMBOLS
// =============================================================================

/// Opens a frame.
pub const FRAME_START: char = '{';

/// Separates the header section from the payload section.
pub const PAYLOAD_SEP: char = '|';

/// Closes a frame.
pub const FRAME_END: char = '}';

/// Separates header entries from each other and payload tokens from each other.
pub const FIELD_SEP: char = ';';

/// Separates a header key from its value inside one entry.
pub const KEY_VALUE_SEP: char = ' ';

/// Escapes the next character inside a header value or word token.
pub const ESCAPE: char = '\\';

/// Marks a payload token as a blob.
pub const BLOB_SIGIL: char = '*';

/// Characters that must be escaped inside header values and word tokens.
pub const ESCAPED_CHARS: [char; 6] = [
    ESCAPE,
    FRAME_START,
    PAYLOAD_SEP,
    FRAME_END,
    FIELD_SEP,
    BLOB_SIGIL,
];

// =============================================================================
// AUDIT CHAIN
// =============================================================================

/// The `prev_hash` used for the first event of every org's chain.
///
/// 64 hex zeros, the width of a SHA-256 digest.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// =============================================================================
// MODEL ADMISSION WINDOWS
// =============================================================================

/// Width of the sliding window for `max_rpm` and `max_tpm`, in seconds.
pub const RATE_WINDOW_SECS: u64 = 60;

/// Cost units per currency unit (costs are stored in micro-units).
pub const COST_UNITS_PER_CURRENCY: u64 = 1_000_000;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum accepted length of a frame string, in bytes (16 MB).
///
/// Longer input is rejected by `decode` before any tokenization, and
/// `Frame::new` refuses frames whose encoding would be longer.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Maximum size of a single stored object, in bytes (64 MB).
pub const MAX_OBJECT_SIZE: usize = 64 * 1024 * 1024;

/// Maximum length of a tool or model name.
pub const MAX_NAME_LENGTH: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiters_are_distinct() {
        let symbols = [FRAME_START, PAYLOAD_SEP, FRAME_END, FIELD_SEP];
        for (i, a) in symbols.iter().enumerate() {
            for b in symbols.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn genesis_is_sha256_width() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.bytes().all(|b| b == b'0'));
    }
}
