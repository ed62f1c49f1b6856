//! Synthesized statement identifiers.
//!
//! The connector's server-assigned statement id may still be unknown at
//! submission time, but registry entries need a stable key immediately, so
//! one is synthesized locally when the server has not assigned one yet.
//!
//! Format: "stmt" + 26-char nanoid = 30 chars total, lowercase alphanumeric.

/// Lowercase alphanumeric alphabet (0-9, a-z).
const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

const STATEMENT_PREFIX: &str = "stmt";

/// Generate a local statement id (prefix: "stmt").
pub fn generate_statement_id() -> String {
    let suffix = nanoid::nanoid!(26, &ID_ALPHABET);
    format!("{}{}", STATEMENT_PREFIX, suffix)
}
