use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::lifecycle::BookingError;

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const TICKET_CODE_LEN: usize = 8;

/// Short code printed on a confirmed ticket, 8 chars from `[A-Z0-9]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketCode(String);

impl TicketCode {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..TICKET_CODE_LEN)
            .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TicketCode {
    type Err = BookingError;

    /// Accepts lower case input and normalises it.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        let valid = code.len() == TICKET_CODE_LEN && code.bytes().all(|b| ALPHABET.contains(&b));
        if !valid {
            return Err(BookingError::InvalidTicketCode(s.to_string()));
        }
        Ok(Self(code))
    }
}

impl TryFrom<String> for TicketCode {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TicketCode> for String {
    fn from(code: TicketCode) -> Self {
        code.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
