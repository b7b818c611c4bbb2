use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for personal data (passenger phone numbers, names in logs).
///
/// `Debug` and `Display` only reveal the last few characters so the value can
/// flow through `tracing` fields safely. Serialization emits the real value,
/// since API responses returned to the owner need it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

const VISIBLE_TAIL: usize = 3;

impl<T: AsRef<str>> Masked<T> {
    /// Masked rendering, e.g. `*******789`.
    pub fn redacted(&self) -> String {
        let raw = self.0.as_ref();
        let chars: Vec<char> = raw.chars().collect();
        if chars.len() <= VISIBLE_TAIL {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - VISIBLE_TAIL..].iter().collect();
        format!("{}{}", "*".repeat(chars.len() - VISIBLE_TAIL), tail)
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Masked({})", self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Self(value)
    }
}
