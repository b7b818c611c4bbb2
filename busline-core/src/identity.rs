use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{CoreError, CoreResult, Entity};

const MAX_USER_ID_LEN: usize = 128;

/// Authenticated caller. Issued by the auth layer and treated as opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidInput("user id is required".to_string()));
        }
        if trimmed.len() > MAX_USER_ID_LEN {
            return Err(CoreError::InvalidInput("user id is too long".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse an externally supplied identifier. A malformed id is a client error,
/// not a lookup miss.
pub fn parse_id(entity: Entity, raw: &str) -> CoreResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| CoreError::InvalidInput(format!("invalid {} id: {}", entity, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_rules() {
        assert_eq!(UserId::parse("  user-42 ").unwrap().as_str(), "user-42");
        assert!(matches!(UserId::parse("   "), Err(CoreError::InvalidInput(_))));
        assert!(UserId::parse(&"x".repeat(MAX_USER_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(Entity::Trip, &id.to_string()).unwrap(), id);

        let err = parse_id(Entity::Booking, "not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("invalid booking id"));
    }
}
