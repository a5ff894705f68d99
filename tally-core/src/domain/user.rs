//! User and owner identity

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// A verified owner identifier.
///
/// Authentication happens before the core is invoked; this type only
/// carries the identity it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for OwnerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for OwnerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::validation("Invalid user ID format"))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered user. Credentials are held by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            email: Self::normalize_email(email)?,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn owner_id(&self) -> OwnerId {
        OwnerId(self.id)
    }

    /// Trim and lowercase an email, rejecting obviously malformed ones
    pub fn normalize_email(email: &str) -> Result<String> {
        let email = email.trim().to_lowercase();
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !email.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(Error::validation(format!("'{}' is not a valid email", email)));
        }
        Ok(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_creation() {
        let user = User::new("  Alice@Example.COM ").unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.owner_id().as_uuid(), user.id);
    }

    #[test]
    fn test_email_validation() {
        assert!(User::new("no-at-sign").is_err());
        assert!(User::new("@example.com").is_err());
        assert!(User::new("alice@").is_err());
        assert!(User::new("a@b@c").is_err());
        assert!(User::new("al ice@example.com").is_err());
    }

    #[test]
    fn test_owner_id_parsing() {
        let id = Uuid::new_v4();
        let owner: OwnerId = id.to_string().parse().unwrap();
        assert_eq!(owner.as_uuid(), id);

        let err = "not-a-uuid".parse::<OwnerId>().unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Invalid user ID format");
    }
}
