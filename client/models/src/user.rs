use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Villager,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "ADMIN",
            Role::Villager => "VILLAGER",
        };

        f.write_str(name)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "VILLAGER" => Ok(Role::Villager),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// Who is signed in. Persisted alongside the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
    pub username: String,
}

impl LoginResponse {
    pub fn identity(&self) -> Identity {
        Identity {
            username: self.username.clone(),
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Admin-created account; the server assigns the default password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: Role,
}

/// Blank fields are left unchanged. A new password needs the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordCheck {
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_spelling() {
        let identity: Identity =
            serde_json::from_str(r#"{"username":"admin","role":"ADMIN"}"#).unwrap();

        assert_eq!(identity.role, Role::Admin);
        assert_eq!(
            serde_json::to_string(&Role::Villager).unwrap(),
            r#""VILLAGER""#
        );
    }

    #[test]
    fn test_login_identity() {
        let response: LoginResponse =
            serde_json::from_str(r#"{"token":"abc","role":"VILLAGER","username":"ravi"}"#)
                .unwrap();

        assert_eq!(
            response.identity(),
            Identity {
                username: "ravi".to_string(),
                role: Role::Villager
            }
        );
    }

    #[test]
    fn test_role_parses_any_case() {
        assert_eq!("villager".parse::<Role>(), Ok(Role::Villager));
        assert!("mayor".parse::<Role>().is_err());
    }

    #[test]
    fn test_profile_update_skips_blank_fields() {
        let update = ProfileUpdate {
            password: Some("new".to_string()),
            old_password: Some("old".to_string()),
            ..ProfileUpdate::default()
        };

        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"password":"new","oldPassword":"old"}"#
        );
    }
}
