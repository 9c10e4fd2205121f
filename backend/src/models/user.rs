//! Models that represent API users, authentication payloads, and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of an authenticated account.
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: UserRole,
    /// Register key when the account belongs to an employee.
    pub employee_num: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }

    pub fn can_approve(&self) -> bool {
        matches!(self.role, UserRole::Approver | UserRole::Admin)
    }

    /// Whether the account may act on the given employee's data.
    pub fn owns_employee(&self, employee_num: &str) -> bool {
        self.employee_num.as_deref() == Some(employee_num)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Default)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
/// Access tiers; any unlisted route defaults to plain `authenticated`.
pub enum UserRole {
    /// Reads own data, creates own requests.
    #[default]
    User,
    /// Approves, rejects and reverts leave requests.
    Approver,
    /// Ingestion, carry-over, purge, audit access.
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Approver => "approver",
            UserRole::Admin => "admin",
        }
    }
}

impl Serialize for UserRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "user" => Ok(UserRole::User),
            "approver" => Ok(UserRole::Approver),
            "admin" => Ok(UserRole::Admin),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["user", "approver", "admin"],
            )),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
/// Credentials submitted at login.
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Serialize)]
/// Token material returned on successful login. The CSRF token travels in a
/// response header, not in this body.
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub username: String,
    pub role: UserRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serde_round_trip() {
        let role: UserRole = serde_json::from_str("\"approver\"").unwrap();
        assert_eq!(role, UserRole::Approver);
        assert_eq!(serde_json::to_value(UserRole::Admin).unwrap(), "admin");
        assert!(serde_json::from_str::<UserRole>("\"root\"").is_err());
    }

    #[test]
    fn approver_and_admin_can_approve() {
        let mut user = User {
            id: "u-1".into(),
            username: "tanaka".into(),
            password_hash: "x".into(),
            full_name: "田中".into(),
            role: UserRole::User,
            employee_num: Some("E001".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!user.can_approve());
        user.role = UserRole::Approver;
        assert!(user.can_approve());
        assert!(!user.is_admin());
        user.role = UserRole::Admin;
        assert!(user.is_admin());
    }

    #[test]
    fn ownership_matches_register_key() {
        let user = User {
            id: "u-1".into(),
            username: "sato".into(),
            password_hash: "x".into(),
            full_name: "佐藤".into(),
            role: UserRole::User,
            employee_num: Some("E002".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(user.owns_employee("E002"));
        assert!(!user.owns_employee("E001"));
    }
}
