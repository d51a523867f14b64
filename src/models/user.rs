use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Faculty,
    Ta,
    Admin,
}

impl UserRole {
    /// Messaging eligibility is a closed pairing policy, kept as a single
    /// lookup table rather than conditionals at the call sites.
    pub fn messageable_roles(self) -> &'static [UserRole] {
        match self {
            UserRole::Student => &[UserRole::Faculty, UserRole::Ta],
            UserRole::Faculty => &[UserRole::Student, UserRole::Ta],
            UserRole::Ta => &[UserRole::Student, UserRole::Faculty],
            UserRole::Admin => &[
                UserRole::Student,
                UserRole::Faculty,
                UserRole::Ta,
                UserRole::Admin,
            ],
        }
    }

    pub fn may_message(self, other: UserRole) -> bool {
        self.messageable_roles().contains(&other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Faculty => "faculty",
            UserRole::Ta => "ta",
            UserRole::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}
