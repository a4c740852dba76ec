use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Farmer,
    Reviewer,
    Inspector,
    Approver,
    Admin,
    System,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "farmer" => Some(Role::Farmer),
            "reviewer" => Some(Role::Reviewer),
            "inspector" => Some(Role::Inspector),
            "approver" => Some(Role::Approver),
            "admin" => Some(Role::Admin),
            "system" => Some(Role::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Reviewer => "reviewer",
            Role::Inspector => "inspector",
            Role::Approver => "approver",
            Role::Admin => "admin",
            Role::System => "system",
        }
    }

    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Farmer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_role() {
        for role in [
            Role::Farmer,
            Role::Reviewer,
            Role::Inspector,
            Role::Approver,
            Role::Admin,
            Role::System,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn unknown_role_string_is_rejected() {
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::parse(""), None);
    }
}
