use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Access level within a capsule. Variant order matters: derived `Ord`
/// gives Viewer < Contributor < Admin < Owner, which the permission
/// checks rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapsuleRole {
    Viewer,
    Contributor,
    Admin,
    Owner,
}

impl CapsuleRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Contributor => "contributor",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    pub fn can_contribute(&self) -> bool {
        *self >= Self::Contributor
    }

    pub fn can_manage(&self) -> bool {
        *self >= Self::Admin
    }
}

impl fmt::Display for CapsuleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapsuleRole {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(Self::Viewer),
            "contributor" => Ok(Self::Contributor),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            other => Err(anyhow::anyhow!("unknown capsule role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_hierarchy() {
        assert!(CapsuleRole::Viewer < CapsuleRole::Contributor);
        assert!(CapsuleRole::Contributor < CapsuleRole::Admin);
        assert!(CapsuleRole::Admin < CapsuleRole::Owner);
    }

    #[test]
    fn permission_thresholds() {
        assert!(!CapsuleRole::Viewer.can_contribute());
        assert!(CapsuleRole::Contributor.can_contribute());
        assert!(!CapsuleRole::Contributor.can_manage());
        assert!(CapsuleRole::Admin.can_manage());
        assert!(CapsuleRole::Owner.can_manage());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            "Admin".parse::<CapsuleRole>().unwrap(),
            CapsuleRole::Admin
        );
        assert!("editor".parse::<CapsuleRole>().is_err());
    }
}
