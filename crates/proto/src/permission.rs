use serde::{Deserialize, Serialize};

/// Capability granted to a user and required by the matching operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Publish messages and inspect queue schemas.
    Send,
    /// Fetch pending messages.
    Receive,
    /// Enumerate configured queues.
    List,
}

impl Permission {
    /// Every known permission, in canonical order.
    pub const ALL: [Permission; 3] = [Permission::Send, Permission::Receive, Permission::List];

    /// Returns the lowercase configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Send => "send",
            Permission::Receive => "receive",
            Permission::List => "list",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send" => Ok(Permission::Send),
            "receive" => Ok(Permission::Receive),
            "list" => Ok(Permission::List),
            other => Err(other.to_string()),
        }
    }
}
