//! Participants and roles.
//!
//! A session has exactly two seats: the notary, who may annotate, and the
//! client, who only watches. The policy is enforced where input becomes
//! operations; nothing here is cryptographic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Notary,
    Client,
}

impl Role {
    /// Only the notary turns input into operations.
    pub fn can_author(self) -> bool {
        matches!(self, Role::Notary)
    }

    /// The role on the other side of a two-party session.
    pub fn counterpart(self) -> Role {
        match self {
            Role::Notary => Role::Client,
            Role::Client => Role::Notary,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Notary => "notary",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}', expected 'notary' or 'client'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notary" => Ok(Role::Notary),
            "client" => Ok(Role::Client),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// One seat in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub identity: String,
    pub role: Role,
    pub is_connected: bool,
    pub is_ready: bool,
}

impl Participant {
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
            is_connected: false,
            is_ready: false,
        }
    }
}

/// The local seat plus the (at most one) remote seat.
#[derive(Debug, Clone)]
pub struct Roster {
    local: Participant,
    remote: Participant,
}

impl Roster {
    /// Remote seat starts as a "Waiting..." placeholder with the opposite role.
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            local: Participant::new(identity, role),
            remote: Participant::new("Waiting...", role.counterpart()),
        }
    }

    pub fn local(&self) -> &Participant {
        &self.local
    }

    pub fn remote(&self) -> &Participant {
        &self.remote
    }

    pub fn set_local_connected(&mut self, connected: bool) {
        self.local.is_connected = connected;
        self.local.is_ready = connected;
    }

    pub fn remote_joined(&mut self, identity: impl Into<String>) {
        self.remote.identity = identity.into();
        self.remote.is_connected = true;
        self.remote.is_ready = true;
    }

    /// Returns false if `identity` is not the current remote.
    pub fn remote_left(&mut self, identity: &str) -> bool {
        if self.remote.identity != identity {
            return false;
        }
        self.remote.is_connected = false;
        self.remote.is_ready = false;
        true
    }

    pub fn remote_present(&self) -> bool {
        self.remote.is_connected
    }

    /// Both seats, notary first.
    pub fn participants(&self) -> [&Participant; 2] {
        match self.local.role {
            Role::Notary => [&self.local, &self.remote],
            Role::Client => [&self.remote, &self.local],
        }
    }

    /// Drop the remote seat back to its placeholder.
    pub fn reset_remote(&mut self) {
        self.remote = Participant::new("Waiting...", self.local.role.counterpart());
    }
}
