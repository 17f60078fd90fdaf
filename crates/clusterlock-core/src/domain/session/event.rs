//! Session lifecycle events
//!
//! Published by the authentication layer when identities sign on or off.

use serde::{Deserialize, Serialize};

use crate::domain::locking::Identity;

/// A change in an identity's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionLifecycleEvent {
    /// An identity started a session
    SignedOn {
        identity: Identity,
        originated_on_this_node: bool,
    },
    /// An identity's session ended (logout or expiry)
    SignedOff {
        identity: Identity,
        originated_on_this_node: bool,
    },
}

impl SessionLifecycleEvent {
    pub fn signed_on(identity: Identity) -> Self {
        Self::SignedOn {
            identity,
            originated_on_this_node: true,
        }
    }

    /// Sign-off raised by this node
    pub fn signed_off(identity: Identity) -> Self {
        Self::SignedOff {
            identity,
            originated_on_this_node: true,
        }
    }

    /// Sign-off relayed from another node
    pub fn signed_off_elsewhere(identity: Identity) -> Self {
        Self::SignedOff {
            identity,
            originated_on_this_node: false,
        }
    }

    pub fn identity(&self) -> &Identity {
        match self {
            Self::SignedOn { identity, .. } | Self::SignedOff { identity, .. } => identity,
        }
    }

    pub fn originated_on_this_node(&self) -> bool {
        match self {
            Self::SignedOn {
                originated_on_this_node,
                ..
            }
            | Self::SignedOff {
                originated_on_this_node,
                ..
            } => *originated_on_this_node,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignedOn { .. } => "signed_on",
            Self::SignedOff { .. } => "signed_off",
        }
    }
}

impl std::fmt::Display for SessionLifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_str(), self.identity())
    }
}
