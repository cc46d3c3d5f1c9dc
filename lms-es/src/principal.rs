//! Authenticated caller identity
//!
//! Token issuance and session handling live in the upstream auth gateway;
//! this service only ever sees an already-authenticated principal. Every
//! service operation takes the principal as an explicit argument, never as
//! ambient request state.

use uuid::Uuid;

/// Caller role as asserted by the auth gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Learner,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "learner" => Some(Role::Learner),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Learner => "learner",
        }
    }
}

/// Authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins may act on any learner's data; learners only on their own
    pub fn can_act_for(&self, learner_id: Uuid) -> bool {
        self.is_admin() || self.user_id == learner_id
    }
}
