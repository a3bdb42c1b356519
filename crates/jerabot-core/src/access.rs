use std::fmt;

use crate::{config::Config, domain::UserId, status::StatusRecord};

/// Authorization tier computed for a user at the moment of dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessLevel {
    Everyone,
    User,
    Admin,
    Developer,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessLevel::Everyone => "everyone",
            AccessLevel::User => "user",
            AccessLevel::Admin => "admin",
            AccessLevel::Developer => "developer",
        };
        f.write_str(s)
    }
}

/// Maps a user id to an [`AccessLevel`] from the static lists plus the known-user set.
///
/// Nothing is cached: every call reflects the record it is handed.
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
    admins: Vec<UserId>,
    developers: Vec<UserId>,
}

impl AccessPolicy {
    pub fn new(admins: Vec<UserId>, developers: Vec<UserId>) -> Self {
        Self { admins, developers }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.admins.clone(), cfg.developers.clone())
    }

    pub fn admins(&self) -> &[UserId] {
        &self.admins
    }

    pub fn access_level(&self, user: UserId, status: &StatusRecord) -> AccessLevel {
        if self.developers.contains(&user) {
            return AccessLevel::Developer;
        }
        if self.admins.contains(&user) {
            return AccessLevel::Admin;
        }
        if status.has_user(user) {
            return AccessLevel::User;
        }
        AccessLevel::Everyone
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    /// Admins count as known users even when absent from the record.
    pub fn is_known_user(&self, user: UserId, status: &StatusRecord) -> bool {
        status.has_user(user) || self.is_admin(user)
    }
}
