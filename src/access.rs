//! Users and streaming authorization.

use dashmap::DashMap;
use streamforged_common::{Error, MediaFile, Result, User};

/// Decides whether a user may stream a file.
pub trait AccessPolicy: Send + Sync {
    fn authorize(&self, user: &User, file: &MediaFile) -> Result<()>;
}

/// Grants streaming to users holding the stream role.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoleAccessPolicy;

impl AccessPolicy for RoleAccessPolicy {
    fn authorize(&self, user: &User, _file: &MediaFile) -> Result<()> {
        if user.stream_role {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "{} is not authorized to play files",
                user.name
            )))
        }
    }
}

/// Known users by name.
#[derive(Debug)]
pub struct UserDirectory {
    users: DashMap<String, User>,
    default_user: String,
}

impl UserDirectory {
    pub fn new(users: &[User], default_user: impl Into<String>) -> Self {
        let map = DashMap::new();
        for user in users {
            map.insert(user.name.clone(), user.clone());
        }
        Self {
            users: map,
            default_user: default_user.into(),
        }
    }

    /// Look up a user. The default user always exists; any other unknown
    /// name resolves to a user without the stream role.
    pub fn user(&self, name: &str) -> User {
        if let Some(user) = self.users.get(name) {
            return user.clone();
        }
        if name == self.default_user {
            return User::new(name);
        }
        User {
            name: name.to_string(),
            stream_role: false,
            max_bit_rate: 0,
        }
    }
}
