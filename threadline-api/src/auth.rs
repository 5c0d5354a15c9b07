use uuid::Uuid;

use crate::{Error, User, UserId, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

impl AuthToken {
    pub fn stub() -> AuthToken {
        AuthToken(STUB_UUID)
    }
}

/// Registration of a user whose identity was vouched for by the OAuth provider
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub photo_url: Option<String>,
}

impl NewUser {
    pub fn new(id: UserId, name: String, photo_url: Option<String>) -> NewUser {
        NewUser {
            id,
            name,
            photo_url,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::user::validate_name(&self.name)?;
        if let Some(url) = &self.photo_url {
            crate::validate_string(url)?;
        }
        Ok(())
    }
}

impl From<NewUser> for User {
    fn from(u: NewUser) -> User {
        User {
            id: u.id,
            name: u.name,
            photo_url: u.photo_url,
        }
    }
}
