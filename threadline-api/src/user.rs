use crate::{Error, STUB_UUID};

use uuid::Uuid;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

/// Identity snapshot handed out by the sign-in provider
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub photo_url: Option<String>,
}

pub(crate) fn validate_name(name: &str) -> Result<(), Error> {
    crate::validate_string(name)?;
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed.len() != name.len()
        || name.chars().count() > crate::MAX_NAME_LEN
        || name.chars().any(|c| c.is_control())
    {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}
