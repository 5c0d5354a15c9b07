use uuid::Uuid;

use crate::{ArticleSlug, CommentId, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct NotificationId(pub Uuid);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// Someone answered one of the user's comments
    Reply,
    /// Someone liked one of the user's comments
    Like,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Reply => "reply",
            NotificationKind::Like => "like",
        }
    }

    pub fn from_str(s: &str) -> Option<NotificationKind> {
        match s {
            "reply" => Some(NotificationKind::Reply),
            "like" => Some(NotificationKind::Like),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Notification {
    pub id: NotificationId,
    /// Recipient
    pub user_id: UserId,
    pub kind: NotificationKind,
    /// Comment that got liked, or the reply that was posted
    pub comment_id: CommentId,
    pub article_slug: ArticleSlug,
    pub actor_id: UserId,
    pub actor_name: String,
    pub read: bool,
    pub created_at: Time,
}

impl Notification {
    pub fn title(&self) -> String {
        match self.kind {
            NotificationKind::Reply => format!("{} replied to your comment", self.actor_name),
            NotificationKind::Like => format!("{} liked your comment", self.actor_name),
        }
    }
}
