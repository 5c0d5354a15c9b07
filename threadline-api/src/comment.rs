use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{ArticleSlug, Error, Time, User, UserId, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn new() -> CommentId {
        CommentId(Uuid::new_v4())
    }

    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

/// Flat comment record, as the store holds it
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub article_slug: ArticleSlug,

    pub author_id: UserId,
    pub author_name: String,
    #[serde(
        rename = "authorPhotoURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub author_photo_url: Option<String>,

    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: Time,

    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub liked_by: BTreeMap<UserId, bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<CommentId>,
}

impl Comment {
    pub fn from_new(c: NewComment) -> Comment {
        Comment {
            id: c.id,
            article_slug: c.article,
            author_id: c.author.id,
            author_name: c.author.name,
            author_photo_url: c.author.photo_url,
            content: c.content,
            created_at: c.created_at,
            likes: 0,
            liked_by: BTreeMap::new(),
            parent_comment_id: c.target.parent(),
        }
    }

    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.liked_by.get(user).copied().unwrap_or(false)
    }

    /// Number of users currently liking this comment, the source of truth for `likes`
    pub fn count_likes(&self) -> u64 {
        self.liked_by.values().filter(|liked| **liked).count() as u64
    }

    /// Whether the cached `likes` counter agrees with `liked_by`
    pub fn is_consistent(&self) -> bool {
        self.likes == self.count_likes()
    }

    /// Drop `false` entries from `liked_by` and recompute `likes` from it
    pub fn normalize(&mut self) {
        self.liked_by.retain(|_, liked| *liked);
        self.likes = self.liked_by.len() as u64;
    }

    /// Like the comment as `user`, or unlike it if `user` already liked it.
    ///
    /// On a normalized comment this moves `likes` by exactly one, and applying
    /// it twice restores the comment.
    pub fn toggle_like(&mut self, user: UserId) -> LikeOutcome {
        let liked = match self.liked_by.remove(&user) {
            Some(true) => false,
            Some(false) | None => {
                self.liked_by.insert(user, true);
                true
            }
        };
        self.likes = self.count_likes();
        LikeOutcome {
            comment_id: self.id,
            liked,
            likes: self.likes,
        }
    }
}

/// Which part of the discussion a new comment attaches to
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum CommentTarget {
    TopLevel,
    ReplyTo(CommentId),
}

impl CommentTarget {
    pub fn parent(&self) -> Option<CommentId> {
        match self {
            CommentTarget::TopLevel => None,
            CommentTarget::ReplyTo(p) => Some(*p),
        }
    }
}

/// Author snapshot frozen into a comment when it is posted
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub photo_url: Option<String>,
}

impl From<User> for Author {
    fn from(u: User) -> Author {
        Author {
            id: u.id,
            name: u.name,
            photo_url: u.photo_url,
        }
    }
}

/// Comment submission, validated before it reaches any store
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub id: CommentId,
    pub article: ArticleSlug,
    pub author: Author,
    pub content: String,
    pub created_at: Time,
    pub target: CommentTarget,
}

impl NewComment {
    pub fn new(
        article: ArticleSlug,
        author: Author,
        content: &str,
        target: CommentTarget,
    ) -> NewComment {
        NewComment {
            id: CommentId::new(),
            article,
            author,
            content: content.trim().to_string(),
            created_at: crate::now(),
            target,
        }
    }

    // See comments on other `validate` functions throughout threadline-api
    pub fn validate(&self) -> Result<(), Error> {
        self.article.validate()?;
        crate::user::validate_name(&self.author.name)?;
        if let Some(url) = &self.author.photo_url {
            crate::validate_string(url)?;
        }
        crate::validate_string(&self.content)?;
        crate::validate_time(&self.created_at)?;
        if self.content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        let len = self.content.chars().count();
        if len > crate::MAX_CONTENT_LEN {
            return Err(Error::ContentTooLong(len));
        }
        if self.target == CommentTarget::ReplyTo(self.id) {
            return Err(Error::UnknownComment(self.id.0));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LikeOutcome {
    pub comment_id: CommentId,
    /// Whether the user likes the comment after the toggle
    pub liked: bool,
    pub likes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> Author {
        Author {
            id: UserId::stub(),
            name: String::from("Jan"),
            photo_url: None,
        }
    }

    #[test]
    fn wire_format_uses_store_field_names() {
        let mut c = Comment::from_new(NewComment::new(
            ArticleSlug::stub(),
            author(),
            "  hoi  ",
            CommentTarget::ReplyTo(CommentId::stub()),
        ));
        c.liked_by.insert(UserId::stub(), true);
        c.likes = 1;
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["articleSlug"], "stub");
        assert_eq!(json["content"], "hoi");
        assert_eq!(json["likes"], 1);
        assert_eq!(json["likedBy"][STUB_UUID.to_string()], true);
        assert_eq!(json["parentCommentId"], STUB_UUID.to_string());
        assert_eq!(json["createdAt"], c.created_at.timestamp_millis());
        assert!(json.get("authorPhotoURL").is_none());
        let back: Comment = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = serde_json::json!({
            "id": STUB_UUID,
            "articleSlug": "nieuws",
            "authorId": STUB_UUID,
            "authorName": "Anoniem",
            "content": "eerste",
            "createdAt": 1_700_000_000_000i64,
        });
        let c: Comment = serde_json::from_value(json).unwrap();
        assert_eq!(c.likes, 0);
        assert!(c.liked_by.is_empty());
        assert_eq!(c.parent_comment_id, None);
        assert!(c.is_consistent());
    }

    #[test]
    fn normalize_recounts_from_liked_by() {
        let mut c = Comment::from_new(NewComment::new(
            ArticleSlug::stub(),
            author(),
            "x",
            CommentTarget::TopLevel,
        ));
        c.liked_by.insert(UserId(Uuid::new_v4()), true);
        c.liked_by.insert(UserId(Uuid::new_v4()), false);
        c.likes = 7;
        assert!(!c.is_consistent());
        c.normalize();
        assert_eq!(c.likes, 1);
        assert_eq!(c.liked_by.len(), 1);
        assert!(c.is_consistent());
    }

    #[test]
    fn validation() {
        let ok = NewComment::new(ArticleSlug::stub(), author(), "hoi", CommentTarget::TopLevel);
        assert_eq!(ok.validate(), Ok(()));

        let mut empty = ok.clone();
        empty.content = String::from("   ");
        assert_eq!(empty.validate(), Err(Error::EmptyContent));

        let mut long = ok.clone();
        long.content = "a".repeat(crate::MAX_CONTENT_LEN + 1);
        assert_eq!(
            long.validate(),
            Err(Error::ContentTooLong(crate::MAX_CONTENT_LEN + 1))
        );

        let mut nul = ok.clone();
        nul.content = String::from("a\0b");
        assert_eq!(
            nul.validate(),
            Err(Error::NullByteInString(String::from("a\0b")))
        );

        let mut own_parent = ok.clone();
        own_parent.target = CommentTarget::ReplyTo(own_parent.id);
        assert_eq!(
            own_parent.validate(),
            Err(Error::UnknownComment(own_parent.id.0))
        );

        let mut nameless = ok;
        nameless.author.name = String::new();
        assert_eq!(nameless.validate(), Err(Error::InvalidName(String::new())));
    }
}
