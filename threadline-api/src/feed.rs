use crate::{ArticleSlug, Comment};

/// Messages pushed to comment feed subscribers
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FeedMessage {
    Pong,
    /// Every comment currently stored for the article
    Snapshot(ArticleSlug, Vec<Comment>),
}
