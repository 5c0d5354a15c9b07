use async_trait::async_trait;
use threadline_api::{
    ArticleSlug, Comment, CommentId, CommentStore, Error as ApiError, LikeOutcome, NewComment,
    Notification, NotificationId, Subscription, UserId,
};

use crate::{db, extractors::PgPool, CommentFeeds, Error};

/// PostgreSQL-backed comment store, publishing every change to the live feeds
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
    feeds: CommentFeeds,
}

impl PgStore {
    pub fn new(db: PgPool, feeds: CommentFeeds) -> PgStore {
        PgStore { db, feeds }
    }

    pub async fn count_comments(&self, article: &ArticleSlug) -> Result<u64, Error> {
        let mut conn = self.db.acquire().await?;
        Ok(db::count_comments(&mut *conn, article).await?)
    }

    async fn relay(&self, article: &ArticleSlug) {
        if let Err(err) = self
            .feeds
            .relay_with(article, self.fetch_comments(article))
            .await
        {
            tracing::error!(?err, %article, "failed loading snapshot for subscribers");
        }
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn fetch_comments(&self, article: &ArticleSlug) -> Result<Vec<Comment>, ApiError> {
        let mut conn = self.db.acquire().await.map_err(Error::into_api)?;
        db::fetch_comments(&mut *conn, article)
            .await
            .map_err(|e| Error::Anyhow(e).into_api())
    }

    async fn subscribe_comments(&self, article: &ArticleSlug) -> Result<Subscription, ApiError> {
        self.feeds
            .subscribe_with(article, self.fetch_comments(article))
            .await
    }

    async fn create_comment(&self, comment: NewComment) -> Result<CommentId, ApiError> {
        comment.validate()?;
        let article = comment.article.clone();
        let id = {
            let mut conn = self.db.acquire().await.map_err(Error::into_api)?;
            db::create_comment(&mut *conn, comment)
                .await
                .map_err(Error::into_api)?
        };
        self.relay(&article).await;
        Ok(id)
    }

    async fn toggle_like(&self, comment: CommentId, user: UserId) -> Result<LikeOutcome, ApiError> {
        let (outcome, article) = {
            let mut conn = self.db.acquire().await.map_err(Error::into_api)?;
            db::toggle_like(&mut *conn, comment, user)
                .await
                .map_err(Error::into_api)?
        };
        self.relay(&article).await;
        Ok(outcome)
    }

    async fn fetch_notifications(&self, user: UserId) -> Result<Vec<Notification>, ApiError> {
        let mut conn = self.db.acquire().await.map_err(Error::into_api)?;
        db::fetch_notifications(&mut *conn, user)
            .await
            .map_err(|e| Error::Anyhow(e).into_api())
    }

    async fn mark_notification_read(
        &self,
        user: UserId,
        notification: NotificationId,
    ) -> Result<(), ApiError> {
        let mut conn = self.db.acquire().await.map_err(Error::into_api)?;
        db::mark_notification_read(&mut *conn, user, notification)
            .await
            .map_err(Error::into_api)
    }
}
