use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::{channel::mpsc, Stream, StreamExt};

use crate::{
    ArticleSlug, Comment, CommentId, Error, LikeOutcome, NewComment, Notification,
    NotificationId, UserId,
};

/// Persistence contract for the comments of all articles.
///
/// Implementations are the single source of truth: every tree a client shows
/// is rebuilt from what these methods return.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Every flat comment record of `article`, in no particular order
    async fn fetch_comments(&self, article: &ArticleSlug) -> Result<Vec<Comment>, Error>;

    /// Live view of `article`: yields the current snapshot right away, then a
    /// full snapshot after each change. Dropping the handle unsubscribes.
    async fn subscribe_comments(&self, article: &ArticleSlug) -> Result<Subscription, Error>;

    /// Persist a validated comment submission, returning its id
    async fn create_comment(&self, comment: NewComment) -> Result<CommentId, Error>;

    /// Flip the presence of `user` in the comment's `liked_by`, keeping `likes` in sync
    async fn toggle_like(&self, comment: CommentId, user: UserId) -> Result<LikeOutcome, Error>;

    /// Notifications addressed to `user`, newest first
    async fn fetch_notifications(&self, user: UserId) -> Result<Vec<Notification>, Error>;

    async fn mark_notification_read(
        &self,
        user: UserId,
        notification: NotificationId,
    ) -> Result<(), Error>;
}

#[async_trait]
impl<S: CommentStore + ?Sized> CommentStore for Arc<S> {
    async fn fetch_comments(&self, article: &ArticleSlug) -> Result<Vec<Comment>, Error> {
        (**self).fetch_comments(article).await
    }

    async fn subscribe_comments(&self, article: &ArticleSlug) -> Result<Subscription, Error> {
        (**self).subscribe_comments(article).await
    }

    async fn create_comment(&self, comment: NewComment) -> Result<CommentId, Error> {
        (**self).create_comment(comment).await
    }

    async fn toggle_like(&self, comment: CommentId, user: UserId) -> Result<LikeOutcome, Error> {
        (**self).toggle_like(comment, user).await
    }

    async fn fetch_notifications(&self, user: UserId) -> Result<Vec<Notification>, Error> {
        (**self).fetch_notifications(user).await
    }

    async fn mark_notification_read(
        &self,
        user: UserId,
        notification: NotificationId,
    ) -> Result<(), Error> {
        (**self).mark_notification_read(user, notification).await
    }
}

/// Receiving end of a live comment subscription
#[derive(Debug)]
pub struct Subscription {
    article: ArticleSlug,
    receiver: mpsc::UnboundedReceiver<Vec<Comment>>,
}

impl Subscription {
    /// Create a subscription along with the sender a store publishes snapshots to.
    ///
    /// Sends start failing once the subscription is dropped or unsubscribed,
    /// which is the signal for the store to forget the sender.
    pub fn channel(article: ArticleSlug) -> (mpsc::UnboundedSender<Vec<Comment>>, Subscription) {
        let (sender, receiver) = mpsc::unbounded();
        (sender, Subscription { article, receiver })
    }

    pub fn article(&self) -> &ArticleSlug {
        &self.article
    }

    /// Wait for the next full snapshot, `None` once the store went away
    pub async fn next_snapshot(&mut self) -> Option<Vec<Comment>> {
        self.receiver.next().await
    }

    /// Snapshot already queued, without waiting
    pub fn try_next_snapshot(&mut self) -> Option<Vec<Comment>> {
        self.receiver.try_next().ok().flatten()
    }

    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}

impl Stream for Subscription {
    type Item = Vec<Comment>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_the_subscription_closes_the_sender() {
        let (sender, mut sub) = Subscription::channel(ArticleSlug::stub());
        sender.unbounded_send(Vec::new()).unwrap();
        assert_eq!(sub.next_snapshot().await, Some(Vec::new()));
        assert_eq!(sub.try_next_snapshot(), None);
        sub.unsubscribe();
        assert!(sender.unbounded_send(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn store_going_away_ends_the_subscription() {
        let (sender, mut sub) = Subscription::channel(ArticleSlug::stub());
        std::mem::drop(sender);
        assert_eq!(sub.next_snapshot().await, None);
    }
}
