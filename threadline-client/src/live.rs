use crate::{
    api::{ArticleSlug, Comment, CommentStore, Error, Subscription},
    build_tree, SortOrder, Thread,
};

fn prepare(mut comments: Vec<Comment>, order: SortOrder) -> Thread {
    for c in comments.iter_mut() {
        if !c.is_consistent() {
            tracing::warn!(
                comment = ?c.id,
                likes = c.likes,
                "likes counter disagrees with likedBy, recounting"
            );
        }
        c.normalize();
    }
    order.sort(&mut comments);
    build_tree(comments)
}

/// One-shot load of the discussion of `article`.
///
/// A store that cannot be reached yields an empty thread, so that the page
/// still renders.
pub async fn load_thread<S: CommentStore + ?Sized>(
    store: &S,
    article: &ArticleSlug,
    order: SortOrder,
) -> Thread {
    match store.fetch_comments(article).await {
        Ok(comments) => prepare(comments, order),
        Err(err) => {
            tracing::info!(?err, %article, "failed loading comments, showing an empty thread");
            Thread::empty()
        }
    }
}

/// A thread kept up to date with the store
pub struct LiveThread {
    subscription: Subscription,
    order: SortOrder,
    thread: Thread,
}

impl LiveThread {
    /// Subscribe to `article` and wait for the store's first snapshot
    pub async fn open<S: CommentStore + ?Sized>(
        store: &S,
        article: &ArticleSlug,
        order: SortOrder,
    ) -> Result<LiveThread, Error> {
        let mut subscription = store.subscribe_comments(article).await?;
        let first = subscription.next_snapshot().await.ok_or_else(|| {
            Error::Persistence(format!("comment feed for {article} closed without a snapshot"))
        })?;
        Ok(LiveThread {
            subscription,
            order,
            thread: prepare(first, order),
        })
    }

    pub fn article(&self) -> &ArticleSlug {
        self.subscription.article()
    }

    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    /// Wait for the next change and rebuild the thread from it.
    ///
    /// Returns `false` once the store stopped sending updates.
    pub async fn refresh(&mut self) -> bool {
        match self.subscription.next_snapshot().await {
            Some(snapshot) => {
                self.thread = prepare(snapshot, self.order);
                true
            }
            None => {
                tracing::debug!(article = %self.article(), "comment feed ended");
                false
            }
        }
    }

    /// Rebuild from the latest already-received snapshot, if any, without waiting
    pub fn catch_up(&mut self) -> bool {
        let mut latest = None;
        while let Some(snapshot) = self.subscription.try_next_snapshot() {
            latest = Some(snapshot);
        }
        match latest {
            Some(snapshot) => {
                self.thread = prepare(snapshot, self.order);
                true
            }
            None => false,
        }
    }

    pub fn set_order(&mut self, order: SortOrder) {
        if order != self.order {
            self.order = order;
            let flat = self
                .thread
                .walk()
                .map(|(_, n)| n.comment().clone())
                .collect();
            self.thread = prepare(flat, order);
        }
    }

    pub fn close(self) {
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use threadline_mock_server::MockServer;

    use super::*;
    use crate::api::{Author, CommentId, CommentTarget, NewComment, NewUser, User, UserId, Uuid};

    async fn server_with_user() -> (MockServer, User) {
        let server = MockServer::new();
        let u = NewUser::new(UserId(Uuid::new_v4()), String::from("anna"), None);
        server.admin_create_user(u.clone()).await.unwrap();
        (server, User::from(u))
    }

    fn post(user: &User, content: &str, target: CommentTarget) -> NewComment {
        NewComment::new(ArticleSlug::stub(), Author::from(user.clone()), content, target)
    }

    fn raw(n: u128, parent: Option<u128>, t: i64) -> Comment {
        use chrono::TimeZone;
        Comment {
            id: CommentId(Uuid::from_u128(n)),
            article_slug: ArticleSlug::stub(),
            author_id: UserId::stub(),
            author_name: String::from("import"),
            author_photo_url: None,
            content: format!("{n}"),
            created_at: chrono::Utc.timestamp_millis_opt(t).unwrap(),
            likes: 0,
            liked_by: Default::default(),
            parent_comment_id: parent.map(|p| CommentId(Uuid::from_u128(p))),
        }
    }

    fn root_ids(thread: &Thread) -> Vec<u128> {
        thread
            .roots()
            .iter()
            .map(|r| r.comment().id.0.as_u128())
            .collect()
    }

    #[tokio::test]
    async fn unreachable_store_shows_nothing() {
        let (server, user) = server_with_user().await;
        server
            .create_comment(post(&user, "hoi", CommentTarget::TopLevel))
            .await
            .unwrap();
        server.set_available(false).await;
        let thread = load_thread(&server, &ArticleSlug::stub(), SortOrder::Oldest).await;
        assert!(thread.is_empty());
        assert!(matches!(
            LiveThread::open(&server, &ArticleSlug::stub(), SortOrder::Oldest).await,
            Err(Error::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn roots_in_creation_order() {
        let server = MockServer::new();
        server.test_insert_raw_comment(raw(2, None, 20)).await;
        server.test_insert_raw_comment(raw(1, None, 10)).await;
        let thread = load_thread(&server, &ArticleSlug::stub(), SortOrder::Oldest).await;
        assert_eq!(root_ids(&thread), vec![1, 2]);
        let thread = load_thread(&server, &ArticleSlug::stub(), SortOrder::Newest).await;
        assert_eq!(root_ids(&thread), vec![2, 1]);
    }

    #[tokio::test]
    async fn inconsistent_likes_are_recounted() {
        let server = MockServer::new();
        let mut c = raw(1, None, 10);
        c.likes = 12;
        c.liked_by.insert(UserId(Uuid::from_u128(5)), true);
        c.liked_by.insert(UserId(Uuid::from_u128(6)), false);
        server.test_insert_raw_comment(c).await;
        let thread = load_thread(&server, &ArticleSlug::stub(), SortOrder::Oldest).await;
        let loaded = thread.roots()[0].comment();
        assert_eq!(loaded.likes, 1);
        assert_eq!(loaded.liked_by.len(), 1);
    }

    #[tokio::test]
    async fn follows_the_store() {
        let (server, user) = server_with_user().await;
        let mut live = LiveThread::open(&server, &ArticleSlug::stub(), SortOrder::Oldest)
            .await
            .unwrap();
        assert!(live.thread().is_empty());

        let root = server
            .create_comment(post(&user, "vraag", CommentTarget::TopLevel))
            .await
            .unwrap();
        assert!(live.refresh().await);
        assert_eq!(live.thread().len(), 1);

        server
            .create_comment(post(&user, "antwoord", CommentTarget::ReplyTo(root)))
            .await
            .unwrap();
        server.toggle_like(root, user.id).await.unwrap();
        assert!(live.catch_up());
        assert!(!live.catch_up());
        let thread = live.thread();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread.roots()[0].comment().likes, 1);
        assert_eq!(thread.roots()[0].replies()[0].comment().content, "antwoord");

        live.close();
        assert_eq!(server.test_num_feeds(&ArticleSlug::stub()).await, 0);
    }

    #[tokio::test]
    async fn reordering_keeps_every_comment() {
        let server = MockServer::new();
        for (n, t) in [(1, 10), (2, 30), (3, 20)] {
            server.test_insert_raw_comment(raw(n, None, t)).await;
        }
        server.test_insert_raw_comment(raw(4, Some(1), 40)).await;
        let mut live = LiveThread::open(&server, &ArticleSlug::stub(), SortOrder::Oldest)
            .await
            .unwrap();
        assert_eq!(root_ids(live.thread()), vec![1, 3, 2]);
        live.set_order(SortOrder::Newest);
        assert_eq!(root_ids(live.thread()), vec![2, 3, 1]);
        assert_eq!(live.thread().len(), 4);
        assert!(live.thread().find(&CommentId(Uuid::from_u128(4))).is_some());
    }
}
