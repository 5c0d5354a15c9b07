use std::{collections::HashMap, future::Future, sync::Arc};

use axum::extract::ws::Message;
use futures::{channel::mpsc, select, SinkExt, StreamExt};
use threadline_api::{ArticleSlug, Comment, FeedMessage, Subscription, Uuid};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

type Subscribers = HashMap<Uuid, mpsc::UnboundedSender<Vec<Comment>>>;

/// Live subscribers of every article, each receiving full snapshots
#[derive(Clone, Debug)]
pub struct CommentFeeds {
    subs: Arc<RwLock<HashMap<ArticleSlug, Subscribers>>>,
    // Held from the loading of a snapshot until it was sent, so that subscribers
    // see snapshots in the order they were loaded
    loading: Arc<Mutex<HashMap<ArticleSlug, Arc<Mutex<()>>>>>,
}

impl CommentFeeds {
    pub fn new() -> CommentFeeds {
        CommentFeeds {
            subs: Arc::new(RwLock::new(HashMap::new())),
            loading: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn lock_article(&self, article: &ArticleSlug) -> OwnedMutexGuard<()> {
        let lock = self
            .loading
            .lock()
            .await
            .entry(article.clone())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Register a subscriber of `article`, which first receives `snapshot`
    pub async fn subscribe(&self, article: ArticleSlug, snapshot: Vec<Comment>) -> Subscription {
        let (sender, subscription) = Subscription::channel(article.clone());
        // Cannot fail, the receiver is still in our hands
        let _ = sender.unbounded_send(snapshot);
        self.subs
            .write()
            .await
            .entry(article)
            .or_insert_with(HashMap::new)
            .insert(Uuid::new_v4(), sender);
        subscription
    }

    /// Register a subscriber of `article` whose first snapshot is `load`
    ///
    /// No relay of `article` can happen between the loading and the registration.
    pub async fn subscribe_with<F, E>(&self, article: &ArticleSlug, load: F) -> Result<Subscription, E>
    where
        F: Future<Output = Result<Vec<Comment>, E>>,
    {
        let guard = self.lock_article(article).await;
        match load.await {
            Ok(snapshot) => Ok(self.subscribe(article.clone(), snapshot).await),
            Err(err) => {
                std::mem::drop(guard);
                self.prune(article).await;
                Err(err)
            }
        }
    }

    pub async fn has_subscribers(&self, article: &ArticleSlug) -> bool {
        self.subs
            .read()
            .await
            .get(article)
            .map(|subs| subs.values().any(|s| !s.is_closed()))
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub async fn num_subscribers(&self, article: &ArticleSlug) -> usize {
        self.subs.read().await.get(article).map(|s| s.len()).unwrap_or(0)
    }

    /// Forget the subscribers of `article` that went away
    pub async fn prune(&self, article: &ArticleSlug) {
        let mut feeds = self.subs.write().await;
        if let Some(subs) = feeds.get_mut(article) {
            subs.retain(|_, s| !s.is_closed());
            if subs.is_empty() {
                feeds.remove(article);
            }
        }
        if !feeds.contains_key(article) {
            let mut loading = self.loading.lock().await;
            if loading.get(article).map(|l| Arc::strong_count(l) == 1) == Some(true) {
                loading.remove(article);
            }
        }
    }

    /// Send `snapshot` to all subscribers of `article`, forgetting the ones that left
    pub async fn relay_snapshot(&self, article: &ArticleSlug, snapshot: Vec<Comment>) {
        let mut feeds = self.subs.write().await;
        let Some(subs) = feeds.get_mut(article) else {
            return;
        };
        subs.retain(|_, s| s.unbounded_send(snapshot.clone()).is_ok());
        tracing::debug!(%article, subscribers = subs.len(), "relayed comment snapshot");
        if subs.is_empty() {
            feeds.remove(article);
        }
    }

    /// Send the snapshot returned by `load` to all subscribers of `article`
    ///
    /// Concurrent relays of one article load and send one after the other, so the
    /// last snapshot every subscriber receives is the last one loaded. `load` is
    /// not awaited at all when nobody listens.
    pub async fn relay_with<F, E>(&self, article: &ArticleSlug, load: F) -> Result<(), E>
    where
        F: Future<Output = Result<Vec<Comment>, E>>,
    {
        let guard = self.lock_article(article).await;
        if !self.has_subscribers(article).await {
            std::mem::drop(guard);
            self.prune(article).await;
            return Ok(());
        }
        let snapshot = load.await?;
        self.relay_snapshot(article, snapshot).await;
        Ok(())
    }
}

/// Forward `subscription` to a websocket until either side goes away
pub fn relay_to_socket<W, R>(subscription: Subscription, mut write: W, read: R)
where
    W: 'static + Send + Unpin + futures::Sink<Message>,
    <W as futures::Sink<Message>>::Error: Send,
    R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
{
    let mut read = read.fuse();
    let article = subscription.article().clone();
    let mut snapshots = subscription.fuse();
    tokio::spawn(async move {
        macro_rules! send_message {
            ( $msg:expr ) => {{
                let msg: FeedMessage = $msg;
                let json = match serde_json::to_vec(&msg) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::error!(?err, ?msg, "failed serializing message to json");
                        continue;
                    }
                };
                if write.send(Message::Binary(json)).await.is_err() {
                    break;
                }
            }};
        }
        loop {
            select! {
                snapshot = snapshots.next() => match snapshot {
                    None => break,
                    Some(snapshot) => send_message!(FeedMessage::Snapshot(article.clone(), snapshot)),
                },
                msg = read.next() => match msg {
                    None => break,
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Text(msg))) if msg == "ping" => {
                        send_message!(FeedMessage::Pong);
                    }
                    Some(msg) => {
                        tracing::warn!("received unexpected message from client: {msg:?}");
                        break;
                    }
                },
            }
        }
        tracing::debug!(%article, "comment feed websocket closed");
        // Dropping the subscription lets the next relay forget this socket
        std::mem::drop(snapshots);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_api::{Author, CommentTarget, NewComment, UserId};

    fn comment(content: &str) -> Comment {
        Comment::from_new(NewComment::new(
            ArticleSlug::stub(),
            Author {
                id: UserId::stub(),
                name: String::from("anna"),
                photo_url: None,
            },
            content,
            CommentTarget::TopLevel,
        ))
    }

    fn parse(msg: Message) -> FeedMessage {
        match msg {
            Message::Binary(b) => serde_json::from_slice(&b).unwrap(),
            m => panic!("unexpected message {m:?}"),
        }
    }

    #[tokio::test]
    async fn subscribers_get_snapshots_until_they_leave() {
        let feeds = CommentFeeds::new();
        let article = ArticleSlug::stub();
        let mut first = feeds.subscribe(article.clone(), Vec::new()).await;
        let second = feeds.subscribe(article.clone(), Vec::new()).await;
        assert_eq!(first.next_snapshot().await, Some(Vec::new()));
        assert!(feeds.has_subscribers(&article).await);

        second.unsubscribe();
        let snapshot = vec![comment("hoi")];
        feeds.relay_snapshot(&article, snapshot.clone()).await;
        assert_eq!(first.next_snapshot().await, Some(snapshot));
        assert_eq!(feeds.num_subscribers(&article).await, 1);

        std::mem::drop(first);
        assert!(!feeds.has_subscribers(&article).await);
        feeds.prune(&article).await;
        assert_eq!(feeds.num_subscribers(&article).await, 0);
    }

    #[tokio::test]
    async fn other_articles_are_not_disturbed() {
        let feeds = CommentFeeds::new();
        let other = ArticleSlug::new("ander-artikel").unwrap();
        let mut sub = feeds.subscribe(other.clone(), Vec::new()).await;
        sub.next_snapshot().await;
        feeds
            .relay_snapshot(&ArticleSlug::stub(), vec![comment("hoi")])
            .await;
        assert_eq!(sub.try_next_snapshot(), None);
    }

    #[tokio::test]
    async fn snapshots_arrive_in_load_order() {
        let feeds = CommentFeeds::new();
        let article = ArticleSlug::stub();
        let mut sub = feeds.subscribe(article.clone(), Vec::new()).await;
        sub.next_snapshot().await;

        let first = comment("eerste");
        let older = vec![first.clone()];
        let newer = vec![first, comment("tweede")];

        // The older snapshot is still loading while the newer one is ready
        let (started, is_started) = tokio::sync::oneshot::channel::<()>();
        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let slow = tokio::spawn({
            let (feeds, article, older) = (feeds.clone(), article.clone(), older.clone());
            async move {
                feeds
                    .relay_with(&article, async move {
                        let _ = started.send(());
                        let _ = released.await;
                        Ok::<_, ()>(older)
                    })
                    .await
            }
        });
        is_started.await.unwrap();
        let fast = tokio::spawn({
            let (feeds, article, newer) = (feeds.clone(), article.clone(), newer.clone());
            async move { feeds.relay_with(&article, async move { Ok::<_, ()>(newer) }).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(sub.try_next_snapshot(), None);

        release.send(()).unwrap();
        slow.await.unwrap().unwrap();
        fast.await.unwrap().unwrap();
        assert_eq!(sub.next_snapshot().await, Some(older));
        assert_eq!(sub.next_snapshot().await, Some(newer));
        assert_eq!(sub.try_next_snapshot(), None);
    }

    #[tokio::test]
    async fn subscribing_waits_for_running_relays() {
        let feeds = CommentFeeds::new();
        let article = ArticleSlug::stub();
        let mut early = feeds.subscribe(article.clone(), Vec::new()).await;
        early.next_snapshot().await;

        let written = vec![comment("hoi")];
        let (started, is_started) = tokio::sync::oneshot::channel::<()>();
        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let relay = tokio::spawn({
            let (feeds, article, written) = (feeds.clone(), article.clone(), written.clone());
            async move {
                feeds
                    .relay_with(&article, async move {
                        let _ = started.send(());
                        let _ = released.await;
                        Ok::<_, ()>(written)
                    })
                    .await
            }
        });
        is_started.await.unwrap();
        let late = tokio::spawn({
            let (feeds, article, written) = (feeds.clone(), article.clone(), written.clone());
            async move {
                feeds
                    .subscribe_with(&article, async move { Ok::<_, ()>(written) })
                    .await
            }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(feeds.num_subscribers(&article).await, 1);

        release.send(()).unwrap();
        relay.await.unwrap().unwrap();
        let mut late = late.await.unwrap().unwrap();
        assert_eq!(early.next_snapshot().await, Some(written.clone()));
        assert_eq!(late.next_snapshot().await, Some(written));
        assert_eq!(late.try_next_snapshot(), None);
    }

    #[tokio::test]
    async fn nothing_is_loaded_without_subscribers() {
        let feeds = CommentFeeds::new();
        let res = feeds
            .relay_with(&ArticleSlug::stub(), async { Err::<Vec<Comment>, _>("loaded") })
            .await;
        assert_eq!(res, Ok(()));
        assert_eq!(
            feeds
                .subscribe_with(&ArticleSlug::stub(), async { Err::<Vec<Comment>, _>("down") })
                .await
                .err(),
            Some("down")
        );
        assert_eq!(feeds.num_subscribers(&ArticleSlug::stub()).await, 0);
        assert!(feeds.loading.lock().await.is_empty());
    }

    #[tokio::test]
    async fn socket_relay() {
        let feeds = CommentFeeds::new();
        let article = ArticleSlug::stub();
        let sub = feeds.subscribe(article.clone(), Vec::new()).await;
        let (write, mut from_server) = mpsc::unbounded::<Message>();
        let (to_server, read) = mpsc::unbounded::<Result<Message, axum::Error>>();
        relay_to_socket(sub, write, read);

        assert_eq!(
            parse(from_server.next().await.unwrap()),
            FeedMessage::Snapshot(article.clone(), Vec::new())
        );
        to_server
            .unbounded_send(Ok(Message::Text(String::from("ping"))))
            .unwrap();
        assert_eq!(parse(from_server.next().await.unwrap()), FeedMessage::Pong);

        let snapshot = vec![comment("nieuw")];
        feeds.relay_snapshot(&article, snapshot.clone()).await;
        assert_eq!(
            parse(from_server.next().await.unwrap()),
            FeedMessage::Snapshot(article.clone(), snapshot)
        );

        to_server.unbounded_send(Ok(Message::Close(None))).unwrap();
        assert_eq!(from_server.next().await, None);
        feeds.relay_snapshot(&article, Vec::new()).await;
        assert_eq!(feeds.num_subscribers(&article).await, 0);
    }
}
