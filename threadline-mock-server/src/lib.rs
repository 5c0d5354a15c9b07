use std::collections::{btree_map, BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use futures::channel::mpsc;
use threadline_api::{
    ArticleSlug, AuthToken, Comment, CommentId, CommentStore, Error, LikeOutcome, NewComment,
    NewUser, Notification, NotificationId, NotificationKind, Subscription, User, UserId, Uuid,
};
use tokio::sync::Mutex;

/// In-memory comment store, behaving like the real server minus the network
pub struct MockServer(Mutex<Db>);

#[derive(Debug)]
struct Db {
    available: bool,
    users: BTreeMap<UserId, DbUser>,
    // insertion order
    comments: Vec<Comment>,
    feeds: HashMap<ArticleSlug, Vec<mpsc::UnboundedSender<Vec<Comment>>>>,
    notifications: Vec<Notification>,
    // (comment, liker) pairs that already triggered a like notification
    notified_likes: HashSet<(CommentId, UserId)>,
}

#[derive(Debug)]
struct DbUser {
    user: User,
    sessions: HashSet<AuthToken>,
}

impl Db {
    fn check_available(&self) -> Result<(), Error> {
        if self.available {
            Ok(())
        } else {
            Err(Error::Persistence(String::from("mock server is unavailable")))
        }
    }

    fn snapshot(&self, article: &ArticleSlug) -> Vec<Comment> {
        self.comments
            .iter()
            .filter(|c| c.article_slug == *article)
            .cloned()
            .collect()
    }

    fn relay_snapshot(&mut self, article: &ArticleSlug) {
        let snapshot = self.snapshot(article);
        if let Some(feeds) = self.feeds.get_mut(article) {
            feeds.retain(|f| f.unbounded_send(snapshot.clone()).is_ok());
            if feeds.is_empty() {
                self.feeds.remove(article);
            }
        }
    }

    fn user(&self, id: &UserId) -> Result<&User, Error> {
        self.users
            .get(id)
            .map(|u| &u.user)
            .ok_or(Error::PermissionDenied)
    }

    fn resolve(&self, tok: AuthToken) -> Result<&DbUser, Error> {
        self.users
            .values()
            .find(|u| u.sessions.contains(&tok))
            .ok_or(Error::AuthRequired)
    }

    fn notify(
        &mut self,
        recipient: UserId,
        kind: NotificationKind,
        comment: &Comment,
        actor: &User,
    ) {
        tracing::debug!(?recipient, ?kind, comment = ?comment.id, "notifying user");
        self.notifications.push(Notification {
            id: NotificationId(Uuid::new_v4()),
            user_id: recipient,
            kind,
            comment_id: comment.id,
            article_slug: comment.article_slug.clone(),
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            read: false,
            created_at: threadline_api::now(),
        });
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer(Mutex::new(Db {
            available: true,
            users: BTreeMap::new(),
            comments: Vec::new(),
            feeds: HashMap::new(),
            notifications: Vec::new(),
            notified_likes: HashSet::new(),
        }))
    }

    /// Make every store operation fail with `Error::Persistence` until turned back on
    pub async fn set_available(&self, available: bool) {
        self.0.lock().await.available = available;
    }

    /// Insert a record as-is, bypassing validation, like a hand-edited database would
    pub async fn test_insert_raw_comment(&self, c: Comment) {
        let mut db = self.0.lock().await;
        let article = c.article_slug.clone();
        db.comments.push(c);
        db.relay_snapshot(&article);
    }

    /// Number of live subscriptions for `article`
    pub async fn test_num_feeds(&self, article: &ArticleSlug) -> usize {
        let db = self.0.lock().await;
        db.feeds
            .get(article)
            .map(|f| f.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of notifications addressed to `user`, account or not
    pub async fn test_num_notifications(&self, user: UserId) -> usize {
        let db = self.0.lock().await;
        db.notifications.iter().filter(|n| n.user_id == user).count()
    }

    pub async fn admin_create_user(&self, u: NewUser) -> Result<(), Error> {
        u.validate()?;
        let mut db = self.0.lock().await;
        db.check_available()?;
        match db.users.entry(u.id) {
            btree_map::Entry::Occupied(_) => Err(Error::UuidAlreadyUsed(u.id.0)),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(DbUser {
                    user: User::from(u),
                    sessions: HashSet::new(),
                });
                Ok(())
            }
        }
    }

    /// Open a session for a user the OAuth provider already authenticated
    pub async fn create_session(&self, user: UserId) -> Result<AuthToken, Error> {
        let mut db = self.0.lock().await;
        db.check_available()?;
        let u = db.users.get_mut(&user).ok_or(Error::PermissionDenied)?;
        let tok = AuthToken(Uuid::new_v4());
        u.sessions.insert(tok);
        Ok(tok)
    }

    pub async fn unauth(&self, tok: AuthToken) -> Result<(), Error> {
        let mut db = self.0.lock().await;
        for u in db.users.values_mut() {
            if u.sessions.remove(&tok) {
                return Ok(());
            }
        }
        Err(Error::PermissionDenied)
    }

    pub async fn whoami(&self, tok: AuthToken) -> Result<User, Error> {
        let db = self.0.lock().await;
        Ok(db.resolve(tok)?.user.clone())
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

#[async_trait]
impl CommentStore for MockServer {
    async fn fetch_comments(&self, article: &ArticleSlug) -> Result<Vec<Comment>, Error> {
        let db = self.0.lock().await;
        db.check_available()?;
        Ok(db.snapshot(article))
    }

    async fn subscribe_comments(&self, article: &ArticleSlug) -> Result<Subscription, Error> {
        let mut db = self.0.lock().await;
        db.check_available()?;
        let (sender, subscription) = Subscription::channel(article.clone());
        // The receiver is still alive, this cannot fail
        let _ = sender.unbounded_send(db.snapshot(article));
        db.feeds.entry(article.clone()).or_default().push(sender);
        Ok(subscription)
    }

    async fn create_comment(&self, c: NewComment) -> Result<CommentId, Error> {
        c.validate()?;
        let mut db = self.0.lock().await;
        db.check_available()?;
        let author = db.user(&c.author.id)?.clone();
        if db.comments.iter().any(|o| o.id == c.id) {
            return Err(Error::UuidAlreadyUsed(c.id.0));
        }
        let parent_author = match c.target.parent() {
            None => None,
            Some(p) => {
                let parent = db
                    .comments
                    .iter()
                    .find(|o| o.id == p && o.article_slug == c.article)
                    .ok_or(Error::UnknownComment(p.0))?;
                Some(parent.author_id)
            }
        };

        let comment = Comment::from_new(c);
        let id = comment.id;
        let article = comment.article_slug.clone();
        if let Some(recipient) =
            parent_author.filter(|r| *r != author.id && db.users.contains_key(r))
        {
            db.notify(recipient, NotificationKind::Reply, &comment, &author);
        }
        db.comments.push(comment);
        db.relay_snapshot(&article);
        Ok(id)
    }

    async fn toggle_like(&self, comment: CommentId, user: UserId) -> Result<LikeOutcome, Error> {
        let mut db = self.0.lock().await;
        db.check_available()?;
        let actor = db.user(&user)?.clone();
        let c = db
            .comments
            .iter_mut()
            .find(|c| c.id == comment)
            .ok_or(Error::UnknownComment(comment.0))?;
        let outcome = c.toggle_like(user);
        let c = c.clone();
        if outcome.liked
            && c.author_id != user
            && db.users.contains_key(&c.author_id)
            && db.notified_likes.insert((comment, user))
        {
            db.notify(c.author_id, NotificationKind::Like, &c, &actor);
        }
        db.relay_snapshot(&c.article_slug);
        Ok(outcome)
    }

    async fn fetch_notifications(&self, user: UserId) -> Result<Vec<Notification>, Error> {
        let db = self.0.lock().await;
        db.check_available()?;
        db.user(&user)?;
        let mut res = db
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user)
            .cloned()
            .collect::<Vec<_>>();
        res.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(res)
    }

    async fn mark_notification_read(
        &self,
        user: UserId,
        notification: NotificationId,
    ) -> Result<(), Error> {
        let mut db = self.0.lock().await;
        db.check_available()?;
        let n = db
            .notifications
            .iter_mut()
            .find(|n| n.id == notification && n.user_id == user)
            .ok_or(Error::PermissionDenied)?;
        n.read = true;
        Ok(())
    }
}
