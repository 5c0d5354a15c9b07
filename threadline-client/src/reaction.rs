use crate::{
    api::{ArticleSlug, CommentId, CommentStore, CommentTarget, Error, LikeOutcome, NewComment},
    Session,
};

/// Entry point for everything a reader does to a discussion.
///
/// Notifications for the affected authors are produced by the store itself,
/// so that they follow what was actually persisted.
pub struct ReactionCoordinator<S> {
    store: S,
}

fn signed_in(session: Option<&Session>) -> Result<&Session, Error> {
    session.ok_or_else(|| {
        tracing::info!("refusing reaction from a signed-out reader");
        Error::AuthRequired
    })
}

impl<S: CommentStore> ReactionCoordinator<S> {
    pub fn new(store: S) -> ReactionCoordinator<S> {
        ReactionCoordinator { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Like `comment`, or take the like back if the reader already liked it
    pub async fn like(
        &self,
        session: Option<&Session>,
        comment: CommentId,
    ) -> Result<LikeOutcome, Error> {
        let session = signed_in(session)?;
        let outcome = self.store.toggle_like(comment, session.user_id()).await?;
        tracing::debug!(?outcome, user = ?session.user_id(), "toggled like");
        Ok(outcome)
    }

    /// Post a prepared submission, which must be authored by the session's user
    pub async fn post(
        &self,
        session: Option<&Session>,
        comment: NewComment,
    ) -> Result<CommentId, Error> {
        let session = signed_in(session)?;
        if comment.author.id != session.user_id() {
            return Err(Error::PermissionDenied);
        }
        comment.validate()?;
        self.store.create_comment(comment).await
    }

    pub async fn comment(
        &self,
        session: Option<&Session>,
        article: ArticleSlug,
        content: &str,
    ) -> Result<CommentId, Error> {
        let session = signed_in(session)?;
        let c = session.new_comment(article, content, CommentTarget::TopLevel);
        self.post(Some(session), c).await
    }

    pub async fn reply(
        &self,
        session: Option<&Session>,
        article: ArticleSlug,
        parent: CommentId,
        content: &str,
    ) -> Result<CommentId, Error> {
        let session = signed_in(session)?;
        let c = session.reply(article, parent, content);
        self.post(Some(session), c).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use threadline_mock_server::MockServer;

    use super::*;
    use crate::api::{Comment, NewUser, NotificationKind, User, UserId, Uuid};

    async fn setup(names: &[&str]) -> (ReactionCoordinator<Arc<MockServer>>, Vec<Session>) {
        let server = Arc::new(MockServer::new());
        let mut sessions = Vec::new();
        for name in names {
            let u = NewUser::new(UserId(Uuid::new_v4()), name.to_string(), None);
            server.admin_create_user(u.clone()).await.unwrap();
            let tok = server.create_session(u.id).await.unwrap();
            sessions.push(Session::new(User::from(u), tok));
        }
        (ReactionCoordinator::new(server), sessions)
    }

    #[tokio::test]
    async fn signed_out_readers_cannot_react() {
        let (coord, sessions) = setup(&["anna"]).await;
        let c = coord
            .comment(Some(&sessions[0]), ArticleSlug::stub(), "hoi")
            .await
            .unwrap();
        assert_eq!(coord.like(None, c).await, Err(Error::AuthRequired));
        assert_eq!(
            coord.comment(None, ArticleSlug::stub(), "hoi").await,
            Err(Error::AuthRequired)
        );
        assert_eq!(
            coord.reply(None, ArticleSlug::stub(), c, "hoi").await,
            Err(Error::AuthRequired)
        );
        let comments = coord.store().fetch_comments(&ArticleSlug::stub()).await.unwrap();
        assert_eq!(comments[0].likes, 0);
    }

    #[tokio::test]
    async fn cannot_post_for_someone_else() {
        let (coord, sessions) = setup(&["anna", "bram"]).await;
        let forged =
            sessions[1].new_comment(ArticleSlug::stub(), "namens bram", CommentTarget::TopLevel);
        assert_eq!(
            coord.post(Some(&sessions[0]), forged).await,
            Err(Error::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn invalid_comments_never_reach_the_store() {
        let (coord, sessions) = setup(&["anna"]).await;
        assert_eq!(
            coord.comment(Some(&sessions[0]), ArticleSlug::stub(), "   ").await,
            Err(Error::EmptyContent)
        );
        assert!(coord
            .store()
            .fetch_comments(&ArticleSlug::stub())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn like_then_unlike() {
        let (coord, sessions) = setup(&["anna", "bram"]).await;
        let (anna, bram) = (&sessions[0], &sessions[1]);
        let c = coord
            .comment(Some(anna), ArticleSlug::stub(), "eerste")
            .await
            .unwrap();

        let liked = coord.like(Some(bram), c).await.unwrap();
        assert!(liked.liked);
        assert_eq!(liked.likes, 1);
        let stored = coord.store().fetch_comments(&ArticleSlug::stub()).await.unwrap();
        assert!(stored[0].is_liked_by(&bram.user_id()));
        assert!(stored[0].is_consistent());

        let unliked = coord.like(Some(bram), c).await.unwrap();
        assert!(!unliked.liked);
        assert_eq!(unliked.likes, 0);
        let stored = coord.store().fetch_comments(&ArticleSlug::stub()).await.unwrap();
        assert!(stored[0].liked_by.is_empty());

        let notifs = coord.store().fetch_notifications(anna.user_id()).await.unwrap();
        assert_eq!(notifs.len(), 1);
        assert_eq!(notifs[0].kind, NotificationKind::Like);
    }

    #[tokio::test]
    async fn replies_notify_the_parent_author() {
        let (coord, sessions) = setup(&["anna", "bram"]).await;
        let (anna, bram) = (&sessions[0], &sessions[1]);
        let root = coord
            .comment(Some(anna), ArticleSlug::stub(), "vraag")
            .await
            .unwrap();
        let reply = coord
            .reply(Some(bram), ArticleSlug::stub(), root, "antwoord")
            .await
            .unwrap();
        let notifs = coord.store().fetch_notifications(anna.user_id()).await.unwrap();
        assert_eq!(notifs.len(), 1);
        assert_eq!(notifs[0].kind, NotificationKind::Reply);
        assert_eq!(notifs[0].comment_id, reply);
        assert!(coord
            .store()
            .fetch_notifications(bram.user_id())
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn toggling_from_scratch() {
        let c1 = CommentId(Uuid::from_u128(1));
        let u1 = UserId(Uuid::from_u128(1));
        let mut c = Comment::from_new(NewComment::new(
            ArticleSlug::stub(),
            crate::api::Author {
                id: UserId::stub(),
                name: String::from("anna"),
                photo_url: None,
            },
            "x",
            CommentTarget::TopLevel,
        ));
        c.id = c1;
        let before = c.clone();

        let first = c.toggle_like(u1);
        assert_eq!(first.likes, 1);
        assert_eq!(c.liked_by.get(&u1), Some(&true));
        let second = c.toggle_like(u1);
        assert_eq!(second.likes, 0);
        assert!(c.liked_by.is_empty());
        assert_eq!(c, before);
    }

    #[test]
    fn toggling_is_its_own_inverse() {
        bolero::check!()
            .with_type::<(Vec<u8>, u8)>()
            .cloned()
            .for_each(|(likers, user)| {
                let mut c = Comment::from_new(NewComment::new(
                    ArticleSlug::stub(),
                    crate::api::Author {
                        id: UserId::stub(),
                        name: String::from("anna"),
                        photo_url: None,
                    },
                    "x",
                    CommentTarget::TopLevel,
                ));
                for l in likers {
                    c.toggle_like(UserId(Uuid::from_u128(l as u128)));
                }
                let before = c.clone();
                let user = UserId(Uuid::from_u128(user as u128));
                let was_liked = c.is_liked_by(&user);

                let first = c.toggle_like(user);
                assert_eq!(first.liked, !was_liked);
                assert_eq!(first.likes.abs_diff(before.likes), 1);
                assert!(c.is_consistent());

                c.toggle_like(user);
                assert_eq!(c, before);
            });
    }
}
