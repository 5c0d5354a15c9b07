use axum::{
    extract::{ws::Message, Path, State, WebSocketUpgrade},
    Json,
};
use futures::{SinkExt, StreamExt};
use threadline_api::{
    ArticleSlug, AuthToken, Comment, CommentId, CommentStore, LikeOutcome, NewComment, NewUser,
    Notification, NotificationId, User, UserId, Uuid,
};

use crate::{db, extractors::*, feeds, Error, PgStore};

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(data): Json<NewUser>,
) -> Result<(), Error> {
    data.validate()?;
    db::create_user(&mut *conn, data).await
}

pub async fn admin_create_session(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(user): Json<UserId>,
) -> Result<Json<AuthToken>, Error> {
    Ok(Json(db::create_session(&mut *conn, user).await?))
}

pub async fn unauth(user: PreAuth, mut conn: PgConn) -> Result<(), Error> {
    match db::logout_user(&mut *conn, &user.0).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::permission_denied()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn whoami(Auth(user): Auth) -> Json<User> {
    Json(user)
}

fn article(slug: String) -> Result<ArticleSlug, Error> {
    Ok(ArticleSlug::new(slug)?)
}

pub async fn fetch_comments(
    State(store): State<PgStore>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Comment>>, Error> {
    let slug = article(slug)?;
    Ok(Json(store.fetch_comments(&slug).await?))
}

pub async fn count_comments(
    State(store): State<PgStore>,
    Path(slug): Path<String>,
) -> Result<Json<u64>, Error> {
    let slug = article(slug)?;
    Ok(Json(store.count_comments(&slug).await?))
}

pub async fn submit_comment(
    Auth(user): Auth,
    State(store): State<PgStore>,
    Json(c): Json<NewComment>,
) -> Result<Json<CommentId>, Error> {
    if c.author.id != user.id {
        return Err(Error::permission_denied());
    }
    Ok(Json(store.create_comment(c).await?))
}

pub async fn toggle_like(
    Auth(user): Auth,
    State(store): State<PgStore>,
    Path(comment): Path<Uuid>,
) -> Result<Json<LikeOutcome>, Error> {
    Ok(Json(store.toggle_like(CommentId(comment), user.id).await?))
}

pub async fn fetch_notifications(
    Auth(user): Auth,
    State(store): State<PgStore>,
) -> Result<Json<Vec<Notification>>, Error> {
    Ok(Json(store.fetch_notifications(user.id).await?))
}

pub async fn mark_notification_read(
    Auth(user): Auth,
    State(store): State<PgStore>,
    Path(notification): Path<Uuid>,
) -> Result<(), Error> {
    Ok(store
        .mark_notification_read(user.id, NotificationId(notification))
        .await?)
}

pub async fn comment_feed(
    ws: WebSocketUpgrade,
    State(store): State<PgStore>,
) -> Result<axum::response::Response, Error> {
    Ok(ws.on_upgrade(move |sock| {
        let (write, read) = sock.split();
        comment_feed_impl(write, read, store)
    }))
}

pub async fn comment_feed_impl<W, R>(mut write: W, mut read: R, store: PgStore)
where
    W: 'static + Send + Unpin + futures::Sink<Message>,
    <W as futures::Sink<Message>>::Error: Send,
    R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
{
    tracing::debug!("comment feed websocket connected");
    if let Some(Ok(Message::Text(slug))) = read.next().await {
        if let Ok(article) = ArticleSlug::new(slug.clone()) {
            match store.subscribe_comments(&article).await {
                Ok(subscription) => {
                    if write.send(Message::Text(String::from("ok"))).await.is_ok() {
                        tracing::debug!(%article, "comment feed websocket subscribed");
                        feeds::relay_to_socket(subscription, write, read);
                    }
                    return;
                }
                Err(err) => {
                    tracing::info!(?err, %article, "comment feed subscription failed");
                    let _ = write.send(Message::Text(err.to_string())).await;
                    return;
                }
            }
        }
        tracing::debug!(?slug, "comment feed websocket asked for an invalid article");
        let _ = write
            .send(Message::Text(String::from("invalid article slug")))
            .await;
    }
}
