use anyhow::Context;
use futures::TryStreamExt;
use sqlx::{Connection, Row};
use std::collections::BTreeMap;
use threadline_api::{
    ArticleSlug, AuthToken, Comment, CommentId, Error as ApiError, LikeOutcome, NewComment,
    NewUser, Notification, NotificationId, NotificationKind, Time, User, UserId, Uuid,
};

use crate::Error;

pub async fn create_user(conn: &mut sqlx::PgConnection, user: NewUser) -> Result<(), Error> {
    let res = sqlx::query(
        "INSERT INTO users (id, name, photo_url) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
    )
    .bind(user.id.0)
    .bind(&user.name)
    .bind(&user.photo_url)
    .execute(conn)
    .await
    .with_context(|| format!("inserting user {:?}", user.id))?;
    if res.rows_affected() == 0 {
        return Err(Error::uuid_already_used(user.id.0));
    }
    Ok(())
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<User> {
    Ok(User {
        id: UserId(row.try_get("id").context("retrieving the id field")?),
        name: row.try_get("name").context("retrieving the name field")?,
        photo_url: row
            .try_get("photo_url")
            .context("retrieving the photo_url field")?,
    })
}

async fn fetch_user(conn: &mut sqlx::PgConnection, user: UserId) -> anyhow::Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, photo_url FROM users WHERE id = $1")
        .bind(user.0)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("fetching user {:?}", user))?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn create_session(
    conn: &mut sqlx::PgConnection,
    user: UserId,
) -> Result<AuthToken, Error> {
    if fetch_user(&mut *conn, user).await?.is_none() {
        return Err(Error::permission_denied());
    }
    let token = AuthToken(Uuid::new_v4());
    sqlx::query("INSERT INTO sessions (id, user_id) VALUES ($1, $2)")
        .bind(token.0)
        .bind(user.0)
        .execute(conn)
        .await
        .with_context(|| format!("opening session for user {:?}", user))?;
    Ok(token)
}

pub async fn logout_user(
    conn: &mut sqlx::PgConnection,
    token: &AuthToken,
) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(token.0)
        .execute(conn)
        .await
        .context("deleting session")?;
    Ok(res.rows_affected() == 1)
}

pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> Result<User, Error> {
    let row = sqlx::query(
        "
            SELECT users.id, users.name, users.photo_url
                FROM sessions
            INNER JOIN users
                ON users.id = sessions.user_id
            WHERE sessions.id = $1
        ",
    )
    .bind(token.0)
    .fetch_optional(conn)
    .await
    .context("recovering session")?
    .ok_or(Error::Api(ApiError::AuthRequired))?;
    Ok(user_from_row(&row)?)
}

fn comment_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<Comment> {
    let liked_by = row
        .try_get::<Vec<Uuid>, _>("liked_by")
        .context("retrieving the liked_by field")?
        .into_iter()
        .map(|u| (UserId(u), true))
        .collect::<BTreeMap<_, _>>();
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        article_slug: ArticleSlug(
            row.try_get("article_slug")
                .context("retrieving the article_slug field")?,
        ),
        author_id: UserId(
            row.try_get("author_id")
                .context("retrieving the author_id field")?,
        ),
        author_name: row
            .try_get("author_name")
            .context("retrieving the author_name field")?,
        author_photo_url: row
            .try_get("author_photo_url")
            .context("retrieving the author_photo_url field")?,
        content: row
            .try_get("content")
            .context("retrieving the content field")?,
        created_at: row
            .try_get::<Time, _>("created_at")
            .context("retrieving the created_at field")?,
        likes: liked_by.len() as u64,
        liked_by,
        parent_comment_id: row
            .try_get::<Option<Uuid>, _>("parent_id")
            .context("retrieving the parent_id field")?
            .map(CommentId),
    })
}

pub async fn fetch_comments(
    conn: &mut sqlx::PgConnection,
    article: &ArticleSlug,
) -> anyhow::Result<Vec<Comment>> {
    let mut rows = sqlx::query(
        "
            SELECT
                c.id, c.article_slug, c.author_id, c.author_name, c.author_photo_url,
                c.content, c.created_at, c.parent_id,
                COALESCE(
                    array_agg(l.user_id) FILTER (WHERE l.user_id IS NOT NULL),
                    '{}'
                ) AS liked_by
            FROM comments c
            LEFT JOIN comment_likes l
                ON l.comment_id = c.id
            WHERE c.article_slug = $1
            GROUP BY c.id
            ORDER BY c.created_at, c.id
        ",
    )
    .bind(article.as_str())
    .fetch(conn);
    let mut res = Vec::new();
    while let Some(row) = rows
        .try_next()
        .await
        .with_context(|| format!("querying comments of {article}"))?
    {
        res.push(comment_from_row(&row)?);
    }
    Ok(res)
}

pub async fn count_comments(
    conn: &mut sqlx::PgConnection,
    article: &ArticleSlug,
) -> anyhow::Result<u64> {
    let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM comments WHERE article_slug = $1")
        .bind(article.as_str())
        .fetch_one(conn)
        .await
        .with_context(|| format!("counting comments of {article}"))?
        .try_get("count")
        .context("retrieving the count field")?;
    Ok(count.max(0) as u64)
}

async fn insert_notification(
    conn: &mut sqlx::PgConnection,
    recipient: UserId,
    kind: NotificationKind,
    comment: CommentId,
    article: &ArticleSlug,
    actor: &User,
) -> anyhow::Result<()> {
    sqlx::query(
        "
            INSERT INTO notifications
                (id, user_id, kind, comment_id, article_slug, actor_id, actor_name, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(Uuid::new_v4())
    .bind(recipient.0)
    .bind(kind.as_str())
    .bind(comment.0)
    .bind(article.as_str())
    .bind(actor.id.0)
    .bind(&actor.name)
    .bind(threadline_api::now())
    .execute(conn)
    .await
    .with_context(|| format!("notifying {:?} of {} on {:?}", recipient, kind.as_str(), comment))?;
    Ok(())
}

/// Insert an already-validated comment, notifying the parent's author of replies
pub async fn create_comment(
    conn: &mut sqlx::PgConnection,
    c: NewComment,
) -> Result<CommentId, Error> {
    let mut tx = conn.begin().await.context("starting transaction")?;
    let author = fetch_user(&mut *tx, c.author.id)
        .await?
        .ok_or(Error::permission_denied())?;

    let parent_author = match c.target.parent() {
        None => None,
        Some(parent) => {
            let row = sqlx::query(
                "SELECT author_id FROM comments WHERE id = $1 AND article_slug = $2",
            )
            .bind(parent.0)
            .bind(c.article.as_str())
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("checking parent comment {:?}", parent))?
            .ok_or(Error::Api(ApiError::UnknownComment(parent.0)))?;
            Some(UserId(
                row.try_get("author_id")
                    .context("retrieving the author_id field")?,
            ))
        }
    };

    let res = sqlx::query(
        "
            INSERT INTO comments
                (id, article_slug, author_id, author_name, author_photo_url,
                 content, created_at, parent_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT DO NOTHING
        ",
    )
    .bind(c.id.0)
    .bind(c.article.as_str())
    .bind(c.author.id.0)
    .bind(&c.author.name)
    .bind(&c.author.photo_url)
    .bind(&c.content)
    .bind(c.created_at)
    .bind(c.target.parent().map(|p| p.0))
    .execute(&mut *tx)
    .await
    .with_context(|| format!("inserting comment {:?}", c.id))?;
    if res.rows_affected() == 0 {
        return Err(Error::uuid_already_used(c.id.0));
    }

    let recipient = match parent_author.filter(|r| *r != author.id) {
        Some(r) if fetch_user(&mut *tx, r).await?.is_some() => Some(r),
        _ => None,
    };
    if let Some(recipient) = recipient {
        insert_notification(
            &mut *tx,
            recipient,
            NotificationKind::Reply,
            c.id,
            &c.article,
            &author,
        )
        .await?;
    }

    tx.commit().await.context("committing new comment")?;
    Ok(c.id)
}

/// Flip the like of `user` on `comment`, returning the outcome and the comment's article
pub async fn toggle_like(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    user: UserId,
) -> Result<(LikeOutcome, ArticleSlug), Error> {
    let mut tx = conn.begin().await.context("starting transaction")?;
    let actor = fetch_user(&mut *tx, user)
        .await?
        .ok_or(Error::permission_denied())?;
    let row = sqlx::query("SELECT author_id, article_slug FROM comments WHERE id = $1")
        .bind(comment.0)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("fetching comment {:?}", comment))?
        .ok_or(Error::Api(ApiError::UnknownComment(comment.0)))?;
    let author = UserId(
        row.try_get("author_id")
            .context("retrieving the author_id field")?,
    );
    let article = ArticleSlug(
        row.try_get("article_slug")
            .context("retrieving the article_slug field")?,
    );

    let removed = sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2")
        .bind(comment.0)
        .bind(user.0)
        .execute(&mut *tx)
        .await
        .context("removing like")?
        .rows_affected();
    let liked = removed == 0;
    if liked {
        sqlx::query(
            "INSERT INTO comment_likes (comment_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(comment.0)
        .bind(user.0)
        .execute(&mut *tx)
        .await
        .context("adding like")?;
    }

    if liked && author != user {
        let first_like = sqlx::query(
            "INSERT INTO like_notifications_sent (comment_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(comment.0)
        .bind(user.0)
        .execute(&mut *tx)
        .await
        .context("recording like notification")?
        .rows_affected()
            == 1;
        // Authors of imported comments may not have an account to notify
        if first_like && fetch_user(&mut *tx, author).await?.is_some() {
            insert_notification(
                &mut *tx,
                author,
                NotificationKind::Like,
                comment,
                &article,
                &actor,
            )
            .await?;
        }
    }

    let likes: i64 =
        sqlx::query("SELECT COUNT(*) AS count FROM comment_likes WHERE comment_id = $1")
            .bind(comment.0)
            .fetch_one(&mut *tx)
            .await
            .context("counting likes")?
            .try_get("count")
            .context("retrieving the count field")?;

    tx.commit().await.context("committing like toggle")?;
    Ok((
        LikeOutcome {
            comment_id: comment,
            liked,
            likes: likes.max(0) as u64,
        },
        article,
    ))
}

pub async fn fetch_notifications(
    conn: &mut sqlx::PgConnection,
    user: UserId,
) -> anyhow::Result<Vec<Notification>> {
    let mut rows = sqlx::query(
        "
            SELECT id, user_id, kind, comment_id, article_slug, actor_id, actor_name, read, created_at
                FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id
        ",
    )
    .bind(user.0)
    .fetch(conn);
    let mut res = Vec::new();
    while let Some(row) = rows
        .try_next()
        .await
        .with_context(|| format!("querying notifications of {:?}", user))?
    {
        let kind: String = row.try_get("kind").context("retrieving the kind field")?;
        res.push(Notification {
            id: NotificationId(row.try_get("id").context("retrieving the id field")?),
            user_id: UserId(row.try_get("user_id").context("retrieving the user_id field")?),
            kind: NotificationKind::from_str(&kind)
                .with_context(|| format!("notification kind {kind:?} is unknown"))?,
            comment_id: CommentId(
                row.try_get("comment_id")
                    .context("retrieving the comment_id field")?,
            ),
            article_slug: ArticleSlug(
                row.try_get("article_slug")
                    .context("retrieving the article_slug field")?,
            ),
            actor_id: UserId(
                row.try_get("actor_id")
                    .context("retrieving the actor_id field")?,
            ),
            actor_name: row
                .try_get("actor_name")
                .context("retrieving the actor_name field")?,
            read: row.try_get("read").context("retrieving the read field")?,
            created_at: row
                .try_get::<Time, _>("created_at")
                .context("retrieving the created_at field")?,
        });
    }
    Ok(res)
}

pub async fn mark_notification_read(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    notification: NotificationId,
) -> Result<(), Error> {
    let res = sqlx::query("UPDATE notifications SET read = true WHERE id = $1 AND user_id = $2")
        .bind(notification.0)
        .bind(user.0)
        .execute(conn)
        .await
        .with_context(|| format!("marking {:?} as read", notification))?;
    if res.rows_affected() == 0 {
        return Err(Error::permission_denied());
    }
    Ok(())
}
