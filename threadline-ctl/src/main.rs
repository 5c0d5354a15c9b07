use anyhow::Context;
use structopt::StructOpt;
use threadline_client::{
    api::{
        self, ArticleSlug, AuthToken, CommentId, CommentStore, Error, LikeOutcome, NewComment,
        NewUser, Notification, NotificationId, Subscription, User, UserId, Uuid,
    },
    export, leaderboard, load_thread, render_text, ExportFormat, ReactionCoordinator, Renderer,
    Session, SortOrder,
};

#[derive(StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Register a user signed in through the OAuth provider
    CreateUser {
        /// Display name
        name: String,

        /// Provider id of the user, random if unset
        #[structopt(long)]
        id: Option<Uuid>,

        #[structopt(long)]
        photo_url: Option<String>,
    },

    /// Open a session for a user, printing its token
    CreateSession { user: Uuid },

    /// Print the discussion of an article
    Thread {
        article: String,

        /// oldest, newest or popular
        #[structopt(long, default_value = "oldest")]
        order: SortOrder,

        /// Save the comments as json or csv in the current directory instead
        #[structopt(long)]
        export: Option<ExportFormat>,
    },

    /// Show the most active authors of an article's discussion
    Leaderboard { article: String },

    /// Comment on an article, or reply to a comment
    Post {
        article: String,
        content: String,

        #[structopt(long)]
        reply_to: Option<Uuid>,
    },

    /// Like a comment, or take the like back
    Like { comment: Uuid },

    /// List the notifications of the signed-in user
    Notifications {
        /// Mark them all as read after listing them
        #[structopt(long)]
        mark_read: bool,
    },
}

fn admin_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("ADMIN_TOKEN").context("retrieving ADMIN_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

fn session_token() -> anyhow::Result<AuthToken> {
    let tok = std::env::var("THREADLINE_TOKEN")
        .context("retrieving THREADLINE_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing THREADLINE_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

/// Comment store reached over the server's HTTP API
struct HttpStore {
    host: String,
    client: reqwest::Client,
    token: Option<AuthToken>,
}

impl HttpStore {
    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(tok) => req.bearer_auth(tok.0),
            None => req,
        }
    }

    async fn send<T>(&self, req: reqwest::RequestBuilder) -> Result<T, Error>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let resp = self
            .authed(req)
            .send()
            .await
            .map_err(|e| Error::Persistence(format!("contacting {}: {e}", self.host)))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Persistence(format!("reading response: {e}")))?;
        if !status.is_success() {
            return Err(Error::parse(&body).unwrap_or_else(|err| {
                Error::Unknown(format!("unparseable {status} error from server: {err}"))
            }));
        }
        // Unit responses come back with an empty body
        let body: &[u8] = if body.is_empty() { b"null" } else { &body };
        serde_json::from_slice(body)
            .map_err(|e| Error::Unknown(format!("unparseable response from server: {e}")))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.host)
    }

    async fn whoami(&self) -> Result<User, Error> {
        self.send(self.client.get(self.url("/api/whoami"))).await
    }
}

#[async_trait::async_trait]
impl CommentStore for HttpStore {
    async fn fetch_comments(&self, article: &ArticleSlug) -> Result<Vec<api::Comment>, Error> {
        self.send(
            self.client
                .get(self.url(&format!("/api/articles/{article}/comments"))),
        )
        .await
    }

    // This store only issues one-off requests, live feeds need the websocket route
    async fn subscribe_comments(&self, _article: &ArticleSlug) -> Result<Subscription, Error> {
        Err(Error::LiveFeedUnavailable)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<CommentId, Error> {
        self.send(
            self.client
                .post(self.url("/api/submit-comment"))
                .json(&comment),
        )
        .await
    }

    async fn toggle_like(&self, comment: CommentId, _user: UserId) -> Result<LikeOutcome, Error> {
        self.send(
            self.client
                .post(self.url(&format!("/api/comments/{}/toggle-like", comment.0))),
        )
        .await
    }

    async fn fetch_notifications(&self, _user: UserId) -> Result<Vec<Notification>, Error> {
        self.send(self.client.get(self.url("/api/notifications")))
            .await
    }

    async fn mark_notification_read(
        &self,
        _user: UserId,
        notification: NotificationId,
    ) -> Result<(), Error> {
        self.send(
            self.client
                .post(self.url(&format!("/api/notifications/{}/read", notification.0))),
        )
        .await
    }
}

async fn signed_in(store: &mut HttpStore) -> anyhow::Result<Session> {
    let token = session_token()?;
    store.token = Some(token);
    let user = store.whoami().await.context("recovering session")?;
    Ok(Session::new(user, token))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::from_args();

    let mut store = HttpStore {
        host: opt.host.trim_end_matches('/').to_string(),
        client: reqwest::Client::new(),
        token: None,
    };

    match opt.cmd {
        Command::CreateUser {
            name,
            id,
            photo_url,
        } => {
            let user = NewUser::new(UserId(id.unwrap_or_else(Uuid::new_v4)), name, photo_url);
            user.validate()?;
            store.token = Some(admin_token()?);
            store
                .send::<()>(
                    store
                        .client
                        .post(store.url("/api/admin/create-user"))
                        .json(&user),
                )
                .await
                .context("creating user")?;
            println!("{}", user.id.0);
        }
        Command::CreateSession { user } => {
            store.token = Some(admin_token()?);
            let tok: AuthToken = store
                .send(
                    store
                        .client
                        .post(store.url("/api/admin/create-session"))
                        .json(&UserId(user)),
                )
                .await
                .context("creating session")?;
            println!("{}", tok.0);
        }
        Command::Thread {
            article,
            order,
            export: Some(format),
        } => {
            let article = ArticleSlug::new(article)?;
            let mut comments = store
                .fetch_comments(&article)
                .await
                .context("fetching comments")?;
            order.sort(&mut comments);
            let file = export::file_name(&article, api::now(), format);
            let contents = format.export(&comments).context("serializing comments")?;
            std::fs::write(&file, contents).with_context(|| format!("writing {file}"))?;
            println!("{file}");
        }
        Command::Thread {
            article,
            order,
            export: None,
        } => {
            let article = ArticleSlug::new(article)?;
            let session = match session_token() {
                Ok(_) => Some(signed_in(&mut store).await?),
                Err(_) => None,
            };
            let thread = load_thread(&store, &article, order).await;
            for m in thread.malformed() {
                tracing::debug!(?m, "malformed reference in thread");
            }
            let rendered = Renderer::new(session.as_ref(), api::now()).render(&thread);
            print!("{}", render_text(&rendered));
        }
        Command::Leaderboard { article } => {
            let article = ArticleSlug::new(article)?;
            let comments = store
                .fetch_comments(&article)
                .await
                .context("fetching comments")?;
            for (rank, a) in leaderboard(&comments).iter().enumerate() {
                let badges = a.badges.iter().map(|b| b.icon()).collect::<Vec<_>>();
                println!(
                    "{:>2}. {} Lv{} {} • {} punten {}",
                    rank + 1,
                    a.display_name,
                    a.level.level,
                    a.level.name,
                    a.score,
                    badges.join(" ")
                );
            }
        }
        Command::Post {
            article,
            content,
            reply_to,
        } => {
            let article = ArticleSlug::new(article)?;
            let session = signed_in(&mut store).await?;
            let coordinator = ReactionCoordinator::new(store);
            let id = match reply_to {
                None => coordinator.comment(Some(&session), article, &content).await,
                Some(parent) => {
                    coordinator
                        .reply(Some(&session), article, CommentId(parent), &content)
                        .await
                }
            }
            .context("posting comment")?;
            println!("{}", id.0);
        }
        Command::Like { comment } => {
            let session = signed_in(&mut store).await?;
            let coordinator = ReactionCoordinator::new(store);
            let outcome = coordinator
                .like(Some(&session), CommentId(comment))
                .await
                .context("toggling like")?;
            let verb = if outcome.liked { "liked" } else { "unliked" };
            println!("{verb}, now at {} likes", outcome.likes);
        }
        Command::Notifications { mark_read } => {
            let session = signed_in(&mut store).await?;
            let notifs = store
                .fetch_notifications(session.user_id())
                .await
                .context("fetching notifications")?;
            for n in notifs.iter() {
                let marker = if n.read { ' ' } else { '*' };
                println!("{marker} {} {}", n.created_at.format("%Y-%m-%d %H:%M"), n.title());
            }
            if mark_read {
                for n in notifs.iter().filter(|n| !n.read) {
                    store
                        .mark_notification_read(session.user_id(), n.id)
                        .await
                        .with_context(|| format!("marking {:?} as read", n.id))?;
                }
            }
        }
    }

    Ok(())
}
