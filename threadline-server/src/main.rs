use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use structopt::StructOpt;
use threadline_api::{AuthToken, Uuid};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod db;
mod error;
mod extractors;
mod feeds;
mod fuzz;
mod handlers;
mod store;

use error::Error;
use extractors::{AppState, PgPool};
use feeds::CommentFeeds;
use store::PgStore;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[derive(Debug, StructOpt)]
#[structopt(name = "threadline-server", about = "Comment threads below articles")]
struct Opt {
    /// PostgreSQL connection string
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    #[structopt(long, env = "THREADLINE_LISTEN", default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Token allowing use of the admin routes, which stay closed when unset
    #[structopt(long, env = "ADMIN_TOKEN")]
    admin_token: Option<Uuid>,
}

async fn create_sqlx_pool(db_url: &str) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(db_url)
        .await
        .with_context(|| format!("Error opening database {:?}", db_url))
}

pub fn app(db: sqlx::PgPool, admin_token: Option<AuthToken>) -> Router {
    let db = PgPool::new(db);
    let store = PgStore::new(db.clone(), CommentFeeds::new());
    Router::new()
        .route("/api/admin/create-user", post(handlers::admin_create_user))
        .route(
            "/api/admin/create-session",
            post(handlers::admin_create_session),
        )
        .route("/api/unauth", post(handlers::unauth))
        .route("/api/whoami", get(handlers::whoami))
        .route(
            "/api/articles/:slug/comments",
            get(handlers::fetch_comments),
        )
        .route("/api/articles/:slug/count", get(handlers::count_comments))
        .route("/api/submit-comment", post(handlers::submit_comment))
        .route(
            "/api/comments/:id/toggle-like",
            post(handlers::toggle_like),
        )
        .route("/api/notifications", get(handlers::fetch_notifications))
        .route(
            "/api/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route("/ws/comment-feed", get(handlers::comment_feed))
        .with_state(AppState {
            db,
            store,
            admin_token,
        })
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();
    if opt.admin_token.is_none() {
        tracing::warn!("no admin token set, users and sessions cannot be created");
    }

    let db = create_sqlx_pool(&opt.database_url).await?;
    MIGRATOR
        .run(&db)
        .await
        .context("applying pending migrations")?;

    let app = app(db, opt.admin_token.map(AuthToken));

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
