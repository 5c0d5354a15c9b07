#![cfg(test)]

use bolero::generator::{bolero_generator, TypeGenerator};
use axum::{
    extract::FromRequestParts,
    http::{self, request},
};
use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path};
use threadline_api::{
    ArticleSlug, Author, Comment, CommentId, CommentStore, CommentTarget, Error as ApiError,
    LikeOutcome, NewComment, NewUser, Notification, User, UserId,
};
use threadline_mock_server::MockServer;
use tower::{Service, ServiceExt};

use crate::{extractors::*, *};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

fn build_pg_cluster(data: &Path) -> postgresfixture::cluster::Cluster {
    let runtime = postgresfixture::runtime::Runtime::find_on_path()
        .into_iter()
        .filter_map(|r| r.version().ok().map(|v| (v, r)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, r)| r);
    postgresfixture::cluster::Cluster::new(
        data,
        runtime.expect("postgresql seems to not be installed in path"),
    )
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                let _ = tracing_subscriber::fmt::try_init();
            }
            let lockfile = tempfile::tempfile().expect("creating tempfile");
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let datadir_path: &Path = datadir.as_ref();
            let cluster = build_pg_cluster(datadir_path);
            let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
            postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
                cluster.createdb("test_db").expect("creating test_db database");
                let runtime = AssertUnwindSafe(
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed initializing tokio runtime"),
                );
                let pool = AssertUnwindSafe(runtime.block_on(async move {
                    let pool = create_sqlx_pool(&format!(
                        "postgresql://?host={}&dbname=test_db",
                        datadir_path
                    ))
                    .await
                    .expect("creating sqlx pool");
                    MIGRATOR
                        .run(&mut *pool.acquire().await.expect("getting migrator connection"))
                        .await
                        .expect("failed applying migrations");
                    pool
                }));
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
                        let idle_before = pool.num_idle();
                        let v_str = format!("{v:?}");
                        let idle_after_res: Result<usize, _> = {
                            let pool = pool.clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool.clone(), v).await;
                                    let mut idle_after = pool.num_idle();
                                    let wait_release_since = std::time::Instant::now();
                                    while idle_after < idle_before
                                        && wait_release_since.elapsed()
                                            <= std::time::Duration::from_secs(1)
                                    {
                                        tokio::task::yield_now().await;
                                        idle_after = pool.num_idle();
                                    }
                                    idle_after
                                })
                            }))
                        };
                        runtime.block_on(async move {
                            let mut conn =
                                pool.acquire().await.expect("getting db cleanup connection");
                            sqlx::query(include_str!("../reset-test-db.sql"))
                                .execute(&mut *conn)
                                .await
                                .expect("failed cleaning up database");
                        });
                        match idle_after_res {
                            Err(e) => std::panic::resume_unwind(e),
                            Ok(idle_after) => assert!(
                                idle_after >= idle_before,
                                "test {} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after} with value {v_str}",
                                stringify!($name)
                            ),
                        }
                    });
            })
            .expect("coordinating spinup and shutdown of the pg cluster");
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::AuthRequired)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

// Requests in here are all answered before any database access, so the
// pool never needs to actually connect
fn offline_app(admin_token: Option<Uuid>) -> Router {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgresql://localhost/threadline_offline")
        .expect("building lazy pool");
    app(pool, admin_token.map(AuthToken))
}

async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status == http::StatusCode::OK {
        if std::any::TypeId::of::<Resp>() == std::any::TypeId::of::<()>() {
            // the server returns an empty string in this situation, which does not parse properly with serde_json
            return Ok(serde_json::from_slice(b"null").unwrap());
        }
        return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
            panic!("failed parsing resp body {body:?}: {err}, request was {req_body:?}")
        }));
    }
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<Uuid>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {token}")),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

fn new_user() -> NewUser {
    NewUser::new(UserId(Uuid::new_v4()), String::from("anna"), None)
}

#[tokio::test]
async fn admin_routes_need_the_admin_token() {
    let admin = Uuid::new_v4();
    let mut app = offline_app(Some(admin));
    let u = new_user();
    assert_eq!(
        run_on_app::<_, ()>(&mut app, "POST", "/api/admin/create-user", None, &u).await,
        Err(ApiError::AuthRequired)
    );
    assert_eq!(
        run_on_app::<_, ()>(
            &mut app,
            "POST",
            "/api/admin/create-user",
            Some(Uuid::new_v4()),
            &u
        )
        .await,
        Err(ApiError::PermissionDenied)
    );
    assert_eq!(
        run_on_app::<_, AuthToken>(
            &mut app,
            "POST",
            "/api/admin/create-session",
            Some(Uuid::new_v4()),
            &u.id
        )
        .await,
        Err(ApiError::PermissionDenied)
    );
}

#[tokio::test]
async fn admin_routes_stay_closed_without_admin_token() {
    let mut app = offline_app(None);
    assert_eq!(
        run_on_app::<_, ()>(
            &mut app,
            "POST",
            "/api/admin/create-user",
            Some(Uuid::new_v4()),
            &new_user()
        )
        .await,
        Err(ApiError::PermissionDenied)
    );
}

#[tokio::test]
async fn session_routes_need_a_bearer_token() {
    let mut app = offline_app(Some(Uuid::new_v4()));
    assert_eq!(
        run_on_app::<_, User>(&mut app, "GET", "/api/whoami", None, &()).await,
        Err(ApiError::AuthRequired)
    );
    assert_eq!(
        run_on_app::<_, ()>(&mut app, "POST", "/api/unauth", None, &()).await,
        Err(ApiError::AuthRequired)
    );
    let u = new_user();
    let c = NewComment::new(
        ArticleSlug::stub(),
        Author::from(User::from(u)),
        "hoi",
        CommentTarget::TopLevel,
    );
    assert_eq!(
        run_on_app::<_, CommentId>(&mut app, "POST", "/api/submit-comment", None, &c).await,
        Err(ApiError::AuthRequired)
    );
    assert_eq!(
        run_on_app::<_, ()>(
            &mut app,
            "POST",
            &format!("/api/comments/{}/toggle-like", c.id.0),
            None,
            &()
        )
        .await,
        Err(ApiError::AuthRequired)
    );
    assert_eq!(
        run_on_app::<_, Vec<Notification>>(&mut app, "GET", "/api/notifications", None, &())
            .await,
        Err(ApiError::AuthRequired)
    );
}

#[tokio::test]
async fn malformed_authorization_headers() {
    let mut app = offline_app(Some(Uuid::new_v4()));
    for header in ["Basic YW5uYTpnZWhlaW0=", "bearer", "bearer not-a-uuid"] {
        let req = request::Builder::new()
            .method("GET")
            .uri("/api/whoami")
            .header(http::header::AUTHORIZATION, header)
            .body(axum::body::Body::empty())
            .expect("building request");
        assert_eq!(
            call::<_, User>(&mut app, req, &header).await,
            Err(ApiError::AuthRequired),
            "header {header:?} was not rejected"
        );
    }
}

#[tokio::test]
async fn invalid_article_slugs_are_rejected() {
    let mut app = offline_app(None);
    assert_eq!(
        run_on_app::<_, Vec<Comment>>(&mut app, "GET", "/api/articles/Geen-Slug/comments", None, &())
            .await,
        Err(ApiError::InvalidSlug(String::from("Geen-Slug")))
    );
    assert_eq!(
        run_on_app::<_, u64>(&mut app, "GET", "/api/articles/a--b/count", None, &()).await,
        Err(ApiError::InvalidSlug(String::from("a--b")))
    );
}

fn compare<T>(name: &str, app_res: Result<T, ApiError>, mock_res: Result<T, ApiError>)
where
    T: Debug + PartialEq,
{
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end);
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1))
}

fn article(other: bool) -> ArticleSlug {
    match other {
        false => ArticleSlug::stub(),
        true => ArticleSlug(String::from("ander-artikel")),
    }
}

// Both stores mint their own notification ids and timestamps
type NotificationView = (Uuid, &'static str, Uuid, String, String, bool);
type Views = Vec<(NotificationView, Notification)>;

fn view(notifs: Vec<Notification>) -> Views {
    let mut res = notifs
        .into_iter()
        .map(|n| {
            (
                (
                    n.comment_id.0,
                    n.kind.as_str(),
                    n.actor_id.0,
                    n.actor_name.clone(),
                    n.article_slug.0.clone(),
                    n.read,
                ),
                n,
            )
        })
        .collect::<Vec<_>>();
    res.sort_by(|a, b| a.0.cmp(&b.0));
    res
}

async fn import_comment(pool: &sqlx::PgPool, c: &Comment) {
    sqlx::query(
        "
            INSERT INTO comments
                (id, article_slug, author_id, author_name, author_photo_url,
                 content, created_at, parent_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(c.id.0)
    .bind(c.article_slug.as_str())
    .bind(c.author_id.0)
    .bind(&c.author_name)
    .bind(&c.author_photo_url)
    .bind(&c.content)
    .bind(c.created_at)
    .bind(c.parent_comment_id.map(|p| p.0))
    .execute(pool)
    .await
    .expect("importing comment");
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateUser {
        again: Option<usize>,
    },
    Comment {
        uid: usize,
        other_article: bool,
        reply_to: Option<usize>,
        #[generator(bolero::generator::gen_with::<String>().len(0..20usize))]
        content: String,
    },
    Repost {
        pid: usize,
    },
    Import {
        other_article: bool,
        reply_to: Option<usize>,
    },
    ToggleLike {
        uid: usize,
        cid: usize,
    },
    FetchComments {
        other_article: bool,
    },
    CountComments {
        other_article: bool,
    },
    FetchNotifications {
        uid: usize,
    },
    MarkRead {
        uid: usize,
        nid: usize,
    },
}

struct FuzzUser {
    user: User,
    token: AuthToken,
}

struct ComparativeFuzzer {
    admin_token: Uuid,
    pool: sqlx::PgPool,
    app: Router,
    mock: MockServer,
    users: Vec<FuzzUser>,
    // every comment that made it into both stores
    comments: Vec<CommentId>,
    // every submission, accepted or not
    posted: Vec<NewComment>,
}

impl ComparativeFuzzer {
    fn new(pool: sqlx::PgPool) -> ComparativeFuzzer {
        let admin_token = Uuid::new_v4();
        ComparativeFuzzer {
            admin_token,
            app: app(pool.clone(), Some(AuthToken(admin_token))),
            pool,
            mock: MockServer::new(),
            users: Vec::new(),
            comments: Vec::new(),
            posted: Vec::new(),
        }
    }

    fn user(&self, uid: usize) -> Option<&FuzzUser> {
        resize_int(uid, ..self.users.len()).map(|u| &self.users[u])
    }

    fn comment(&self, cid: usize) -> Option<CommentId> {
        resize_int(cid, ..self.comments.len()).map(|c| self.comments[c])
    }

    async fn notifications(&mut self, uid: usize) -> Option<(usize, Views, Views)> {
        let u = resize_int(uid, ..self.users.len())?;
        let (id, tok) = (self.users[u].user.id, self.users[u].token.0);
        let app_res = run_on_app::<_, Vec<Notification>>(
            &mut self.app,
            "GET",
            "/api/notifications",
            Some(tok),
            &(),
        )
        .await
        .map(view);
        let mock_res = self.mock.fetch_notifications(id).await.map(view);
        match (app_res, mock_res) {
            (Ok(app), Ok(mock)) => Some((u, app, mock)),
            (app, mock) => {
                compare("FetchNotifications", app.map(|_| ()), mock.map(|_| ()));
                None
            }
        }
    }

    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateUser { again } => {
                let id = match again.and_then(|u| self.user(u)) {
                    Some(u) => u.user.id,
                    None => UserId(Uuid::new_v4()),
                };
                let new_user = NewUser::new(id, format!("lezer {}", self.users.len()), None);
                let app_res = run_on_app::<_, ()>(
                    &mut self.app,
                    "POST",
                    "/api/admin/create-user",
                    Some(self.admin_token),
                    &new_user,
                )
                .await;
                let mock_res = self.mock.admin_create_user(new_user.clone()).await;
                let created = app_res.is_ok() && mock_res.is_ok();
                compare("CreateUser", app_res, mock_res);
                if created {
                    let app_tok = run_on_app::<_, AuthToken>(
                        &mut self.app,
                        "POST",
                        "/api/admin/create-session",
                        Some(self.admin_token),
                        &id,
                    )
                    .await
                    .expect("opening session on app");
                    self.mock
                        .create_session(id)
                        .await
                        .expect("opening session on mock");
                    self.users.push(FuzzUser {
                        user: User::from(new_user),
                        token: app_tok,
                    });
                }
            }
            FuzzOp::Comment {
                uid,
                other_article,
                reply_to,
                content,
            } => {
                let Some(u) = self.user(uid) else { return };
                let target = match reply_to.and_then(|c| self.comment(c)) {
                    Some(parent) => CommentTarget::ReplyTo(parent),
                    None => CommentTarget::TopLevel,
                };
                let c = NewComment::new(
                    article(other_article),
                    Author::from(u.user.clone()),
                    &content,
                    target,
                );
                let tok = u.token.0;
                self.posted.push(c.clone());
                self.submit(c, tok).await;
            }
            FuzzOp::Repost { pid } => {
                let Some(p) = resize_int(pid, ..self.posted.len()) else { return };
                let c = self.posted[p].clone();
                let Some(tok) = self
                    .users
                    .iter()
                    .find(|u| u.user.id == c.author.id)
                    .map(|u| u.token.0)
                else {
                    return;
                };
                self.submit(c, tok).await;
            }
            FuzzOp::Import {
                other_article,
                reply_to,
            } => {
                let target = match reply_to.and_then(|c| self.comment(c)) {
                    Some(parent) => CommentTarget::ReplyTo(parent),
                    None => CommentTarget::TopLevel,
                };
                let c = Comment::from_new(NewComment::new(
                    article(other_article),
                    Author {
                        id: UserId(Uuid::new_v4()),
                        name: String::from("oud account"),
                        photo_url: None,
                    },
                    "van voor de verhuizing",
                    target,
                ));
                import_comment(&self.pool, &c).await;
                self.mock.test_insert_raw_comment(c.clone()).await;
                self.comments.push(c.id);
            }
            FuzzOp::ToggleLike { uid, cid } => {
                let (Some(u), Some(c)) = (self.user(uid), self.comment(cid)) else {
                    return;
                };
                let (id, tok) = (u.user.id, u.token.0);
                let app_res = run_on_app::<_, LikeOutcome>(
                    &mut self.app,
                    "POST",
                    &format!("/api/comments/{}/toggle-like", c.0),
                    Some(tok),
                    &(),
                )
                .await;
                compare("ToggleLike", app_res, self.mock.toggle_like(c, id).await);
            }
            FuzzOp::FetchComments { other_article } => {
                let article = article(other_article);
                let app_res = run_on_app::<_, Vec<Comment>>(
                    &mut self.app,
                    "GET",
                    &format!("/api/articles/{article}/comments"),
                    None,
                    &(),
                )
                .await;
                if let Ok(comments) = &app_res {
                    for c in comments {
                        assert_eq!(c.article_slug, article);
                        assert_eq!(c.likes as usize, c.liked_by.values().filter(|l| **l).count());
                    }
                }
                // Comments posted within the same millisecond may come back in any order
                let by_id = |mut v: Vec<Comment>| {
                    v.sort_by_key(|c| c.id.0);
                    v
                };
                compare(
                    "FetchComments",
                    app_res.map(by_id),
                    self.mock.fetch_comments(&article).await.map(by_id),
                );
            }
            FuzzOp::CountComments { other_article } => {
                let article = article(other_article);
                let app_res = run_on_app::<_, u64>(
                    &mut self.app,
                    "GET",
                    &format!("/api/articles/{article}/count"),
                    None,
                    &(),
                )
                .await;
                let mock_res = self
                    .mock
                    .fetch_comments(&article)
                    .await
                    .map(|c| c.len() as u64);
                compare("CountComments", app_res, mock_res);
            }
            FuzzOp::FetchNotifications { uid } => {
                if let Some((_, app, mock)) = self.notifications(uid).await {
                    compare(
                        "FetchNotifications",
                        Ok(app.into_iter().map(|n| n.0).collect::<Vec<_>>()),
                        Ok(mock.into_iter().map(|n| n.0).collect::<Vec<_>>()),
                    );
                }
            }
            FuzzOp::MarkRead { uid, nid } => {
                let Some((u, app, mock)) = self.notifications(uid).await else {
                    return;
                };
                let keys = |v: &Views| v.iter().map(|n| n.0.clone()).collect::<Vec<_>>();
                compare("FetchNotifications", Ok(keys(&app)), Ok(keys(&mock)));
                let Some(n) = resize_int(nid, ..app.len()) else { return };
                let (id, tok) = (self.users[u].user.id, self.users[u].token.0);
                let app_res = run_on_app::<_, ()>(
                    &mut self.app,
                    "POST",
                    &format!("/api/notifications/{}/read", app[n].1.id.0),
                    Some(tok),
                    &(),
                )
                .await;
                compare(
                    "MarkRead",
                    app_res,
                    self.mock.mark_notification_read(id, mock[n].1.id).await,
                );
            }
        }
    }

    async fn submit(&mut self, c: NewComment, tok: Uuid) {
        let app_res = run_on_app::<_, CommentId>(
            &mut self.app,
            "POST",
            "/api/submit-comment",
            Some(tok),
            &c,
        )
        .await;
        let mock_res = self.mock.create_comment(c).await;
        if let (Ok(app), Ok(mock)) = (&app_res, &mock_res) {
            if app == mock && !self.comments.contains(app) {
                self.comments.push(*app);
            }
        }
        compare("SubmitComment", app_res, mock_res);
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..60usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool);
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);

do_sqlx_test!(
    like_notifications_survive_unlikes,
    bolero::generator::gen::<u8>(),
    |pool: sqlx::PgPool, toggles: u8| async move {
        let store = PgStore::new(PgPool::new(pool.clone()), CommentFeeds::new());
        let mut conn = pool.acquire().await.expect("getting connection");
        let (anna, bram) = (
            NewUser::new(UserId(Uuid::new_v4()), String::from("anna"), None),
            NewUser::new(UserId(Uuid::new_v4()), String::from("bram"), None),
        );
        db::create_user(&mut *conn, anna.clone()).await.expect("creating anna");
        db::create_user(&mut *conn, bram.clone()).await.expect("creating bram");
        std::mem::drop(conn);

        let mut sub = store
            .subscribe_comments(&ArticleSlug::stub())
            .await
            .expect("subscribing");
        assert_eq!(sub.next_snapshot().await, Some(Vec::new()));

        let c = store
            .create_comment(NewComment::new(
                ArticleSlug::stub(),
                Author::from(User::from(anna.clone())),
                "eerste",
                CommentTarget::TopLevel,
            ))
            .await
            .expect("posting comment");
        assert_eq!(sub.next_snapshot().await.map(|s| s.len()), Some(1));

        store.toggle_like(c, anna.id).await.expect("self-like");
        let toggles = usize::from(toggles % 8) + 1;
        let mut outcome = None;
        for _ in 0..toggles {
            outcome = Some(store.toggle_like(c, bram.id).await.expect("toggling like"));
        }
        let outcome = outcome.expect("toggled at least once");
        assert_eq!(outcome.liked, toggles % 2 == 1);
        assert_eq!(outcome.likes, 1 + u64::from(outcome.liked));

        let mut last = None;
        while let Some(snapshot) = sub.try_next_snapshot() {
            last = Some(snapshot);
        }
        let last = last.expect("likes were relayed");
        assert_eq!(last[0].likes, outcome.likes);
        assert_eq!(last[0].is_liked_by(&bram.id), outcome.liked);

        let notifs = store
            .fetch_notifications(anna.id)
            .await
            .expect("fetching notifications");
        assert_eq!(notifs.len(), 1);
        assert_eq!(notifs[0].actor_id, bram.id);
        assert_eq!(
            store.count_comments(&ArticleSlug::stub()).await.expect("counting"),
            1
        );
        std::mem::drop(sub);
    }
);
