use std::ops::{Deref, DerefMut};

use anyhow::Context;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{self, request},
};
use threadline_api::{AuthToken, User, Uuid};

use crate::{db, Error, PgStore};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: PgPool,
    pub store: PgStore,
    pub admin_token: Option<AuthToken>,
}

#[derive(Clone)]
pub struct PgPool(sqlx::PgPool);

impl PgPool {
    pub fn new(pool: sqlx::PgPool) -> PgPool {
        PgPool(pool)
    }

    pub async fn acquire(&self) -> Result<PgConn, Error> {
        Ok(PgConn(
            self.0.acquire().await.context("acquiring db connection")?,
        ))
    }
}

pub struct PgConn(sqlx::pool::PoolConnection<sqlx::Postgres>);

#[async_trait]
impl FromRequestParts<AppState> for PgConn {
    type Rejection = Error;

    async fn from_request_parts(
        _req: &mut request::Parts,
        state: &AppState,
    ) -> Result<PgConn, Error> {
        state.db.acquire().await
    }
}

impl Deref for PgConn {
    type Target = sqlx::PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PgConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Bearer token of the request, not yet checked against the sessions
pub struct PreAuth(pub AuthToken);

fn parse_bearer(header: &http::HeaderValue) -> Option<AuthToken> {
    let mut auth = header.to_str().ok()?.split(' ');
    if !auth.next()?.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = auth.next()?;
    if auth.next().is_some() {
        return None;
    }
    Uuid::try_from(token).ok().map(AuthToken)
}

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        req.headers
            .get(http::header::AUTHORIZATION)
            .and_then(parse_bearer)
            .map(PreAuth)
            .ok_or_else(Error::auth_required)
    }
}

/// Signed-in user behind the request's session token
pub struct Auth(pub User);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        let mut conn = PgConn::from_request_parts(req, state).await?;
        Ok(Auth(db::recover_session(&mut *conn, token).await?))
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<AdminAuth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        if Some(token) == state.admin_token {
            Ok(AdminAuth)
        } else {
            Err(Error::permission_denied())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(s: &str) -> http::HeaderValue {
        http::HeaderValue::from_str(s).unwrap()
    }

    #[test]
    fn bearer_tokens() {
        let tok = Uuid::new_v4();
        assert_eq!(
            parse_bearer(&header(&format!("Bearer {tok}"))),
            Some(AuthToken(tok))
        );
        assert_eq!(
            parse_bearer(&header(&format!("bearer {tok}"))),
            Some(AuthToken(tok))
        );
        assert_eq!(parse_bearer(&header(&format!("Basic {tok}"))), None);
        assert_eq!(parse_bearer(&header(&format!("Bearer {tok} extra"))), None);
        assert_eq!(parse_bearer(&header("Bearer not-a-uuid")), None);
        assert_eq!(parse_bearer(&header("Bearer")), None);
    }
}
