//! Router-level test harness: an in-memory app plus request helpers.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use super::{AppState, SharedState};
use crate::config::CrmConfig;
use crate::crm::db::{CrmDb, DbHandle};
use crate::crm::mailer::MemoryMailer;
use crate::crm::models::{Agent, User};
use crate::crm::server::build_router;
use crate::crm::testutil;

pub struct TestApp {
    pub router: Router,
    pub state: SharedState,
    pub mailer: Arc<MemoryMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_mailer(Arc::new(MemoryMailer::new()))
    }

    pub fn with_mailer(mailer: Arc<MemoryMailer>) -> Self {
        let db = DbHandle::new(CrmDb::new_in_memory().unwrap());
        let state = Arc::new(AppState::new(db, mailer.clone(), CrmConfig::default()));
        let router = build_router(state.clone());
        Self {
            router,
            state,
            mailer,
        }
    }

    /// Run `f` against the database synchronously.
    pub fn db<R>(&self, f: impl FnOnce(&CrmDb) -> anyhow::Result<R>) -> R {
        let guard = self.state.db.lock_sync().unwrap();
        f(&guard).unwrap()
    }

    pub fn login(&self, user_id: i64) -> String {
        self.db(|db| db.create_session(user_id, 24)).token
    }

    /// An organisor with a live session: (user, organisation id, token).
    pub fn organisor(&self, username: &str) -> (User, i64, String) {
        let (user, org) = self.db(|db| testutil::organisor(db, username));
        let token = self.login(user.id);
        (user, org, token)
    }

    /// An agent of `org` with a live session.
    pub fn agent(&self, org: i64, username: &str) -> (Agent, String) {
        let agent = self.db(|db| testutil::agent(db, org, username));
        let token = self.login(agent.user.id);
        (agent, token)
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.send("GET", uri, token, None).await
    }

    pub async fn post(
        &self,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> Response<Body> {
        self.send("POST", uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: serde_json::Value) -> Response<Body> {
        self.send("PUT", uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.send("DELETE", uri, token, None).await
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
