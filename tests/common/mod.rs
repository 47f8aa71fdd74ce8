#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use vidtube::{
    api::{self, AppState, extract::USER_ID_HEADER},
    assets::LocalAssetStore,
    models::{self, User, Video},
    object_id::ObjectId,
    store::DocumentStore,
};

pub const TEST_UPLOAD_LIMIT: usize = 8 * 1024 * 1024;
const BOUNDARY: &str = "vidtube-test-boundary";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub dir: TempDir,
}

pub async fn setup_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(&dir.path().join("vidtube.db"))
        .await
        .unwrap();
    models::ensure_collections(&store).await.unwrap();
    let assets = LocalAssetStore::new(dir.path().join("assets"), "http://media.test").unwrap();
    let state = AppState::new(store, Arc::new(assets), dir.path().join("uploads")).unwrap();
    let app = api::router(state.clone(), TEST_UPLOAD_LIMIT);
    TestApp { app, state, dir }
}

/// One part of a multipart body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(build("GET", uri, None, Body::empty(), None)).await
    }

    pub async fn get_as(&self, user: ObjectId, uri: &str) -> (StatusCode, Value) {
        self.send(build("GET", uri, Some(user), Body::empty(), None))
            .await
    }

    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        user: Option<ObjectId>,
        json: Option<Value>,
    ) -> (StatusCode, Value) {
        let (body, content_type) = match json {
            Some(json) => (Body::from(json.to_string()), Some("application/json".to_string())),
            None => (Body::empty(), None),
        };
        self.send(build(method, uri, user, body, content_type)).await
    }

    pub async fn multipart(
        &self,
        method: &str,
        uri: &str,
        user: ObjectId,
        parts: &[Part<'_>],
    ) -> (StatusCode, Value) {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File {
                    name,
                    file_name,
                    content_type,
                    bytes,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                             Content-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.send(build(
            method,
            uri,
            Some(user),
            Body::from(body),
            Some(format!("multipart/form-data; boundary={BOUNDARY}")),
        ))
        .await
    }

    pub async fn insert_user(&self, username: &str) -> User {
        let user = User {
            id: ObjectId::new(),
            username: username.to_string(),
            email: format!("{username}@example.test"),
            full_name: username.to_string(),
            avatar: format!("http://media.test/assets/{username}.png"),
            cover_image: None,
            password: "$2b$10$hash".to_string(),
            refresh_token: Some("refresh".to_string()),
            created_at: models::now(),
            updated_at: models::now(),
        };
        self.state.store.insert(&user).await.unwrap();
        user
    }

    pub async fn insert_video(&self, owner: ObjectId, title: &str, views: i64) -> Video {
        let mut video = Video::new(
            title.to_string(),
            format!("about {title}"),
            "http://media.test/assets/v.mp4".to_string(),
            "http://media.test/assets/t.png".to_string(),
            owner,
        );
        video.views = views;
        self.state.store.insert(&video).await.unwrap();
        video
    }
}

fn build(
    method: &str,
    uri: &str,
    user: Option<ObjectId>,
    body: Body,
    content_type: Option<String>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user.to_string());
    }
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder.body(body).unwrap()
}

pub fn id_of(value: &Value) -> ObjectId {
    value["_id"].as_str().unwrap().parse().unwrap()
}
