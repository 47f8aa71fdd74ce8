//! HTTP surface of the service: routing, shared state and the handlers for
//! each resource, all mounted under `/api/v1`.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    assets::{AssetStore, LocalAssetStore},
    config::RuntimeConfig,
    models,
    store::DocumentStore,
};

pub mod comments;
pub mod dashboard;
pub mod extract;
pub mod files;
pub mod healthcheck;
pub mod likes;
pub mod playlists;
pub mod populate;
pub mod response;
pub mod subscriptions;
pub mod tweets;
pub mod uploads;
pub mod videos;

pub use response::{ApiError, ApiResponse, ApiResult};

pub const API_PREFIX: &str = "/api/v1";

#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub assets: Arc<dyn AssetStore>,
    /// Where multipart file parts are staged before reaching `assets`.
    pub uploads_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(store: DocumentStore, assets: Arc<dyn AssetStore>, uploads_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&uploads_dir)
            .with_context(|| format!("creating upload staging directory {}", uploads_dir.display()))?;
        Ok(Self {
            store,
            assets,
            uploads_dir: Arc::new(uploads_dir),
        })
    }

    /// Opens the database under the data root, creates the collections and
    /// wires the local asset store.
    pub async fn from_config(config: &RuntimeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_root)
            .with_context(|| format!("creating data root {}", config.data_root.display()))?;
        let store = DocumentStore::open(&config.database_path())
            .await
            .context("opening document store")?;
        models::ensure_collections(&store)
            .await
            .context("creating collections")?;
        let assets = LocalAssetStore::new(config.assets_dir(), config.public_url.clone())?;
        Self::new(store, Arc::new(assets), config.uploads_dir())
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let api = Router::new()
        .route("/healthcheck", get(healthcheck::healthcheck))
        .route(
            "/videos",
            get(videos::get_all_videos).post(videos::publish_video),
        )
        .route(
            "/videos/{videoId}",
            get(videos::get_video_by_id)
                .patch(videos::update_video)
                .delete(videos::delete_video),
        )
        .route(
            "/videos/toggle/publish/{videoId}",
            patch(videos::toggle_publish_status),
        )
        .route(
            "/comments/{videoId}",
            get(comments::get_video_comments).post(comments::add_comment),
        )
        .route(
            "/comments/c/{commentId}",
            patch(comments::update_comment).delete(comments::delete_comment),
        )
        .route("/tweets", post(tweets::create_tweet))
        .route("/tweets/user/{userId}", get(tweets::get_user_tweets))
        .route(
            "/tweets/{tweetId}",
            patch(tweets::update_tweet).delete(tweets::delete_tweet),
        )
        .route("/playlist", post(playlists::create_playlist))
        .route(
            "/playlist/user/{userId}",
            get(playlists::get_user_playlists),
        )
        .route(
            "/playlist/{playlistId}",
            get(playlists::get_playlist_by_id)
                .patch(playlists::update_playlist)
                .delete(playlists::delete_playlist),
        )
        .route(
            "/playlist/add/{videoId}/{playlistId}",
            patch(playlists::add_video_to_playlist),
        )
        .route(
            "/playlist/remove/{videoId}/{playlistId}",
            patch(playlists::remove_video_from_playlist),
        )
        .route(
            "/subscriptions/c/{channelId}",
            get(subscriptions::get_channel_subscribers)
                .post(subscriptions::toggle_subscription),
        )
        .route(
            "/subscriptions/u/{subscriberId}",
            get(subscriptions::get_subscribed_channels),
        )
        .route("/likes/toggle/v/{videoId}", post(likes::toggle_video_like))
        .route(
            "/likes/toggle/c/{commentId}",
            post(likes::toggle_comment_like),
        )
        .route("/likes/toggle/t/{tweetId}", post(likes::toggle_tweet_like))
        .route("/likes/videos", get(likes::get_liked_videos))
        .route(
            "/dashboard/stats/{channelId}",
            get(dashboard::get_channel_stats),
        )
        .route(
            "/dashboard/videos/{channelId}",
            get(dashboard::get_channel_videos),
        );

    Router::new()
        .nest(API_PREFIX, api)
        .route("/assets/{name}", get(files::serve_asset))
        .fallback(endpoint_not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn endpoint_not_found() -> ApiError {
    ApiError::not_found("endpoint not found")
}
