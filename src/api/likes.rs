use axum::extract::{Path as AxumPath, State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    AppState,
    extract::{ActingUser, parse_id},
    populate,
    response::{ApiError, ApiResponse, ApiResult},
};
use crate::{
    models::{Comment, Like, LikeTarget, Tweet, Video, timestamp},
    object_id::ObjectId,
    store::{Direction, Document, Filter, Query},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    is_liked: bool,
}

/// A like on a video, with the video expanded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikedVideo {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub video: Video,
    pub liked_by: ObjectId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Flips the actor's like on `target` after checking that the target exists
/// in collection `T`.
async fn toggle_like<T: Document>(
    state: &AppState,
    actor: ActingUser,
    target: LikeTarget,
    label: &str,
) -> ApiResult<ApiResponse<LikeState>> {
    if state.store.find_by_id::<T>(target.id()).await?.is_none() {
        return Err(ApiError::not_found(format!("{label} not found")));
    }
    let key = Filter::eq("likedBy", actor.0).and(Filter::eq(target.field(), target.id()));
    let outcome = state.store.toggle(Like::new(target, actor.0), &key).await?;
    let is_liked = outcome.is_inserted();
    let message = if is_liked {
        format!("{label} liked")
    } else {
        format!("{label} unliked")
    };
    Ok(ApiResponse::ok(LikeState { is_liked }, message))
}

pub async fn toggle_video_like(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<LikeState>> {
    let video_id = parse_id(&video_id, "video")?;
    toggle_like::<Video>(&state, actor, LikeTarget::Video(video_id), "Video").await
}

pub async fn toggle_comment_like(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(comment_id): AxumPath<String>,
) -> ApiResult<ApiResponse<LikeState>> {
    let comment_id = parse_id(&comment_id, "comment")?;
    toggle_like::<Comment>(&state, actor, LikeTarget::Comment(comment_id), "Comment").await
}

pub async fn toggle_tweet_like(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(tweet_id): AxumPath<String>,
) -> ApiResult<ApiResponse<LikeState>> {
    let tweet_id = parse_id(&tweet_id, "tweet")?;
    toggle_like::<Tweet>(&state, actor, LikeTarget::Tweet(tweet_id), "Tweet").await
}

/// Videos the actor liked, most recent like first. Likes whose video has
/// since been deleted are left out.
pub async fn get_liked_videos(
    State(state): State<AppState>,
    actor: ActingUser,
) -> ApiResult<ApiResponse<Vec<LikedVideo>>> {
    let likes = state
        .store
        .find::<Like>(
            &Query::new(Filter::eq("likedBy", actor.0).and(Filter::exists("video")))
                .sort("createdAt", Direction::Desc),
        )
        .await?;
    let video_ids: Vec<ObjectId> = likes
        .iter()
        .filter_map(|like| match like.target() {
            Some(LikeTarget::Video(id)) => Some(id),
            _ => None,
        })
        .collect();
    let videos = populate::videos_by_id(&state.store, video_ids).await?;

    let liked = likes
        .into_iter()
        .filter_map(|like| {
            let Some(LikeTarget::Video(video_id)) = like.target() else {
                return None;
            };
            let video = videos.get(&video_id)?.clone();
            Some(LikedVideo {
                id: like.id,
                video,
                liked_by: like.liked_by,
                created_at: like.created_at,
            })
        })
        .collect();
    Ok(ApiResponse::ok(liked, "Liked videos fetched successfully"))
}
