use axum::extract::{Path as AxumPath, State};
use serde::Deserialize;

use super::{
    AppState,
    extract::{ActingUser, JsonBody, Pagination, QueryParams, ensure_owner, parse_id, required_text},
    populate::CommentWithOwner,
    response::{ApiError, ApiResponse, ApiResult},
};
use crate::{
    models::{Comment, Video},
    store::{Direction, Filter, Query},
};

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    content: Option<String>,
}

/// Newest first, paged.
pub async fn get_video_comments(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    QueryParams(pagination): QueryParams<Pagination>,
) -> ApiResult<ApiResponse<Vec<CommentWithOwner>>> {
    let video_id = parse_id(&video_id, "video")?;
    let (page, limit) = pagination.resolve()?;
    let comments = state
        .store
        .find::<Comment>(
            &Query::new(Filter::eq("video", video_id))
                .sort("createdAt", Direction::Desc)
                .page(page, limit),
        )
        .await?;
    let comments = CommentWithOwner::load_all(&state.store, comments).await?;
    Ok(ApiResponse::ok(comments, "Comments fetched successfully"))
}

pub async fn add_comment(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(video_id): AxumPath<String>,
    JsonBody(body): JsonBody<CommentBody>,
) -> ApiResult<ApiResponse<Comment>> {
    let video_id = parse_id(&video_id, "video")?;
    let content = required_text(body.content, "Content")?;
    if state.store.find_by_id::<Video>(video_id).await?.is_none() {
        return Err(ApiError::not_found("Video not found"));
    }

    let comment = Comment::new(content, video_id, actor.0);
    state.store.insert(&comment).await?;
    Ok(ApiResponse::created(comment, "Comment added successfully"))
}

async fn owned_comment(state: &AppState, raw_id: &str, actor: ActingUser) -> ApiResult<Comment> {
    let comment_id = parse_id(raw_id, "comment")?;
    let comment = state
        .store
        .find_by_id::<Comment>(comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
    ensure_owner(comment.owner, actor, "comment")?;
    Ok(comment)
}

pub async fn update_comment(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(comment_id): AxumPath<String>,
    JsonBody(body): JsonBody<CommentBody>,
) -> ApiResult<ApiResponse<Comment>> {
    let comment = owned_comment(&state, &comment_id, actor).await?;
    let content = required_text(body.content, "Content")?;
    let updated = state
        .store
        .update_by_id::<Comment, _>(comment.id, move |comment| comment.content = content)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
    Ok(ApiResponse::ok(updated, "Comment updated successfully"))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(comment_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Comment>> {
    let comment = owned_comment(&state, &comment_id, actor).await?;
    let removed = state
        .store
        .delete_by_id::<Comment>(comment.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
    Ok(ApiResponse::ok(removed, "Comment deleted successfully"))
}
