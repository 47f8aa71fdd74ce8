use axum::extract::{Path as AxumPath, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    AppState,
    extract::{ActingUser, JsonBody, ensure_owner, optional_text, parse_id, required_text},
    populate,
    response::{ApiError, ApiResponse, ApiResult},
};
use crate::{
    models::{Playlist, Video, timestamp},
    object_id::ObjectId,
    store::{Filter, Query},
};

#[derive(Debug, Deserialize)]
pub struct PlaylistBody {
    name: Option<String>,
    description: Option<String>,
}

/// A playlist with its video ids replaced by the videos, in list order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistWithVideos {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub description: String,
    pub owner: ObjectId,
    pub videos: Vec<Video>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

pub async fn create_playlist(
    State(state): State<AppState>,
    actor: ActingUser,
    JsonBody(body): JsonBody<PlaylistBody>,
) -> ApiResult<ApiResponse<Playlist>> {
    let name = required_text(body.name, "Name")?;
    let description = body.description.map(|value| value.trim().to_string()).unwrap_or_default();
    let playlist = Playlist::new(name, description, actor.0);
    state.store.insert(&playlist).await?;
    Ok(ApiResponse::created(playlist, "Playlist created successfully"))
}

pub async fn get_user_playlists(
    State(state): State<AppState>,
    AxumPath(user_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<Playlist>>> {
    let user_id = parse_id(&user_id, "user")?;
    let playlists = state
        .store
        .find::<Playlist>(&Query::new(Filter::eq("owner", user_id)))
        .await?;
    Ok(ApiResponse::ok(playlists, "Playlists fetched successfully"))
}

pub async fn get_playlist_by_id(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
) -> ApiResult<ApiResponse<PlaylistWithVideos>> {
    let playlist_id = parse_id(&playlist_id, "playlist")?;
    let playlist = state
        .store
        .find_by_id::<Playlist>(playlist_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;

    let mut found = populate::videos_by_id(&state.store, playlist.videos.iter().copied()).await?;
    let videos = playlist
        .videos
        .iter()
        .filter_map(|id| found.remove(id))
        .collect();
    let view = PlaylistWithVideos {
        id: playlist.id,
        name: playlist.name,
        description: playlist.description,
        owner: playlist.owner,
        videos,
        created_at: playlist.created_at,
        updated_at: playlist.updated_at,
    };
    Ok(ApiResponse::ok(view, "Playlist fetched successfully"))
}

async fn owned_playlist(state: &AppState, raw_id: &str, actor: ActingUser) -> ApiResult<Playlist> {
    let playlist_id = parse_id(raw_id, "playlist")?;
    let playlist = state
        .store
        .find_by_id::<Playlist>(playlist_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    ensure_owner(playlist.owner, actor, "playlist")?;
    Ok(playlist)
}

/// Adding a video that is already present leaves the list unchanged.
pub async fn add_video_to_playlist(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath((video_id, playlist_id)): AxumPath<(String, String)>,
) -> ApiResult<ApiResponse<Playlist>> {
    let video_id = parse_id(&video_id, "video")?;
    let playlist = owned_playlist(&state, &playlist_id, actor).await?;
    if state.store.find_by_id::<Video>(video_id).await?.is_none() {
        return Err(ApiError::not_found("Video not found"));
    }
    let updated = state
        .store
        .update_by_id::<Playlist, _>(playlist.id, |playlist| {
            playlist.add_video(video_id);
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok(updated, "Video added to playlist successfully"))
}

/// Removing a video that is not in the list is not an error.
pub async fn remove_video_from_playlist(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath((video_id, playlist_id)): AxumPath<(String, String)>,
) -> ApiResult<ApiResponse<Playlist>> {
    let video_id = parse_id(&video_id, "video")?;
    let playlist = owned_playlist(&state, &playlist_id, actor).await?;
    let updated = state
        .store
        .update_by_id::<Playlist, _>(playlist.id, |playlist| {
            playlist.remove_video(video_id);
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok(updated, "Video removed from playlist successfully"))
}

pub async fn update_playlist(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(playlist_id): AxumPath<String>,
    JsonBody(body): JsonBody<PlaylistBody>,
) -> ApiResult<ApiResponse<Playlist>> {
    let playlist = owned_playlist(&state, &playlist_id, actor).await?;
    let name = optional_text(body.name, "Name")?;
    let description = body.description.map(|value| value.trim().to_string());
    if name.is_none() && description.is_none() {
        return Err(ApiError::bad_request("Name or description is required"));
    }
    let updated = state
        .store
        .update_by_id::<Playlist, _>(playlist.id, move |playlist| {
            if let Some(name) = name {
                playlist.name = name;
            }
            if let Some(description) = description {
                playlist.description = description;
            }
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok(updated, "Playlist updated successfully"))
}

pub async fn delete_playlist(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(playlist_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Playlist>> {
    let playlist = owned_playlist(&state, &playlist_id, actor).await?;
    let removed = state
        .store
        .delete_by_id::<Playlist>(playlist.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok(removed, "Playlist deleted successfully"))
}
