use axum::extract::{Path as AxumPath, State};
use serde::Deserialize;

use super::{
    AppState,
    extract::{ActingUser, MultipartForm, Pagination, QueryParams, ensure_owner, optional_text, parse_id, required_text},
    populate::VideoWithOwner,
    response::{ApiError, ApiResponse, ApiResult},
    uploads::UploadForm,
};
use crate::{
    models::Video,
    store::{Direction, Filter, Query},
};

const VIDEO_FILE_FIELD: &str = "videoFile";
const THUMBNAIL_FIELD: &str = "thumbnail";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListParams {
    page: Option<u64>,
    limit: Option<u64>,
    /// Case-insensitive substring matched against titles.
    query: Option<String>,
    sort_by: Option<String>,
    sort_type: Option<String>,
    user_id: Option<String>,
}

/// Fields clients may sort the video list by.
fn sort_field(name: &str) -> Option<&'static str> {
    match name {
        "title" => Some("title"),
        "description" => Some("description"),
        "views" => Some("views"),
        "isPublished" => Some("isPublished"),
        "createdAt" => Some("createdAt"),
        "updatedAt" => Some("updatedAt"),
        _ => None,
    }
}

impl VideoListParams {
    fn to_query(&self) -> ApiResult<Query> {
        let (page, limit) = Pagination {
            page: self.page,
            limit: self.limit,
        }
        .resolve()?;

        let mut filter = Filter::All;
        if let Some(needle) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            filter = filter.and(Filter::contains("title", needle));
        }
        if let Some(raw) = self.user_id.as_deref() {
            filter = filter.and(Filter::eq("owner", parse_id(raw, "user")?));
        }

        let mut query = Query::new(filter);
        if let (Some(by), Some(kind)) = (self.sort_by.as_deref(), self.sort_type.as_deref()) {
            let field = sort_field(by)
                .ok_or_else(|| ApiError::bad_request(format!("Cannot sort videos by {by}")))?;
            let direction = if kind.eq_ignore_ascii_case("asc") {
                Direction::Asc
            } else {
                Direction::Desc
            };
            query = query.sort(field, direction);
        }
        Ok(query.page(page, limit))
    }
}

pub async fn get_all_videos(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<VideoListParams>,
) -> ApiResult<ApiResponse<Vec<Video>>> {
    let query = params.to_query()?;
    let videos = state.store.find::<Video>(&query).await?;
    Ok(ApiResponse::ok(videos, "Videos fetched successfully"))
}

pub async fn publish_video(
    State(state): State<AppState>,
    actor: ActingUser,
    MultipartForm(multipart): MultipartForm,
) -> ApiResult<ApiResponse<Video>> {
    let mut form =
        UploadForm::read(multipart, &state.uploads_dir, &[VIDEO_FILE_FIELD, THUMBNAIL_FIELD]).await?;
    let (Some(video_file), Some(thumbnail)) =
        (form.take_file(VIDEO_FILE_FIELD), form.take_file(THUMBNAIL_FIELD))
    else {
        return Err(ApiError::bad_request("Video file and thumbnail are required"));
    };
    let title = required_text(form.take_text("title"), "Title")?;
    let description = required_text(form.take_text("description"), "Description")?;
    video_file.require_kind("video", VIDEO_FILE_FIELD)?;
    thumbnail.require_kind("image", THUMBNAIL_FIELD)?;

    let video_ref = state.assets.upload(video_file.path()).await?;
    let thumbnail_ref = state.assets.upload(thumbnail.path()).await?;

    let video = Video::new(title, description, video_ref, thumbnail_ref, actor.0);
    state.store.insert(&video).await?;
    tracing::info!(video = %video.id, owner = %video.owner, "published video");
    Ok(ApiResponse::created(video, "Video uploaded successfully"))
}

pub async fn get_video_by_id(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<VideoWithOwner>> {
    let video_id = parse_id(&video_id, "video")?;
    let video = state
        .store
        .find_by_id::<Video>(video_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    let view = VideoWithOwner::load(&state.store, video).await?;
    Ok(ApiResponse::ok(view, "Video fetched successfully"))
}

/// Loads a video the actor is allowed to change.
async fn owned_video(state: &AppState, raw_id: &str, actor: ActingUser) -> ApiResult<Video> {
    let video_id = parse_id(raw_id, "video")?;
    let video = state
        .store
        .find_by_id::<Video>(video_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    ensure_owner(video.owner, actor, "video")?;
    Ok(video)
}

/// Accepts `title`, `description` and an optional replacement `thumbnail`.
pub async fn update_video(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(video_id): AxumPath<String>,
    MultipartForm(multipart): MultipartForm,
) -> ApiResult<ApiResponse<Video>> {
    let video = owned_video(&state, &video_id, actor).await?;
    let mut form = UploadForm::read(multipart, &state.uploads_dir, &[THUMBNAIL_FIELD]).await?;
    let title = optional_text(form.take_text("title"), "Title")?;
    let description = optional_text(form.take_text("description"), "Description")?;
    let thumbnail = match form.take_file(THUMBNAIL_FIELD) {
        Some(file) => {
            file.require_kind("image", THUMBNAIL_FIELD)?;
            Some(state.assets.upload(file.path()).await?)
        }
        None => None,
    };

    let updated = state
        .store
        .update_by_id::<Video, _>(video.id, move |video| {
            if let Some(title) = title {
                video.title = title;
            }
            if let Some(description) = description {
                video.description = description;
            }
            if let Some(thumbnail) = thumbnail {
                video.thumbnail = thumbnail;
            }
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::ok(updated, "Video updated successfully"))
}

pub async fn delete_video(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Video>> {
    let video = owned_video(&state, &video_id, actor).await?;
    let removed = state
        .store
        .delete_by_id::<Video>(video.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    tracing::info!(video = %removed.id, "deleted video");
    Ok(ApiResponse::ok(removed, "Video deleted successfully"))
}

pub async fn toggle_publish_status(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Video>> {
    let video = owned_video(&state, &video_id, actor).await?;
    let updated = state
        .store
        .update_by_id::<Video, _>(video.id, |video| video.is_published = !video.is_published)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::ok(updated, "Publish status toggled successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn params(pairs: &[(&str, &str)]) -> VideoListParams {
        let raw = pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let uri: axum::http::Uri = format!("/videos?{raw}").parse().unwrap();
        axum::extract::Query::<VideoListParams>::try_from_uri(&uri)
            .unwrap()
            .0
    }

    #[test]
    fn list_defaults_to_first_page_in_insertion_order() {
        let query = VideoListParams::default().to_query().unwrap();
        assert_eq!(query.filter, Filter::All);
        assert_eq!(query.sort, None);
        assert_eq!((query.skip, query.limit), (0, Some(10)));
    }

    #[test]
    fn list_combines_search_owner_and_sort() {
        let owner = "65a1f0c2e4b0a1b2c3d4e5f6";
        let query = params(&[
            ("query", "cats"),
            ("userId", owner),
            ("sortBy", "views"),
            ("sortType", "asc"),
            ("page", "3"),
            ("limit", "5"),
        ])
        .to_query()
        .unwrap();
        assert_eq!(
            query.filter,
            Filter::contains("title", "cats").and(Filter::eq(
                "owner",
                owner.parse::<crate::object_id::ObjectId>().unwrap()
            ))
        );
        let sort = query.sort.unwrap();
        assert_eq!((sort.field, sort.direction), ("views", Direction::Asc));
        assert_eq!((query.skip, query.limit), (10, Some(5)));
    }

    #[test]
    fn sort_needs_both_field_and_direction() {
        let query = params(&[("sortBy", "views")]).to_query().unwrap();
        assert_eq!(query.sort, None);
        let query = params(&[("sortBy", "createdAt"), ("sortType", "desc")])
            .to_query()
            .unwrap();
        assert_eq!(query.sort.unwrap().direction, Direction::Desc);
    }

    #[test]
    fn list_rejects_bad_input() {
        let err = params(&[("sortBy", "password"), ("sortType", "asc")])
            .to_query()
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err = params(&[("userId", "nope")]).to_query().unwrap_err();
        assert_eq!(err.message(), "Invalid user ID");
        let err = params(&[("page", "0")]).to_query().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
