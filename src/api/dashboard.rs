use axum::extract::{Path as AxumPath, State};
use serde::Serialize;

use super::{
    AppState,
    extract::{Pagination, QueryParams, parse_id},
    response::{ApiResponse, ApiResult},
};
use crate::{
    models::{Like, Subscription, Video},
    object_id::ObjectId,
    store::{Direction, DocumentStore, Filter, Query},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub total_videos: u64,
    pub total_views: i64,
    pub total_subscribers: u64,
    /// Likes on the channel's videos; likes on comments or tweets are not
    /// counted.
    pub total_likes: u64,
}

impl ChannelStats {
    pub async fn compute(store: &DocumentStore, channel: ObjectId) -> anyhow::Result<Self> {
        let owned = Filter::eq("owner", channel);
        let total_videos = store.count::<Video>(&owned).await?;
        let total_views = store.sum::<Video>("views", &owned).await?;
        let total_subscribers = store
            .count::<Subscription>(&Filter::eq("channel", channel))
            .await?;
        let video_ids: Vec<ObjectId> = store.distinct::<Video, _>("_id", &owned).await?;
        let total_likes = store
            .count::<Like>(&Filter::any_of("video", video_ids))
            .await?;
        Ok(Self {
            total_videos,
            total_views,
            total_subscribers,
            total_likes,
        })
    }
}

pub async fn get_channel_stats(
    State(state): State<AppState>,
    AxumPath(channel_id): AxumPath<String>,
) -> ApiResult<ApiResponse<ChannelStats>> {
    let channel_id = parse_id(&channel_id, "channel")?;
    let stats = ChannelStats::compute(&state.store, channel_id).await?;
    Ok(ApiResponse::ok(stats, "Channel stats fetched successfully"))
}

/// Every video the channel owns, published or not, newest first.
pub async fn get_channel_videos(
    State(state): State<AppState>,
    AxumPath(channel_id): AxumPath<String>,
    QueryParams(pagination): QueryParams<Pagination>,
) -> ApiResult<ApiResponse<Vec<Video>>> {
    let channel_id = parse_id(&channel_id, "channel")?;
    let (page, limit) = pagination.resolve()?;
    let videos = state
        .store
        .find::<Video>(
            &Query::new(Filter::eq("owner", channel_id))
                .sort("createdAt", Direction::Desc)
                .page(page, limit),
        )
        .await?;
    Ok(ApiResponse::ok(videos, "Channel videos fetched successfully"))
}
