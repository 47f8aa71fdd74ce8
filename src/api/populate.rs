//! Response views that replace stored ids with the records they point at.
//! Ids whose record no longer exists expand to nothing.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    models::{Comment, PublicUser, User, Video, timestamp},
    object_id::ObjectId,
    store::{DocumentStore, Filter, Query},
};

/// Loads public profiles for `ids`, keyed by id.
pub async fn users_by_id(
    store: &DocumentStore,
    ids: impl IntoIterator<Item = ObjectId>,
) -> Result<HashMap<ObjectId, PublicUser>> {
    let users: Vec<User> = store
        .find(&Query::new(Filter::any_of("_id", unique(ids))))
        .await?;
    Ok(users
        .into_iter()
        .map(|user| (user.id, PublicUser::from(user)))
        .collect())
}

/// Public profiles for `ids`, in the given order.
pub async fn users_in_order(store: &DocumentStore, ids: Vec<ObjectId>) -> Result<Vec<PublicUser>> {
    let mut found = users_by_id(store, ids.iter().copied()).await?;
    Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
}

pub async fn videos_by_id(
    store: &DocumentStore,
    ids: impl IntoIterator<Item = ObjectId>,
) -> Result<HashMap<ObjectId, Video>> {
    let videos: Vec<Video> = store
        .find(&Query::new(Filter::any_of("_id", unique(ids))))
        .await?;
    Ok(videos.into_iter().map(|video| (video.id, video)).collect())
}

fn unique(ids: impl IntoIterator<Item = ObjectId>) -> Vec<ObjectId> {
    let mut seen = Vec::new();
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoWithOwner {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    pub video_file: String,
    pub thumbnail: String,
    pub owner: Option<PublicUser>,
    pub views: i64,
    pub is_published: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl VideoWithOwner {
    pub async fn load(store: &DocumentStore, video: Video) -> Result<Self> {
        let owner = users_by_id(store, [video.owner]).await?.remove(&video.owner);
        Ok(Self::new(video, owner))
    }

    fn new(video: Video, owner: Option<PublicUser>) -> Self {
        Self {
            id: video.id,
            title: video.title,
            description: video.description,
            video_file: video.video_file,
            thumbnail: video.thumbnail,
            owner,
            views: video.views,
            is_published: video.is_published,
            created_at: video.created_at,
            updated_at: video.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWithOwner {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub content: String,
    pub video: ObjectId,
    pub owner: Option<PublicUser>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl CommentWithOwner {
    pub async fn load_all(store: &DocumentStore, comments: Vec<Comment>) -> Result<Vec<Self>> {
        let owners = users_by_id(store, comments.iter().map(|comment| comment.owner)).await?;
        Ok(comments
            .into_iter()
            .map(|comment| Self {
                owner: owners.get(&comment.owner).cloned(),
                id: comment.id,
                content: comment.content,
                video: comment.video,
                created_at: comment.created_at,
                updated_at: comment.updated_at,
            })
            .collect())
    }
}
