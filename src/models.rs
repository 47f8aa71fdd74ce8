//! Entity records persisted in the document store.
//!
//! Every struct mirrors the JSON document kept in its collection; field names
//! are camelCase both in storage and on the wire.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object_id::ObjectId;
use crate::store::{Document, DocumentStore};

/// Timestamps are stored with a fixed millisecond precision so that string
/// comparison inside the store matches chronological order.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|value| value.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Creates every collection this service reads or writes.
pub async fn ensure_collections(store: &DocumentStore) -> Result<()> {
    store.ensure_collection::<User>().await?;
    store.ensure_collection::<Video>().await?;
    store.ensure_collection::<Comment>().await?;
    store.ensure_collection::<Tweet>().await?;
    store.ensure_collection::<Playlist>().await?;
    store.ensure_collection::<Subscription>().await?;
    store.ensure_collection::<Like>().await?;
    Ok(())
}

/// Current time truncated to what survives a storage round trip.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    pub video_file: String,
    pub thumbnail: String,
    pub owner: ObjectId,
    #[serde(default)]
    pub views: i64,
    #[serde(default = "default_published")]
    pub is_published: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

fn default_published() -> bool {
    true
}

impl Video {
    pub fn new(
        title: String,
        description: String,
        video_file: String,
        thumbnail: String,
        owner: ObjectId,
    ) -> Self {
        let now = now();
        Self {
            id: ObjectId::new(),
            title,
            description,
            video_file,
            thumbnail,
            owner,
            views: 0,
            is_published: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Document for Video {
    const COLLECTION: &'static str = "videos";
    const INDEXED_FIELDS: &'static [&'static str] = &["owner"];

    fn id(&self) -> ObjectId {
        self.id
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub content: String,
    pub video: ObjectId,
    pub owner: ObjectId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(content: String, video: ObjectId, owner: ObjectId) -> Self {
        let now = now();
        Self {
            id: ObjectId::new(),
            content,
            video,
            owner,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Document for Comment {
    const COLLECTION: &'static str = "comments";
    const INDEXED_FIELDS: &'static [&'static str] = &["video"];

    fn id(&self) -> ObjectId {
        self.id
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tweet {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub content: String,
    pub owner: ObjectId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Tweet {
    pub fn new(content: String, owner: ObjectId) -> Self {
        let now = now();
        Self {
            id: ObjectId::new(),
            content,
            owner,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Document for Tweet {
    const COLLECTION: &'static str = "tweets";
    const INDEXED_FIELDS: &'static [&'static str] = &["owner"];

    fn id(&self) -> ObjectId {
        self.id
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub owner: ObjectId,
    #[serde(default)]
    pub videos: Vec<ObjectId>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Playlist {
    pub fn new(name: String, description: String, owner: ObjectId) -> Self {
        let now = now();
        Self {
            id: ObjectId::new(),
            name,
            description,
            owner,
            videos: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends `video` unless it is already present. Returns whether the list
    /// changed.
    pub fn add_video(&mut self, video: ObjectId) -> bool {
        if self.videos.contains(&video) {
            return false;
        }
        self.videos.push(video);
        true
    }

    pub fn remove_video(&mut self, video: ObjectId) -> bool {
        let before = self.videos.len();
        self.videos.retain(|existing| *existing != video);
        before != self.videos.len()
    }
}

impl Document for Playlist {
    const COLLECTION: &'static str = "playlists";
    const INDEXED_FIELDS: &'static [&'static str] = &["owner"];

    fn id(&self) -> ObjectId {
        self.id
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub subscriber: ObjectId,
    pub channel: ObjectId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(subscriber: ObjectId, channel: ObjectId) -> Self {
        let now = now();
        Self {
            id: ObjectId::new(),
            subscriber,
            channel,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Document for Subscription {
    const COLLECTION: &'static str = "subscriptions";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["subscriber", "channel"]];
    const INDEXED_FIELDS: &'static [&'static str] = &["channel"];

    fn id(&self) -> ObjectId {
        self.id
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

/// The entity a like points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget {
    Video(ObjectId),
    Comment(ObjectId),
    Tweet(ObjectId),
}

impl LikeTarget {
    /// Name of the document field holding the target id.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Video(_) => "video",
            Self::Comment(_) => "comment",
            Self::Tweet(_) => "tweet",
        }
    }

    pub fn id(&self) -> ObjectId {
        match self {
            Self::Video(id) | Self::Comment(id) | Self::Tweet(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    video: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tweet: Option<ObjectId>,
    pub liked_by: ObjectId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Like {
    pub fn new(target: LikeTarget, liked_by: ObjectId) -> Self {
        let now = now();
        let mut like = Self {
            id: ObjectId::new(),
            video: None,
            comment: None,
            tweet: None,
            liked_by,
            created_at: now,
            updated_at: now,
        };
        match target {
            LikeTarget::Video(id) => like.video = Some(id),
            LikeTarget::Comment(id) => like.comment = Some(id),
            LikeTarget::Tweet(id) => like.tweet = Some(id),
        }
        like
    }

    /// Returns the single target, or `None` for a malformed stored row.
    pub fn target(&self) -> Option<LikeTarget> {
        match (self.video, self.comment, self.tweet) {
            (Some(id), None, None) => Some(LikeTarget::Video(id)),
            (None, Some(id), None) => Some(LikeTarget::Comment(id)),
            (None, None, Some(id)) => Some(LikeTarget::Tweet(id)),
            _ => None,
        }
    }
}

impl Document for Like {
    const COLLECTION: &'static str = "likes";
    const INDEXED_FIELDS: &'static [&'static str] = &["video"];
    const UNIQUE_KEYS: &'static [&'static [&'static str]] =
        &[&["likedBy", "video", "comment", "tweet"]];

    fn id(&self) -> ObjectId {
        self.id
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

/// Account record owned by the external identity service. This backend only
/// reads it; responses always go through [`PublicUser`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Document for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> ObjectId {
        self.id
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

/// User projection without credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            avatar: user.avatar,
            cover_image: user.cover_image,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
