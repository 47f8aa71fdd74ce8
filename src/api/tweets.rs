use axum::extract::{Path as AxumPath, State};
use serde::Deserialize;

use super::{
    AppState,
    extract::{ActingUser, JsonBody, ensure_owner, parse_id, required_text},
    response::{ApiError, ApiResponse, ApiResult},
};
use crate::{
    models::Tweet,
    store::{Direction, Filter, Query},
};

#[derive(Debug, Deserialize)]
pub struct TweetBody {
    content: Option<String>,
}

pub async fn create_tweet(
    State(state): State<AppState>,
    actor: ActingUser,
    JsonBody(body): JsonBody<TweetBody>,
) -> ApiResult<ApiResponse<Tweet>> {
    let content = required_text(body.content, "Content")?;
    let tweet = Tweet::new(content, actor.0);
    state.store.insert(&tweet).await?;
    Ok(ApiResponse::created(tweet, "Tweet created successfully"))
}

/// All tweets by one user, newest first.
pub async fn get_user_tweets(
    State(state): State<AppState>,
    AxumPath(user_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<Tweet>>> {
    let user_id = parse_id(&user_id, "user")?;
    let tweets = state
        .store
        .find::<Tweet>(
            &Query::new(Filter::eq("owner", user_id)).sort("createdAt", Direction::Desc),
        )
        .await?;
    Ok(ApiResponse::ok(tweets, "Tweets fetched successfully"))
}

async fn owned_tweet(state: &AppState, raw_id: &str, actor: ActingUser) -> ApiResult<Tweet> {
    let tweet_id = parse_id(raw_id, "tweet")?;
    let tweet = state
        .store
        .find_by_id::<Tweet>(tweet_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
    ensure_owner(tweet.owner, actor, "tweet")?;
    Ok(tweet)
}

pub async fn update_tweet(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(tweet_id): AxumPath<String>,
    JsonBody(body): JsonBody<TweetBody>,
) -> ApiResult<ApiResponse<Tweet>> {
    let tweet = owned_tweet(&state, &tweet_id, actor).await?;
    let content = required_text(body.content, "Content")?;
    let updated = state
        .store
        .update_by_id::<Tweet, _>(tweet.id, move |tweet| tweet.content = content)
        .await?
        .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
    Ok(ApiResponse::ok(updated, "Tweet updated successfully"))
}

pub async fn delete_tweet(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(tweet_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Tweet>> {
    let tweet = owned_tweet(&state, &tweet_id, actor).await?;
    let removed = state
        .store
        .delete_by_id::<Tweet>(tweet.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
    Ok(ApiResponse::ok(removed, "Tweet deleted successfully"))
}
