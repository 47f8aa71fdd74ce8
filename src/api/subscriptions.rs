use axum::extract::{Path as AxumPath, State};
use serde::Serialize;

use super::{
    AppState,
    extract::{ActingUser, parse_id},
    populate,
    response::{ApiResponse, ApiResult},
};
use crate::{
    models::{PublicUser, Subscription},
    object_id::ObjectId,
    store::Filter,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    is_subscribed: bool,
}

/// Subscribes the actor to the channel, or unsubscribes when already
/// subscribed.
pub async fn toggle_subscription(
    State(state): State<AppState>,
    actor: ActingUser,
    AxumPath(channel_id): AxumPath<String>,
) -> ApiResult<ApiResponse<SubscriptionState>> {
    let channel_id = parse_id(&channel_id, "channel")?;
    let key = Filter::eq("subscriber", actor.0).and(Filter::eq("channel", channel_id));
    let outcome = state
        .store
        .toggle(Subscription::new(actor.0, channel_id), &key)
        .await?;
    let is_subscribed = outcome.is_inserted();
    tracing::debug!(channel = %channel_id, subscriber = %actor.0, is_subscribed, "toggled subscription");

    let message = if is_subscribed {
        "Subscribed successfully"
    } else {
        "Unsubscribed successfully"
    };
    Ok(ApiResponse::ok(SubscriptionState { is_subscribed }, message))
}

pub async fn get_channel_subscribers(
    State(state): State<AppState>,
    AxumPath(channel_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<PublicUser>>> {
    let channel_id = parse_id(&channel_id, "channel")?;
    let subscribers: Vec<ObjectId> = state
        .store
        .distinct::<Subscription, _>("subscriber", &Filter::eq("channel", channel_id))
        .await?;
    let users = populate::users_in_order(&state.store, subscribers).await?;
    Ok(ApiResponse::ok(users, "Subscribers fetched successfully"))
}

pub async fn get_subscribed_channels(
    State(state): State<AppState>,
    AxumPath(subscriber_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<PublicUser>>> {
    let subscriber_id = parse_id(&subscriber_id, "subscriber")?;
    let channels: Vec<ObjectId> = state
        .store
        .distinct::<Subscription, _>("channel", &Filter::eq("subscriber", subscriber_id))
        .await?;
    let users = populate::users_in_order(&state.store, channels).await?;
    Ok(ApiResponse::ok(users, "Subscribed channels fetched successfully"))
}
