//! HTTP surface for the remote operations.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use warp::Filter;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};

use crate::engine::TweetService;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct TopicRequest {
    #[serde(default)]
    subject: Option<String>,
}

type JsonReply = WithStatus<Json>;

fn reply(value: serde_json::Value, status: StatusCode) -> JsonReply {
    warp::reply::with_status(warp::reply::json(&value), status)
}

fn internal_error(operation: &str, e: Error) -> JsonReply {
    error!(operation, kind = e.kind(), "request failed: {e}");
    reply(
        json!({ "error": e.to_string() }),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

fn with_service(
    service: TweetService,
) -> impl Filter<Extract = (TweetService,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

async fn set_topic(
    request: TopicRequest,
    service: TweetService,
) -> std::result::Result<JsonReply, Infallible> {
    Ok(
        match service.set_tweet_subject(request.subject.as_deref()).await {
            Ok(change) => reply(
                json!({ "accepted": change.accepted() }),
                StatusCode::ACCEPTED,
            ),
            Err(e) => internal_error("set_topic", e),
        },
    )
}

async fn get_score(service: TweetService) -> std::result::Result<JsonReply, Infallible> {
    Ok(match service.get_average_sentiment_score().await {
        Ok(Some(aggregate)) => reply(json!(aggregate), StatusCode::OK),
        Ok(None) => reply(
            json!({ "error": "shutting down" }),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        Err(e) => internal_error("get_score", e),
    })
}

async fn get_status(service: TweetService) -> std::result::Result<JsonReply, Infallible> {
    Ok(match service.status().await {
        Ok(status) => reply(
            json!({ "state": service.state(), "queues": status }),
            StatusCode::OK,
        ),
        Err(e) => internal_error("get_status", e),
    })
}

async fn get_health(service: TweetService) -> std::result::Result<JsonReply, Infallible> {
    let state = service.state();
    Ok(match service.health().await {
        Ok(()) => reply(json!({ "state": state, "store": "ok" }), StatusCode::OK),
        Err(e) => {
            warn!(kind = e.kind(), "store health check failed: {e}");
            reply(
                json!({ "state": state, "store": "unavailable" }),
                StatusCode::SERVICE_UNAVAILABLE,
            )
        }
    })
}

/// All routes, ready for [`warp::serve`].
pub fn routes(
    service: TweetService,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let topic = warp::path("topic")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::json())
        .and(with_service(service.clone()))
        .and_then(set_topic);

    let score = warp::path("score")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(get_score);

    let status = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(get_status);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_service(service))
        .and_then(get_health);

    topic.or(score).or(status).or(health)
}

/// Serve [`routes`] on `addr` until `shutdown` resolves.
pub async fn serve<S>(addr: SocketAddr, service: TweetService, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (bound, server) = warp::serve(routes(service))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| Error::Other(format!("cannot listen on {addr}: {e}")))?;
    info!(addr = %bound, "http server listening");
    server.await;
    info!("http server stopped");
    Ok(())
}
