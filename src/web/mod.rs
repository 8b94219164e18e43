use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use maud::{html, Markup};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error};

use crate::leaderboard::{Leaderboard, LeaderboardError, RankLookup, TOP_LIST_LEN};

#[derive(Clone)]
pub struct AppState {
    pub leaderboard: Leaderboard,
}

/// Build the Axum router for the leaderboard routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/add/:score/:player", get(add_handler))
        .route("/remove/:score/:player", get(remove_handler))
        .route("/listTop10", get(top_handler))
        .route("/position/:pos", get(position_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Plain-text message rendered as HTML, followed by the route summary.
struct Page(String);

impl IntoResponse for Page {
    fn into_response(self) -> Response {
        let markup = html! {
            (self.0)
            (path_summary())
        };
        Html(markup.into_string()).into_response()
    }
}

/// Client or server failure rendered as a page with a status code.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Map a service error; storage failures get the route's `apology`.
    fn from_service(err: LeaderboardError, apology: &str) -> Self {
        match err {
            LeaderboardError::UnknownPlayer(player) => Self {
                status: StatusCode::NOT_FOUND,
                message: format!("Player {} does not exist!", player),
            },
            LeaderboardError::Store(e) => {
                error!("Store error: {:#}", e);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: apology.to_string(),
                }
            }
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Page(self.message)).into_response()
    }
}

async fn index_handler() -> Page {
    Page("Welcome to score points game!".to_string())
}

/// GET /add/:score/:player
async fn add_handler(
    State(state): State<Arc<AppState>>,
    Path((score, player)): Path<(String, String)>,
) -> Result<Page, ApiError> {
    let delta = parse_score(&score)?;
    let update = state
        .leaderboard
        .add_score(&player, delta)
        .await
        .map_err(|e| ApiError::from_service(e, "Error to add score, sorry!"))?;

    debug!(player = %update.player, score = update.score, "score added");
    let verb = if update.created { "add" } else { "increased" };
    Ok(Page(format!(
        "Success {} the score {} to player {}",
        verb,
        format_score(update.delta),
        update.player
    )))
}

/// GET /remove/:score/:player
async fn remove_handler(
    State(state): State<Arc<AppState>>,
    Path((score, player)): Path<(String, String)>,
) -> Result<Page, ApiError> {
    let amount = parse_score(&score)?;
    let update = state
        .leaderboard
        .remove_score(&player, amount)
        .await
        .map_err(|e| ApiError::from_service(e, "Error to remove score, sorry!"))?;
    debug!(player = %update.player, score = update.score, "score removed");

    Ok(Page(format!(
        "Success decreased the score {} to player {}",
        format_score(update.delta),
        update.player
    )))
}

/// GET /listTop10
///
/// Flattened `[player, score, player, score, ...]`.
async fn top_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let top = state
        .leaderboard
        .top(TOP_LIST_LEN)
        .await
        .map_err(|e| ApiError::from_service(e, "Error to list top 10, sorry!"))?;

    let flat = top
        .into_iter()
        .flat_map(|entry| [entry.member, format_score(entry.score)])
        .collect();
    Ok(Json(flat))
}

/// GET /position/:pos
async fn position_handler(
    State(state): State<Arc<AppState>>,
    Path(pos): Path<String>,
) -> Result<Page, ApiError> {
    let position: i64 = pos.trim().parse().map_err(|_| {
        ApiError::bad_request(format!("Position must be an integer, got {}", pos))
    })?;

    let lookup = state
        .leaderboard
        .player_at(position)
        .await
        .map_err(|e| ApiError::from_service(e, "Error to list player, sorry!"))?;

    Ok(Page(match lookup {
        RankLookup::Found {
            player,
            position,
            score,
        } => {
            debug!(%player, position, score, "position found");
            format!("The player of the position {} is {}", position, player)
        }
        RankLookup::NotFound { position } => {
            debug!(position, "position empty");
            "This position does not exist!".to_string()
        }
    }))
}

fn parse_score(raw: &str) -> Result<f64, ApiError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ApiError::bad_request(format!("Score must be a number, got {}", raw)))
}

/// Render a score the way a sorted-set `WITHSCORES` reply does.
///
/// Shortest round-trip digits; exponent form (`1e+21`, `1e-07`) once the
/// decimal exponent leaves `-4..17`, as `%.17g` would.
fn format_score(score: f64) -> String {
    if !score.is_finite() {
        return score.to_string();
    }
    let sci = format!("{:e}", score);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return score.to_string();
    };
    match exp.parse::<i32>() {
        Ok(exp) if !(-4..17).contains(&exp) => {
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.unsigned_abs())
        }
        _ => score.to_string(),
    }
}

/// Route summary appended to every text page
fn path_summary() -> Markup {
    html! {
        br;
        br;
        "Paths:"
        ul {
            li { "Home page: " i { b { "/" } } }
            li { "Add N points to player X: " i { b { "/add/:score/:player" } } }
            li { "Remove N points from player X: " i { b { "/remove/:score/:player" } } }
            li { "List the top 10: " i { b { "/listTop10" } } }
            li { "Player at the Nth rank: " i { b { "/position/:pos" } } }
        }
    }
}
