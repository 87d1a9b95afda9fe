use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use tokio::sync::Mutex;

use crate::card::{self, Card};
use crate::review;
use crate::scheduler::{self, Difficulty};
use crate::stats::{self, DailyStats};

// -- App state --

struct ServerState {
    cards: Vec<Card>,
    sources: Vec<PathBuf>,
    log_path: PathBuf,
    daily: BTreeMap<NaiveDate, DailyStats>,
}

type SharedState = Arc<Mutex<ServerState>>;

// -- Route handlers --

#[derive(serde::Deserialize)]
struct ListParams {
    deck: Option<String>,
    #[serde(default)]
    due_only: bool,
}

async fn list_cards(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<Card>> {
    let st = state.lock().await;
    let now = Utc::now();
    let cards = st
        .cards
        .iter()
        .filter(|c| params.deck.as_deref().is_none_or(|d| c.deck == d))
        .filter(|c| !params.due_only || (c.status.is_active() && c.due <= now))
        .cloned()
        .collect();
    Json(cards)
}

async fn due_cards(State(state): State<SharedState>) -> Json<Vec<Card>> {
    let st = state.lock().await;
    let now = Utc::now();
    let due = review::filter_due(&st.cards, now);
    Json(due.into_iter().map(|i| st.cards[i].clone()).collect())
}

#[derive(serde::Deserialize)]
struct NewCard {
    deck: String,
    front: String,
    back: String,
    #[serde(default)]
    tags: String,
}

async fn create_card(
    State(state): State<SharedState>,
    Json(form): Json<NewCard>,
) -> Response {
    let mut st = state.lock().await;

    let source = st
        .cards
        .iter()
        .enumerate()
        .find(|(_, c)| c.deck == form.deck)
        .map(|(i, _)| st.sources[i].clone())
        .or_else(|| st.sources.first().cloned());

    let Some(source) = source else {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "no card files loaded");
    };

    let card = Card::new(&form.deck, &form.front, &form.back, &form.tags, Utc::now());
    st.sources.push(source.clone());
    st.cards.push(card.clone());
    save_file(&st.cards, &st.sources, &source);

    (StatusCode::CREATED, Json(card)).into_response()
}

#[derive(serde::Deserialize)]
struct ReviewRequest {
    difficulty: Difficulty,
    #[serde(default)]
    response_ms: u32,
}

async fn review_card(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Response {
    let mut st = state.lock().await;

    let Some(index) = st.cards.iter().position(|c| c.id == id) else {
        return error_response(StatusCode::NOT_FOUND, "card not found");
    };
    if !st.cards[index].status.is_active() {
        return error_response(StatusCode::CONFLICT, "card is suspended or buried");
    }

    let now = Utc::now();
    let record = review::review_card(
        &mut st.cards[index],
        request.difficulty,
        request.response_ms,
        now,
    );

    let source = st.sources[index].clone();
    save_file(&st.cards, &st.sources, &source);
    if let Err(e) = review::append_log(&st.log_path, &record) {
        eprintln!("Error appending {}: {e}", st.log_path.display());
    }
    stats::record_review(&mut st.daily, &record);

    let card = &st.cards[index];
    Json(json!({
        "card": card,
        "next_due": record.next_due,
        "retention_rate": scheduler::retention_rate(card.correct_reviews, card.total_reviews),
        "review": record,
    }))
    .into_response()
}

async fn card_reviews(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let st = state.lock().await;
    if !st.cards.iter().any(|c| c.id == id) {
        return error_response(StatusCode::NOT_FOUND, "card not found");
    }
    match review::load_log(&st.log_path) {
        Ok(records) => {
            let for_card: Vec<_> = records.into_iter().filter(|r| r.card_id == id).collect();
            Json(for_card).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

async fn delete_card(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let mut st = state.lock().await;

    let Some(index) = st.cards.iter().position(|c| c.id == id) else {
        return error_response(StatusCode::NOT_FOUND, "card not found");
    };
    let source = st.sources[index].clone();
    st.cards.remove(index);
    st.sources.remove(index);
    // The review log keeps its rows; it is append-only.
    save_file(&st.cards, &st.sources, &source);
    Json(json!({"deleted": id})).into_response()
}

async fn get_stats(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let st = state.lock().await;
    let collection = stats::collection_stats(&st.cards, Utc::now());
    Json(json!({
        "collection": collection,
        "daily": &st.daily,
    }))
}

async fn deck_index(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let st = state.lock().await;
    let summaries = review::deck_summaries(&st.cards, Utc::now());
    let decks: Vec<_> = summaries
        .iter()
        .map(|s| json!({"name": s.name, "total": s.total, "due": s.due}))
        .collect();
    Json(json!({"decks": decks}))
}

// -- Helpers --

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

fn save_file(cards: &[Card], sources: &[PathBuf], target: &PathBuf) {
    let file_cards: Vec<Card> = cards
        .iter()
        .enumerate()
        .filter(|(i, _)| sources[*i] == *target)
        .map(|(_, c)| c.clone())
        .collect();
    if let Err(e) = card::save_csv(target, &file_cards) {
        eprintln!("Error saving {}: {e}", target.display());
    }
}

// -- Public entry point --

pub async fn serve(paths: Vec<String>, port: u16) {
    let files = card::discover_files(&paths);
    if files.is_empty() {
        eprintln!("No CSV files found.");
        std::process::exit(1);
    }

    let mut all_cards: Vec<Card> = Vec::new();
    let mut card_sources: Vec<PathBuf> = Vec::new();

    for file in &files {
        match card::load_csv(file) {
            Ok(cards) => {
                for c in cards {
                    card_sources.push(file.clone());
                    all_cards.push(c);
                }
            }
            Err(e) => {
                eprintln!("Warning: {e}");
            }
        }
    }

    let log_path = files[0]
        .parent()
        .map(|p| p.join(card::REVIEW_LOG_NAME))
        .unwrap_or_else(|| PathBuf::from(card::REVIEW_LOG_NAME));

    let daily = match review::load_log(&log_path) {
        Ok(records) => stats::daily_summaries(&records),
        Err(e) => {
            eprintln!("Warning: {e}");
            BTreeMap::new()
        }
    };

    println!(
        "Loaded {} cards from {} files.",
        all_cards.len(),
        files.len()
    );

    let state = Arc::new(Mutex::new(ServerState {
        cards: all_cards,
        sources: card_sources,
        log_path,
        daily,
    }));

    let app = Router::new()
        .route("/decks", get(deck_index))
        .route("/cards", get(list_cards).post(create_card))
        .route("/cards/due", get(due_cards))
        .route("/cards/{id}/review", post(review_card))
        .route("/cards/{id}/reviews", get(card_reviews))
        .route("/cards/{id}/delete", post(delete_card))
        .route("/stats", get(get_stats))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    println!("Serving at http://localhost:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
