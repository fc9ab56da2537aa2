mod actors;
mod authors;
mod books;
mod download;
mod films;
mod genres;
mod library;

use std::sync::Arc;

use axum::{Router, routing::get};
use serde::{Deserialize, Deserializer};

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/films", get(films::list).post(films::create))
        .route(
            "/api/v1/films/{id}",
            get(films::retrieve).put(films::update).patch(films::update).delete(films::destroy),
        )
        .route("/api/v1/actors", get(actors::list).post(actors::create))
        .route(
            "/api/v1/actors/{id}",
            get(actors::retrieve).put(actors::update).patch(actors::update).delete(actors::destroy),
        )
        .route(
            "/api/v1/films-and-actors/download",
            get(download::trigger_get).post(download::trigger_post),
        )
        .route("/api/v1/authors", get(authors::list).post(authors::create))
        .route(
            "/api/v1/authors/{id}",
            get(authors::retrieve)
                .put(authors::update)
                .patch(authors::update)
                .delete(authors::destroy),
        )
        .route("/api/v1/genres", get(genres::list).post(genres::create))
        .route(
            "/api/v1/genres/{id}",
            get(genres::retrieve).put(genres::update).patch(genres::update).delete(genres::destroy),
        )
        .route("/api/v1/books", get(books::list).post(books::create))
        .route(
            "/api/v1/books/{id}",
            get(books::retrieve).put(books::update).patch(books::update).delete(books::destroy),
        )
        .route("/api/v1/all-data", get(library::all_data))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Tells an absent field (`None`) apart from an explicit `null` (`Some(None)`).
/// Use together with `#[serde(default)]`.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Rejects strings longer than `max` characters.
fn check_len(field: &str, value: &str, max: usize) -> crate::error::AppResult<()> {
    if value.chars().count() > max {
        return Err(crate::error::AppError::invalid(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}
