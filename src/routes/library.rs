use std::sync::Arc;

use axum::{Json, extract::State};
use sea_orm::{EntityTrait, QueryOrder};
use serde::Serialize;

use super::{authors::AuthorBody, books, genres::GenreBody};
use crate::{
    AppState,
    entities::{author, book, genre},
    error::AppResult,
};

#[derive(Debug, Serialize)]
pub struct AllData {
    authors: Vec<AuthorBody>,
    genres: Vec<GenreBody>,
    books: Vec<books::BookBody>,
}

/// Every author, genre and book in one response.
pub async fn all_data(State(state): State<Arc<AppState>>) -> AppResult<Json<AllData>> {
    let authors = author::Entity::find().order_by_asc(author::Column::Id).all(&state.db).await?;
    let genres = genre::Entity::find().order_by_asc(genre::Column::Id).all(&state.db).await?;
    let all_books = book::Entity::find().order_by_asc(book::Column::Id).all(&state.db).await?;

    Ok(Json(AllData {
        authors: authors.into_iter().map(AuthorBody::from).collect(),
        genres: genres.into_iter().map(GenreBody::from).collect(),
        books: books::load_bodies(&state.db, all_books).await?,
    }))
}
