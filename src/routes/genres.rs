use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use super::check_len;
use crate::{
    AppState,
    auth::CurrentUser,
    entities::genre,
    error::{AppError, AppResult},
    permissions::{WritePolicy, check_write},
    query::{apply_ordering, icontains, param, parse_ordering, search_condition},
};

const ORDERING: &[(&str, genre::Column)] = &[("name", genre::Column::Name)];

#[derive(Debug, Deserialize)]
pub struct GenreFilters {
    name: Option<String>,
    search: Option<String>,
    ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenreInput {
    name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenreBody {
    id: i32,
    name: String,
    owner: Option<i32>,
}

impl From<genre::Model> for GenreBody {
    fn from(genre: genre::Model) -> Self {
        Self { id: genre.id, name: genre.name, owner: genre.owner_id }
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<GenreFilters>,
) -> AppResult<Json<Vec<GenreBody>>> {
    let mut select = genre::Entity::find();
    if let Some(term) = param(&filters.name) {
        select = select.filter(icontains(genre::Column::Name, term));
    }
    if let Some(cond) = search_condition(filters.search.as_deref(), |term| {
        vec![icontains(genre::Column::Name, term)]
    }) {
        select = select.filter(cond);
    }

    let ordering = parse_ordering(filters.ordering.as_deref(), ORDERING)?;
    let genres = apply_ordering(select, ordering, genre::Column::Id).all(&state.db).await?;
    Ok(Json(genres.into_iter().map(GenreBody::from).collect()))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<GenreBody>> {
    Ok(Json(find_genre(&state.db, id).await?.into()))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<GenreInput>,
) -> AppResult<(StatusCode, Json<GenreBody>)> {
    let Some(name) = input.name else {
        return Err(AppError::invalid("name is required"));
    };

    let genre = genre::ActiveModel {
        name: Set(check_name(&name)?),
        owner_id: Set(Some(user.id)),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    tracing::info!(genre_id = genre.id, user = %user.username, "genre created");
    Ok((StatusCode::CREATED, Json(genre.into())))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<GenreInput>,
) -> AppResult<Json<GenreBody>> {
    let genre = find_genre(&state.db, id).await?;
    check_write(WritePolicy::OwnerOnly, &user, genre.owner_id)?;

    let Some(name) = input.name else {
        return Ok(Json(genre.into()));
    };
    let mut model: genre::ActiveModel = genre.into();
    model.name = Set(check_name(&name)?);
    Ok(Json(model.update(&state.db).await?.into()))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    let genre = find_genre(&state.db, id).await?;
    check_write(WritePolicy::OwnerOnly, &user, genre.owner_id)?;
    genre.delete(&state.db).await?;

    tracing::info!(genre_id = id, user = %user.username, "genre deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_genre(db: &DatabaseConnection, id: i32) -> AppResult<genre::Model> {
    genre::Entity::find_by_id(id).one(db).await?.ok_or(AppError::NotFound("genre"))
}

fn check_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::invalid("name may not be blank"));
    }
    check_len("name", name, 200)?;
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{auth::tests::create_user, routes::tests::TestApp};

    #[tokio::test]
    async fn genre_lifecycle() {
        let app = TestApp::new().await;
        create_user(&app.db, "reader", false, false).await;
        create_user(&app.db, "other", false, false).await;

        let (status, genre) = app
            .request(Method::POST, "/api/v1/genres", Some("reader-token"), Some(json!({ "name": " Роман " })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(genre["name"], "Роман");
        let uri = format!("/api/v1/genres/{}", genre["id"]);

        let (status, _) =
            app.request(Method::PUT, &uri, Some("other-token"), Some(json!({ "name": "Поэзия" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            app.request(Method::PUT, &uri, Some("reader-token"), Some(json!({ "name": "Поэзия" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Поэзия");

        let (status, _) = app.request(Method::DELETE, &uri, Some("reader-token"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.get(&uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn name_is_required_and_bounded() {
        let app = TestApp::new().await;
        create_user(&app.db, "reader", false, false).await;

        let (status, _) =
            app.request(Method::POST, "/api/v1/genres", Some("reader-token"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let long = "x".repeat(201);
        let (status, body) = app
            .request(Method::POST, "/api/v1/genres", Some("reader-token"), Some(json!({ "name": long })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "name must be at most 200 characters");
    }

    #[tokio::test]
    async fn list_searches_and_orders() {
        let app = TestApp::new().await;
        create_user(&app.db, "reader", false, false).await;
        for name in ["Drama", "Poetry", "Detective"] {
            app.request(Method::POST, "/api/v1/genres", Some("reader-token"), Some(json!({ "name": name })))
                .await;
        }

        let (_, body) = app.get("/api/v1/genres?search=d&ordering=-name").await;
        let names: Vec<&str> = body.as_array().unwrap().iter().map(|g| g["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Drama", "Detective"]);
    }
}
