use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use super::{check_len, nullable};
use crate::{
    AppState,
    auth::CurrentUser,
    entities::author,
    error::{AppError, AppResult},
    permissions::{WritePolicy, check_write},
    query::{
        apply_ordering, icontains, param, parse_calendar_date, parse_number, parse_ordering,
        search_condition, year_of,
    },
};

const ORDERING: &[(&str, author::Column)] = &[
    ("first_name", author::Column::FirstName),
    ("last_name", author::Column::LastName),
    ("date_of_birth", author::Column::DateOfBirth),
    ("date_of_death", author::Column::DateOfDeath),
];

#[derive(Debug, Deserialize)]
pub struct AuthorFilters {
    first_name: Option<String>,
    last_name: Option<String>,
    birth_year_gte: Option<String>,
    birth_year_lte: Option<String>,
    death_year_gte: Option<String>,
    death_year_lte: Option<String>,
    search: Option<String>,
    ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorInput {
    first_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    last_name: Option<Option<String>>,
    date_of_birth: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    date_of_death: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct AuthorBody {
    id: i32,
    first_name: String,
    last_name: Option<String>,
    date_of_birth: String,
    date_of_death: Option<String>,
    owner: Option<i32>,
}

impl From<author::Model> for AuthorBody {
    fn from(author: author::Model) -> Self {
        Self {
            id: author.id,
            first_name: author.first_name,
            last_name: author.last_name,
            date_of_birth: author.date_of_birth,
            date_of_death: author.date_of_death,
            owner: author.owner_id,
        }
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<AuthorFilters>,
) -> AppResult<Json<Vec<AuthorBody>>> {
    let mut select = author::Entity::find();

    if let Some(term) = param(&filters.first_name) {
        select = select.filter(icontains(author::Column::FirstName, term));
    }
    if let Some(term) = param(&filters.last_name) {
        select = select.filter(icontains(author::Column::LastName, term));
    }

    if let Some(year) = parse_number::<i32>("birth_year_gte", &filters.birth_year_gte)? {
        select = select.filter(year_of(author::Column::DateOfBirth).gte(year));
    }
    if let Some(year) = parse_number::<i32>("birth_year_lte", &filters.birth_year_lte)? {
        select = select.filter(year_of(author::Column::DateOfBirth).lte(year));
    }
    if let Some(year) = parse_number::<i32>("death_year_gte", &filters.death_year_gte)? {
        select = select.filter(year_of(author::Column::DateOfDeath).gte(year));
    }
    if let Some(year) = parse_number::<i32>("death_year_lte", &filters.death_year_lte)? {
        select = select.filter(year_of(author::Column::DateOfDeath).lte(year));
    }

    if let Some(cond) = search_condition(filters.search.as_deref(), |term| {
        vec![
            icontains(author::Column::FirstName, term),
            icontains(author::Column::LastName, term),
            icontains(author::Column::DateOfBirth, term),
            icontains(author::Column::DateOfDeath, term),
        ]
    }) {
        select = select.filter(cond);
    }

    let ordering = parse_ordering(filters.ordering.as_deref(), ORDERING)?;
    let authors = apply_ordering(select, ordering, author::Column::Id).all(&state.db).await?;
    Ok(Json(authors.into_iter().map(AuthorBody::from).collect()))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<AuthorBody>> {
    Ok(Json(find_author(&state.db, id).await?.into()))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<AuthorInput>,
) -> AppResult<(StatusCode, Json<AuthorBody>)> {
    if input.first_name.is_none() {
        return Err(AppError::invalid("first_name is required"));
    }
    if input.date_of_birth.is_none() {
        return Err(AppError::invalid("date_of_birth is required"));
    }

    let mut model = author::ActiveModel { owner_id: Set(Some(user.id)), ..Default::default() };
    apply(&mut model, input)?;
    let author = model.insert(&state.db).await?;

    tracing::info!(author_id = author.id, user = %user.username, "author created");
    Ok((StatusCode::CREATED, Json(author.into())))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<AuthorInput>,
) -> AppResult<Json<AuthorBody>> {
    let author = find_author(&state.db, id).await?;
    check_write(WritePolicy::OwnerOnly, &user, author.owner_id)?;

    let mut model: author::ActiveModel = author.into();
    apply(&mut model, input)?;
    Ok(Json(model.update(&state.db).await?.into()))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    let author = find_author(&state.db, id).await?;
    check_write(WritePolicy::OwnerOnly, &user, author.owner_id)?;
    author.delete(&state.db).await?;

    tracing::info!(author_id = id, user = %user.username, "author deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_author(db: &DatabaseConnection, id: i32) -> AppResult<author::Model> {
    author::Entity::find_by_id(id).one(db).await?.ok_or(AppError::NotFound("author"))
}

fn apply(model: &mut author::ActiveModel, input: AuthorInput) -> AppResult<()> {
    if let Some(first_name) = input.first_name {
        let first_name = first_name.trim();
        if first_name.is_empty() {
            return Err(AppError::invalid("first_name may not be blank"));
        }
        check_len("first_name", first_name, 100)?;
        model.first_name = Set(first_name.to_string());
    }
    if let Some(last_name) = input.last_name {
        if let Some(last_name) = &last_name {
            check_len("last_name", last_name, 100)?;
        }
        model.last_name = Set(last_name);
    }
    if let Some(raw) = input.date_of_birth {
        model.date_of_birth = Set(parse_calendar_date("date_of_birth", &raw)?);
    }
    if let Some(raw) = input.date_of_death {
        let date_of_death = raw.map(|raw| parse_calendar_date("date_of_death", &raw)).transpose()?;
        model.date_of_death = Set(date_of_death);
    }
    Ok(())
}
