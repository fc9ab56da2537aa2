use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};

use super::{check_len, nullable};
use crate::{
    AppState,
    auth::CurrentUser,
    entities::actor,
    error::{AppError, AppResult},
    models::check_poster_url,
    permissions::{WritePolicy, check_write},
    query::{
        apply_ordering, day_range, format_display, format_rfc3339, icontains, param,
        parse_ordering, search_condition, text_contains,
    },
    store::now_sec,
};

const ORDERING: &[(&str, actor::Column)] = &[
    ("id", actor::Column::Id),
    ("staff_id", actor::Column::StaffId),
    ("name", actor::Column::Name),
    ("poster_url", actor::Column::PosterUrl),
    ("profession", actor::Column::Profession),
    ("updated_at", actor::Column::UpdatedAt),
];

#[derive(Debug, Deserialize)]
pub struct ActorFilters {
    staff_id: Option<String>,
    name: Option<String>,
    poster_url: Option<String>,
    profession: Option<String>,
    updated_at_gte: Option<String>,
    updated_at_lte: Option<String>,
    search: Option<String>,
    ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActorInput {
    #[serde(default, deserialize_with = "nullable")]
    staff_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    poster_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    profession: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct ActorBody {
    id: i32,
    staff_id: Option<i32>,
    name: Option<String>,
    poster_url: Option<String>,
    profession: Option<String>,
    owner: Option<i32>,
    updated_at: String,
    updated_at_formatted: String,
}

impl From<actor::Model> for ActorBody {
    fn from(actor: actor::Model) -> Self {
        Self {
            id: actor.id,
            staff_id: actor.staff_id,
            name: actor.name,
            poster_url: actor.poster_url,
            profession: actor.profession,
            owner: actor.owner_id,
            updated_at: format_rfc3339(actor.updated_at),
            updated_at_formatted: format_display(actor.updated_at),
        }
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<ActorFilters>,
) -> AppResult<Json<Vec<ActorBody>>> {
    let mut select = actor::Entity::find();

    if let Some(term) = param(&filters.staff_id) {
        select = select.filter(text_contains(actor::Column::StaffId, term));
    }
    for (column, raw) in [
        (actor::Column::Name, &filters.name),
        (actor::Column::PosterUrl, &filters.poster_url),
        (actor::Column::Profession, &filters.profession),
    ] {
        if let Some(term) = param(raw) {
            select = select.filter(icontains(column, term));
        }
    }
    select = select.filter(day_range(
        actor::Column::UpdatedAt,
        &filters.updated_at_gte,
        &filters.updated_at_lte,
    )?);
    if let Some(cond) = search_condition(filters.search.as_deref(), |term| {
        vec![
            text_contains(actor::Column::Id, term),
            text_contains(actor::Column::StaffId, term),
            icontains(actor::Column::Name, term),
            icontains(actor::Column::PosterUrl, term),
            icontains(actor::Column::Profession, term),
        ]
    }) {
        select = select.filter(cond);
    }

    let ordering = parse_ordering(filters.ordering.as_deref(), ORDERING)?;
    let actors = apply_ordering(select, ordering, actor::Column::Id).all(&state.db).await?;
    Ok(Json(actors.into_iter().map(ActorBody::from).collect()))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<ActorBody>> {
    Ok(Json(find_actor(&state.db, id).await?.into()))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<ActorInput>,
) -> AppResult<(StatusCode, Json<ActorBody>)> {
    let mut model = actor::ActiveModel { owner_id: Set(Some(user.id)), ..Default::default() };
    apply(&state.db, &mut model, input, None).await?;
    let actor = model.insert(&state.db).await?;

    tracing::info!(actor_id = actor.id, user = %user.username, "actor created");
    Ok((StatusCode::CREATED, Json(actor.into())))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<ActorInput>,
) -> AppResult<Json<ActorBody>> {
    let actor = find_actor(&state.db, id).await?;
    check_write(WritePolicy::OwnerOrStaff, &user, actor.owner_id)?;

    let mut model: actor::ActiveModel = actor.into();
    apply(&state.db, &mut model, input, Some(id)).await?;
    Ok(Json(model.update(&state.db).await?.into()))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    let actor = find_actor(&state.db, id).await?;
    check_write(WritePolicy::OwnerOrStaff, &user, actor.owner_id)?;

    let staff_id = actor.staff_id;
    actor.delete(&state.db).await?;

    tracing::info!(actor_id = id, staff_id = ?staff_id, user = %user.username, "actor deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_actor(db: &DatabaseConnection, id: i32) -> AppResult<actor::Model> {
    actor::Entity::find_by_id(id).one(db).await?.ok_or(AppError::NotFound("actor"))
}

/// Validates `input` and copies the fields it carries onto `model`.
async fn apply(
    db: &DatabaseConnection,
    model: &mut actor::ActiveModel,
    input: ActorInput,
    actor_id: Option<i32>,
) -> AppResult<()> {
    if let Some(staff_id) = input.staff_id {
        if let Some(staff_id) = staff_id {
            let mut taken = actor::Entity::find().filter(actor::Column::StaffId.eq(staff_id));
            if let Some(id) = actor_id {
                taken = taken.filter(actor::Column::Id.ne(id));
            }
            if taken.count(db).await? > 0 {
                return Err(AppError::invalid(format!(
                    "actor with staff_id {staff_id} already exists"
                )));
            }
        }
        model.staff_id = Set(staff_id);
    }
    if let Some(name) = input.name {
        if let Some(name) = &name {
            check_len("name", name, 255)?;
        }
        model.name = Set(name);
    }
    if let Some(poster_url) = input.poster_url {
        let poster_url = match poster_url.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(check_poster_url(raw).map_err(AppError::Invalid)?),
            None => None,
        };
        model.poster_url = Set(poster_url);
    }
    if let Some(profession) = input.profession {
        if let Some(profession) = &profession {
            check_len("profession", profession, 255)?;
        }
        model.profession = Set(profession);
    }
    model.updated_at = Set(now_sec());
    Ok(())
}
