use std::{collections::BTreeSet, sync::Arc};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, LoaderTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, Query as SubQuery},
};
use serde::{Deserialize, Serialize};

use super::{check_len, nullable};
use crate::{
    AppState,
    auth::CurrentUser,
    entities::{actor, film, film_actor},
    error::{AppError, AppResult},
    permissions::{WritePolicy, check_write},
    query::{
        apply_ordering, day_range, format_display, format_rfc3339, icontains, param, parse_number,
        parse_ordering, search_condition, text_contains,
    },
    store::{link_film_actors, now_sec},
};

const ORDERING: &[(&str, film::Column)] = &[
    ("kinopoisk_id", film::Column::KinopoiskId),
    ("name", film::Column::Name),
    ("year", film::Column::Year),
    ("updated_at", film::Column::UpdatedAt),
];

#[derive(Debug, Default, Deserialize)]
pub struct FilmFilters {
    kinopoisk_id: Option<String>,
    name: Option<String>,
    actors: Option<String>,
    year_gte: Option<String>,
    year_lte: Option<String>,
    updated_at_gte: Option<String>,
    updated_at_lte: Option<String>,
    search: Option<String>,
    ordering: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilmInput {
    #[serde(default, deserialize_with = "nullable")]
    kinopoisk_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    year: Option<Option<i32>>,
    /// Actor ids; replaces the whole set when present.
    actors: Option<Vec<i32>>,
}

#[derive(Debug, Serialize)]
pub struct ActorRef {
    id: i32,
    name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FilmBody {
    id: i32,
    kinopoisk_id: Option<i32>,
    name: Option<String>,
    year: Option<i32>,
    actors: Vec<ActorRef>,
    owner: Option<i32>,
    updated_at: String,
    updated_at_formatted: String,
}

impl FilmBody {
    fn new(film: film::Model, mut actors: Vec<actor::Model>) -> Self {
        actors.sort_by_key(|a| a.id);
        Self {
            id: film.id,
            kinopoisk_id: film.kinopoisk_id,
            name: film.name,
            year: film.year,
            actors: actors.into_iter().map(|a| ActorRef { id: a.id, name: a.name }).collect(),
            owner: film.owner_id,
            updated_at: format_rfc3339(film.updated_at),
            updated_at_formatted: format_display(film.updated_at),
        }
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<FilmFilters>,
) -> AppResult<Json<Vec<FilmBody>>> {
    let mut select = film::Entity::find();

    if let Some(term) = param(&filters.kinopoisk_id) {
        select = select.filter(text_contains(film::Column::KinopoiskId, term));
    }
    if let Some(term) = param(&filters.name) {
        select = select.filter(icontains(film::Column::Name, term));
    }
    if let Some(term) = param(&filters.actors) {
        select = select.filter(film::Column::Id.in_subquery(
            SubQuery::select()
                .column((film_actor::Entity, film_actor::Column::FilmId))
                .from(film_actor::Entity)
                .inner_join(
                    actor::Entity,
                    Expr::col((actor::Entity, actor::Column::Id))
                        .equals((film_actor::Entity, film_actor::Column::ActorId)),
                )
                .and_where(icontains(actor::Column::Name, term))
                .to_owned(),
        ));
    }
    if let Some(year) = parse_number::<i32>("year_gte", &filters.year_gte)? {
        select = select.filter(film::Column::Year.gte(year));
    }
    if let Some(year) = parse_number::<i32>("year_lte", &filters.year_lte)? {
        select = select.filter(film::Column::Year.lte(year));
    }
    select = select.filter(day_range(
        film::Column::UpdatedAt,
        &filters.updated_at_gte,
        &filters.updated_at_lte,
    )?);
    if let Some(cond) = search_condition(filters.search.as_deref(), |term| {
        vec![
            text_contains(film::Column::KinopoiskId, term),
            icontains(film::Column::Name, term),
            text_contains(film::Column::Year, term),
        ]
    }) {
        select = select.filter(cond);
    }

    let ordering = parse_ordering(filters.ordering.as_deref(), ORDERING)?;
    let films = apply_ordering(select, ordering, film::Column::Id).all(&state.db).await?;
    let actors = films.load_many_to_many(actor::Entity, film_actor::Entity, &state.db).await?;

    let body = films.into_iter().zip(actors).map(|(film, actors)| FilmBody::new(film, actors));
    Ok(Json(body.collect()))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<FilmBody>> {
    let film = find_film(&state.db, id).await?;
    Ok(Json(film_body(&state.db, film).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<FilmInput>,
) -> AppResult<(StatusCode, Json<FilmBody>)> {
    let txn = state.db.begin().await?;
    let actor_ids = validate(&txn, &input, None).await?;

    let mut model = film::ActiveModel { owner_id: Set(Some(user.id)), ..Default::default() };
    apply(&mut model, input);
    let film = model.insert(&txn).await?;

    if let Some(actor_ids) = actor_ids {
        link_film_actors(&txn, film.id, &actor_ids).await?;
    }
    txn.commit().await?;

    tracing::info!(film_id = film.id, user = %user.username, "film created");
    Ok((StatusCode::CREATED, Json(film_body(&state.db, film).await?)))
}

/// Serves both PUT and PATCH: fields missing from the body are left as they are.
pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<FilmInput>,
) -> AppResult<Json<FilmBody>> {
    let film = find_film(&state.db, id).await?;
    check_write(WritePolicy::OwnerOrStaff, &user, film.owner_id)?;

    let txn = state.db.begin().await?;
    let actor_ids = validate(&txn, &input, Some(film.id)).await?;

    let mut model: film::ActiveModel = film.into();
    apply(&mut model, input);
    let film = model.update(&txn).await?;

    if let Some(actor_ids) = actor_ids {
        link_film_actors(&txn, film.id, &actor_ids).await?;
    }
    txn.commit().await?;

    Ok(Json(film_body(&state.db, film).await?))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    let film = find_film(&state.db, id).await?;
    check_write(WritePolicy::OwnerOrStaff, &user, film.owner_id)?;

    let kinopoisk_id = film.kinopoisk_id;
    film.delete(&state.db).await?;

    tracing::info!(film_id = id, kinopoisk_id = ?kinopoisk_id, user = %user.username, "film deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_film(db: &DatabaseConnection, id: i32) -> AppResult<film::Model> {
    film::Entity::find_by_id(id).one(db).await?.ok_or(AppError::NotFound("film"))
}

async fn film_body(db: &DatabaseConnection, film: film::Model) -> AppResult<FilmBody> {
    let actors = film.find_related(actor::Entity).order_by_asc(actor::Column::Id).all(db).await?;
    Ok(FilmBody::new(film, actors))
}

/// Checks the input against the database and returns the actor set to link, if any.
async fn validate<C: ConnectionTrait>(
    conn: &C,
    input: &FilmInput,
    film_id: Option<i32>,
) -> AppResult<Option<BTreeSet<i32>>> {
    if let Some(Some(name)) = &input.name {
        check_len("name", name, 255)?;
    }

    if let Some(Some(kinopoisk_id)) = input.kinopoisk_id {
        let mut taken = film::Entity::find().filter(film::Column::KinopoiskId.eq(kinopoisk_id));
        if let Some(id) = film_id {
            taken = taken.filter(film::Column::Id.ne(id));
        }
        if taken.count(conn).await? > 0 {
            return Err(AppError::invalid(format!(
                "film with kinopoisk_id {kinopoisk_id} already exists"
            )));
        }
    }

    let Some(ids) = &input.actors else {
        return Ok(None);
    };
    let wanted: BTreeSet<i32> = ids.iter().copied().collect();
    let found: BTreeSet<i32> = actor::Entity::find()
        .select_only()
        .column(actor::Column::Id)
        .filter(actor::Column::Id.is_in(wanted.iter().copied()))
        .into_tuple::<i32>()
        .all(conn)
        .await?
        .into_iter()
        .collect();

    if let Some(missing) = wanted.difference(&found).next() {
        return Err(AppError::invalid(format!("actor {missing} does not exist")));
    }
    Ok(Some(wanted))
}

fn apply(model: &mut film::ActiveModel, input: FilmInput) {
    if let Some(kinopoisk_id) = input.kinopoisk_id {
        model.kinopoisk_id = Set(kinopoisk_id);
    }
    if let Some(name) = input.name {
        model.name = Set(name);
    }
    if let Some(year) = input.year {
        model.year = Set(year);
    }
    model.updated_at = Set(now_sec());
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;
    use crate::{auth::tests::create_user, routes::tests::TestApp};

    async fn post_film(app: &TestApp, token: &str, body: Value) -> Value {
        let (status, body) = app.request(Method::POST, "/api/v1/films", Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn post_actor(app: &TestApp, token: &str, name: &str) -> i64 {
        let (status, body) = app
            .request(Method::POST, "/api/v1/actors", Some(token), Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().unwrap()
    }

    fn names(body: &Value) -> Vec<&str> {
        body.as_array().unwrap().iter().map(|f| f["name"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn create_sets_owner_and_actors() {
        let app = TestApp::new().await;
        let user = create_user(&app.db, "alice", false, false).await;
        let nolan = post_actor(&app, "alice-token", "Кристофер Нолан").await;

        let body = post_film(
            &app,
            "alice-token",
            json!({ "kinopoisk_id": 258687, "name": "Интерстеллар", "year": 2014, "actors": [nolan] }),
        )
        .await;

        assert_eq!(body["owner"], json!(user.id));
        assert_eq!(body["actors"], json!([{ "id": nolan, "name": "Кристофер Нолан" }]));
        assert!(body["updated_at_formatted"].as_str().unwrap().contains(" | "));
    }

    #[tokio::test]
    async fn anonymous_callers_can_read_but_not_write() {
        let app = TestApp::new().await;
        let (status, _) = app
            .request(Method::POST, "/api/v1/films", None, Some(json!({ "name": "x" })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app.get("/api/v1/films").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, body) = app.get("/api/v1/films/42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "film not found" }));
    }

    #[tokio::test]
    async fn duplicate_kinopoisk_id_is_rejected() {
        let app = TestApp::new().await;
        create_user(&app.db, "alice", false, false).await;
        post_film(&app, "alice-token", json!({ "kinopoisk_id": 1, "name": "A" })).await;

        let (status, _) = app
            .request(
                Method::POST,
                "/api/v1/films",
                Some("alice-token"),
                Some(json!({ "kinopoisk_id": 1, "name": "B" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_actor_ids_are_rejected() {
        let app = TestApp::new().await;
        create_user(&app.db, "alice", false, false).await;
        let (status, body) = app
            .request(
                Method::POST,
                "/api/v1/films",
                Some("alice-token"),
                Some(json!({ "name": "A", "actors": [99] })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "actor 99 does not exist");
    }

    #[tokio::test]
    async fn only_owner_or_staff_may_change_a_film() {
        let app = TestApp::new().await;
        create_user(&app.db, "alice", false, false).await;
        create_user(&app.db, "bob", false, false).await;
        create_user(&app.db, "staff", false, true).await;
        let film = post_film(&app, "alice-token", json!({ "name": "A", "year": 2000 })).await;
        let uri = format!("/api/v1/films/{}", film["id"]);

        let (status, _) =
            app.request(Method::PATCH, &uri, Some("bob-token"), Some(json!({ "year": 2001 }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            app.request(Method::PATCH, &uri, Some("staff-token"), Some(json!({ "year": 2001 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["year"], 2001);
        assert_eq!(body["name"], "A");

        let (status, body) =
            app.request(Method::PUT, &uri, Some("alice-token"), Some(json!({ "year": null }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["year"], Value::Null);

        let (status, _) = app.request(Method::DELETE, &uri, Some("bob-token"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.request(Method::DELETE, &uri, Some("alice-token"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.get(&uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_filters_search_and_ordering() {
        let app = TestApp::new().await;
        create_user(&app.db, "alice", false, false).await;
        let keanu = post_actor(&app, "alice-token", "Keanu Reeves").await;
        post_film(
            &app,
            "alice-token",
            json!({ "kinopoisk_id": 301, "name": "The Matrix", "year": 1999, "actors": [keanu] }),
        )
        .await;
        post_film(&app, "alice-token", json!({ "kinopoisk_id": 258687, "name": "Interstellar", "year": 2014 }))
            .await;
        post_film(&app, "alice-token", json!({ "kinopoisk_id": 409424, "name": "Gravity", "year": 2013 }))
            .await;

        let (_, body) = app.get("/api/v1/films?year_gte=2013&ordering=-year").await;
        assert_eq!(names(&body), vec!["Interstellar", "Gravity"]);

        let (_, body) = app.get("/api/v1/films?actors=keanu").await;
        assert_eq!(names(&body), vec!["The Matrix"]);

        let (_, body) = app.get("/api/v1/films?kinopoisk_id=86").await;
        assert_eq!(names(&body), vec!["Interstellar"]);

        let (_, body) = app.get("/api/v1/films?search=GRAV").await;
        assert_eq!(names(&body), vec!["Gravity"]);

        let (_, body) = app.get("/api/v1/films?search=1999").await;
        assert_eq!(names(&body), vec!["The Matrix"]);

        let (_, body) = app.get("/api/v1/films?ordering=name").await;
        assert_eq!(names(&body), vec!["Gravity", "Interstellar", "The Matrix"]);

        let (status, _) = app.get("/api/v1/films?ordering=owner").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app.get("/api/v1/films?year_gte=soon").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "year_gte must be a number");
    }

    #[tokio::test]
    async fn updated_at_filters_use_whole_days() {
        let app = TestApp::new().await;
        create_user(&app.db, "alice", false, false).await;
        post_film(&app, "alice-token", json!({ "name": "Fresh" })).await;

        let (_, body) = app.get("/api/v1/films?updated_at_lte=01.01.2000").await;
        assert_eq!(body, json!([]));

        let (_, body) = app.get("/api/v1/films?updated_at_gte=01.01.2000").await;
        assert_eq!(names(&body), vec!["Fresh"]);

        let (status, _) = app.get("/api/v1/films?updated_at_gte=2000-01-01").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
