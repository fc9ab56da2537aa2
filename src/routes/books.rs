use std::{collections::BTreeSet, sync::Arc};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    LoaderTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
    sea_query::{Expr, Query as SubQuery, SimpleExpr},
};
use serde::{Deserialize, Serialize};

use super::{check_len, nullable};
use crate::{
    AppState,
    auth::CurrentUser,
    entities::{author, book, book_genre, genre},
    error::{AppError, AppResult},
    permissions::{WritePolicy, check_write},
    query::{apply_ordering, icontains, param, parse_ordering, search_condition},
};

const ORDERING: &[(&str, book::Column)] = &[
    ("title", book::Column::Title),
    ("author", book::Column::AuthorId),
    ("short_description", book::Column::ShortDescription),
    ("isbn", book::Column::Isbn),
];

#[derive(Debug, Deserialize)]
pub struct BookFilters {
    title: Option<String>,
    author: Option<String>,
    short_description: Option<String>,
    genre: Option<String>,
    isbn: Option<String>,
    search: Option<String>,
    ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookInput {
    title: Option<String>,
    author: Option<i32>,
    short_description: Option<String>,
    /// Genre ids; replaces the whole set when present.
    genre: Option<Vec<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    isbn: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct BookBody {
    id: i32,
    title: String,
    author: Option<i32>,
    short_description: String,
    genre: Vec<i32>,
    isbn: Option<String>,
    owner: Option<i32>,
}

impl BookBody {
    fn new(book: book::Model, genres: Vec<genre::Model>) -> Self {
        let mut genre: Vec<i32> = genres.into_iter().map(|g| g.id).collect();
        genre.sort_unstable();
        Self {
            id: book.id,
            title: book.title,
            author: book.author_id,
            short_description: book.short_description,
            genre,
            isbn: book.isbn,
            owner: book.owner_id,
        }
    }
}

/// Books whose author's first or last name contains `term`.
fn author_matches(term: &str) -> SimpleExpr {
    book::Column::AuthorId.in_subquery(
        SubQuery::select()
            .column((author::Entity, author::Column::Id))
            .from(author::Entity)
            .cond_where(
                Condition::any()
                    .add(icontains(author::Column::FirstName, term))
                    .add(icontains(author::Column::LastName, term)),
            )
            .to_owned(),
    )
}

/// Books with at least one genre whose name contains `term`.
fn genre_matches(term: &str) -> SimpleExpr {
    book::Column::Id.in_subquery(
        SubQuery::select()
            .column((book_genre::Entity, book_genre::Column::BookId))
            .from(book_genre::Entity)
            .inner_join(
                genre::Entity,
                Expr::col((genre::Entity, genre::Column::Id))
                    .equals((book_genre::Entity, book_genre::Column::GenreId)),
            )
            .and_where(icontains(genre::Column::Name, term))
            .to_owned(),
    )
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<BookFilters>,
) -> AppResult<Json<Vec<BookBody>>> {
    let mut select = book::Entity::find();

    for (column, raw) in [
        (book::Column::Title, &filters.title),
        (book::Column::ShortDescription, &filters.short_description),
        (book::Column::Isbn, &filters.isbn),
    ] {
        if let Some(term) = param(raw) {
            select = select.filter(icontains(column, term));
        }
    }
    if let Some(term) = param(&filters.author) {
        select = select.filter(author_matches(term));
    }
    if let Some(term) = param(&filters.genre) {
        select = select.filter(genre_matches(term));
    }
    if let Some(cond) = search_condition(filters.search.as_deref(), |term| {
        vec![
            icontains(book::Column::Title, term),
            author_matches(term),
            icontains(book::Column::ShortDescription, term),
            genre_matches(term),
            icontains(book::Column::Isbn, term),
        ]
    }) {
        select = select.filter(cond);
    }

    let ordering = parse_ordering(filters.ordering.as_deref(), ORDERING)?;
    let books = apply_ordering(select, ordering, book::Column::Id).all(&state.db).await?;
    Ok(Json(load_bodies(&state.db, books).await?))
}

pub(super) async fn load_bodies(
    db: &DatabaseConnection,
    books: Vec<book::Model>,
) -> AppResult<Vec<BookBody>> {
    let genres = books.load_many_to_many(genre::Entity, book_genre::Entity, db).await?;
    Ok(books.into_iter().zip(genres).map(|(book, genres)| BookBody::new(book, genres)).collect())
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<BookBody>> {
    let book = find_book(&state.db, id).await?;
    Ok(Json(book_body(&state.db, book).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<BookInput>,
) -> AppResult<(StatusCode, Json<BookBody>)> {
    for (field, present) in [
        ("title", input.title.is_some()),
        ("author", input.author.is_some()),
        ("short_description", input.short_description.is_some()),
    ] {
        if !present {
            return Err(AppError::invalid(format!("{field} is required")));
        }
    }

    let txn = state.db.begin().await?;
    let genre_ids = validate(&txn, &input).await?;

    let mut model = book::ActiveModel { owner_id: Set(Some(user.id)), ..Default::default() };
    apply(&mut model, input)?;
    let book = model.insert(&txn).await?;
    link_book_genres(&txn, book.id, &genre_ids.unwrap_or_default()).await?;
    txn.commit().await?;

    tracing::info!(book_id = book.id, user = %user.username, "book created");
    Ok((StatusCode::CREATED, Json(book_body(&state.db, book).await?)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<BookInput>,
) -> AppResult<Json<BookBody>> {
    let book = find_book(&state.db, id).await?;
    check_write(WritePolicy::OwnerOnly, &user, book.owner_id)?;

    let txn = state.db.begin().await?;
    let genre_ids = validate(&txn, &input).await?;

    let mut model: book::ActiveModel = book.into();
    apply(&mut model, input)?;
    let book = model.update(&txn).await?;
    if let Some(genre_ids) = genre_ids {
        link_book_genres(&txn, book.id, &genre_ids).await?;
    }
    txn.commit().await?;

    Ok(Json(book_body(&state.db, book).await?))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    let book = find_book(&state.db, id).await?;
    check_write(WritePolicy::OwnerOnly, &user, book.owner_id)?;
    book.delete(&state.db).await?;

    tracing::info!(book_id = id, user = %user.username, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_book(db: &DatabaseConnection, id: i32) -> AppResult<book::Model> {
    book::Entity::find_by_id(id).one(db).await?.ok_or(AppError::NotFound("book"))
}

async fn book_body(db: &DatabaseConnection, book: book::Model) -> AppResult<BookBody> {
    let genres = book.find_related(genre::Entity).order_by_asc(genre::Column::Id).all(db).await?;
    Ok(BookBody::new(book, genres))
}

/// Checks the referenced author and genres exist; returns the genre set to link, if any.
async fn validate<C: ConnectionTrait>(conn: &C, input: &BookInput) -> AppResult<Option<BTreeSet<i32>>> {
    if let Some(author_id) = input.author {
        if author::Entity::find_by_id(author_id).count(conn).await? == 0 {
            return Err(AppError::invalid(format!("author {author_id} does not exist")));
        }
    }

    let Some(ids) = &input.genre else {
        return Ok(None);
    };
    let wanted: BTreeSet<i32> = ids.iter().copied().collect();
    let found: BTreeSet<i32> = genre::Entity::find()
        .select_only()
        .column(genre::Column::Id)
        .filter(genre::Column::Id.is_in(wanted.iter().copied()))
        .into_tuple::<i32>()
        .all(conn)
        .await?
        .into_iter()
        .collect();

    if let Some(missing) = wanted.difference(&found).next() {
        return Err(AppError::invalid(format!("genre {missing} does not exist")));
    }
    Ok(Some(wanted))
}

fn apply(model: &mut book::ActiveModel, input: BookInput) -> AppResult<()> {
    if let Some(title) = input.title {
        check_len("title", &title, 200)?;
        model.title = Set(title);
    }
    if let Some(author_id) = input.author {
        model.author_id = Set(Some(author_id));
    }
    if let Some(short_description) = input.short_description {
        check_len("short_description", &short_description, 1000)?;
        model.short_description = Set(short_description);
    }
    if let Some(isbn) = input.isbn {
        if let Some(isbn) = &isbn {
            check_len("isbn", isbn, 20)?;
        }
        model.isbn = Set(isbn);
    }
    Ok(())
}

async fn link_book_genres<C: ConnectionTrait>(
    conn: &C,
    book_id: i32,
    genre_ids: &BTreeSet<i32>,
) -> AppResult<()> {
    book_genre::Entity::delete_many()
        .filter(book_genre::Column::BookId.eq(book_id))
        .exec(conn)
        .await?;

    if !genre_ids.is_empty() {
        let links = genre_ids.iter().map(|&genre_id| book_genre::ActiveModel {
            book_id: Set(book_id),
            genre_id: Set(genre_id),
        });
        book_genre::Entity::insert_many(links).exec(conn).await?;
    }
    Ok(())
}
