use std::collections::BTreeSet;

use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait, sea_query::OnConflict,
};

use crate::{
    entities::{actor, film, film_actor},
    error::AppResult,
    models::{ActorRecord, FilmRecord},
};

/// Upsert-by-catalog-id storage for films, actors and their associations.
#[derive(Clone)]
pub struct CatalogStore {
    db: DatabaseConnection,
}

impl CatalogStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Creates the film or overwrites name/year of the row holding the same
    /// `kinopoisk_id`. The owner is only set on creation.
    pub async fn upsert_film(
        &self,
        record: &FilmRecord,
        owner_id: Option<i32>,
    ) -> AppResult<film::Model> {
        let model = film::ActiveModel {
            kinopoisk_id: Set(Some(record.kinopoisk_id)),
            name: Set(Some(record.name.clone())),
            year: Set(record.year),
            updated_at: Set(now_sec()),
            owner_id: Set(owner_id),
            ..Default::default()
        };

        film::Entity::insert(model)
            .on_conflict(
                OnConflict::column(film::Column::KinopoiskId)
                    .update_columns([
                        film::Column::Name,
                        film::Column::Year,
                        film::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        let film = film::Entity::find()
            .filter(film::Column::KinopoiskId.eq(record.kinopoisk_id))
            .one(&self.db)
            .await?
            .ok_or(sea_orm::DbErr::RecordNotFound(format!(
                "film {} after upsert",
                record.kinopoisk_id
            )))?;

        tracing::debug!(kinopoisk_id = record.kinopoisk_id, film_id = film.id, "film upserted");
        Ok(film)
    }

    /// Clears the film's actor set and attaches the given actors, upserting
    /// each by `staff_id`. Runs in one transaction: on error the previous
    /// associations stay in place.
    pub async fn replace_film_actors(
        &self,
        film_id: i32,
        actors: &[ActorRecord],
        owner_id: Option<i32>,
    ) -> AppResult<usize> {
        let txn = self.db.begin().await?;

        let mut actor_ids = BTreeSet::new();
        for record in actors {
            let actor = upsert_actor(&txn, record, owner_id).await?;
            actor_ids.insert(actor.id);
        }

        link_film_actors(&txn, film_id, &actor_ids).await?;
        txn.commit().await?;

        tracing::debug!(film_id, actors = actor_ids.len(), "film actors replaced");
        Ok(actor_ids.len())
    }
}

/// Makes `actor_ids` the film's whole actor set.
pub async fn link_film_actors<C: ConnectionTrait>(
    conn: &C,
    film_id: i32,
    actor_ids: &BTreeSet<i32>,
) -> AppResult<()> {
    film_actor::Entity::delete_many()
        .filter(film_actor::Column::FilmId.eq(film_id))
        .exec(conn)
        .await?;

    if !actor_ids.is_empty() {
        let links = actor_ids.iter().map(|&actor_id| film_actor::ActiveModel {
            film_id: Set(film_id),
            actor_id: Set(actor_id),
        });
        film_actor::Entity::insert_many(links).exec(conn).await?;
    }
    Ok(())
}

async fn upsert_actor<C: ConnectionTrait>(
    conn: &C,
    record: &ActorRecord,
    owner_id: Option<i32>,
) -> AppResult<actor::Model> {
    let model = actor::ActiveModel {
        staff_id: Set(Some(record.staff_id)),
        name: Set(record.name.clone()),
        poster_url: Set(record.poster_url.clone()),
        profession: Set(record.profession.clone()),
        updated_at: Set(now_sec()),
        owner_id: Set(owner_id),
        ..Default::default()
    };

    actor::Entity::insert(model)
        .on_conflict(
            OnConflict::column(actor::Column::StaffId)
                .update_columns([
                    actor::Column::Name,
                    actor::Column::PosterUrl,
                    actor::Column::Profession,
                    actor::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(conn)
        .await?;

    let actor = actor::Entity::find()
        .filter(actor::Column::StaffId.eq(record.staff_id))
        .one(conn)
        .await?
        .ok_or(sea_orm::DbErr::RecordNotFound(format!(
            "actor {} after upsert",
            record.staff_id
        )))?;

    Ok(actor)
}

pub fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sea_orm::{ModelTrait, PaginatorTrait};

    use super::*;
    use crate::db::test_db;

    fn film_record(id: i32, name: &str) -> FilmRecord {
        FilmRecord { kinopoisk_id: id, name: name.to_string(), year: Some(2014) }
    }

    fn actor_record(id: i32, profession: &str) -> ActorRecord {
        ActorRecord {
            staff_id: id,
            name: Some(format!("Actor {id}")),
            poster_url: None,
            profession: Some(profession.to_string()),
        }
    }

    #[tokio::test]
    async fn upsert_film_updates_in_place() {
        let store = CatalogStore::new(test_db().await);

        let first = store.upsert_film(&film_record(123, "Old"), None).await.unwrap();
        let second = store.upsert_film(&film_record(123, "New"), None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("New"));
        assert_eq!(film::Entity::find().count(store.db()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn owner_is_kept_from_creation() {
        let db = test_db().await;
        let user = crate::auth::tests::create_user(&db, "owner", true, false).await;
        let store = CatalogStore::new(db);

        store.upsert_film(&film_record(1, "Film"), Some(user.id)).await.unwrap();
        let film = store.upsert_film(&film_record(1, "Film"), None).await.unwrap();
        assert_eq!(film.owner_id, Some(user.id));
    }

    #[tokio::test]
    async fn replace_film_actors_drops_stale_links() {
        let store = CatalogStore::new(test_db().await);
        let film = store.upsert_film(&film_record(1, "Film"), None).await.unwrap();

        store
            .replace_film_actors(film.id, &[actor_record(10, "Актеры"), actor_record(11, "Актеры")], None)
            .await
            .unwrap();
        store.replace_film_actors(film.id, &[actor_record(11, "Режиссеры")], None).await.unwrap();

        let actors = film.find_related(actor::Entity).all(store.db()).await.unwrap();
        assert_eq!(actors.len(), 1);
        assert_eq!(actors[0].staff_id, Some(11));
        assert_eq!(actors[0].profession.as_deref(), Some("Режиссеры"));
        // the dropped actor row itself survives
        assert_eq!(actor::Entity::find().count(store.db()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn repeated_staff_entries_link_once() {
        let store = CatalogStore::new(test_db().await);
        let film = store.upsert_film(&film_record(1, "Film"), None).await.unwrap();

        let linked = store
            .replace_film_actors(film.id, &[actor_record(7, "Актеры"), actor_record(7, "Продюсеры")], None)
            .await
            .unwrap();

        assert_eq!(linked, 1);
        let actor = actor::Entity::find().one(store.db()).await.unwrap().unwrap();
        assert_eq!(actor.profession.as_deref(), Some("Продюсеры"));
    }
}
