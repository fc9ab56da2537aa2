use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::{
    entities::user,
    error::{AppError, AppResult},
    kinopoisk::CatalogSource,
    models::{FilmRecord, SyncReport, actor_records},
    store::CatalogStore,
};

/// Pulls one catalog page at a time into local storage.
pub struct Synchronizer {
    catalog: Arc<dyn CatalogSource>,
    store: CatalogStore,
    max_concurrent: usize,
}

impl Synchronizer {
    pub fn new(catalog: Arc<dyn CatalogSource>, store: CatalogStore, max_concurrent: usize) -> Self {
        Self { catalog, store, max_concurrent: max_concurrent.max(1) }
    }

    /// Upserts every film of `page` and rebuilds each film's actor set.
    ///
    /// A failed page fetch aborts the call before anything is written. A failed
    /// or malformed staff fetch only affects that film, whose existing actors
    /// are left as they were. Films without a catalog id are skipped.
    pub async fn sync(&self, page: u32, user: Option<&user::Model>) -> AppResult<SyncReport> {
        if page == 0 {
            return Err(AppError::bad_parameter("page must be a positive integer"));
        }

        info!(page, user = ?user.map(|u| u.username.as_str()), "syncing catalog page");

        let films_page = self.catalog.fetch_films(page).await?;
        let total_pages = films_page.total_pages.unwrap_or(1);

        let records: Vec<FilmRecord> = films_page
            .items
            .iter()
            .filter_map(|item| {
                let record = FilmRecord::from_item(item);
                if record.is_none() {
                    warn!(
                        name = ?item.name_ru.as_deref().or(item.name_original.as_deref()),
                        "skipping catalog film without kinopoiskId"
                    );
                }
                record
            })
            .collect();

        let owner_id = user.map(|u| u.id);

        let outcomes: Vec<AppResult<()>> = stream::iter(records)
            .map(|record| self.sync_film(record, owner_id))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut synced_count = 0;
        for outcome in outcomes {
            outcome?;
            synced_count += 1;
        }

        info!(page, total_pages, synced_count, "catalog page synced");

        Ok(SyncReport { synced_count, total_pages, current_page: page })
    }

    async fn sync_film(&self, record: FilmRecord, owner_id: Option<i32>) -> AppResult<()> {
        let film = self.store.upsert_film(&record, owner_id).await?;
        let kinopoisk_id = record.kinopoisk_id;

        let staff = self
            .catalog
            .fetch_staff(kinopoisk_id)
            .await
            .and_then(|entries| actor_records(&entries));

        let actors = match staff {
            Ok(actors) => actors,
            Err(err) => {
                warn!(
                    kinopoisk_id,
                    validation = err.is_validation(),
                    error = %err,
                    "failed to load staff, keeping existing actors"
                );
                return Ok(());
            },
        };

        match self.store.replace_film_actors(film.id, &actors, owner_id).await {
            Ok(linked) => debug!(kinopoisk_id, linked, "film actors synced"),
            Err(err) => {
                warn!(kinopoisk_id, error = %err, "failed to store actors, keeping existing actors")
            },
        }

        Ok(())
    }
}
