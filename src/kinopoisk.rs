use std::{num::NonZeroU32, sync::Arc};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::{Deserialize, de::DeserializeOwned};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("catalog response from {url} could not be decoded: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid {kind} record: {reason}")]
    Invalid { kind: &'static str, reason: String },
    #[error("film id is required to fetch staff")]
    MissingFilmId,
}

impl CatalogError {
    pub fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { kind, reason: reason.into() }
    }

    /// Payload problems as opposed to failures talking to the catalog.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Invalid { .. } | Self::MissingFilmId)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmPage {
    #[serde(default)]
    pub items: Vec<FilmItem>,
    pub total_pages: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmItem {
    pub kinopoisk_id: Option<i32>,
    pub name_ru: Option<String>,
    pub name_original: Option<String>,
    pub year: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffEntry {
    pub staff_id: Option<i32>,
    pub name_ru: Option<String>,
    pub name_en: Option<String>,
    pub poster_url: Option<String>,
    pub profession_text: Option<String>,
}

/// Read side of the remote film catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_films(&self, page: u32) -> Result<FilmPage, CatalogError>;

    async fn fetch_staff(&self, film_id: i32) -> Result<Vec<StaffEntry>, CatalogError>;
}

pub struct KinopoiskClient {
    client: reqwest::Client,
    api_key: String,
    base_url_v1: String,
    base_url_v2: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl KinopoiskClient {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        base_url_v1: String,
        base_url_v2: String,
        rps: u32,
    ) -> Self {
        if api_key.trim().is_empty() {
            tracing::warn!("no KINOPOISK_API_KEY provided, catalog requests will be rejected");
        }

        let quota = Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN));
        let limiter = Arc::new(RateLimiter::direct(quota));
        Self { client, api_key, base_url_v1, base_url_v2, limiter }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        self.limiter.until_ready().await;

        tracing::debug!(url = %url, ?query, "catalog request");

        let resp = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|source| CatalogError::Transport { url: url.clone(), source })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Status { url, status: status.as_u16() });
        }

        resp.json::<T>().await.map_err(|source| CatalogError::Decode { url, source })
    }
}

#[async_trait]
impl CatalogSource for KinopoiskClient {
    async fn fetch_films(&self, page: u32) -> Result<FilmPage, CatalogError> {
        let url = format!("{}/films", self.base_url_v2.trim_end_matches('/'));
        self.request(url, &[("page", page.to_string())]).await
    }

    async fn fetch_staff(&self, film_id: i32) -> Result<Vec<StaffEntry>, CatalogError> {
        if film_id <= 0 {
            return Err(CatalogError::MissingFilmId);
        }
        let url = format!("{}/staff", self.base_url_v1.trim_end_matches('/'));
        self.request(url, &[("filmId", film_id.to_string())]).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn film_page_decodes_catalog_payload() {
        let payload = r#"{
            "total": 2,
            "totalPages": 7,
            "items": [
                {"kinopoiskId": 123, "nameRu": "Фильм", "nameOriginal": null, "year": 2014, "ratingKinopoisk": 8.1},
                {"nameOriginal": "No Id"}
            ]
        }"#;

        let page: FilmPage = serde_json::from_str(payload).unwrap();
        assert_eq!(page.total_pages, Some(7));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].kinopoisk_id, Some(123));
        assert_eq!(page.items[0].name_ru.as_deref(), Some("Фильм"));
        assert_eq!(page.items[1].kinopoisk_id, None);
    }

    #[test]
    fn film_page_tolerates_missing_fields() {
        let page: FilmPage = serde_json::from_str("{}").unwrap();
        assert_eq!(page, FilmPage::default());
    }

    #[test]
    fn staff_list_decodes() {
        let payload = r#"[
            {"staffId": 456, "nameRu": "Актёр", "nameEn": "Actor", "posterUrl": "https://example.com/a.jpg",
             "professionText": "Актеры", "professionKey": "ACTOR"}
        ]"#;

        let staff: Vec<StaffEntry> = serde_json::from_str(payload).unwrap();
        assert_eq!(staff[0].staff_id, Some(456));
        assert_eq!(staff[0].profession_text.as_deref(), Some("Актеры"));
    }

    #[test]
    fn error_categories() {
        assert!(!CatalogError::Status { url: "u".into(), status: 401 }.is_validation());
        assert!(CatalogError::invalid("staff", "bad").is_validation());
        assert!(CatalogError::MissingFilmId.is_validation());
    }

    async fn serve_fake_catalog() -> String {
        use axum::{
            Json, Router,
            extract::Query,
            http::{HeaderMap, StatusCode},
            routing::get,
        };
        use std::collections::HashMap;

        async fn films(
            headers: HeaderMap,
            Query(q): Query<HashMap<String, String>>,
        ) -> Result<Json<serde_json::Value>, StatusCode> {
            if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("key") {
                return Err(StatusCode::UNAUTHORIZED);
            }
            let page = q.get("page").cloned().unwrap_or_default();
            Ok(Json(serde_json::json!({
                "totalPages": 3,
                "items": [{"kinopoiskId": 42, "nameRu": format!("page {page}"), "year": 1999}]
            })))
        }

        async fn staff(Query(q): Query<HashMap<String, String>>) -> Result<String, StatusCode> {
            match q.get("filmId").map(String::as_str) {
                Some("42") => Ok(r#"[{"staffId": 7, "nameRu": "Актёр"}]"#.to_string()),
                Some("43") => Ok("not json".to_string()),
                _ => Err(StatusCode::NOT_FOUND),
            }
        }

        let app = Router::new()
            .route("/api/v2.2/films", get(films))
            .route("/api/v1/staff", get(staff));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(base: &str, key: &str) -> KinopoiskClient {
        KinopoiskClient::new(
            reqwest::Client::new(),
            key.to_string(),
            format!("{base}/api/v1"),
            format!("{base}/api/v2.2/"),
            100,
        )
    }

    #[tokio::test]
    async fn fetches_films_with_api_key_and_page() {
        let base = serve_fake_catalog().await;
        let page = client_for(&base, "key").fetch_films(2).await.unwrap();
        assert_eq!(page.total_pages, Some(3));
        assert_eq!(page.items[0].name_ru.as_deref(), Some("page 2"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let base = serve_fake_catalog().await;
        let err = client_for(&base, "wrong").fetch_films(1).await.unwrap_err();
        assert!(matches!(err, CatalogError::Status { status: 401, .. }));
        assert!(!err.is_validation());

        let err = client_for(&base, "key").fetch_staff(99).await.unwrap_err();
        assert!(matches!(err, CatalogError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn staff_fetch_decodes_or_reports_malformed_payload() {
        let base = serve_fake_catalog().await;
        let client = client_for(&base, "key");

        let staff = client.fetch_staff(42).await.unwrap();
        assert_eq!(staff[0].staff_id, Some(7));

        let err = client.fetch_staff(43).await.unwrap_err();
        assert!(matches!(err, CatalogError::Decode { .. }));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn staff_fetch_requires_film_id() {
        let client = KinopoiskClient::new(
            reqwest::Client::new(),
            "key".to_string(),
            "http://127.0.0.1:9/api/v1".to_string(),
            "http://127.0.0.1:9/api/v2.2".to_string(),
            1,
        );
        let err = client.fetch_staff(0).await.unwrap_err();
        assert!(matches!(err, CatalogError::MissingFilmId));
    }
}
