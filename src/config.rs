use std::net::SocketAddr;

use anyhow::Context;

#[derive(Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub kinopoisk_api_key: String,
    pub kinopoisk_base_url_v1: String,
    pub kinopoisk_base_url_v2: String,
    pub kinopoisk_rps: u32,
    pub sync_max_concurrent: usize,
    pub http_timeout_secs: u64,
    pub bootstrap_admin_token: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("database_url", &self.database_url)
            .field("kinopoisk_api_key", &"<redacted>")
            .field("kinopoisk_base_url_v1", &self.kinopoisk_base_url_v1)
            .field("kinopoisk_base_url_v2", &self.kinopoisk_base_url_v2)
            .field("kinopoisk_rps", &self.kinopoisk_rps)
            .field("sync_max_concurrent", &self.sync_max_concurrent)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("bootstrap_admin_token", &self.bootstrap_admin_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = lookup("PORT").unwrap_or_else(|| "3000".to_string()).parse().context("PORT")?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://kinoteka.db?mode=rwc".to_string());

        let kinopoisk_api_key = lookup("KINOPOISK_API_KEY").unwrap_or_default().trim().to_string();
        let kinopoisk_base_url_v1 = lookup("KINOPOISK_BASE_URL_V1")
            .unwrap_or_else(|| "https://kinopoiskapiunofficial.tech/api/v1".to_string());
        let kinopoisk_base_url_v2 = lookup("KINOPOISK_BASE_URL_V2")
            .unwrap_or_else(|| "https://kinopoiskapiunofficial.tech/api/v2.2".to_string());

        let kinopoisk_rps: u32 =
            lookup("KINOPOISK_RPS").and_then(|s| s.parse().ok()).unwrap_or(5);

        let sync_max_concurrent: usize =
            lookup("SYNC_MAX_CONCURRENT").and_then(|s| s.parse().ok()).unwrap_or(4);

        let http_timeout_secs: u64 =
            lookup("HTTP_TIMEOUT_SECS").and_then(|s| s.parse().ok()).unwrap_or(30);

        let bootstrap_admin_token = lookup("BOOTSTRAP_ADMIN_TOKEN")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            kinopoisk_api_key,
            kinopoisk_base_url_v1,
            kinopoisk_base_url_v2,
            kinopoisk_rps,
            sync_max_concurrent,
            http_timeout_secs,
            bootstrap_admin_token,
        })
    }
}
