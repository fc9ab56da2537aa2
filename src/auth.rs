use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::{
    AppState,
    entities::user,
    error::{AppError, AppResult},
    store::now_sec,
};

/// The caller, resolved from `Authorization: Bearer <api_token>`.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub user::Model);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match resolve_user(&parts.headers, &state.db).await? {
            Some(user) => Ok(Self(user)),
            None => Err(AppError::Unauthorized),
        }
    }
}

async fn resolve_user(headers: &HeaderMap, db: &DatabaseConnection) -> AppResult<Option<user::Model>> {
    let Some(token) = extract_bearer_token(headers)? else {
        return Ok(None);
    };

    let user = user::Entity::find()
        .filter(user::Column::ApiToken.eq(token))
        .one(db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Some(user))
}

pub fn extract_bearer_token(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let Some(header) = headers.get("authorization") else {
        return Ok(None);
    };
    let header = header.to_str().map_err(|_| AppError::Unauthorized)?;

    let (scheme, token) = header.split_once(' ').ok_or(AppError::Unauthorized)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::Unauthorized);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::Unauthorized);
    }

    Ok(Some(token))
}

/// Makes sure a staff account named `admin` holds `token`.
pub async fn ensure_bootstrap_admin(db: &DatabaseConnection, token: &str) -> AppResult<()> {
    let existing = user::Entity::find()
        .filter(user::Column::Username.eq("admin"))
        .one(db)
        .await?;

    match existing {
        Some(admin) => {
            let mut admin: user::ActiveModel = admin.into();
            admin.api_token = Set(token.to_string());
            admin.is_staff = Set(true);
            user::Entity::update(admin).exec(db).await?;
        },
        None => {
            let admin = user::ActiveModel {
                username: Set("admin".to_string()),
                api_token: Set(token.to_string()),
                is_owner: Set(true),
                is_staff: Set(true),
                created_at: Set(now_sec()),
                ..Default::default()
            };
            user::Entity::insert(admin).exec(db).await?;
        },
    }

    tracing::info!("bootstrap admin account ready");
    Ok(())
}
