use crate::{entities::user, error::AppError};

/// Who, besides the record's owner, may change a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritePolicy {
    /// Catalog data: owner or staff.
    OwnerOrStaff,
    /// Library data: owner only.
    OwnerOnly,
}

/// Reads are open to everyone and creating only needs an authenticated
/// caller, so only updates and deletes go through here.
pub fn check_write(
    policy: WritePolicy,
    user: &user::Model,
    owner_id: Option<i32>,
) -> Result<(), AppError> {
    let is_owner = owner_id == Some(user.id);
    let allowed = match policy {
        WritePolicy::OwnerOrStaff => is_owner || user.is_staff,
        WritePolicy::OwnerOnly => is_owner,
    };
    if allowed { Ok(()) } else { Err(AppError::Forbidden) }
}

/// Triggering a catalog sync needs the owner role or staff.
pub fn check_sync(user: &user::Model) -> Result<(), AppError> {
    if user.is_owner || user.is_staff { Ok(()) } else { Err(AppError::Forbidden) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i32, is_owner: bool, is_staff: bool) -> user::Model {
        user::Model {
            id,
            username: format!("user{id}"),
            api_token: format!("token{id}"),
            is_owner,
            is_staff,
            created_at: 0,
        }
    }

    #[test]
    fn strangers_are_forbidden() {
        let err = check_write(WritePolicy::OwnerOrStaff, &user(3, true, false), Some(1)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[test]
    fn staff_may_edit_catalog_but_not_library_records() {
        let admin = user(2, false, true);
        assert!(check_write(WritePolicy::OwnerOrStaff, &admin, Some(1)).is_ok());
        assert!(matches!(
            check_write(WritePolicy::OwnerOnly, &admin, Some(1)),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn owners_may_edit_their_records() {
        let owner = user(1, false, false);
        assert!(check_write(WritePolicy::OwnerOnly, &owner, Some(1)).is_ok());
        assert!(check_write(WritePolicy::OwnerOnly, &owner, None).is_err());
    }

    #[test]
    fn sync_needs_a_role() {
        assert!(check_sync(&user(1, true, false)).is_ok());
        assert!(check_sync(&user(1, false, true)).is_ok());
        assert!(matches!(check_sync(&user(1, false, false)), Err(AppError::Forbidden)));
    }
}
