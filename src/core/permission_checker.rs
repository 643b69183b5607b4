use crate::db::PermissionStore;

/// Admins pass unconditionally. Everyone else needs at least one stored
/// permission matching one of `actions` on one of `resources`. Lookup
/// failures deny.
pub async fn is_authorized(
    store: &dyn PermissionStore,
    user_id: &str,
    actions: &[&str],
    resources: &[&str],
    is_admin: bool,
) -> bool {
    if is_admin {
        return true;
    }

    match store
        .get_specific_permissions(user_id, actions, resources)
        .await
    {
        Ok(permissions) => !permissions.is_empty(),
        Err(e) => {
            tracing::error!(user_id, error = %e, "could not get permissions");
            false
        }
    }
}
