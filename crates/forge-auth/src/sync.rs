//! Bulk synchronization of external sources.

use tokio_util::sync::CancellationToken;

use crate::AuthResult;
use crate::error::AuthError;
use crate::services::AuthServices;

/// Runs `sync` on every active, sync-enabled source that supports it.
///
/// Cancellation is checked before each source. The first failing source
/// aborts the run; sources synchronized before it keep their changes.
///
/// # Errors
///
/// Returns `AuthError::Cancelled` if `cancel` fires, or the failing
/// source's error.
pub async fn sync_external_users(
    services: &AuthServices,
    cancel: &CancellationToken,
    update_existing: bool,
) -> AuthResult<()> {
    tracing::trace!("synchronizing external users");

    for source in services.sources.list(false).await? {
        if !source.is_active || !source.is_sync_enabled {
            continue;
        }
        if cancel.is_cancelled() {
            tracing::warn!(source = %source.name, "external user sync cancelled");
            return Err(AuthError::Cancelled {
                message: format!("before external user sync of {}", source.name),
            });
        }
        let Some(syncable) = source.cfg.as_synchronizable() else {
            continue;
        };

        syncable
            .sync(services, &source, cancel, update_existing)
            .await
            .inspect_err(|e| {
                tracing::error!(source = %source.name, error = %e, "external user sync failed");
            })?;
    }
    Ok(())
}
