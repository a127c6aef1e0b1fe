pub mod ratings;
pub mod store;

pub use ratings::{PgRatingWriter, RatingsRepository};
pub use store::{RecordStore, StoreSession};

use crate::error::{Error, Result};

/// Creates `stocks` when missing. The table is normally owned elsewhere, so
/// callers only run this when explicitly configured to.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Store {
            op: "migrate",
            source: e.into(),
        })?;
    Ok(())
}
