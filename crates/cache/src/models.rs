use chorale_storage::error::{Error, ErrorKind};
use chorale_storage::{AssetUrl, CacheEntry, EntryInfo};
use exn::ResultExt;
use time::UtcDateTime;

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    url: String,
    blob: Vec<u8>,
    stored_at: i64,
}
impl TryFrom<EntryRow> for CacheEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let url = AssetUrl::new(row.url)?;
        let stored_at = UtcDateTime::from_unix_timestamp(row.stored_at).or_raise(|| ErrorKind::Corrupt(url.clone()))?;
        Ok(CacheEntry::new(url, row.blob, stored_at))
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct InfoRow {
    url: String,
    size: i64,
    stored_at: i64,
}
impl TryFrom<InfoRow> for EntryInfo {
    type Error = Error;
    fn try_from(row: InfoRow) -> Result<Self, Self::Error> {
        let url = AssetUrl::new(row.url)?;
        let size = u64::try_from(row.size).or_raise(|| ErrorKind::Corrupt(url.clone()))?;
        let stored_at = UtcDateTime::from_unix_timestamp(row.stored_at).or_raise(|| ErrorKind::Corrupt(url.clone()))?;
        Ok(EntryInfo { url, size, stored_at })
    }
}
