//! Per-provider metadata cache.
//!
//! A cached payload is valid only while the file keeps the mtime it had
//! when the provider ran. Stale rows stay on disk until they are
//! overwritten or pruned, but reads treat them as absent.

use ms_core::Result;
use std::path::{Path, PathBuf};

use crate::models::NewRecord;
use crate::namespace::Namespace;
use crate::queries::records;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct MetadataCache {
    store: RecordStore,
}

impl MetadataCache {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// The cached payload, if present and captured at `expected_mtime`.
    pub fn get(
        &self,
        provider: &str,
        path: &Path,
        expected_mtime: i64,
    ) -> Result<Option<serde_json::Value>> {
        let record = self.store.get(&Namespace::metadata(provider)?, path)?;
        Ok(record
            .filter(|r| r.mtime == expected_mtime)
            .and_then(|r| r.payload))
    }

    /// Existence check that never deserializes the payload.
    pub fn exists(&self, provider: &str, path: &Path, expected_mtime: i64) -> Result<bool> {
        let conn = self.store.conn()?;
        records::record_exists(
            &conn,
            &Namespace::metadata(provider)?,
            path,
            Some(expected_mtime),
        )
    }

    /// Upsert a payload captured at `mtime`.
    pub fn put(
        &self,
        provider: &str,
        path: &Path,
        mtime: i64,
        payload: &serde_json::Value,
    ) -> Result<()> {
        self.store.put(
            &Namespace::metadata(provider)?,
            &NewRecord::new(path, mtime).with_payload(payload.clone()),
        )
    }

    pub fn all_paths(&self, provider: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .store
            .all_keys(&Namespace::metadata(provider)?)?
            .into_iter()
            .map(|k| k.path)
            .collect())
    }

    pub fn remove_orphans(&self, provider: &str, paths: &[PathBuf]) -> Result<usize> {
        self.store
            .delete_many(&Namespace::metadata(provider)?, paths)
    }

    pub fn count(&self, provider: &str) -> Result<u64> {
        self.store.count(&Namespace::metadata(provider)?)
    }

    /// Make sure the table for `provider` exists.
    pub fn ensure_provider(&self, provider: &str) -> Result<()> {
        let conn = self.store.conn()?;
        let mut report = crate::migrations::MigrationReport::default();
        crate::migrations::migrate_namespace(&conn, &Namespace::metadata(provider)?, &mut report)?;
        if !report.is_empty() {
            tracing::info!(provider, "Created metadata cache table");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> MetadataCache {
        MetadataCache::new(RecordStore::open_in_memory(&["ffprobe"]).unwrap())
    }

    #[test]
    fn get_requires_matching_mtime() {
        let cache = cache();
        let p = Path::new("/m/a.mkv");
        cache.put("ffprobe", p, 100, &json!({"format": {"duration": "1.0"}})).unwrap();

        assert_eq!(
            cache.get("ffprobe", p, 100).unwrap(),
            Some(json!({"format": {"duration": "1.0"}}))
        );
        // Row is still there, but stale.
        assert_eq!(cache.get("ffprobe", p, 101).unwrap(), None);
        assert_eq!(cache.count("ffprobe").unwrap(), 1);
    }

    #[test]
    fn exists_variant() {
        let cache = cache();
        let p = Path::new("/m/a.mkv");
        assert!(!cache.exists("ffprobe", p, 1).unwrap());
        cache.put("ffprobe", p, 1, &json!([])).unwrap();
        assert!(cache.exists("ffprobe", p, 1).unwrap());
        assert!(!cache.exists("ffprobe", p, 2).unwrap());
    }

    #[test]
    fn put_overwrites() {
        let cache = cache();
        let p = Path::new("/m/a.mkv");
        cache.put("ffprobe", p, 1, &json!("old")).unwrap();
        cache.put("ffprobe", p, 2, &json!("new")).unwrap();
        assert_eq!(cache.get("ffprobe", p, 2).unwrap(), Some(json!("new")));
        assert_eq!(cache.count("ffprobe").unwrap(), 1);
    }

    #[test]
    fn paths_and_orphans() {
        let cache = cache();
        cache.put("ffprobe", Path::new("/m/a.mkv"), 1, &json!({})).unwrap();
        cache.put("ffprobe", Path::new("/m/b.mkv"), 1, &json!({})).unwrap();

        assert_eq!(cache.all_paths("ffprobe").unwrap().len(), 2);
        let removed = cache
            .remove_orphans("ffprobe", &[PathBuf::from("/m/b.mkv")])
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            cache.all_paths("ffprobe").unwrap(),
            vec![PathBuf::from("/m/a.mkv")]
        );
    }

    #[test]
    fn ensure_provider_creates_table() {
        let cache = cache();
        assert!(cache.count("mediainfo").is_err());
        cache.ensure_provider("mediainfo").unwrap();
        assert_eq!(cache.count("mediainfo").unwrap(), 0);
    }
}
