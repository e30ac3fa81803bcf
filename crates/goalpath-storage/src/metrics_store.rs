//! [`MetricsStore`] on top of a key-value [`Storage`].
//!
//! Key layout:
//!
//! ```text
//! meta/snapshot_seq                                   store-wide snapshot counter
//! snapshot/<metric>\x1f<seq:020>\x1f<assignment json>  MetricSnapshotWithAssignment
//! start/<metric>\x1f<assignment json>                 StartTimeEntry
//! last_id/<type>/<name>                               last issued id
//! ```
//!
//! Snapshot keys carry the zero-padded store-wide sequence number, so a prefix
//! scan returns a metric's snapshots in recording order. The assignment at the
//! end of the key lets queries select snapshots before reading any value, so
//! only the matching entries are loaded and decoded.

use crate::{deserialize, serialize, Storage, WriteOp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use goalpath_core::{
    Assignment, MetricSnapshot, MetricSnapshotExport, MetricSnapshotWithAssignment, MetricsError,
    MetricsStore, Result, TimestampMillis,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

const SNAPSHOT_SEQ_KEY: &str = "meta/snapshot_seq";
const SNAPSHOT_PREFIX: &str = "snapshot/";
const START_TIME_PREFIX: &str = "start/";
const LAST_ID_PREFIX: &str = "last_id/";
const SEPARATOR: char = '\u{1f}';

const EXECUTION_ID_TYPE: &str = "workflow_execution";
const SCHEDULE_ID_TYPE: &str = "schedule";

/// Snapshot key decoded without reading the stored value.
struct SnapshotKey {
    key: Vec<u8>,
    seq: u64,
    assignment: Assignment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StartTimeEntry {
    assignment: Assignment,
    start_time: TimestampMillis,
}

/// Named lock serialising read-modify-write sequences over one group of keys.
struct Scope {
    name: &'static str,
    lock: Mutex<()>,
}

impl Scope {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
        }
    }

    async fn enter(&self) -> MutexGuard<'_, ()> {
        trace!(scope = self.name, "entering store scope");
        self.lock.lock().await
    }
}

/// Metrics store backed by any [`Storage`].
pub struct KvMetricsStore {
    storage: Arc<dyn Storage>,
    snapshots: Scope,
    start_times: Scope,
    last_ids: Scope,
}

impl KvMetricsStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            snapshots: Scope::new("snapshots"),
            start_times: Scope::new("start_times"),
            last_ids: Scope::new("last_ids"),
        }
    }

    /// Underlying key-value storage.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn snapshot_prefix(metric_name: &str) -> String {
        format!("{}{}{}", SNAPSHOT_PREFIX, metric_name, SEPARATOR)
    }

    fn snapshot_key(metric_name: &str, seq: u64, assignment: &Assignment) -> Result<String> {
        Ok(format!(
            "{}{:020}{}{}",
            Self::snapshot_prefix(metric_name),
            seq,
            SEPARATOR,
            assignment.storage_key()?
        ))
    }

    fn start_time_prefix(metric_name: &str) -> String {
        format!("{}{}{}", START_TIME_PREFIX, metric_name, SEPARATOR)
    }

    fn last_id_key(id_type: &str, name: &str) -> String {
        format!("{}{}/{}", LAST_ID_PREFIX, id_type, name)
    }

    /// Snapshot keys of a metric whose assignment matches `query`, in recording order.
    async fn snapshot_keys(&self, metric_name: &str, query: &Assignment) -> Result<Vec<SnapshotKey>> {
        check_metric_name(metric_name)?;
        let prefix = Self::snapshot_prefix(metric_name);
        let mut keys = self
            .storage
            .get_keys_with_prefix(prefix.as_bytes())
            .await
            .map_err(storage_error)?;
        keys.sort();

        let mut selected = Vec::new();
        for key in keys {
            let (seq, assignment) = parse_snapshot_key(&key[prefix.len()..])?;
            if assignment.matches(query) {
                selected.push(SnapshotKey { key, seq, assignment });
            }
        }
        Ok(selected)
    }

    async fn read_snapshot(&self, key: &SnapshotKey) -> Result<Option<MetricSnapshotWithAssignment>> {
        match self.storage.get(&key.key).await.map_err(storage_error)? {
            Some(value) => Ok(Some(deserialize(&value).map_err(storage_error)?)),
            None => Ok(None),
        }
    }

    /// Load the values behind `keys` as `(sequence, entry)`, skipping vanished keys.
    async fn read_snapshots(&self, keys: &[SnapshotKey]) -> Result<Vec<(u64, MetricSnapshotWithAssignment)>> {
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.read_snapshot(key).await? {
                entries.push((key.seq, entry));
            }
        }
        Ok(entries)
    }

    async fn load_start_times(&self, metric_name: &str) -> Result<Vec<(Vec<u8>, StartTimeEntry)>> {
        check_metric_name(metric_name)?;
        let prefix = Self::start_time_prefix(metric_name);
        let keys = self
            .storage
            .get_keys_with_prefix(prefix.as_bytes())
            .await
            .map_err(storage_error)?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.storage.get(&key).await.map_err(storage_error)? {
                entries.push((key, deserialize(&value).map_err(storage_error)?));
            }
        }
        Ok(entries)
    }

    async fn read_counter(&self, key: &str) -> Result<Option<u64>> {
        match self.storage.get(key.as_bytes()).await.map_err(storage_error)? {
            Some(value) => Ok(Some(deserialize(&value).map_err(storage_error)?)),
            None => Ok(None),
        }
    }

    async fn next_id(&self, id_type: &str, name: &str) -> Result<u64> {
        let _scope = self.last_ids.enter().await;
        let key = Self::last_id_key(id_type, name);
        let id = match self.read_counter(&key).await? {
            Some(last) => last
                .checked_add(1)
                .ok_or_else(|| MetricsError::storage(format!("Id space exhausted for {}", key)))?,
            None => 0,
        };
        self.storage
            .put(key.as_bytes(), &serialize(&id).map_err(storage_error)?)
            .await
            .map_err(storage_error)?;
        debug!(id_type, name, id, "Issued new id");
        Ok(id)
    }
}

#[async_trait]
impl MetricsStore for KvMetricsStore {
    async fn get_last_snapshot(
        &self,
        metric_name: &str,
        assignment: &Assignment,
    ) -> Result<Option<MetricSnapshotWithAssignment>> {
        let keys = self.snapshot_keys(metric_name, assignment).await?;
        let Some(newest) = keys.last() else {
            return Ok(None);
        };
        if keys.iter().all(|key| key.assignment == newest.assignment) {
            // Indices grow with the sequence within one assignment.
            return self.read_snapshot(newest).await;
        }
        Ok(self
            .read_snapshots(&keys)
            .await?
            .into_iter()
            .max_by_key(|(seq, entry)| (entry.snapshot.index, *seq))
            .map(|(_, entry)| entry))
    }

    async fn store_new_snapshot(
        &self,
        metric_name: &str,
        assignment: &Assignment,
        snapshot: &MetricSnapshot,
    ) -> Result<()> {
        check_metric_name(metric_name)?;
        let _scope = self.snapshots.enter().await;

        let seq = self.read_counter(SNAPSHOT_SEQ_KEY).await?.unwrap_or(0) + 1;
        let entry = MetricSnapshotWithAssignment {
            snapshot: snapshot.clone(),
            assignment: assignment.clone(),
        };
        let ops = vec![
            WriteOp::put(SNAPSHOT_SEQ_KEY, serialize(&seq).map_err(storage_error)?),
            WriteOp::put(
                Self::snapshot_key(metric_name, seq, assignment)?,
                serialize(&entry).map_err(storage_error)?,
            ),
        ];
        self.storage.batch_write(ops).await.map_err(storage_error)?;
        trace!(metric = metric_name, seq, index = snapshot.index, "Stored new snapshot");
        Ok(())
    }

    async fn overwrite_snapshot(
        &self,
        metric_name: &str,
        assignment: &Assignment,
        snapshot: &MetricSnapshot,
    ) -> Result<()> {
        let _scope = self.snapshots.enter().await;

        let keys = self.snapshot_keys(metric_name, assignment).await?;
        let mut target = None;
        for key in keys.iter().rev().filter(|key| key.assignment == *assignment) {
            if let Some(entry) = self.read_snapshot(key).await? {
                if entry.snapshot.index == snapshot.index {
                    target = Some(&key.key);
                    break;
                }
            }
        }
        let key = target.ok_or_else(|| {
            MetricsError::storage(format!(
                "No snapshot with index {} for metric \"{}\" and assignment {} to overwrite",
                snapshot.index, metric_name, assignment
            ))
        })?;

        let entry = MetricSnapshotWithAssignment {
            snapshot: snapshot.clone(),
            assignment: assignment.clone(),
        };
        self.storage
            .put(key, &serialize(&entry).map_err(storage_error)?)
            .await
            .map_err(storage_error)
    }

    async fn remove_oldest_snapshot(&self, metric_name: &str, assignment: &Assignment) -> Result<()> {
        let _scope = self.snapshots.enter().await;

        let keys = self.snapshot_keys(metric_name, assignment).await?;
        let oldest = keys.first().ok_or_else(|| {
            MetricsError::storage(format!(
                "There are no snapshots stored for metric \"{}\" and assignment {}",
                metric_name, assignment
            ))
        })?;
        self.storage.delete(&oldest.key).await.map_err(storage_error)?;
        debug!(metric = metric_name, seq = oldest.seq, "Removed oldest snapshot");
        Ok(())
    }

    async fn delete_snapshots(&self, metric_name: &str) -> Result<()> {
        check_metric_name(metric_name)?;
        let _scope = self.snapshots.enter().await;

        let keys = self
            .storage
            .get_keys_with_prefix(Self::snapshot_prefix(metric_name).as_bytes())
            .await
            .map_err(storage_error)?;
        let count = keys.len();
        let ops = keys.into_iter().map(WriteOp::delete).collect();
        self.storage.batch_write(ops).await.map_err(storage_error)?;
        debug!(metric = metric_name, count, "Deleted all snapshots");
        Ok(())
    }

    async fn get_start_time(
        &self,
        metric_name: &str,
        assignment: &Assignment,
    ) -> Result<Option<TimestampMillis>> {
        let entries = self.load_start_times(metric_name).await?;
        Ok(entries
            .into_iter()
            .find(|(_, entry)| entry.assignment.matches(assignment))
            .map(|(_, entry)| entry.start_time))
    }

    async fn store_start_time(
        &self,
        metric_name: &str,
        assignment: &Assignment,
        start_time: TimestampMillis,
    ) -> Result<()> {
        check_metric_name(metric_name)?;
        let _scope = self.start_times.enter().await;

        let key = format!("{}{}", Self::start_time_prefix(metric_name), assignment.storage_key()?);
        let entry = StartTimeEntry {
            assignment: assignment.clone(),
            start_time,
        };
        self.storage
            .put(key.as_bytes(), &serialize(&entry).map_err(storage_error)?)
            .await
            .map_err(storage_error)
    }

    async fn clear_start_time(&self, metric_name: &str, assignment: &Assignment) -> Result<()> {
        let _scope = self.start_times.enter().await;

        let ops: Vec<WriteOp> = self
            .load_start_times(metric_name)
            .await?
            .into_iter()
            .filter(|(_, entry)| entry.assignment.matches(assignment))
            .map(|(key, _)| WriteOp::delete(key))
            .collect();
        if ops.is_empty() {
            return Ok(());
        }
        self.storage.batch_write(ops).await.map_err(storage_error)
    }

    async fn get_snapshots(
        &self,
        metric_name: &str,
        assignment: &Assignment,
    ) -> Result<Vec<MetricSnapshotWithAssignment>> {
        let keys = self.snapshot_keys(metric_name, assignment).await?;
        Ok(self
            .read_snapshots(&keys)
            .await?
            .into_iter()
            .map(|(_, entry)| entry)
            .collect())
    }

    async fn get_snapshots_within_time_frame(
        &self,
        metric_name: &str,
        assignment: &Assignment,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricSnapshotWithAssignment>> {
        let (start, end) = (start.timestamp_millis(), end.timestamp_millis());
        let mut selected = Vec::new();
        let keys = self.snapshot_keys(metric_name, assignment).await?;
        for (_, entry) in self.read_snapshots(&keys).await? {
            let at = entry.snapshot.start_of_measurement.ok_or_else(|| {
                MetricsError::storage(format!(
                    "Expected snapshot {} of metric \"{}\" to have a timestamp, but it has not",
                    entry.snapshot.index, metric_name
                ))
            })?;
            if start <= at && at < end {
                selected.push(entry);
            }
        }
        Ok(selected)
    }

    async fn get_snapshot_count(&self, metric_name: &str, assignment: &Assignment) -> Result<u64> {
        Ok(self.snapshot_keys(metric_name, assignment).await?.len() as u64)
    }

    async fn get_new_execution_id(&self, workflow_id: &str) -> Result<u64> {
        self.next_id(EXECUTION_ID_TYPE, workflow_id).await
    }

    async fn get_new_schedule_id(&self) -> Result<u64> {
        self.next_id(SCHEDULE_ID_TYPE, SCHEDULE_ID_TYPE).await
    }

    async fn export_metric_snapshots(&self, metric_names: &[String]) -> Result<Vec<MetricSnapshotExport>> {
        let mut rows = Vec::new();
        for name in metric_names {
            let keys = self.snapshot_keys(name, &Assignment::any()).await?;
            for (seq, entry) in self.read_snapshots(&keys).await? {
                rows.push((
                    seq,
                    MetricSnapshotExport {
                        metric_name: name.clone(),
                        entry,
                    },
                ));
            }
        }
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }
}

fn storage_error(err: anyhow::Error) -> MetricsError {
    MetricsError::storage(format!("{:#}", err))
}

fn check_metric_name(metric_name: &str) -> Result<()> {
    if metric_name.is_empty() {
        return Err(MetricsError::storage("Metric name should not be empty!"));
    }
    if metric_name.contains(SEPARATOR) {
        return Err(MetricsError::storage(format!(
            "Metric name {:?} contains a reserved character",
            metric_name
        )));
    }
    Ok(())
}

/// Split `<seq>\x1f<assignment json>` from the end of a snapshot key.
fn parse_snapshot_key(suffix: &[u8]) -> Result<(u64, Assignment)> {
    let malformed = || MetricsError::storage("Malformed snapshot key");
    let suffix = std::str::from_utf8(suffix).map_err(|_| malformed())?;
    let (seq, assignment) = suffix.split_once(SEPARATOR).ok_or_else(malformed)?;
    let seq = seq.parse().map_err(|_| malformed())?;
    let assignment = serde_json::from_str(assignment).map_err(|_| malformed())?;
    Ok((seq, assignment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use chrono::TimeZone;

    fn store() -> KvMetricsStore {
        KvMetricsStore::new(Arc::new(MemoryStorage::new()))
    }

    fn wf(id: &str) -> Assignment {
        Assignment::any().with_workflow(id)
    }

    #[tokio::test]
    async fn test_store_and_get_last() {
        let store = store();
        assert!(store.get_last_snapshot("m", &wf("a")).await.unwrap().is_none());

        store
            .store_new_snapshot("m", &wf("a"), &MetricSnapshot::new(0, 1.5, None))
            .await
            .unwrap();
        store
            .store_new_snapshot("m", &wf("a"), &MetricSnapshot::new(1, 2.5, None))
            .await
            .unwrap();
        store
            .store_new_snapshot("m", &wf("b"), &MetricSnapshot::new(0, 9.0, None))
            .await
            .unwrap();

        let last = store.get_last_snapshot("m", &wf("a")).await.unwrap().unwrap();
        assert_eq!(last.snapshot.index, 1);
        assert_eq!(last.snapshot.value, 2.5);
        assert_eq!(last.assignment, wf("a"));
        assert_eq!(store.get_snapshot_count("m", &wf("a")).await.unwrap(), 2);
        assert_eq!(store.get_snapshot_count("m", &Assignment::any()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_overwrite_requires_existing_entry() {
        let store = store();
        store
            .store_new_snapshot("m", &wf("a"), &MetricSnapshot::new(0, 1.0, None))
            .await
            .unwrap();

        store
            .overwrite_snapshot("m", &wf("a"), &MetricSnapshot::new(0, 4.0, None))
            .await
            .unwrap();
        let snapshots = store.get_snapshots("m", &wf("a")).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].snapshot.value, 4.0);

        let err = store
            .overwrite_snapshot("m", &wf("b"), &MetricSnapshot::new(0, 4.0, None))
            .await
            .unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_remove_oldest() {
        let store = store();
        for i in 0..3 {
            store
                .store_new_snapshot("m", &wf("a"), &MetricSnapshot::new(i, i as f64, None))
                .await
                .unwrap();
        }
        store.remove_oldest_snapshot("m", &wf("a")).await.unwrap();

        let indices: Vec<u64> = store
            .get_snapshots("m", &wf("a"))
            .await
            .unwrap()
            .iter()
            .map(|s| s.snapshot.index)
            .collect();
        assert_eq!(indices, vec![1, 2]);

        assert!(store.remove_oldest_snapshot("m", &wf("zzz")).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_snapshots_only_touches_metric() {
        let store = store();
        store
            .store_new_snapshot("m", &wf("a"), &MetricSnapshot::new(0, 1.0, None))
            .await
            .unwrap();
        store
            .store_new_snapshot("m2", &wf("a"), &MetricSnapshot::new(0, 1.0, None))
            .await
            .unwrap();

        store.delete_snapshots("m").await.unwrap();
        assert_eq!(store.get_snapshot_count("m", &Assignment::any()).await.unwrap(), 0);
        assert_eq!(store.get_snapshot_count("m2", &Assignment::any()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_start_times() {
        let store = store();
        let a = wf("a").with_execution(1);
        let b = wf("a").with_execution(2);

        store.store_start_time("d", &a, 100).await.unwrap();
        store.store_start_time("d", &b, 200).await.unwrap();
        assert_eq!(store.get_start_time("d", &a).await.unwrap(), Some(100));
        assert_eq!(store.get_start_time("d", &b).await.unwrap(), Some(200));

        store.store_start_time("d", &a, 150).await.unwrap();
        assert_eq!(store.get_start_time("d", &a).await.unwrap(), Some(150));

        store.clear_start_time("d", &a).await.unwrap();
        assert_eq!(store.get_start_time("d", &a).await.unwrap(), None);
        assert_eq!(store.get_start_time("d", &b).await.unwrap(), Some(200));

        store.clear_start_time("d", &Assignment::any()).await.unwrap();
        assert_eq!(store.get_start_time("d", &b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_time_frame_query() {
        let store = store();
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        for (i, d) in [1u32, 2, 3].into_iter().enumerate() {
            store
                .store_new_snapshot(
                    "m",
                    &wf("a"),
                    &MetricSnapshot::new(i as u64, d as f64, Some(day(d).timestamp_millis())),
                )
                .await
                .unwrap();
        }

        let selected = store
            .get_snapshots_within_time_frame("m", &wf("a"), day(2), day(3))
            .await
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].snapshot.value, 2.0);

        store
            .store_new_snapshot("m", &wf("a"), &MetricSnapshot::new(3, 0.0, None))
            .await
            .unwrap();
        assert!(store
            .get_snapshots_within_time_frame("m", &wf("a"), day(1), day(9))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_ids_per_scope() {
        let store = store();
        assert_eq!(store.get_new_execution_id("wf-1").await.unwrap(), 0);
        assert_eq!(store.get_new_execution_id("wf-1").await.unwrap(), 1);
        assert_eq!(store.get_new_execution_id("wf-2").await.unwrap(), 0);
        assert_eq!(store.get_new_schedule_id().await.unwrap(), 0);
        assert_eq!(store.get_new_schedule_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_export_in_recording_order() {
        let store = store();
        store
            .store_new_snapshot("b", &wf("x"), &MetricSnapshot::new(0, 1.0, None))
            .await
            .unwrap();
        store
            .store_new_snapshot("a", &wf("x"), &MetricSnapshot::new(0, 2.0, None))
            .await
            .unwrap();
        store
            .store_new_snapshot("c", &wf("x"), &MetricSnapshot::new(0, 3.0, None))
            .await
            .unwrap();

        let rows = store
            .export_metric_snapshots(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.metric_name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    /// Memory storage that counts value reads.
    struct CountingStorage {
        inner: MemoryStorage,
        reads: std::sync::atomic::AtomicUsize,
    }

    impl CountingStorage {
        fn reads(&self) -> usize {
            self.reads.swap(0, std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Storage for CountingStorage {
        async fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
            self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn put(&self, key: &[u8], value: &[u8]) -> anyhow::Result<()> {
            self.inner.put(key, value).await
        }

        async fn delete(&self, key: &[u8]) -> anyhow::Result<()> {
            self.inner.delete(key).await
        }

        async fn exists(&self, key: &[u8]) -> anyhow::Result<bool> {
            self.inner.exists(key).await
        }

        async fn get_keys_with_prefix(&self, prefix: &[u8]) -> anyhow::Result<Vec<Vec<u8>>> {
            self.inner.get_keys_with_prefix(prefix).await
        }

        async fn batch_write(&self, operations: Vec<WriteOp>) -> anyhow::Result<()> {
            self.inner.batch_write(operations).await
        }
    }

    #[tokio::test]
    async fn test_queries_only_read_matching_snapshots() {
        let storage = Arc::new(CountingStorage {
            inner: MemoryStorage::new(),
            reads: Default::default(),
        });
        let store = KvMetricsStore::new(storage.clone());
        for i in 0..50 {
            store
                .store_new_snapshot("m", &wf("busy"), &MetricSnapshot::new(i, 1.0, None))
                .await
                .unwrap();
        }
        for i in 0..2 {
            store
                .store_new_snapshot("m", &wf("quiet"), &MetricSnapshot::new(i, i as f64, None))
                .await
                .unwrap();
        }
        storage.reads();

        assert_eq!(store.get_snapshot_count("m", &wf("quiet")).await.unwrap(), 2);
        assert_eq!(storage.reads(), 0);

        let last = store.get_last_snapshot("m", &wf("quiet")).await.unwrap().unwrap();
        assert_eq!(last.snapshot.index, 1);
        assert_eq!(storage.reads(), 1);

        assert_eq!(store.get_snapshots("m", &wf("quiet")).await.unwrap().len(), 2);
        assert_eq!(storage.reads(), 2);

        store
            .overwrite_snapshot("m", &wf("quiet"), &MetricSnapshot::new(1, 7.0, None))
            .await
            .unwrap();
        assert_eq!(storage.reads(), 1);

        store.remove_oldest_snapshot("m", &wf("quiet")).await.unwrap();
        assert_eq!(storage.reads(), 0);
        assert_eq!(store.get_snapshot_count("m", &wf("busy")).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_last_snapshot_across_assignments_uses_highest_index() {
        let store = store();
        store
            .store_new_snapshot("m", &wf("a"), &MetricSnapshot::new(4, 4.0, None))
            .await
            .unwrap();
        store
            .store_new_snapshot("m", &wf("b"), &MetricSnapshot::new(0, 9.0, None))
            .await
            .unwrap();

        let last = store.get_last_snapshot("m", &Assignment::any()).await.unwrap().unwrap();
        assert_eq!(last.snapshot.value, 4.0);
    }

    #[tokio::test]
    async fn test_rejects_bad_metric_names() {
        let store = store();
        let snapshot = MetricSnapshot::new(0, 1.0, None);
        assert!(store.store_new_snapshot("", &wf("a"), &snapshot).await.is_err());
        assert!(store
            .store_new_snapshot("a\u{1f}b", &wf("a"), &snapshot)
            .await
            .is_err());
    }
}
