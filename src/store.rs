//! Main Store struct tying all components together.

use crate::error::{Result, StoreError};
use crate::events::EventLog;
use crate::ingest::IngestGateway;
use crate::matches::MatchRegistry;
use crate::snapshot::{MatchSnapshot, SnapshotService};
use crate::subscriptions::{Subscriber, SubscriptionBroker, SubscriptionHandle, DEFAULT_BUFFER_SIZE};
use crate::types::{
    CommentaryEvent, CommentaryInput, ConnectionId, Match, MatchId, MatchStatus, NewMatch,
    Sequence, StoreStats,
};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Data directory. None keeps everything in memory.
    pub path: Option<PathBuf>,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Fsync event segments every N appends.
    pub sync_interval: u64,

    /// Queue size of in-process subscribers.
    pub subscriber_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
            sync_interval: 1,
            subscriber_buffer: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl StoreConfig {
    /// Persistent store under `path` with default settings.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"BBB\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// The commentary store.
///
/// Provides a unified interface for:
/// - Creating matches and moving them through their lifecycle
/// - Appending commentary and pushing it to subscribers
/// - Snapshots and catch-up reads
pub struct Store {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access (None when in memory).
    _lock_file: Option<File>,

    registry: Arc<MatchRegistry>,
    log: Arc<EventLog>,
    broker: Arc<SubscriptionBroker>,
    ingest: IngestGateway,
    snapshots: SnapshotService,
}

impl Store {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        let Some(path) = &config.path else {
            return Ok(Self::in_memory_with(config));
        };

        if path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Store with default settings that never touches disk.
    pub fn in_memory() -> Self {
        Self::in_memory_with(StoreConfig::default())
    }

    fn in_memory_with(config: StoreConfig) -> Self {
        let registry = Arc::new(MatchRegistry::in_memory());
        let log = Arc::new(EventLog::in_memory(Arc::clone(&registry)));
        Self::assemble(config, None, registry, log)
    }

    /// Create a new store. Fails with [`StoreError::AlreadyExists`] when the
    /// directory already holds one.
    pub fn create(config: StoreConfig) -> Result<Self> {
        let path = Self::data_dir(&config)?;

        // Create directory structure
        fs::create_dir_all(&path)?;

        // Acquire lock
        let lock_file = Self::acquire_lock(&path)?;

        // Never reinitialize over existing data
        if path.join("MANIFEST").exists() {
            return Err(StoreError::AlreadyExists);
        }

        // Write manifest
        Self::write_manifest(&path)?;

        // Initialize components
        let registry = Arc::new(MatchRegistry::new(path.join("matches.bin"))?);
        let log = Arc::new(EventLog::open(
            path.join("events"),
            Arc::clone(&registry),
            config.sync_interval,
        )?);

        info!(path = %path.display(), "store created");

        Ok(Self::assemble(config, Some(lock_file), registry, log))
    }

    /// Open an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let path = Self::data_dir(&config)?;

        // Verify manifest
        Self::verify_manifest(&path)?;

        // Acquire lock
        let lock_file = Self::acquire_lock(&path)?;

        // Open components, replaying every segment
        let registry = Arc::new(MatchRegistry::load(path.join("matches.bin"))?);
        let log = Arc::new(EventLog::open(
            path.join("events"),
            Arc::clone(&registry),
            config.sync_interval,
        )?);

        info!(
            path = %path.display(),
            matches = registry.len(),
            events = log.total_events(),
            "store opened"
        );

        Ok(Self::assemble(config, Some(lock_file), registry, log))
    }

    fn assemble(
        config: StoreConfig,
        lock_file: Option<File>,
        registry: Arc<MatchRegistry>,
        log: Arc<EventLog>,
    ) -> Self {
        let broker = Arc::new(SubscriptionBroker::with_buffer_size(
            Arc::clone(&registry),
            config.subscriber_buffer,
        ));
        let ingest = IngestGateway::new(Arc::clone(&registry), Arc::clone(&log), Arc::clone(&broker));
        let snapshots = SnapshotService::new(Arc::clone(&registry), Arc::clone(&log));

        Self {
            config,
            _lock_file: lock_file,
            registry,
            log,
            broker,
            ingest,
            snapshots,
        }
    }

    fn data_dir(config: &StoreConfig) -> Result<PathBuf> {
        config.path.clone().ok_or(StoreError::NotInitialized)
    }

    // --- Match Operations ---

    pub fn create_match(&self, request: NewMatch) -> Result<Match> {
        self.registry.create_match(request)
    }

    pub fn get_match(&self, match_id: MatchId) -> Result<Match> {
        self.registry.get_match(match_id)
    }

    /// All matches, newest first.
    pub fn list_matches(&self) -> Vec<Match> {
        self.registry.list_matches()
    }

    pub fn update_status(&self, match_id: MatchId, status: MatchStatus) -> Result<Match> {
        self.registry.update_status(match_id, status)
    }

    // --- Commentary Operations ---

    /// Append commentary and push it to the match's subscribers.
    pub fn submit(&self, match_id: MatchId, input: CommentaryInput) -> Result<CommentaryEvent> {
        self.ingest.submit(match_id, input)
    }

    /// Every event of a match in ascending sequence.
    pub fn read_all(&self, match_id: MatchId) -> Result<Vec<CommentaryEvent>> {
        self.log.read_all(match_id)
    }

    /// Highest sequence of a match, None while it has no commentary.
    pub fn last_sequence(&self, match_id: MatchId) -> Result<Option<Sequence>> {
        self.log.last_sequence(match_id)
    }

    pub fn snapshot(&self, match_id: MatchId) -> Result<MatchSnapshot> {
        self.snapshots.get_snapshot(match_id)
    }

    pub fn commentary_after(
        &self,
        match_id: MatchId,
        after: Option<Sequence>,
    ) -> Result<Vec<CommentaryEvent>> {
        self.snapshots.commentary_after(match_id, after)
    }

    // --- Subscription Operations ---

    /// Open an in-process connection.
    pub fn connect(&self) -> SubscriptionHandle {
        self.broker.connect()
    }

    /// Open an in-process connection with its own queue size.
    pub fn connect_with_buffer(&self, buffer_size: usize) -> SubscriptionHandle {
        self.broker.connect_with_buffer(buffer_size)
    }

    /// Allocate a connection ID for an external transport.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.broker.next_connection_id()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>, match_id: MatchId) -> Result<()> {
        self.broker.subscribe(subscriber, match_id)
    }

    /// Join a match and return what happened before joining.
    ///
    /// The subscription is registered first, so an event appended while the
    /// snapshot is read may arrive both in the snapshot and as a push. Feed
    /// pushes through a [`crate::SequenceCursor`] seeded from the snapshot.
    pub fn subscribe_with_snapshot(
        &self,
        subscriber: Arc<dyn Subscriber>,
        match_id: MatchId,
    ) -> Result<MatchSnapshot> {
        self.broker.subscribe(subscriber, match_id)?;
        self.snapshots.get_snapshot(match_id)
    }

    pub fn unsubscribe(&self, connection: ConnectionId, match_id: MatchId) {
        self.broker.unsubscribe(connection, match_id);
    }

    /// Release every subscription of a connection.
    pub fn disconnect(&self, connection: ConnectionId) -> usize {
        self.broker.unsubscribe_all(connection)
    }

    /// Matches a connection has joined.
    pub fn subscriptions_of(&self, connection: ConnectionId) -> Vec<MatchId> {
        self.broker.subscriptions_of(connection)
    }

    pub fn subscriber_count(&self, match_id: MatchId) -> usize {
        self.broker.subscriber_count(match_id)
    }

    // --- Utility Operations ---

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            match_count: self.registry.len() as u64,
            event_count: self.log.total_events(),
            subscription_count: self.broker.subscription_count() as u64,
        }
    }

    /// Force sync all data to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Data directory, None when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.config.path.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.config.path.is_some()
    }

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        if !manifest_path.exists() {
            return Err(StoreError::NotInitialized);
        }
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig::at(dir.path().join("store"))
    }

    #[test]
    fn test_create_store() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        let path = store.path().unwrap();
        assert!(path.join("MANIFEST").exists());
        assert!(path.join("matches.bin").exists());
        assert!(path.join("events").is_dir());
    }

    #[test]
    fn test_open_or_create_existing_empty_dir() {
        let dir = TempDir::new().unwrap();
        let store = Store::open_or_create(StoreConfig::at(dir.path())).unwrap();
        assert!(store.is_persistent());
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[test]
    fn test_missing_store_without_create() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            create_if_missing: false,
            ..test_config(&dir)
        };
        assert!(matches!(
            Store::open_or_create(config),
            Err(StoreError::NotInitialized)
        ));
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let _store = Store::create(test_config(&dir)).unwrap();

        let second = Store::open(test_config(&dir));
        assert!(matches!(second, Err(StoreError::Locked)));
    }

    #[test]
    fn test_bad_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("MANIFEST"), b"RST\0\x01").unwrap();

        assert!(matches!(
            Store::open(StoreConfig::at(dir.path())),
            Err(StoreError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_reopen_store() {
        let dir = TempDir::new().unwrap();
        let match_id;

        {
            let store = Store::create(test_config(&dir)).unwrap();
            match_id = store
                .create_match(NewMatch::new("India", "Australia", "MCG"))
                .unwrap()
                .match_id;
            store
                .submit(match_id, CommentaryInput::new(1, 1, "run", 1, "Quick single"))
                .unwrap();
            store
                .update_status(match_id, MatchStatus::Completed)
                .unwrap();
        }

        let store = Store::open(test_config(&dir)).unwrap();
        let snapshot = store.snapshot(match_id).unwrap();
        assert_eq!(snapshot.match_info.status, MatchStatus::Completed);
        assert_eq!(snapshot.commentary.len(), 1);
        assert_eq!(store.stats().event_count, 1);
    }

    #[test]
    fn test_create_refuses_existing_store() {
        let dir = TempDir::new().unwrap();
        {
            let store = Store::create(test_config(&dir)).unwrap();
            let id = store
                .create_match(NewMatch::new("India", "Australia", "MCG"))
                .unwrap()
                .match_id;
            store
                .submit(id, CommentaryInput::new(1, 1, "run", 1, "Old match ball"))
                .unwrap();
        }

        assert!(matches!(
            Store::create(test_config(&dir)),
            Err(StoreError::AlreadyExists)
        ));

        // The earlier data is untouched
        let store = Store::open(test_config(&dir)).unwrap();
        assert_eq!(store.stats().match_count, 1);
        assert_eq!(store.stats().event_count, 1);
    }

    #[test]
    fn test_open_after_registry_loss() {
        let dir = TempDir::new().unwrap();
        {
            let store = Store::create(test_config(&dir)).unwrap();
            let id = store
                .create_match(NewMatch::new("India", "Australia", "MCG"))
                .unwrap()
                .match_id;
            store
                .submit(id, CommentaryInput::new(1, 1, "run", 1, "Old match ball"))
                .unwrap();
        }
        fs::remove_file(dir.path().join("store").join("matches.bin")).unwrap();

        assert!(matches!(
            Store::open(test_config(&dir)),
            Err(StoreError::Corruption(_))
        ));
    }

    #[test]
    fn test_subscribe_with_snapshot() {
        let store = Store::in_memory();
        let id = store
            .create_match(NewMatch::new("India", "Australia", "MCG"))
            .unwrap()
            .match_id;
        store
            .submit(id, CommentaryInput::new(1, 1, "run", 1, "single"))
            .unwrap();

        let handle = store.connect();
        let snapshot = store.subscribe_with_snapshot(handle.subscriber(), id).unwrap();
        assert_eq!(snapshot.last_sequence(), Some(Sequence(0)));
        assert_eq!(store.subscriptions_of(handle.id()), vec![id]);

        store
            .submit(id, CommentaryInput::new(1, 2, "run", 0, "dot"))
            .unwrap();
        assert_eq!(handle.drain().len(), 1);

        assert_eq!(store.disconnect(handle.id()), 1);
        assert_eq!(store.stats().subscription_count, 0);
    }
}
