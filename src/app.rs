use crate::{
    backend::{self, Backend, HttpBackend},
    catalog,
    config::{self, AppSettings},
    enrich::{self, BatchPolicy, EnrichmentUpdate},
    identity::{Identity, IdentityStore},
    prefetch::{self, AssetCache, PrefetchPolicy},
    view::{AliasTable, CatalogView},
};
use anyhow::Result;
use std::{
    path::PathBuf,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread,
};
use tracing::{debug, info, warn};

const ALIASES_FILE: &str = "aliases.json";

#[derive(Debug)]
pub enum SyncMessage {
    CatalogLoaded {
        generation: u64,
        entries: Vec<catalog::CatalogEntry>,
    },
    CatalogFailed {
        generation: u64,
        error: String,
    },
    EnrichmentStarted {
        generation: u64,
    },
    EnrichmentProgress {
        generation: u64,
        updates: Vec<EnrichmentUpdate>,
    },
    EnrichmentSettled {
        generation: u64,
    },
    PrefetchSettled {
        generation: u64,
        cached: usize,
    },
}

impl SyncMessage {
    fn generation(&self) -> u64 {
        match self {
            Self::CatalogLoaded { generation, .. }
            | Self::CatalogFailed { generation, .. }
            | Self::EnrichmentStarted { generation }
            | Self::EnrichmentProgress { generation, .. }
            | Self::EnrichmentSettled { generation }
            | Self::PrefetchSettled { generation, .. } => *generation,
        }
    }
}

pub struct App {
    pub settings: AppSettings,
    pub view: CatalogView,
    store: IdentityStore,
    backend: Arc<dyn Backend>,
    cache: AssetCache,
    batch_policy: BatchPolicy,
    prefetch_policy: PrefetchPolicy,
    sync_tx: Sender<SyncMessage>,
    sync_rx: Receiver<SyncMessage>,
    generation: u64,
    sync_active: bool,
    identity_mutation_locked: bool,
    prefetched_covers: usize,
    load_error: Option<String>,
    pub status: String,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: IdentityStore,
        settings: AppSettings,
        aliases: AliasTable,
        backend: Arc<dyn Backend>,
        cache: AssetCache,
        batch_policy: BatchPolicy,
        prefetch_policy: PrefetchPolicy,
    ) -> Self {
        let (sync_tx, sync_rx) = mpsc::channel();
        Self {
            settings,
            view: CatalogView::new(aliases),
            store,
            backend,
            cache,
            batch_policy,
            prefetch_policy,
            sync_tx,
            sync_rx,
            generation: 0,
            sync_active: false,
            identity_mutation_locked: false,
            prefetched_covers: 0,
            load_error: None,
            status: String::new(),
        }
    }

    pub fn initialize(data_dir: Option<PathBuf>, backend_url: &str) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => config::base_data_dir()?,
        };
        let store = IdentityStore::open(&data_dir);
        let settings = AppSettings::load_or_default(&data_dir);
        let aliases = AliasTable::load(&data_dir.join(ALIASES_FILE));
        let cache = AssetCache::open(&config::cover_cache_dir()?);
        let backend = Arc::new(HttpBackend::new(backend_url));
        Ok(Self::new(
            store,
            settings,
            aliases,
            backend,
            cache,
            BatchPolicy::default(),
            PrefetchPolicy::default(),
        ))
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    pub fn identities(&self) -> &[Identity] {
        self.store.identities()
    }

    pub fn sync_active(&self) -> bool {
        self.sync_active
    }

    /// While true the presentation layer should suppress its add-identity
    /// affordance; an enrichment round is mutating the catalog in flight.
    pub fn identity_mutation_locked(&self) -> bool {
        self.identity_mutation_locked
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn prefetched_covers(&self) -> usize {
        self.prefetched_covers
    }

    /// Cached cover path when available, canonical remote URL otherwise.
    pub fn resolve_cover(&self, app_id: u32) -> String {
        match self.cache.resolve_cached(app_id) {
            Some(path) => path.display().to_string(),
            None => backend::cover_url(app_id),
        }
    }

    pub fn link_identity(&mut self, identity: Identity) -> bool {
        info!("linking identity {}", identity.id);
        let saved = self.store.upsert(identity);
        self.start_sync();
        saved
    }

    pub fn unlink_identity(&mut self, id: &str) -> bool {
        info!("unlinking identity {id}");
        let saved = self.store.remove(id);
        self.start_sync();
        saved
    }

    /// Publishes the identities' cached game lists as the initial catalog so a
    /// returning user sees their shelf before the first reload completes.
    pub fn seed_from_cache(&mut self) {
        if self.store.is_empty() {
            return;
        }
        let entries = catalog::merge_owned(self.store.identities());
        info!("seeded catalog with {} cached games", entries.len());
        self.view.replace_entries(entries);
    }

    pub fn start_sync(&mut self) {
        // A reload supersedes any round still in flight; its messages carry a
        // stale generation and are dropped by the pump.
        self.generation += 1;

        if self.store.is_empty() {
            self.view.replace_entries(Vec::new());
            self.sync_active = false;
            self.identity_mutation_locked = false;
            self.load_error = None;
            self.status = "No accounts linked".to_string();
            return;
        }

        self.sync_active = true;
        self.load_error = None;
        self.status = "Loading game library...".to_string();

        let generation = self.generation;
        let tx = self.sync_tx.clone();
        let backend = Arc::clone(&self.backend);
        let cache = self.cache.clone();
        let ids = self.store.ids();
        let batch_policy = self.batch_policy;
        let prefetch_policy = self.prefetch_policy;
        thread::spawn(move || {
            run_sync_round(
                backend,
                cache,
                ids,
                generation,
                batch_policy,
                prefetch_policy,
                tx,
            );
        });
    }

    pub fn retry(&mut self) {
        self.load_error = None;
        self.start_sync();
    }

    /// Drains pending sync messages; returns whether any state changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.sync_rx.try_recv() {
                Ok(message) => {
                    if self.handle_message(message) {
                        changed = true;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        changed
    }

    fn handle_message(&mut self, message: SyncMessage) -> bool {
        if message.generation() != self.generation {
            debug!("dropping message from superseded sync round");
            return false;
        }
        match message {
            SyncMessage::CatalogLoaded { entries, .. } => {
                let games = entries.len();
                let accounts = self.store.identities().len();
                self.view.replace_entries(entries);
                self.load_error = None;
                self.status = format!("Loaded {games} games from {accounts} account(s)");
                true
            }
            SyncMessage::CatalogFailed { error, .. } => {
                warn!("catalog load failed: {error}");
                self.sync_active = false;
                self.identity_mutation_locked = false;
                self.load_error = Some(error);
                self.status = "Failed to load game library".to_string();
                true
            }
            SyncMessage::EnrichmentStarted { .. } => {
                self.identity_mutation_locked = true;
                self.status = "Loading compatibility data...".to_string();
                true
            }
            SyncMessage::EnrichmentProgress { updates, .. } => {
                for update in &updates {
                    self.view.apply_enrichment(
                        update.app_id,
                        update.tier,
                        update.active_players,
                        update.state,
                    );
                }
                self.view.recompute_projection();
                true
            }
            SyncMessage::EnrichmentSettled { .. } => {
                self.identity_mutation_locked = false;
                self.sync_active = false;
                self.status = "Compatibility data loaded".to_string();
                true
            }
            SyncMessage::PrefetchSettled { cached, .. } => {
                self.prefetched_covers = cached;
                debug!("prefetched {cached} covers");
                false
            }
        }
    }
}

fn run_sync_round(
    backend: Arc<dyn Backend>,
    cache: AssetCache,
    ids: Vec<String>,
    generation: u64,
    batch_policy: BatchPolicy,
    prefetch_policy: PrefetchPolicy,
    tx: Sender<SyncMessage>,
) {
    let payload = match backend.fetch_catalog(&ids) {
        Ok(payload) => payload,
        Err(err) => {
            let _ = tx.send(SyncMessage::CatalogFailed {
                generation,
                error: err.to_string(),
            });
            return;
        }
    };

    // This round owns its entry vector; once superseded, its writes land
    // nowhere the current catalog can see.
    let mut entries = catalog::from_payload(payload);
    let _ = tx.send(SyncMessage::CatalogLoaded {
        generation,
        entries: entries.clone(),
    });

    let app_ids: Vec<u32> = entries.iter().map(|entry| entry.app_id).collect();
    let prefetch_backend = Arc::clone(&backend);
    let prefetch_tx = tx.clone();
    thread::spawn(move || {
        let cached = prefetch::prefetch(
            prefetch_backend.as_ref(),
            &cache,
            &app_ids,
            prefetch_policy,
        );
        let _ = prefetch_tx.send(SyncMessage::PrefetchSettled { generation, cached });
    });

    let _ = tx.send(SyncMessage::EnrichmentStarted { generation });
    enrich::enrich(backend.as_ref(), &mut entries, batch_policy, |batch| {
        let updates = batch.iter().map(EnrichmentUpdate::from_entry).collect();
        let _ = tx.send(SyncMessage::EnrichmentProgress {
            generation,
            updates,
        });
    });
    let _ = tx.send(SyncMessage::EnrichmentSettled { generation });
}
