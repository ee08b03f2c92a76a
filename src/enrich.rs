use crate::{
    backend::Backend,
    catalog::{CatalogEntry, CompatibilityTier, EnrichmentState},
};
use std::{thread, time::Duration};
use tracing::warn;

/// Throttle for annotation rounds. The pause is backpressure on the backend,
/// not a correctness requirement.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub pause: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 5,
            pause: Duration::from_millis(100),
        }
    }
}

impl BatchPolicy {
    pub fn immediate() -> Self {
        Self {
            pause: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentUpdate {
    pub app_id: u32,
    pub tier: CompatibilityTier,
    pub active_players: i64,
    pub state: EnrichmentState,
}

impl EnrichmentUpdate {
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        Self {
            app_id: entry.app_id,
            tier: entry.compatibility_tier,
            active_players: entry.active_players,
            state: entry.enrichment_state,
        }
    }
}

/// Annotates every entry with its compatibility tier and player count.
///
/// Entries are processed in `batch_size` chunks; chunks run strictly one after
/// another, requests inside a chunk run concurrently, and each request owns
/// exactly one entry. Completion means every entry is `Loaded` or `Failed`.
/// `on_batch` fires after each chunk settles.
pub fn enrich(
    backend: &dyn Backend,
    entries: &mut [CatalogEntry],
    policy: BatchPolicy,
    mut on_batch: impl FnMut(&[CatalogEntry]),
) {
    let batch_size = policy.batch_size.max(1);
    let batch_count = (entries.len() + batch_size - 1) / batch_size;
    for (index, batch) in entries.chunks_mut(batch_size).enumerate() {
        thread::scope(|scope| {
            for entry in batch.iter_mut() {
                scope.spawn(move || enrich_entry(backend, entry));
            }
        });
        on_batch(batch);
        if index + 1 < batch_count && !policy.pause.is_zero() {
            thread::sleep(policy.pause);
        }
    }
}

fn enrich_entry(backend: &dyn Backend, entry: &mut CatalogEntry) {
    match backend.fetch_compatibility(entry.app_id) {
        Ok(payload) => {
            entry.compatibility_tier = CompatibilityTier::parse(&payload.compatibility);
            entry.active_players = payload.active_players.max(0);
            entry.enrichment_state = EnrichmentState::Loaded;
        }
        Err(err) => {
            warn!("enrichment failed for {}: {err}", entry.app_id);
            entry.compatibility_tier = CompatibilityTier::Error;
            entry.active_players = 0;
            entry.enrichment_state = EnrichmentState::Failed;
        }
    }
}
