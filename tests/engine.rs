use gameshelf::{
    app::App,
    backend::{Backend, CatalogPayload, CompatibilityPayload, FetchError},
    catalog::{CompatibilityTier, EnrichmentState},
    config::AppSettings,
    enrich::BatchPolicy,
    identity::{Identity, IdentityStore, OwnedGame},
    prefetch::{AssetCache, PrefetchPolicy},
    view::{AliasTable, SortKey},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};
use tempfile::TempDir;

/// Serves a fixed catalog and per-app compatibility records, with optional
/// per-app failures, standing in for the companion service.
struct ScriptedBackend {
    catalog: String,
    tiers: HashMap<u32, &'static str>,
    failing: Vec<u32>,
    compat_calls: Mutex<Vec<u32>>,
}

impl ScriptedBackend {
    fn new(catalog: &str) -> Self {
        Self {
            catalog: catalog.to_string(),
            tiers: HashMap::new(),
            failing: Vec::new(),
            compat_calls: Mutex::new(Vec::new()),
        }
    }
}

impl Backend for ScriptedBackend {
    fn fetch_catalog(&self, _ids: &[String]) -> Result<CatalogPayload, FetchError> {
        serde_json::from_str(&self.catalog).map_err(|err| FetchError::Decode(err.to_string()))
    }

    fn fetch_compatibility(&self, app_id: u32) -> Result<CompatibilityPayload, FetchError> {
        self.compat_calls.lock().unwrap().push(app_id);
        if self.failing.contains(&app_id) {
            return Err(FetchError::Status(502));
        }
        Ok(CompatibilityPayload {
            compatibility: self.tiers.get(&app_id).copied().unwrap_or("unknown").to_string(),
            active_players: i64::from(app_id) * 100,
        })
    }

    fn fetch_cover(&self, _app_id: u32) -> Result<Vec<u8>, FetchError> {
        Ok(vec![0xff, 0xd8])
    }
}

fn catalog_json() -> String {
    let games: Vec<String> = (1..=7)
        .map(|app_id| {
            format!(
                r#"{{"appid": {app_id}, "name": "Game {app_id}", "playtime_forever": {},
                    "accounts": [{{"id": "a", "name": "Alice", "playtime_forever": {}}}]}}"#,
                app_id * 30,
                app_id * 30
            )
        })
        .collect();
    format!("{{\"games\": [{}]}}", games.join(","))
}

fn alice() -> Identity {
    Identity {
        id: "a".to_string(),
        display_name: "Alice".to_string(),
        avatar_url: String::new(),
        games: vec![OwnedGame {
            app_id: 1,
            name: "Game 1".to_string(),
            playtime_minutes: 30,
        }],
        last_synced_at: 1_700_000_000,
    }
}

fn build_app(dir: &TempDir, backend: Arc<ScriptedBackend>) -> App {
    let mut store = IdentityStore::open(dir.path());
    store.upsert(alice());
    App::new(
        store,
        AppSettings::default(),
        AliasTable::builtin(),
        backend,
        AssetCache::open(&dir.path().join("covers")),
        BatchPolicy::immediate(),
        PrefetchPolicy::immediate(),
    )
}

fn pump_until_idle(app: &mut App) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while app.sync_active() {
        app.pump();
        assert!(Instant::now() < deadline, "sync round never settled");
        thread::sleep(Duration::from_millis(5));
    }
    app.pump();
}

#[test]
fn sync_round_enriches_and_projects_through_the_public_api() {
    let dir = TempDir::new().unwrap();
    let mut backend = ScriptedBackend::new(&catalog_json());
    backend.tiers.insert(1, "platinum");
    backend.tiers.insert(2, "gold");
    backend.failing.push(3);
    let backend = Arc::new(backend);

    let mut app = build_app(&dir, Arc::clone(&backend));
    app.seed_from_cache();
    app.start_sync();
    pump_until_idle(&mut app);

    assert_eq!(app.view.entries().len(), 7);
    for entry in app.view.entries() {
        match entry.app_id {
            1 => assert_eq!(entry.compatibility_tier, CompatibilityTier::Platinum),
            2 => assert_eq!(entry.compatibility_tier, CompatibilityTier::Gold),
            3 => {
                assert_eq!(entry.enrichment_state, EnrichmentState::Failed);
                assert_eq!(entry.compatibility_tier, CompatibilityTier::Error);
                assert_eq!(entry.active_players, 0);
            }
            _ => assert_eq!(entry.compatibility_tier, CompatibilityTier::Unknown),
        }
        if entry.app_id != 3 {
            assert_eq!(entry.enrichment_state, EnrichmentState::Loaded);
            assert_eq!(entry.active_players, i64::from(entry.app_id) * 100);
        }
    }
    assert_eq!(backend.compat_calls.lock().unwrap().len(), 7);

    // Compatibility sort: platinum, gold, the unknowns, then the failed entry.
    app.view.set_sort(SortKey::Compatibility, true);
    let order: Vec<u32> = app.view.rows().iter().map(|row| row.entry.app_id).collect();
    assert_eq!(order[0], 1);
    assert_eq!(order[1], 2);
    assert_eq!(*order.last().unwrap(), 3);

    // Popularity with ascending=true puts the busiest game first.
    app.view.set_sort(SortKey::Popularity, true);
    let busiest = app.view.rows()[0].entry.app_id;
    assert_eq!(busiest, 7);
}

#[test]
fn identity_changes_persist_across_engine_restarts() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(&catalog_json()));

    {
        let mut app = build_app(&dir, Arc::clone(&backend));
        let mut bob = alice();
        bob.id = "b".to_string();
        bob.display_name = "Bob".to_string();
        app.link_identity(bob);
        pump_until_idle(&mut app);
        assert_eq!(app.identities().len(), 2);
    }

    let store = IdentityStore::open(dir.path());
    assert_eq!(store.identities().len(), 2);
    assert!(store.get("b").is_some());
}

#[test]
fn covers_land_in_the_cache_during_a_round() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(&catalog_json()));
    let mut app = build_app(&dir, backend);

    app.start_sync();
    pump_until_idle(&mut app);

    // The prefetch worker races the enrichment round; give it a moment.
    let deadline = Instant::now() + Duration::from_secs(5);
    while app.prefetched_covers() == 0 && Instant::now() < deadline {
        app.pump();
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(app.prefetched_covers(), 7);
    assert!(app.resolve_cover(1).ends_with("1.jpg"));
    assert!(app.resolve_cover(999).starts_with("https://"));
}
