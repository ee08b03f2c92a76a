use crate::catalog::{CatalogEntry, CompatibilityTier, EnrichmentState};
use std::{cmp::Ordering, collections::HashMap, fs, path::Path};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Playtime,
    Popularity,
    Compatibility,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "name" => Some(Self::Name),
            "playtime" => Some(Self::Playtime),
            "popularity" => Some(Self::Popularity),
            "compatibility" => Some(Self::Compatibility),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Playtime => "Playtime",
            Self::Popularity => "Popularity",
            Self::Compatibility => "Compatibility",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewState {
    pub search_term: String,
    pub sort_key: SortKey,
    pub sort_ascending: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            sort_key: SortKey::Playtime,
            sort_ascending: true,
        }
    }
}

const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("cs", "counter-strike"),
    ("cs2", "counter-strike 2"),
    ("csgo", "counter-strike: global offensive"),
    ("gta", "grand theft auto"),
    ("tf2", "team fortress 2"),
    ("poe", "path of exile"),
    ("pubg", "playerunknown's battlegrounds"),
    ("rdr2", "red dead redemption 2"),
    ("dbd", "dead by daylight"),
    ("ds", "dark souls"),
];

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    map: HashMap<String, String>,
}

impl AliasTable {
    pub fn builtin() -> Self {
        let map = DEFAULT_ALIASES
            .iter()
            .map(|(alias, expansion)| (alias.to_string(), expansion.to_string()))
            .collect();
        Self { map }
    }

    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("no alias table at {}, using built-ins", path.display());
                return Self::builtin();
            }
        };
        match serde_json::from_str::<HashMap<String, String>>(&raw) {
            Ok(entries) => {
                let map = entries
                    .into_iter()
                    .map(|(alias, expansion)| (alias.to_lowercase(), expansion.to_lowercase()))
                    .collect();
                Self { map }
            }
            Err(err) => {
                warn!("alias table unparsable, using built-ins: {err}");
                Self::builtin()
            }
        }
    }

    /// Exact literal lookup only.
    pub fn expand(&self, term: &str) -> Option<&str> {
        self.map.get(term).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectionRow<'a> {
    pub entry: &'a CatalogEntry,
    pub matched: bool,
}

pub struct CatalogView {
    entries: Vec<CatalogEntry>,
    state: ViewState,
    aliases: AliasTable,
    order: Vec<usize>,
    matched: usize,
    expanded_term: Option<String>,
}

impl CatalogView {
    pub fn new(aliases: AliasTable) -> Self {
        Self {
            entries: Vec::new(),
            state: ViewState::default(),
            aliases,
            order: Vec::new(),
            matched: 0,
            expanded_term: None,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_search_term(&mut self, term: &str) {
        self.state.search_term = term.to_string();
        self.recompute_projection();
    }

    pub fn set_sort(&mut self, key: SortKey, ascending: bool) {
        self.state.sort_key = key;
        self.state.sort_ascending = ascending;
        self.recompute_projection();
    }

    /// Replaces the catalog wholesale; entries from prior loads are discarded.
    pub fn replace_entries(&mut self, entries: Vec<CatalogEntry>) {
        self.entries = entries;
        self.recompute_projection();
    }

    pub fn apply_enrichment(
        &mut self,
        app_id: u32,
        tier: CompatibilityTier,
        active_players: i64,
        state: EnrichmentState,
    ) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.app_id == app_id) else {
            return false;
        };
        entry.compatibility_tier = tier;
        entry.active_players = active_players.max(0);
        entry.enrichment_state = state;
        true
    }

    pub fn recompute_projection(&mut self) {
        let term = self.state.search_term.trim().to_lowercase();
        self.expanded_term = if term.is_empty() {
            None
        } else {
            Some(
                self.aliases
                    .expand(&term)
                    .unwrap_or(term.as_str())
                    .to_string(),
            )
        };

        let mut matched: Vec<usize> = Vec::new();
        let mut hidden: Vec<usize> = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            let is_match = match self.expanded_term.as_deref() {
                Some(needle) => entry_matches(entry, needle),
                None => true,
            };
            if is_match {
                matched.push(index);
            } else {
                hidden.push(index);
            }
        }

        let key = self.state.sort_key;
        let ascending = self.state.sort_ascending;
        let entries = &self.entries;
        matched.sort_by(|&a, &b| compare_entries(&entries[a], &entries[b], key, ascending));

        self.matched = matched.len();
        self.order = matched;
        // Filtered-out entries stay addressable, after the matches, in catalog order.
        self.order.extend(hidden);
    }

    pub fn rows(&self) -> Vec<ProjectionRow<'_>> {
        self.order
            .iter()
            .enumerate()
            .map(|(position, &index)| ProjectionRow {
                entry: &self.entries[index],
                matched: position < self.matched,
            })
            .collect()
    }

    pub fn matched_count(&self) -> usize {
        self.matched
    }

    /// Raw and alias-expanded terms, for highlight spans computed by the
    /// presentation layer.
    pub fn search_terms(&self) -> Option<(&str, &str)> {
        self.expanded_term
            .as_deref()
            .map(|expanded| (self.state.search_term.trim(), expanded))
    }
}

fn entry_matches(entry: &CatalogEntry, needle: &str) -> bool {
    if entry.name.to_lowercase().contains(needle) {
        return true;
    }
    entry
        .owners
        .iter()
        .map(|owner| owner.name.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
        .contains(needle)
}

fn compare_entries(a: &CatalogEntry, b: &CatalogEntry, key: SortKey, ascending: bool) -> Ordering {
    let ordering = match key {
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Playtime => a.total_playtime_minutes.cmp(&b.total_playtime_minutes),
        SortKey::Popularity => a.active_players.cmp(&b.active_players),
        SortKey::Compatibility => a
            .compatibility_tier
            .rank()
            .cmp(&b.compatibility_tier.rank()),
    };
    // For playtime and popularity the ascending flag means highest value first.
    let forward = if matches!(key, SortKey::Playtime | SortKey::Popularity) {
        !ascending
    } else {
        ascending
    };
    if forward {
        ordering
    } else {
        ordering.reverse()
    }
}
