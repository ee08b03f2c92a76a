use crate::{
    backend::CatalogPayload,
    config::AppSettings,
    identity::Identity,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityTier {
    Platinum,
    Gold,
    Silver,
    Bronze,
    Unknown,
    Error,
}

impl CompatibilityTier {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "platinum" => Self::Platinum,
            "gold" => Self::Gold,
            "silver" => Self::Silver,
            "bronze" => Self::Bronze,
            "unknown" => Self::Unknown,
            _ => Self::Error,
        }
    }

    pub fn rank(self) -> u16 {
        match self {
            Self::Platinum => 1,
            Self::Gold => 2,
            Self::Silver => 3,
            Self::Bronze => 4,
            Self::Unknown => 5,
            Self::Error => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Platinum => "Platinum",
            Self::Gold => "Gold",
            Self::Silver => "Silver",
            Self::Bronze => "Bronze",
            Self::Unknown => "Unknown",
            Self::Error => "Error",
        }
    }

    pub fn is_rated(self) -> bool {
        !matches!(self, Self::Unknown | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentState {
    Pending,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerShare {
    pub name: String,
    pub playtime_minutes: u64,
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub app_id: u32,
    pub name: String,
    pub total_playtime_minutes: u64,
    pub owners: Vec<OwnerShare>,
    pub compatibility_tier: CompatibilityTier,
    pub active_players: i64,
    pub enrichment_state: EnrichmentState,
}

impl CatalogEntry {
    pub fn new(app_id: u32, name: &str) -> Self {
        Self {
            app_id,
            name: name.to_string(),
            total_playtime_minutes: 0,
            owners: Vec::new(),
            compatibility_tier: CompatibilityTier::Unknown,
            active_players: 0,
            enrichment_state: EnrichmentState::Pending,
        }
    }

    fn add_owner(&mut self, name: &str, playtime_minutes: u64) {
        match self.owners.iter_mut().find(|owner| owner.name == name) {
            Some(owner) => owner.playtime_minutes += playtime_minutes,
            None => self.owners.push(OwnerShare {
                name: name.to_string(),
                playtime_minutes,
            }),
        }
    }

    pub fn owner_names(&self) -> Vec<&str> {
        self.owners.iter().map(|owner| owner.name.as_str()).collect()
    }

    pub fn playtime_hours(&self) -> f64 {
        self.total_playtime_minutes as f64 / 60.0
    }

    pub fn surfaced_tier(&self, settings: &AppSettings) -> Option<CompatibilityTier> {
        settings
            .show_compatibility_ratings
            .then_some(self.compatibility_tier)
    }

    pub fn launch_available(&self, settings: &AppSettings) -> bool {
        settings.always_show_launch_affordance || self.compatibility_tier.is_rated()
    }
}

struct CatalogBuilder {
    entries: Vec<CatalogEntry>,
    index: HashMap<u32, usize>,
}

impl CatalogBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn entry_mut(&mut self, app_id: u32, name: &str) -> &mut CatalogEntry {
        let slot = match self.index.get(&app_id) {
            Some(&slot) => slot,
            None => {
                self.entries.push(CatalogEntry::new(app_id, name));
                let slot = self.entries.len() - 1;
                self.index.insert(app_id, slot);
                slot
            }
        };
        &mut self.entries[slot]
    }

    fn finish(mut self) -> Vec<CatalogEntry> {
        for entry in &mut self.entries {
            entry
                .owners
                .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        }
        self.entries
    }
}

/// Merge the identities' cached game lists into a deduplicated catalog,
/// preserving first-seen appid order.
pub fn merge_owned(identities: &[Identity]) -> Vec<CatalogEntry> {
    let mut builder = CatalogBuilder::new();
    for identity in identities {
        for game in &identity.games {
            let entry = builder.entry_mut(game.app_id, &game.name);
            entry.total_playtime_minutes += game.playtime_minutes;
            entry.add_owner(&identity.display_name, game.playtime_minutes);
        }
    }
    builder.finish()
}

pub fn from_payload(payload: CatalogPayload) -> Vec<CatalogEntry> {
    let mut builder = CatalogBuilder::new();
    for game in payload.games {
        let entry = builder.entry_mut(game.appid, &game.name);
        entry.total_playtime_minutes += game.playtime_forever;
        for account in &game.accounts {
            entry.add_owner(&account.name, account.playtime_forever);
        }
    }
    builder.finish()
}
