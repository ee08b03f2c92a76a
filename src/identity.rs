use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::{debug, warn};

const IDENTITIES_FILE: &str = "identities.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnedGame {
    pub app_id: u32,
    pub name: String,
    #[serde(default)]
    pub playtime_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub games: Vec<OwnedGame>,
    pub last_synced_at: i64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not an identity object")]
    NotAnObject,
    #[error("identity id is missing or empty")]
    MissingId,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    #[serde(default)]
    id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    avatar_url: String,
    #[serde(default, deserialize_with = "games_or_empty")]
    games: Vec<OwnedGame>,
    #[serde(default)]
    last_synced_at: Option<i64>,
}

// Wrong-shape games collapse to empty; parseable elements of an array survive.
fn games_or_empty<'de, D>(deserializer: D) -> Result<Vec<OwnedGame>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

pub fn validate_record(value: Value, now: i64) -> Result<Identity, RecordError> {
    let record: StoredIdentity =
        serde_json::from_value(value).map_err(|_| RecordError::NotAnObject)?;
    if record.id.trim().is_empty() {
        return Err(RecordError::MissingId);
    }
    let display_name = if record.display_name.trim().is_empty() {
        record.id.clone()
    } else {
        record.display_name
    };
    Ok(Identity {
        id: record.id,
        display_name,
        avatar_url: record.avatar_url,
        games: record.games,
        last_synced_at: record.last_synced_at.unwrap_or(now),
    })
}

pub struct IdentityStore {
    path: PathBuf,
    identities: Vec<Identity>,
}

impl IdentityStore {
    pub fn open(data_dir: &Path) -> Self {
        let mut store = Self {
            path: data_dir.join(IDENTITIES_FILE),
            identities: Vec::new(),
        };
        store.load();
        store
    }

    pub fn load(&mut self) -> &[Identity] {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("no identity record found, starting empty");
                self.identities = Vec::new();
                self.save();
                return &self.identities;
            }
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!("identity record unparsable, resetting: {err}");
                self.identities = Vec::new();
                self.save();
                return &self.identities;
            }
        };

        let Value::Array(items) = value else {
            warn!("identity record is not a sequence, resetting");
            self.identities = Vec::new();
            self.save();
            return &self.identities;
        };

        let now = unix_now();
        self.identities = items
            .into_iter()
            .filter_map(|item| match validate_record(item, now) {
                Ok(identity) => Some(identity),
                Err(err) => {
                    warn!("dropping invalid identity record: {err}");
                    None
                }
            })
            .collect();
        // Persist the validated set so repeated loads are idempotent.
        self.save();
        &self.identities
    }

    pub fn save(&self) -> bool {
        let raw = match serde_json::to_string_pretty(&self.identities) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("failed to serialize identities: {err}");
                return false;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!("failed to create data dir: {err}");
                return false;
            }
        }
        match fs::write(&self.path, raw) {
            Ok(()) => true,
            Err(err) => {
                warn!("failed to write identity record: {err}");
                false
            }
        }
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn ids(&self) -> Vec<String> {
        self.identities
            .iter()
            .map(|identity| identity.id.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Identity> {
        self.identities.iter().find(|identity| identity.id == id)
    }

    pub fn upsert(&mut self, identity: Identity) -> bool {
        match self
            .identities
            .iter()
            .position(|existing| existing.id == identity.id)
        {
            Some(index) => self.identities[index] = identity,
            None => self.identities.push(identity),
        }
        self.save()
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.identities.retain(|identity| identity.id != id);
        self.save()
    }
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn identity(id: &str, games: Vec<OwnedGame>) -> Identity {
        Identity {
            id: id.to_string(),
            display_name: format!("{id}-name"),
            avatar_url: String::new(),
            games,
            last_synced_at: 1_700_000_000,
        }
    }

    #[test]
    fn non_sequence_record_resets_to_empty_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(IDENTITIES_FILE);
        fs::write(&path, "{\"oops\": true}").unwrap();

        let mut store = IdentityStore::open(dir.path());
        assert!(store.identities().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");

        // Idempotent on repeated load.
        store.load();
        assert!(store.identities().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn unparsable_record_resets_to_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(IDENTITIES_FILE), "not json at all").unwrap();

        let store = IdentityStore::open(dir.path());
        assert!(store.identities().is_empty());
    }

    #[test]
    fn missing_games_is_coerced_to_empty_not_dropped() {
        let dir = TempDir::new().unwrap();
        let raw = json!([{ "id": "7656", "display_name": "Alice" }]);
        fs::write(
            dir.path().join(IDENTITIES_FILE),
            serde_json::to_string(&raw).unwrap(),
        )
        .unwrap();

        let store = IdentityStore::open(dir.path());
        assert_eq!(store.identities().len(), 1);
        assert_eq!(store.identities()[0].id, "7656");
        assert!(store.identities()[0].games.is_empty());
        assert!(store.identities()[0].last_synced_at > 0);
    }

    #[test]
    fn wrong_shape_games_is_coerced_to_empty() {
        let record = json!({ "id": "1", "display_name": "A", "games": "nope" });
        let identity = validate_record(record, 10).unwrap();
        assert!(identity.games.is_empty());
        assert_eq!(identity.last_synced_at, 10);
    }

    #[test]
    fn record_without_id_is_dropped() {
        let dir = TempDir::new().unwrap();
        let raw = json!([
            { "display_name": "ghost" },
            { "id": "", "display_name": "blank" },
            { "id": "2", "display_name": "Bob", "games": [], "last_synced_at": 5 }
        ]);
        fs::write(
            dir.path().join(IDENTITIES_FILE),
            serde_json::to_string(&raw).unwrap(),
        )
        .unwrap();

        let store = IdentityStore::open(dir.path());
        assert_eq!(store.identities().len(), 1);
        assert_eq!(store.identities()[0].id, "2");
        assert_eq!(store.identities()[0].last_synced_at, 5);
    }

    #[test]
    fn upsert_replaces_by_id_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut store = IdentityStore::open(dir.path());
        assert!(store.upsert(identity("a", Vec::new())));
        assert!(store.upsert(identity("b", Vec::new())));

        let mut updated = identity("a", Vec::new());
        updated.display_name = "renamed".to_string();
        assert!(store.upsert(updated));
        assert_eq!(store.identities().len(), 2);
        assert_eq!(store.get("a").unwrap().display_name, "renamed");

        let reloaded = IdentityStore::open(dir.path());
        assert_eq!(reloaded.identities().len(), 2);
        assert_eq!(reloaded.get("a").unwrap().display_name, "renamed");
    }

    #[test]
    fn remove_missing_id_leaves_sequence_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut store = IdentityStore::open(dir.path());
        store.upsert(identity("a", Vec::new()));

        assert!(store.remove("not-there"));
        assert_eq!(store.identities().len(), 1);
    }
}
