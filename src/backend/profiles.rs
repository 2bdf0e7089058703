use crate::backend::error::WorkspaceError;
use crate::backend::models::{
    now_ms, ConnectionProfile, DialectVersion, ProfileConfig, V1Config, V2Config,
};
use crate::backend::storage::Storage;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::RwLock;

/// Outcome of running one stored record through the legacy migration: the
/// shape it was recognized as, or the untouched record when it matched
/// neither known layout.
#[derive(Debug, Clone, PartialEq)]
pub enum MigratedProfile {
    V1(ConnectionProfile),
    V2(ConnectionProfile),
    Unrecognized(Value),
}

impl MigratedProfile {
    pub fn into_profile(self) -> Option<ConnectionProfile> {
        match self {
            MigratedProfile::V1(profile) | MigratedProfile::V2(profile) => Some(profile),
            MigratedProfile::Unrecognized(_) => None,
        }
    }
}

/// Migrates one untyped record into the current profile schema.
///
/// Records already carrying a `version` tag pass through as-is, so running
/// the migration twice is a no-op. Untagged records are classified by
/// field shape: token + org means a v2-style config, a database field
/// means v1. Anything else is handed back unchanged for the UI to surface.
pub fn migrate_legacy(raw: &Value) -> MigratedProfile {
    let Some(record) = raw.as_object() else {
        return MigratedProfile::Unrecognized(raw.clone());
    };

    if record.contains_key("version") {
        return match serde_json::from_value::<ConnectionProfile>(raw.clone()) {
            Ok(profile) if profile.config.matches_version(profile.version) => {
                match profile.config {
                    ProfileConfig::V1(_) => MigratedProfile::V1(profile),
                    ProfileConfig::V2(_) => MigratedProfile::V2(profile),
                }
            }
            _ => MigratedProfile::Unrecognized(raw.clone()),
        };
    }

    let Some(id) = str_field(record, "id") else {
        return MigratedProfile::Unrecognized(raw.clone());
    };
    let name = str_field(record, "name").unwrap_or_else(|| "Unnamed".to_string());
    let host = str_field(record, "host").unwrap_or_else(|| "localhost".to_string());
    let port = u64_field(record, "port").unwrap_or(8086) as u16;
    let use_ssl = bool_field(record, "useSsl").unwrap_or(false);
    let timeout_ms = u64_field(record, "timeout")
        .or_else(|| u64_field(record, "timeoutMs"))
        .unwrap_or(5000);
    let now = now_ms();
    let created_at = u64_field(record, "created_at")
        .or_else(|| u64_field(record, "createdAt"))
        .unwrap_or(now);
    let updated_at = u64_field(record, "updated_at")
        .or_else(|| u64_field(record, "updatedAt"))
        .unwrap_or(now);

    if let (Some(token), Some(org)) = (str_field(record, "token"), str_field(record, "org")) {
        let profile = ConnectionProfile {
            id,
            name,
            version: DialectVersion::V2,
            config: ProfileConfig::V2(V2Config {
                host,
                port,
                token,
                org,
                bucket: str_field(record, "bucket"),
                use_ssl,
                timeout_ms,
            }),
            created_at,
            updated_at,
        };
        return MigratedProfile::V2(profile);
    }

    if let Some(database) = str_field(record, "database") {
        let profile = ConnectionProfile {
            id,
            name,
            version: DialectVersion::V1,
            config: ProfileConfig::V1(V1Config {
                host,
                port,
                database,
                username: str_field(record, "username"),
                password: str_field(record, "password"),
                use_ssl,
                timeout_ms,
            }),
            created_at,
            updated_at,
        };
        return MigratedProfile::V1(profile);
    }

    MigratedProfile::Unrecognized(raw.clone())
}

fn str_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn u64_field(record: &Map<String, Value>, key: &str) -> Option<u64> {
    record.get(key).and_then(Value::as_u64)
}

fn bool_field(record: &Map<String, Value>, key: &str) -> Option<bool> {
    record.get(key).and_then(Value::as_bool)
}

/// Partial profile patch; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub version: Option<DialectVersion>,
    pub config: Option<ProfileConfig>,
}

/// Owns the stored connection profiles. Every mutation persists the full
/// list; unrecognized legacy records ride along so a newer record format
/// is never silently destroyed by an older reader.
pub struct ProfileStore {
    profiles: RwLock<Vec<ConnectionProfile>>,
    unrecognized: RwLock<Vec<Value>>,
    storage: Storage,
}

impl ProfileStore {
    pub fn load(storage: Storage) -> Self {
        let mut profiles = Vec::new();
        let mut unrecognized = Vec::new();
        for raw in storage.load_raw_connections() {
            match migrate_legacy(&raw) {
                MigratedProfile::V1(profile) | MigratedProfile::V2(profile) => {
                    profiles.push(profile)
                }
                MigratedProfile::Unrecognized(value) => {
                    tracing::warn!("Unrecognized connection record kept for inspection");
                    unrecognized.push(value);
                }
            }
        }
        Self {
            profiles: RwLock::new(profiles),
            unrecognized: RwLock::new(unrecognized),
            storage,
        }
    }

    /// Upserts by id. Inserts stamp both timestamps; updates keep the
    /// original creation time and refresh only `updated_at`.
    pub fn add_or_update(
        &self,
        mut profile: ConnectionProfile,
    ) -> Result<ConnectionProfile, WorkspaceError> {
        ensure_config_shape(&profile)?;
        let now = now_ms();
        {
            let mut profiles = self.profiles.write().expect("profile store poisoned");
            match profiles.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => {
                    profile.created_at = existing.created_at;
                    profile.updated_at = now;
                    *existing = profile.clone();
                }
                None => {
                    profile.created_at = now;
                    profile.updated_at = now;
                    profiles.push(profile.clone());
                }
            }
        }
        self.persist()?;
        Ok(profile)
    }

    pub fn update(
        &self,
        id: &str,
        patch: ProfileUpdate,
    ) -> Result<ConnectionProfile, WorkspaceError> {
        let updated = {
            let mut profiles = self.profiles.write().expect("profile store poisoned");
            let slot = profiles
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| WorkspaceError::ProfileNotFound(id.to_string()))?;
            let mut candidate = slot.clone();
            if let Some(name) = patch.name {
                candidate.name = name;
            }
            if let Some(version) = patch.version {
                candidate.version = version;
            }
            if let Some(config) = patch.config {
                candidate.config = config;
            }
            candidate.updated_at = now_ms();
            ensure_config_shape(&candidate)?;
            *slot = candidate.clone();
            candidate
        };
        self.persist()?;
        Ok(updated)
    }

    /// Removes the profile. Session cleanup is the owning workspace's
    /// concern; this only touches stored data.
    pub fn remove(&self, id: &str) -> Result<bool, WorkspaceError> {
        let removed = {
            let mut profiles = self.profiles.write().expect("profile store poisoned");
            let before = profiles.len();
            profiles.retain(|p| p.id != id);
            profiles.len() != before
        };
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<ConnectionProfile> {
        self.profiles
            .read()
            .expect("profile store poisoned")
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn list_active(&self) -> Vec<ConnectionProfile> {
        self.profiles.read().expect("profile store poisoned").clone()
    }

    /// Legacy records that matched no known shape, for UI inspection.
    pub fn unrecognized(&self) -> Vec<Value> {
        self.unrecognized
            .read()
            .expect("profile store poisoned")
            .clone()
    }

    fn persist(&self) -> Result<(), WorkspaceError> {
        let profiles = self.profiles.read().expect("profile store poisoned");
        let unrecognized = self.unrecognized.read().expect("profile store poisoned");
        self.storage.save_connections(&profiles, &unrecognized)
    }
}

fn ensure_config_shape(profile: &ConnectionProfile) -> Result<(), WorkspaceError> {
    if profile.config.matches_version(profile.version) {
        Ok(())
    } else {
        Err(WorkspaceError::Validation(format!(
            "Profile '{}' carries a config shape that does not match its dialect version",
            profile.id
        )))
    }
}

const CSV_HEADERS: [&str; 13] = [
    "id",
    "name",
    "version",
    "host",
    "port",
    "database",
    "username",
    "password",
    "token",
    "org",
    "bucket",
    "useSsl",
    "timeoutMs",
];

/// Reads profiles from a CSV export. Rows are treated as untyped legacy
/// documents and funneled through `migrate_legacy`, so foreign CSVs
/// degrade to `Unrecognized` instead of failing the import.
pub fn import_profiles(path: &Path) -> Result<Vec<MigratedProfile>, WorkspaceError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "csv" {
        return Err(WorkspaceError::Validation(
            "Only CSV files are supported".to_string(),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| WorkspaceError::Storage(format!("Failed to read CSV: {e}")))?;
    let headers = reader
        .headers()
        .map_err(|e| WorkspaceError::Storage(format!("Failed to read CSV headers: {e}")))?
        .clone();

    let mut results = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| WorkspaceError::Storage(format!("Failed to read CSV record: {e}")))?;
        let mut doc = Map::new();
        let mut version = None;
        for (idx, value) in record.iter().enumerate() {
            let Some(key) = headers.get(idx) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match key {
                "version" => version = serde_json::from_value(Value::String(value.to_string())).ok(),
                "port" | "timeoutMs" => {
                    if let Ok(number) = value.parse::<u64>() {
                        doc.insert(key.to_string(), Value::from(number));
                    }
                }
                "useSsl" => {
                    if let Ok(flag) = value.parse::<bool>() {
                        doc.insert(key.to_string(), Value::from(flag));
                    }
                }
                _ => {
                    doc.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
        }

        let mut migrated = migrate_legacy(&Value::Object(doc));
        // The version column survives the round trip when it agrees with
        // the config shape the row actually carried (v3 stays v3).
        if let Some(version) = version {
            migrated = match migrated {
                MigratedProfile::V1(mut p) if p.config.matches_version(version) => {
                    p.version = version;
                    MigratedProfile::V1(p)
                }
                MigratedProfile::V2(mut p) if p.config.matches_version(version) => {
                    p.version = version;
                    MigratedProfile::V2(p)
                }
                other => other,
            };
        }
        results.push(migrated);
    }

    Ok(results)
}

pub fn export_profiles(path: &Path, profiles: &[ConnectionProfile]) -> Result<(), WorkspaceError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| WorkspaceError::Storage(format!("Failed to create CSV: {e}")))?;

    writer
        .write_record(CSV_HEADERS)
        .map_err(|e| WorkspaceError::Storage(format!("Failed to write CSV headers: {e}")))?;

    for profile in profiles {
        let version = serde_json::to_value(profile.version)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let record: [String; 13] = match &profile.config {
            ProfileConfig::V1(config) => [
                profile.id.clone(),
                profile.name.clone(),
                version,
                config.host.clone(),
                config.port.to_string(),
                config.database.clone(),
                config.username.clone().unwrap_or_default(),
                config.password.clone().unwrap_or_default(),
                String::new(),
                String::new(),
                String::new(),
                config.use_ssl.to_string(),
                config.timeout_ms.to_string(),
            ],
            ProfileConfig::V2(config) => [
                profile.id.clone(),
                profile.name.clone(),
                version,
                config.host.clone(),
                config.port.to_string(),
                String::new(),
                String::new(),
                String::new(),
                config.token.clone(),
                config.org.clone(),
                config.bucket.clone().unwrap_or_default(),
                config.use_ssl.to_string(),
                config.timeout_ms.to_string(),
            ],
        };
        writer
            .write_record(&record)
            .map_err(|e| WorkspaceError::Storage(format!("Failed to write CSV record: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| WorkspaceError::Storage(format!("Failed to flush CSV: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::test_support::{scratch_dir, scratch_storage};
    use serde_json::json;

    fn v1_profile(id: &str) -> ConnectionProfile {
        ConnectionProfile {
            id: id.to_string(),
            name: format!("profile {id}"),
            version: DialectVersion::V1,
            config: ProfileConfig::V1(V1Config {
                host: "localhost".to_string(),
                port: 8086,
                database: "metrics".to_string(),
                username: Some("admin".to_string()),
                password: Some("secret".to_string()),
                use_ssl: false,
                timeout_ms: 5000,
            }),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn migrates_legacy_v1_records() {
        let raw = json!({
            "id": "c1",
            "name": "local",
            "host": "db.example.com",
            "port": 8086,
            "database": "metrics",
            "username": "admin"
        });
        let MigratedProfile::V1(profile) = migrate_legacy(&raw) else {
            panic!("expected a v1 classification");
        };
        assert_eq!(profile.version, DialectVersion::V1);
        let ProfileConfig::V1(config) = profile.config else {
            panic!("expected a v1 config");
        };
        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.database, "metrics");
        assert_eq!(config.username.as_deref(), Some("admin"));
        // Defaults applied when the legacy record lacks them.
        assert!(!config.use_ssl);
        assert_eq!(config.timeout_ms, 5000);
    }

    #[test]
    fn token_and_org_win_over_database() {
        let raw = json!({
            "id": "c2",
            "name": "cloud",
            "host": "cloud.example.com",
            "port": 8086,
            "database": "ignored",
            "token": "tok",
            "org": "acme"
        });
        let MigratedProfile::V2(profile) = migrate_legacy(&raw) else {
            panic!("expected a v2 classification");
        };
        assert_eq!(profile.version, DialectVersion::V2);
    }

    #[test]
    fn unmatched_records_pass_through_unchanged() {
        let raw = json!({"id": "weird", "kind": "ldap"});
        assert_eq!(
            migrate_legacy(&raw),
            MigratedProfile::Unrecognized(raw.clone())
        );
        let raw = json!("not even an object");
        assert_eq!(
            migrate_legacy(&raw),
            MigratedProfile::Unrecognized(raw.clone())
        );
    }

    #[test]
    fn migration_is_idempotent() {
        let raw = json!({
            "id": "c1",
            "name": "local",
            "host": "localhost",
            "port": 8086,
            "database": "metrics"
        });
        let MigratedProfile::V1(once) = migrate_legacy(&raw) else {
            panic!("expected a v1 classification");
        };
        let reserialized = serde_json::to_value(&once).unwrap();
        let MigratedProfile::V1(twice) = migrate_legacy(&reserialized) else {
            panic!("expected a v1 classification on the second pass");
        };
        assert_eq!(once, twice);
    }

    #[test]
    fn tagged_record_with_mismatched_config_is_unrecognized() {
        let raw = json!({
            "id": "c9",
            "name": "odd",
            "version": "v1.x",
            "config": {
                "host": "h", "port": 1, "token": "t", "org": "o",
                "useSsl": false, "timeoutMs": 5000
            },
            "createdAt": 1,
            "updatedAt": 1
        });
        assert!(matches!(
            migrate_legacy(&raw),
            MigratedProfile::Unrecognized(_)
        ));
    }

    #[test]
    fn upsert_stamps_timestamps() {
        let store = ProfileStore::load(scratch_storage("upsert"));
        let inserted = store.add_or_update(v1_profile("c1")).unwrap();
        assert!(inserted.created_at > 0);
        assert_eq!(inserted.created_at, inserted.updated_at);

        let mut edited = inserted.clone();
        edited.name = "renamed".to_string();
        let updated = store.add_or_update(edited).unwrap();
        assert_eq!(updated.created_at, inserted.created_at);
        assert!(updated.updated_at >= inserted.updated_at);
        assert_eq!(store.list_active().len(), 1);
    }

    #[test]
    fn partial_update_refreshes_updated_at_only() {
        let store = ProfileStore::load(scratch_storage("patch"));
        let inserted = store.add_or_update(v1_profile("c1")).unwrap();
        let patched = store
            .update(
                "c1",
                ProfileUpdate {
                    name: Some("patched".to_string()),
                    ..ProfileUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(patched.name, "patched");
        assert_eq!(patched.created_at, inserted.created_at);

        let missing = store.update("nope", ProfileUpdate::default());
        assert!(matches!(missing, Err(WorkspaceError::ProfileNotFound(_))));
    }

    #[test]
    fn mismatched_config_shape_is_rejected() {
        let store = ProfileStore::load(scratch_storage("shape"));
        let mut profile = v1_profile("c1");
        profile.version = DialectVersion::V2;
        assert!(matches!(
            store.add_or_update(profile),
            Err(WorkspaceError::Validation(_))
        ));
    }

    #[test]
    fn store_reloads_and_migrates_persisted_records() {
        let storage = scratch_storage("reload");
        {
            let store = ProfileStore::load(storage.clone());
            store.add_or_update(v1_profile("c1")).unwrap();
        }
        let store = ProfileStore::load(storage);
        assert_eq!(store.list_active().len(), 1);
        assert_eq!(store.get("c1").unwrap().name, "profile c1");
    }

    #[test]
    fn unrecognized_records_survive_a_save_cycle() {
        let storage = scratch_storage("keep-unrecognized");
        let weird = json!({"id": "weird", "kind": "ldap"});
        storage.save_connections(&[], &[weird.clone()]).unwrap();

        let store = ProfileStore::load(storage.clone());
        assert_eq!(store.unrecognized(), vec![weird.clone()]);
        store.add_or_update(v1_profile("c1")).unwrap();

        let reloaded = ProfileStore::load(storage);
        assert_eq!(reloaded.list_active().len(), 1);
        assert_eq!(reloaded.unrecognized(), vec![weird]);
    }

    #[test]
    fn csv_round_trip_reclassifies_profiles() {
        let dir = scratch_dir("csv");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("profiles.csv");

        let mut v3 = v1_profile("c3");
        v3.id = "c3".to_string();
        v3.version = DialectVersion::V3;
        v3.config = ProfileConfig::V2(V2Config {
            host: "cloud.example.com".to_string(),
            port: 443,
            token: "tok".to_string(),
            org: "acme".to_string(),
            bucket: None,
            use_ssl: true,
            timeout_ms: 9000,
        });
        let profiles = vec![v1_profile("c1"), v3];
        export_profiles(&path, &profiles).unwrap();

        let imported = import_profiles(&path).unwrap();
        assert_eq!(imported.len(), 2);
        let MigratedProfile::V1(first) = &imported[0] else {
            panic!("expected v1 classification");
        };
        assert_eq!(first.id, "c1");
        let MigratedProfile::V2(second) = &imported[1] else {
            panic!("expected v2 classification");
        };
        assert_eq!(second.version, DialectVersion::V3);
        assert!(matches!(second.config, ProfileConfig::V2(_)));
    }

    #[test]
    fn import_rejects_non_csv_paths() {
        let err = import_profiles(Path::new("profiles.properties")).unwrap_err();
        assert!(matches!(err, WorkspaceError::Validation(_)));
    }
}
