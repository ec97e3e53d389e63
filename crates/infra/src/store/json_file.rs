use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, instrument};

use parque_events::MovementEvent;
use parque_inventory::{MaterialRecord, default_catalog};

use super::r#trait::{InventoryStore, StoreError};
use super::schema::{self, CURRENT_SCHEMA_VERSION, Document, RawDocument};
use crate::config::StoreConfig;

/// Data directory with one JSON document per collection.
///
/// Every write goes to a temporary file in the same directory which is then
/// renamed over the target, so readers never observe a half-written document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub const MATERIALS_FILE: &'static str = "materials.json";
    pub const EVENTS_FILE: &'static str = "movements.json";

    /// Open (and if needed create or upgrade) the data directory.
    ///
    /// - missing documents are created at the current schema version, seeding
    ///   the default catalog when `config.seed_default_catalog` is set
    /// - older documents are upgraded in place
    /// - newer documents are refused with `StoreError::UnsupportedSchema`
    #[instrument(skip(config), fields(data_dir = %config.data_dir.display()), err)]
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.data_dir).map_err(|e| StoreError::io(&config.data_dir, e))?;
        let store = Self {
            dir: config.data_dir.clone(),
        };
        store.initialize(config.seed_default_catalog)?;
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn initialize(&self, seed: bool) -> Result<(), StoreError> {
        let materials = self.read_raw(Self::MATERIALS_FILE)?;
        let events = self.read_raw(Self::EVENTS_FILE)?;

        let up_to_date = materials.as_ref().is_some_and(RawDocument::is_current)
            && events.as_ref().is_some_and(RawDocument::is_current);
        if up_to_date {
            debug!("data directory is at the current schema version");
            return Ok(());
        }

        let fresh_catalog = materials.is_none();
        let upgraded = materials.as_ref().is_some_and(|m| !m.is_current())
            || events.as_ref().is_some_and(|e| !e.is_current());

        let (mut records, events) = schema::decode(
            Self::MATERIALS_FILE,
            materials.unwrap_or_else(RawDocument::empty),
            Self::EVENTS_FILE,
            events.unwrap_or_else(RawDocument::empty),
        )?;

        if fresh_catalog && seed {
            records = default_catalog();
            info!(materials = records.len(), "seeded default catalog");
        }
        if upgraded {
            info!(
                to_version = CURRENT_SCHEMA_VERSION,
                materials = records.len(),
                events = events.len(),
                "upgraded data directory schema"
            );
        }

        self.commit(&records, &events)
    }

    fn read_raw(&self, file: &str) -> Result<Option<RawDocument>, StoreError> {
        let path = self.path(file);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
            what: file.to_string(),
            message: e.to_string(),
        })?;
        RawDocument::identify(file, value).map(Some)
    }

    fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, StoreError> {
        match self.read_raw(file)? {
            None => Ok(Vec::new()),
            Some(doc) if doc.is_current() => schema::decode_records(file, doc.records),
            // Replaced behind our back after `open` ran the upgrade.
            Some(doc) => Err(StoreError::UnsupportedSchema {
                file: file.to_string(),
                found: doc.version,
                supported: CURRENT_SCHEMA_VERSION,
            }),
        }
    }

    fn stage<T: Serialize>(&self, file: &str, records: &[T]) -> Result<NamedTempFile, StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &Document::current(records)).map_err(|e| {
                StoreError::Serialization {
                    what: file.to_string(),
                    message: e.to_string(),
                }
            })?;
            writer.flush().map_err(|e| StoreError::io(self.path(file), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(self.path(file), e))?;
        Ok(tmp)
    }

    fn persist(&self, tmp: NamedTempFile, file: &str) -> Result<(), StoreError> {
        let path = self.path(file);
        tmp.persist(&path).map_err(|e| StoreError::io(path, e.error))?;
        Ok(())
    }

    fn restore(&self, file: &str, previous: Option<Vec<u8>>) -> Result<(), StoreError> {
        let path = self.path(file);
        match previous {
            Some(bytes) => {
                let mut tmp =
                    NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
                tmp.write_all(&bytes).map_err(|e| StoreError::io(&path, e))?;
                self.persist(tmp, file)
            }
            None => match fs::remove_file(&path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(StoreError::io(path, e)),
                _ => Ok(()),
            },
        }
    }
}

impl InventoryStore for JsonFileStore {
    fn load_materials(&self) -> Result<Vec<MaterialRecord>, StoreError> {
        self.load(Self::MATERIALS_FILE)
    }

    fn save_materials(&self, materials: &[MaterialRecord]) -> Result<(), StoreError> {
        let tmp = self.stage(Self::MATERIALS_FILE, materials)?;
        self.persist(tmp, Self::MATERIALS_FILE)
    }

    fn load_events(&self) -> Result<Vec<MovementEvent>, StoreError> {
        self.load(Self::EVENTS_FILE)
    }

    fn save_events(&self, events: &[MovementEvent]) -> Result<(), StoreError> {
        let tmp = self.stage(Self::EVENTS_FILE, events)?;
        self.persist(tmp, Self::EVENTS_FILE)
    }

    /// Stage both documents fully before renaming either into place.
    #[instrument(skip_all, fields(materials = materials.len(), events = events.len()), err)]
    fn commit(
        &self,
        materials: &[MaterialRecord],
        events: &[MovementEvent],
    ) -> Result<(), StoreError> {
        let staged_materials = self.stage(Self::MATERIALS_FILE, materials)?;
        let staged_events = self.stage(Self::EVENTS_FILE, events)?;

        let previous = match fs::read(self.path(Self::MATERIALS_FILE)) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(StoreError::io(self.path(Self::MATERIALS_FILE), e)),
        };

        self.persist(staged_materials, Self::MATERIALS_FILE)?;
        if let Err(err) = self.persist(staged_events, Self::EVENTS_FILE) {
            if let Err(rollback) = self.restore(Self::MATERIALS_FILE, previous) {
                error!(error = %rollback, "failed to restore materials after movement write failure");
            }
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parque_core::MaterialId;
    use serde_json::json;

    fn open(dir: &Path, seed: bool) -> JsonFileStore {
        let config = StoreConfig::new(dir);
        let config = if seed { config } else { config.without_seed() };
        JsonFileStore::open(&config).unwrap()
    }

    fn temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
            .count()
    }

    #[test]
    fn fresh_directory_is_seeded_at_current_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), true);

        let materials = store.load_materials().unwrap();
        assert_eq!(materials.len(), 5);
        assert!(store.load_events().unwrap().is_empty());

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join(JsonFileStore::MATERIALS_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw["schema_version"], json!(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn fresh_directory_without_seed_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), false);
        assert!(store.load_materials().unwrap().is_empty());
    }

    #[test]
    fn reopening_keeps_existing_data() {
        let dir = tempfile::tempdir().unwrap();
        let first = open(dir.path(), true);
        let ids: Vec<MaterialId> = first.load_materials().unwrap().iter().map(|m| m.id).collect();

        let second = open(dir.path(), true);
        let again: Vec<MaterialId> = second.load_materials().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn save_is_full_replace_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), false);
        let helmet = MaterialRecord::new(MaterialId::new(), Some("ppe"), "Helmet", 5, None);

        store.save_materials(&[helmet.clone()]).unwrap();
        store.save_materials(&[helmet.clone()]).unwrap();
        assert_eq!(store.load_materials().unwrap(), vec![helmet]);

        store.save_materials(&[]).unwrap();
        assert!(store.load_materials().unwrap().is_empty());
    }

    #[test]
    fn legacy_directory_is_upgraded_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(JsonFileStore::MATERIALS_FILE),
            json!([
                {"material": "Pala inglesa", "cantidad_total": 10, "en_parque": 8, "fuera_parque": 2, "unidad": "uds"}
            ])
            .to_string(),
        )
        .unwrap();
        fs::write(
            dir.path().join(JsonFileStore::EVENTS_FILE),
            json!([
                {"usuario": "parquista", "material": "Pala inglesa", "cantidad": 2, "accion": "Sacar", "hora": "2024-05-01 08:30:00", "observacion": "maniobras"}
            ])
            .to_string(),
        )
        .unwrap();

        let store = open(dir.path(), true);
        let materials = store.load_materials().unwrap();
        let events = store.load_events().unwrap();
        assert_eq!(materials.len(), 1, "legacy catalog must not be replaced by the seed");
        assert_eq!(materials[0].checked_out, 2);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].material_id, materials[0].id);
        assert_eq!(events[0].note.as_deref(), Some("maniobras"));

        // Second open sees current documents and leaves ids alone.
        let reopened = open(dir.path(), true);
        assert_eq!(reopened.load_materials().unwrap(), materials);
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(JsonFileStore::MATERIALS_FILE),
            json!({"schema_version": 99, "records": []}).to_string(),
        )
        .unwrap();
        let err = JsonFileStore::open(&StoreConfig::new(dir.path())).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedSchema { found: 99, .. }));
    }

    #[test]
    fn garbage_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(JsonFileStore::EVENTS_FILE), "{not json").unwrap();
        let err = JsonFileStore::open(&StoreConfig::new(dir.path())).unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[test]
    fn commit_writes_both_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), false);
        let helmet = MaterialRecord::new(MaterialId::new(), None, "Helmet", 5, None);
        store.commit(&[helmet.clone()], &[]).unwrap();
        assert_eq!(store.load_materials().unwrap(), vec![helmet]);
        assert!(store.load_events().unwrap().is_empty());

        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn failed_movement_rename_restores_materials() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), false);
        let helmet = MaterialRecord::new(MaterialId::new(), None, "Helmet", 5, None);
        store.commit(&[helmet.clone()], &[]).unwrap();

        let materials_path = dir.path().join(JsonFileStore::MATERIALS_FILE);
        let before = fs::read(&materials_path).unwrap();

        // A non-empty directory cannot be renamed over.
        let events_path = dir.path().join(JsonFileStore::EVENTS_FILE);
        fs::remove_file(&events_path).unwrap();
        fs::create_dir(&events_path).unwrap();
        fs::write(events_path.join("keep"), b"x").unwrap();

        let mut renamed = helmet.clone();
        renamed.name = "Casco".to_string();
        let err = store.commit(&[renamed], &[]).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));

        assert_eq!(fs::read(&materials_path).unwrap(), before);
        assert_eq!(store.load_materials().unwrap(), vec![helmet]);
        assert!(events_path.is_dir());
        assert_eq!(temp_files(dir.path()), 0);
    }
}
