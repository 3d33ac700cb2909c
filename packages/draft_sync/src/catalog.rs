//! Unit catalog and role database loading.
//!
//! The poller only reports numeric unit ids; the catalog turns them into
//! named, tagged units. Two file layouts are accepted: a plain JSON array of
//! units, or the game's static-data layout (`{"data": {"Aatrox": {...}}}`
//! with string keys).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use lane_inference::{HashMapRoleDatabase, Lane, Unit};

use crate::error::CatalogError;

#[derive(Debug, Default, Clone)]
pub struct UnitCatalog {
    units: HashMap<i64, Unit>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<Unit>),
    StaticData { data: HashMap<String, StaticDataEntry> },
}

#[derive(Deserialize)]
struct StaticDataEntry {
    key: String,
    id: String,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    image: Option<StaticDataImage>,
}

#[derive(Deserialize)]
struct StaticDataImage {
    full: String,
}

impl UnitCatalog {
    pub fn new(units: impl IntoIterator<Item = Unit>) -> Self {
        Self {
            units: units.into_iter().map(|u| (u.key, u)).collect(),
        }
    }

    pub fn from_json(path: &Path, json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let units = match file {
            CatalogFile::List(units) => units,
            CatalogFile::StaticData { data } => data
                .into_values()
                .filter_map(|entry| match entry.key.parse::<i64>() {
                    Ok(key) => Some(Unit {
                        key,
                        id: entry.id,
                        name: entry.name,
                        tags: entry.tags,
                        icon: entry.image.map(|i| i.full),
                    }),
                    Err(_) => {
                        warn!("Skipping catalog entry {} with non-numeric key {:?}", entry.id, entry.key);
                        None
                    }
                })
                .collect(),
        };

        debug!("Loaded {} units from {:?}", units.len(), path);
        Ok(Self::new(units))
    }

    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(path, &json)
    }

    /// Resolve a poller id. Ids `<= 0` mean "no selection".
    pub fn resolve(&self, unit_id: i64) -> Option<&Unit> {
        if unit_id <= 0 {
            return None;
        }
        self.units.get(&unit_id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Parse a role database file: `{"<unit name>": ["TOP", "MID"], ...}`.
///
/// Lane names use the same lenient parsing as poller hints.
pub fn role_database_from_json(path: &Path, json: &str) -> Result<HashMapRoleDatabase, CatalogError> {
    let raw: HashMap<String, Vec<String>> =
        serde_json::from_str(json).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut entries = HashMap::with_capacity(raw.len());
    for (name, lanes) in raw {
        let parsed = lanes
            .iter()
            .map(|lane| {
                lane.parse::<Lane>().map_err(|_| CatalogError::UnknownLane {
                    name: name.clone(),
                    lane: lane.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        entries.insert(name, parsed);
    }
    Ok(HashMapRoleDatabase::new(entries))
}

pub async fn load_role_database(path: &Path) -> Result<HashMapRoleDatabase, CatalogError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    role_database_from_json(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lane_inference::RoleLookup;

    #[test]
    fn loads_plain_unit_list() {
        let catalog = UnitCatalog::from_json(
            Path::new("units.json"),
            r#"[{"key":22,"id":"Ashe","name":"Ashe","tags":["Marksman"]}]"#,
        )
        .unwrap();
        assert_eq!(catalog.resolve(22).map(|u| u.name.as_str()), Some("Ashe"));
        assert!(catalog.resolve(0).is_none());
        assert!(catalog.resolve(-1).is_none());
        assert!(catalog.resolve(23).is_none());
    }

    #[test]
    fn loads_static_data_layout() {
        let json = r#"{
            "type": "champion",
            "data": {
                "MonkeyKing": {"key": "62", "id": "MonkeyKing", "name": "Wukong",
                               "tags": ["Fighter"], "image": {"full": "MonkeyKing.png"}},
                "Broken": {"key": "n/a", "id": "Broken", "name": "Broken"}
            }
        }"#;
        let catalog = UnitCatalog::from_json(Path::new("champion.json"), json).unwrap();
        assert_eq!(catalog.len(), 1);
        let unit = catalog.resolve(62).unwrap();
        assert_eq!(unit.id, "MonkeyKing");
        assert_eq!(unit.name, "Wukong");
        assert_eq!(unit.icon.as_deref(), Some("MonkeyKing.png"));
    }

    #[test]
    fn role_database_parses_client_lane_names() {
        let db = role_database_from_json(
            Path::new("roles.json"),
            r#"{"Pyke": ["utility", "MID"]}"#,
        )
        .unwrap();
        assert_eq!(db.lanes_for("Pyke"), &[Lane::Support, Lane::Mid]);
        assert!(db.lanes_for("Nobody").is_empty());
    }

    #[test]
    fn role_database_rejects_unknown_lanes() {
        let err = role_database_from_json(Path::new("roles.json"), r#"{"Pyke": ["roam"]}"#)
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownLane { .. }));
    }
}
