// src/registry.rs
use crate::geo::GeoPoint;
use anyhow::Context;
use serde::Deserialize;
use std::{collections::BTreeMap, path::Path};

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
}

/// On-disk shape of one entry: `{"name": "...", "lat": 0.0, "lon": 0.0}`.
#[derive(Deserialize)]
struct ClassEntry {
    name: String,
    lat: f64,
    lon: f64,
}

/// Read-only class id -> location table. Built once at startup.
#[derive(Debug, Clone, Default)]
pub struct LocationRegistry {
    classes: BTreeMap<String, ClassRecord>,
}

impl LocationRegistry {
    pub fn new(records: impl IntoIterator<Item = ClassRecord>) -> Self {
        let classes = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self { classes }
    }

    pub fn builtin() -> Self {
        Self::new([
            ClassRecord {
                id: "CS101".into(),
                name: "Computer Science Building, Room 101".into(),
                location: GeoPoint::new(16.7953091, 80.8228997),
            },
            ClassRecord {
                id: "PHY203".into(),
                name: "Physics Hall, Room 203".into(),
                location: GeoPoint::new(40.712776, -74.005974),
            },
        ])
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let entries: BTreeMap<String, ClassEntry> =
            serde_json::from_str(raw).context("class table is not valid JSON")?;

        let mut records = Vec::with_capacity(entries.len());
        for (id, e) in entries {
            if id.trim().is_empty() {
                anyhow::bail!("class table contains an empty class id");
            }
            let location = GeoPoint::validated(e.lat, e.lon)
                .map_err(|err| anyhow::anyhow!("class {id}: bad coordinates ({err:?})"))?;
            records.push(ClassRecord { id, name: e.name, location });
        }
        Ok(Self::new(records))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading class table {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("loading class table {}", path.display()))
    }

    pub fn get(&self, class_id: &str) -> Option<&ClassRecord> {
        self.classes.get(class_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassRecord> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
