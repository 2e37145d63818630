//! Tag tables that tune entity semantics.
//!
//! [`AreaKeys`] decides which closed ways are areas, [`DiscardTags`] lists
//! obsolete keys stripped before upload. Both ship with immutable built-in
//! defaults and can be loaded from JSON documents on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use serde::Deserialize;
use thiserror::Error;

use crate::tags::Tags;

/// Error emitted when loading a configuration table.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be opened.
    #[error("failed to read configuration from {path}: {source}")]
    Io {
        /// Location of the configuration document.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The document was not valid JSON for the expected table.
    #[error("failed to parse configuration: {source}")]
    Parse {
        /// Decoder error returned by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
}

fn open(path: &Path) -> Result<BufReader<File>, ConfigError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Key prefixes marking features that no longer (or do not yet) exist.
pub const LIFECYCLE_PREFIXES: [&str; 13] = [
    "proposed",
    "planned",
    "construction",
    "disused",
    "abandoned",
    "was",
    "dismantled",
    "razed",
    "demolished",
    "destroyed",
    "removed",
    "obliterated",
    "intermittent",
];

/// Strip a lifecycle prefix such as `disused:` from a key.
///
/// # Examples
/// ```
/// use osm_edit_core::config::remove_lifecycle_prefix;
///
/// assert_eq!(remove_lifecycle_prefix("disused:railway"), "railway");
/// assert_eq!(remove_lifecycle_prefix("name:en"), "name:en");
/// ```
#[must_use]
pub fn remove_lifecycle_prefix(key: &str) -> &str {
    match key.split_once(':') {
        Some((prefix, rest)) if LIFECYCLE_PREFIXES.contains(&prefix) => rest,
        _ => key,
    }
}

type ValueTable = BTreeMap<String, BTreeSet<String>>;

fn table(entries: &[(&str, &[&str])]) -> ValueTable {
    entries
        .iter()
        .map(|(key, values)| {
            (
                (*key).to_owned(),
                values.iter().map(|v| (*v).to_owned()).collect(),
            )
        })
        .collect()
}

fn default_exceptions() -> ValueTable {
    table(&[
        ("highway", &["elevator", "rest_area", "services"]),
        ("public_transport", &["platform"]),
        (
            "railway",
            &[
                "platform",
                "roundhouse",
                "station",
                "traverser",
                "turntable",
                "wash",
            ],
        ),
        ("waterway", &["dam"]),
        ("amenity", &["bicycle_parking"]),
    ])
}

fn default_keys() -> ValueTable {
    table(&[
        ("addr:*", &[]),
        ("aerialway", &["cable_car", "chair_lift", "drag_lift", "gondola", "goods", "magic_carpet", "mixed_lift", "platter", "rope_tow", "t-bar", "zip_line"]),
        ("aeroway", &["jet_bridge", "parking_position", "runway", "taxilane", "taxiway"]),
        ("amenity", &["bench"]),
        ("area:highway", &[]),
        ("attraction", &["dark_ride", "river_rafting", "summer_toboggan", "train", "water_slide"]),
        ("building", &[]),
        ("building:part", &[]),
        ("craft", &[]),
        ("emergency", &["designated", "destination", "no", "official", "private", "yes"]),
        ("golf", &["cartpath", "hole", "path"]),
        ("healthcare", &[]),
        ("historic", &["citywalls"]),
        ("indoor", &["corridor"]),
        ("landuse", &[]),
        ("leisure", &["slipway", "track"]),
        ("man_made", &["breakwater", "crane", "cutline", "dyke", "embankment", "goods_conveyor", "groyne", "pier", "pipeline"]),
        ("military", &["trench"]),
        ("natural", &["arete", "bay", "cliff", "coastline", "ridge", "strait", "tree_row", "valley"]),
        ("office", &[]),
        ("place", &[]),
        ("playground", &["balancebeam", "slide", "zipwire"]),
        ("police", &[]),
        ("power", &["cable", "line", "minor_line"]),
        ("public_transport", &[]),
        ("shop", &[]),
        ("tourism", &["artwork"]),
        ("waterway", &["canal", "ditch", "drain", "fish_pass", "river", "stream", "tidal_channel", "weir"]),
    ])
}

/// Which tags make a closed way an area.
///
/// `keys` maps an area-implying key to the values that nevertheless describe
/// a line; `exceptions` lists key/value pairs that imply an area although the
/// key alone does not.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AreaKeys {
    /// Area-implying keys and their excluded line values.
    #[serde(default)]
    pub keys: ValueTable,
    /// Explicit area-implying pairs for otherwise linear keys.
    #[serde(default = "default_exceptions")]
    pub exceptions: ValueTable,
}

static BUILTIN_AREA_KEYS: LazyLock<AreaKeys> = LazyLock::new(|| AreaKeys {
    keys: default_keys(),
    exceptions: default_exceptions(),
});

impl Default for AreaKeys {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

impl AreaKeys {
    /// The built-in table.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN_AREA_KEYS
    }

    /// Parse a table from JSON such as `{"keys": {"building": []}}`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed documents.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse { source })
    }

    /// Load a table from a JSON file.
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be opened and
    /// [`ConfigError::Parse`] if it is malformed.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_reader(open(path)?).map_err(|source| ConfigError::Parse { source })
    }

    /// The first tag that suggests an area, if any.
    #[must_use]
    pub fn tag_suggesting_area<'t>(&self, tags: &'t Tags) -> Option<(&'t str, &'t str)> {
        match tags.get("area").map(String::as_str) {
            Some("yes") => return Some(("area", "yes")),
            Some("no") => return None,
            _ => {}
        }
        tags.iter().find_map(|(real_key, value)| {
            let key = remove_lifecycle_prefix(real_key);
            let by_key = self
                .keys
                .get(key)
                .is_some_and(|excluded| !excluded.contains(value));
            let by_exception = self
                .exceptions
                .get(key)
                .is_some_and(|values| values.contains(value));
            (by_key || by_exception).then_some((real_key.as_str(), value.as_str()))
        })
    }
}

/// Obsolete keys removed from edited entities before upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DiscardTags {
    keys: BTreeSet<String>,
}

const DEFAULT_DISCARDED: [&str; 42] = [
    "created_by",
    "odbl",
    "odbl:note",
    "tiger:upload_uuid",
    "tiger:tlid",
    "tiger:source",
    "tiger:separated",
    "geobase:datasetName",
    "geobase:uuid",
    "sub_sea:type",
    "KSJ2:ADS",
    "KSJ2:ARE",
    "KSJ2:AdminArea",
    "KSJ2:COP_label",
    "KSJ2:DFD",
    "KSJ2:INT",
    "KSJ2:INT_label",
    "KSJ2:LOC",
    "KSJ2:LPN",
    "KSJ2:OPC",
    "KSJ2:PubFacAdmin",
    "KSJ2:RAC",
    "KSJ2:RAC_label",
    "KSJ2:RIC",
    "KSJ2:RIN",
    "KSJ2:WSC",
    "KSJ2:coordinate",
    "KSJ2:curve_id",
    "KSJ2:curve_type",
    "KSJ2:filename",
    "KSJ2:lake_id",
    "KSJ2:lat",
    "KSJ2:long",
    "KSJ2:river_id",
    "SK53_bulk:load",
    "yh:LINE_NAME",
    "yh:LINE_NUM",
    "yh:STRUCTURE",
    "yh:TOTYUMONO",
    "yh:TYPE",
    "yh:WIDTH",
    "yh:WIDTH_RANK",
];

impl Default for DiscardTags {
    fn default() -> Self {
        Self::new(DEFAULT_DISCARDED)
    }
}

impl DiscardTags {
    /// A table holding exactly `keys`.
    #[must_use]
    pub fn new<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            keys: keys.into_iter().map(str::to_owned).collect(),
        }
    }

    /// An empty table.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            keys: BTreeSet::new(),
        }
    }

    /// Parse a JSON array of keys.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed documents.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse { source })
    }

    /// Load a JSON array of keys from a file.
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be opened and
    /// [`ConfigError::Parse`] if it is malformed.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_reader(open(path)?).map_err(|source| ConfigError::Parse { source })
    }

    /// True if `key` should be discarded.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::tags_from;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case(&[("building", "yes")], true)]
    #[case(&[("disused:building", "yes")], true)]
    #[case(&[("natural", "coastline")], false)]
    #[case(&[("railway", "turntable")], true)]
    #[case(&[("railway", "rail")], false)]
    #[case(&[("area", "no"), ("building", "yes")], false)]
    fn builtin_area_keys(#[case] pairs: &[(&str, &str)], #[case] expected: bool) {
        let tags = tags_from(pairs.iter().copied());
        assert_eq!(
            AreaKeys::builtin().tag_suggesting_area(&tags).is_some(),
            expected
        );
    }

    #[rstest]
    fn area_keys_from_json_keep_default_exceptions() {
        let keys = AreaKeys::from_json(r#"{"keys": {"leisure": ["track"]}}"#).unwrap();
        let pitch = tags_from([("leisure", "pitch")]);
        let building = tags_from([("building", "yes")]);
        let station = tags_from([("railway", "station")]);
        assert!(keys.tag_suggesting_area(&pitch).is_some());
        assert!(keys.tag_suggesting_area(&building).is_none());
        assert!(keys.tag_suggesting_area(&station).is_some());
    }

    #[rstest]
    fn area_keys_reject_malformed_json() {
        let err = AreaKeys::from_json("[1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[rstest]
    fn discard_tags_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["created_by", "foo"]"#).unwrap();
        let discard = DiscardTags::from_path(file.path()).unwrap();
        assert!(discard.contains("foo"));
        assert!(!discard.contains("odbl"));
    }

    #[rstest]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = DiscardTags::from_path(&path).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }

    #[rstest]
    fn default_discard_tags_cover_obsolete_keys() {
        let discard = DiscardTags::default();
        assert!(discard.contains("created_by"));
        assert!(discard.contains("tiger:upload_uuid"));
        assert!(!discard.contains("name"));
    }
}
