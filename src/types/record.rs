use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// the per-store part of a record
///
/// a kind supplies the entity name used for the store's files and may derive
/// extra, non-persisted data from the record's names.
pub trait Kind: Clone + fmt::Debug + Serialize + DeserializeOwned {
    /// base name of the store's files (`<entity>.json`, `<entity>.lock`)
    const ENTITY: &'static str;

    /// reject names this kind cannot accept; runs before any mutation
    fn validate_names(_names: &[String]) -> Result<()> {
        Ok(())
    }

    /// rebuild derived data after the names changed
    fn refresh(&mut self, _names: &[String]) -> Result<()> {
        Ok(())
    }
}

/// a uniquely identified entry in an entity store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record<K> {
    /// either specified at create time or generated
    pub id: String,

    /// user-defined convenience names, unique within the store
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,

    #[serde(flatten)]
    pub kind: K,

    /// caller data kept in memory; not expected to be large
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,

    /// keys of the blobs stored next to the record
    #[serde(rename = "big-data-names", default, skip_serializing_if = "Vec::is_empty")]
    pub big_data_names: Vec<String>,

    #[serde(rename = "big-data-sizes", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub big_data_sizes: BTreeMap<String, u64>,

    /// caller-defined flags; unknown keys are carried through untouched
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, serde_json::Value>,
}

impl<K: Kind> Record<K> {
    pub fn new(id: impl Into<String>, names: Vec<String>, kind: K, metadata: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            names,
            kind,
            metadata: metadata.into(),
            big_data_names: vec![],
            big_data_sizes: BTreeMap::new(),
            flags: BTreeMap::new(),
        }
    }

    /// look up a flag value
    pub fn flag(&self, flag: &str) -> Option<&serde_json::Value> {
        self.flags.get(flag)
    }

    pub(crate) fn refresh(&mut self) -> Result<()> {
        self.kind.refresh(&self.names)
    }
}

/// the part of a name used as its index key: everything before the first '@'
pub fn name_key(name: &str) -> &str {
    match name.split_once('@') {
        Some((key, _)) => key,
        None => name,
    }
}

/// generate a random 64-hex record ID
///
/// IDs whose short form would be all digits are skipped so that short IDs
/// never look like numbers.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 32];
    loop {
        rand::thread_rng().fill(&mut bytes);
        let id = hex::encode(bytes);
        if !truncate_id(&id).bytes().all(|b| b.is_ascii_digit()) {
            return id;
        }
    }
}

/// 12-character short form of an ID
pub fn truncate_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Plain {
        #[serde(default)]
        layer: String,
    }

    impl Kind for Plain {
        const ENTITY: &'static str = "plain";
    }

    #[test]
    fn test_name_key() {
        assert_eq!(name_key("foo"), "foo");
        assert_eq!(name_key("foo:tag"), "foo:tag");
        assert_eq!(name_key("foo@sha256:abc"), "foo");
        assert_eq!(name_key("@only-digest"), "");
    }

    #[test]
    fn test_generate_id() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert!(!truncate_id(&a).bytes().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_truncate_id() {
        assert_eq!(truncate_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(truncate_id("short"), "short");
    }

    #[test]
    fn test_json_layout_omits_empty_fields() {
        let record = Record::new(
            "abc",
            vec![],
            Plain {
                layer: "l1".into(),
            },
            "",
        );
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":"abc","layer":"l1"}"#);
    }

    #[test]
    fn test_json_field_names() {
        let mut record = Record::new("abc", vec!["n".into()], Plain::default(), "md");
        record.big_data_names.push("manifest".into());
        record.big_data_sizes.insert("manifest".into(), 12);
        record
            .flags
            .insert("incomplete".into(), serde_json::Value::Bool(true));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["names"][0], "n");
        assert_eq!(value["metadata"], "md");
        assert_eq!(value["big-data-names"][0], "manifest");
        assert_eq!(value["big-data-sizes"]["manifest"], 12);
        assert_eq!(value["flags"]["incomplete"], true);

        let parsed: Record<Plain> = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_unknown_flag_values_pass_through() {
        let json = r#"{"id":"abc","layer":"","flags":{"custom":{"nested":[1,2,3]}}}"#;
        let record: Record<Plain> = serde_json::from_str(json).unwrap();
        assert_eq!(
            record.flag("custom").unwrap()["nested"],
            serde_json::json!([1, 2, 3])
        );
        let back = serde_json::to_string(&record).unwrap();
        assert!(back.contains(r#""custom":{"nested":[1,2,3]}"#));
    }
}
