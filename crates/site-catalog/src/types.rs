//! Catalog record types.
//!
//! Records are kept close to the JSON served by the catalog: only the fields
//! this crate derives or dispatches on are typed, everything else is carried
//! along in an `extra` map so nothing the upstream adds gets lost.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::markdown::markdown_to_html;

/// Value of the `type` field marking a dataset as a collection.
pub const COLLECTION_TYPE: &str = "collection";

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

/// Fields shared by every kind of dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetBase {
    pub name: String,
    /// Site-relative path of the dataset page, `/datasets/{name}/`.
    pub link: String,
    /// Absolute URL of the dataset page.
    pub opensanctions_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatasetBase {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    fn str_list_field(&self, key: &str) -> Vec<&str> {
        match self.extra.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// An aggregation of sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(flatten)]
    pub base: DatasetBase,
}

impl Collection {
    /// Names of the sources aggregated by this collection.
    pub fn sources(&self) -> Vec<&str> {
        self.base.str_list_field("sources")
    }
}

/// A single data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(flatten)]
    pub base: DatasetBase,
}

impl Source {
    /// Where the source data is published.
    pub fn url(&self) -> Option<&str> {
        self.base.str_field("url")
    }

    pub fn publisher(&self) -> Option<&Value> {
        self.base.extra.get("publisher")
    }

    /// Names of the collections this source is part of.
    pub fn collections(&self) -> Vec<&str> {
        self.base.str_list_field("collections")
    }
}

/// A catalog entry, either a [Collection] or a [Source].
///
/// The variant only reflects the `type` field; a record typed as a collection
/// is not checked for collection-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Dataset {
    Collection(Collection),
    Source(Source),
}

impl Dataset {
    /// Classify a record by its `type` field.
    pub fn from_base(base: DatasetBase) -> Self {
        if base.str_field("type") == Some(COLLECTION_TYPE) {
            Dataset::Collection(Collection { base })
        } else {
            Dataset::Source(Source { base })
        }
    }

    pub fn base(&self) -> &DatasetBase {
        match self {
            Dataset::Collection(collection) => &collection.base,
            Dataset::Source(source) => &source.base,
        }
    }

    pub fn name(&self) -> &str {
        &self.base().name
    }

    /// The raw `type` tag, if it is a string.
    pub fn kind(&self) -> Option<&str> {
        self.base().str_field("type")
    }

    pub fn title(&self) -> Option<&str> {
        self.base().str_field("title")
    }

    pub fn summary(&self) -> Option<&str> {
        self.base().str_field("summary")
    }

    pub fn link(&self) -> &str {
        &self.base().link
    }

    pub fn opensanctions_url(&self) -> &str {
        &self.base().opensanctions_url
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Dataset::Collection(_))
    }
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        DatasetBase::deserialize(deserializer).map(Dataset::from_base)
    }
}

/// Site-relative path of a dataset page.
pub fn dataset_link(name: &str) -> String {
    format!("/datasets/{name}/")
}

/// Side information for one dataset, split off its index record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDetails {
    /// Description rendered to HTML.
    pub description: String,
    pub targets: Option<Value>,
    pub resources: Option<Value>,
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// The catalog index as served, before any reshaping.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIndex {
    pub datasets: Vec<Value>,
    #[serde(default)]
    pub model: Value,
}

/// The catalog index after reshaping.
///
/// `datasets` and `details` are built in the same pass and always describe
/// the same set of names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub datasets: Vec<Dataset>,
    /// Schema model, passed through unchanged.
    pub model: Value,
    pub details: BTreeMap<String, DatasetDetails>,
}

impl Index {
    /// Split each raw record into a [Dataset] and its [DatasetDetails],
    /// inject the derived links and classify it.
    ///
    /// Dataset order is preserved. If two records share a name, the later
    /// one's details win. Records that are not objects or carry no string
    /// `name` cannot be linked and are skipped, the rest of the index is kept.
    ///
    /// A trailing `/` on `base_url` is dropped before the link is appended,
    /// so `opensanctions_url` never contains `//`.
    pub fn from_raw(raw: RawIndex, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let mut details = BTreeMap::new();
        let mut datasets = Vec::with_capacity(raw.datasets.len());

        for (position, record) in raw.datasets.into_iter().enumerate() {
            let Value::Object(mut fields) = record else {
                warn!(position, "skipping dataset record that is not an object");
                continue;
            };

            let name = match fields.remove("name") {
                Some(Value::String(name)) => name,
                other => {
                    warn!(position, name = ?other, "skipping dataset record without a string name");
                    continue;
                },
            };

            let description = match fields.remove("description") {
                Some(Value::String(markdown)) => markdown_to_html(&markdown),
                _ => String::new(),
            };
            let dataset_details = DatasetDetails {
                description,
                targets: fields.remove("targets"),
                resources: fields.remove("resources"),
            };
            details.insert(name.clone(), dataset_details);

            fields.remove("link");
            fields.remove("opensanctions_url");
            let link = dataset_link(&name);
            let opensanctions_url = format!("{base_url}{link}");

            trace!(%name, %link, "transformed dataset record");
            datasets.push(Dataset::from_base(DatasetBase {
                name,
                link,
                opensanctions_url,
                extra: fields,
            }));
        }

        Index {
            datasets,
            model: raw.model,
            details,
        }
    }
}

// ---------------------------------------------------------------------------
// Issues and entities
// ---------------------------------------------------------------------------

fn str_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

/// A data-quality or processing issue, kept exactly as served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Issue {
    pub fields: Map<String, Value>,
}

impl Issue {
    pub fn id(&self) -> Option<&Value> {
        self.fields.get("id")
    }

    pub fn level(&self) -> Option<&str> {
        str_field(&self.fields, "level")
    }

    pub fn message(&self) -> Option<&str> {
        str_field(&self.fields, "message")
    }

    /// Name of the dataset the issue concerns, if it is a string.
    pub fn dataset(&self) -> Option<&str> {
        str_field(&self.fields, "dataset")
    }

    /// Whether the issue's `dataset` equals `dataset`.
    ///
    /// `None` matches issues whose `dataset` is missing or `null`.
    /// A `dataset` value that is neither a string nor `null` matches nothing.
    pub fn belongs_to(&self, dataset: Option<&str>) -> bool {
        match (self.fields.get("dataset"), dataset) {
            (None | Some(Value::Null), None) => true,
            (Some(Value::String(value)), Some(name)) => value == name,
            _ => false,
        }
    }
}

/// The issues feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueIndex {
    pub issues: Vec<Issue>,
}

/// A single record from the entity API.
///
/// Only `id` is typed, everything else is kept as served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity {
    pub fn caption(&self) -> Option<&str> {
        str_field(&self.extra, "caption")
    }

    pub fn schema(&self) -> Option<&str> {
        str_field(&self.extra, "schema")
    }

    /// Names of the datasets the entity appears in. Missing, `null` or
    /// malformed lists yield nothing.
    pub fn datasets(&self) -> Vec<&str> {
        match self.extra.get("datasets") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_target(&self) -> bool {
        self.extra.get("target").and_then(Value::as_bool).unwrap_or(false)
    }
}
