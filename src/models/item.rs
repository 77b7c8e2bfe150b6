use serde::{Deserialize, Serialize};

/// A downloaded item payload.
///
/// Only `key`, `version`, `data.parentItem` and `meta.numChildren` are
/// interpreted by the sync core; everything else is carried through for
/// plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: String,
    pub version: i64,
    #[serde(default)]
    pub data: ItemData,
    #[serde(default)]
    pub meta: ItemMeta,
    /// Child items fetched inline during download.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Item>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    #[serde(rename = "itemType", default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    /// Key of the parent item, when this item is a child record.
    #[serde(rename = "parentItem", default, skip_serializing_if = "Option::is_none")]
    pub parent_item: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Number of child records the server reports for this item; a positive
    /// count triggers a child fetch during download.
    #[serde(rename = "numChildren", default)]
    pub num_children: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
