//! Portal REST paths and the few fields the exporter reads from responses.
//!
//! Responses are kept as loose JSON documents. Every portal response wraps
//! its payload as `{"data": ...}`.

use std::borrow::Cow;

use serde_json::Value;

const API_ROOT: &str = "/xapi/portals/api/sites";

/// Ids travel as single path segments; `#`, `?`, `/` and `%` must not
/// change which resource is addressed.
fn seg(id: &str) -> Cow<'_, str> {
    urlencoding::encode(id)
}

pub fn sites_path() -> String {
    API_ROOT.to_string()
}

pub fn pages_path(site_id: &str) -> String {
    format!("{}/{}/pages", API_ROOT, seg(site_id))
}

pub fn custom_css_path(site_id: &str) -> String {
    format!("{}/{}/customcss", API_ROOT, seg(site_id))
}

pub fn file_list_path(site_id: &str) -> String {
    format!("{}/{}/file/list", API_ROOT, seg(site_id))
}

pub fn menu_items_path(site_id: &str) -> String {
    format!("{}/{}/menuitems", API_ROOT, seg(site_id))
}

pub fn api_docs_path(site_id: &str) -> String {
    format!("{}/{}/apidocs", API_ROOT, seg(site_id))
}

pub fn api_permissions_path(site_id: &str, api_id: &str) -> String {
    format!("{}/{}/resource-entitlements/apis/{}", API_ROOT, seg(site_id), seg(api_id))
}

pub fn page_permissions_path(site_id: &str, page_id: &str) -> String {
    format!("{}/{}/resource-entitlements/pages/{}", API_ROOT, seg(site_id), seg(page_id))
}

/// The `data` payload, or `None` when it is missing or null.
pub fn payload(doc: &Value) -> Option<&Value> {
    doc.get("data").filter(|v| !v.is_null())
}

/// Entries of a collection payload. An object payload yields its values in
/// key order; anything else yields nothing.
pub fn items(doc: &Value) -> Vec<&Value> {
    match payload(doc) {
        Some(Value::Array(entries)) => entries.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => Vec::new(),
    }
}

/// Permission responses are written as their payload when enveloped, and
/// verbatim otherwise.
pub fn permission_body(doc: &Value) -> &Value {
    payload(doc).unwrap_or(doc)
}

/// First of `keys` holding a non-empty string or a number, as a string.
pub fn id_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Compact JSON, keys in the order the portal sent them.
pub fn to_bytes(value: &Value) -> Vec<u8> {
    value.to_string().into_bytes()
}
