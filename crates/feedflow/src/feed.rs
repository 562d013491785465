//! Feed item validation: partitions a raw payload batch into well-formed
//! items and per-item error messages. Validation failures are data, not
//! errors; the worker rejects the whole batch when any item is bad.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A normalized catalog item as produced by the (external) feed adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
    pub submitter_id: String,
    #[serde(default)]
    pub extra: Value,
}

/// Validate a batch of raw item records. Returns the well-formed items and
/// one message per rejected item, both in input order.
///
/// Rules: `name` required non-empty; `price_cents` required integer >= 0
/// (integral strings and floats are coerced); `stock` integer >= 0,
/// defaulting to 0; `sku` optional.
pub fn validate_items(items: &[Value]) -> (Vec<FeedItem>, Vec<String>) {
    let mut valid = Vec::with_capacity(items.len());
    let mut errors = Vec::new();

    for (idx, raw) in items.iter().enumerate() {
        match validate_one(raw) {
            Ok(item) => valid.push(item),
            Err(reason) => errors.push(format!("Item {idx}: {reason}")),
        }
    }

    (valid, errors)
}

fn validate_one(raw: &Value) -> Result<FeedItem, String> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if name.is_empty() {
        return Err("name is required".into());
    }

    let price_cents = match raw.get("price_cents") {
        None | Some(Value::Null) => return Err("price_cents is required".into()),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err("price_cents is required".into())
        }
        Some(v) => coerce_int(v).ok_or("price_cents must be integer")?,
    };
    if price_cents < 0 {
        return Err("price_cents must be >= 0".into());
    }

    let stock = match raw.get("stock") {
        None | Some(Value::Null) => 0,
        Some(v) => coerce_int(v).ok_or("stock must be integer")?,
    };
    if stock < 0 {
        return Err("stock must be >= 0".into());
    }

    let sku = raw
        .get("sku")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("")
        .to_string();

    let submitter_id = raw
        .get("submitter_id")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let extra = raw.get("extra").cloned().unwrap_or_else(|| json!({}));

    Ok(FeedItem {
        sku,
        name: name.to_string(),
        price_cents,
        stock,
        submitter_id,
        extra,
    })
}

fn coerce_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
