//! `$type` reconstruction for subscription messages (§4.7 "Subscription
//! frame parsing"): the inverse of the server's `ws::rewrite_type`. A
//! Message frame's `t` is combined with the subscription NSID into
//! `$type = nsid + "#name"` (when `t` starts with `#`), or used verbatim
//! otherwise, on a shallow copy of the body.

use serde_json::Value;

pub fn apply(nsid: &str, t: Option<&str>, mut body: Value) -> Value {
    let Some(t) = t else {
        return body;
    };
    let type_value = match t.strip_prefix('#') {
        Some(name) => format!("{nsid}#{name}"),
        None => t.to_string(),
    };
    if let Some(obj) = body.as_object_mut() {
        obj.insert("$type".to_string(), Value::String(type_value));
    }
    body
}
