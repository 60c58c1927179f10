//! `application/x-www-form-urlencoded` body encoding.
//!
//! Two flavors exist. The default stringifies nested objects and arrays as JSON
//! (`Tags=["a","b"]`). Repeat mode, used for a small set of hosts, repeats array keys
//! (`Tags=a&Tags=b`) and brackets nested object keys (`Meta[k]=v`).

use serde_json::{Map, Value};
use url::form_urlencoded::Serializer;

type Form = Serializer<'static, String>;

/// Encode a JSON object as a form body.
#[must_use]
pub fn encode_form(fields: &Map<String, Value>, repeat_arrays: bool) -> String {
    let mut form = Serializer::new(String::new());
    for (key, value) in fields {
        if repeat_arrays {
            append_repeated(&mut form, key, value);
        } else {
            form.append_pair(key, &stringify(value));
        }
    }
    form.finish()
}

fn append_repeated(form: &mut Form, key: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                append_repeated(form, key, item);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                append_repeated(form, &format!("{key}[{k}]"), v);
            }
        }
        scalar => {
            form.append_pair(key, &stringify(scalar));
        }
    }
}

/// Scalars encode as their plain text; `null` as an empty value.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
