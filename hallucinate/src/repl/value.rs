//! Rendering and comparison of script values.

use rhai::{Array, Dynamic, FnPtr, ImmutableString, Map};
use serde_json::{Number, Value as Json};

use crate::core::types::ResponseBody;
use crate::repl::model::{ModelClass, Record};

/// Value returned by `redirect(url)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
}

/// Developer-facing rendering used for display and diff lines.
///
/// Strings are single-quoted, maps render as `{'k': v}` and records as
/// `<Class {'field': value}>`.
pub fn repr(value: &Dynamic) -> String {
    if value.is_unit() {
        return "()".to_string();
    }
    if let Some(s) = value.read_lock::<ImmutableString>() {
        return quote(s.as_str());
    }
    if let Ok(c) = value.as_char() {
        return format!("'{}'", c.escape_default());
    }
    if let Some(array) = value.read_lock::<Array>() {
        let items: Vec<String> = array.iter().map(repr).collect();
        return format!("[{}]", items.join(", "));
    }
    if let Some(map) = value.read_lock::<Map>() {
        let items: Vec<String> = map
            .iter()
            .map(|(k, v)| format!("{}: {}", quote(k.as_str()), repr(v)))
            .collect();
        return format!("{{{}}}", items.join(", "));
    }
    if let Some(record) = value.read_lock::<Record>() {
        return repr_record(&record);
    }
    if let Some(class) = value.read_lock::<ModelClass>() {
        return format!("<class '{}'>", class.name);
    }
    if let Some(redirect) = value.read_lock::<Redirect>() {
        return format!("<Redirect to {}>", quote(&redirect.location));
    }
    if let Some(fn_ptr) = value.read_lock::<FnPtr>() {
        return format!("Fn({})", fn_ptr.fn_name());
    }
    value.to_string()
}

pub fn repr_record(record: &Record) -> String {
    let items: Vec<String> = record
        .values()
        .iter()
        .map(|(k, v)| format!("{}: {}", quote(k), repr(v)))
        .collect();
    format!("<{} {{{}}}>", record.class_name(), items.join(", "))
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Structural equality, used to decide whether a binding changed.
pub fn values_equal(a: &Dynamic, b: &Dynamic) -> bool {
    if a.type_id() != b.type_id() {
        return false;
    }
    if a.is_unit() {
        return true;
    }
    if let (Ok(x), Ok(y)) = (a.as_int(), b.as_int()) {
        return x == y;
    }
    if let (Ok(x), Ok(y)) = (a.as_float(), b.as_float()) {
        return x == y;
    }
    if let (Ok(x), Ok(y)) = (a.as_bool(), b.as_bool()) {
        return x == y;
    }
    if let (Ok(x), Ok(y)) = (a.as_char(), b.as_char()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.read_lock::<ImmutableString>(), b.read_lock::<ImmutableString>()) {
        return *x == *y;
    }
    if let (Some(x), Some(y)) = (a.read_lock::<Array>(), b.read_lock::<Array>()) {
        return x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| values_equal(l, r));
    }
    if let (Some(x), Some(y)) = (a.read_lock::<Map>(), b.read_lock::<Map>()) {
        return x.len() == y.len()
            && x
                .iter()
                .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)));
    }
    if let (Some(x), Some(y)) = (a.read_lock::<Record>(), b.read_lock::<Record>()) {
        return x.class_name() == y.class_name()
            && x.values().len() == y.values().len()
            && x
                .values()
                .iter()
                .zip(y.values())
                .all(|((kx, vx), (ky, vy))| kx == ky && values_equal(vx, vy));
    }
    if let (Some(x), Some(y)) = (a.read_lock::<ModelClass>(), b.read_lock::<ModelClass>()) {
        return *x == *y;
    }
    repr(a) == repr(b)
}

/// JSON view of a value; functions and other opaque values become strings.
pub fn to_json(value: &Dynamic) -> Json {
    if value.is_unit() {
        return Json::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Json::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Json::Number(i.into());
    }
    if let Ok(f) = value.as_float() {
        return Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null);
    }
    if let Some(s) = value.read_lock::<ImmutableString>() {
        return Json::String(s.to_string());
    }
    if let Some(array) = value.read_lock::<Array>() {
        return Json::Array(array.iter().map(to_json).collect());
    }
    if let Some(map) = value.read_lock::<Map>() {
        return Json::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), to_json(v)))
                .collect(),
        );
    }
    if let Some(record) = value.read_lock::<Record>() {
        return Json::Object(
            record
                .values()
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        );
    }
    Json::String(value.to_string())
}

/// Turn a fragment's final answer into a response body.
///
/// Strings are HTML bodies, `[body, status]` pairs carry a status code,
/// `redirect(url)` values redirect and any other value is sent as JSON.
pub fn response_body(answer: &Dynamic) -> ResponseBody {
    if let Some(s) = answer.read_lock::<ImmutableString>() {
        return ResponseBody::html(s.as_str());
    }
    if let Some(redirect) = answer.read_lock::<Redirect>() {
        return ResponseBody::redirect(redirect.location.clone());
    }
    if let Some(pair) = answer.read_lock::<Array>() {
        if let [body, status] = pair.as_slice() {
            if let Ok(status) = status.as_int() {
                if let Ok(status) = u16::try_from(status) {
                    return response_body(body).with_status(status);
                }
            }
        }
    }
    ResponseBody::json(to_json(answer).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::model::{Field, FieldType};
    use std::rc::Rc;

    fn widget() -> Record {
        let class = Rc::new(ModelClass::new(
            "Product",
            "products",
            vec![
                Field::new("id", FieldType::Integer).primary_key(),
                Field::new("name", FieldType::Text),
                Field::new("price", FieldType::Integer),
            ],
        ));
        let mut record = Record::new(class);
        record.set("id", Dynamic::from(1_i64)).expect("id");
        record.set("name", Dynamic::from("Widget")).expect("name");
        record.set("price", Dynamic::from(10_i64)).expect("price");
        record
    }

    #[test]
    fn repr_quotes_strings() {
        assert_eq!(repr(&Dynamic::from("it's")), r"'it\'s'");
        assert_eq!(repr(&Dynamic::from(5_i64)), "5");
        assert_eq!(repr(&Dynamic::UNIT), "()");
    }

    #[test]
    fn repr_record_matches_display_pattern() {
        assert_eq!(
            repr(&Dynamic::from(widget())),
            "<Product {'id': 1, 'name': 'Widget', 'price': 10}>"
        );
    }

    #[test]
    fn equality_is_structural() {
        let a: Array = vec![Dynamic::from(1_i64), Dynamic::from("x")];
        let b: Array = vec![Dynamic::from(1_i64), Dynamic::from("x")];
        assert!(values_equal(&Dynamic::from(a), &Dynamic::from(b)));
        assert!(values_equal(&Dynamic::from(widget()), &Dynamic::from(widget())));
        assert!(!values_equal(&Dynamic::from(1_i64), &Dynamic::from(1.0_f64)));
        assert!(!values_equal(&Dynamic::from("5"), &Dynamic::from(5_i64)));
    }

    #[test]
    fn string_answer_is_html() {
        let body = response_body(&Dynamic::from("<h1>hi</h1>"));
        assert_eq!(body, ResponseBody::html("<h1>hi</h1>"));
    }

    #[test]
    fn pair_answer_carries_status() {
        let pair: Array = vec![Dynamic::from("No favicon"), Dynamic::from(404_i64)];
        let body = response_body(&Dynamic::from(pair));
        assert_eq!(body.status, 404);
        assert_eq!(body.body, "No favicon");
    }

    #[test]
    fn record_answer_is_json() {
        let body = response_body(&Dynamic::from(widget()));
        assert_eq!(body.content_type, ResponseBody::JSON);
        let json: Json = serde_json::from_str(&body.body).expect("json");
        assert_eq!(json["name"], "Widget");
    }

    #[test]
    fn redirect_answer_redirects() {
        let body = response_body(&Dynamic::from(Redirect {
            location: "/whoami".to_string(),
        }));
        assert_eq!(body.status, 302);
        assert_eq!(body.body, "/whoami");
    }
}
