//! Template tool: renders a fragment against the session namespace.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use minijinja::value::{Enumerator, Object, ObjectRepr, Rest, Value};
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior};
use rhai::{Array, Dynamic, ImmutableString, Map};

use crate::repl::engine::URL_FOR_MESSAGE;
use crate::repl::model::{ModelClass, Record};
use crate::repl::namespace::Namespace;
use crate::repl::value::{Redirect, repr};

/// Attribute lookups that missed on a record, most recent last.
type Misses = Arc<Mutex<Vec<(String, String)>>>;

/// Template view of a record. Unknown attributes are undefined and recorded.
struct RecordView {
    class: String,
    fields: Vec<(String, Value)>,
    declared: Vec<String>,
    debug: String,
    misses: Misses,
}

impl fmt::Debug for RecordView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug)
    }
}

impl Object for RecordView {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let name = key.as_str()?;
        if let Some((_, value)) = self.fields.iter().find(|(field, _)| field == name) {
            return Some(value.clone());
        }
        if self.declared.iter().any(|field| field == name) {
            return Some(Value::from(()));
        }
        if let Ok(mut misses) = self.misses.lock() {
            misses.push((self.class.clone(), name.to_string()));
        }
        None
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(
            self.fields
                .iter()
                .map(|(name, _)| Value::from(name.as_str()))
                .collect(),
        )
    }
}

fn to_value(value: &Dynamic, misses: &Misses) -> Value {
    if value.is_unit() {
        return Value::from(());
    }
    if let Ok(b) = value.as_bool() {
        return Value::from(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::from(i);
    }
    if let Ok(f) = value.as_float() {
        return Value::from(f);
    }
    if let Some(s) = value.read_lock::<ImmutableString>() {
        return Value::from(s.as_str());
    }
    if let Some(array) = value.read_lock::<Array>() {
        return Value::from(
            array
                .iter()
                .map(|item| to_value(item, misses))
                .collect::<Vec<_>>(),
        );
    }
    if let Some(map) = value.read_lock::<Map>() {
        return Value::from(
            map.iter()
                .map(|(k, v)| (k.to_string(), to_value(v, misses)))
                .collect::<BTreeMap<_, _>>(),
        );
    }
    if let Some(record) = value.read_lock::<Record>() {
        return Value::from_object(RecordView {
            class: record.class_name().to_string(),
            fields: record
                .values()
                .iter()
                .map(|(k, v)| (k.clone(), to_value(v, misses)))
                .collect(),
            declared: record
                .class()
                .fields
                .iter()
                .map(|field| field.name.clone())
                .collect(),
            debug: repr(value),
            misses: Arc::clone(misses),
        });
    }
    if let Some(class) = value.read_lock::<ModelClass>() {
        return Value::from(class.name.as_str());
    }
    if let Some(redirect) = value.read_lock::<Redirect>() {
        return Value::from(redirect.location.as_str());
    }
    Value::from(value.to_string())
}

fn url_for(_args: Rest<Value>) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, URL_FOR_MESSAGE))
}

/// Render `source` with every namespace binding in the context.
///
/// Undefined values are errors. When the failure came from a missing record
/// attribute, the message names it as `'<Class> object' has no attribute '<name>'`.
pub fn render(source: &str, namespace: &Namespace) -> Result<String, String> {
    let misses: Misses = Arc::default();
    let context: BTreeMap<String, Value> = namespace
        .bindings()
        .iter()
        .map(|(name, value)| (name.clone(), to_value(value, &misses)))
        .collect();

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_function("url_for", url_for);

    env.render_str(source, context).map_err(|err| {
        let mut message = err.to_string();
        if err.kind() == ErrorKind::UndefinedError {
            let failing = err.range().and_then(|range| source.get(range));
            if let Some((class, attribute)) = failing.and_then(|span| blamed(span, &misses)) {
                message.push_str(&format!(
                    " ('{class} object' has no attribute '{attribute}')"
                ));
            }
        }
        message
    })
}

/// Most recent missed lookup whose attribute access appears in `span`.
fn blamed(span: &str, misses: &Misses) -> Option<(String, String)> {
    let misses = misses.lock().ok()?;
    misses
        .iter()
        .rev()
        .find(|(_, attribute)| accesses(span, attribute))
        .cloned()
}

/// True when `span` contains `.attribute` as a whole name.
fn accesses(span: &str, attribute: &str) -> bool {
    let needle = format!(".{attribute}");
    span.match_indices(&needle).any(|(at, _)| {
        span[at + needle.len()..]
            .chars()
            .next()
            .is_none_or(|next| !(next.is_alphanumeric() || next == '_'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::describe_template_error;
    use crate::repl::model::{Field, FieldType};
    use std::rc::Rc;

    fn namespace() -> Namespace {
        let class = Rc::new(ModelClass::new(
            "Product",
            "products",
            vec![
                Field::new("id", FieldType::Integer).primary_key(),
                Field::new("name", FieldType::Text),
            ],
        ));
        let mut record = Record::new(class);
        record.set("id", Dynamic::from(1_i64)).expect("id");
        record.set("name", Dynamic::from("Widget")).expect("name");
        let mut namespace = Namespace::new();
        namespace.set("product", Dynamic::from(record));
        namespace.set("title", Dynamic::from("Shop"));
        namespace
    }

    #[test]
    fn renders_bindings_and_record_fields() {
        let html = render("<h1>{{ title }}</h1>{{ product.name }}", &namespace()).expect("render");
        assert_eq!(html, "<h1>Shop</h1>Widget");
    }

    #[test]
    fn missing_record_attribute_names_class_and_attribute() {
        let message = render("{{ product.colour }}", &namespace()).unwrap_err();
        let error = describe_template_error(&message);
        assert_eq!(error.subject.as_deref(), Some("Product"));
        assert_eq!(error.member.as_deref(), Some("colour"));
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let message = render("{{ nothing }}", &namespace()).unwrap_err();
        assert_eq!(describe_template_error(&message).subject, None);
    }

    #[test]
    fn guarded_attribute_is_not_blamed_for_another_undefined() {
        let message = render(
            "{% if product.colour is defined %}x{% endif %}{{ nothing }}",
            &namespace(),
        )
        .unwrap_err();
        assert!(!message.contains("colour"));
        let error = describe_template_error(&message);
        assert_eq!(error.subject, None);
        assert_eq!(error.member, None);
    }

    #[test]
    fn defaulted_attribute_is_not_blamed() {
        let message = render(
            "{{ product.colour|default('none') }}{{ product.size }}",
            &namespace(),
        )
        .unwrap_err();
        let error = describe_template_error(&message);
        assert_eq!(error.member.as_deref(), Some("size"));
    }

    #[test]
    fn attribute_match_needs_a_whole_name() {
        assert!(accesses("product.colour", "colour"));
        assert!(accesses("product.colour | upper", "colour"));
        assert!(!accesses("product.colours", "colour"));
        assert!(!accesses("nothing", "colour"));
    }

    #[test]
    fn url_for_is_rejected() {
        let message = render("{{ url_for('index') }}", &namespace()).unwrap_err();
        assert!(message.contains(URL_FOR_MESSAGE));
    }
}
