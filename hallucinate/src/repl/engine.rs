//! Script engine construction and the capability set fragments can call.

use std::cell::RefCell;
use std::rc::Rc;

use rhai::{Array, Dynamic, Engine, EvalAltResult, INT, ImmutableString, Map, Position};

use crate::repl::capture::OutputSink;
use crate::repl::model::{FieldError, ModelClass, ModelRegistry, Record};
use crate::repl::value::{Redirect, repr, repr_record, to_json};

pub const URL_FOR_MESSAGE: &str = "url_for() is not allowed. Hardcode the url instead.";

/// State the registered functions close over.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub registry: Rc<ModelRegistry>,
    /// Non-reserved bindings as of the start of the running chunk.
    pub variables: Rc<RefCell<Map>>,
}

impl Capabilities {
    pub fn new(registry: Rc<ModelRegistry>) -> Self {
        Self {
            registry,
            variables: Rc::default(),
        }
    }
}

type FnResult<T> = Result<T, Box<EvalAltResult>>;

fn runtime_error(value: impl Into<Dynamic>) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(value.into(), Position::NONE).into()
}

fn field_error(err: FieldError) -> Box<EvalAltResult> {
    match err {
        FieldError::Missing(missing) => runtime_error(Dynamic::from(missing)),
        other => runtime_error(other.to_string()),
    }
}

/// Build an engine whose print/debug output goes to `sink`.
pub fn build_engine(sink: &OutputSink, capabilities: &Capabilities) -> Engine {
    let mut engine = Engine::new();

    let out = sink.clone();
    engine.on_print(move |text| out.write_line(text));
    let out = sink.clone();
    engine.on_debug(move |text, _source, _pos| out.write_line(text));

    register_values(&mut engine);
    register_records(&mut engine, capabilities);
    register_helpers(&mut engine, capabilities);
    engine
}

fn register_values(engine: &mut Engine) {
    engine
        .register_type_with_name::<Record>("Record")
        .register_type_with_name::<ModelClass>("Class")
        .register_type_with_name::<Redirect>("Redirect");

    engine
        .register_fn("to_string", |record: &mut Record| repr_record(record))
        .register_fn("to_debug", |record: &mut Record| repr_record(record))
        .register_fn("to_string", |class: &mut ModelClass| {
            format!("<class '{}'>", class.name)
        })
        .register_fn("to_debug", |class: &mut ModelClass| {
            format!("<class '{}'>", class.name)
        })
        .register_fn("to_string", |redirect: &mut Redirect| {
            repr(&Dynamic::from(redirect.clone()))
        });

    engine
        .register_indexer_get(
            |record: &mut Record, name: ImmutableString| -> FnResult<Dynamic> {
                record
                    .get(&name)
                    .map_err(|missing| runtime_error(Dynamic::from(missing)))
            },
        )
        .register_indexer_set(
            |record: &mut Record, name: ImmutableString, value: Dynamic| -> FnResult<()> {
                record.set(&name, value).map_err(field_error)
            },
        );
}

fn register_records(engine: &mut Engine, capabilities: &Capabilities) {
    for class in capabilities.registry.classes() {
        let registry = Rc::clone(&capabilities.registry);
        let name = class.name.clone();
        engine.register_fn(
            class.name.as_str(),
            move |fields: Map| -> FnResult<Record> {
                let fields = fields.into_iter().map(|(k, v)| (k.to_string(), v));
                registry.instantiate(&name, fields).map_err(field_error)
            },
        );

        let registry = Rc::clone(&capabilities.registry);
        let name = class.name.clone();
        engine.register_fn(class.name.as_str(), move || -> FnResult<Record> {
            registry
                .instantiate(&name, Vec::<(String, Dynamic)>::new())
                .map_err(field_error)
        });
    }

    engine
        .register_fn("describe", |class: ModelClass| class.describe())
        .register_fn("describe", |record: Record| record.class().describe());

    let registry = Rc::clone(&capabilities.registry);
    engine.register_fn("all", move |class: ModelClass| -> Array {
        registry
            .all(&class.name)
            .into_iter()
            .map(Dynamic::from)
            .collect()
    });

    let registry = Rc::clone(&capabilities.registry);
    engine.register_fn("find", move |class: ModelClass, id: INT| -> Dynamic {
        registry
            .find(&class.name, id)
            .map(Dynamic::from)
            .unwrap_or(Dynamic::UNIT)
    });

    let registry = Rc::clone(&capabilities.registry);
    engine.register_fn("add", move |record: Record| -> FnResult<Record> {
        registry.add(record).map_err(field_error)
    });
}

fn register_helpers(engine: &mut Engine, capabilities: &Capabilities) {
    engine.register_fn("respond", |answer: Dynamic| -> FnResult<()> {
        Err(EvalAltResult::ErrorTerminated(answer, Position::NONE).into())
    });

    let variables = Rc::clone(&capabilities.variables);
    engine.register_fn("all_variables", move || -> Map { variables.borrow().clone() });

    engine
        .register_fn("redirect", |location: ImmutableString| Redirect {
            location: location.to_string(),
        })
        .register_fn("to_json", |value: Dynamic| to_json(&value).to_string());

    engine
        .register_fn("url_for", || -> FnResult<()> { Err(runtime_error(URL_FOR_MESSAGE)) })
        .register_fn("url_for", |_: Dynamic| -> FnResult<()> {
            Err(runtime_error(URL_FOR_MESSAGE))
        })
        .register_fn("url_for", |_: Dynamic, _: Dynamic| -> FnResult<()> {
            Err(runtime_error(URL_FOR_MESSAGE))
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::model::{Field, FieldType};

    fn engine() -> (Engine, Capabilities) {
        let registry = Rc::new(ModelRegistry::new(vec![ModelClass::new(
            "Product",
            "products",
            vec![
                Field::new("id", FieldType::Integer).primary_key(),
                Field::new("name", FieldType::Text),
            ],
        )]));
        let capabilities = Capabilities::new(registry);
        (build_engine(&OutputSink::new(), &capabilities), capabilities)
    }

    #[test]
    fn constructor_builds_record() {
        let (engine, _) = engine();
        let name: String = engine
            .eval(r#"let p = Product(#{name: "Widget"}); p.name"#)
            .expect("eval");
        assert_eq!(name, "Widget");
    }

    #[test]
    fn add_persists_into_registry() {
        let (engine, capabilities) = engine();
        let id: INT = engine
            .eval(r#"add(Product(#{name: "Widget"})).id"#)
            .expect("eval");
        assert_eq!(id, 1);
        assert_eq!(capabilities.registry.all("Product").len(), 1);
    }

    #[test]
    fn url_for_always_fails() {
        let (engine, _) = engine();
        let err = engine.run(r#"url_for("index")"#).unwrap_err();
        assert!(err.to_string().contains(URL_FOR_MESSAGE));
    }

    #[test]
    fn respond_terminates() {
        let (engine, _) = engine();
        let err = engine.run("respond(42); print(1);").unwrap_err();
        assert!(matches!(*err, EvalAltResult::ErrorTerminated(..)));
    }
}
