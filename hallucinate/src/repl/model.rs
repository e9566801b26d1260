//! Described model classes and their records.
//!
//! This is the boundary to the data model fragments manipulate: a class is a
//! named, typed field list; a record is an instance holding the fields that were
//! set. Records live in an in-memory store seeded from configuration.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use rhai::{Dynamic, INT};
use serde::{Deserialize, Serialize};

/// Declared type of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
        }
    }

    /// Coerce `value` to this type. Unit (unset) is accepted for every type.
    fn coerce(self, value: Dynamic) -> Option<Dynamic> {
        if value.is_unit() {
            return Some(value);
        }
        match self {
            FieldType::Integer => value.as_int().ok().map(Dynamic::from),
            FieldType::Float => value
                .as_float()
                .ok()
                .or_else(|| value.as_int().ok().map(|i| i as rhai::FLOAT))
                .map(Dynamic::from),
            FieldType::Text => value.is_string().then_some(value),
            FieldType::Boolean => value.as_bool().ok().map(Dynamic::from),
        }
    }
}

/// One declared field of a model class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub primary_key: bool,
    /// `table.column` this field points at, if it is a foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// A described model class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelClass {
    pub name: String,
    pub table: String,
    pub fields: Vec<Field>,
}

impl ModelClass {
    pub fn new(name: impl Into<String>, table: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.iter().find(|field| field.primary_key)
    }

    /// Source-like description shown to the agent.
    pub fn describe(&self) -> String {
        let mut out = format!("class {}:\n    table = \"{}\"\n", self.name, self.table);
        for field in &self.fields {
            out.push_str(&format!("    {}: {}", field.name, field.kind.as_str()));
            if field.primary_key {
                out.push_str(" (primary key)");
            }
            if let Some(target) = &field.references {
                out.push_str(&format!(" -> {target}"));
            }
            out.push('\n');
        }
        out
    }
}

/// Attribute lookup on a record failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAttribute {
    pub type_name: String,
    pub attribute: String,
}

impl fmt::Display for MissingAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AttributeError: '{}' object has no attribute '{}'",
            self.type_name, self.attribute
        )
    }
}

/// Why a record field could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    Missing(MissingAttribute),
    Type {
        class: String,
        field: String,
        expected: FieldType,
        found: String,
    },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Missing(missing) => missing.fmt(f),
            FieldError::Type {
                class,
                field,
                expected,
                found,
            } => write!(
                f,
                "TypeError: {class}.{field} expects {}, got {found}",
                expected.as_str()
            ),
        }
    }
}

/// An instance of a model class. Only fields that were set are stored, in
/// declaration order.
#[derive(Debug, Clone)]
pub struct Record {
    class: Rc<ModelClass>,
    values: Vec<(String, Dynamic)>,
}

impl Record {
    pub fn new(class: Rc<ModelClass>) -> Self {
        Self {
            class,
            values: Vec::new(),
        }
    }

    pub fn class(&self) -> &Rc<ModelClass> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    pub fn values(&self) -> &[(String, Dynamic)] {
        &self.values
    }

    /// Read a field; declared-but-unset fields read as unit.
    pub fn get(&self, name: &str) -> Result<Dynamic, MissingAttribute> {
        if let Some((_, value)) = self.values.iter().find(|(field, _)| field == name) {
            return Ok(value.clone());
        }
        if self.class.field(name).is_some() {
            return Ok(Dynamic::UNIT);
        }
        Err(MissingAttribute {
            type_name: self.class.name.clone(),
            attribute: name.to_string(),
        })
    }

    pub fn set(&mut self, name: &str, value: Dynamic) -> Result<(), FieldError> {
        let field = self.class.field(name).ok_or_else(|| {
            FieldError::Missing(MissingAttribute {
                type_name: self.class.name.clone(),
                attribute: name.to_string(),
            })
        })?;
        let found = value.type_name().to_string();
        let value = field.kind.coerce(value).ok_or_else(|| FieldError::Type {
            class: self.class.name.clone(),
            field: name.to_string(),
            expected: field.kind,
            found,
        })?;

        if let Some(slot) = self.values.iter_mut().find(|(field, _)| field == name) {
            slot.1 = value;
            return Ok(());
        }
        let position = self.class.fields.iter().position(|f| f.name == name);
        let insert_at = self
            .values
            .iter()
            .position(|(existing, _)| {
                self.class.fields.iter().position(|f| &f.name == existing) > position
            })
            .unwrap_or(self.values.len());
        self.values.insert(insert_at, (name.to_string(), value));
        Ok(())
    }

    /// Primary key value, if the class has one and it is set.
    pub fn id(&self) -> Option<INT> {
        let key = self.class.primary_key()?;
        self.get(&key.name).ok()?.as_int().ok()
    }
}

/// Classes plus the in-memory records of one handler.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    classes: Vec<Rc<ModelClass>>,
    rows: RefCell<BTreeMap<String, Vec<Record>>>,
}

impl ModelRegistry {
    pub fn new(classes: Vec<ModelClass>) -> Self {
        Self {
            classes: classes.into_iter().map(Rc::new).collect(),
            rows: RefCell::default(),
        }
    }

    pub fn classes(&self) -> &[Rc<ModelClass>] {
        &self.classes
    }

    pub fn class(&self, name: &str) -> Option<&Rc<ModelClass>> {
        self.classes.iter().find(|class| class.name == name)
    }

    /// Build a record of `class` from field/value pairs.
    pub fn instantiate<I>(&self, class: &str, values: I) -> Result<Record, FieldError>
    where
        I: IntoIterator<Item = (String, Dynamic)>,
    {
        let class = self.class(class).cloned().ok_or_else(|| {
            FieldError::Missing(MissingAttribute {
                type_name: "module".to_string(),
                attribute: class.to_string(),
            })
        })?;
        let mut record = Record::new(class);
        for (name, value) in values {
            record.set(&name, value)?;
        }
        Ok(record)
    }

    pub fn all(&self, class: &str) -> Vec<Record> {
        self.rows.borrow().get(class).cloned().unwrap_or_default()
    }

    pub fn find(&self, class: &str, id: INT) -> Option<Record> {
        self.rows
            .borrow()
            .get(class)?
            .iter()
            .find(|record| record.id() == Some(id))
            .cloned()
    }

    /// Store `record`, assigning the next primary key when unset. A record with
    /// an existing key replaces the stored one.
    pub fn add(&self, mut record: Record) -> Result<Record, FieldError> {
        let class = record.class_name().to_string();
        let mut rows = self.rows.borrow_mut();
        let table = rows.entry(class).or_default();
        if let Some(key) = record.class().primary_key().map(|f| f.name.clone()) {
            match record.id() {
                Some(id) => table.retain(|existing| existing.id() != Some(id)),
                None => {
                    let next = table.iter().filter_map(Record::id).max().unwrap_or(0) + 1;
                    record.set(&key, Dynamic::from(next))?;
                }
            }
        }
        table.push(record.clone());
        Ok(record)
    }
}
