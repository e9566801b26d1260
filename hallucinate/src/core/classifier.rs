//! Deterministic classification of turn errors into corrective follow-ups.
//!
//! Errors arrive as an [`ErrorDescription`]; the only string sniffing happens in
//! [`describe_template_error`], which extracts subject and member from a
//! template engine message.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::response::CODE_TAG;

/// Matches `'Product object' has no attribute 'foo'`, with an optional
/// module-style qualifier before the class name.
static UNDEFINED_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'(?:[\w.]+\.)?(\w+) object' has no attribute '(\w+)'")
        .expect("undefined attribute regex is valid")
});

/// Normalized error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Attribute lookup failed on an instance of a described model class.
    MissingAttribute,
    /// A template touched an undefined value.
    UndefinedTemplateValue,
    /// Anything else.
    Other,
}

/// Normalized view of an error observed during one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescription {
    pub kind: ErrorKind,
    /// Type name of the object the lookup failed on.
    pub subject: Option<String>,
    /// Missing member name.
    pub member: Option<String>,
}

impl ErrorDescription {
    pub fn missing_attribute(subject: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::MissingAttribute,
            subject: Some(subject.into()),
            member: Some(member.into()),
        }
    }

    pub fn other() -> Self {
        Self {
            kind: ErrorKind::Other,
            subject: None,
            member: None,
        }
    }
}

/// Parse a template rendering error message.
pub fn describe_template_error(message: &str) -> ErrorDescription {
    match UNDEFINED_ATTRIBUTE.captures(message) {
        Some(caps) => ErrorDescription {
            kind: ErrorKind::UndefinedTemplateValue,
            subject: caps.get(1).map(|m| m.as_str().to_string()),
            member: caps.get(2).map(|m| m.as_str().to_string()),
        },
        None => ErrorDescription {
            kind: ErrorKind::UndefinedTemplateValue,
            subject: None,
            member: None,
        },
    }
}

/// Decide whether an error deserves a corrective follow-up.
///
/// `is_bound_class(name)` must report whether `name` is still bound in the
/// namespace to the described model class of that same name.
pub fn corrective_follow_up<F>(error: &ErrorDescription, is_bound_class: F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    match (error.kind, error.subject.as_deref(), error.member.as_deref()) {
        (
            ErrorKind::MissingAttribute | ErrorKind::UndefinedTemplateValue,
            Some(subject),
            Some(member),
        ) if is_bound_class(subject) => Some(suggest_inspect(subject, member)),
        _ => None,
    }
}

/// Scripted agent turn that inspects a model class before trying again.
pub fn suggest_inspect(model: &str, attribute: &str) -> String {
    format!(
        " I should avoid features that need {model}.{attribute} since it doesn't exist. \
What information does the database have about this {model}?\n```{CODE_TAG}\nprint(describe({model}));"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::response::{ToolKind, parse_response};

    fn bound(names: &'static [&'static str]) -> impl Fn(&str) -> bool {
        move |name| names.iter().any(|bound| *bound == name)
    }

    #[test]
    fn missing_attribute_on_bound_class_suggests_inspect() {
        let error = ErrorDescription::missing_attribute("Product", "colour");
        let follow_up = corrective_follow_up(&error, bound(&["Product"])).expect("follow-up");
        assert!(follow_up.contains("Product.colour"));
        assert!(follow_up.ends_with("print(describe(Product));"));
    }

    #[test]
    fn missing_attribute_on_unbound_class_is_ignored() {
        let error = ErrorDescription::missing_attribute("Product", "colour");
        assert_eq!(corrective_follow_up(&error, bound(&["Order"])), None);
    }

    #[test]
    fn other_errors_are_ignored() {
        assert_eq!(
            corrective_follow_up(&ErrorDescription::other(), bound(&["Product"])),
            None
        );
    }

    #[test]
    fn template_message_yields_subject_and_member() {
        let error = describe_template_error("'Product object' has no attribute 'colour'");
        assert_eq!(error.kind, ErrorKind::UndefinedTemplateValue);
        assert_eq!(error.subject.as_deref(), Some("Product"));
        assert_eq!(error.member.as_deref(), Some("colour"));
    }

    #[test]
    fn template_message_accepts_qualified_class() {
        let error = describe_template_error("'app.models.Order object' has no attribute 'total'");
        assert_eq!(error.subject.as_deref(), Some("Order"));
        assert_eq!(error.member.as_deref(), Some("total"));
    }

    #[test]
    fn unrelated_template_message_has_no_subject() {
        let error = describe_template_error("undefined value (in <string>:1)");
        assert_eq!(error.subject, None);
        assert_eq!(corrective_follow_up(&error, bound(&["Product"])), None);
    }

    #[test]
    fn suggestion_is_a_well_formed_code_turn() {
        let parsed = parse_response(&suggest_inspect("Order", "total")).expect("parse");
        assert_eq!(parsed.tool, ToolKind::CodeExec);
        assert_eq!(parsed.code, "print(describe(Order));");
    }
}
