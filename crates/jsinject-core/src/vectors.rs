use std::fmt;

use lopdf::ObjectId;
use serde::Serialize;

use crate::action::ActionRef;
use crate::document::{object_label, DocumentHandle};
use crate::name_tree::register_scripts;

/// Script name used by the direct registration vector.
pub const EMBEDDED_SCRIPT_NAME: &[u8] = b"EmbeddedScript";
/// Secondary name used by the names-tree vector.
pub const AUTO_EXECUTE_NAME: &[u8] = b"AutoExecute";

/// Catalog `/AA` slots: open, will-save, did-save, will-print, did-print, will-close.
pub const DOCUMENT_EVENTS: &[&[u8]] = &[b"O", b"WS", b"DS", b"WP", b"DP", b"WC"];
/// Page `/AA` slots: open, close.
pub const PAGE_EVENTS: &[&[u8]] = &[b"O", b"C"];
/// Field `/AA` slots: format, keystroke, validate, calculate.
pub const FIELD_EVENTS: &[&[u8]] = &[b"F", b"K", b"V", b"C"];

#[derive(Debug, Clone)]
pub enum VectorError {
    MissingCatalog,
    NoPages,
    NoFormFields,
    DanglingReference(ObjectId),
    ReferenceLoop,
    UnexpectedType { location: String, expected: &'static str, found: &'static str },
    MalformedNameTree(String),
    Panicked,
}

impl fmt::Display for VectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCatalog => write!(f, "document catalog not found"),
            Self::NoPages => write!(f, "document has no pages"),
            Self::NoFormFields => write!(f, "document has no form fields"),
            Self::DanglingReference(id) => {
                write!(f, "reference to missing object {}", object_label(*id))
            }
            Self::ReferenceLoop => write!(f, "reference chain too deep or cyclic"),
            Self::UnexpectedType { location, expected, found } => {
                write!(f, "{location}: expected {expected}, found {found}")
            }
            Self::MalformedNameTree(msg) => write!(f, "malformed JavaScript name tree: {msg}"),
            Self::Panicked => write!(f, "vector panicked while editing the document"),
        }
    }
}

impl std::error::Error for VectorError {}

/// Structural level an injection vector attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorScope {
    Registration,
    Document,
    Page,
    FormField,
}

impl VectorScope {
    pub fn as_str(self) -> &'static str {
        match self {
            VectorScope::Registration => "registration",
            VectorScope::Document => "document",
            VectorScope::Page => "page",
            VectorScope::FormField => "form_field",
        }
    }
}

/// One strategy for attaching an action somewhere in the object graph.
///
/// Implementations are stateless and must not depend on any other vector
/// having run before them.
pub trait InjectionVector: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn scope(&self) -> VectorScope;
    fn apply(&self, doc: &mut DocumentHandle, action: ActionRef) -> Result<(), VectorError>;

    fn matches(&self, selector: &str) -> bool {
        let selector = selector.trim();
        selector == self.name() || selector.eq_ignore_ascii_case(self.id())
    }
}

struct NameRegistrationVector;

impl InjectionVector for NameRegistrationVector {
    fn id(&self) -> &'static str {
        "name_registration"
    }
    fn name(&self) -> &'static str {
        "Standard Injection"
    }
    fn description(&self) -> &'static str {
        "Registers the script in the document-level JavaScript name table"
    }
    fn scope(&self) -> VectorScope {
        VectorScope::Registration
    }
    fn apply(&self, doc: &mut DocumentHandle, action: ActionRef) -> Result<(), VectorError> {
        register_scripts(doc, &[(EMBEDDED_SCRIPT_NAME, action.object())])
    }
}

struct OpenActionVector;

impl InjectionVector for OpenActionVector {
    fn id(&self) -> &'static str {
        "open_action"
    }
    fn name(&self) -> &'static str {
        "OpenAction Injection"
    }
    fn description(&self) -> &'static str {
        "Executes JavaScript when the document opens"
    }
    fn scope(&self) -> VectorScope {
        VectorScope::Document
    }
    fn apply(&self, doc: &mut DocumentHandle, action: ActionRef) -> Result<(), VectorError> {
        let catalog = doc.catalog_id()?;
        doc.dict_mut(catalog)?.set("OpenAction", action.object());
        Ok(())
    }
}

struct DocumentActionsVector;

impl InjectionVector for DocumentActionsVector {
    fn id(&self) -> &'static str {
        "document_additional_actions"
    }
    fn name(&self) -> &'static str {
        "Additional Actions"
    }
    fn description(&self) -> &'static str {
        "Uses the catalog AA dictionary for open, save, print and close events"
    }
    fn scope(&self) -> VectorScope {
        VectorScope::Document
    }
    fn apply(&self, doc: &mut DocumentHandle, action: ActionRef) -> Result<(), VectorError> {
        let catalog = doc.catalog_id()?;
        attach_events(doc, catalog, DOCUMENT_EVENTS, action)
    }
}

struct NamesTreeVector;

impl InjectionVector for NamesTreeVector {
    fn id(&self) -> &'static str {
        "names_tree"
    }
    fn name(&self) -> &'static str {
        "Names Dictionary"
    }
    fn description(&self) -> &'static str {
        "Embeds the script in the Names dictionary under two names"
    }
    fn scope(&self) -> VectorScope {
        VectorScope::Registration
    }
    fn apply(&self, doc: &mut DocumentHandle, action: ActionRef) -> Result<(), VectorError> {
        register_scripts(
            doc,
            &[(EMBEDDED_SCRIPT_NAME, action.object()), (AUTO_EXECUTE_NAME, action.object())],
        )
    }
}

struct PageActionsVector;

impl InjectionVector for PageActionsVector {
    fn id(&self) -> &'static str {
        "page_additional_actions"
    }
    fn name(&self) -> &'static str {
        "Page Actions"
    }
    fn description(&self) -> &'static str {
        "Runs the script when the first page is opened or closed"
    }
    fn scope(&self) -> VectorScope {
        VectorScope::Page
    }
    fn apply(&self, doc: &mut DocumentHandle, action: ActionRef) -> Result<(), VectorError> {
        let page = doc.first_page_id().ok_or(VectorError::NoPages)?;
        attach_events(doc, page, PAGE_EVENTS, action)
    }
}

struct FormFieldActionsVector;

impl InjectionVector for FormFieldActionsVector {
    fn id(&self) -> &'static str {
        "form_field_additional_actions"
    }
    fn name(&self) -> &'static str {
        "Form Actions"
    }
    fn description(&self) -> &'static str {
        "Embeds the script in the first form field's format, keystroke, validate and \
         calculate events"
    }
    fn scope(&self) -> VectorScope {
        VectorScope::FormField
    }
    fn apply(&self, doc: &mut DocumentHandle, action: ActionRef) -> Result<(), VectorError> {
        let field = doc.first_terminal_field_id()?.ok_or(VectorError::NoFormFields)?;
        attach_events(doc, field, FIELD_EVENTS, action)
    }
}

/// Merges `action` into the `/AA` dictionary of `owner` under every key.
fn attach_events(
    doc: &mut DocumentHandle,
    owner: ObjectId,
    keys: &[&[u8]],
    action: ActionRef,
) -> Result<(), VectorError> {
    let aa = doc.dict_path_mut(owner, &[b"AA"])?;
    for key in keys {
        aa.set(key.to_vec(), action.object());
    }
    Ok(())
}

static REGISTRY: &[&dyn InjectionVector] = &[
    &NameRegistrationVector,
    &OpenActionVector,
    &DocumentActionsVector,
    &NamesTreeVector,
    &PageActionsVector,
    &FormFieldActionsVector,
];

/// Every injection vector, in application order.
pub fn registry() -> &'static [&'static dyn InjectionVector] {
    REGISTRY
}

pub fn find_vector(selector: &str) -> Option<&'static dyn InjectionVector> {
    REGISTRY.iter().copied().find(|vector| vector.matches(selector))
}

pub fn vector_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|vector| vector.name()).collect()
}
