use std::fmt;
use std::io::Write;

use lopdf::xref::XrefType;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use crate::action::{Action, ActionRef};
use crate::vectors::VectorError;

const MAX_REFERENCE_HOPS: usize = 32;
const MAX_FIELD_DEPTH: usize = 32;

/// Trailer keys copied from a loaded cross-reference stream dictionary. They
/// are stale once the document is written with a classic table.
const XREF_STREAM_TRAILER_KEYS: &[&[u8]] =
    &[b"Type", b"W", b"Index", b"Filter", b"DecodeParms", b"Length", b"XRefStm", b"Prev"];

#[derive(Debug, Clone)]
pub struct LoadError(pub String);

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load PDF: {}", self.0)
    }
}

impl std::error::Error for LoadError {}

#[derive(Debug, Clone)]
pub struct SerializeError(pub String);

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to serialize PDF: {}", self.0)
    }
}

impl std::error::Error for SerializeError {}

/// Options applied when writing a handle back to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeProfile {
    /// Ask viewers to rebuild widget appearances that are missing.
    pub refresh_form_appearances: bool,
}

impl SerializeProfile {
    pub fn compatibility() -> Self {
        Self { refresh_form_appearances: true }
    }

    pub fn minimal() -> Self {
        Self { refresh_form_appearances: false }
    }
}

/// Exclusive, mutable view of one parsed document's object graph.
///
/// A handle lives for a single processing call: created by [`DocumentHandle::load`],
/// mutated by the injection vectors and consumed by [`DocumentHandle::serialize`].
pub struct DocumentHandle {
    doc: Document,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Missing,
    Inline,
    Indirect(ObjectId),
    Invalid(&'static str),
}

impl DocumentHandle {
    pub fn load(bytes: &[u8]) -> Result<Self, LoadError> {
        let doc = Document::load_mem(bytes).map_err(|err| LoadError(err.to_string()))?;
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(LoadError("encrypted documents are not supported".into()));
        }
        if doc.trailer.get(b"Root").and_then(Object::as_reference).is_err() {
            return Err(LoadError("trailer has no /Root reference".into()));
        }
        Ok(Self { doc })
    }

    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn catalog_id(&self) -> Result<ObjectId, VectorError> {
        self.doc
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|_| VectorError::MissingCatalog)
    }

    pub fn embed_action(&mut self, action: &Action) -> ActionRef {
        ActionRef(self.doc.add_object(action.to_dictionary()))
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Option<Object> {
        self.doc.objects.remove(&id)
    }

    pub fn add_object(&mut self, object: Object) -> ObjectId {
        self.doc.add_object(object)
    }

    pub fn dict(&self, id: ObjectId) -> Result<&Dictionary, VectorError> {
        match self.doc.objects.get(&id) {
            Some(Object::Dictionary(dict)) => Ok(dict),
            Some(other) => Err(VectorError::UnexpectedType {
                location: object_label(id),
                expected: "dictionary",
                found: kind_name(other),
            }),
            None => Err(VectorError::DanglingReference(id)),
        }
    }

    pub fn dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary, VectorError> {
        match self.doc.objects.get_mut(&id) {
            Some(Object::Dictionary(dict)) => Ok(dict),
            Some(other) => Err(VectorError::UnexpectedType {
                location: object_label(id),
                expected: "dictionary",
                found: kind_name(other),
            }),
            None => Err(VectorError::DanglingReference(id)),
        }
    }

    /// Follows references until a direct object is reached.
    pub fn resolve<'a>(&'a self, mut object: &'a Object) -> Result<&'a Object, VectorError> {
        for _ in 0..MAX_REFERENCE_HOPS {
            match object {
                Object::Reference(id) => {
                    object = self.doc.objects.get(id).ok_or(VectorError::DanglingReference(*id))?;
                }
                direct => return Ok(direct),
            }
        }
        Err(VectorError::ReferenceLoop)
    }

    /// Walks `path` from the dictionary object `owner`, creating missing
    /// dictionaries on the way. Intermediate entries may be inline or
    /// indirect; the returned dictionary is whichever one the last key names.
    pub fn dict_path_mut(
        &mut self,
        owner: ObjectId,
        path: &[&[u8]],
    ) -> Result<&mut Dictionary, VectorError> {
        let mut anchor = owner;
        let mut inline: Vec<&[u8]> = Vec::new();
        for &key in path {
            let slot = {
                let dict = self.inline_dict_mut(anchor, &inline)?;
                classify_slot(dict, key)
            };
            match slot {
                Slot::Indirect(id) => {
                    anchor = id;
                    inline.clear();
                }
                Slot::Inline => inline.push(key),
                Slot::Missing => {
                    let dict = self.inline_dict_mut(anchor, &inline)?;
                    dict.set(key.to_vec(), Dictionary::new());
                    inline.push(key);
                }
                Slot::Invalid(found) => {
                    return Err(VectorError::UnexpectedType {
                        location: format!("{} /{}", object_label(anchor), key_label(key)),
                        expected: "dictionary",
                        found,
                    });
                }
            }
        }
        self.inline_dict_mut(anchor, &inline)
    }

    fn inline_dict_mut(
        &mut self,
        anchor: ObjectId,
        inline: &[&[u8]],
    ) -> Result<&mut Dictionary, VectorError> {
        let mut dict = self.dict_mut(anchor)?;
        for key in inline {
            dict = match dict.get_mut(key) {
                Ok(Object::Dictionary(child)) => child,
                Ok(other) => {
                    return Err(VectorError::UnexpectedType {
                        location: format!("{} /{}", object_label(anchor), key_label(key)),
                        expected: "dictionary",
                        found: kind_name(other),
                    })
                }
                Err(_) => {
                    return Err(VectorError::UnexpectedType {
                        location: format!("{} /{}", object_label(anchor), key_label(key)),
                        expected: "dictionary",
                        found: "nothing",
                    })
                }
            };
        }
        Ok(dict)
    }

    pub fn array(&self, id: ObjectId) -> Result<&Vec<Object>, VectorError> {
        match self.doc.objects.get(&id) {
            Some(Object::Array(items)) => Ok(items),
            Some(other) => Err(VectorError::UnexpectedType {
                location: object_label(id),
                expected: "array",
                found: kind_name(other),
            }),
            None => Err(VectorError::DanglingReference(id)),
        }
    }

    pub fn array_mut(&mut self, id: ObjectId) -> Result<&mut Vec<Object>, VectorError> {
        match self.doc.objects.get_mut(&id) {
            Some(Object::Array(items)) => Ok(items),
            Some(other) => Err(VectorError::UnexpectedType {
                location: object_label(id),
                expected: "array",
                found: kind_name(other),
            }),
            None => Err(VectorError::DanglingReference(id)),
        }
    }

    pub fn first_page_id(&self) -> Option<ObjectId> {
        self.doc.get_pages().values().next().copied()
    }

    /// Returns the top-level `/AcroForm /Fields` entries as object ids.
    pub fn form_field_ids(&self) -> Result<Vec<ObjectId>, VectorError> {
        let catalog = self.dict(self.catalog_id()?)?;
        let Ok(acroform) = catalog.get(b"AcroForm") else {
            return Ok(Vec::new());
        };
        let acroform = match self.resolve(acroform)? {
            Object::Dictionary(dict) => dict,
            other => {
                return Err(VectorError::UnexpectedType {
                    location: "catalog /AcroForm".into(),
                    expected: "dictionary",
                    found: kind_name(other),
                })
            }
        };
        let Ok(fields) = acroform.get(b"Fields") else {
            return Ok(Vec::new());
        };
        match self.resolve(fields)? {
            Object::Array(items) => {
                Ok(items.iter().filter_map(|o| o.as_reference().ok()).collect())
            }
            other => Err(VectorError::UnexpectedType {
                location: "/AcroForm /Fields".into(),
                expected: "array",
                found: kind_name(other),
            }),
        }
    }

    /// First terminal form field, descending through `/Kids` entries that are
    /// themselves fields (they carry a `/T` partial name) rather than widgets.
    pub fn first_terminal_field_id(&self) -> Result<Option<ObjectId>, VectorError> {
        let Some(mut field) = self.form_field_ids()?.first().copied() else {
            return Ok(None);
        };
        for _ in 0..MAX_FIELD_DEPTH {
            let dict = self.dict(field)?;
            let Some(child) = self.first_child_field(dict)? else {
                return Ok(Some(field));
            };
            field = child;
        }
        Err(VectorError::ReferenceLoop)
    }

    fn first_child_field(&self, dict: &Dictionary) -> Result<Option<ObjectId>, VectorError> {
        let Ok(kids) = dict.get(b"Kids") else {
            return Ok(None);
        };
        let Object::Array(kids) = self.resolve(kids)? else {
            return Ok(None);
        };
        let Some(first) = kids.first().and_then(|k| k.as_reference().ok()) else {
            return Ok(None);
        };
        let is_field = self.dict(first).map(|kid| kid.has(b"T")).unwrap_or(false);
        Ok(is_field.then_some(first))
    }

    /// True when some terminal field or widget has no `/AP` entry.
    fn has_fields_without_appearance(&self) -> bool {
        let Ok(roots) = self.form_field_ids() else {
            return false;
        };
        let mut stack: Vec<(ObjectId, usize)> = roots.into_iter().map(|id| (id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let Ok(dict) = self.dict(id) else {
                continue;
            };
            let kids = dict
                .get(b"Kids")
                .ok()
                .and_then(|k| self.resolve(k).ok())
                .and_then(|k| k.as_array().ok());
            match kids {
                Some(kids) if !kids.is_empty() && depth < MAX_FIELD_DEPTH => {
                    stack.extend(
                        kids.iter().filter_map(|k| k.as_reference().ok()).map(|k| (k, depth + 1)),
                    );
                }
                _ => {
                    if !dict.has(b"AP") {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Writes the handle with a classic cross-reference table. Object and
    /// cross-reference streams left over from loading are dropped; their
    /// contents were already expanded into the object table.
    pub fn serialize(self, profile: &SerializeProfile) -> Result<Vec<u8>, SerializeError> {
        let mut out = Vec::new();
        self.serialize_to(profile, &mut out)?;
        Ok(out)
    }

    pub fn serialize_to<W: Write>(
        mut self,
        profile: &SerializeProfile,
        target: &mut W,
    ) -> Result<(), SerializeError> {
        let removed = self.strip_object_streams();
        if removed > 0 {
            debug!(removed, "Dropped object and cross-reference streams");
        }
        if profile.refresh_form_appearances && self.has_fields_without_appearance() {
            if let Ok(catalog) = self.catalog_id() {
                if let Ok(acroform) = self.dict_path_mut(catalog, &[b"AcroForm"]) {
                    acroform.set("NeedAppearances", true);
                    debug!("Requested appearance regeneration for form fields");
                }
            }
        }
        // lopdf picks the output xref format from the loaded document.
        self.doc.reference_table.cross_reference_type = XrefType::CrossReferenceTable;
        self.doc.save_to(target).map_err(|err| SerializeError(err.to_string()))
    }

    fn strip_object_streams(&mut self) -> usize {
        let containers: Vec<ObjectId> = self
            .doc
            .objects
            .iter()
            .filter_map(|(id, object)| match object {
                Object::Stream(stream) => {
                    let kind = stream.dict.get(b"Type").and_then(Object::as_name).ok()?;
                    (kind == b"ObjStm" || kind == b"XRef").then_some(*id)
                }
                _ => None,
            })
            .collect();
        for id in &containers {
            self.doc.objects.remove(id);
        }
        for key in XREF_STREAM_TRAILER_KEYS {
            self.doc.trailer.remove(key);
        }
        containers.len()
    }
}

fn classify_slot(dict: &Dictionary, key: &[u8]) -> Slot {
    match dict.get(key) {
        Ok(Object::Reference(id)) => Slot::Indirect(*id),
        Ok(Object::Dictionary(_)) => Slot::Inline,
        Ok(Object::Null) | Err(_) => Slot::Missing,
        Ok(other) => Slot::Invalid(kind_name(other)),
    }
}

pub fn kind_name(object: &Object) -> &'static str {
    match object {
        Object::Null => "null",
        Object::Boolean(_) => "boolean",
        Object::Integer(_) => "integer",
        Object::Real(_) => "real",
        Object::Name(_) => "name",
        Object::String(_, _) => "string",
        Object::Array(_) => "array",
        Object::Dictionary(_) => "dictionary",
        Object::Stream(_) => "stream",
        Object::Reference(_) => "reference",
    }
}

pub fn object_label(id: ObjectId) -> String {
    format!("{} {} obj", id.0, id.1)
}

pub(crate) fn key_label(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}
