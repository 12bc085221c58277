//! Upserts into the catalog's `/Names /JavaScript` name tree.
//!
//! Flat trees keep their `/Names` array sorted by key. Trees rooted in `/Kids`
//! get each entry written into the direct leaf whose key range holds it, or
//! the nearest one, with that leaf's `/Limits` widened to match. Only when no
//! direct kid is a leaf do the entries go into a new leaf, inserted into
//! `/Kids` at its key order.

use lopdf::{Dictionary, Object, ObjectId};

use crate::document::{kind_name, DocumentHandle};
use crate::vectors::VectorError;

const TREE_PATH: &[&[u8]] = &[b"Names", b"JavaScript"];

pub type NameEntry<'a> = (&'a [u8], Object);

enum Layout {
    Empty,
    InlineNames,
    IndirectNames(ObjectId),
    InlineKids(Vec<Object>),
    IndirectKids(ObjectId),
}

pub fn register_scripts(
    doc: &mut DocumentHandle,
    entries: &[NameEntry<'_>],
) -> Result<(), VectorError> {
    let catalog = doc.catalog_id()?;
    let layout = {
        let tree = doc.dict_path_mut(catalog, TREE_PATH)?;
        match (tree.get(b"Names").ok(), tree.get(b"Kids").ok()) {
            (Some(Object::Array(_)), _) => Layout::InlineNames,
            (Some(Object::Reference(id)), _) => Layout::IndirectNames(*id),
            (Some(other), _) => {
                return Err(VectorError::MalformedNameTree(format!(
                    "/Names is a {}",
                    kind_name(other)
                )))
            }
            (None, Some(Object::Array(kids))) => Layout::InlineKids(kids.clone()),
            (None, Some(Object::Reference(id))) => Layout::IndirectKids(*id),
            (None, Some(other)) => {
                return Err(VectorError::MalformedNameTree(format!(
                    "/Kids is a {}",
                    kind_name(other)
                )))
            }
            (None, None) => Layout::Empty,
        }
    };

    match layout {
        Layout::Empty => {
            let mut names = Vec::new();
            upsert_pairs(&mut names, entries)?;
            let tree = doc.dict_path_mut(catalog, TREE_PATH)?;
            tree.set("Names", Object::Array(names));
        }
        Layout::InlineNames => {
            let tree = doc.dict_path_mut(catalog, TREE_PATH)?;
            let limits = match tree.get_mut(b"Names") {
                Ok(Object::Array(names)) => {
                    upsert_pairs(names, entries)?;
                    limits_of(names)
                }
                _ => return Err(VectorError::MalformedNameTree("/Names vanished".into())),
            };
            refresh_limits(tree, limits);
        }
        Layout::IndirectNames(id) => {
            let names = doc.array_mut(id)?;
            upsert_pairs(names, entries)?;
            let limits = limits_of(names);
            let tree = doc.dict_path_mut(catalog, TREE_PATH)?;
            refresh_limits(tree, limits);
        }
        Layout::InlineKids(kids) => {
            if let Some((leaf, at)) = merge_into_kids(doc, &kids, entries)? {
                let tree = doc.dict_path_mut(catalog, TREE_PATH)?;
                match tree.get_mut(b"Kids") {
                    Ok(Object::Array(kids)) => kids.insert(at, Object::Reference(leaf)),
                    _ => return Err(VectorError::MalformedNameTree("/Kids vanished".into())),
                }
            }
        }
        Layout::IndirectKids(id) => {
            let kids = doc.array(id)?.clone();
            if let Some((leaf, at)) = merge_into_kids(doc, &kids, entries)? {
                doc.array_mut(id)?.insert(at, Object::Reference(leaf));
            }
        }
    }
    Ok(())
}

/// A direct kid of the tree root that holds its own `/Names` array.
struct Leaf {
    id: ObjectId,
    lower: Option<Vec<u8>>,
    keys: Vec<Vec<u8>>,
}

/// Writes each entry into the direct leaf that holds its key, else the last
/// leaf starting at or below it, else the first leaf. With no direct leaves,
/// returns a new leaf and the `/Kids` index that keeps the kids in key order.
fn merge_into_kids(
    doc: &mut DocumentHandle,
    kids: &[Object],
    entries: &[NameEntry<'_>],
) -> Result<Option<(ObjectId, usize)>, VectorError> {
    let view: &DocumentHandle = doc;
    let leaves: Vec<Leaf> = references(kids)
        .into_iter()
        .filter_map(|id| {
            let node = view.dict(id).ok()?;
            let Ok(Object::Array(names)) = node.get(b"Names") else {
                return None;
            };
            Some(Leaf { id, lower: lower_key(view, node), keys: string_keys(names) })
        })
        .collect();

    let mut buckets: Vec<Vec<NameEntry<'_>>> = leaves.iter().map(|_| Vec::new()).collect();
    let mut pending: Vec<NameEntry<'_>> = Vec::new();
    for entry in entries {
        let key = entry.0;
        let target = leaves
            .iter()
            .position(|leaf| leaf.keys.iter().any(|k| k.as_slice() == key))
            .or_else(|| {
                leaves.iter().rposition(|leaf| leaf.lower.as_deref().is_some_and(|low| low <= key))
            })
            .or_else(|| leaves.iter().position(|leaf| leaf.lower.is_some()));
        match target {
            Some(index) => buckets[index].push(entry.clone()),
            None => pending.push(entry.clone()),
        }
    }

    for (leaf, bucket) in leaves.iter().zip(&buckets) {
        if bucket.is_empty() {
            continue;
        }
        let node = doc.dict_mut(leaf.id)?;
        let limits = match node.get_mut(b"Names") {
            Ok(Object::Array(names)) => {
                upsert_pairs(names, bucket)?;
                limits_of(names)
            }
            _ => return Err(VectorError::MalformedNameTree("leaf /Names vanished".into())),
        };
        if let Some(limits) = limits {
            node.set("Limits", limits);
        }
    }

    if pending.is_empty() {
        return Ok(None);
    }
    let mut names = Vec::new();
    upsert_pairs(&mut names, &pending)?;
    let first = string_keys(&names).into_iter().next().unwrap_or_default();
    let view: &DocumentHandle = doc;
    let at = kids
        .iter()
        .position(|kid| {
            let node = view.resolve(kid).ok().and_then(|node| node.as_dict().ok());
            node.and_then(|node| lower_key(view, node)).is_some_and(|low| low > first)
        })
        .unwrap_or(kids.len());
    let mut leaf = Dictionary::new();
    if let Some(limits) = limits_of(&names) {
        leaf.set("Limits", limits);
    }
    leaf.set("Names", Object::Array(names));
    Ok(Some((doc.add_object(Object::Dictionary(leaf)), at)))
}

/// Smallest key under a node: its first `/Limits` entry, else its first name.
fn lower_key(doc: &DocumentHandle, node: &Dictionary) -> Option<Vec<u8>> {
    let bound = match node.get(b"Limits") {
        Ok(Object::Array(limits)) => limits.first(),
        _ => match node.get(b"Names").ok().and_then(|names| doc.resolve(names).ok()) {
            Some(Object::Array(names)) => names.first(),
            _ => None,
        },
    };
    match bound? {
        Object::String(key, _) => Some(key.clone()),
        _ => None,
    }
}

fn string_keys(names: &[Object]) -> Vec<Vec<u8>> {
    names
        .chunks_exact(2)
        .filter_map(|pair| match &pair[0] {
            Object::String(key, _) => Some(key.clone()),
            _ => None,
        })
        .collect()
}

/// Inserts or replaces key/value pairs in a flat name array, keeping it sorted.
pub fn upsert_pairs(array: &mut Vec<Object>, entries: &[NameEntry<'_>]) -> Result<(), VectorError> {
    if array.len() % 2 != 0 {
        return Err(VectorError::MalformedNameTree(format!(
            "/Names has an odd number of elements ({})",
            array.len()
        )));
    }
    let mut pairs = array
        .chunks_exact(2)
        .map(|pair| match &pair[0] {
            Object::String(key, _) => Ok((key.clone(), pair[1].clone())),
            other => Err(VectorError::MalformedNameTree(format!(
                "name tree key is a {}",
                kind_name(other)
            ))),
        })
        .collect::<Result<Vec<(Vec<u8>, Object)>, VectorError>>()?;
    for (key, value) in entries {
        match pairs.iter_mut().find(|(existing, _)| existing.as_slice() == *key) {
            Some(slot) => slot.1 = value.clone(),
            None => pairs.push((key.to_vec(), value.clone())),
        }
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    *array = pairs
        .into_iter()
        .flat_map(|(key, value)| [Object::string_literal(key), value])
        .collect();
    Ok(())
}

fn limits_of(names: &[Object]) -> Option<Object> {
    let first = names.first()?.clone();
    let last = names.get(names.len().checked_sub(2)?)?.clone();
    Some(Object::Array(vec![first, last]))
}

fn refresh_limits(node: &mut Dictionary, limits: Option<Object>) {
    if !node.has(b"Limits") {
        return;
    }
    if let Some(limits) = limits {
        node.set("Limits", limits);
    }
}

fn references(items: &[Object]) -> Vec<ObjectId> {
    items.iter().filter_map(|item| item.as_reference().ok()).collect()
}
