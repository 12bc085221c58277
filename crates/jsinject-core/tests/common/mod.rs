#![allow(dead_code)]

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

pub const PAYLOAD: &str = "app.alert('hi');";

/// Builds a small document in memory. `customise` runs with the catalog id
/// and page ids before the document is saved.
pub fn build_pdf<F>(pages: usize, customise: F) -> Vec<u8>
where
    F: FnOnce(&mut Document, ObjectId, &[ObjectId]),
{
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut page_ids = Vec::new();
    for index in 0..pages {
        let content = format!("BT /F1 12 Tf 72 720 Td (Page {index}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        page_ids.push(page_id);
    }
    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    customise(&mut doc, catalog_id, &page_ids);
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save fixture");
    out
}

pub fn plain_pdf() -> Vec<u8> {
    build_pdf(2, |_, _, _| {})
}

/// One text field with a widget on the first page and no appearance stream.
pub fn form_pdf() -> Vec<u8> {
    build_pdf(1, |doc, catalog, pages| {
        let field_id = doc.add_object(dictionary! {
            "FT" => "Tx",
            "T" => Object::string_literal("email"),
            "Subtype" => "Widget",
            "Rect" => vec![100.into(), 600.into(), 300.into(), 620.into()],
            "P" => pages[0],
        });
        catalog_dict(doc, catalog).set(
            "AcroForm",
            dictionary! { "Fields" => vec![Object::Reference(field_id)] },
        );
    })
}

pub fn catalog_dict(doc: &mut Document, catalog: ObjectId) -> &mut Dictionary {
    match doc.objects.get_mut(&catalog) {
        Some(Object::Dictionary(dict)) => dict,
        other => panic!("catalog is not a dictionary: {other:?}"),
    }
}

pub fn reload(bytes: &[u8]) -> Document {
    Document::load_mem(bytes).expect("output should reload")
}

pub fn catalog(doc: &Document) -> &Dictionary {
    let id = doc.trailer.get(b"Root").and_then(Object::as_reference).expect("root ref");
    doc.get_object(id).and_then(Object::as_dict).expect("catalog dict")
}

/// Follows a reference if `object` is one.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).expect("reference target"),
        direct => direct,
    }
}

pub fn dict_at<'a>(doc: &'a Document, owner: &'a Dictionary, key: &[u8]) -> &'a Dictionary {
    let entry = owner
        .get(key)
        .unwrap_or_else(|_| panic!("missing /{}", String::from_utf8_lossy(key)));
    resolve(doc, entry).as_dict().expect("dictionary entry")
}

/// Payload text of the JavaScript action referenced by `object`.
pub fn script_of(doc: &Document, object: &Object) -> String {
    let action = resolve(doc, object).as_dict().expect("action dict");
    assert_eq!(action.get(b"S").and_then(Object::as_name).ok(), Some(&b"JavaScript"[..]));
    match resolve(doc, action.get(b"JS").expect("JS entry")) {
        Object::String(bytes, _) => jsinject_core::action::decode_text_string(bytes),
        other => panic!("unexpected JS entry {other:?}"),
    }
}

pub fn sorted_keys(dict: &Dictionary) -> Vec<String> {
    let mut keys: Vec<String> =
        dict.iter().map(|(key, _)| String::from_utf8_lossy(key).into_owned()).collect();
    keys.sort();
    keys
}

/// Keys of a flat name-tree node.
pub fn name_keys(doc: &Document, node: &Dictionary) -> Vec<String> {
    let names = resolve(doc, node.get(b"Names").expect("Names array")).as_array().expect("array");
    names
        .chunks_exact(2)
        .map(|pair| match &pair[0] {
            Object::String(key, _) => String::from_utf8_lossy(key).into_owned(),
            other => panic!("unexpected name key {other:?}"),
        })
        .collect()
}
