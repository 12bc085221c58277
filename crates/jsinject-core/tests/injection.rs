mod common;

use common::*;
use js_risk::RiskTier;
use jsinject_core::{process_document, FailureKind, InjectionOptions};
use lopdf::{dictionary, Object};

fn all_vectors() -> InjectionOptions {
    InjectionOptions::default()
}

fn only(methods: &[&str]) -> InjectionOptions {
    InjectionOptions {
        use_all_methods: false,
        selected_methods: Some(methods.iter().map(|m| m.to_string()).collect()),
        ..InjectionOptions::default()
    }
}

#[test]
fn document_without_fields_skips_only_the_form_vector() {
    let result = process_document("plain.pdf", &plain_pdf(), PAYLOAD, &all_vectors());
    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(
        result.applied_vectors,
        vec![
            "Standard Injection",
            "OpenAction Injection",
            "Additional Actions",
            "Names Dictionary",
            "Page Actions",
        ]
    );
    assert_eq!(result.vector_failures.len(), 1);
    assert_eq!(result.vector_failures[0].vector, "Form Actions");
    assert!(result.vector_failures[0].error.contains("no form fields"));
    assert_eq!(result.output_name, "js_injected_plain.pdf");
    assert!(result.validation.valid);
    assert_eq!(result.validation.tier, RiskTier::Low);
}

#[test]
fn every_trigger_point_references_the_payload() {
    let result = process_document("form.pdf", &form_pdf(), PAYLOAD, &all_vectors());
    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert!(result.vector_failures.is_empty(), "failures: {:?}", result.vector_failures);
    let doc = reload(result.output.as_deref().expect("output bytes"));
    let root = catalog(&doc);

    let open = root.get(b"OpenAction").expect("OpenAction");
    assert!(matches!(open, Object::Reference(_)), "action should be an indirect object");
    assert_eq!(script_of(&doc, open), PAYLOAD);

    let aa = dict_at(&doc, root, b"AA");
    assert_eq!(sorted_keys(aa), vec!["DP", "DS", "O", "WC", "WP", "WS"]);
    for (_, action) in aa.iter() {
        assert_eq!(
            action.as_reference().ok(),
            open.as_reference().ok(),
            "all document events share one action object"
        );
    }

    let scripts = dict_at(&doc, dict_at(&doc, root, b"Names"), b"JavaScript");
    assert_eq!(name_keys(&doc, scripts), vec!["AutoExecute", "EmbeddedScript"]);

    let first_page = *doc.get_pages().values().next().expect("page");
    let page = doc.get_object(first_page).and_then(Object::as_dict).expect("page dict");
    assert_eq!(sorted_keys(dict_at(&doc, page, b"AA")), vec!["C", "O"]);

    let acroform = dict_at(&doc, root, b"AcroForm");
    let fields = acroform.get(b"Fields").and_then(Object::as_array).expect("fields");
    let field = resolve(&doc, &fields[0]).as_dict().expect("field dict");
    let field_aa = dict_at(&doc, field, b"AA");
    assert_eq!(sorted_keys(field_aa), vec!["C", "F", "K", "V"]);
    assert_eq!(script_of(&doc, field_aa.get(b"K").expect("keystroke")), PAYLOAD);
}

#[test]
fn compatibility_profile_requests_field_appearances() {
    let result = process_document("form.pdf", &form_pdf(), PAYLOAD, &all_vectors());
    let doc = reload(result.output.as_deref().expect("output bytes"));
    let acroform = dict_at(&doc, catalog(&doc), b"AcroForm");
    assert_eq!(acroform.get(b"NeedAppearances").and_then(Object::as_bool).ok(), Some(true));

    let minimal = InjectionOptions { optimize_for_compatibility: false, ..all_vectors() };
    let result = process_document("form.pdf", &form_pdf(), PAYLOAD, &minimal);
    let doc = reload(result.output.as_deref().expect("output bytes"));
    let acroform = dict_at(&doc, catalog(&doc), b"AcroForm");
    assert!(acroform.get(b"NeedAppearances").is_err());
}

#[test]
fn untouched_document_round_trips() {
    let input = plain_pdf();
    let original = reload(&input);
    let result = process_document("plain.pdf", &input, PAYLOAD, &only(&["Teleport"]));
    assert!(result.success);
    assert!(result.applied_vectors.is_empty());
    let output = reload(result.output.as_deref().expect("output bytes"));
    assert_eq!(
        output.objects.len(),
        original.objects.len(),
        "unused action object should be dropped"
    );
    assert_eq!(output.get_pages().len(), 2);
    assert!(catalog(&output).get(b"OpenAction").is_err());
}

#[test]
fn unset_selection_uses_standard_injection() {
    let options = InjectionOptions { use_all_methods: false, ..InjectionOptions::default() };
    let result = process_document("plain.pdf", &plain_pdf(), PAYLOAD, &options);
    assert_eq!(result.applied_vectors, vec!["Standard Injection"]);
    let doc = reload(result.output.as_deref().expect("output bytes"));
    let root = catalog(&doc);
    assert!(root.get(b"OpenAction").is_err());
    let scripts = dict_at(&doc, dict_at(&doc, root, b"Names"), b"JavaScript");
    assert_eq!(name_keys(&doc, scripts), vec!["EmbeddedScript"]);
}

#[test]
fn existing_actions_and_names_are_merged() {
    let input = build_pdf(1, |doc, catalog_id, _| {
        let other = doc.add_object(dictionary! {
            "S" => "JavaScript",
            "JS" => Object::string_literal("console.println('existing');"),
        });
        let names_array =
            doc.add_object(vec![Object::string_literal("Alpha"), Object::Reference(other)]);
        let root = catalog_dict(doc, catalog_id);
        root.set("AA", dictionary! { "Custom" => Object::Reference(other) });
        root.set(
            "Names",
            dictionary! {
                "JavaScript" => dictionary! { "Names" => Object::Reference(names_array) },
            },
        );
    });
    let result = process_document("merge.pdf", &input, PAYLOAD, &all_vectors());
    assert!(result.success, "unexpected failure: {:?}", result.error);
    let doc = reload(result.output.as_deref().expect("output bytes"));
    let root = catalog(&doc);
    let aa = dict_at(&doc, root, b"AA");
    assert_eq!(sorted_keys(aa), vec!["Custom", "DP", "DS", "O", "WC", "WP", "WS"]);
    assert_eq!(script_of(&doc, aa.get(b"Custom").expect("custom")), "console.println('existing');");
    let scripts = dict_at(&doc, dict_at(&doc, root, b"Names"), b"JavaScript");
    assert_eq!(name_keys(&doc, scripts), vec!["Alpha", "AutoExecute", "EmbeddedScript"]);
}

fn string_pair(a: &str, b: &str) -> Object {
    vec![Object::string_literal(a), Object::string_literal(b)].into()
}

fn limits_of(node: &lopdf::Dictionary) -> Vec<String> {
    node.get(b"Limits")
        .and_then(Object::as_array)
        .expect("limits")
        .iter()
        .map(|key| match key {
            Object::String(bytes, _) => String::from_utf8_lossy(bytes).into_owned(),
            other => panic!("unexpected limit {other:?}"),
        })
        .collect()
}

#[test]
fn kids_rooted_name_tree_entries_join_the_covering_leaves() {
    let input = build_pdf(1, |doc, catalog_id, _| {
        let other = doc.add_object(dictionary! {
            "S" => "JavaScript",
            "JS" => Object::string_literal("1;"),
        });
        let mut leaves = Vec::new();
        for (low, high) in [("A", "B"), ("C", "D")] {
            leaves.push(Object::Reference(doc.add_object(dictionary! {
                "Limits" => string_pair(low, high),
                "Names" => vec![
                    Object::string_literal(low), Object::Reference(other),
                    Object::string_literal(high), Object::Reference(other),
                ],
            })));
        }
        catalog_dict(doc, catalog_id).set(
            "Names",
            dictionary! { "JavaScript" => dictionary! { "Kids" => leaves } },
        );
    });
    let result = process_document("kids.pdf", &input, PAYLOAD, &only(&["Names Dictionary"]));
    assert!(result.success, "unexpected failure: {:?}", result.error);
    let doc = reload(result.output.as_deref().expect("output bytes"));
    let tree = dict_at(&doc, dict_at(&doc, catalog(&doc), b"Names"), b"JavaScript");
    let kids = tree.get(b"Kids").and_then(Object::as_array).expect("kids");
    assert_eq!(kids.len(), 2, "no leaf should be added when direct leaves exist");
    let first = resolve(&doc, &kids[0]).as_dict().expect("leaf");
    assert_eq!(name_keys(&doc, first), vec!["A", "AutoExecute", "B"]);
    assert_eq!(limits_of(first), vec!["A", "B"]);
    let second = resolve(&doc, &kids[1]).as_dict().expect("leaf");
    assert_eq!(name_keys(&doc, second), vec!["C", "D", "EmbeddedScript"]);
    assert_eq!(limits_of(second), vec!["C", "EmbeddedScript"]);
}

#[test]
fn entries_below_every_leaf_widen_the_first_leaf() {
    let input = build_pdf(1, |doc, catalog_id, _| {
        let other = doc.add_object(dictionary! {
            "S" => "JavaScript",
            "JS" => Object::string_literal("1;"),
        });
        let leaf = doc.add_object(dictionary! {
            "Limits" => string_pair("Zeta", "Zeta"),
            "Names" => vec![Object::string_literal("Zeta"), Object::Reference(other)],
        });
        catalog_dict(doc, catalog_id).set(
            "Names",
            dictionary! { "JavaScript" => dictionary! { "Kids" => vec![Object::Reference(leaf)] } },
        );
    });
    let result = process_document("zeta.pdf", &input, PAYLOAD, &only(&["Names Dictionary"]));
    assert!(result.success, "unexpected failure: {:?}", result.error);
    let doc = reload(result.output.as_deref().expect("output bytes"));
    let tree = dict_at(&doc, dict_at(&doc, catalog(&doc), b"Names"), b"JavaScript");
    let kids = tree.get(b"Kids").and_then(Object::as_array).expect("kids");
    assert_eq!(kids.len(), 1);
    let leaf = resolve(&doc, &kids[0]).as_dict().expect("leaf");
    assert_eq!(name_keys(&doc, leaf), vec!["AutoExecute", "EmbeddedScript", "Zeta"]);
    assert_eq!(limits_of(leaf), vec!["AutoExecute", "Zeta"]);
}

#[test]
fn new_leaf_is_inserted_in_key_order_among_intermediate_kids() {
    let input = build_pdf(1, |doc, catalog_id, _| {
        let other = doc.add_object(dictionary! {
            "S" => "JavaScript",
            "JS" => Object::string_literal("1;"),
        });
        let leaf = doc.add_object(dictionary! {
            "Limits" => string_pair("Zeta", "Zeta"),
            "Names" => vec![Object::string_literal("Zeta"), Object::Reference(other)],
        });
        let middle = doc.add_object(dictionary! {
            "Limits" => string_pair("Zeta", "Zeta"),
            "Kids" => vec![Object::Reference(leaf)],
        });
        catalog_dict(doc, catalog_id).set(
            "Names",
            dictionary! {
                "JavaScript" => dictionary! { "Kids" => vec![Object::Reference(middle)] },
            },
        );
    });
    let result = process_document("deep.pdf", &input, PAYLOAD, &only(&["Names Dictionary"]));
    assert!(result.success, "unexpected failure: {:?}", result.error);
    let doc = reload(result.output.as_deref().expect("output bytes"));
    let tree = dict_at(&doc, dict_at(&doc, catalog(&doc), b"Names"), b"JavaScript");
    let kids = tree.get(b"Kids").and_then(Object::as_array).expect("kids");
    assert_eq!(kids.len(), 2);
    let added = resolve(&doc, &kids[0]).as_dict().expect("new leaf");
    assert_eq!(name_keys(&doc, added), vec!["AutoExecute", "EmbeddedScript"]);
    assert_eq!(limits_of(added), vec!["AutoExecute", "EmbeddedScript"]);
    let middle = resolve(&doc, &kids[1]).as_dict().expect("intermediate node");
    assert_eq!(limits_of(middle), vec!["Zeta", "Zeta"]);
}

#[test]
fn malformed_name_tree_is_recorded_not_fatal() {
    let input = build_pdf(1, |doc, catalog_id, _| {
        catalog_dict(doc, catalog_id)
            .set("Names", dictionary! { "JavaScript" => dictionary! { "Names" => 7 } });
    });
    let result = process_document("broken.pdf", &input, PAYLOAD, &all_vectors());
    assert!(result.success);
    let failed: Vec<&str> = result.vector_failures.iter().map(|f| f.vector.as_str()).collect();
    assert_eq!(failed, vec!["Standard Injection", "Names Dictionary", "Form Actions"]);
    assert!(result.applied_vectors.contains(&"OpenAction Injection".to_string()));
}

#[test]
fn empty_payload_is_rejected_before_loading() {
    let result = process_document("plain.pdf", b"not even a pdf", "   ", &all_vectors());
    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::Validation));
    assert_eq!(
        result.error.as_deref(),
        Some("JavaScript validation failed: JavaScript code cannot be empty")
    );
    assert!(result.output.is_none());
    assert!(result.applied_vectors.is_empty());
}

#[test]
fn risky_payload_passes_without_a_risk_ceiling() {
    let payload = "eval(foo); fetch('http://x.com')";
    let result = process_document("plain.pdf", &plain_pdf(), payload, &all_vectors());
    assert!(result.success);
    assert_eq!(result.validation.tier, RiskTier::Critical);

    let capped = InjectionOptions { max_risk_tier: Some(RiskTier::Medium), ..all_vectors() };
    let result = process_document("plain.pdf", &plain_pdf(), payload, &capped);
    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::Validation));
    assert!(result.error.as_deref().unwrap_or_default().contains("critical"));
}

#[test]
fn truncated_document_fails_to_load() {
    let bytes = plain_pdf();
    let result = process_document("cut.pdf", &bytes[..bytes.len() / 3], PAYLOAD, &all_vectors());
    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::Load));
    assert!(result.error.as_deref().unwrap_or_default().starts_with("failed to load PDF"));
}

#[test]
fn output_uses_a_classic_cross_reference_table() {
    let result = process_document("plain.pdf", &plain_pdf(), PAYLOAD, &all_vectors());
    assert!(result.success, "unexpected failure: {:?}", result.error);
    let text = String::from_utf8_lossy(result.output.as_deref().expect("output bytes"));
    assert!(text.contains("\nxref\n"), "expected an xref table");
    assert!(text.contains("trailer"));
    assert!(!text.contains("/XRef"), "cross-reference stream left in output");
    assert_eq!(reload(result.output.as_deref().expect("output bytes")).get_pages().len(), 2);
}
