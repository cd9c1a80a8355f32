//! Library-level tests: parse Protection Profile XML, preview the result,
//! and edit the model through the repository.

use pretty_assertions::assert_eq;
use sfr_converter::dom::XmlDocument;
use sfr_converter::editing::{delete_selectable, delete_selectable_group};
use sfr_converter::integrity::check_document;
use sfr_converter::models_sfr::{
    ComplexSegment, ComplexSelectable, ElementModel, PlainGroup, Ref, Segment, Selectable,
    SelectableGroup, SfrDocument,
};
use sfr_converter::preview::{Preview, render_preview};
use sfr_converter::repository::{DocumentRepository, InMemoryRepository};
use sfr_converter::sfr_parser::get_sfrs;
use std::collections::BTreeMap;
use uuid::Uuid;

const PP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PP xmlns="https://niap-ccevs.org/cc/v1" xmlns:h="http://www.w3.org/1999/xhtml">
  <sec:Security_Functional_Requirements xmlns:sec="https://niap-ccevs.org/cc/v1/section">
    <man-sfrs>
      <section id="fcs_ckm" title="Cryptographic Key Management">
        <f-component cc-id="fcs_ckm.1" name="Cryptographic Key Generation">
          <f-element id="fcs-ckm-1e1">
            <title>The TSF shall <selectables onlyone="yes"><selectable id="s1">Option A</selectable><selectable id="s2">Option B</selectable></selectables></title>
          </f-element>
          <f-element id="fcs-ckm-1e2">
            <title>The TSF shall use <assignable id="a1">key sizes</assignable> for <selectables><selectable id="s3">storage</selectable><selectable id="s4">transport</selectable></selectables></title>
          </f-element>
        </f-component>
      </section>
    </man-sfrs>
  </sec:Security_Functional_Requirements>
</PP>"#;

fn parse() -> SfrDocument {
    let root = XmlDocument::parse_str(PP).unwrap().root;
    get_sfrs(&root)
}

fn uuid_of(element: &ElementModel, id: &str) -> Uuid {
    element.selectable_by_id(id).unwrap().0
}

#[test]
fn test_only_one_selection_parses_and_previews() {
    let doc = parse();
    let element = doc.element("fcs-ckm-1e1").unwrap();
    let s1 = uuid_of(element, "s1");
    let s2 = uuid_of(element, "s2");

    assert_eq!(
        element.selectable_groups["group-1"],
        SelectableGroup::Plain(PlainGroup {
            only_one: true,
            linebreak: false,
            groups: vec![Ref::Selectable(s1), Ref::Selectable(s2)],
        })
    );
    assert_eq!(element.selectables[&s1], Selectable::choice("s1", "Option A"));
    assert_eq!(
        render_preview(element),
        "The TSF shall [<b>selection, choose one of</b>: <ul><li><i>Option A</i></li><li><i>Option B</i></li></ul>]"
    );
}

#[test]
fn test_group_ids_continue_across_elements() {
    let doc = parse();
    let second = doc.element("fcs-ckm-1e2").unwrap();
    assert!(second.selectable_groups.contains_key("group-2"));
    assert!(second.title.contains(&Segment::Selections("group-2".to_string())));
    assert!(second.selectables[&uuid_of(second, "a1")].assignment);
}

#[test]
fn test_parsed_document_is_clean() {
    let report = check_document(&parse());
    assert!(report.issues.is_empty(), "{:?}", report.issues);
}

#[test]
fn test_complex_selectable_preview() {
    let aes = Uuid::new_v4();
    let mut selectables = BTreeMap::new();
    selectables.insert(aes, Selectable::choice("s1", "AES"));
    let groups = BTreeMap::new();

    let complex = ComplexSelectable {
        exclusive: false,
        not_selectable: false,
        description: vec![
            ComplexSegment::Text("Use ".to_string()),
            ComplexSegment::Groups(vec![Ref::Selectable(aes)]),
        ],
    };
    let preview = Preview::new(&selectables, &groups);
    assert_eq!(
        preview.get_complex_selectable_text(&complex),
        "Use [<b>selection</b>: AES]"
    );
}

#[test]
fn test_delete_selectable_cascades_to_group_and_title() {
    let s1 = Uuid::new_v4();
    let s2 = Uuid::new_v4();
    let mut element = ElementModel {
        name: "FIA_UAU.1.1".to_string(),
        title: vec![
            Segment::Text("The TSF shall".to_string()),
            Segment::Selections("group-1".to_string()),
            Segment::Assignment(s1),
        ],
        ..Default::default()
    };
    element.selectables.insert(s1, Selectable::assignment("s1", "actions"));
    element.selectables.insert(s2, Selectable::choice("s2", "identify"));
    element.selectable_groups.insert(
        "group-1".to_string(),
        SelectableGroup::plain(false, vec![Ref::Selectable(s1), Ref::Selectable(s2)]),
    );
    let mut doc = SfrDocument::default();
    doc.components.push(sfr_converter::models_sfr::Component {
        elements: vec![element],
        ..Default::default()
    });

    let mut repo = InMemoryRepository::new(doc);
    delete_selectable(&mut repo, "FIA_UAU.1.1", "s1").unwrap();

    let element = repo.get("FIA_UAU.1.1").unwrap();
    assert_eq!(element.title.len(), 2);
    assert_eq!(element.selectable_groups["group-1"].refs(), vec![&Ref::Selectable(s2)]);
    assert!(!element.selectables.contains_key(&s1));
}

#[test]
fn test_deleting_a_group_leaves_a_clean_model() {
    let mut repo = InMemoryRepository::new(parse());
    delete_selectable_group(&mut repo, "fcs-ckm-1e2", "group-2").unwrap();
    let doc = repo.into_document();

    let element = doc.element("fcs-ckm-1e2").unwrap();
    assert_eq!(render_preview(element), "The TSF shall use [<b>assignment</b>: key sizes] for");

    // The group's members are still in the map but nothing refers to them.
    let report = check_document(&doc);
    assert!(!report.has_errors());
    assert_eq!(report.summary.warnings, 2);
}
