//! Evaluation activities (`<aactivity>`).
//!
//! An activity carries TSS and guidance text plus a `<tests>` block. Test
//! blocks are split into introduction, test lists, and closing text; test
//! lists nest through tests that own further `<testlist>` children.

use crate::dom::{XmlElement, XmlNode};
use crate::models_sfr::{ActivityLevel, EvaluationActivity, Test, TestList};
use crate::rich_text::{
    RichText, element_content, escape_lt_sign, escape_xml_tags, is_raw_xml_tag, parse_rich_text,
    ref_ids, remove_also_tags, remove_whitespace,
};
use uuid::Uuid;

pub fn parse_evaluation_activity(activity: &XmlElement) -> EvaluationActivity {
    let level = match activity.attr("level") {
        Some(level) if level.eq_ignore_ascii_case("element") => ActivityLevel::Element,
        _ => ActivityLevel::Component,
    };

    let mut ea = EvaluationActivity {
        level,
        ..Default::default()
    };

    for child in activity.child_elements() {
        match child.local_name().to_ascii_lowercase().as_str() {
            "tss" => ea.tss = parse_rich_text(child).trim().to_string(),
            "guidance" => ea.guidance = parse_rich_text(child).trim().to_string(),
            "tests" => parse_tests(child, &mut ea),
            "no-tests" => {
                ea.no_test = parse_rich_text(child);
                ea.is_no_test = true;
            }
            _ => {}
        }
    }

    // Loose text and inline markup directly under the activity.
    let introduction = parse_rich_text(activity);
    ea.ref_ids = ref_ids(&introduction);
    ea.introduction = remove_also_tags(&introduction).trim().to_string();
    ea
}

#[derive(Clone, Copy, PartialEq)]
enum Block {
    Intro,
    List,
    Closing,
}

/// Splits a `<tests>` block into introduction, lists, and closing text.
pub fn parse_tests(tests: &XmlElement, ea: &mut EvaluationActivity) {
    let mut intro = String::new();
    let mut closing = String::new();
    let mut block = Block::Intro;

    let more_lists_after = |index: usize| {
        tests.children[index + 1..]
            .iter()
            .filter_map(XmlNode::as_element)
            .any(|e| e.is("testlist") || e.is("div"))
    };

    for (index, node) in tests.children.iter().enumerate() {
        let text = match node {
            XmlNode::Comment(_) => continue,
            XmlNode::Element(e) if e.is("testlist") => {
                block = Block::List;
                parse_test_list(ea, e, None);
                continue;
            }
            XmlNode::Element(e) if e.is("div") => {
                block = Block::List;
                parse_div_test(ea, e);
                continue;
            }
            XmlNode::Element(e) => wrapped_rich_text(e, ""),
            XmlNode::Text(t) => {
                let text = remove_whitespace(&escape_lt_sign(t));
                if text.is_empty() {
                    continue;
                }
                text
            }
        };

        if block == Block::List {
            if more_lists_after(index) {
                intro.push_str(&text);
                continue;
            }
            block = Block::Closing;
        }
        match block {
            Block::Closing => closing.push_str(&text),
            _ => intro.push_str(&text),
        }
    }

    ea.test_introduction = intro.replace("<br></br>", "<br/>");
    ea.test_closing = closing.replace("<br></br>", "<br/>");
}

/// A bare `<div>` in a tests block is a one-test list.
fn parse_div_test(ea: &mut EvaluationActivity, div: &XmlElement) {
    let list_uuid = Uuid::new_v4();
    let test_uuid = Uuid::new_v4();

    ea.tests.push(Test {
        uuid: test_uuid,
        test_list: list_uuid,
        id: String::new(),
        objective: RichText::in_tests().parse_children(div, String::new()),
        dependencies: dependencies(div),
        nested_test_lists: Vec::new(),
    });
    ea.test_lists.push(TestList {
        uuid: list_uuid,
        parent_test: None,
        tests: vec![test_uuid],
        ..Default::default()
    });
}

/// Parses a `<testlist>` and its nested lists, returning the new list's UUID.
pub fn parse_test_list(
    ea: &mut EvaluationActivity,
    node: &XmlElement,
    parent_test: Option<Uuid>,
) -> Uuid {
    let mut list = TestList {
        uuid: Uuid::new_v4(),
        parent_test,
        ..Default::default()
    };
    let mut closing = false;

    let tests_after = |index: usize| {
        node.children[index + 1..]
            .iter()
            .filter_map(XmlNode::as_element)
            .any(|e| e.is("test"))
    };

    for (index, child) in node.children.iter().enumerate() {
        let text = match child {
            XmlNode::Comment(_) => continue,
            XmlNode::Element(e) if e.is("test") => {
                closing = false;
                let uuid = Uuid::new_v4();
                let mut test = Test {
                    uuid,
                    test_list: list.uuid,
                    id: e.attr("id").unwrap_or_default().to_string(),
                    objective: RichText::in_tests().parse_children(e, String::new()),
                    dependencies: dependencies(e),
                    nested_test_lists: Vec::new(),
                };
                for nested in e.direct_children("testlist") {
                    // Only the last nested list is kept per test.
                    test.nested_test_lists = vec![parse_test_list(ea, nested, Some(uuid))];
                }
                ea.tests.push(test);
                list.tests.push(uuid);
                continue;
            }
            XmlNode::Element(e) => wrapped_rich_text(e, " "),
            XmlNode::Text(t) => remove_whitespace(&escape_lt_sign(t)),
        };

        if !closing && !tests_after(index) {
            closing = true;
        }
        if closing {
            list.conclusion.push_str(&text);
        } else {
            list.description.push_str(&text);
        }
    }

    let uuid = list.uuid;
    ea.test_lists.push(list);
    uuid
}

/// ` <tag attrs>rich text</tag>` followed by `trail`, or escaped XML for raw tags.
fn wrapped_rich_text(e: &XmlElement, trail: &str) -> String {
    if is_raw_xml_tag(e.local_name()) {
        return format!(" {} ", escape_xml_tags(&element_content(e)));
    }
    let name = e.local_name();
    format!(
        " <{}{}>{}</{}>{}",
        name,
        e.attributes_string(),
        parse_rich_text(e),
        name,
        trail
    )
}

fn dependencies(test: &XmlElement) -> Vec<String> {
    test.direct_children("depends")
        .map(|d| {
            d.non_empty_attr("on")
                .or_else(|| d.attr("ref"))
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::XmlDocument;
    use pretty_assertions::assert_eq;

    fn parse(xml: &str) -> EvaluationActivity {
        parse_evaluation_activity(&XmlDocument::parse_str(xml).unwrap().root)
    }

    #[test]
    fn test_level_defaults_to_component() {
        assert_eq!(parse("<aactivity/>").level, ActivityLevel::Component);
        assert_eq!(
            parse(r#"<aactivity level="element"/>"#).level,
            ActivityLevel::Element
        );
    }

    #[test]
    fn test_tss_guidance_and_introduction() {
        let ea = parse(
            r#"<aactivity>The evaluator shall <b>check</b>.
                 <tss> Describe <i>keys</i>. </tss>
                 <guidance>Configure it.</guidance>
               </aactivity>"#,
        );
        assert_eq!(ea.tss, "Describe <i>keys</i>.");
        assert_eq!(ea.guidance, "Configure it.");
        assert!(ea.introduction.starts_with("The evaluator shall <b>check</b>."));
        assert!(!ea.introduction.contains("Describe"));
    }

    #[test]
    fn test_no_tests_flag() {
        let ea = parse("<aactivity><no-tests>Not testable.</no-tests></aactivity>");
        assert!(ea.is_no_test);
        assert_eq!(ea.no_test, "Not testable.");
    }

    #[test]
    fn test_also_references_are_collected() {
        let ea = parse(r#"<aactivity>See also <also ref-id="fcs_ckm.2"/></aactivity>"#);
        assert_eq!(ea.ref_ids, vec!["fcs_ckm.2".to_string()]);
        assert_eq!(ea.introduction, "See also");
    }

    #[test]
    fn test_tests_block_intro_list_and_closing() {
        let ea = parse(
            r#"<aactivity><tests>
                 The evaluator shall perform:
                 <testlist>
                   <test id="t1">Check A. <depends on="sel-a"/></test>
                   <test>Check B.<testlist><test>Nested.</test></testlist></test>
                 </testlist>
                 Done.
               </tests></aactivity>"#,
        );
        assert_eq!(ea.test_introduction, "The evaluator shall perform:");
        assert_eq!(ea.test_closing, "Done.");
        assert_eq!(ea.test_lists.len(), 2);
        assert_eq!(ea.tests.len(), 3);

        let first = ea.tests.iter().find(|t| t.id == "t1").unwrap();
        assert_eq!(first.dependencies, vec!["sel-a".to_string()]);
        assert!(first.objective.starts_with("Check A."));

        let outer = ea.test_lists.iter().find(|l| l.parent_test.is_none()).unwrap();
        assert_eq!(outer.tests.len(), 2);
        let second = ea.tests.iter().find(|t| t.uuid == outer.tests[1]).unwrap();
        assert_eq!(second.nested_test_lists.len(), 1);
        let nested = ea
            .test_lists
            .iter()
            .find(|l| l.uuid == second.nested_test_lists[0])
            .unwrap();
        assert_eq!(nested.parent_test, Some(second.uuid));
    }

    #[test]
    fn test_div_in_tests_is_single_test_list() {
        let ea = parse(
            r#"<aactivity><tests><div><b>Test 1:</b> Verify it. <depends ref="plat"/></div></tests></aactivity>"#,
        );
        assert_eq!(ea.test_lists.len(), 1);
        assert_eq!(ea.tests.len(), 1);
        assert_eq!(ea.tests[0].dependencies, vec!["plat".to_string()]);
        assert!(ea.tests[0].objective.starts_with("<b>Test 1:</b>"));
        assert_eq!(ea.test_lists[0].tests, vec![ea.tests[0].uuid]);
    }

    #[test]
    fn test_list_description_and_conclusion() {
        let ea = parse(
            "<aactivity><tests><testlist>Lead in<test>T</test>Wrap up</testlist></tests></aactivity>",
        );
        let list = &ea.test_lists[0];
        assert_eq!(list.description, "Lead in");
        assert_eq!(list.conclusion, "Wrap up");
    }
}
