//! Integration tests for the sfr-converter binary.
//!
//! These tests write small Protection Profile documents to a temporary
//! directory and run the full executable against them.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

// --- Helper Functions ---

fn get_cmd() -> Command {
    let mut cmd = Command::cargo_bin("sfr-converter").unwrap();
    cmd.env("NO_COLOR", "1");
    cmd
}

const PP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PP xmlns="https://niap-ccevs.org/cc/v1">
  <man-sfrs>
    <section id="fcs_ckm" title="Cryptographic Key Management">
      <f-component cc-id="fcs_ckm.1" name="Cryptographic Key Generation">
        <f-element id="fcs-ckm-1e1">
          <title>The TSF shall <selectables onlyone="yes"><selectable id="s1">Option A</selectable><selectable id="s2">Option B</selectable></selectables></title>
        </f-element>
      </f-component>
    </section>
    <section id="fmt_smf" title="Specification of Management Functions">
      <f-component cc-id="fmt_smf.1" name="Specification of Management Functions">
        <f-element id="fmt-smf-1e1">
          <title>The TSF shall be capable of performing the following management functions:
            <management-function-set default="O">
              <manager cid="admin">Admin</manager>
              <management-function id="mf-lock">
                <text>Lock the device</text>
                <M ref="admin"/>
              </management-function>
            </management-function-set>
          </title>
        </f-element>
      </f-component>
    </section>
  </man-sfrs>
</PP>"#;

const CHOICE_LIST: &str =
    "[<b>selection, choose one of</b>: <ul><li><i>Option A</i></li><li><i>Option B</i></li></ul>]";

fn write_file(path: &Path, content: &str) {
    let mut file = File::create(path).unwrap();
    write!(file, "{}", content).unwrap();
}

// --- Test Cases ---

#[test]
fn test_xml_to_model_json() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("pp.xml");
    let output_path = dir.path().join("model.json");
    write_file(&input_path, PP);

    get_cmd()
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let output: Value = serde_json::from_str(&fs::read_to_string(output_path).unwrap()).unwrap();
    assert!(output["generator"].as_str().unwrap().starts_with("sfr-converter"));
    let components = output["components"].as_array().unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(components[0]["ccId"], "FCS_CKM.1");

    let group = &components[0]["elements"][0]["selectableGroups"]["group-1"];
    assert_eq!(group["kind"], "plain");
    assert_eq!(group["onlyOne"], true);
    assert_eq!(group["groups"].as_array().unwrap().len(), 2);

    let mf = &components[1]["elements"][0]["managementFunctions"];
    assert_eq!(mf["rows"][0]["id"], "mf-lock");
    assert_eq!(mf["rows"][0]["markers"]["ADMIN"], "M");
}

#[test]
fn test_preview_mode_to_stdout() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("pp.xml");
    write_file(&input_path, PP);

    get_cmd()
        .arg("-i")
        .arg(&input_path)
        .arg("--mode")
        .arg("preview")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("The TSF shall {}", CHOICE_LIST)))
        .stdout(predicate::str::contains("  mf-lock: Lock the device"));
}

#[test]
fn test_model_json_round_trips_through_preview() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("pp.xml");
    let model_path = dir.path().join("model.json");
    write_file(&input_path, PP);

    get_cmd()
        .arg("-i")
        .arg(&input_path)
        .arg("-o")
        .arg(&model_path)
        .assert()
        .success();

    get_cmd()
        .arg("-i")
        .arg(&model_path)
        .arg("--mode")
        .arg("preview")
        .arg("--element")
        .arg("fcs-ckm-1e1")
        .arg("--validate")
        .arg("--lint")
        .assert()
        .success()
        .stdout(predicate::str::contains(CHOICE_LIST))
        .stdout(predicate::str::contains("Lock the device").not());
}

#[test]
fn test_edits_are_applied_before_output() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("pp.xml");
    let edits_path = dir.path().join("edits.json");
    write_file(&input_path, PP);
    let edits = json!([
        {"element": "fcs-ckm-1e1", "op": "deleteSelectable", "selectable": "s1"},
        {"element": "fcs-ckm-1e1", "op": "addSelectable", "group": "group-1", "description": "Option C"}
    ]);
    write_file(&edits_path, &edits.to_string());

    get_cmd()
        .arg("-i")
        .arg(&input_path)
        .arg("--mode")
        .arg("preview")
        .arg("--edits")
        .arg(&edits_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("<li><i>Option C</i></li>"))
        .stdout(predicate::str::contains("Option A").not());
}

#[test]
fn test_failed_edit_aborts() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("pp.xml");
    let edits_path = dir.path().join("edits.json");
    let output_path = dir.path().join("model.json");
    write_file(&input_path, PP);
    write_file(
        &edits_path,
        r#"[{"element": "fcs-ckm-1e1", "op": "deleteSelectableGroup", "group": "group-42"}]"#,
    );

    get_cmd()
        .arg("-i")
        .arg(&input_path)
        .arg("-o")
        .arg(&output_path)
        .arg("--edits")
        .arg(&edits_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("group-42"));
    assert!(!output_path.exists());
}

#[test]
fn test_lint_fails_on_dangling_reference() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("model.json");
    let model = json!({
        "components": [{
            "name": "FCS_CKM.1",
            "elements": [{
                "name": "FCS_CKM.1.1",
                "title": [{"text": "The TSF shall"}, {"selections": "group-7"}],
                "selectables": {},
                "selectableGroups": {}
            }]
        }]
    });
    write_file(&input_path, &model.to_string());

    get_cmd()
        .arg("-i")
        .arg(&input_path)
        .arg("--lint")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Selection group 'group-7' does not exist"));
}

#[test]
fn test_validate_rejects_malformed_model() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("model.json");
    write_file(
        &input_path,
        r#"{"components": [{"name": "X", "elements": [{"name": "X.1", "title": "oops", "selectables": {}, "selectableGroups": {}}]}]}"#,
    );

    get_cmd()
        .arg("-i")
        .arg(&input_path)
        .arg("--validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("schema validation"));
}

#[test]
fn test_unknown_element() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("pp.xml");
    write_file(&input_path, PP);

    get_cmd()
        .arg("-i")
        .arg(&input_path)
        .arg("--element")
        .arg("FAU_GEN.1.1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("FAU_GEN.1.1"));
}

#[test]
fn test_file_not_found() {
    get_cmd()
        .arg("--input")
        .arg("nonexistent-file.xml")
        .assert()
        .failure();
}
