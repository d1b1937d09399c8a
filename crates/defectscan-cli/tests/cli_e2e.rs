use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

const SURVEY: &str = "BUILDING SURVEY REPORT\n\
Page 1 of 2\n\
There is significant rising damp in the basement walls.\n\
Hairline cracks were observed above the kitchen window.\n\
The garden is well kept and the hedges are trimmed.\n";

fn defectscan_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_defectscan"))
}

fn run(args: &[&str]) -> Output {
    Command::new(defectscan_bin())
        .args(args)
        .env_remove("DEFECTSCAN_CONFIG")
        .env_remove("DEFECTSCAN_STORE")
        .env_remove("DEFECTSCAN_SENTIMENT_URL")
        .output()
        .expect("run defectscan")
}

fn stdout_json(out: &Output) -> Value {
    assert!(
        out.status.success(),
        "defectscan failed:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("stdout is JSON")
}

fn write_survey(dir: &Path) -> PathBuf {
    let path = dir.join("survey.txt");
    fs::write(&path, SURVEY).unwrap();
    path
}

fn categories(report: &Value) -> Vec<String> {
    report["findings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["category"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn analyze_prints_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_survey(dir.path());

    let report = stdout_json(&run(&["analyze", doc.to_str().unwrap(), "--json"]));

    assert_eq!(report["file"], "survey.txt");
    assert_eq!(categories(&report), vec!["Damp", "Cracks"]);
    assert_eq!(report["findings"][0]["severity"], "Medium");
    assert_eq!(report["findings"][0]["detection_method"], "rule_based");
    assert_eq!(report["summary"]["total_findings"], 2);
    assert_eq!(report["summary"]["processing_method"], "rule_based");
    assert_eq!(report["capabilities"]["secondary_signal"], false);
    assert_eq!(report["signal_degraded"], false);
    assert_eq!(report["aborted"], false);
    assert!(report.get("analysis_id").is_none());
}

#[test]
fn analyze_writes_report_file() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_survey(dir.path());
    let out_path = dir.path().join("report.json");

    let out = run(&["analyze", doc.to_str().unwrap(), "--out", out_path.to_str().unwrap()]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let written: Value = serde_json::from_str(&fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(categories(&written), vec!["Damp", "Cracks"]);
    assert!(String::from_utf8_lossy(&out.stdout).contains("Damp"));
}

#[test]
fn short_document_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("tiny.txt");
    fs::write(&doc, "Damp wall.\n").unwrap();

    let out = run(&["analyze", doc.to_str().unwrap(), "--json"]);
    assert!(!out.status.success());
    assert!(
        String::from_utf8_lossy(&out.stderr).contains("too little text"),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );
}

#[test]
fn unsupported_extension_fails() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("photo.jpg");
    fs::write(&doc, [0xff, 0xd8, 0xff]).unwrap();

    let out = run(&["analyze", doc.to_str().unwrap()]);
    assert!(!out.status.success());
}

#[test]
fn custom_config_replaces_taxonomy() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_survey(dir.path());
    let config = dir.path().join("roofing.toml");
    fs::write(
        &config,
        r#"
[[categories]]
name = "Roofing"
patterns = ["roof", "slates?", "gutters?"]

[scoring]
specificity_boosts = []
"#,
    )
    .unwrap();
    let roof = dir.path().join("roof.txt");
    fs::write(
        &roof,
        "Several slates are missing from the rear pitch.\nThe basement walls show rising damp.\n",
    )
    .unwrap();

    let report = stdout_json(&run(&[
        "analyze",
        roof.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--json",
    ]));
    assert_eq!(categories(&report), vec!["Roofing"]);

    // The built-in taxonomy does not know about roofs.
    let report = stdout_json(&run(&["analyze", doc.to_str().unwrap(), "--json"]));
    assert!(!categories(&report).contains(&"Roofing".to_string()));
}

#[test]
fn taxonomy_exports_as_json() {
    let out = run(&["taxonomy", "--format", "json"]);
    let config = stdout_json(&out);
    let names: Vec<&str> = config["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["Cracks", "Damp", "Corrosion", "Mold", "Structural", "Electrical", "Plumbing"]
    );
    assert_eq!(config["min_unit_chars"], 15);
}

#[test]
fn exported_toml_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["taxonomy"]);
    assert!(out.status.success());
    let config = dir.path().join("exported.toml");
    fs::write(&config, &out.stdout).unwrap();

    let doc = write_survey(dir.path());
    let report = stdout_json(&run(&[
        "analyze",
        doc.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--json",
    ]));
    assert_eq!(categories(&report), vec!["Damp", "Cracks"]);
}

#[test]
fn stored_analysis_shows_up_in_history() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_survey(dir.path());
    let store = dir.path().join("store");
    let store_arg = store.to_str().unwrap();

    let report = stdout_json(&run(&[
        "analyze",
        doc.to_str().unwrap(),
        "--store",
        store_arg,
        "--json",
    ]));
    let id = report["analysis_id"].as_str().unwrap().to_string();

    // Same file again: not stored twice unless forced.
    let again = stdout_json(&run(&[
        "analyze",
        doc.to_str().unwrap(),
        "--store",
        store_arg,
        "--json",
    ]));
    assert_eq!(again["analysis_id"].as_str(), Some(id.as_str()));

    let history = stdout_json(&run(&["history", "--store", store_arg, "--json"]));
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["metadata"]["filename"], "survey.txt");

    let record = stdout_json(&run(&["show", &id, "--store", store_arg, "--json"]));
    assert_eq!(record["id"].as_str(), Some(id.as_str()));
    assert_eq!(record["summary"]["total_findings"], 2);

    let forced = stdout_json(&run(&[
        "analyze",
        doc.to_str().unwrap(),
        "--store",
        store_arg,
        "--force",
        "--json",
    ]));
    assert_ne!(forced["analysis_id"].as_str(), Some(id.as_str()));
    let history = stdout_json(&run(&["history", "--store", store_arg, "--json"]));
    assert_eq!(history.as_array().unwrap().len(), 2);
}

#[test]
fn show_rejects_bad_id() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["show", "not-a-uuid", "--store", dir.path().to_str().unwrap()]);
    assert!(!out.status.success());
}

#[test]
fn stats_and_delete_manage_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_survey(dir.path());
    let store = dir.path().join("store");
    let store_arg = store.to_str().unwrap();

    let report = stdout_json(&run(&[
        "analyze",
        doc.to_str().unwrap(),
        "--store",
        store_arg,
        "--json",
    ]));
    let id = report["analysis_id"].as_str().unwrap().to_string();

    let stats = stdout_json(&run(&["stats", "--store", store_arg, "--json"]));
    assert_eq!(stats["total_analyses"], 1);
    assert_eq!(stats["total_findings"], 2);
    assert_eq!(stats["by_processing_method"]["rule_based"], 1);
    assert_eq!(stats["by_category"]["Damp"], 1);
    assert_eq!(stats["by_category"]["Cracks"], 1);

    let out = run(&["delete", &id, "--store", store_arg]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("survey.txt"));

    let stats = stdout_json(&run(&["stats", "--store", store_arg, "--json"]));
    assert_eq!(stats["total_analyses"], 0);
    assert!(!run(&["show", &id, "--store", store_arg]).status.success());

    // Deleting twice fails.
    assert!(!run(&["delete", &id, "--store", store_arg]).status.success());
}
