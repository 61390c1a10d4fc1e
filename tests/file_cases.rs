//! Fixture-driven cases under `tests/cases/`
//!
//! `etl/<case>/` holds `etl.json`, `src.json`, optional `dst.json` and
//! `options.json` (`{"delimiter": "..."}`), and `expect.json`.
//! `meta/<case>/` holds `meta.json`, the documents it references, optional
//! `options.json`, and `expect.json`.

use glob::glob;
use jtl::config::decode_escapes;
use jtl::{Engine, EngineConfig, EtlSpec};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn cases_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("cases")
}

fn case_dirs(kind: &str) -> Vec<PathBuf> {
    let pattern = cases_root().join(kind).join("*");
    let mut dirs: Vec<PathBuf> = glob(pattern.to_str().unwrap())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn read_json(path: &Path) -> Value {
    let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn read_optional(path: &Path) -> Option<Value> {
    path.exists().then(|| read_json(path))
}

fn engine_for(case: &Path) -> Engine {
    let mut config = EngineConfig::default();
    if let Some(options) = read_optional(&case.join("options.json"))
        && let Some(delimiter) = options.get("delimiter").and_then(Value::as_str)
    {
        config = config.with_delimiter(decode_escapes(delimiter));
    }
    Engine::with_config(config)
}

fn case_name(case: &Path) -> String {
    case.file_name().unwrap().to_string_lossy().into_owned()
}

#[test]
fn test_etl_cases() {
    let cases = case_dirs("etl");
    assert!(!cases.is_empty(), "no ETL cases found");

    for case in cases {
        let name = case_name(&case);
        let spec = EtlSpec::from_value(&read_json(&case.join("etl.json")))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        let source = read_json(&case.join("src.json"));
        let seed = read_optional(&case.join("dst.json"));
        let seed_before = seed.clone();

        let out = engine_for(&case)
            .run_etl(&spec, &source, seed.as_ref())
            .unwrap_or_else(|e| panic!("{name}: {e}"));

        assert_eq!(out, read_json(&case.join("expect.json")), "case {name}");
        assert_eq!(seed, seed_before, "case {name} mutated its seed");
    }
}

#[test]
fn test_meta_cases() {
    let cases = case_dirs("meta");
    assert!(!cases.is_empty(), "no meta cases found");

    for case in cases {
        let name = case_name(&case);
        let outcome = engine_for(&case)
            .run_chain_file(case.join("meta.json"))
            .unwrap_or_else(|e| panic!("{name}: {e}"));

        assert_eq!(
            outcome.final_output(),
            Some(&read_json(&case.join("expect.json"))),
            "case {name}"
        );
    }
}

#[test]
fn test_meta_case_runs_from_copied_directory() {
    let case = cases_root().join("meta").join("finding");
    let dir = tempfile::tempdir().unwrap();
    for entry in fs::read_dir(&case).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), dir.path().join(entry.file_name())).unwrap();
    }

    let outcome = Engine::new()
        .run_chain_file(dir.path().join("meta.json"))
        .unwrap();
    assert_eq!(outcome.final_output(), Some(&read_json(&case.join("expect.json"))));
}
