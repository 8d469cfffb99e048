use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

mod common;
use common::TestEnv;

fn load_schema(name: &str) -> Value {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let raw = fs::read_to_string(root.join("docs/contracts").join(name)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn validate(schema_name: &str, data: &Value) {
    let schema = load_schema(schema_name);
    let validator = JSONSchema::compile(&schema).expect("compile schema");
    let msgs: Vec<String> = match validator.validate(data) {
        Ok(()) => return,
        Err(errors) => errors.map(|e| e.to_string()).collect(),
    };
    panic!("schema validation failed: {}", msgs.join(" | "));
}

#[test]
fn contracts_check() {
    let env = TestEnv::new();

    let status = env.run_json(&["status"]);
    assert_eq!(status["ok"], true);
    validate("status.schema.json", &status["data"]);

    env.cmd()
        .args([
            "run",
            "--run-id",
            "c-1",
            "--step-interval-ms",
            "1",
            "-c",
            "0.0000001",
        ])
        .assert()
        .success();

    let list = env.run_json(&["experiments", "list"]);
    assert_eq!(list["ok"], true);
    validate("experiments.schema.json", &list["data"]);

    let show = env.run_json(&["experiments", "show", "c-1"]);
    assert_eq!(show["ok"], true);
    validate("experiment-detail.schema.json", &show["data"]);
}

#[test]
fn run_stream_lines_match_the_event_contract() {
    let env = TestEnv::new();
    let out = env
        .cmd()
        .args([
            "run",
            "--steps",
            "4",
            "--step-interval-ms",
            "1",
            "-c",
            "0.0000001",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).expect("utf8 stream");
    assert!(!text.is_empty());
    for line in text.lines() {
        let event: Value = serde_json::from_str(line).expect("json line");
        validate("run-event.schema.json", &event);
    }
}
