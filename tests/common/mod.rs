use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestEnv {
    _tmp: TempDir,
    pub home: PathBuf,
    pub config: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let home = tmp.path().join("home");
        fs::create_dir_all(&home).expect("create isolated home");

        // A fixture config that keeps the governor out of the way on loaded
        // CI machines: a tiny RAM floor and no GPU probing.
        let config = tmp.path().join("trainctl.config.json");
        fs::write(
            &config,
            serde_json::json!({
                "min_free_ram_gb": 0.001,
                "gpu": { "probe": "none" }
            })
            .to_string(),
        )
        .expect("write config fixture");

        Self {
            _tmp: tmp,
            home,
            config,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("trainctl").expect("binary under test");
        cmd.env("HOME", &self.home)
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    pub fn run_json(&self, args: &[&str]) -> Value {
        let out = self
            .cmd()
            .arg("--json")
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    pub fn state_path(&self) -> PathBuf {
        self.home.join(".config/trainctl/state.json")
    }

    pub fn seed_state(&self, state: &Value) {
        let path = self.state_path();
        fs::create_dir_all(path.parent().expect("state parent")).expect("create state dir");
        fs::write(path, state.to_string()).expect("seed state file");
    }
}
