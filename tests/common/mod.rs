#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempDir;

pub const ACCOUNT_ID: &str = "111122223333";

/// Config protecting `prod-*` buckets, with a zero sweep interval and force
/// window so binary runs finish immediately.
pub const CONFIG: &str = r#"
regions = ["global", "us-east-1"]
account_blocklist = ["999999999999"]

[scheduler]
sweep_interval_ms = 0
force_sleep_secs = 0

[accounts."111122223333"]

[[accounts."111122223333".filters.StorageBucket]]
label = "production buckets"
properties = { name = { type = "glob", value = "prod-*" } }
"#;

pub const INVENTORY: &str = r#"{
    "account": { "id": "111122223333", "alias": "sandbox" },
    "resources": [
        { "type": "StorageBucket", "region": "us-east-1", "id": "prod-logs",
          "properties": { "name": "prod-logs" } },
        { "type": "StorageBucket", "region": "us-east-1", "id": "dev-cache",
          "properties": { "name": "dev-cache" } },
        { "type": "Instance", "region": "us-east-1", "id": "i-0abc" }
    ]
}"#;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

impl CmdResult {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Config and inventory files in a scratch directory.
pub struct Fixture {
    pub dir: TempDir,
    pub config: PathBuf,
    pub inventory: PathBuf,
}

impl Fixture {
    pub fn new(config: &str, inventory: &str) -> Self {
        let dir = tempfile::tempdir().expect("create fixture dir");
        let config_path = dir.path().join("sweep.toml");
        let inventory_path = dir.path().join("inventory.json");
        fs::write(&config_path, config).expect("write config");
        fs::write(&inventory_path, inventory).expect("write inventory");
        Self {
            dir,
            config: config_path,
            inventory: inventory_path,
        }
    }

    pub fn standard() -> Self {
        Self::new(CONFIG, INVENTORY)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// `--config` and `--inventory` followed by `extra`.
    pub fn args<'a>(&'a self, extra: &[&'a str]) -> Vec<&'a str> {
        let mut args = vec![
            "--config",
            path_str(&self.config),
            "--inventory",
            path_str(&self.inventory),
        ];
        args.extend_from_slice(extra);
        args
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_sweep") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "sweep.exe" } else { "sweep" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve sweep binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_full(case_name, args, "", &[])
}

/// Run the binary with `input` piped to stdin (the confirmation prompt reads it).
pub fn run_cli_case_with_input(case_name: &str, args: &[&str], input: &str) -> CmdResult {
    run_cli_case_full(case_name, args, input, &[])
}

pub fn run_cli_case_full(
    case_name: &str,
    args: &[&str],
    input: &str,
    envs: &[(&str, &str)],
) -> CmdResult {
    let root = std::env::temp_dir().join("sweep-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut child = Command::new(&bin_path)
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .env_remove("SWEEPER_OUTPUT_FORMAT")
        .env_remove("SWEEPER_ACTIVITY_LOG")
        .envs(envs.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("execute sweep command");
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(input.as_bytes());
    }
    let output = child.wait_with_output().expect("wait for sweep command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
