//! CLI integration tests for fmtree
//!
//! These run the real binary against temporary projects. Built-in formatters
//! are served by the same binary, so no external tools are needed.

use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a command instance for the fmtree binary, isolated from user config
fn fmtree_cmd(config_home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("fmtree"));
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env_remove("FMTREE_MARKER")
        .env_remove("RUST_LOG");
    cmd
}

const BLANK_LINES: &str = r#"[[formatter]]
name = "blank-lines"
enable = true
includes = ["*.toml"]

[formatter.settings]
allowed_blank_lines = 1
"#;

struct Project {
    dir: TempDir,
    home: TempDir,
}

impl Project {
    fn new(config: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("fmtree.toml"), config).unwrap();
        Self {
            dir,
            home: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path().join(rel)).unwrap()
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = fmtree_cmd(self.home.path());
        cmd.current_dir(self.path());
        cmd
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().args(["--format", "json"]).args(args).output().unwrap();
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_init_creates_config() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    fmtree_cmd(home.path())
        .arg("init")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    assert!(dir.path().join("fmtree.toml").is_file());
    assert!(dir.path().join(".fmtree/.gitignore").is_file());
}

#[test]
fn test_init_never_overwrites() {
    let project = Project::new("# mine\n");

    project
        .cmd()
        .args(["init", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    assert_eq!(project.read("fmtree.toml"), "# mine\n");
}

#[test]
fn test_init_config_is_usable() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    fmtree_cmd(home.path()).arg("init").arg(dir.path()).assert().success();
    fs::write(dir.path().join("notes.md"), "hello   \n\n\n\n").unwrap();

    fmtree_cmd(home.path())
        .current_dir(dir.path())
        .arg("format")
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(dir.path().join("notes.md")).unwrap(),
        "hello\n"
    );
}

// =============================================================================
// Root Discovery Tests
// =============================================================================

#[test]
fn test_not_in_project_error() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    fmtree_cmd(home.path())
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No fmtree.toml found"));
}

#[test]
fn test_root_found_from_subdirectory() {
    let project = Project::new(BLANK_LINES);
    project.write("a/b/c/x.toml", "a = 1\n\n\n\nb = 2\n");

    project
        .cmd()
        .current_dir(project.path().join("a/b/c"))
        .arg("format")
        .assert()
        .success();

    assert_eq!(project.read("a/b/c/x.toml"), "a = 1\n\nb = 2\n");
}

#[test]
fn test_working_dir_flag() {
    let project = Project::new(BLANK_LINES);
    project.write("x.toml", "a = 1\n\n\n\nb = 2\n");
    let elsewhere = TempDir::new().unwrap();

    fmtree_cmd(project.home.path())
        .current_dir(elsewhere.path())
        .arg("-C")
        .arg(project.path())
        .arg("format")
        .assert()
        .success();

    assert_eq!(project.read("x.toml"), "a = 1\n\nb = 2\n");
}

#[test]
fn test_custom_marker() {
    let project = Project::new("");
    project.write("treefmt.toml", BLANK_LINES);
    project.write("x.toml", "a = 1\n\n\n\nb = 2\n");

    project
        .cmd()
        .env("FMTREE_MARKER", "treefmt.toml")
        .arg("format")
        .assert()
        .success();

    assert_eq!(project.read("x.toml"), "a = 1\n\nb = 2\n");
}

// =============================================================================
// Check and Format Tests
// =============================================================================

#[test]
fn test_check_reports_without_modifying() {
    let project = Project::new(BLANK_LINES);
    project.write("x.toml", "a = 1\n\n\n\nb = 2\n");

    project
        .cmd()
        .arg("check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("x.toml"));

    assert_eq!(project.read("x.toml"), "a = 1\n\n\n\nb = 2\n");
}

#[test]
fn test_format_then_check_round_trip() {
    let project = Project::new(BLANK_LINES);
    project.write("x.toml", "a = 1\n\n\n\nb = 2\n");

    project
        .cmd()
        .arg("format")
        .assert()
        .success()
        .stdout(predicate::str::contains("x.toml"));
    assert_eq!(project.read("x.toml"), "a = 1\n\nb = 2\n");

    project.cmd().arg("check").assert().success();
    project.cmd().args(["--no-cache", "check"]).assert().success();
}

#[test]
fn test_format_is_idempotent() {
    let project = Project::new(BLANK_LINES);
    project.write("x.toml", "a = 1\n\n\n\nb = 2\n");

    let first = project.json(&["--no-cache", "format"]);
    assert_eq!(first["stats"]["changed"], 1);

    let second = project.json(&["--no-cache", "format"]);
    assert_eq!(second["stats"]["changed"], 0);
    assert_eq!(project.read("x.toml"), "a = 1\n\nb = 2\n");
}

#[test]
fn test_global_excludes_are_untouched() {
    let config = format!("excludes = [\"vendor/**\"]\n\n{}", BLANK_LINES);
    let project = Project::new(&config);
    project.write("vendor/x.toml", "a = 1\n\n\n\nb = 2\n");

    project.cmd().arg("format").assert().success();
    assert_eq!(project.read("vendor/x.toml"), "a = 1\n\n\n\nb = 2\n");
}

#[test]
fn test_multiple_formatters_apply_in_order() {
    let project = Project::new(
        r#"[[formatter]]
name = "trailing-whitespace"
enable = true
includes = ["*.txt"]

[[formatter]]
name = "blank-lines"
enable = true
includes = ["*.txt"]

[formatter.settings]
allowed_blank_lines = 0

[[formatter]]
name = "end-of-file"
enable = true
includes = ["*.txt"]
"#,
    );
    project.write("a.txt", "one  \n \t\n\ntwo\t\n\n\n");

    project.cmd().arg("format").assert().success();
    assert_eq!(project.read("a.txt"), "one\ntwo\n");

    project.cmd().arg("check").assert().success();
}

#[test]
fn test_crlf_is_preserved() {
    let project = Project::new(BLANK_LINES);
    project.write("x.toml", "a = 1\r\n\r\n\r\nb = 2\r\n");

    project.cmd().arg("format").assert().success();
    assert_eq!(project.read("x.toml"), "a = 1\r\n\r\nb = 2\r\n");
}

// =============================================================================
// Cache Tests
// =============================================================================

#[test]
fn test_unchanged_files_are_cached() {
    let project = Project::new(BLANK_LINES);
    project.write("x.toml", "a = 1\n\n\n\nb = 2\n");

    project.cmd().arg("format").assert().success();

    let report = project.json(&["check"]);
    assert_eq!(report["stats"]["invocations"], 0);
    assert_eq!(report["stats"]["cache_hits"], 2);
}

#[test]
fn test_settings_change_forces_reprocessing() {
    let project = Project::new(BLANK_LINES);
    project.write("x.toml", "a = 1\n\n\n\nb = 2\n");
    project.cmd().arg("format").assert().success();

    project.write(
        "fmtree.toml",
        &BLANK_LINES.replace("allowed_blank_lines = 1", "allowed_blank_lines = 2"),
    );

    let report = project.json(&["check"]);
    assert_eq!(report["stats"]["invocations"], 1);
    assert_eq!(report["stats"]["cache_hits"], 0);
}

#[test]
fn test_cache_status_and_clear() {
    let project = Project::new(BLANK_LINES);
    project.write("x.toml", "a = 1\n");
    project.cmd().arg("format").assert().success();

    let status = project.json(&["cache", "status"]);
    assert_eq!(status["entries"], 2);

    project
        .cmd()
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 2"));

    let status = project.json(&["cache", "status"]);
    assert_eq!(status["entries"], 0);
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_unknown_formatter_is_config_error() {
    let project = Project::new("[[formatter]]\nname = \"nope\"\nenable = true\n");

    project
        .cmd()
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown formatter 'nope'"));
}

#[test]
fn test_invalid_setting_is_config_error() {
    let project = Project::new(&BLANK_LINES.replace("= 1", "= -1"));

    project
        .cmd()
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("blank-lines"));
}

#[test]
fn test_missing_tool_fails_only_its_files() {
    let project = Project::new(&format!(
        "{}\n[[formatter]]\nname = \"ghost\"\nkind = \"custom\"\nenable = true\ncommand = \"fmtree-test-no-such-tool\"\nincludes = [\"*.md\"]\n",
        BLANK_LINES
    ));
    project.write("x.toml", "a = 1\n\n\n\nb = 2\n");
    project.write("a.md", "# hi\n");

    project
        .cmd()
        .arg("format")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ghost"));

    assert_eq!(project.read("x.toml"), "a = 1\n\nb = 2\n");
}

#[cfg(unix)]
#[test]
fn test_failing_formatter_reports_diagnostics() {
    let project = Project::new(
        r#"[[formatter]]
name = "broken"
kind = "custom"
enable = true
command = "sh"
includes = ["*.txt"]
options = ["-c", "echo 'cannot parse' >&2; exit 3", "sh"]
"#,
    );
    project.write("a.txt", "x\n");

    project
        .cmd()
        .arg("format")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("exited with code 3"))
        .stderr(predicate::str::contains("cannot parse"))
        .stderr(predicate::str::contains("a.txt"));
}

#[cfg(unix)]
#[test]
fn test_custom_formatters_run_in_declared_order() {
    let project = Project::new(
        r#"[[formatter]]
name = "x"
kind = "custom"
enable = true
command = "sh"
includes = ["*.txt"]
options = ["-c", "for f; do echo X >> \"$f\"; done", "sh"]

[[formatter]]
name = "y"
kind = "custom"
enable = true
command = "sh"
includes = ["*.txt"]
options = ["-c", "for f; do echo Y >> \"$f\"; done", "sh"]
"#,
    );
    project.write("a.txt", "");

    project.cmd().arg("format").assert().success();
    assert_eq!(project.read("a.txt"), "X\nY\n");
}

/// Stand-in for rustfmt: `--check` prints `Diff in <abs path>:<line>:` headers
#[cfg(unix)]
const FAKE_RUSTFMT: &str = r#"#!/bin/sh
check=no
if [ "$1" = --check ]; then check=yes; shift; fi
if [ "$1" = -- ]; then shift; fi
rc=0
for f; do
  if grep -q 'fn main(){}' "$f"; then
    if [ $check = yes ]; then
      echo "Diff in $PWD/$f:1:"
      echo "-fn main(){}"
      echo "+fn main() {}"
      rc=1
    else
      sed 's/fn main(){}/fn main() {}/' "$f" > "$f.tmp" && mv "$f.tmp" "$f"
    fi
  fi
done
exit $rc
"#;

#[cfg(unix)]
#[test]
fn test_check_names_only_files_in_rustfmt_diffs() {
    use std::os::unix::fs::PermissionsExt;

    let project = Project::new("[[formatter]]\nname = \"rustfmt\"\nenable = true\n");
    project.write(".fmtree/bin/rustfmt", FAKE_RUSTFMT);
    let tool = project.path().join(".fmtree/bin/rustfmt");
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
    project.write("src/a.rs", "fn main(){}\n");
    project.write("src/b.rs", "fn main() {}\n");

    let report = project.json(&["check"]);
    assert_eq!(report["results"][0]["formatter"], "rustfmt");
    assert_eq!(report["results"][0]["status"]["status"], "success");
    assert_eq!(report["results"][0]["changed"], serde_json::json!(["src/a.rs"]));

    // The clean file was cached, the dirty one was not
    let report = project.json(&["check"]);
    assert_eq!(report["results"][0]["cached"], serde_json::json!(["src/b.rs"]));
    assert_eq!(report["results"][0]["files"], serde_json::json!(["src/a.rs"]));

    project.cmd().arg("format").assert().success();
    assert_eq!(project.read("src/a.rs"), "fn main() {}\n");
    project.cmd().arg("check").assert().success();
}

// =============================================================================
// Output Tests
// =============================================================================

#[test]
fn test_json_report() {
    let project = Project::new(BLANK_LINES);
    project.write("x.toml", "a = 1\n\n\n\nb = 2\n");

    let report = project.json(&["check"]);
    assert_eq!(report["mode"], "check");
    assert_eq!(report["cancelled"], false);
    assert_eq!(report["results"][0]["formatter"], "blank-lines");
    assert_eq!(report["results"][0]["changed"][0], "x.toml");
    assert_eq!(report["stats"]["walked"], 2);
}

#[test]
fn test_formatters_lists_catalog() {
    let home = TempDir::new().unwrap();

    fmtree_cmd(home.path())
        .arg("formatters")
        .assert()
        .success()
        .stdout(predicate::str::contains("blank-lines"))
        .stdout(predicate::str::contains("allowed_blank_lines"))
        .stdout(predicate::str::contains("taplo"))
        .stdout(predicate::str::contains("    includes: *.rs"))
        .stdout(predicate::str::contains("    edition (one of 2015, 2018, 2021, 2024)"));

    let output = fmtree_cmd(home.path())
        .args(["--format", "json", "formatters"])
        .output()
        .unwrap();
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rustfmt = listed
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["name"] == "rustfmt")
        .unwrap();
    assert_eq!(rustfmt["includes"], serde_json::json!(["*.rs"]));
    assert_eq!(rustfmt["settings"][0]["key"], "edition");
}

#[test]
fn test_builtin_check_contract() {
    let project = Project::new("");
    project.write("a.txt", "no newline");
    project.write("b.txt", "fine\n");

    project
        .cmd()
        .args(["builtin", "end-of-file", "--check", "--", "a.txt", "b.txt"])
        .assert()
        .code(1)
        .stdout("a.txt\n");

    assert_eq!(project.read("a.txt"), "no newline");
}

#[test]
fn test_verbose_logs_to_stderr() {
    let project = Project::new(BLANK_LINES);

    project
        .cmd()
        .args(["-vv", "check"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Project root"));
}
