//! E2E Integration tests for mdutils
//!
//! Run with: cargo test --test integration
//! Verbose:  TEST_VERBOSE=1 cargo test --test integration -- --nocapture

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Test logging macro - prints when TEST_VERBOSE is set
macro_rules! test_log {
    ($level:expr, $($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            eprintln!("[{}] [integration:{}] {}",
                $level,
                line!(),
                format!($($arg)*)
            );
        }
    };
}

fn get_binary_path() -> PathBuf {
    if let Ok(bin_path) = std::env::var("CARGO_BIN_EXE_mdutils") {
        let path = PathBuf::from(bin_path);
        if path.exists() {
            return path;
        }
    }

    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let release_path = PathBuf::from(manifest_dir).join("target/release/mdutils");
    let debug_path = PathBuf::from(manifest_dir).join("target/debug/mdutils");

    // Check CARGO_TARGET_DIR override
    if let Ok(target_dir) = std::env::var("CARGO_TARGET_DIR") {
        let custom_release = PathBuf::from(&target_dir).join("release/mdutils");
        let custom_debug = PathBuf::from(&target_dir).join("debug/mdutils");
        if custom_release.exists() {
            return custom_release;
        }
        if custom_debug.exists() {
            return custom_debug;
        }
    }

    if release_path.exists() {
        release_path
    } else if debug_path.exists() {
        debug_path
    } else {
        panic!(
            "mdutils binary not found. Run 'cargo build' or 'cargo build --release' first.\n\
             Looked in:\n  - {}\n  - {}",
            release_path.display(),
            debug_path.display()
        );
    }
}

/// Run mdutils with config discovery disabled so a stray ~/.mdutilsrc
/// cannot change results
fn run_mdutils_args(args: &[&str]) -> (String, String, i32) {
    test_log!("RUN", "mdutils with args: {:?}", args);

    let binary = get_binary_path();
    test_log!("BIN", "Using binary: {}", binary.display());

    let output = Command::new(&binary)
        .arg("--no-config")
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run mdutils");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    test_log!("OUTPUT", "Exit code: {}", code);
    test_log!("OUTPUT", "Stdout length: {} bytes", stdout.len());
    if !stderr.is_empty() {
        test_log!("STDERR", "{}", stderr);
    }

    (stdout, stderr, code)
}

fn run_mdutils_path(subcommand: &str, path: &Path, args: &[&str]) -> (String, String, i32) {
    let path_str = path.to_str().expect("temp path is UTF-8");
    let mut cmd_args = vec![subcommand, "-f", path_str];
    cmd_args.extend_from_slice(args);
    run_mdutils_args(&cmd_args)
}

fn report_line(label: &str, value: usize) -> String {
    format!("{:<32}{}\n", label, value)
}

// ============================================================================
// Format Tests
// ============================================================================

#[test]
fn test_e2e_format_collapses_blank_lines() {
    test_log!("TEST", "Starting: format collapses blank lines");

    let temp = TempDir::new().unwrap();
    let file = temp.path().join("note.md");
    fs::write(&file, "a\n\n\nb").unwrap();

    let (_stdout, stderr, code) = run_mdutils_path("format", temp.path(), &[]);

    assert_eq!(code, 0, "stderr: {}", stderr);
    assert_eq!(fs::read_to_string(&file).unwrap(), "a\n\nb\n");
    assert!(!temp.path().join("note_raw.md").exists());

    test_log!("PASS", "format collapses blank lines");
}

#[test]
fn test_e2e_format_brackets_and_links() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("links.md");
    fs::write(&file, "Click [ok] or see [docs](http://x)  \n").unwrap();

    let (_stdout, _stderr, code) = run_mdutils_path("format", &file, &[]);

    assert_eq!(code, 0);
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "Click [ ok ] or see [docs](http://x)\n"
    );
}

#[test]
fn test_e2e_format_questionable_writes_backup_and_warns() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("code.md");
    let raw = "Index with `a[i]`  \n\n\n\nend";
    fs::write(&file, raw).unwrap();

    let (_stdout, stderr, code) = run_mdutils_path("format", temp.path(), &[]);

    assert_eq!(code, 0);
    assert!(
        stderr.contains(&format!("ambiguity warning in file '{}'", file.display())),
        "stderr: {}",
        stderr
    );
    assert_eq!(
        fs::read_to_string(temp.path().join("code_raw.md")).unwrap(),
        raw
    );
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "Index with `a[ i ]`\n\nend\n"
    );
}

#[test]
fn test_e2e_format_warns_on_unchanged_questionable_file() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("clean.md");
    fs::write(&file, "use `code` freely\n").unwrap();

    let (_stdout, stderr, code) = run_mdutils_path("format", temp.path(), &[]);

    assert_eq!(code, 0);
    assert!(
        stderr.contains(&format!("ambiguity warning in file '{}'", file.display())),
        "stderr: {}",
        stderr
    );
    assert_eq!(fs::read_to_string(&file).unwrap(), "use `code` freely\n");
    assert!(!temp.path().join("clean_raw.md").exists());
}

#[test]
fn test_e2e_format_only_matching_suffix() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("keep.txt"), "x\n\n\n\ny").unwrap();
    fs::write(temp.path().join("doc.md"), "x\n\n\n\ny").unwrap();

    let (_stdout, _stderr, code) = run_mdutils_path("format", temp.path(), &[]);
    assert_eq!(code, 0);
    assert_eq!(
        fs::read_to_string(temp.path().join("keep.txt")).unwrap(),
        "x\n\n\n\ny"
    );
    assert_eq!(
        fs::read_to_string(temp.path().join("doc.md")).unwrap(),
        "x\n\ny\n"
    );

    let (_stdout, _stderr, code) = run_mdutils_path("format", temp.path(), &["-e", "txt"]);
    assert_eq!(code, 0);
    assert_eq!(
        fs::read_to_string(temp.path().join("keep.txt")).unwrap(),
        "x\n\ny\n"
    );
}

#[test]
fn test_e2e_format_idempotent() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("twice.md");
    fs::write(&file, "  He said“hi”there  \n\n\n[button]\n\n").unwrap();

    let (_, _, code) = run_mdutils_path("format", &file, &[]);
    assert_eq!(code, 0);
    let once = fs::read_to_string(&file).unwrap();

    let (_, _, code) = run_mdutils_path("format", &file, &["--dry-run"]);
    assert_eq!(code, 0, "second pass should find nothing to change");
    assert_eq!(fs::read_to_string(&file).unwrap(), once);
}

#[test]
fn test_e2e_format_dry_run_exit_codes() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("dirty.md");
    fs::write(&file, "dirty  \n").unwrap();

    let (_stdout, _stderr, code) = run_mdutils_path("format", &file, &["-n"]);
    assert_eq!(code, 3);
    assert_eq!(fs::read_to_string(&file).unwrap(), "dirty  \n");

    fs::write(&file, "clean\n").unwrap();
    let (_stdout, _stderr, code) = run_mdutils_path("format", &file, &["-n"]);
    assert_eq!(code, 0);
}

#[test]
fn test_e2e_format_diff_output() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("diff.md");
    fs::write(&file, "title  \nbody\n").unwrap();

    let (stdout, _stderr, code) = run_mdutils_path("format", &file, &["--dry-run", "--diff"]);

    assert_eq!(code, 3);
    assert!(stdout.contains("--- a/"));
    assert!(stdout.contains("(proposed)"));
    assert!(stdout.contains("-title  \n"));
    assert!(stdout.contains("+title\n"));
}

#[test]
fn test_e2e_format_continues_past_bad_file() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a_bad.md"), [0x66u8, 0xff, 0x0a]).unwrap();
    let good = temp.path().join("b_good.md");
    fs::write(&good, "ok\n\n\n\nok").unwrap();

    let (_stdout, stderr, code) = run_mdutils_path("format", temp.path(), &[]);

    assert_eq!(code, 4, "stderr: {}", stderr);
    assert!(stderr.contains("a_bad.md"));
    assert_eq!(fs::read_to_string(&good).unwrap(), "ok\n\nok\n");
}

#[test]
fn test_e2e_format_no_recursive() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();
    let nested = temp.path().join("sub/inner.md");
    fs::write(&nested, "x  \n").unwrap();
    fs::write(temp.path().join("top.md"), "y  \n").unwrap();

    let (_, _, code) = run_mdutils_path("format", temp.path(), &["--no-recursive"]);

    assert_eq!(code, 0);
    assert_eq!(fs::read_to_string(&nested).unwrap(), "x  \n");
    assert_eq!(
        fs::read_to_string(temp.path().join("top.md")).unwrap(),
        "y\n"
    );
}

// ============================================================================
// Stats Tests
// ============================================================================

#[test]
fn test_e2e_stats_report_layout() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("mixed.md"), "a好\n\nb").unwrap();

    let (stdout, stderr, code) = run_mdutils_path("stats", temp.path(), &[]);
    assert_eq!(code, 0, "stderr: {}", stderr);

    let mut expected = String::from("STATISTICS\n");
    expected.push_str(&"-".repeat(40));
    expected.push('\n');
    expected.push_str(&report_line("Files:", 1));
    expected.push('\n');
    expected.push_str(&report_line("Paragraphs:", 2));
    expected.push_str(&report_line("Non-Blank Lines:", 2));
    expected.push_str(&report_line("Lines:", 3));
    expected.push('\n');
    expected.push_str(&report_line("Words:", 3));
    expected.push_str(&report_line("Chinese:", 1));
    expected.push_str(&report_line("Hiragana:", 0));
    expected.push_str(&report_line("Katakana:", 0));
    expected.push_str(&report_line("Punctuations:", 0));
    expected.push_str(&report_line("Whitespaces:", 2));
    expected.push_str(&report_line("Other Characters:", 0));
    expected.push('\n');
    expected.push_str(&report_line("Characters (no spaces):", 3));
    expected.push_str(&report_line("Characters (with spaces):", 5));

    assert_eq!(stdout, expected);
}

#[test]
fn test_e2e_stats_empty_directory() {
    let temp = TempDir::new().unwrap();

    let (stdout, _stderr, code) = run_mdutils_path("stats", temp.path(), &["-v"]);

    assert_eq!(code, 0);
    assert!(stdout.contains(&report_line("Files:", 0)));
    assert!(stdout.contains(&report_line("Words:", 0)));
    assert!(!stdout.contains("DETAILS"));
}

#[test]
fn test_e2e_stats_verbose_details() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("b.md"), "カタカナ\n").unwrap();
    fs::write(temp.path().join("a.md"), "ひらがな\n").unwrap();

    let (stdout, _stderr, code) = run_mdutils_path("stats", temp.path(), &["--verbose"]);

    assert_eq!(code, 0);
    assert!(stdout.contains(&report_line("Files:", 2)));
    assert!(stdout.contains("\n\nDETAILS\n"));
    let a = stdout.find("File Name: a.md").unwrap();
    let b = stdout.find("File Name: b.md").unwrap();
    assert!(a < b);
    assert!(stdout.contains(&report_line("Hiragana:", 4)));
    assert!(stdout.contains(&report_line("Katakana:", 4)));
}

#[test]
fn test_e2e_stats_redirect_write_and_append() {
    let temp = TempDir::new().unwrap();
    let docs = temp.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("one.md"), "word\n").unwrap();
    let report = temp.path().join("report.txt");
    let report_str = report.to_str().unwrap();

    let (stdout, _stderr, code) = run_mdutils_path("stats", &docs, &["-R", report_str, "w"]);
    assert_eq!(code, 0);
    assert!(stdout.is_empty());
    let first = fs::read_to_string(&report).unwrap();
    assert!(first.starts_with("STATISTICS\n"));

    let (_, _, code) = run_mdutils_path("stats", &docs, &["-R", report_str, "a"]);
    assert_eq!(code, 0);
    assert_eq!(fs::read_to_string(&report).unwrap(), first.repeat(2));

    let (_, _, code) = run_mdutils_path("stats", &docs, &["-R", report_str, "w"]);
    assert_eq!(code, 0);
    assert_eq!(fs::read_to_string(&report).unwrap(), first);
}

#[test]
fn test_e2e_stats_invalid_redirect_mode() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("one.md"), "word\n").unwrap();
    let report = temp.path().join("report.txt");

    let (_stdout, stderr, code) = run_mdutils_path(
        "stats",
        temp.path(),
        &["-R", report.to_str().unwrap(), "x"],
    );

    assert_eq!(code, 2);
    assert!(stderr.contains("Invalid redirect mode"));
    assert!(!report.exists());
}

#[test]
fn test_e2e_stats_nonexistent_path() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope");

    let (stdout, stderr, code) = run_mdutils_path("stats", &missing, &[]);

    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Failed to access path"));
}

#[test]
fn test_e2e_stats_invalid_utf8() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("bad.md"), [0xc3u8, 0x28]).unwrap();

    let (stdout, stderr, code) = run_mdutils_path("stats", temp.path(), &[]);

    assert_eq!(code, 4);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Invalid UTF-8"));
}

#[test]
fn test_e2e_stats_json() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("doc.md"), "Hello, 世界!\n").unwrap();

    let (stdout, _stderr, code) = run_mdutils_path("stats", temp.path(), &["--json", "-v"]);
    assert_eq!(code, 0);

    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(json["version"], "1.0");
    assert_eq!(json["files"], 1);
    assert_eq!(json["total"]["words"], 7);
    assert_eq!(json["total"]["CJK"], 2);
    assert_eq!(json["total"]["punctuations"], 2);
    assert_eq!(json["total"]["whitespaces"], 2);
    assert_eq!(json["details"][0]["file"], "doc.md");
}

#[test]
fn test_e2e_stats_single_file_extension_added() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("notes.txt");
    fs::write(&file, "abc\n").unwrap();

    let (stdout, _stderr, code) = run_mdutils_path("stats", &file, &[]);

    assert_eq!(code, 0);
    assert!(stdout.contains(&report_line("Files:", 1)));
    assert!(stdout.contains(&report_line("Words:", 3)));
}

// ============================================================================
// Config and CLI Tests
// ============================================================================

#[test]
fn test_e2e_config_file_suffixes() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.markdown"), "one\n").unwrap();
    fs::write(temp.path().join("b.md"), "two\n").unwrap();
    let config = temp.path().join("custom.toml");
    fs::write(&config, "suffixes = [\".markdown\"]\n").unwrap();

    let binary = get_binary_path();
    let output = Command::new(&binary)
        .args(["--config", config.to_str().unwrap(), "stats", "-f"])
        .arg(temp.path())
        .output()
        .expect("Failed to run mdutils");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout.contains(&report_line("Files:", 1)));
    assert!(stdout.contains(&report_line("Words:", 3)));
}

#[test]
fn test_e2e_invalid_suffix_exit_code() {
    let temp = TempDir::new().unwrap();

    let (_stdout, stderr, code) = run_mdutils_path("stats", temp.path(), &["-e", "*.md"]);

    assert_eq!(code, 2);
    assert!(stderr.contains("Unsupported suffix"));
}

#[test]
fn test_e2e_help_and_version() {
    let (stdout, _stderr, code) = run_mdutils_args(&["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("format"));
    assert!(stdout.contains("stats"));

    let (stdout, _stderr, code) = run_mdutils_args(&["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("mdutils"));
}

#[test]
fn test_e2e_unknown_flag_exit_code() {
    let (_stdout, _stderr, code) = run_mdutils_args(&["stats", "--bogus"]);
    assert_eq!(code, 2);
}
