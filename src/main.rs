//! # mdutils
//!
//! Command-line housekeeping for markdown notes: a fixed normalization pass
//! over whitespace and bracket spacing, and CJK-aware text statistics over a
//! tree of files.
//!
//! ## Key Components
//!
//! - **File Selection**: walks a file or directory and keeps files whose
//!   extension is in the accepted suffix set (`md` by default).
//! - **Reformatter**: trims the document, collapses blank-line runs, pads
//!   button-like `[labels]`, strips trailing whitespace and spaces curly
//!   quotes. Documents containing inline code are flagged as questionable and
//!   their original text is kept in a `_raw` sibling.
//! - **Classifier**: a single left-to-right scan assigning every character to
//!   exactly one category (words, punctuation, whitespace) with CJK, Hiragana
//!   and Katakana sub-counts, plus paragraph and line detection from newline
//!   runs.
//! - **Reporter**: sums per-file tallies and renders a fixed-layout text
//!   report (or JSON), printed or redirected to a file.
//!
//! ## Flow
//!
//! ```text
//! path → File Selection → Reformatter  → overwrite (+ backup, warning)
//!                       → Classifier   → Aggregate → Report → stdout | file
//! ```
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | General error (path not found, permission denied, I/O error) |
//! | 2 | Invalid command-line arguments or configuration |
//! | 3 | Dry-run mode: changes would be made |
//! | 4 | Parse error (invalid UTF-8 or binary input) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use anyhow::{Context, Result};
use clap::ValueEnum;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use regex::Regex;
use rich_rust::terminal;
use rich_rust::{ColorSystem, Console};
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

// ─────────────────────────────────────────────────────────────────────────────
// Exit Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Semantic exit codes for scripting and CI integration
mod exit_codes {
    /// Success - completed without errors
    pub const SUCCESS: i32 = 0;
    /// General error (path not found, permission denied, I/O error)
    pub const ERROR: i32 = 1;
    /// Invalid command-line arguments or configuration
    pub const INVALID_ARGS: i32 = 2;
    /// Dry-run mode: changes would be made
    pub const WOULD_CHANGE: i32 = 3;
    /// Parse error (invalid UTF-8 or binary file detected)
    pub const PARSE_ERROR: i32 = 4;
}

#[derive(Debug)]
struct ArgError(String);

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ArgError {}

#[derive(Debug)]
struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
struct RunOutcome {
    dry_run: bool,
    would_change: bool,
}

impl RunOutcome {
    fn done() -> Self {
        Self {
            dry_run: false,
            would_change: false,
        }
    }
}

fn error_chain_has<T: std::error::Error + 'static>(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<T>())
}

fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    if error_chain_has::<ArgError>(err) {
        exit_codes::INVALID_ARGS
    } else if error_chain_has::<ParseError>(err) {
        exit_codes::PARSE_ERROR
    } else {
        exit_codes::ERROR
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CLI Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ColorMode {
    /// Auto-detect color support
    Auto,
    /// Always emit colors (even when not a TTY)
    Always,
    /// Never emit colors
    Never,
}

/// Markdown utilities: normalize formatting and show text statistics
#[derive(Parser, Debug)]
#[command(
    name = "mdutils",
    version,
    about,
    long_about = None,
    after_help = "EXIT CODES:\n  0  Success\n  1  General error (path not found, permission denied, I/O error)\n  2  Invalid command-line arguments or configuration\n  3  Dry-run mode: changes would be made\n  4  Parse error (invalid UTF-8 or binary input)\n"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand
#[derive(clap::Args, Debug, Clone)]
struct GlobalArgs {
    /// Path to config file (default: search for .mdutilsrc)
    #[arg(long = "config", value_name = "FILE", global = true)]
    config_file: Option<PathBuf>,

    /// Ignore config files
    #[arg(long = "no-config", global = true)]
    no_config: bool,

    /// Color output: auto, always, or never
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Format markdown files in place
    Format(FormatArgs),
    /// Show statistics
    Stats(StatsArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// File selection options shared by `format` and `stats`
#[derive(clap::Args, Debug, Clone)]
struct CommonArgs {
    /// File or directory path (current working directory by default)
    #[arg(short = 'f', long = "path", default_value = ".", value_name = "PATH")]
    path: PathBuf,

    /// Suffix(es) to accept, '.md' for example
    #[arg(short = 's', long = "suffix", num_args = 1.., value_name = "SUFFIX")]
    suffixes: Vec<String>,

    /// Extension(s) to accept, 'md' for example
    #[arg(short = 'e', long = "ext", num_args = 1.., value_name = "EXT")]
    extensions: Vec<String>,

    /// Only inspect the immediate children of a directory
    #[arg(long = "no-recursive")]
    no_recursive: bool,

    /// Respect .gitignore and .ignore files while walking
    #[arg(long)]
    gitignore: bool,

    /// Maximum directory depth (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_depth: usize,

    /// Glob patterns of file names to skip (comma-separated)
    #[arg(long, value_name = "GLOBS")]
    exclude: Option<String>,

    /// Print verbosely
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Default for CommonArgs {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            suffixes: Vec::new(),
            extensions: Vec::new(),
            no_recursive: false,
            gitignore: false,
            max_depth: 0,
            exclude: None,
            verbose: false,
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
struct FormatArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Preview changes without modifying files (exit 0=no changes, 3=would change)
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show unified diff of changes
    #[arg(short = 'd', long)]
    diff: bool,
}

#[derive(clap::Args, Debug, Clone)]
struct StatsArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Redirect output; FILE is the target, MODE is 'w' (write) or 'a' (append)
    #[arg(short = 'R', long = "redirect", num_args = 2, value_names = ["FILE", "MODE"])]
    redirect: Option<Vec<String>>,

    /// Output statistics as JSON
    #[arg(long)]
    json: bool,
}

/// Config management actions
#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Initialize a new .mdutilsrc config file
    Init {
        /// Create in home directory instead of current
        #[arg(long)]
        global: bool,
    },
    /// Show effective configuration (merged file + CLI)
    Show,
    /// Show path to active config file
    Path,
}

// ─────────────────────────────────────────────────────────────────────────────
// Report Redirection
// ─────────────────────────────────────────────────────────────────────────────

/// How a redirected report file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RedirectMode {
    /// `w`: replace existing content
    Truncate,
    /// `a`: add to the end of the file
    Append,
}

impl RedirectMode {
    fn parse(mode: &str) -> Result<Self, ArgError> {
        match mode {
            "w" => Ok(Self::Truncate),
            "a" => Ok(Self::Append),
            other => Err(ArgError(format!(
                "Invalid redirect mode '{}': expected 'w' (write) or 'a' (append)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Redirect {
    path: PathBuf,
    mode: RedirectMode,
}

impl Redirect {
    fn from_values(values: &[String]) -> Result<Self, ArgError> {
        match values {
            [path, mode] => Ok(Self {
                path: PathBuf::from(path),
                mode: RedirectMode::parse(mode)?,
            }),
            _ => Err(ArgError(
                "--redirect takes exactly two values: FILE MODE".to_string(),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Extension accepted when nothing else is configured
const DEFAULT_SUFFIX: &str = "md";

/// Marker inserted between the stem and the extension of backup files
const DEFAULT_BACKUP_SUFFIX: &str = "_raw";

/// Runtime configuration derived from CLI args and the config file
#[derive(Debug)]
struct Config {
    /// Accepted extensions, lowercase, without leading dot
    suffixes: Vec<String>,
    recursive: bool,
    gitignore: bool,
    max_depth: usize,
    exclude: Option<String>,
    exclude_set: Option<GlobSet>,
    verbose: bool,
    color: ColorMode,
    backup_suffix: String,
    json: bool,
}

struct VerboseStyle {
    use_color: bool,
}

impl VerboseStyle {
    fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn wrap(&self, tag: &str, text: impl fmt::Display) -> String {
        if self.use_color {
            format!("[{}]{}[/]", tag, text)
        } else {
            text.to_string()
        }
    }

    fn warn(&self, text: impl fmt::Display) -> String {
        self.wrap("yellow", text)
    }

    fn success(&self, text: impl fmt::Display) -> String {
        self.wrap("bold green", text)
    }

    fn dim(&self, text: impl fmt::Display) -> String {
        self.wrap("dim", text)
    }

    fn stat_label(&self, text: impl fmt::Display) -> String {
        self.wrap("bold blue", text)
    }

    fn separator(&self) -> String {
        self.wrap("dim", "───")
    }
}

/// Counters collected while formatting a batch of files
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct FormatSummary {
    processed: usize,
    changed: usize,
    questionable: usize,
    errors: usize,
}

/// Print a format summary through the console
fn print_format_summary(summary: &FormatSummary, console: &Console, styles: &VerboseStyle) {
    console.print("");
    console.print(&format!(
        "{} Summary {}",
        styles.separator(),
        styles.separator()
    ));
    console.print(&format!(
        "  {} {} processed, {} modified, {} unchanged",
        styles.stat_label("Files:"),
        summary.processed,
        summary.changed,
        summary.processed.saturating_sub(summary.changed)
    ));
    if summary.questionable > 0 {
        console.print(&format!(
            "  {} {} (originals kept as backups)",
            styles.wrap("bold yellow", "Questionable:"),
            summary.questionable
        ));
    }
    if summary.errors > 0 {
        console.print(&format!(
            "  {} {}",
            styles.wrap("bold red", "Errors:"),
            summary.errors
        ));
    }
    console.print("");
}

fn build_console(color: ColorMode) -> (Console, VerboseStyle) {
    match color {
        ColorMode::Never => (Console::new(), VerboseStyle::new(false)),
        ColorMode::Always => {
            let system = terminal::detect_color_system().unwrap_or(ColorSystem::Standard);
            let console = Console::builder()
                .force_terminal(true)
                .color_system(system)
                .build();
            (console, VerboseStyle::new(true))
        }
        ColorMode::Auto => {
            if std::env::var("NO_COLOR").is_ok() {
                return (Console::new(), VerboseStyle::new(false));
            }

            if std::env::var("FORCE_COLOR").is_ok() {
                let system = terminal::detect_color_system().unwrap_or(ColorSystem::Standard);
                let console = Console::builder()
                    .force_terminal(true)
                    .color_system(system)
                    .build();
                return (console, VerboseStyle::new(true));
            }

            let console = Console::new();
            let use_color = console.is_color_enabled();
            (console, VerboseStyle::new(use_color))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config File Support
// ─────────────────────────────────────────────────────────────────────────────

/// Config file names searched in order
const CONFIG_FILENAMES: &[&str] = &[".mdutilsrc", ".mdutilsrc.toml", "mdutilsrc.toml"];

/// Configuration loaded from a .mdutilsrc file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    /// Accepted suffixes or extensions ("md", ".markdown")
    suffixes: Option<Vec<String>>,
    /// Descend into subdirectories
    recursive: Option<bool>,
    /// Respect .gitignore
    gitignore: Option<bool>,
    /// Maximum directory depth
    max_depth: Option<usize>,
    /// Glob patterns of file names to skip
    exclude: Option<String>,
    /// Show verbose output
    verbose: Option<bool>,
    /// Color mode: auto, always, never
    color: Option<ColorMode>,
    /// Marker for backup copies of questionable files
    backup_suffix: Option<String>,
    /// Output statistics as JSON
    json: Option<bool>,
}

/// Search for a config file starting from the given directory
fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    // Search up the directory tree
    loop {
        for filename in CONFIG_FILENAMES {
            let config_path = current.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    if let Some(home) = dirs::home_dir() {
        for filename in CONFIG_FILENAMES {
            let config_path = home.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
        }
    }

    None
}

/// Load and parse a config file
fn load_config_file(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve the config file to use, if any
fn locate_config(global: &GlobalArgs, target: &Path) -> Result<Option<PathBuf>> {
    if global.no_config {
        return Ok(None);
    }

    if let Some(ref path) = global.config_file {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }
        return Ok(Some(path.clone()));
    }

    let start_dir = if target.is_dir() {
        target.to_path_buf()
    } else {
        target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    };

    Ok(find_config_file(&start_dir))
}

/// Normalize a user-supplied suffix or extension to lowercase without a dot.
///
/// `.MD`, `md` and `Md` all become `md`. Anything that can never equal a
/// single file extension is rejected as a configuration error.
fn normalize_suffix(raw: &str) -> Result<String, ArgError> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix('.').unwrap_or(trimmed);

    let invalid = bare.is_empty()
        || bare.chars().any(|c| {
            c.is_whitespace()
                || matches!(c, '.' | '/' | '\\' | '*' | '?' | '[' | ']' | '{' | '}')
        });
    if invalid {
        return Err(ArgError(format!("Unsupported suffix '{}'", raw)));
    }

    Ok(bare.to_lowercase())
}

/// Build the accepted suffix set.
///
/// Explicit values win over the config file; the target's own extension is
/// always accepted so that `-f notes.txt` works without `-e txt`.
fn resolve_suffixes(
    target: &Path,
    explicit: &[String],
    from_file: Option<&[String]>,
) -> Result<Vec<String>, ArgError> {
    let configured: &[String] = if explicit.is_empty() {
        from_file.unwrap_or_default()
    } else {
        explicit
    };

    let mut suffixes = Vec::new();
    for raw in configured {
        let suffix = normalize_suffix(raw)?;
        if !suffixes.contains(&suffix) {
            suffixes.push(suffix);
        }
    }

    if let Some(ext) = target.extension().and_then(|e| e.to_str()) {
        if let Ok(suffix) = normalize_suffix(ext) {
            if !suffixes.contains(&suffix) {
                suffixes.push(suffix);
            }
        }
    }

    if suffixes.is_empty() {
        suffixes.push(DEFAULT_SUFFIX.to_string());
    }

    Ok(suffixes)
}

fn validate_backup_suffix(suffix: &str) -> Result<(), ArgError> {
    if suffix.is_empty() || suffix.contains(['/', '\\']) {
        return Err(ArgError(format!("Invalid backup_suffix '{}'", suffix)));
    }
    Ok(())
}

/// Create Config by merging file config with CLI args (CLI wins)
fn create_config(global: &GlobalArgs, common: &CommonArgs) -> Result<Config> {
    let file_config = match locate_config(global, &common.path)? {
        Some(path) => load_config_file(&path)?,
        None => FileConfig::default(),
    };

    let mut explicit = common.suffixes.clone();
    explicit.extend(common.extensions.iter().cloned());
    let suffixes = resolve_suffixes(&common.path, &explicit, file_config.suffixes.as_deref())?;

    let recursive = if common.no_recursive {
        false
    } else {
        file_config.recursive.unwrap_or(true)
    };

    let gitignore = common.gitignore || file_config.gitignore.unwrap_or(false);

    let max_depth = if common.max_depth == 0 {
        file_config.max_depth.unwrap_or(0)
    } else {
        common.max_depth
    };

    let exclude = common.exclude.clone().or(file_config.exclude);
    let exclude_set = exclude.as_deref().map(build_exclude_set).transpose()?;

    let verbose = common.verbose || file_config.verbose.unwrap_or(false);

    let color = if global.color == ColorMode::Auto {
        file_config.color.unwrap_or(ColorMode::Auto)
    } else {
        global.color
    };

    let backup_suffix = file_config
        .backup_suffix
        .unwrap_or_else(|| DEFAULT_BACKUP_SUFFIX.to_string());
    validate_backup_suffix(&backup_suffix)?;

    Ok(Config {
        suffixes,
        recursive,
        gitignore,
        max_depth,
        exclude,
        exclude_set,
        verbose,
        color,
        backup_suffix,
        json: file_config.json.unwrap_or(false),
    })
}

/// Default config file content
const DEFAULT_CONFIG: &str = r#"# .mdutilsrc - mdutils configuration file

# Accepted file suffixes (with or without the leading dot)
suffixes = ["md"]

# Directory traversal
# recursive = true
# gitignore = false
# max_depth = 0
# exclude = "CHANGELOG.md,*_raw.md"

# Output options
# verbose = false
# color = "auto"
# json = false

# Questionable files keep their original text in <stem><backup_suffix><ext>
# backup_suffix = "_raw"
"#;

/// Handle the config subcommand
fn run_config_command(action: &ConfigAction, global: &GlobalArgs) -> Result<()> {
    match action {
        ConfigAction::Init { global: in_home } => {
            let path = if *in_home {
                dirs::home_dir()
                    .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
                    .join(".mdutilsrc")
            } else {
                PathBuf::from(".mdutilsrc")
            };

            if path.exists() {
                return Err(anyhow::anyhow!(
                    "Config file already exists: {}",
                    path.display()
                ));
            }

            fs::write(&path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to create config file: {}", path.display()))?;

            eprintln!("Created config file: {}", path.display());
            Ok(())
        }

        ConfigAction::Show => {
            let common = CommonArgs::default();
            let config = create_config(global, &common)?;

            eprintln!("Effective configuration:");
            eprintln!("  suffixes: {}", config.suffixes.join(", "));
            eprintln!("  recursive: {}", config.recursive);
            eprintln!("  gitignore: {}", config.gitignore);
            eprintln!("  max_depth: {}", config.max_depth);
            eprintln!("  exclude: {}", config.exclude.as_deref().unwrap_or("(none)"));
            eprintln!("  verbose: {}", config.verbose);
            eprintln!("  color: {:?}", config.color);
            eprintln!("  json: {}", config.json);
            eprintln!("  backup_suffix: {}", config.backup_suffix);

            if let Some(path) = locate_config(global, &common.path)? {
                eprintln!();
                eprintln!("Config file: {}", path.display());
            }

            Ok(())
        }

        ConfigAction::Path => match locate_config(global, Path::new("."))? {
            Some(path) => {
                println!("{}", path.display());
                Ok(())
            }
            None => anyhow::bail!("No config file found"),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Selection
// ─────────────────────────────────────────────────────────────────────────────

fn build_exclude_set(patterns: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();

    for raw in patterns.split(',') {
        let pattern = raw.trim();
        if pattern.is_empty() {
            continue;
        }

        let glob = Glob::new(pattern)
            .map_err(|err| ArgError(format!("Invalid glob pattern '{}': {}", pattern, err)))?;
        builder.add(glob);
    }

    builder
        .build()
        .map_err(|err| ArgError(format!("Invalid glob set: {}", err)).into())
}

/// Check a file's extension against the accepted suffix set (case-insensitive)
fn suffix_matches(path: &Path, suffixes: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .is_some_and(|ext| suffixes.contains(&ext))
}

fn is_selected(path: &Path, config: &Config) -> bool {
    if !suffix_matches(path, &config.suffixes) {
        return false;
    }

    match (&config.exclude_set, path.file_name()) {
        (Some(excludes), Some(name)) => !excludes.is_match(name),
        _ => true,
    }
}

/// Collect the files under `root` that pass the suffix and exclude filters.
///
/// A root that is a file is returned iff it matches. A missing root is an
/// error; it is never treated as an empty selection. The result is sorted and
/// free of duplicates.
fn select_files(root: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    let metadata = fs::metadata(root)
        .with_context(|| format!("Failed to access path: {}", root.display()))?;

    let mut files = BTreeSet::new();

    if metadata.is_file() {
        if is_selected(root, config) {
            files.insert(root.to_path_buf());
        }
        return Ok(files.into_iter().collect());
    }

    let mut walker = WalkBuilder::new(root);
    walker.standard_filters(false);
    walker.hidden(false);
    walker.git_ignore(config.gitignore);
    walker.git_exclude(config.gitignore);
    walker.git_global(config.gitignore);
    walker.ignore(config.gitignore);
    walker.parents(config.gitignore);

    if !config.recursive {
        walker.max_depth(Some(1));
    } else if config.max_depth > 0 {
        walker.max_depth(Some(config.max_depth));
    }

    for entry in walker.build() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let entry_path = entry.path();
        if entry_path.is_file() && is_selected(entry_path, config) {
            files.insert(entry_path.to_path_buf());
        }
    }

    Ok(files.into_iter().collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Text Input
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum file size (100 MB) - reject larger files to prevent memory issues
const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Read a whole file as UTF-8 text
fn read_text(path: &Path) -> Result<String> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read file metadata: {}", path.display()))?;

    if metadata.len() > MAX_FILE_SIZE {
        return Err(ParseError(format!(
            "File too large: {} ({} MB). Maximum supported size is {} MB.",
            path.display(),
            metadata.len() / (1024 * 1024),
            MAX_FILE_SIZE / (1024 * 1024)
        ))
        .into());
    }

    let bytes =
        fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;

    decode_text(bytes, &path.display().to_string())
}

/// Convert raw bytes to text, checking for binary content and valid UTF-8
fn decode_text(bytes: Vec<u8>, source_label: &str) -> Result<String> {
    if bytes.contains(&0) {
        return Err(ParseError(format!("Input appears to be binary: {}", source_label)).into());
    }

    let text = String::from_utf8(bytes).map_err(|err| {
        let utf8_err = err.utf8_error();
        let valid_up_to = utf8_err.valid_up_to();
        let byte = err.as_bytes().get(valid_up_to).copied();
        let detail = match byte {
            Some(b) => format!(
                "Invalid UTF-8 at byte position {} (byte value: 0x{:02X}) in {}",
                valid_up_to, b, source_label
            ),
            None => format!("Invalid UTF-8 in {}", source_label),
        };
        ParseError(detail)
    })?;

    Ok(text)
}

/// Convert `\r\n` and lone `\r` line endings to `\n`
fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Whitespace as the classifier and reformatter see it: Unicode `White_Space`
/// plus the ASCII information separators.
fn is_space(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// Letters, numbers and underscore; combining marks are not word characters
const WORD_CLASS: &str = r"[\p{L}\p{N}_]";

static WORD_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{}$", WORD_CLASS)).expect("word class is valid"));

fn is_word_char(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_alphanumeric() || c == '_';
    }
    let mut buf = [0u8; 4];
    WORD_CHAR.is_match(c.encode_utf8(&mut buf))
}

// ─────────────────────────────────────────────────────────────────────────────
// Reformatter
// ─────────────────────────────────────────────────────────────────────────────

/// Three or more line breaks, counting spaces/tabs-only lines as blank
static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("blank line pattern is valid"));

static TRAILING_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("trailing whitespace pattern is valid"));

/// `word“` or `word   “`
static OPENING_QUOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("({})(?: {{2,}})?“", WORD_CLASS)).expect("opening quote pattern is valid")
});

/// `”word` or `”   word`
static CLOSING_QUOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("”(?: {{2,}})?({})", WORD_CLASS)).expect("closing quote pattern is valid")
});

/// A backtick, anything on the same line, a backtick
static CODE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`.*`").expect("code span pattern is valid"));

/// Outcome of normalizing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FormatResult {
    /// Normalized text, always ending in exactly one `\n`
    output: String,
    /// The input contains inline code, where bracket padding may corrupt code
    questionable: bool,
}

/// Normalize a whole document.
///
/// The steps run in a fixed order, each on the previous step's output:
///
/// 1. trim the document and end it with a single newline
/// 2. collapse three or more line breaks to one blank line
/// 3. pad `[label]` to `[ label ]`, leaving `[text](url)` links alone
/// 4. strip trailing spaces and tabs
/// 5. put exactly one space between a word and a curly double quote
///
/// Expects `\n` line endings (see [`normalize_newlines`]).
fn reformat(raw: &str) -> FormatResult {
    let mut text = raw.trim_matches(is_space).to_string();
    text.push('\n');

    let text = BLANK_LINE_RUN.replace_all(&text, "\n\n");
    let text = pad_brackets(&text);
    let text = TRAILING_WHITESPACE.replace_all(&text, "\n");
    let text = OPENING_QUOTE.replace_all(&text, "${1} “");
    let text = CLOSING_QUOTE.replace_all(&text, "” ${1}");

    FormatResult {
        output: text.into_owned(),
        questionable: CODE_SPAN.is_match(raw),
    }
}

fn is_bracket(c: char) -> bool {
    matches!(c, '[' | ']')
}

fn pad_brackets(text: &str) -> String {
    let opened = pad_opening_brackets(text);
    pad_closing_brackets(&opened)
}

/// `[label]x` -> `[ label]x` for any `x` other than `(`.
///
/// The label must not start with whitespace or a bracket, and the first `]`
/// after it decides whether the construct is a link.
fn pad_opening_brackets(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();

    // next_close[i]: index of the first ']' at or after i
    let mut next_close = vec![None; chars.len() + 1];
    for i in (0..chars.len()).rev() {
        next_close[i] = if chars[i] == ']' {
            Some(i)
        } else {
            next_close[i + 1]
        };
    }

    let mut out = String::with_capacity(text.len() + 16);
    for (i, &c) in chars.iter().enumerate() {
        out.push(c);
        if c != '[' {
            continue;
        }

        let starts_label = chars
            .get(i + 1)
            .is_some_and(|&first| !is_space(first) && !is_bracket(first));
        let not_a_link = next_close[i + 1]
            .and_then(|close| chars.get(close + 1))
            .is_some_and(|&after| after != '(');

        if starts_label && not_a_link {
            out.push(' ');
        }
    }
    out
}

/// `label]` -> `label ]` unless the bracket opens a link target `](`
fn pad_closing_brackets(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);

    for (i, &c) in chars.iter().enumerate() {
        if c == ']' {
            let after_label = i
                .checked_sub(1)
                .and_then(|prev| chars.get(prev))
                .is_some_and(|&prev| !is_space(prev) && !is_bracket(prev));
            let before_link = chars.get(i + 1) == Some(&'(');

            if after_label && !before_link {
                out.push(' ');
            }
        }
        out.push(c);
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Format Command
// ─────────────────────────────────────────────────────────────────────────────

/// Result of reformatting a single file
struct FileResult {
    path: PathBuf,
    /// Text as read from disk, line endings untouched
    original: String,
    formatted: FormatResult,
    would_change: bool,
}

fn process_file(path: &Path) -> Result<FileResult> {
    let original = read_text(path)?;
    let formatted = reformat(&normalize_newlines(&original));
    let would_change = formatted.output != original;

    Ok(FileResult {
        path: path.to_path_buf(),
        original,
        formatted,
        would_change,
    })
}

/// `notes/a.md` with marker `_raw` becomes `notes/a_raw.md`
fn backup_path(path: &Path, marker: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, marker, ext.to_string_lossy()),
        None => format!("{}{}", stem, marker),
    };
    path.with_file_name(name)
}

/// Replace `path` with `content` through a temporary sibling and a rename
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    temp.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write temporary file for {}", path.display()))?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())
            .with_context(|| format!("Failed to copy permissions of {}", path.display()))?;
    }

    temp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

    Ok(())
}

fn warn_ambiguity(path: &Path) {
    eprintln!("ambiguity warning in file '{}'", path.display());
}

/// Write a changed file back, keeping the original first when questionable.
///
/// Questionable files are always reported on stderr, even when nothing needs
/// to be written. Returns the backup path when one was written.
fn apply_format(result: &FileResult, backup_marker: &str) -> Result<Option<PathBuf>> {
    if !result.would_change {
        if result.formatted.questionable {
            warn_ambiguity(&result.path);
        }
        return Ok(None);
    }

    let backup = if result.formatted.questionable {
        let backup = backup_path(&result.path, backup_marker);
        fs::write(&backup, &result.original)
            .with_context(|| format!("Failed to create backup at {}", backup.display()))?;
        warn_ambiguity(&result.path);
        Some(backup)
    } else {
        None
    };

    write_atomic(&result.path, &result.formatted.output)?;

    Ok(backup)
}

/// Output a unified diff for a file result
fn output_diff(result: &FileResult, proposed: bool) -> Result<()> {
    if !result.would_change {
        return Ok(());
    }

    let diff = TextDiff::from_lines(&result.original, &result.formatted.output);
    let mut stdout = io::stdout().lock();
    let filename = result.path.display();

    writeln!(stdout, "--- a/{}", filename)?;
    if proposed {
        writeln!(stdout, "+++ b/{} (proposed)", filename)?;
    } else {
        writeln!(stdout, "+++ b/{}", filename)?;
    }

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        writeln!(stdout, "{}", hunk.header())?;
        for change in hunk.iter_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => " ",
            };
            let line = change.value();
            if line.ends_with('\n') {
                write!(stdout, "{}{}", sign, line)?;
            } else {
                writeln!(stdout, "{}{}", sign, line)?;
            }
        }
    }

    Ok(())
}

fn report_formatted(
    result: &FileResult,
    backup: Option<&Path>,
    console: &Console,
    styles: &VerboseStyle,
) {
    if !result.would_change {
        console.print(&styles.dim(format!("{}: No changes needed", result.path.display())));
        return;
    }

    console.print(&styles.success(format!("Formatted {}", result.path.display())));
    if let Some(backup) = backup {
        console.print(&styles.dim(format!("  Original kept at {}", backup.display())));
    }
}

fn report_dry_run(result: &FileResult, console: &Console, styles: &VerboseStyle) {
    if !result.would_change {
        console.print(&styles.success(format!("No changes needed: {}", result.path.display())));
    } else if result.formatted.questionable {
        console.print(&styles.warn(format!(
            "Would modify: {} (questionable, original would be backed up)",
            result.path.display()
        )));
    } else {
        console.print(&styles.warn(format!("Would modify: {}", result.path.display())));
    }
}

fn run_format(global: &GlobalArgs, args: &FormatArgs) -> Result<RunOutcome> {
    let config = create_config(global, &args.common)?;
    let (console, styles) = build_console(config.color);

    let files = select_files(&args.common.path, &config)?;
    if files.is_empty() {
        eprintln!(
            "Warning: No files with suffix(es) '{}' under {}",
            config.suffixes.join(", "),
            args.common.path.display()
        );
        return Ok(RunOutcome {
            dry_run: args.dry_run,
            would_change: false,
        });
    }

    let mut summary = FormatSummary::default();
    let mut errors: Vec<(PathBuf, anyhow::Error)> = Vec::new();
    let mut any_would_change = false;

    for path in &files {
        let result = match process_file(path) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Error processing {}: {:#}", path.display(), e);
                errors.push((path.clone(), e));
                continue;
            }
        };

        summary.processed += 1;
        if result.would_change {
            any_would_change = true;
            summary.changed += 1;
            if result.formatted.questionable {
                summary.questionable += 1;
            }
        }

        if args.diff {
            output_diff(&result, args.dry_run)?;
        }

        if args.dry_run {
            if config.verbose {
                report_dry_run(&result, &console, &styles);
            }
            continue;
        }

        match apply_format(&result, &config.backup_suffix) {
            Ok(backup) => {
                if config.verbose {
                    report_formatted(&result, backup.as_deref(), &console, &styles);
                }
            }
            Err(e) => {
                eprintln!("Error writing {}: {:#}", path.display(), e);
                errors.push((path.clone(), e));
            }
        }
    }

    summary.errors = errors.len();
    if config.verbose {
        print_format_summary(&summary, &console, &styles);
    }

    if !errors.is_empty() {
        let files = errors
            .iter()
            .map(|(p, _)| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let has_parse_error = errors
            .iter()
            .any(|(_, err)| error_chain_has::<ParseError>(err));

        if has_parse_error {
            return Err(ParseError(format!(
                "{} file(s) had parse errors: {}",
                errors.len(),
                files
            ))
            .into());
        }

        anyhow::bail!("{} file(s) had errors: {}", errors.len(), files);
    }

    Ok(RunOutcome {
        dry_run: args.dry_run,
        would_change: any_would_change,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Statistics Classifier
// ─────────────────────────────────────────────────────────────────────────────

/// Per-category character counts for one document or a set of documents.
///
/// `words`, `punctuations`, `whitespaces` and `other_chars` partition the
/// characters of a document. `cjk`, `hiragana` and `katakana` are sub-counts
/// of `words`. `paragraphs`, `non_blank_lines` and `lines` describe structure
/// and are not character counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    paragraphs: usize,
    non_blank_lines: usize,
    lines: usize,
    words: usize,
    cjk: usize,
    hiragana: usize,
    katakana: usize,
    punctuations: usize,
    whitespaces: usize,
    other_chars: usize,
}

impl Tally {
    fn chars_no_spaces(&self) -> usize {
        self.words + self.punctuations + self.other_chars
    }

    fn chars_with_spaces(&self) -> usize {
        self.chars_no_spaces() + self.whitespaces
    }

    /// Merge another tally into this one (for aggregating across files)
    fn merge(&mut self, other: &Tally) {
        self.paragraphs += other.paragraphs;
        self.non_blank_lines += other.non_blank_lines;
        self.lines += other.lines;
        self.words += other.words;
        self.cjk += other.cjk;
        self.hiragana += other.hiragana;
        self.katakana += other.katakana;
        self.punctuations += other.punctuations;
        self.whitespaces += other.whitespaces;
        self.other_chars += other.other_chars;
    }

    fn record(&mut self, unit: Unit) {
        match unit {
            Unit::Cjk | Unit::CjkExtension => {
                self.cjk += 1;
                self.words += 1;
            }
            Unit::Hiragana => {
                self.hiragana += 1;
                self.words += 1;
            }
            Unit::Katakana => {
                self.katakana += 1;
                self.words += 1;
            }
            Unit::Word => self.words += 1,
            Unit::Punctuation => self.punctuations += 1,
            Unit::NewlineRun { len, newlines } => {
                if newlines > 1 {
                    self.paragraphs += 1;
                }
                self.non_blank_lines += 1;
                self.lines += newlines;
                self.whitespaces += len;
            }
            Unit::Whitespace(len) => self.whitespaces += len,
        }
    }

    /// Account for the paragraph and line a document ends in.
    ///
    /// Unterminated content is one more paragraph and line; a single final
    /// newline closes a paragraph the scan has not counted yet; a trailing
    /// blank line has already been counted by its newline run.
    fn finish(&mut self, last: Option<Unit>) {
        match last {
            None => {}
            Some(Unit::NewlineRun { newlines: 1, .. }) => self.paragraphs += 1,
            Some(Unit::NewlineRun { .. }) => {}
            Some(_) => {
                self.paragraphs += 1;
                self.non_blank_lines += 1;
                self.lines += 1;
            }
        }
    }
}

/// Column width of report labels
const LABEL_WIDTH: usize = 32;

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = LABEL_WIDTH;
        writeln!(f, "{:<w$}{}", "Paragraphs:", self.paragraphs)?;
        writeln!(f, "{:<w$}{}", "Non-Blank Lines:", self.non_blank_lines)?;
        writeln!(f, "{:<w$}{}", "Lines:", self.lines)?;
        writeln!(f)?;
        writeln!(f, "{:<w$}{}", "Words:", self.words)?;
        writeln!(f, "{:<w$}{}", "Chinese:", self.cjk)?;
        writeln!(f, "{:<w$}{}", "Hiragana:", self.hiragana)?;
        writeln!(f, "{:<w$}{}", "Katakana:", self.katakana)?;
        writeln!(f, "{:<w$}{}", "Punctuations:", self.punctuations)?;
        writeln!(f, "{:<w$}{}", "Whitespaces:", self.whitespaces)?;
        writeln!(f, "{:<w$}{}", "Other Characters:", self.other_chars)?;
        writeln!(f)?;
        writeln!(f, "{:<w$}{}", "Characters (no spaces):", self.chars_no_spaces())?;
        write!(f, "{:<w$}{}", "Characters (with spaces):", self.chars_with_spaces())
    }
}

/// One classified unit of text, in rule priority order.
///
/// Every unit but the two whitespace forms is a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    /// CJK Unified Ideographs (U+4E00..U+9FFF)
    Cjk,
    /// CJK Extension A and supplementary ideograph blocks
    CjkExtension,
    Hiragana,
    Katakana,
    /// Letters, digits and underscore of any other script
    Word,
    /// Any other non-whitespace character
    Punctuation,
    /// Whitespace up to and including the last `\n` of a whitespace span
    NewlineRun { len: usize, newlines: usize },
    /// Whitespace containing no `\n`
    Whitespace(usize),
}

impl Unit {
    fn len(self) -> usize {
        match self {
            Self::NewlineRun { len, .. } | Self::Whitespace(len) => len,
            _ => 1,
        }
    }
}

fn is_cjk_unified(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

fn is_cjk_extension(c: char) -> bool {
    matches!(
        c,
        '\u{3400}'..='\u{4DBF}'
            | '\u{20000}'..='\u{2A6DF}'
            | '\u{2A700}'..='\u{2EBEF}'
            | '\u{30000}'..='\u{3134F}'
    )
}

fn is_hiragana(c: char) -> bool {
    ('\u{3040}'..='\u{309F}').contains(&c)
}

fn is_katakana(c: char) -> bool {
    ('\u{30A0}'..='\u{30FF}').contains(&c)
}

/// Classify the unit starting at `rest[0]`; `rest` must not be empty.
fn next_unit(rest: &[char]) -> Unit {
    let c = rest[0];

    if is_cjk_unified(c) {
        Unit::Cjk
    } else if is_cjk_extension(c) {
        Unit::CjkExtension
    } else if is_hiragana(c) {
        Unit::Hiragana
    } else if is_katakana(c) {
        Unit::Katakana
    } else if is_word_char(c) {
        Unit::Word
    } else if !is_space(c) {
        Unit::Punctuation
    } else {
        whitespace_unit(rest)
    }
}

/// Split a whitespace span into its newline run, or report it as plain
/// whitespace when it holds no `\n`.
///
/// Trailing whitespace after the last `\n` is left for the next unit, which
/// then sees a span without newlines.
fn whitespace_unit(rest: &[char]) -> Unit {
    let span = rest.iter().take_while(|&&c| is_space(c)).count();

    match rest[..span].iter().rposition(|&c| c == '\n') {
        Some(last_newline) => {
            let run = &rest[..=last_newline];
            Unit::NewlineRun {
                len: run.len(),
                newlines: run.iter().filter(|&&c| c == '\n').count(),
            }
        }
        None => Unit::Whitespace(span),
    }
}

/// Classify every character of a document in one pass.
///
/// Expects `\n` line endings (see [`normalize_newlines`]).
fn tally_text(text: &str) -> Tally {
    let chars: Vec<char> = text.chars().collect();
    let mut tally = Tally::default();
    let mut last = None;
    let mut pos = 0;

    while pos < chars.len() {
        let unit = next_unit(&chars[pos..]);
        tally.record(unit);
        pos += unit.len();
        last = Some(unit);
    }

    tally.finish(last);
    tally
}

// ─────────────────────────────────────────────────────────────────────────────
// Statistics Report
// ─────────────────────────────────────────────────────────────────────────────

/// 40 dashes framed by newlines
fn separator() -> String {
    format!("\n{}\n", "-".repeat(40))
}

#[derive(Debug, Clone)]
struct FileTally {
    name: String,
    path: PathBuf,
    tally: Tally,
}

/// Per-file tallies in path order plus their sum
#[derive(Debug, Default)]
struct Report {
    files: Vec<FileTally>,
    total: Tally,
}

/// Read and classify each file in path-string order; the first failure aborts.
fn collect_statistics(paths: &[PathBuf]) -> Result<Report> {
    let mut ordered: Vec<&PathBuf> = paths.iter().collect();
    ordered.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));

    let mut report = Report::default();
    for path in ordered {
        let text = read_text(path)?;
        let tally = tally_text(&normalize_newlines(&text));
        report.total.merge(&tally);
        report.files.push(FileTally {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.clone(),
            tally,
        });
    }

    Ok(report)
}

fn render_report(report: &Report, verbose: bool) -> String {
    let sep = separator();
    let mut message = format!(
        "STATISTICS{}{:<w$}{}\n\n{}\n",
        sep,
        "Files:",
        report.files.len(),
        report.total,
        w = LABEL_WIDTH
    );

    if verbose && !report.files.is_empty() {
        let details = report
            .files
            .iter()
            .map(|file| format!("File Name: {}\n\n{}", file.name, file.tally))
            .collect::<Vec<_>>()
            .join(&sep);
        message.push_str(&format!("\n\nDETAILS{}{}\n", sep, details));
    }

    message
}

#[derive(Serialize)]
struct JsonReport {
    version: &'static str,
    files: usize,
    total: JsonTally,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<JsonFileTally>,
}

#[derive(Serialize)]
struct JsonFileTally {
    file: String,
    path: String,
    stats: JsonTally,
}

#[derive(Serialize)]
struct JsonTally {
    paragraphs: usize,
    non_blank_lines: usize,
    lines: usize,
    words: usize,
    #[serde(rename = "CJK")]
    cjk: usize,
    #[serde(rename = "Hiragana")]
    hiragana: usize,
    #[serde(rename = "Katakana")]
    katakana: usize,
    punctuations: usize,
    whitespaces: usize,
    other_chars: usize,
    chars_no_spaces: usize,
    chars_with_spaces: usize,
}

impl From<&Tally> for JsonTally {
    fn from(tally: &Tally) -> Self {
        Self {
            paragraphs: tally.paragraphs,
            non_blank_lines: tally.non_blank_lines,
            lines: tally.lines,
            words: tally.words,
            cjk: tally.cjk,
            hiragana: tally.hiragana,
            katakana: tally.katakana,
            punctuations: tally.punctuations,
            whitespaces: tally.whitespaces,
            other_chars: tally.other_chars,
            chars_no_spaces: tally.chars_no_spaces(),
            chars_with_spaces: tally.chars_with_spaces(),
        }
    }
}

fn render_json(report: &Report, verbose: bool) -> Result<String> {
    let details = if verbose {
        report
            .files
            .iter()
            .map(|file| JsonFileTally {
                file: file.name.clone(),
                path: file.path.display().to_string(),
                stats: JsonTally::from(&file.tally),
            })
            .collect()
    } else {
        Vec::new()
    };

    let json = JsonReport {
        version: "1.0",
        files: report.files.len(),
        total: JsonTally::from(&report.total),
        details,
    };

    let mut out = serde_json::to_string_pretty(&json).context("Failed to serialize JSON output")?;
    out.push('\n');
    Ok(out)
}

/// Print the report, or write it to the redirect target
fn write_report(text: &str, redirect: Option<&Redirect>) -> Result<()> {
    match redirect {
        Some(target) => {
            let mut options = OpenOptions::new();
            options.create(true);
            match target.mode {
                RedirectMode::Truncate => options.write(true).truncate(true),
                RedirectMode::Append => options.append(true),
            };
            let mut file = options.open(&target.path).with_context(|| {
                format!("Failed to open report file: {}", target.path.display())
            })?;
            file.write_all(text.as_bytes())
                .with_context(|| format!("Failed to write report: {}", target.path.display()))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn run_stats(global: &GlobalArgs, args: &StatsArgs) -> Result<RunOutcome> {
    // Reject a bad redirect before touching any file
    let redirect = args
        .redirect
        .as_deref()
        .map(Redirect::from_values)
        .transpose()?;
    let config = create_config(global, &args.common)?;

    let files = select_files(&args.common.path, &config)?;
    let report = collect_statistics(&files)?;

    let text = if args.json || config.json {
        render_json(&report, config.verbose)?
    } else {
        render_report(&report, config.verbose)
    };

    write_report(&text, redirect.as_ref())?;

    Ok(RunOutcome::done())
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::INVALID_ARGS,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let exit_code = match run(&cli) {
        Ok(outcome) => {
            if outcome.dry_run && outcome.would_change {
                exit_codes::WOULD_CHANGE
            } else {
                exit_codes::SUCCESS
            }
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            exit_code_for_error(&err)
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<RunOutcome> {
    match &cli.command {
        Commands::Format(args) => run_format(&cli.global, args),
        Commands::Stats(args) => run_stats(&cli.global, args),
        Commands::Config { action } => {
            run_config_command(action, &cli.global)?;
            Ok(RunOutcome::done())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
