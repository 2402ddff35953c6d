//! Criterion benchmarks for mdutils performance testing.
//!
//! These benchmarks measure the mdutils binary by invoking it as a
//! subprocess, so process startup, directory walking, file I/O and the
//! classifier or reformatter are all part of each measurement.
//!
//! Build the release binary first: `cargo build --release`.

use criterion::{criterion_group, criterion_main, Criterion};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const BINARY: &str = "./target/release/mdutils";

const ENGLISH: &str = "The quick brown fox jumps over the lazy dog.  \n\
See [docs](http://example.com) and press [Save].\n\n\n";
const CJK: &str = "他说“你好”吧。ひらがなとカタカナ、漢字を混ぜた文章です。\n\n";

/// Write `files` markdown files of roughly `lines` lines each into nested dirs
fn build_corpus(files: usize, lines: usize) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for i in 0..files {
        let sub = dir.path().join(format!("section{}", i % 8));
        fs::create_dir_all(&sub).expect("Failed to create corpus dir");
        let mut text = String::new();
        for line in 0..lines {
            text.push_str(if line % 3 == 0 { CJK } else { ENGLISH });
        }
        fs::write(sub.join(format!("note{}.md", i)), text).expect("Failed to write corpus file");
    }
    dir
}

fn binary_available() -> bool {
    if Path::new(BINARY).exists() {
        true
    } else {
        eprintln!("Skipping benchmarks: {} not found", BINARY);
        false
    }
}

/// Benchmark stats over a small tree
fn bench_stats_small_tree(c: &mut Criterion) {
    if !binary_available() {
        return;
    }
    let corpus = build_corpus(10, 20);

    c.bench_function("stats_small_tree", |b| {
        b.iter(|| {
            Command::new(BINARY)
                .args(["--no-config", "stats", "-f"])
                .arg(corpus.path())
                .output()
                .expect("Failed to execute mdutils")
        })
    });
}

/// Benchmark stats over a tree of larger mixed-script files
fn bench_stats_large_tree(c: &mut Criterion) {
    if !binary_available() {
        return;
    }
    let corpus = build_corpus(100, 500);

    c.bench_function("stats_large_tree", |b| {
        b.iter(|| {
            Command::new(BINARY)
                .args(["--no-config", "stats", "-v", "-f"])
                .arg(corpus.path())
                .output()
                .expect("Failed to execute mdutils")
        })
    });
}

/// Benchmark the reformatter without touching the files
fn bench_format_dry_run(c: &mut Criterion) {
    if !binary_available() {
        return;
    }
    let corpus = build_corpus(100, 500);

    c.bench_function("format_dry_run", |b| {
        b.iter(|| {
            Command::new(BINARY)
                .args(["--no-config", "format", "--dry-run", "-f"])
                .arg(corpus.path())
                .output()
                .expect("Failed to execute mdutils")
        })
    });
}

criterion_group!(
    benches,
    bench_stats_small_tree,
    bench_stats_large_tree,
    bench_format_dry_run
);
criterion_main!(benches);
