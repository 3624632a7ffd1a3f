//! End-to-end: the release `libmemprof_abi.so` interposing the heap of real
//! C processes.
//!
//! Builds the cdylib with `--release` into a private target directory (the
//! heap symbols only exist without debug assertions), compiles a small C
//! driver against it with `cc`, and inspects the driver's stdout/stderr.
//! Tests needing the driver are skipped when no C compiler is available.
//!
//! Run: cargo test -p memprof-abi --test preload_e2e_test
#![cfg(target_os = "linux")]

use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::OnceLock;

const DRIVER_SOURCE: &str = r#"
#include <pthread.h>
#include <stdio.h>
#include <stdlib.h>
#include <string.h>

#include "memprof.h"

static void *churn(void *arg) {
	size_t seed = (size_t)arg;
	for (size_t round = 0; round < 500; round++) {
		size_t size = 1 + (seed * 31 + round) % 64;
		void *single = malloc(size);
		void *array = calloc(size, 2);
		free(array);
		free(single);
	}
	return NULL;
}

static void report(const MemprofUsageSnapshot *snap, int rc) {
	printf("alloc=%zu freed=%zu cur=%zu live=%zu overflowed=%d rc=%d\n",
	       snap->total_allocated, snap->total_freed, snap->currently_allocated,
	       snap->live_allocations, (int)snap->overflowed, rc);
}

static int scenario(void) {
	MemprofUsageSnapshot snap;
	enableMemoryLogging(true);
	char *first = malloc(40);
	char *second = calloc(5, 20);
	first = realloc(first, 80);
	free(first);
	free(second);
	free(NULL);
	void *zero = realloc(NULL, 0);
	printMemoryUsage();
	int rc = memprofUsageSnapshot(&snap);
	enableMemoryLogging(false);
	report(&snap, rc);
	printf("zero=%s null_rc=%d\n", zero == NULL ? "null" : "non-null",
	       memprofUsageSnapshot(NULL));
	return 0;
}

static int threads(void) {
	MemprofUsageSnapshot snap;
	pthread_t workers[4];
	enableMemoryLogging(true);
	for (size_t t = 0; t < 4; t++) {
		if (pthread_create(&workers[t], NULL, churn, (void *)t) != 0) {
			return 3;
		}
	}
	for (size_t t = 0; t < 4; t++) {
		pthread_join(workers[t], NULL);
	}
	int rc = memprofUsageSnapshot(&snap);
	enableMemoryLogging(false);
	report(&snap, rc);
	return 0;
}

int main(int argc, char **argv) {
	if (argc > 1 && strcmp(argv[1], "threads") == 0) {
		return threads();
	}
	return scenario();
}
"#;

struct PreloadFixture {
    library: PathBuf,
    driver: Option<PathBuf>,
}

fn workspace_root() -> PathBuf {
    let manifest = env!("CARGO_MANIFEST_DIR");
    Path::new(manifest)
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf()
}

fn fixture() -> &'static PreloadFixture {
    static FIXTURE: OnceLock<PreloadFixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let work_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("memprof-preload");
        let target_dir = work_dir.join("target");
        let cargo = std::env::var_os("CARGO").unwrap_or_else(|| "cargo".into());
        let output = Command::new(cargo)
            .current_dir(workspace_root())
            .args(["build", "--release", "-p", "memprof-abi", "--lib", "--target-dir"])
            .arg(&target_dir)
            .output()
            .expect("cargo should execute");
        assert!(
            output.status.success(),
            "release build of memprof-abi failed, stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let lib_dir = target_dir.join("release");
        let library = lib_dir.join("libmemprof_abi.so");
        assert!(library.exists(), "{} should exist", library.display());

        let source = work_dir.join("driver.c");
        std::fs::write(&source, DRIVER_SOURCE).unwrap();
        let driver = work_dir.join("driver");
        let cc = std::env::var_os("CC").unwrap_or_else(|| "cc".into());
        let compiled = Command::new(cc)
            .args(["-O0", "-fno-builtin", "-pthread", "-I"])
            .arg(Path::new(env!("CARGO_MANIFEST_DIR")).join("include"))
            .arg(&source)
            .arg("-o")
            .arg(&driver)
            .arg("-L")
            .arg(&lib_dir)
            .arg("-lmemprof_abi")
            .arg(format!("-Wl,-rpath,{}", lib_dir.display()))
            .output();
        let driver = match compiled {
            Ok(out) => {
                assert!(
                    out.status.success(),
                    "driver should compile, stderr: {}",
                    String::from_utf8_lossy(&out.stderr)
                );
                Some(driver)
            }
            // No C compiler on this machine.
            Err(_) => None,
        };
        PreloadFixture { library, driver }
    })
}

fn run_driver(mode: Option<&str>) -> Option<Output> {
    let driver = fixture().driver.as_ref()?;
    let mut command = Command::new(driver);
    // cargo test puts target/debug/deps (holding the debug cdylib, which has
    // no heap symbols) on LD_LIBRARY_PATH, which outranks the driver's RUNPATH.
    command.env_remove("LD_LIBRARY_PATH");
    if let Some(mode) = mode {
        command.arg(mode);
    }
    Some(command.output().expect("driver should execute"))
}

/// `key=value` fields of the driver's stdout.
fn field(stdout: &str, key: &str) -> String {
    stdout
        .split_whitespace()
        .find_map(|pair| pair.strip_prefix(key)?.strip_prefix('='))
        .unwrap_or_else(|| panic!("missing {key} in {stdout:?}"))
        .to_string()
}

#[test]
fn scenario_balances_and_reports_each_event() {
    let Some(output) = run_driver(None) else {
        eprintln!("skipping: no C compiler available");
        return;
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "driver failed, stderr: {stderr}");

    assert_eq!(field(&stdout, "alloc"), "220");
    assert_eq!(field(&stdout, "freed"), "220");
    assert_eq!(field(&stdout, "cur"), "0");
    assert_eq!(field(&stdout, "live"), "0");
    assert_eq!(field(&stdout, "overflowed"), "0");
    assert_eq!(field(&stdout, "rc"), "0");
    assert_eq!(field(&stdout, "null_rc"), "-1");
    assert_eq!(field(&stdout, "zero"), "null");

    let lines: Vec<&str> = stderr.lines().collect();
    let expected_prefixes = [
        "[memprof malloc] Allocated 40 bytes at 0x",
        "[memprof calloc] Allocated 100 bytes (array of 5 elements) at 0x",
        "[memprof realloc] Reallocated 80 bytes from 0x",
        "[memprof free] Freed 80 bytes at 0x",
        "[memprof free] Freed 100 bytes at 0x",
        "[memprof free] Freed (nil), nothing to do",
        "[memprof realloc] Reallocated 0 bytes from (nil), nothing to do",
    ];
    let events: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|line| line.starts_with("[memprof "))
        .collect();
    assert_eq!(events.len(), expected_prefixes.len(), "events: {events:#?}");
    for (line, prefix) in events.iter().zip(expected_prefixes) {
        assert!(line.starts_with(prefix), "{line:?} should start with {prefix:?}");
    }
    assert!(!stderr.contains("WARNING"), "stderr: {stderr}");

    assert!(lines.contains(&"**** Total allocated: 220 bytes"));
    assert!(lines.contains(&"**** Total freed: 220 bytes"));
    assert!(lines.contains(&"**** Currently allocated: 0 bytes"));
    assert!(!stderr.contains("IMPORTANT"));
}

#[test]
fn threaded_churn_keeps_lines_whole() {
    let Some(output) = run_driver(Some("threads")) else {
        eprintln!("skipping: no C compiler available");
        return;
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "driver failed, stderr: {stderr}");

    // Thread creation may allocate on its own while logging is on, so the
    // churn is a lower bound.
    let churned: usize = (0..4usize)
        .flat_map(|seed| (0..500usize).map(move |round| 1 + (seed * 31 + round) % 64))
        .map(|size| size * 3)
        .sum();
    let allocated: usize = field(&stdout, "alloc").parse().unwrap();
    let freed: usize = field(&stdout, "freed").parse().unwrap();
    assert!(allocated >= churned, "{allocated} < {churned}");
    assert!(freed >= churned, "{freed} < {churned}");
    assert_eq!(field(&stdout, "overflowed"), "0");

    let events = stderr.lines().filter(|line| line.starts_with("[memprof ")).count();
    assert!(events >= 4 * 500 * 4, "only {events} event lines");
    for line in stderr.lines() {
        assert!(
            line.starts_with("[memprof ") && line.matches("[memprof ").count() == 1,
            "torn or foreign line: {line:?}"
        );
    }
}

#[test]
fn release_library_exports_heap_and_control_symbols() {
    let library = &fixture().library;
    let path = CString::new(library.to_str().unwrap()).unwrap();
    let handle = unsafe { libc::dlopen(path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
    assert!(!handle.is_null(), "dlopen {} failed", library.display());

    for name in [
        c"malloc",
        c"calloc",
        c"realloc",
        c"free",
        c"enableMemoryLogging",
        c"printMemoryUsage",
        c"printTrackedAllocations",
        c"profilerReset",
        c"memprofUsageSnapshot",
    ] {
        let sym = unsafe { libc::dlsym(handle, name.as_ptr()) };
        assert!(!sym.is_null(), "{name:?} should be exported");

        // The lookup also walks the library's dependencies; make sure the
        // definition found is ours and not libc's.
        let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
        assert_ne!(unsafe { libc::dladdr(sym, &mut info) }, 0);
        let owner = unsafe { CStr::from_ptr(info.dli_fname) }.to_string_lossy();
        assert!(
            owner.ends_with("libmemprof_abi.so"),
            "{name:?} resolved into {owner}"
        );
    }
}

#[test]
fn preloading_into_a_shell_is_transparent() {
    let library = &fixture().library;
    let output = Command::new("sh")
        .args(["-c", "echo preloaded"])
        .env("LD_PRELOAD", library)
        .output()
        .expect("sh should execute");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "preloaded\n");
    // Logging starts disabled.
    assert!(!stderr.contains("[memprof"), "stderr: {stderr}");
}
