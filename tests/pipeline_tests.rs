//! End-to-end pipeline tests
//!
//! Drive `Pipeline::run` against temp project directories with stand-in
//! compilers, and check the three things a submitter can observe: the exit
//! code, the status artifact and whether a binary exists.

#![cfg(unix)]

mod fixtures;

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use fixtures::*;
use rv_build_lane::summary::BuildSummary;
use rv_build_lane::{
    CancellationToken, FailureKind, IsolationKind, LaneConfig, Method, Pipeline, PipelineError,
    SanitizeMode, Status, StripPolicy,
};

fn config_with_compiler(compiler: &Path) -> LaneConfig {
    let mut config = LaneConfig::default();
    config.profiles.bare_metal.compiler = compiler.display().to_string();
    config.profiles.linux.compiler = compiler.display().to_string();
    config
}

fn fake_pipeline(project: &TestProject) -> (Pipeline, LaneConfig) {
    let gxx = project.install_tool("riscv32-g++", FAKE_GXX);
    let config = config_with_compiler(&gxx);
    (Pipeline::new(config.clone()), config)
}

// =============================================================================
// Rejection
// =============================================================================

#[test]
fn test_rejected_source_never_reaches_toolchain() {
    let project = TestProject::new(ESCAPING_SOURCE);
    fs::write(project.file("binary"), b"stale").unwrap();
    let (pipeline, _) = fake_pipeline(&project);

    let outcome = pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();

    assert_eq!(outcome.exit_code, 666);
    assert_eq!(outcome.status, Status::Rejected);
    assert_eq!(outcome.failure_kind, Some(FailureKind::ValidationRejection));
    assert_eq!(project.read("status.txt"), "Invalid characters in statement");
    assert!(!project.file("argv.txt").exists(), "toolchain must not run");
    assert!(!project.file("binary").exists());
    // The rejected source is left as submitted
    assert_eq!(project.read("code.cpp"), ESCAPING_SOURCE);
}

#[test]
fn test_rejection_is_reproducible() {
    let project = TestProject::new("int x;\n#include \"/etc/shadow\"\n");
    let (pipeline, _) = fake_pipeline(&project);

    let first = pipeline.run(project.base(), project.dir, Method::Linux).unwrap();
    let status_a = fs::read(project.file("status.txt")).unwrap();
    let second = pipeline.run(project.base(), project.dir, Method::Linux).unwrap();
    let status_b = fs::read(project.file("status.txt")).unwrap();

    assert_eq!(first.exit_code, second.exit_code);
    assert_eq!(status_a, status_b);
    assert_eq!(first.rejection.unwrap().line, 2);
}

#[test]
fn test_non_utf8_source_rejected() {
    let project = TestProject::new("");
    fs::write(project.file("code.cpp"), [0x69, 0x6e, 0x74, 0xff, 0xfe, 0x0a]).unwrap();
    let (pipeline, _) = fake_pipeline(&project);

    let outcome = pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();
    assert_eq!(outcome.exit_code, 666);
    assert!(!project.file("argv.txt").exists());
}

// =============================================================================
// Successful and failing builds
// =============================================================================

#[test]
fn test_valid_program_builds() {
    let project = TestProject::new(VALID_SOURCE);
    let (pipeline, _) = fake_pipeline(&project);

    let outcome = pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();

    assert!(outcome.success());
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.toolchain_exit_code, Some(0));
    assert_eq!(project.read("status.txt"), "");
    assert_eq!(outcome.binary, Some(project.file("binary")));
    assert!(project.file("binary").exists());
}

#[test]
fn test_stdout_never_reaches_status() {
    let project = TestProject::new(VALID_SOURCE);
    let (pipeline, _) = fake_pipeline(&project);

    pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();
    assert!(!project.read("status.txt").contains("compiled ok"));
}

#[test]
fn test_rewrite_keeps_source_byte_identical() {
    let source = "#include <vector>\r\nint main() { return 0; }";
    let project = TestProject::new(source);
    let (pipeline, _) = fake_pipeline(&project);

    pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();
    assert_eq!(fs::read(project.file("code.cpp")).unwrap(), source.as_bytes());
}

#[test]
fn test_pass_through_leaves_source_untouched() {
    let project = TestProject::new(VALID_SOURCE);
    let gxx = project.install_tool("riscv32-g++", FAKE_GXX);
    let mut config = config_with_compiler(&gxx);
    config.sanitizer.mode = SanitizeMode::PassThrough;

    let before = fs::metadata(project.file("code.cpp")).unwrap().modified().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let outcome = Pipeline::new(config)
        .run(project.base(), project.dir, Method::BareMetal)
        .unwrap();
    let after = fs::metadata(project.file("code.cpp")).unwrap().modified().unwrap();

    assert!(outcome.success());
    assert_eq!(before, after);
    assert_eq!(project.read("code.cpp"), VALID_SOURCE);
}

#[test]
fn test_syntax_error_passes_code_through() {
    let project = TestProject::new(SYNTAX_ERROR_SOURCE);
    fs::write(project.file("binary"), b"from an earlier run").unwrap();
    let (pipeline, _) = fake_pipeline(&project);

    let outcome = pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();

    assert_eq!(outcome.exit_code, 1);
    assert_eq!(outcome.status, Status::Failed);
    assert_eq!(outcome.failure_kind, Some(FailureKind::ToolchainFailure));
    assert!(project
        .read("status.txt")
        .contains("error: expected ';' before '}' token"));
    assert!(!project.file("binary").exists());
    assert!(outcome.binary.is_none());
}

#[test]
fn test_stale_binary_kept_when_configured() {
    let project = TestProject::new(SYNTAX_ERROR_SOURCE);
    fs::write(project.file("binary"), b"from an earlier run").unwrap();
    let gxx = project.install_tool("riscv32-g++", FAKE_GXX);
    let mut config = config_with_compiler(&gxx);
    config.artifacts.remove_stale_binary = false;

    Pipeline::new(config)
        .run(project.base(), project.dir, Method::BareMetal)
        .unwrap();
    assert!(project.file("binary").exists());
}

#[test]
fn test_status_overwritten_each_run() {
    let project = TestProject::new(SYNTAX_ERROR_SOURCE);
    let (pipeline, _) = fake_pipeline(&project);

    pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();
    assert!(!project.read("status.txt").is_empty());

    fs::write(project.file("code.cpp"), VALID_SOURCE).unwrap();
    pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();
    assert_eq!(project.read("status.txt"), "");
}

#[test]
fn test_crashing_compiler_maps_signal() {
    let project = TestProject::new(VALID_SOURCE);
    let gxx = project.install_tool("riscv32-g++", CRASHING_GXX);

    let outcome = Pipeline::new(config_with_compiler(&gxx))
        .run(project.base(), project.dir, Method::BareMetal)
        .unwrap();

    assert_eq!(outcome.exit_code, 128 + 11);
    assert_eq!(outcome.toolchain_exit_code, None);
    assert!(project.read("status.txt").contains("internal compiler error"));
}

// =============================================================================
// Profiles and strip policy
// =============================================================================

#[test]
fn test_linux_method_adds_threads_flag() {
    let project = TestProject::new(VALID_SOURCE);
    let (pipeline, _) = fake_pipeline(&project);

    pipeline.run(project.base(), project.dir, Method::Linux).unwrap();
    let argv = project.read("argv.txt");
    assert!(argv.lines().any(|a| a == "-pthread"));
    assert!(argv.lines().any(|a| a == "-mabi=ilp32d"));

    pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();
    let argv = project.read("argv.txt");
    assert!(!argv.lines().any(|a| a == "-pthread"));
    assert!(argv.lines().any(|a| a == "-mabi=ilp32"));
}

#[test]
fn test_unrecognized_method_is_bare_metal() {
    let project = TestProject::new(VALID_SOURCE);
    let gxx = project.install_tool("riscv32-g++", FAKE_GXX);
    let mut config = config_with_compiler(&gxx);
    config.profiles.linux.compiler = "/nonexistent/linux-g++".to_string();

    let outcome = Pipeline::new(config)
        .run(
            project.base(),
            project.dir,
            Method::from_discriminant(Some("riscv-os")),
        )
        .unwrap();
    assert!(outcome.success());
}

#[test]
fn test_retain_mode_writes_manifest_and_link_flag() {
    let project = TestProject::new(VALID_SOURCE);
    let gxx = project.install_tool("riscv32-g++", FAKE_GXX);
    let mut config = config_with_compiler(&gxx);
    config.profiles.bare_metal.strip = StripPolicy::RetainListed;

    let outcome = Pipeline::new(config)
        .run(project.base(), project.dir, Method::BareMetal)
        .unwrap();

    assert!(outcome.success());
    assert_eq!(project.read("symbols.txt"), "main\n");
    let argv = project.read("argv.txt");
    let manifest = project.file("symbols.txt");
    assert!(argv
        .lines()
        .any(|a| a == format!("-Wl,--retain-symbols-file={}", manifest.display())));
    assert!(!argv.lines().any(|a| a == "-Wl,-s"));
}

#[test]
fn test_force_undefined_quirk() {
    let project = TestProject::new(VALID_SOURCE);
    let gxx = project.install_tool("riscv32-g++", FAKE_GXX);
    let mut config = config_with_compiler(&gxx);
    config.profiles.linux.quirks.force_undefined = vec!["pthread_exit".to_string()];

    Pipeline::new(config)
        .run(project.base(), project.dir, Method::Linux)
        .unwrap();
    assert!(project
        .read("argv.txt")
        .lines()
        .any(|a| a == "-Wl,--undefined=pthread_exit"));
}

// =============================================================================
// Timeout, cancellation, environment failures
// =============================================================================

#[test]
fn test_timeout_kills_toolchain() {
    let project = TestProject::new(VALID_SOURCE);
    let gxx = project.install_tool("riscv32-g++", HANGING_GXX);
    let mut config = config_with_compiler(&gxx);
    config.timeout.overall_seconds = 1;
    config.timeout.grace_seconds = 0;

    let start = Instant::now();
    let outcome = Pipeline::new(config)
        .run(project.base(), project.dir, Method::BareMetal)
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(15));
    assert_eq!(outcome.exit_code, 667);
    assert_eq!(outcome.failure_kind, Some(FailureKind::ToolchainTimeout));
    assert_eq!(
        project.read("status.txt"),
        "Compilation timed out after 1 seconds"
    );
    assert!(!project.file("binary").exists());
}

#[test]
fn test_cancellation_kills_toolchain() {
    let project = TestProject::new(VALID_SOURCE);
    let gxx = project.install_tool("riscv32-g++", HANGING_GXX);
    let token = CancellationToken::new();
    let pipeline = Pipeline::new(config_with_compiler(&gxx)).with_cancellation(token.clone());

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        token.cancel();
    });
    let start = Instant::now();
    let outcome = pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();
    canceller.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(15));
    assert_eq!(outcome.exit_code, 669);
    assert_eq!(outcome.status, Status::Cancelled);
    assert_eq!(project.read("status.txt"), "Compilation cancelled");
}

#[test]
fn test_unreachable_compiler_is_environment_failure() {
    let project = TestProject::new(VALID_SOURCE);
    let missing = project.base().join("tools/riscv32-unknown-elf-g++");
    let pipeline = Pipeline::new(config_with_compiler(&missing));

    let err = pipeline
        .run(project.base(), project.dir, Method::BareMetal)
        .unwrap_err();

    assert_eq!(err.exit_code(), 668);
    let status = project.read("status.txt");
    assert_eq!(status, "Build environment unavailable");
    assert!(!status.contains(&project.base().display().to_string()));
    assert!(!status.contains("binary"));
}

#[test]
fn test_unreachable_runtime_is_environment_failure() {
    let project = TestProject::new(VALID_SOURCE);
    let runtime = project.install_tool("docker", UNREACHABLE_RUNTIME);
    let mut config = LaneConfig::default();
    config.isolation.mode = IsolationKind::Container;
    config.isolation.runtime = runtime.display().to_string();

    let err = Pipeline::new(config)
        .run(project.base(), project.dir, Method::Linux)
        .unwrap_err();

    assert!(matches!(err, PipelineError::RuntimeUnavailable { code: 125 }));
    assert_eq!(err.exit_code(), 668);
    let status = project.read("status.txt");
    assert_eq!(status, "Build environment unavailable");
    assert!(!status.contains("/mnt"));
    assert!(!status.contains("docker.sock"));
}

#[test]
fn test_relative_project_base_resolved() {
    let cwd = std::env::current_dir().unwrap();
    let temp = tempfile::TempDir::new_in(&cwd).unwrap();
    let relative = temp.path().strip_prefix(&cwd).unwrap().to_path_buf();
    assert!(relative.is_relative());

    let dir = temp.path().join("u1/p1");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("code.cpp"), VALID_SOURCE).unwrap();
    let gxx = temp.path().join("riscv32-g++");
    install_script(&gxx, FAKE_GXX);

    let outcome = Pipeline::new(config_with_compiler(&gxx))
        .run(relative, "u1/p1", Method::BareMetal)
        .unwrap();

    assert!(outcome.success());
    assert_eq!(fs::read_to_string(dir.join("status.txt")).unwrap(), "");
    assert!(dir.join("binary").exists());
    let source = dir.join("code.cpp").display().to_string();
    let argv = fs::read_to_string(dir.join("argv.txt")).unwrap();
    assert!(argv.lines().any(|a| a == source));
}

#[test]
fn test_toolchain_helper_cannot_outlive_deadline() {
    let project = TestProject::new(VALID_SOURCE);
    let gxx = project.install_tool("riscv32-g++", LINGERING_HELPER_GXX);
    let mut config = config_with_compiler(&gxx);
    config.timeout.overall_seconds = 1;
    config.timeout.grace_seconds = 0;

    let start = Instant::now();
    let outcome = Pipeline::new(config)
        .run(project.base(), project.dir, Method::BareMetal)
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(4));
    assert_eq!(outcome.toolchain_exit_code, Some(0));
}

#[test]
fn test_missing_project_dir_is_environment_failure() {
    let project = TestProject::new(VALID_SOURCE);
    let (pipeline, _) = fake_pipeline(&project);

    let err = pipeline
        .run(project.base(), "u1/never-provisioned", Method::BareMetal)
        .unwrap_err();
    assert_eq!(err.exit_code(), 668);
    assert!(!project.base().join("u1/never-provisioned").exists());
}

#[test]
fn test_escaping_project_dir_refused() {
    let project = TestProject::new(VALID_SOURCE);
    let (pipeline, _) = fake_pipeline(&project);

    for dir in ["../outside", "/etc", "u1/../../x"] {
        let err = pipeline
            .run(project.path(), dir, Method::BareMetal)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Artifacts(_)), "{dir}");
    }
}

// =============================================================================
// Summary
// =============================================================================

#[test]
fn test_summary_written_when_enabled() {
    let project = TestProject::new(SYNTAX_ERROR_SOURCE);
    let gxx = project.install_tool("riscv32-g++", FAKE_GXX);
    let mut config = config_with_compiler(&gxx);
    config.report.write_summary = true;

    Pipeline::new(config)
        .run(project.base(), project.dir, Method::Linux)
        .unwrap();

    let summary = BuildSummary::from_json(&project.read("summary.json")).unwrap();
    assert_eq!(summary.schema_id, "rv-build/summary@1");
    assert_eq!(summary.status, Status::Failed);
    assert_eq!(summary.failure_kind, Some(FailureKind::ToolchainFailure));
    assert_eq!(summary.exit_code, 1);
    assert_eq!(summary.method, Method::Linux);
    assert!(summary.source_sha256.is_some());

    let raw = project.read("summary.json");
    assert!(!raw.contains("expected ';'"));
    assert!(!raw.contains(&project.base().display().to_string()));
}

#[test]
fn test_summary_off_by_default() {
    let project = TestProject::new(VALID_SOURCE);
    let (pipeline, config) = fake_pipeline(&project);
    assert!(!config.report.write_summary);

    pipeline.run(project.base(), project.dir, Method::BareMetal).unwrap();
    assert!(!project.file("summary.json").exists());
}
