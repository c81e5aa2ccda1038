//! Test runner for war-launcher
//!
//! This test runner validates the launcher end to end by:
//! 1. Building self-executing archives: the launcher binary with a WAR appended
//! 2. Installing a fake `java` into a throwaway JAVA_HOME
//! 3. Running the archives and checking what the fake runtime was handed
//!
//! Usage: test-runner --launcher <path> --fake-java <path> [--work-dir <dir>]

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode, Stdio};
use url::Url;
use war_launcher::manifest::{EXTRA_PARAMETERS_ATTRIBUTE, RUNTIME_JAR_ATTRIBUTE};
use war_launcher::testing::{runtime_jar, ArchiveBuilder};

/// Executable extension
#[cfg(windows)]
const EXE_EXT: &str = ".exe";
#[cfg(not(windows))]
const EXE_EXT: &str = "";

const RUNTIME_JAR: &str = "winstone-lite-0.9.10.jar";
const REPORT_PREFIX: &str = "FAKE_JAVA:";

/// Test configuration
struct TestConfig {
    /// Path to the war-launcher binary
    launcher_path: PathBuf,
    /// Path to the fake-java binary
    fake_java_path: PathBuf,
    /// Working directory for test artifacts
    work_dir: PathBuf,
}

/// A self-executing archive plus the directories it runs against
struct WarSetup {
    war_path: PathBuf,
    home_dir: PathBuf,
    tmp_dir: PathBuf,
    java_home: PathBuf,
}

/// Outcome of one launcher run
struct RunOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl TestConfig {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();

        let mut launcher_path = None;
        let mut fake_java_path = None;
        let mut work_dir = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--launcher" | "--fake-java" | "--work-dir" if i + 1 >= args.len() => {
                    return Err(format!("{} needs a value", args[i]));
                }
                "--launcher" => {
                    i += 1;
                    launcher_path = Some(PathBuf::from(&args[i]));
                }
                "--fake-java" => {
                    i += 1;
                    fake_java_path = Some(PathBuf::from(&args[i]));
                }
                "--work-dir" => {
                    i += 1;
                    work_dir = Some(PathBuf::from(&args[i]));
                }
                "--help" | "-h" => {
                    println!("Usage: test-runner --launcher <path> --fake-java <path> [--work-dir <dir>]");
                    println!();
                    println!("Options:");
                    println!("  --launcher   Path to the war-launcher binary");
                    println!("  --fake-java  Path to the fake-java binary");
                    println!("  --work-dir   Working directory for test artifacts (default: temp dir)");
                    std::process::exit(0);
                }
                _ => {
                    return Err(format!("Unknown argument: {}", args[i]));
                }
            }
            i += 1;
        }

        let launcher_path = launcher_path.ok_or("--launcher is required")?;
        let fake_java_path = fake_java_path.ok_or("--fake-java is required")?;
        let work_dir = work_dir.unwrap_or_else(|| env::temp_dir().join("war-launcher-tests"));

        if !launcher_path.exists() {
            return Err(format!("Launcher not found: {}", launcher_path.display()));
        }
        if !fake_java_path.exists() {
            return Err(format!("Fake java not found: {}", fake_java_path.display()));
        }

        Ok(Self {
            launcher_path,
            fake_java_path,
            work_dir,
        })
    }
}

fn make_executable(path: &Path) -> Result<(), String> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)
            .map_err(|e| format!("Failed to get permissions: {}", e))?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).map_err(|e| format!("Failed to set permissions: {}", e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

impl WarSetup {
    /// Lays out `<work>/<name>/` with the archive, a home, a temp dir and a JAVA_HOME
    fn new(config: &TestConfig, name: &str, war: ArchiveBuilder) -> Result<Self, String> {
        let test_dir = config.work_dir.join(name);
        let home_dir = test_dir.join("home");
        let tmp_dir = test_dir.join("tmp");
        let java_home = test_dir.join("jdk");
        for dir in [&home_dir, &tmp_dir, &java_home.join("bin")] {
            fs::create_dir_all(dir).map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
        }

        let java = java_home.join("bin").join(format!("java{}", EXE_EXT));
        fs::copy(&config.fake_java_path, &java).map_err(|e| format!("Failed to install fake java: {}", e))?;
        make_executable(&java)?;

        let launcher = fs::read(&config.launcher_path).map_err(|e| format!("Failed to read launcher: {}", e))?;
        let war_path = test_dir.join(format!("{}.war{}", name, EXE_EXT));
        war.prefix(launcher)
            .write_to(&war_path)
            .map_err(|e| format!("Failed to write archive: {}", e))?;
        make_executable(&war_path)?;

        Ok(Self {
            war_path,
            home_dir,
            tmp_dir,
            java_home,
        })
    }

    fn command(&self, program: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .env("JAVA_HOME", &self.java_home)
            .env("WAR_LAUNCHER_HOME", &self.home_dir)
            .env("TMPDIR", &self.tmp_dir)
            .env("TMP", &self.tmp_dir)
            .env("TEMP", &self.tmp_dir)
            .env_remove("WAR_LAUNCHER_JAVA")
            .env_remove("WAR_LAUNCHER_JAVA_OPTS")
            .env_remove("WAR_LAUNCHER_ARCHIVE")
            .env_remove("FAKE_JAVA_EXIT_CODE")
            .env_remove("FAKE_JAVA_SLEEP_MS");
        cmd
    }

    fn run(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<RunOutput, String> {
        let mut cmd = self.command(&self.war_path, args);
        cmd.envs(envs.iter().copied());
        capture(cmd)
    }

    fn leftover_temp_files(&self) -> Result<Vec<PathBuf>, String> {
        let entries = fs::read_dir(&self.tmp_dir).map_err(|e| format!("Failed to list temp dir: {}", e))?;
        Ok(entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
    }

    fn canonical_war(&self) -> Result<PathBuf, String> {
        fs::canonicalize(&self.war_path).map_err(|e| format!("Failed to canonicalize archive: {}", e))
    }
}

fn capture(mut cmd: Command) -> Result<RunOutput, String> {
    let output = cmd.output().map_err(|e| format!("Failed to run launcher: {}", e))?;
    Ok(RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

impl RunOutput {
    /// The invocation reported by the fake runtime, if it ran
    fn report(&self) -> Option<Value> {
        self.stdout
            .lines()
            .find_map(|line| line.strip_prefix(REPORT_PREFIX))
            .and_then(|json| serde_json::from_str(json).ok())
    }

    fn expect_report(&self) -> Result<Value, String> {
        if self.exit_code != 0 {
            return Err(format!("Launcher failed with exit code {}: {}", self.exit_code, self.stderr));
        }
        self.report()
            .ok_or_else(|| format!("Runtime was not started. stdout: {} stderr: {}", self.stdout, self.stderr))
    }

    fn expect_failure(&self, message: &str) -> Result<(), String> {
        if self.exit_code != 1 {
            return Err(format!("Expected exit code 1, got {}: {}", self.exit_code, self.stderr));
        }
        if self.report().is_some() {
            return Err(format!("Runtime should not have started: {}", self.stdout));
        }
        if !self.stderr.contains(message) {
            return Err(format!("Expected '{}' in stderr, got: {}", message, self.stderr));
        }
        Ok(())
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn war_with_runtime(extra_parameters: Option<&str>) -> Result<ArchiveBuilder, String> {
    let jar = runtime_jar().map_err(|e| format!("Failed to build runtime jar: {}", e))?;
    let mut attributes = vec![(RUNTIME_JAR_ATTRIBUTE, RUNTIME_JAR)];
    if let Some(extra) = extra_parameters {
        attributes.push((EXTRA_PARAMETERS_ATTRIBUTE, extra));
    }
    Ok(ArchiveBuilder::new()
        .manifest(&attributes)
        .deflated("index.html", b"<html>hello</html>".to_vec())
        .deflated("WEB-INF/web.xml", b"<web-app/>".to_vec())
        .stored(&format!("WEB-INF/lib/{}", RUNTIME_JAR), jar))
}

/// Test: the runtime receives the composed argument vector
fn test_argument_vector(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: argument_vector");

    let setup = WarSetup::new(config, "argument_vector", war_with_runtime(Some("--useJNDI=false  --ajp13Port=-1"))?)?;
    let output = setup.run(
        &["--httpPort=9090", "--debug=5"],
        &[("WAR_LAUNCHER_JAVA_OPTS", "-Xmx64m -Dfile.encoding=UTF-8")],
    )?;
    let report = output.expect_report()?;

    let war = setup.canonical_war()?;
    let war_name = war.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let web_root = setup.home_dir.join(format!(".webroot-{}", war_name));
    let expected = vec![
        format!("--warfile={}", war.display()),
        "--httpPort=9090".to_string(),
        "--debug=5".to_string(),
        format!("--webroot={}", web_root.display()),
        "--useJNDI=false".to_string(),
        "--ajp13Port=-1".to_string(),
    ];

    let arguments = string_list(&report["arguments"]);
    if arguments != expected {
        return Err(format!("Unexpected arguments: {:?}. Expected {:?}", arguments, expected));
    }
    if report["main_class"] != "winstone.Launcher" {
        return Err(format!("Unexpected main class: {}", report["main_class"]));
    }
    let jvm_options = string_list(&report["jvm_options"]);
    if jvm_options != ["-Xmx64m", "-Dfile.encoding=UTF-8"] {
        return Err(format!("Unexpected JVM options: {:?}", jvm_options));
    }

    let deploying = format!("deploying: {}:", war_name);
    let banner = format!("arguments: {} ", expected.join(" "));
    let mut lines = output.stdout.lines();
    if lines.next() != Some(deploying.as_str()) || lines.next() != Some(banner.as_str()) {
        return Err(format!("Unexpected banner: {}", output.stdout));
    }

    println!("    PASS");
    Ok(())
}

/// Test: the jar on the class path is the embedded runtime, and it is gone afterwards
fn test_extracted_runtime(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: extracted_runtime");

    let setup = WarSetup::new(config, "extracted_runtime", war_with_runtime(None)?)?;
    let report = setup.run(&[], &[])?.expect_report()?;

    let jar = runtime_jar().map_err(|e| format!("Failed to build runtime jar: {}", e))?;
    let expected = format!("{:x}", Sha256::digest(&jar));
    if report["classpath_sha256"] != expected.as_str() {
        return Err(format!(
            "Extracted runtime differs: {} != {}",
            report["classpath_sha256"], expected
        ));
    }

    let classpath = PathBuf::from(report["classpath"].as_str().unwrap_or_default());
    let file_name = classpath.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    if !file_name.starts_with("winstone") || !file_name.ends_with("jar") {
        return Err(format!("Unexpected temp file name: {}", file_name));
    }
    if classpath.exists() {
        return Err(format!("Temp runtime still exists: {}", classpath.display()));
    }
    let leftovers = setup.leftover_temp_files()?;
    if !leftovers.is_empty() {
        return Err(format!("Temp dir not cleaned up: {:?}", leftovers));
    }

    println!("    PASS");
    Ok(())
}

/// Test: the runtime's exit code becomes the launcher's
fn test_exit_code_forwarded(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: exit_code_forwarded");

    let setup = WarSetup::new(config, "exit_code_forwarded", war_with_runtime(None)?)?;
    let output = setup.run(&[], &[("FAKE_JAVA_EXIT_CODE", "7")])?;

    if output.exit_code != 7 {
        return Err(format!("Expected exit code 7, got {}: {}", output.exit_code, output.stderr));
    }
    if output.report().is_none() {
        return Err(format!("Runtime was not started: {}", output.stdout));
    }
    if !setup.leftover_temp_files()?.is_empty() {
        return Err("Temp dir not cleaned up after non-zero exit".to_string());
    }

    println!("    PASS");
    Ok(())
}

/// Test: configuration errors stop the launch before anything is extracted
fn test_configuration_errors(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: configuration_errors");

    let jar = runtime_jar().map_err(|e| format!("Failed to build runtime jar: {}", e))?;
    let cases: Vec<(&str, ArchiveBuilder, &str)> = vec![
        (
            "missing_attribute",
            ArchiveBuilder::new().manifest(&[]).stored("WEB-INF/lib/winstone.jar", jar.clone()),
            "The Winstone jar to use is not set in the manifest",
        ),
        (
            "invalid_attribute",
            ArchiveBuilder::new().manifest(&[(RUNTIME_JAR_ATTRIBUTE, "winstone.zip")]),
            "did not look like a JAR file",
        ),
        (
            "missing_runtime",
            ArchiveBuilder::new().manifest(&[(RUNTIME_JAR_ATTRIBUTE, RUNTIME_JAR)]),
            "Could not find 'winstone-lite-0.9.10.jar' in the /WEB-INF/lib/ directory",
        ),
        (
            "missing_manifest",
            ArchiveBuilder::new().stored("WEB-INF/lib/winstone.jar", jar.clone()),
            "MANIFEST.MF",
        ),
    ];

    for (name, war, message) in cases {
        let setup = WarSetup::new(config, &format!("configuration_errors_{}", name), war)?;
        let output = setup.run(&[], &[])?;
        output.expect_failure(message).map_err(|e| format!("{}: {}", name, e))?;
        if !setup.leftover_temp_files()?.is_empty() {
            return Err(format!("{}: temp file left behind", name));
        }
        println!("    PASS ({})", name);
    }

    Ok(())
}

/// Test: a runtime jar without the entry class is rejected before java starts
fn test_missing_entry_point(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: missing_entry_point");

    let not_a_runtime = ArchiveBuilder::new()
        .manifest(&[])
        .deflated("org/example/Other.class", b"\xCA\xFE\xBA\xBE".to_vec())
        .build()
        .map_err(|e| format!("Failed to build jar: {}", e))?;
    let war = ArchiveBuilder::new()
        .manifest(&[(RUNTIME_JAR_ATTRIBUTE, "broken.jar")])
        .stored("WEB-INF/lib/broken.jar", not_a_runtime);

    let setup = WarSetup::new(config, "missing_entry_point", war)?;
    let output = setup.run(&[], &[])?;
    output.expect_failure("class winstone.Launcher not found")?;
    if !setup.leftover_temp_files()?.is_empty() {
        return Err("Temp file left behind".to_string());
    }

    println!("    PASS");
    Ok(())
}

/// Test: a plain launcher runs the archive named by a file: URL
fn test_archive_url_override(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: archive_url_override");

    let setup = WarSetup::new(config, "archive_url_override", war_with_runtime(None)?)?;
    let war = setup.canonical_war()?;
    let url = Url::from_file_path(&war).map_err(|()| format!("Cannot build URL for {}", war.display()))?;

    let mut cmd = setup.command(&config.launcher_path, &["--port=1"]);
    cmd.env("WAR_LAUNCHER_ARCHIVE", url.as_str());
    let report = capture(cmd)?.expect_report()?;

    let arguments = string_list(&report["arguments"]);
    let expected = format!("--warfile={}", war.display());
    if arguments.first() != Some(&expected) {
        return Err(format!("Unexpected arguments: {:?}. Expected {} first", arguments, expected));
    }

    println!("    PASS");
    Ok(())
}

/// Test: signals sent while the runtime runs still end with cleanup and the runtime's status
#[cfg(unix)]
fn test_signals_during_run(config: &TestConfig) -> Result<(), String> {
    use std::io::{BufRead, BufReader};
    use std::os::unix::process::CommandExt;

    println!("  Running test: signals_during_run");

    // (name, signal, sent to the whole process group, expected exit code)
    let cases = [
        ("interrupt_process_group", libc::SIGINT, true, 128 + libc::SIGINT),
        ("terminate_launcher", libc::SIGTERM, false, 128 + libc::SIGTERM),
    ];

    for (name, signal, whole_group, expected) in cases {
        let setup = WarSetup::new(config, &format!("signals_{}", name), war_with_runtime(None)?)?;
        let mut cmd = setup.command(&setup.war_path, &[]);
        cmd.env("FAKE_JAVA_SLEEP_MS", "30000")
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0);
        let mut child = cmd.spawn().map_err(|e| format!("Failed to run launcher: {}", e))?;

        // The report means the runtime is running and the jar is extracted
        let stdout = child.stdout.take().ok_or("Launcher stdout not captured")?;
        let mut lines = BufReader::new(stdout).lines();
        let started = lines
            .by_ref()
            .map_while(|line| line.ok())
            .any(|line| line.starts_with(REPORT_PREFIX));
        if !started {
            let _ = child.kill();
            return Err(format!("{}: runtime was not started", name));
        }
        let during = setup.leftover_temp_files()?;
        if during.len() != 1 {
            let _ = child.kill();
            return Err(format!("{}: expected one extracted jar, found {:?}", name, during));
        }

        let pid = child.id() as libc::pid_t;
        let sent = unsafe {
            if whole_group {
                libc::killpg(pid, signal)
            } else {
                libc::kill(pid, signal)
            }
        };
        if sent == -1 {
            let _ = child.kill();
            return Err(format!("{}: failed to signal launcher: {}", name, std::io::Error::last_os_error()));
        }

        let status = child.wait().map_err(|e| format!("Failed to wait for launcher: {}", e))?;
        drop(lines);
        if status.code() != Some(expected) {
            return Err(format!("{}: launcher ended with {}, expected exit code {}", name, status, expected));
        }
        let leftovers = setup.leftover_temp_files()?;
        if !leftovers.is_empty() {
            return Err(format!("{}: temp dir not cleaned up: {:?}", name, leftovers));
        }
        println!("    PASS ({})", name);
    }

    Ok(())
}

#[cfg(not(unix))]
fn test_signals_during_run(_config: &TestConfig) -> Result<(), String> {
    println!("  Skipping test: signals_during_run (Unix only)");
    Ok(())
}

fn main() -> ExitCode {
    println!("=== War Launcher Test Suite ===");
    println!();

    let config = match TestConfig::from_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            return ExitCode::from(1);
        }
    };

    // Clean and recreate work directory
    if config.work_dir.exists() {
        if let Err(e) = fs::remove_dir_all(&config.work_dir) {
            eprintln!("Warning: Failed to clean work dir: {}", e);
        }
    }
    if let Err(e) = fs::create_dir_all(&config.work_dir) {
        eprintln!("Error: Failed to create work dir: {}", e);
        return ExitCode::from(1);
    }

    println!("Configuration:");
    println!("  Launcher:  {}", config.launcher_path.display());
    println!("  Fake java: {}", config.fake_java_path.display());
    println!("  Work dir:  {}", config.work_dir.display());
    println!();

    let tests: Vec<(&str, fn(&TestConfig) -> Result<(), String>)> = vec![
        ("argument_vector", test_argument_vector),
        ("extracted_runtime", test_extracted_runtime),
        ("exit_code_forwarded", test_exit_code_forwarded),
        ("configuration_errors", test_configuration_errors),
        ("missing_entry_point", test_missing_entry_point),
        ("archive_url_override", test_archive_url_override),
        ("signals_during_run", test_signals_during_run),
    ];

    let mut passed = 0;
    let mut failed = 0;

    println!("Running {} tests...", tests.len());
    println!();

    for (name, test_fn) in &tests {
        match test_fn(&config) {
            Ok(()) => {
                passed += 1;
            }
            Err(e) => {
                println!("  FAILED ({}): {}", name, e);
                failed += 1;
            }
        }
    }

    println!();
    println!("=== Results ===");
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);
    println!();

    if failed > 0 {
        ExitCode::from(1)
    } else {
        println!("All tests passed!");
        ExitCode::SUCCESS
    }
}
