//! Stand-in for the `java` executable.
//!
//! Usage: java [jvm options...] -cp <jar> <main class> [args...]
//! Outputs: FAKE_JAVA:<json> describing the invocation, sleeps for
//! `FAKE_JAVA_SLEEP_MS` (default 0), then exits with `FAKE_JAVA_EXIT_CODE`
//! (default 0).
//!
//! The class path entry is hashed while this process runs, which is the
//! window in which the launcher guarantees the extracted jar exists.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::env;
use std::fs::File;
use std::io::{BufReader, Read};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

fn sha256_of(path: &str) -> Result<String, String> {
    let file = File::open(path).map_err(|e| format!("Error opening class path '{}': {}", path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) => return Err(format!("Error reading class path: {}", e)),
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let Some(cp_index) = args.iter().position(|a| a == "-cp") else {
        eprintln!("fake-java: no -cp given");
        return ExitCode::from(2);
    };
    let (jvm_options, rest) = args.split_at(cp_index);
    let (classpath, main_class, arguments) = match rest {
        [_, classpath, main_class, arguments @ ..] => (classpath, main_class, arguments),
        _ => {
            eprintln!("fake-java: usage: java [options] -cp <jar> <class> [args...]");
            return ExitCode::from(2);
        }
    };

    let digest = match sha256_of(classpath) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("fake-java: {}", e);
            return ExitCode::from(2);
        }
    };

    let report = json!({
        "jvm_options": jvm_options,
        "classpath": classpath,
        "classpath_sha256": digest,
        "main_class": main_class,
        "arguments": arguments,
    });
    println!("FAKE_JAVA:{}", report);

    if let Some(ms) = env::var("FAKE_JAVA_SLEEP_MS").ok().and_then(|v| v.parse::<u64>().ok()) {
        thread::sleep(Duration::from_millis(ms));
    }

    let code = env::var("FAKE_JAVA_EXIT_CODE")
        .ok()
        .and_then(|c| c.parse::<u8>().ok())
        .unwrap_or(0);
    ExitCode::from(code)
}
