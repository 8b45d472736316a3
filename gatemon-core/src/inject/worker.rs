//! Re-exec'd stress worker processes.
//!
//! The process-pool injectors spawn fresh executions of the harness binary
//! (`gatemon stress …`) so their load is attributed to separate processes
//! by the kernel. Worker bodies run until the owning injector kills them at
//! the duration boundary; none of them holds resources that leak on
//! SIGKILL.

use std::hint::black_box;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::Command;

/// Size of one disk stress block.
pub const BLOCK_BYTES: usize = 1024 * 1024;

/// Command that re-executes this binary with the `stress` subcommand.
pub(crate) fn worker_command() -> std::io::Result<Command> {
    let exe = std::env::current_exe()?;
    let mut command = Command::new(exe);
    command
        .arg("stress")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    Ok(command)
}

/// Unbounded arithmetic loop; one of these per logical CPU contends the
/// host scheduler.
pub fn cpu_burn() {
    let mut x: u64 = 0xdeadbeef;
    loop {
        x = x
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        black_box(x);
    }
}

/// Write `blocks` MiB of `'x'`, rewind, read it all back, delete, repeat.
///
/// All files live inside `dir`, the injector's scratch directory, so
/// cleanup after SIGKILL is a directory-wide removal.
pub fn disk_churn(dir: &Path, blocks: usize) {
    let block = vec![b'x'; BLOCK_BYTES];
    let mut round: u64 = 0;
    loop {
        round += 1;
        let path = dir.join(format!("churn-{}-{round}", std::process::id()));
        if write_read_delete(&path, &block, blocks).is_err() {
            // Scratch dir gone or disk full; back off and keep pressing.
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

fn write_read_delete(path: &Path, block: &[u8], blocks: usize) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(path)?;
    for _ in 0..blocks {
        file.write_all(block)?;
    }
    file.seek(SeekFrom::Start(0))?;
    let mut sink = vec![0u8; block.len()];
    for _ in 0..blocks {
        file.read_exact(&mut sink)?;
    }
    drop(file);
    std::fs::remove_file(path)
}

/// One deadlock group: `n_threads` workers acquiring two locks in opposite
/// orders until they mutually block. The process idles afterwards and is
/// reaped by the owning injector.
pub fn deadlock_group(n_threads: usize) {
    let first = Arc::new(Mutex::new(()));
    let second = Arc::new(Mutex::new(()));
    for worker in 0..n_threads.max(2) {
        let (outer, inner) = if worker % 2 == 0 {
            (Arc::clone(&first), Arc::clone(&second))
        } else {
            (Arc::clone(&second), Arc::clone(&first))
        };
        std::thread::spawn(move || {
            loop {
                let _outer = outer.lock().unwrap_or_else(|e| e.into_inner());
                std::thread::sleep(Duration::from_millis(1));
                let _inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            }
        });
    }
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

/// Cycle through the URL list issuing GETs and discarding the bodies.
/// A failed fetch is a no-op.
pub async fn http_read(urls: Vec<String>) {
    let urls: Vec<String> = urls.iter().map(|raw| normalize_url(raw)).collect();
    let client = reqwest::Client::new();
    loop {
        if urls.is_empty() {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }
        for url in &urls {
            match client.get(url).send().await {
                Ok(response) => {
                    let _ = response.bytes().await;
                }
                Err(_) => {}
            }
        }
    }
}

/// Bare host names in site lists (`www.google.com`) get a scheme.
pub(crate) fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_without_scheme_get_http_prepended() {
        assert_eq!(normalize_url("www.google.com"), "http://www.google.com");
        assert_eq!(normalize_url(" example.org "), "http://example.org");
        assert_eq!(normalize_url("https://secure.example"), "https://secure.example");
        assert_eq!(normalize_url("http://plain.example"), "http://plain.example");
    }

    #[test]
    fn disk_round_trip_writes_reads_and_deletes() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("round");
        let block = vec![b'x'; 4096];
        write_read_delete(&path, &block, 3).unwrap();
        assert!(!path.exists());
    }
}
