use std::fs;
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command as StdCommand, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SERVER_BIN: &str = env!("CARGO_BIN_EXE_loft-server");
const CLIENT_BIN: &str = env!("CARGO_BIN_EXE_loft-client");

struct ServerProcess {
    child: Child,
    addr: String,
}

impl ServerProcess {
    fn spawn(bucket_dir: &TempDir) -> Self {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let addr = format!("127.0.0.1:{port}");
        let child = StdCommand::new(SERVER_BIN)
            .args(["--addr", &addr, "--bucket-path"])
            .arg(bucket_dir.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while TcpStream::connect(&addr).is_err() {
            assert!(Instant::now() < deadline, "server did not come up");
            thread::sleep(Duration::from_millis(50));
        }
        Self { child, addr }
    }

    fn client(&self) -> Command {
        let mut cmd = Command::new(CLIENT_BIN);
        cmd.args(["--addr", &self.addr]);
        cmd
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn cli_no_args() {
    Command::new(CLIENT_BIN).assert().failure();
}

#[test]
fn cli_version() {
    Command::new(SERVER_BIN)
        .arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Command::new(CLIENT_BIN)
        .arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_invalid_identifier() {
    Command::new(CLIENT_BIN)
        .args(["download", "../etc", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid bucket identifier"));
}

#[test]
fn server_rejects_missing_bucket_dir() {
    let dir = TempDir::new().unwrap();
    Command::new(SERVER_BIN)
        .args(["--addr", "127.0.0.1:0", "--bucket-path"])
        .arg(dir.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));
}

#[test]
fn create_upload_download() {
    let buckets = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let server = ServerProcess::spawn(&buckets);

    let output = server
        .client()
        .args(["create", "64"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[A-Za-z0-9]{6}\n$").unwrap())
        .get_output()
        .stdout
        .clone();
    let id = String::from_utf8(output).unwrap().trim().to_string();
    assert_eq!(fs::metadata(buckets.path().join(&id)).unwrap().len(), 64);

    let source = work.path().join("in.txt");
    fs::write(&source, "the quick brown fox").unwrap();
    server
        .client()
        .arg("upload")
        .arg(&id)
        .arg(&source)
        .assert()
        .success();

    let target = work.path().join("out.txt");
    server
        .client()
        .arg("download")
        .arg(&id)
        .arg(&target)
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&target).unwrap(), "the quick brown fox");
}

#[test]
fn upload_too_large_fails() {
    let buckets = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let server = ServerProcess::spawn(&buckets);

    let output = server
        .client()
        .args(["create", "4"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let id = String::from_utf8(output).unwrap().trim().to_string();

    let source = work.path().join("big.txt");
    fs::write(&source, "more than four bytes").unwrap();
    server
        .client()
        .arg("upload")
        .arg(&id)
        .arg(&source)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error code 2"));
    assert_eq!(fs::read(buckets.path().join(&id)).unwrap(), vec![0u8; 4]);
}

#[test]
fn download_unknown_bucket_fails() {
    let buckets = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let server = ServerProcess::spawn(&buckets);
    let target = work.path().join("out");
    server
        .client()
        .arg("download")
        .arg("absent")
        .arg(&target)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error code 1"));
    assert!(!target.exists());
}
