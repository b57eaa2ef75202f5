#![cfg(not(target_arch = "wasm32"))]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn decode_prints_a_json_report() {
    let dir = tempdir().unwrap();
    let dump = dir.path().join("mem.bin");
    std::fs::write(&dump, [0x2a, 0, 0, 0, b'o', b'k', 0]).unwrap();

    Command::new(env!("CARGO_BIN_EXE_capreplay"))
        .args(["decode", "--base", "0x2000", "--layout", "armv7a", "--fields", "u32,string"])
        .arg("--dump")
        .arg(&dump)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"value\": 42"))
        .stdout(predicate::str::contains("\"value\": \"ok\""))
        .stdout(predicate::str::contains("\"address\": 8192"));
}

#[test]
fn unknown_fields_fail_before_reading_the_dump() {
    Command::new(env!("CARGO_BIN_EXE_capreplay"))
        .args(["decode", "--dump", "/nonexistent", "--fields", "u32,quad"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown field kind `quad`"));
}

#[test]
fn layouts_lists_every_preset() {
    Command::new(env!("CARGO_BIN_EXE_capreplay"))
        .arg("layouts")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"armv7a\""))
        .stdout(predicate::str::contains("\"x86_64\""))
        .stdout(predicate::str::contains("\"endianness\": \"little\""));
}
