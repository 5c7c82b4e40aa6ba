//! Scenario 6: deterministic cwd encoding.

use fm_adapters::encode_cwd;
use std::path::Path;

#[test]
fn unix_path() {
    assert_eq!(encode_cwd(Path::new("/home/alice/proj")), "-home-alice-proj");
}

#[test]
fn windows_path() {
    assert_eq!(encode_cwd(Path::new(r"C:\Users\b\p")), "C--Users-b-p");
}

#[test]
fn bare_root() {
    assert_eq!(encode_cwd(Path::new("/")), "-");
}
