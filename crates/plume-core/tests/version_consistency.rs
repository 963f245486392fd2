//! Ensures all workspace crates use `version.workspace = true` and that
//! the workspace version matches the library's reported version.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .expect("crate lives two levels below the workspace root")
        .to_path_buf()
}

fn read_toml(path: &Path) -> toml::Value {
    let content = std::fs::read_to_string(path).expect("read manifest");
    content.parse().expect("parse manifest")
}

#[test]
fn all_crates_use_workspace_version() {
    let root = workspace_root();
    let doc = read_toml(&root.join("Cargo.toml"));
    let members = doc["workspace"]["members"]
        .as_array()
        .expect("workspace members");
    assert!(!members.is_empty());

    for member in members {
        let member = member.as_str().expect("member path");
        let manifest = read_toml(&root.join(member).join("Cargo.toml"));
        let uses_workspace = manifest["package"]["version"]
            .as_table()
            .and_then(|t| t.get("workspace"))
            .and_then(|v| v.as_bool());
        assert_eq!(
            uses_workspace,
            Some(true),
            "{member} should use version.workspace = true"
        );
    }
}

#[test]
fn workspace_version_matches_library() {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    let ws_version = doc["workspace"]["package"]["version"]
        .as_str()
        .expect("workspace version");
    assert_eq!(ws_version, plume_core::VERSION);
}
