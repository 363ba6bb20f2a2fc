use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Overrides the directory scanned for bundled executables.
const NATIVE_DIR_ENV: &str = "MEDIASTAGE_NATIVE_DIR";

/// Resource prefix every embedded entry is registered under.
const RESOURCE_PREFIX: &str = "native";

fn main() {
    let manifest_dir =
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is set"));

    println!("cargo:rerun-if-env-changed={NATIVE_DIR_ENV}");

    let native_root = env::var_os(NATIVE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| manifest_dir.join(RESOURCE_PREFIX));

    // Directory-level trigger picks up added and removed binaries.
    println!("cargo:rerun-if-changed={}", native_root.display());

    let binaries = discover_binaries(&native_root)
        .unwrap_or_else(|err| panic!("Failed scanning {}: {err}", native_root.display()));

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set"));
    let out_file = out_dir.join("bundled_native.rs");

    let generated = generate_bundled_native_rs(&binaries);
    fs::write(&out_file, generated).expect("write generated bundled_native.rs");
}

/// (resource name, absolute file path)
fn discover_binaries(native_root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    if !native_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = native_root
        .read_dir()?
        .collect::<Result<Vec<_>, _>>()?;

    entries.sort_by_key(|e| e.file_name());

    let mut binaries = Vec::new();

    for entry in entries {
        let file_name = entry.file_name();
        if is_hidden_name(&file_name) {
            continue;
        }

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        println!("cargo:rerun-if-changed={}", path.display());

        let absolute = path.canonicalize()?;
        let name = format!("{RESOURCE_PREFIX}/{}", file_name.to_string_lossy());
        binaries.push((name, absolute));
    }

    Ok(binaries)
}

fn generate_bundled_native_rs(binaries: &[(String, PathBuf)]) -> String {
    let mut out = String::new();

    out.push_str("// @generated by mediastage-core/build.rs\n");
    out.push_str("// This file is auto-generated. Do not edit by hand.\n\n");

    out.push_str("pub static BUNDLED_NATIVE: &[(&str, &[u8])] = &[\n");
    for (name, path) in binaries {
        out.push_str(&format!(
            "    ({}, include_bytes!({})),\n",
            to_rust_string_literal(name),
            to_rust_string_literal(&path.to_string_lossy())
        ));
    }
    out.push_str("];\n");

    out
}

fn is_hidden_name(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn to_rust_string_literal(value: &str) -> String {
    // Debug formatting yields a valid Rust string literal with proper escaping.
    format!("{value:?}")
}
