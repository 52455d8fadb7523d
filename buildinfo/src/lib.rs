// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

//! Build-time version string for bkplug binaries.
//!
//! Build scripts call [`generate_version_info`], and binaries read the
//! result with `env!("BKPLUG_BUILD_INFO")`.

use std::{env, process::Command};

use chrono::Utc;

const BUILD_TIMESTAMP_ENV: &str = "BKPLUG_BUILD_TIMESTAMP";

/// Exports `BKPLUG_BUILD_INFO` to the crate being built and registers the
/// inputs that should trigger a rebuild.
///
/// The value has the form `<version> (<git describe> <timestamp>) <rustc -V>`.
/// Parts that cannot be determined, such as the git description when
/// building from a source tarball, are left out.
pub fn generate_version_info() {
    println!("cargo:rerun-if-changed=src");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed={BUILD_TIMESTAMP_ENV}");
    println!(
        "cargo:rustc-env=BKPLUG_BUILD_INFO={}",
        format_build_info(
            env!("CARGO_PKG_VERSION"),
            git_version().as_deref(),
            &build_timestamp(),
            rustc_version().as_deref(),
        )
    );
}

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `git describe --tags --always --dirty`, falling back to the short commit
/// hash when the repository has no tags.
fn git_version() -> Option<String> {
    command_output("git", &["describe", "--tags", "--always", "--dirty"]).or_else(|| {
        let hash = command_output("git", &["rev-parse", "--short=10", "HEAD"])?;
        let dirty = command_output("git", &["status", "--porcelain"]).is_some();
        Some(if dirty { format!("{hash}-dirty") } else { hash })
    })
}

fn build_timestamp() -> String {
    env::var(BUILD_TIMESTAMP_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

fn rustc_version() -> Option<String> {
    command_output("rustc", &["--version"])
}

fn format_build_info(
    version: &str,
    git: Option<&str>,
    timestamp: &str,
    rustc: Option<&str>,
) -> String {
    let details = match git {
        Some(git) => format!("{git} {timestamp}"),
        None => timestamp.to_string(),
    };
    match rustc {
        Some(rustc) => format!("{version} ({details}) {rustc}"),
        None => format!("{version} ({details})"),
    }
}
