// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=FIMC_VERSION");

    // Packagers building from a tarball have no git metadata
    let version = std::env::var("FIMC_VERSION").unwrap_or_else(|_| describe_version());
    println!("cargo::rustc-env=GIT_VERSION={version}");
}

/// Run git and return its trimmed stdout on success
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// `<tag>-<hash>` on a release tag, `<tag>-dirty-<hash>` past one
fn describe_version() -> String {
    let hash = git(&["rev-parse", "--short", "HEAD"]);
    let Some(described) = git(&["describe", "--tags", "--match", "v*"]) else {
        return hash.unwrap_or_else(|| "unknown".to_string());
    };
    let described = described.trim_start_matches('v');

    match described.rsplitn(3, '-').collect::<Vec<_>>()[..] {
        [commit, _ahead, tag] => {
            format!("{tag}-dirty-{}", commit.trim_start_matches('g'))
        }
        _ => match hash {
            Some(hash) => format!("{described}-{hash}"),
            None => described.to_string(),
        },
    }
}
