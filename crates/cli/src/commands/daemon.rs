// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `antfarm daemon run` - launch the daemon binary in the foreground.

use std::path::PathBuf;
use std::process::Command;

use crate::exit_error::ExitError;

pub fn run() -> Result<(), ExitError> {
    let antfarmd = find_antfarmd_binary()?;
    let status = Command::new(&antfarmd)
        .status()
        .map_err(|e| ExitError::new(1, format!("failed to launch {}: {e}", antfarmd.display())))?;

    if !status.success() {
        return Err(ExitError::new(status.code().unwrap_or(1), format!("daemon exited with status: {status}")));
    }
    Ok(())
}

/// Look for `antfarmd` next to the running `antfarm` binary first, then on
/// `PATH`, matching the teacher's sibling-binary resolution for `ojd`.
fn find_antfarmd_binary() -> Result<PathBuf, ExitError> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("antfarmd");
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    which_on_path("antfarmd").ok_or_else(|| ExitError::new(1, "could not locate antfarmd binary".to_string()))
}

fn which_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).map(|dir| dir.join(name)).find(|candidate| candidate.exists())
}
