//! Hub-side gateway program
//!
//! MicroPython source of the program that runs on the hub and turns stdin
//! bytes into motor actions. It is pasted into the hub's REPL on connect and
//! can also be exported for Pybricks Code or mpy-cross.

use std::fs;
use std::path::{Path, PathBuf};

pub const GATEWAY_PROGRAM: &str = include_str!("../../assets/hub_gateway.py");

/// Line printed by the gateway once it is reading commands
pub const READY_MARKER: &str = "GATEWAY READY";

pub const DEFAULT_EXPORT_NAME: &str = "hub_gateway.py";

/// Write the gateway source to `path`, or into it if `path` is a directory
pub fn export_to(path: &Path) -> anyhow::Result<PathBuf> {
    let target = if path.is_dir() {
        path.join(DEFAULT_EXPORT_NAME)
    } else {
        path.to_path_buf()
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, GATEWAY_PROGRAM)?;
    tracing::info!("Exported gateway program to {}", target.display());
    Ok(target)
}

/// Default export location in the documents folder
pub fn default_export_path() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_EXPORT_NAME)
}
