//! Native-messaging host installation
//!
//! The browser finds the relay through a host manifest installed in its
//! per-user native-messaging directory. `setup` writes that manifest,
//! `status` reports on the installation and probes the socket, and
//! `uninstall` removes the manifest again. The host name must match the
//! manifest file's basename, which is how the browser resolves
//! `runtime.connectNative("agentfox")`.

use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::error::{AgentfoxError, Result};

/// The native-messaging host name; also the manifest file basename.
pub const HOST_NAME: &str = "agentfox";

/// The host manifest as the browser expects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeManifest {
    /// Host name; must equal the manifest file basename.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Absolute path to the relay binary.
    pub path: PathBuf,
    /// Transport type; always `stdio`.
    #[serde(rename = "type")]
    pub transport: String,
    /// Extensions allowed to open the native port.
    pub allowed_extensions: Vec<String>,
}

impl NativeManifest {
    /// A manifest pointing at the given relay binary.
    pub fn new(relay_path: PathBuf, extension_id: String) -> Self {
        Self {
            name: HOST_NAME.to_string(),
            description: "AgentFox browser bridge".to_string(),
            path: relay_path,
            transport: "stdio".to_string(),
            allowed_extensions: vec![extension_id],
        }
    }

    /// Structural checks mirroring what the browser enforces.
    pub fn is_valid(&self) -> bool {
        self.name == HOST_NAME
            && self.transport == "stdio"
            && self.path.is_absolute()
            && !self.allowed_extensions.is_empty()
    }
}

/// The browser's per-user native-messaging directory.
pub fn manifest_dir() -> Result<PathBuf> {
    let base = directories::BaseDirs::new()
        .ok_or_else(|| AgentfoxError::Install("cannot determine home directory".to_string()))?;
    #[cfg(target_os = "macos")]
    {
        Ok(base
            .home_dir()
            .join("Library/Application Support/Mozilla/NativeMessagingHosts"))
    }
    #[cfg(not(target_os = "macos"))]
    {
        Ok(base.home_dir().join(".mozilla/native-messaging-hosts"))
    }
}

/// Manifest file path within a directory.
pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.json", HOST_NAME))
}

/// Write the manifest into `dir`, creating it as needed.
pub fn write_manifest(dir: &Path, manifest: &NativeManifest) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AgentfoxError::Install(format!("cannot create {}: {}", dir.display(), e)))?;
    let path = manifest_path(dir);
    let body = serde_json::to_string_pretty(manifest)?;
    std::fs::write(&path, body)
        .map_err(|e| AgentfoxError::Install(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(path)
}

/// Read the manifest from `dir`, when present.
pub fn read_manifest(dir: &Path) -> Result<Option<NativeManifest>> {
    let path = manifest_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| AgentfoxError::Install(format!("cannot read {}: {}", path.display(), e)))?;
    let manifest = serde_json::from_str(&raw)
        .map_err(|e| AgentfoxError::Install(format!("invalid manifest: {}", e)))?;
    Ok(Some(manifest))
}

/// Remove the manifest from `dir`; returns whether one existed.
pub fn remove_manifest(dir: &Path) -> Result<bool> {
    let path = manifest_path(dir);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => {
            Err(AgentfoxError::Install(format!("cannot remove {}: {}", path.display(), e)).into())
        }
    }
}

/// The relay binary that ships next to the current executable.
pub fn default_relay_path() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| AgentfoxError::Install(format!("cannot locate executable: {}", e)))?;
    let dir = exe
        .parent()
        .ok_or_else(|| AgentfoxError::Install("executable has no parent".to_string()))?;
    Ok(dir.join("agentfox-relay"))
}

/// `setup`: install the manifest.
pub fn setup(relay_path: Option<PathBuf>, extension_id: String) -> Result<()> {
    let relay_path = match relay_path {
        Some(path) => path,
        None => default_relay_path()?,
    };
    if !relay_path.is_absolute() {
        return Err(
            AgentfoxError::Install("relay path must be absolute".to_string()).into(),
        );
    }
    let dir = manifest_dir()?;
    let manifest = NativeManifest::new(relay_path.clone(), extension_id);
    let path = write_manifest(&dir, &manifest)?;
    println!("{} manifest written to {}", "ok:".green(), path.display());
    if !relay_path.exists() {
        println!(
            "{} relay binary {} does not exist yet",
            "warning:".yellow(),
            relay_path.display()
        );
    }
    Ok(())
}

/// `status`: report manifest, relay binary, and socket health.
///
/// # Errors
///
/// Returns an error (so the CLI exits non-zero) when the installation is
/// incomplete or invalid.
pub fn status(socket_path: &Path) -> Result<()> {
    let dir = manifest_dir()?;
    let manifest = read_manifest(&dir)?;

    let mut healthy = true;
    match &manifest {
        Some(manifest) if manifest.is_valid() => {
            println!("{} manifest installed at {}", "ok:".green(), manifest_path(&dir).display());
            if manifest.path.exists() {
                println!("{} relay binary {}", "ok:".green(), manifest.path.display());
            } else {
                println!(
                    "{} relay binary missing: {}",
                    "error:".red(),
                    manifest.path.display()
                );
                healthy = false;
            }
        }
        Some(_) => {
            println!("{} manifest present but invalid", "error:".red());
            healthy = false;
        }
        None => {
            println!(
                "{} no manifest at {} (run `agentfox setup`)",
                "error:".red(),
                manifest_path(&dir).display()
            );
            healthy = false;
        }
    }

    match std::os::unix::net::UnixStream::connect(socket_path) {
        Ok(_) => println!("{} MCP server listening on {}", "ok:".green(), socket_path.display()),
        Err(_) => println!(
            "{} no MCP server on {} (it starts with the MCP client)",
            "note:".yellow(),
            socket_path.display()
        ),
    }

    if healthy {
        Ok(())
    } else {
        Err(AgentfoxError::Install("installation is incomplete".to_string()).into())
    }
}

/// `uninstall`: remove the manifest.
pub fn uninstall() -> Result<()> {
    let dir = manifest_dir()?;
    if remove_manifest(&dir)? {
        println!("{} manifest removed", "ok:".green());
    } else {
        println!("{} nothing to remove", "note:".yellow());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_wire_shape() {
        let manifest = NativeManifest::new(
            PathBuf::from("/usr/local/bin/agentfox-relay"),
            "agentfox@agentfox.dev".to_string(),
        );
        let val = serde_json::to_value(&manifest).unwrap();
        assert_eq!(val["name"], "agentfox");
        assert_eq!(val["type"], "stdio");
        assert_eq!(val["allowed_extensions"][0], "agentfox@agentfox.dev");
        assert!(val.get("transport").is_none());
    }

    #[test]
    fn test_manifest_validation() {
        let good = NativeManifest::new(
            PathBuf::from("/usr/local/bin/agentfox-relay"),
            "x@y".to_string(),
        );
        assert!(good.is_valid());

        let mut relative = good.clone();
        relative.path = PathBuf::from("relative/agentfox-relay");
        assert!(!relative.is_valid());

        let mut renamed = good.clone();
        renamed.name = "someone-else".to_string();
        assert!(!renamed.is_valid());

        let mut no_extensions = good;
        no_extensions.allowed_extensions.clear();
        assert!(!no_extensions.is_valid());
    }

    #[test]
    fn test_write_read_remove_round_trip() {
        let dir = TempDir::new().unwrap();
        let manifest = NativeManifest::new(
            PathBuf::from("/usr/local/bin/agentfox-relay"),
            "x@y".to_string(),
        );
        let path = write_manifest(dir.path(), &manifest).unwrap();
        assert_eq!(path.file_name().unwrap(), "agentfox.json");

        let back = read_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(back.name, HOST_NAME);
        assert_eq!(back.path, manifest.path);

        assert!(remove_manifest(dir.path()).unwrap());
        assert!(!remove_manifest(dir.path()).unwrap());
        assert!(read_manifest(dir.path()).unwrap().is_none());
    }
}
