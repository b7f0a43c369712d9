//! Install hand-off through an external command such as `adb install -r`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use discover_core::Installer;
use tokio::process::Command;
use tracing::{info, warn};

/// Runs `<program> <args..> <artifact>` for each install.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    /// Build from a split command line; the first word is the program.
    pub fn new(command: &[String]) -> anyhow::Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("install command is empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn resolve(&self) -> Option<PathBuf> {
        find_program(&self.program)
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn can_install(&self) -> bool {
        self.resolve().is_some()
    }

    async fn install(&self, artifact: &Path) -> bool {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(artifact)
            .status()
            .await;
        match status {
            Ok(status) if status.success() => {
                info!(program = %self.program, artifact = %artifact.display(), "installer accepted artifact");
                true
            }
            Ok(status) => {
                warn!(program = %self.program, %status, "installer exited unsuccessfully");
                false
            }
            Err(e) => {
                warn!(program = %self.program, error = %e, "failed to spawn installer");
                false
            }
        }
    }
}

/// Locate `program` the way a shell would: as given when it contains a path
/// separator, otherwise in each `PATH` entry.
fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let direct = dir.join(program);
        if direct.is_file() {
            return Some(direct);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{program}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installer(command: &str) -> CommandInstaller {
        let words: Vec<String> = command.split_whitespace().map(str::to_owned).collect();
        CommandInstaller::new(&words).unwrap()
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandInstaller::new(&[]).is_err());
    }

    #[tokio::test]
    async fn missing_program_cannot_install() {
        let missing = installer("definitely-not-an-installer-7f3a --flag");
        assert!(!missing.can_install().await);
        assert!(!missing.install(Path::new("/tmp/x.apk")).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_decides_hand_off() {
        assert!(installer("true").can_install().await);
        assert!(installer("true").install(Path::new("a.apk")).await);
        assert!(!installer("false").install(Path::new("a.apk")).await);
    }

    #[cfg(unix)]
    #[test]
    fn explicit_paths_are_checked_directly() {
        assert!(find_program("/bin/sh").is_some());
        assert!(find_program("/nonexistent/sh").is_none());
    }
}
