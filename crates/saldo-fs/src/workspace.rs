use crate::config::{DEFAULT_SERVER_URL, WorkspaceConfig, load_config, save_config};
use saldo_core::{SaldoError, SaldoResult};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub saldo_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub config_path: PathBuf,
    pub state_db_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WorkspaceInitResult {
    pub paths: WorkspacePaths,
    pub created: Vec<PathBuf>,
}

impl WorkspacePaths {
    pub fn from_root(root: PathBuf) -> Self {
        let saldo_dir = root.join(".saldo");

        Self {
            config_path: saldo_dir.join("config.toml"),
            state_db_path: saldo_dir.join("state.db"),
            cache_dir: saldo_dir.join("cache"),
            logs_dir: saldo_dir.join("logs"),
            root,
            saldo_dir,
        }
    }
}

pub fn init_workspace(
    target: Option<&Path>,
    server: Option<&str>,
) -> SaldoResult<WorkspaceInitResult> {
    let root = match target {
        Some(path) => absolutize(path)?,
        None => current_dir_for("init")?,
    };

    let paths = WorkspacePaths::from_root(root);
    let mut created = Vec::new();

    ensure_dir(&paths.root, &mut created)?;
    ensure_dir(&paths.saldo_dir, &mut created)?;
    ensure_dir(&paths.cache_dir, &mut created)?;
    ensure_dir(&paths.logs_dir, &mut created)?;

    if paths.config_path.exists() {
        let _ = load_config(&paths)?;
    } else {
        let default_server = server.unwrap_or(DEFAULT_SERVER_URL);
        let config = WorkspaceConfig::with_default_server(default_server);
        save_config(&paths, &config)?;
        created.push(paths.config_path.clone());
    }

    Ok(WorkspaceInitResult { paths, created })
}

pub fn resolve_workspace(explicit: Option<&Path>) -> SaldoResult<WorkspacePaths> {
    let root = match explicit {
        Some(path) => absolutize(path)?,
        None => current_dir_for("workspace lookup")?,
    };

    let paths = WorkspacePaths::from_root(root);
    if !paths.saldo_dir.is_dir() {
        let root_display = paths.root.display();
        return Err(SaldoError::usage(format!(
            "workspace is not initialized at '{root_display}'; run `saldo init --workspace {root_display}` first"
        )));
    }

    Ok(paths)
}

fn absolutize(path: &Path) -> SaldoResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    Ok(current_dir_for("path resolution")?.join(path))
}

fn current_dir_for(purpose: &str) -> SaldoResult<PathBuf> {
    std::env::current_dir().map_err(|err| {
        SaldoError::io(format!(
            "failed to resolve current directory for {purpose}: {err}"
        ))
    })
}

fn ensure_dir(path: &Path, created: &mut Vec<PathBuf>) -> SaldoResult<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(SaldoError::io(format!(
                "expected '{}' to be a directory",
                path.display()
            )));
        }
        return Ok(());
    }

    fs::create_dir_all(path).map_err(|err| {
        SaldoError::io(format!(
            "failed to create directory '{}': {}",
            path.display(),
            err
        ))
    })?;
    created.push(path.to_path_buf());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_layout_and_default_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("workspace");

        let init = init_workspace(Some(&root), Some("https://fin.example.test")).expect("init");
        assert!(init.paths.saldo_dir.is_dir());
        assert!(init.paths.cache_dir.is_dir());
        assert!(init.paths.config_path.is_file());

        let config = load_config(&init.paths).expect("load config");
        let profile = config
            .profiles
            .get(&config.active_profile)
            .expect("active profile");
        assert_eq!(profile.server, "https://fin.example.test");

        // Re-running init on an existing workspace is a no-op.
        let again = init_workspace(Some(&root), None).expect("re-init");
        assert!(again.created.is_empty());
    }

    #[test]
    fn resolve_rejects_uninitialized_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let error = resolve_workspace(Some(temp.path())).expect_err("not initialized");
        assert!(error.message.contains("not initialized"));
    }
}
