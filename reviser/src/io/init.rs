//! Project scaffolding for `reviser init`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{CONFIG_FILE, ReviserConfig, write_config};

/// Canonical paths of a project created with the default config.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub input_dir: PathBuf,
    pub copy_dir: PathBuf,
    pub output_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>, cfg: &ReviserConfig) -> Self {
        let root = root.into();
        let resolved = cfg.clone().resolved(&root);
        Self {
            config_path: root.join(CONFIG_FILE),
            gitignore_path: resolved.output_dir.join(".gitignore"),
            input_dir: resolved.input_dir,
            copy_dir: resolved.copy_dir,
            output_dir: resolved.output_dir,
            root,
        }
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config file.
    pub force: bool,
}

/// Write a default `reviser.toml` and create the input/output layout.
///
/// Fails if the config already exists unless `options.force` is set. Existing
/// source files are never touched.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<ProjectPaths> {
    let cfg = ReviserConfig::default();
    let paths = ProjectPaths::new(root, &cfg);
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "reviser init: {} already exists (use --force to overwrite)",
            CONFIG_FILE
        ));
    }

    create_dir(&paths.input_dir)?;
    create_dir(&paths.copy_dir)?;
    create_dir(&paths.output_dir)?;
    write_config(&paths.config_path, &cfg)?;
    if !paths.gitignore_path.exists() {
        fs::write(&paths.gitignore_path, OUTPUT_GITIGNORE)
            .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    }
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

const OUTPUT_GITIGNORE: &str = ".reviser/\n";
