//! Compiler configuration.
//!
//! Settings come from four layers, later ones winning:
//! 1. built-in defaults,
//! 2. a `stackweave.yaml` file (found in the working directory or passed
//!    explicitly),
//! 3. the `STACKWEAVE_STD` environment variable, via
//!    [`CompilerConfig::apply_env`],
//! 4. command-line flags, applied by the CLI on top of the loaded value.
//!
//! The environment is only read by `apply_env`. A config built in code keeps
//! its `std_dir`, and falls back to the `std/` directory shipped next to this
//! crate's manifest when it has none.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{CompileError, ErrorKind, Result};
use crate::expand::MAX_EXPANSION_DEPTH;
use crate::platform::{Platform, DEFAULT_TARGET};

pub const CONFIG_FILE_NAME: &str = "stackweave.yaml";
pub const STD_DIR_ENV: &str = "STACKWEAVE_STD";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Built-in target name or alias.
    pub target: String,
    /// Include directories searched after the including file's directory.
    pub include_dirs: Vec<PathBuf>,
    pub max_expansion_depth: usize,
    /// Load the target's prelude before the main file.
    pub prelude: bool,
    /// Custom platform descriptor; overrides `target`.
    pub platform_file: Option<PathBuf>,
    pub std_dir: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            include_dirs: Vec::new(),
            max_expansion_depth: MAX_EXPANSION_DEPTH,
            prelude: true,
            platform_file: None,
            std_dir: None,
        }
    }
}

impl CompilerConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: CompilerConfig = serde_yaml::from_str(text).map_err(|e| {
            CompileError::new(ErrorKind::InvalidConfig {
                reason: e.to_string(),
            })
        })?;
        if config.max_expansion_depth == 0 {
            return Err(CompileError::new(ErrorKind::InvalidConfig {
                reason: "max_expansion_depth must be at least 1".into(),
            }));
        }
        Ok(config)
    }

    /// Loads a config file. Relative paths inside it are resolved against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            CompileError::new(ErrorKind::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        let mut config = Self::from_yaml(&text)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        debug!(path = %path.display(), platform = %config.target, "loaded config");
        Ok(config)
    }

    /// Loads `dir/stackweave.yaml` when present, defaults otherwise.
    pub fn discover(dir: &Path) -> Result<Self> {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &PathBuf| if p.is_relative() { base.join(p) } else { p.clone() };
        self.include_dirs = self.include_dirs.iter().map(join).collect();
        self.platform_file = self.platform_file.as_ref().map(join);
        self.std_dir = self.std_dir.as_ref().map(join);
    }

    /// Layers `STACKWEAVE_STD` over the file settings.
    pub fn apply_env(&mut self) {
        self.override_std_dir(env::var_os(STD_DIR_ENV).map(PathBuf::from));
    }

    fn override_std_dir(&mut self, dir: Option<PathBuf>) {
        if let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) {
            debug!(std_dir = %dir.display(), "standard library directory from environment");
            self.std_dir = Some(dir);
        }
    }

    pub fn std_dir(&self) -> PathBuf {
        match &self.std_dir {
            Some(dir) => dir.clone(),
            None => Path::new(env!("CARGO_MANIFEST_DIR")).join("std"),
        }
    }

    /// Include directories followed by the standard library directory.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.include_dirs.clone();
        paths.push(self.std_dir());
        paths
    }

    pub fn platform(&self) -> Result<Platform> {
        match &self.platform_file {
            Some(path) => Platform::from_file(path),
            None => Platform::builtin(&self.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_linux_with_prelude() {
        let config = CompilerConfig::default();
        assert_eq!(config.target, "x86_64-linux");
        assert_eq!(config.max_expansion_depth, 128);
        assert!(config.prelude);
    }

    #[test]
    fn partial_files_keep_defaults() {
        let config = CompilerConfig::from_yaml("target: arm64-macos\ninclude_dirs: [lib]\n").unwrap();
        assert_eq!(config.target, "arm64-macos");
        assert_eq!(config.include_dirs, [PathBuf::from("lib")]);
        assert_eq!(config.max_expansion_depth, 128);
    }

    #[test]
    fn unknown_keys_and_zero_depth_are_rejected() {
        for text in ["targt: x", "max_expansion_depth: 0"] {
            let err = CompilerConfig::from_yaml(text).unwrap_err();
            assert!(matches!(err.kind(), ErrorKind::InvalidConfig { .. }), "{text}");
        }
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let mut config = CompilerConfig::from_yaml("include_dirs: [lib, /abs]\nstd_dir: std\n").unwrap();
        config.rebase(Path::new("/project"));
        assert_eq!(config.include_dirs, [PathBuf::from("/project/lib"), PathBuf::from("/abs")]);
        assert_eq!(config.std_dir, Some(PathBuf::from("/project/std")));
    }

    #[test]
    fn explicit_std_dir_is_used_as_given() {
        let config = CompilerConfig {
            std_dir: Some(PathBuf::from("/opt/std")),
            ..CompilerConfig::default()
        };
        assert_eq!(config.std_dir(), PathBuf::from("/opt/std"));
        assert_eq!(config.search_paths().last(), Some(&PathBuf::from("/opt/std")));
    }

    #[test]
    fn environment_layer_replaces_the_file_setting() {
        let mut config = CompilerConfig::from_yaml("std_dir: /from/file\n").unwrap();
        config.override_std_dir(None);
        assert_eq!(config.std_dir(), PathBuf::from("/from/file"));
        config.override_std_dir(Some(PathBuf::new()));
        assert_eq!(config.std_dir(), PathBuf::from("/from/file"));
        config.override_std_dir(Some(PathBuf::from("/from/env")));
        assert_eq!(config.std_dir(), PathBuf::from("/from/env"));
    }

    #[test]
    fn missing_std_dir_falls_back_to_the_bundled_one() {
        let config = CompilerConfig::default();
        assert!(config.std_dir().ends_with("std"));
    }

    #[test]
    fn platform_comes_from_target_name() {
        let config = CompilerConfig {
            target: "linux".into(),
            ..CompilerConfig::default()
        };
        assert_eq!(config.platform().unwrap().name, "x86_64-linux");
    }
}
