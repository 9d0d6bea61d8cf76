//! Where the engine keeps its settings and its models.
//!
//! Two roots, each a `translations-engine` directory under a base the `dirs`
//! crate provides (`config_dir` for settings, `data_local_dir` for models).
//! The current directory stands in for a base the platform cannot name.
//!
//! ```text
//! <config root>/settings.toml
//! <data root>/models/translator.wasm     runtime binary (ModelsConfig::runtime_file)
//! <data root>/models/en-fr/...           one directory per LanguagePair::key()
//! ```

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePaths {
    config_root: PathBuf,
    data_root: PathBuf,
}

impl EnginePaths {
    const DIR_NAME: &'static str = "translations-engine";

    /// Roots for the current user on this platform.
    pub fn platform() -> Self {
        Self::under(dirs::config_dir(), dirs::data_local_dir())
    }

    /// Roots below explicit bases; `None` means the current directory.
    pub fn under(config_base: Option<PathBuf>, data_base: Option<PathBuf>) -> Self {
        let root = |base: Option<PathBuf>| {
            base.unwrap_or_else(|| PathBuf::from("."))
                .join(Self::DIR_NAME)
        };
        Self {
            config_root: root(config_base),
            data_root: root(data_base),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_root
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_root.join("settings.toml")
    }

    /// Default root of the models tree when `[models] directory` is unset.
    pub fn models_dir(&self) -> PathBuf {
        self.data_root.join("models")
    }
}

impl Default for EnginePaths {
    fn default() -> Self {
        Self::platform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_below_explicit_bases() {
        let paths = EnginePaths::under(Some(PathBuf::from("/etc/u")), Some(PathBuf::from("/var/u")));
        assert_eq!(paths.config_dir(), Path::new("/etc/u/translations-engine"));
        assert_eq!(
            paths.settings_file(),
            PathBuf::from("/etc/u/translations-engine/settings.toml")
        );
        assert_eq!(
            paths.models_dir(),
            PathBuf::from("/var/u/translations-engine/models")
        );
    }

    #[test]
    fn missing_base_falls_back_to_current_dir() {
        let paths = EnginePaths::under(None, None);
        assert_eq!(paths.models_dir(), Path::new(".").join("translations-engine").join("models"));
    }

    #[test]
    fn platform_paths_keep_the_file_names() {
        let paths = EnginePaths::platform();
        assert!(paths.settings_file().ends_with("translations-engine/settings.toml"));
        assert!(paths.models_dir().ends_with("models"));
    }
}
