//! Build metadata.

use serde::Serialize;

use crate::config::BuildConfig;

/// Version, commit and build date of the running binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: String,
    pub commit: String,
    pub date: String,
}

impl BuildInfo {
    /// Metadata baked in at compile time.
    ///
    /// `EREBUS_COMMIT` and `EREBUS_BUILD_DATE` are read from the build environment.
    pub fn from_build_env() -> Self {
        Self {
            version: format!("v{}", env!("CARGO_PKG_VERSION")),
            commit: option_env!("EREBUS_COMMIT").unwrap_or("dev").to_string(),
            date: option_env!("EREBUS_BUILD_DATE").unwrap_or("unknown").to_string(),
        }
    }

    /// Compile-time metadata with configured overrides applied.
    pub fn with_overrides(config: &BuildConfig) -> Self {
        let mut info = Self::from_build_env();
        if let Some(version) = &config.version {
            info.version = version.clone();
        }
        info
    }
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::from_build_env()
    }
}
