//! Constants and path helpers.
//!
//! Centralizes the label scheme, data directory layout, and build-context
//! locations used throughout the crate.

use std::path::{Path, PathBuf};

/// Label key marking a container as managed by toolforge.
pub const MANAGED_LABEL_KEY: &str = "toolforge.managed";

/// Label value for [`MANAGED_LABEL_KEY`].
pub const MANAGED_LABEL_VALUE: &str = "true";

/// Label key recording which tool a managed container runs.
pub const TOOL_LABEL_KEY: &str = "toolforge.tool";

/// Configuration file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "toolforge.toml";

/// Directory (under the data root) holding per-instance volumes.
pub const DATA_DIR_NAME: &str = "data";

/// Directory (under the build-context root) holding per-tool Docker contexts.
pub const DOCKER_DIR_NAME: &str = "docker";

/// Build-context subdirectories, one per tool with a custom image.
pub mod build_context {
    /// Spark image build context
    pub const SPARK: &str = "spark";
    /// HBase image build context
    pub const HBASE: &str = "hbase";
}

/// The label filter expression selecting managed containers in runtime-side
/// listing.
pub fn managed_label_filter() -> String {
    format!("{}={}", MANAGED_LABEL_KEY, MANAGED_LABEL_VALUE)
}

/// Host volume path for an instance, derived from its container name.
pub fn volume_path(data_root: &Path, container_name: &str) -> PathBuf {
    data_root.join(DATA_DIR_NAME).join(container_name)
}

/// Build-context path for a tool's custom image.
pub fn build_context_path(context_root: &Path, tool_dir: &str) -> PathBuf {
    context_root.join(DOCKER_DIR_NAME).join(tool_dir)
}
