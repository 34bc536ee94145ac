//! External tool registry, resolution and version probing
//!
//! ## Module Organization
//!
//! - `platform` - Host platform detection
//! - `spec` - Which tools exist and where each one is downloaded from
//! - `locator` - Managed dir → fallback → PATH resolution
//! - `version` - Installed version probing
//! - `release` - Latest upstream release lookup

mod locator;
mod platform;
mod release;
mod spec;
mod version;

pub use locator::{BinaryLocator, BinaryStatus, InstalledBinary, ResolvedFrom};
pub use platform::{Arch, Platform, host_executable_name};
pub use release::{LatestVersions, latest_versions};
pub use spec::{ArchiveLayout, TOOLS, Tool, ToolSpec};
pub use version::{BinaryVersions, binary_versions, tool_version};
