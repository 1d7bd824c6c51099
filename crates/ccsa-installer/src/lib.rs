//! Transactional install/update/uninstall of managed binaries, agent
//! files, and editor configuration, with a rollback journal and a
//! persisted tracked-state file.

pub mod archive;
pub mod atomic;
pub mod error;
pub mod ignore_edit;
pub mod journal;
pub mod json_edit;
pub mod manager;
pub mod model;
pub mod paths;
pub mod traits;

pub use error::{InstallError, InstallResult};
pub use manager::{InstallOptions, InstallReport, InstallerManager};
pub use model::{
    GlobalInstall, IgnoreEdit, JsonEdits, LocalInstall, LocalMode, Managed, McpEdit, SettingsEdit,
    TrackedState,
};
pub use paths::{ConfigTarget, EnvOverrides, Paths};
pub use traits::{AttestationVerifier, Release, ReleaseAsset, ReleaseFetcher};
