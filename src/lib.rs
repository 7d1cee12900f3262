//! Builds music resource packs from local files, YouTube playlists or
//! Terraria resource packs.

pub mod api;
pub mod assembler;
pub mod config;
pub mod convert;
pub mod errors;
pub mod logging;
pub mod manifest;
pub mod naming;
pub mod processors;
pub mod sources;
pub mod template;
pub mod utils;

pub use assembler::{spawn_build, BuildCommand, BuildReport, BuildSource, BuildTask, CancelToken, PackAssembler, RunPhase};
pub use config::Settings;
pub use errors::{PackError, PackResult};
