use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use regraft_core::plugin::{INPUT_DIMS, INPUT_NAME};
use thiserror::Error;

/// Engine-compiler configuration. The compiler itself is an external
/// collaborator; its resource limits are handed to it, not decided here.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// External compiler executable.
    pub compiler: PathBuf,
    pub max_workspace_size: u64,
    pub max_batch_size: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            compiler: PathBuf::from("uff2engine"),
            max_workspace_size: 1 << 28,
            max_batch_size: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineBuildError {
    #[error("Failed to run '{compiler}': {source}")]
    Spawn {
        compiler: String,
        source: std::io::Error,
    },

    #[error("Engine compiler exited with {0}")]
    CompilerFailed(std::process::ExitStatus),
}

/// Compiles the interchange file into a serialized engine. The front end is
/// registered with the one fixed-shape input and the designated output.
pub fn build_engine(
    uff: &Path,
    engine: &Path,
    output_node: &str,
    opts: &EngineOptions,
) -> Result<(), EngineBuildError> {
    let start = Instant::now();

    let [c, h, w] = INPUT_DIMS;
    let status = Command::new(&opts.compiler)
        .arg("--uff")
        .arg(uff)
        .arg("--engine")
        .arg(engine)
        .arg("--input")
        .arg(format!("{INPUT_NAME},{c},{h},{w}"))
        .arg("--output")
        .arg(output_node)
        .arg("--workspace")
        .arg(opts.max_workspace_size.to_string())
        .arg("--batch")
        .arg(opts.max_batch_size.to_string())
        .status()
        .map_err(|source| EngineBuildError::Spawn {
            compiler: opts.compiler.display().to_string(),
            source,
        })?;

    if !status.success() {
        return Err(EngineBuildError::CompilerFailed(status));
    }

    log::info!("build_engine: {:?}", start.elapsed());
    Ok(())
}
