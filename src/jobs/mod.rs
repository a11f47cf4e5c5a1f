//! Built-in jobs shipped with the engine.
//!
//! Core components:
//! - `echo` — smallest end-to-end example job
//! - `path_generation` — learning-path search over skill prerequisites
//! - `chunk_text` — text chunking for embedding ingestion

pub mod chunk_text;
pub mod echo;
pub mod path_generation;

pub use chunk_text::ChunkTextJob;
pub use echo::EchoJob;
pub use path_generation::PathGenerationJob;

use std::sync::Arc;

use crate::error::RegistryError;
use crate::registry::JobRegistry;

/// Register every built-in job.
pub fn register_builtin(registry: &mut JobRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(EchoJob))?;
    registry.register(Arc::new(PathGenerationJob))?;
    registry.register(Arc::new(ChunkTextJob))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_jobs_register_once() {
        let mut registry = JobRegistry::new();
        register_builtin(&mut registry).unwrap();
        assert_eq!(
            registry.names(),
            vec!["chunk-text", "echo", "path-generation"]
        );
    }
}
