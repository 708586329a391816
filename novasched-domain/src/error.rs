use thiserror::Error;

/// Error kinds from the error-handling design. Every non-`ExternalApi`
/// variant is a local, classified failure the caller is expected to branch
/// on; `ExternalApi` wraps whatever the resource store or compute API
/// collaborator returned, with context attached the way `anyhow` does at
/// call sites that don't need to pattern-match further.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("critical plugin init error in {plugin}: {reason}")]
    PluginInitCritical { plugin: String, reason: String },

    #[error("non-critical plugin init error in {plugin}: {reason}")]
    PluginInitNonCritical { plugin: String, reason: String },

    #[error("plugin {plugin} failed at runtime: {reason}")]
    PluginRuntime { plugin: String, reason: String },

    #[error("external collaborator error: {0}")]
    ExternalApi(#[from] anyhow::Error),

    #[error("pipeline not ready yet")]
    TransientNotReady,

    #[error("terminal validation failure: {0}")]
    TerminalValidationFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;
