//! Loading [`SessionConfig`] from disk.

use std::path::Path;

use gamelink_session::SessionConfig;
use tracing::debug;

use crate::GamelinkError;

/// Reads a JSON session config. Missing fields take their defaults and
/// out-of-range values are clamped.
///
/// ```json
/// { "routing_id": "shard-3", "transport": { "max_retries": 5 } }
/// ```
///
/// # Errors
/// [`GamelinkError::Io`] if the file can't be read,
/// [`GamelinkError::Config`] if it isn't a valid config document.
pub fn load_config(path: impl AsRef<Path>) -> Result<SessionConfig, GamelinkError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let config: SessionConfig = serde_json::from_str(&text)?;
    debug!(path = %path.display(), "loaded session config");
    Ok(config.validated())
}
