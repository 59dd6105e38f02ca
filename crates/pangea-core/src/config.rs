//! Service configuration.
//!
//! One setting: where chat history lives on disk. There is deliberately no
//! file format, environment variable, or CLI flag here — *loading*
//! configuration into a `ServiceConfig` is the embedding application's job,
//! not this crate's.

use std::path::PathBuf;

const DEFAULT_SUBDIR: &str = ".pangea/communication";
const FALLBACK_DIR: &str = "/tmp/pangea";
const HISTORY_FILE_NAME: &str = "chat_history.json";

/// Configuration for one [`crate::service::CommunicationService`] instance.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Directory chat history is persisted under. `None` selects the
    /// platform default (`resolved_data_dir`).
    pub data_dir: Option<PathBuf>,
}

impl ServiceConfig {
    /// Resolves the directory history is persisted under: the configured
    /// `data_dir`, else `~/.pangea/communication`, else `/tmp/pangea` if the
    /// home directory cannot be determined.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        match dirs::home_dir() {
            Some(home) => home.join(DEFAULT_SUBDIR),
            None => PathBuf::from(FALLBACK_DIR),
        }
    }

    /// The full path to the chat history file under `resolved_data_dir`.
    pub fn history_path(&self) -> PathBuf {
        self.resolved_data_dir().join(HISTORY_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_data_dir_is_used_verbatim() {
        let config = ServiceConfig {
            data_dir: Some(PathBuf::from("/srv/pangea-data")),
        };
        assert_eq!(config.resolved_data_dir(), PathBuf::from("/srv/pangea-data"));
        assert_eq!(
            config.history_path(),
            PathBuf::from("/srv/pangea-data/chat_history.json")
        );
    }

    #[test]
    fn default_config_resolves_under_home_or_fallback() {
        let config = ServiceConfig::default();
        let resolved = config.resolved_data_dir();
        assert!(resolved.ends_with(".pangea/communication") || resolved == PathBuf::from(FALLBACK_DIR));
    }

    #[test]
    fn history_path_is_data_dir_joined_with_file_name() {
        let config = ServiceConfig {
            data_dir: Some(PathBuf::from("/data")),
        };
        assert_eq!(config.history_path(), PathBuf::from("/data/chat_history.json"));
    }
}
