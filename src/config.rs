use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    guides::Guides,
};

/// Client configuration, read from a TOML file.
///
/// Every field is optional:
///
/// ```toml
/// filter = ""
/// notification_capacity = 64
///
/// [guides]
/// collections = ["album_artist", "year_album", "title"]
/// playbar = ["playlist", "track"]
/// queue = ["track"]
/// queries = ["initial", "name"]
/// perspective = ["name"]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Filter applied to every domain until the rendering layer sets one.
    pub filter: String,

    /// Capacity of the notification queue to the rendering context.
    pub notification_capacity: usize,

    pub guides: Guides,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filter: String::new(),
            notification_capacity: Self::DEFAULT_NOTIFICATION_CAPACITY,
            guides: Guides::default(),
        }
    }
}

impl Config {
    const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

    /// Parses a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the TOML is malformed, names an unknown
    /// grouping key, or sets a zero notification capacity.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(toml)?;
        if config.notification_capacity == 0 {
            return Err(Error::invalid_argument(
                "notification capacity must be greater than zero",
            ));
        }

        config.guides = config.guides.or_default();
        trace!("config: {config:?}");
        Ok(config)
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist, or any error of
    /// [`Config::from_toml`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        debug!("read configuration from {}", path.display());
        Self::from_toml(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, guides::TrackKey};

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn reads_guides_by_name() {
        let config = Config::from_toml(
            r#"
            filter = "jazz"

            [guides]
            collections = ["genre", "artist", "title"]
            queue = []
            "#,
        )
        .unwrap();

        assert_eq!(config.filter, "jazz");
        assert_eq!(
            config.guides.collections,
            [TrackKey::Genre, TrackKey::Artist, TrackKey::Title]
        );
        assert_eq!(config.guides.queue, Guides::default().queue);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml("[guides]\ncollections = [\"mood\"]").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = Config::from_toml("notification_capacity = 0").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = Config::from_file("/nonexistent/quaver.toml").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
