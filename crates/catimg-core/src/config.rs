use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "svg", "avif"];

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub images_dir: PathBuf,
    pub database_path: PathBuf,
    pub public_prefix: String,
    pub backup_dir_name: String,
    pub backup_before_delete: bool,
    /// Count categories without any image as integrity issues.
    pub require_image: bool,
    pub query_timeout_ms: u64,
    pub image_extensions: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("./uploads/images"),
            database_path: PathBuf::from("./catimg.db"),
            public_prefix: "/images/".to_string(),
            backup_dir_name: ".backups".to_string(),
            backup_before_delete: true,
            require_image: false,
            query_timeout_ms: 5000,
            image_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AppConfig {
    pub fn with_images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.images_dir = dir.into();
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.images_dir.join(&self.backup_dir_name)
    }

    pub fn is_image_extension(&self, filename: &str) -> bool {
        match Path::new(filename).extension().and_then(|e| e.to_str()) {
            Some(ext) => self
                .image_extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// Load `Config.toml` (optional) overlaid with `CATIMG_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();
    let builder = Config::builder()
        .set_default("images_dir", defaults.images_dir.to_string_lossy().into_owned())?
        .set_default(
            "database_path",
            defaults.database_path.to_string_lossy().into_owned(),
        )?
        .set_default("public_prefix", defaults.public_prefix)?
        .set_default("backup_dir_name", defaults.backup_dir_name)?
        .set_default("backup_before_delete", defaults.backup_before_delete)?
        .set_default("require_image", defaults.require_image)?
        .set_default("query_timeout_ms", defaults.query_timeout_ms as i64)?
        .set_default("image_extensions", defaults.image_extensions)?
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("CATIMG")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("image_extensions"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_dir_is_inside_images_dir() {
        let config = AppConfig::default().with_images_dir("/srv/images");
        assert_eq!(config.backup_dir(), PathBuf::from("/srv/images/.backups"));
    }

    #[test]
    fn test_image_extension_is_case_insensitive() {
        let config = AppConfig::default();
        assert!(config.is_image_extension("cat_a.JPG"));
        assert!(config.is_image_extension("photo.webp"));
        assert!(!config.is_image_extension("notes.txt"));
        assert!(!config.is_image_extension("no_extension"));
    }
}
