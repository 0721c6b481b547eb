use crate::naming;
use serde::{Deserialize, Serialize};

/// A category row. Only `id` and `image_path` matter to the integrity engine;
/// `name` and `updated_at` ride along so backups are readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "imagePath")]
    pub image_path: Option<String>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<String>,
}

impl CategoryRecord {
    pub fn new(id: &str, image_path: Option<&str>) -> Self {
        CategoryRecord {
            id: id.to_string(),
            name: String::new(),
            image_path: image_path.map(str::to_string),
            updated_at: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Filename component of `image_path`, `None` when no image is set.
    pub fn image_filename(&self) -> Option<&str> {
        self.image_path
            .as_deref()
            .map(naming::filename_from_image_path)
            .filter(|f| !f.is_empty())
    }

    /// `image_path` with its filename replaced, keeping any directory prefix.
    pub fn image_path_for(&self, filename: &str, default_prefix: &str) -> String {
        match self.image_path.as_deref().and_then(|p| p.rsplit_once('/')) {
            Some((prefix, _)) => format!("{}/{}", prefix, filename),
            None => format!("{}{}", default_prefix, filename),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_filename_strips_prefix() {
        let record = CategoryRecord::new("a", Some("/images/cat_x.jpg"));
        assert_eq!(record.image_filename(), Some("cat_x.jpg"));
        assert_eq!(CategoryRecord::new("a", None).image_filename(), None);
        assert_eq!(CategoryRecord::new("a", Some("/images/")).image_filename(), None);
    }

    #[test]
    fn test_image_path_for_keeps_existing_prefix() {
        let record = CategoryRecord::new("a", Some("/uploads/old.jpg"));
        assert_eq!(record.image_path_for("new.jpg", "/images/"), "/uploads/new.jpg");

        let bare = CategoryRecord::new("a", Some("old.jpg"));
        assert_eq!(bare.image_path_for("new.jpg", "/images/"), "/images/new.jpg");

        let unset = CategoryRecord::new("a", None);
        assert_eq!(unset.image_path_for("new.jpg", "/images/"), "/images/new.jpg");
    }
}
