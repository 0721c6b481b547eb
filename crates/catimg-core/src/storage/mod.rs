pub mod models;
pub mod queries;
pub mod sqlite;

pub use models::CategoryRecord;
pub use sqlite::Database;

use crate::error::Error;

/// The category collection as seen by the integrity engine: read every
/// `{id, imagePath}` pair and rewrite one record's `imagePath`.
pub trait CategoryRepository {
    fn find_all(&self) -> Result<Vec<CategoryRecord>, Error>;
    fn update_image_path(&self, id: &str, image_path: Option<&str>) -> Result<(), Error>;
}

impl CategoryRepository for Database {
    fn find_all(&self) -> Result<Vec<CategoryRecord>, Error> {
        Ok(self.find_all_categories()?)
    }

    fn update_image_path(&self, id: &str, image_path: Option<&str>) -> Result<(), Error> {
        match self.update_category_image(id, image_path)? {
            0 => Err(Error::NotFound(format!("category {}", id))),
            _ => Ok(()),
        }
    }
}
