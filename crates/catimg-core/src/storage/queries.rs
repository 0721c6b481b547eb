use super::models::CategoryRecord;
use super::sqlite::Database;
use rusqlite::{params, OptionalExtension, Result, Row};

fn category_from_row(row: &Row<'_>) -> Result<CategoryRecord> {
    Ok(CategoryRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        image_path: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

impl Database {
    pub fn find_all_categories(&self) -> Result<Vec<CategoryRecord>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, name, image_path, updated_at FROM categories ORDER BY id",
        )?;
        let records = stmt
            .query_map([], category_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn get_category(&self, id: &str) -> Result<Option<CategoryRecord>> {
        self.connection()
            .query_row(
                "SELECT id, name, image_path, updated_at FROM categories WHERE id = ?1",
                params![id],
                category_from_row,
            )
            .optional()
    }

    pub fn insert_category(&self, record: &CategoryRecord) -> Result<()> {
        self.connection().execute(
            "INSERT INTO categories (id, name, image_path, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![record.id, record.name, record.image_path, record.updated_at],
        )?;
        Ok(())
    }

    /// Set one category's image path. Returns the number of rows changed.
    pub fn update_category_image(&self, id: &str, image_path: Option<&str>) -> Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE categories SET image_path = ?1, updated_at = ?2 WHERE id = ?3",
            params![image_path, now, id],
        )
    }
}
