use crate::error::Error;
use crate::storage::{CategoryRecord, CategoryRepository};
use std::collections::{HashMap, HashSet};

/// Read side of the category collection. Every call goes back to the
/// repository; nothing is cached between scans.
pub struct RecordIndex<'a> {
    repo: &'a dyn CategoryRepository,
}

impl<'a> RecordIndex<'a> {
    pub fn new(repo: &'a dyn CategoryRepository) -> Self {
        Self { repo }
    }

    pub fn load_all(&self) -> Result<Vec<CategoryRecord>, Error> {
        self.repo.find_all()
    }

    pub fn referenced_filenames(&self) -> Result<HashSet<String>, Error> {
        Ok(referenced_filenames(&self.load_all()?))
    }
}

pub fn referenced_filenames(records: &[CategoryRecord]) -> HashSet<String> {
    records
        .iter()
        .filter_map(|r| r.image_filename())
        .map(str::to_string)
        .collect()
}

/// filename -> ids of every record pointing at it.
pub fn owners_by_filename(records: &[CategoryRecord]) -> HashMap<String, Vec<String>> {
    let mut owners: HashMap<String, Vec<String>> = HashMap::new();
    for record in records {
        if let Some(filename) = record.image_filename() {
            owners
                .entry(filename.to_string())
                .or_default()
                .push(record.id.clone());
        }
    }
    owners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_referenced_filenames_skips_unset_paths() {
        let db = Database::open_in_memory().unwrap();
        db.insert_category(&CategoryRecord::new("a", Some("/images/a.jpg")))
            .unwrap();
        db.insert_category(&CategoryRecord::new("b", None)).unwrap();
        db.insert_category(&CategoryRecord::new("c", Some("c.png")))
            .unwrap();

        let index = RecordIndex::new(&db);
        let referenced = index.referenced_filenames().unwrap();
        assert_eq!(referenced.len(), 2);
        assert!(referenced.contains("a.jpg"));
        assert!(referenced.contains("c.png"));
    }

    #[test]
    fn test_owners_by_filename_groups_shared_images() {
        let records = vec![
            CategoryRecord::new("a", Some("/images/shared.jpg")),
            CategoryRecord::new("b", Some("/images/shared.jpg")),
            CategoryRecord::new("c", Some("/images/own.jpg")),
        ];
        let owners = owners_by_filename(&records);
        assert_eq!(owners["shared.jpg"], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(owners["own.jpg"], vec!["c".to_string()]);
    }
}
