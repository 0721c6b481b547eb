#![allow(dead_code)]

use catimg_core::storage::{CategoryRecord, CategoryRepository, Database};
use catimg_core::{AppConfig, Error, FileStore};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const ID_A: &str = "507f1f77bcf86cd799439011";
pub const ID_B: &str = "507f1f77bcf86cd799439012";
pub const ID_C: &str = "507f1f77bcf86cd799439013";
pub const ID_D: &str = "507f1f77bcf86cd799439014";

pub struct Fixture {
    pub dir: TempDir,
    pub store: FileStore,
    pub db: Database,
    pub config: AppConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::default().with_images_dir(dir.path());
        let store = FileStore::from_config(&config);
        let db = Database::open_in_memory().unwrap();
        Fixture {
            dir,
            store,
            db,
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, content: &[u8]) {
        fs::write(self.root().join(name), content).unwrap();
    }

    pub fn exists(&self, name: &str) -> bool {
        self.root().join(name).is_file()
    }

    pub fn category(&self, id: &str, image_path: Option<&str>) {
        self.db
            .insert_category(&CategoryRecord::new(id, image_path))
            .unwrap();
    }

    pub fn image_path_of(&self, id: &str) -> Option<String> {
        self.db.get_category(id).unwrap().unwrap().image_path
    }

    pub fn backup_files(&self) -> Vec<String> {
        let dir = self.store.backup_dir();
        if !dir.is_dir() {
            return Vec::new();
        }
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn unique_name(id: &str, ts: u64, nonce: u32, ext: &str) -> String {
    format!("cat_{}_{}_{}.{}", id, ts, nonce, ext)
}

/// Repository whose writes always fail, to exercise the rename/update window.
pub struct ReadOnlyRepo<'a>(pub &'a Database);

impl CategoryRepository for ReadOnlyRepo<'_> {
    fn find_all(&self) -> Result<Vec<CategoryRecord>, Error> {
        self.0.find_all()
    }

    fn update_image_path(&self, _id: &str, _image_path: Option<&str>) -> Result<(), Error> {
        Err(Error::Other("database is read-only".to_string()))
    }
}
