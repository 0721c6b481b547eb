pub mod walk;

pub use walk::{list_image_files, ImageFile};
