//! Category image filename codec.
//!
//! Unique names tie a file to the category that owns it:
//!
//! ```text
//! cat_<24-hex-id>_<millis>_<nonce>.<ext>     current
//! cat_<24-hex-id>_<millis>.<ext>             accepted, written by older uploads
//! <anything>_<millis>.<ext>                  legacy, needs migration
//! ```

use crate::error::Error;
use rand::Rng;
use std::path::Path;
use std::sync::Mutex;

const PREFIX: &str = "cat_";
const OBJECT_ID_LEN: usize = 24;
const NONCE_RANGE: std::ops::Range<u64> = 100_000..1_000_000;

/// Names handed out during the current millisecond. Cleared when the clock moves.
static ISSUED: Mutex<(u64, Vec<String>)> = Mutex::new((0, Vec::new()));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueName {
    pub category_id: String,
    pub timestamp: u64,
    /// `None` for names written before the random suffix was introduced.
    pub nonce: Option<u64>,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyName {
    pub stem: String,
    pub timestamp: u64,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageName {
    Unique(UniqueName),
    Legacy(LegacyName),
    Unrecognized,
}

impl ImageName {
    pub fn parse(filename: &str) -> ImageName {
        let Some((stem, extension)) = split_extension(filename) else {
            return ImageName::Unrecognized;
        };

        if let Some(unique) = parse_unique(stem, extension) {
            return ImageName::Unique(unique);
        }

        match stem.rsplit_once('_') {
            Some((head, ts)) if !head.is_empty() => match parse_digits(ts) {
                Some(timestamp) => ImageName::Legacy(LegacyName {
                    stem: head.to_string(),
                    timestamp,
                    extension: extension.to_string(),
                }),
                None => ImageName::Unrecognized,
            },
            _ => ImageName::Unrecognized,
        }
    }

    pub fn category_id(&self) -> Option<&str> {
        match self {
            ImageName::Unique(u) => Some(&u.category_id),
            _ => None,
        }
    }
}

fn split_extension(filename: &str) -> Option<(&str, &str)> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((stem, ext))
}

fn parse_unique(stem: &str, extension: &str) -> Option<UniqueName> {
    let rest = stem.strip_prefix(PREFIX)?;
    let mut parts = rest.split('_');
    let id = parts.next()?;
    let timestamp = parse_digits(parts.next()?)?;
    let nonce = match parts.next() {
        Some(n) => Some(parse_digits(n)?),
        None => None,
    };
    if parts.next().is_some() || !is_object_id(id) {
        return None;
    }
    Some(UniqueName {
        category_id: id.to_string(),
        timestamp,
        nonce,
        extension: extension.to_string(),
    })
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// A 24 character lowercase hex identifier.
pub fn is_object_id(id: &str) -> bool {
    id.len() == OBJECT_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Build `cat_<id>_<millis>_<nonce>.<ext>` for a category.
///
/// Two calls inside the same millisecond never return the same name.
pub fn generate(category_id: &str, original_extension: &str) -> Result<String, Error> {
    if !is_object_id(category_id) {
        return Err(Error::InvalidCategoryId(category_id.to_string()));
    }
    let extension = normalize_extension(original_extension)?;
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;

    let mut issued = ISSUED.lock().unwrap_or_else(|e| e.into_inner());
    if issued.0 != now {
        issued.0 = now;
        issued.1.clear();
    }

    let mut rng = rand::rng();
    loop {
        let nonce = rng.random_range(NONCE_RANGE);
        let name = format!("{}{}_{}_{}.{}", PREFIX, category_id, now, nonce, extension);
        if !issued.1.contains(&name) {
            issued.1.push(name.clone());
            return Ok(name);
        }
    }
}

fn normalize_extension(ext: &str) -> Result<String, Error> {
    let ext = ext.trim().trim_start_matches('.');
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Other(format!("Invalid file extension '{}'", ext)));
    }
    Ok(ext.to_ascii_lowercase())
}

/// Extension of `filename` without the dot, if it has one.
pub fn extension_of(filename: &str) -> Option<&str> {
    Path::new(filename).extension().and_then(|e| e.to_str())
}

pub fn is_unique_format(filename: &str) -> bool {
    matches!(ImageName::parse(filename), ImageName::Unique(_))
}

pub fn extract_category_id(filename: &str) -> Option<String> {
    match ImageName::parse(filename) {
        ImageName::Unique(u) => Some(u.category_id),
        _ => None,
    }
}

pub fn is_legacy_format(filename: &str) -> bool {
    matches!(ImageName::parse(filename), ImageName::Legacy(_))
}

/// Last `/`-separated segment of a stored image path.
pub fn filename_from_image_path(image_path: &str) -> &str {
    image_path.rsplit('/').next().unwrap_or(image_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "507f1f77bcf86cd799439011";

    #[test]
    fn test_generated_name_round_trips() {
        let name = generate(ID, "jpg").unwrap();
        assert!(is_unique_format(&name));
        assert_eq!(extract_category_id(&name).as_deref(), Some(ID));
        assert!(!is_legacy_format(&name));
    }

    #[test]
    fn test_rapid_generation_never_collides() {
        let names: Vec<String> = (0..500).map(|_| generate(ID, ".png").unwrap()).collect();
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());
    }

    #[test]
    fn test_names_from_the_same_millisecond_differ() {
        let timestamp = |name: &str| match ImageName::parse(name) {
            ImageName::Unique(u) => u.timestamp,
            other => panic!("unexpected parse: {:?}", other),
        };

        let mut previous = generate(ID, "png").unwrap();
        for _ in 0..100_000 {
            let next = generate(ID, "png").unwrap();
            if timestamp(&next) == timestamp(&previous) {
                assert_ne!(next, previous);
                return;
            }
            previous = next;
        }
        panic!("no two names were generated within the same millisecond");
    }

    #[test]
    fn test_generate_rejects_bad_ids_and_extensions() {
        assert!(matches!(
            generate("not-an-id", "jpg"),
            Err(Error::InvalidCategoryId(_))
        ));
        assert!(generate(ID, "").is_err());
        assert!(generate(ID, "j/pg").is_err());
        assert!(generate(ID, ".JPEG").unwrap().ends_with(".jpeg"));
    }

    #[test]
    fn test_parse_both_unique_grammars() {
        let with_nonce = format!("cat_{}_1700000000000_123456.jpg", ID);
        let without_nonce = format!("cat_{}_1700000000000.webp", ID);

        match ImageName::parse(&with_nonce) {
            ImageName::Unique(u) => {
                assert_eq!(u.category_id, ID);
                assert_eq!(u.timestamp, 1_700_000_000_000);
                assert_eq!(u.nonce, Some(123_456));
                assert_eq!(u.extension, "jpg");
            }
            other => panic!("unexpected parse: {:?}", other),
        }
        match ImageName::parse(&without_nonce) {
            ImageName::Unique(u) => assert_eq!(u.nonce, None),
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_legacy_and_unrecognized_names() {
        assert!(is_legacy_format("pizza_1699999999999.jpg"));
        assert!(is_legacy_format("image-upload_42.png"));
        // Short id falls back to the legacy grammar.
        assert!(is_legacy_format("cat_abc_1700000000000.jpg"));
        assert!(!is_unique_format("cat_abc_1700000000000.jpg"));

        assert_eq!(ImageName::parse("pizza.jpg"), ImageName::Unrecognized);
        assert_eq!(ImageName::parse("_123.jpg"), ImageName::Unrecognized);
        assert_eq!(ImageName::parse("noext_123"), ImageName::Unrecognized);
        assert_eq!(extract_category_id("pizza.jpg"), None);
    }

    #[test]
    fn test_uppercase_or_extra_segments_are_not_unique() {
        let upper = format!("cat_{}_1700000000000_1.jpg", ID.to_uppercase());
        assert!(!is_unique_format(&upper));
        let extra = format!("cat_{}_1700000000000_1_2.jpg", ID);
        assert!(!is_unique_format(&extra));
    }

    #[test]
    fn test_filename_from_image_path() {
        assert_eq!(filename_from_image_path("/images/a.jpg"), "a.jpg");
        assert_eq!(filename_from_image_path("a.jpg"), "a.jpg");
    }
}
