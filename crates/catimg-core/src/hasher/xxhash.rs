use std::fmt;
use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, BufReader, Read};
use std::path::Path;
use twox_hash::XxHash64;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Content digest used for duplicate grouping. Not a security hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub u64);

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Stream a file through XxHash64 without loading it into memory.
pub fn hash_file(file: &Path) -> io::Result<ContentHash> {
    let f = File::open(file)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, f);
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.write(&buffer[..n]);
    }
    Ok(ContentHash(hasher.finish()))
}

pub fn hash_data(data: &[u8]) -> ContentHash {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    ContentHash(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_streaming_hash_matches_in_memory_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data: Vec<u8> = (0..(READ_BUFFER_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        File::create(&path).unwrap().write_all(&data).unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_data(&data));
    }

    #[test]
    fn test_display_is_fixed_width_hex() {
        assert_eq!(ContentHash(0xab).to_string(), "00000000000000ab");
    }
}
