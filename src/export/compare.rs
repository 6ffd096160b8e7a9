//! Content comparison of export files.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::error::Result;

/// Entries whose content changes on every save (creation time and the like).
const VOLATILE_PREFIXES: [&str; 1] = ["docProps/"];

pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let (ma, mb) = (std::fs::metadata(a)?, std::fs::metadata(b)?);
    if ma.len() != mb.len() {
        return Ok(false);
    }
    Ok(std::fs::read(a)? == std::fs::read(b)?)
}

fn zip_entries(path: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if VOLATILE_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        entries.insert(name, content);
    }
    Ok(entries)
}

/// Compare two zip archives entry by entry, ignoring entry metadata, order
/// and document properties.
pub fn zip_contents_identical(a: &Path, b: &Path) -> Result<bool> {
    Ok(zip_entries(a)? == zip_entries(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_files_identical() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, c) = (dir.path().join("a"), dir.path().join("b"), dir.path().join("c"));
        std::fs::write(&a, "x,y\n").unwrap();
        std::fs::write(&b, "x,y\n").unwrap();
        std::fs::write(&c, "x,z\n").unwrap();
        assert!(files_identical(&a, &b).unwrap());
        assert!(!files_identical(&a, &c).unwrap());
        assert!(files_identical(&a, &dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_zip_ignores_order_and_doc_props() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, c) = (dir.path().join("a.zip"), dir.path().join("b.zip"), dir.path().join("c.zip"));
        write_zip(&a, &[("xl/sheet.xml", "rows"), ("docProps/core.xml", "t=1")]);
        write_zip(&b, &[("docProps/core.xml", "t=2"), ("xl/sheet.xml", "rows")]);
        write_zip(&c, &[("xl/sheet.xml", "other rows"), ("docProps/core.xml", "t=1")]);
        assert!(zip_contents_identical(&a, &b).unwrap());
        assert!(!zip_contents_identical(&a, &c).unwrap());
    }

    /// Overwrite the little-endian u32 at `offset` past every `signature`.
    fn patch_after(bytes: &mut [u8], signature: &[u8; 4], offset: usize, value: u32) {
        let starts: Vec<usize> = bytes
            .windows(4)
            .enumerate()
            .filter(|(_, w)| *w == &signature[..])
            .map(|(i, _)| i)
            .collect();
        for start in starts {
            bytes[start + offset..start + offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    #[test]
    fn test_declared_entry_size_is_not_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let (good, corrupt) = (dir.path().join("good.zip"), dir.path().join("corrupt.zip"));
        let file = std::fs::File::create(&good).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("xl/sheet.xml", stored).unwrap();
        zip.write_all(b"rows").unwrap();
        zip.finish().unwrap();

        // Declare a ~4 GiB uncompressed size in both local and central headers.
        let mut bytes = std::fs::read(&good).unwrap();
        patch_after(&mut bytes, b"PK\x03\x04", 22, 0xFFFF_FFF0);
        patch_after(&mut bytes, b"PK\x01\x02", 24, 0xFFFF_FFF0);
        std::fs::write(&corrupt, bytes).unwrap();

        // Either outcome is fine; reading must not reserve the declared size.
        let _ = zip_contents_identical(&corrupt, &good);
        assert!(zip_contents_identical(&good, &good).unwrap());
    }
}
