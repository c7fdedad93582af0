//! Extraction of a module from a gzip-compressed tarball.

use std::io::Read;

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::debug;

use playground_common::ModuleError;

/// Decompress `bytes` and return the contents of the first regular entry
/// whose file name is `filename`, wherever it sits in the archive tree.
///
/// Registry tarballs nest everything under a top-level `package/` directory,
/// so only the last path component is compared.
pub fn extract_entry(bytes: &[u8], archive: &str, filename: &str) -> Result<Vec<u8>, ModuleError> {
    let mut tar = Archive::new(GzDecoder::new(bytes));
    let entries = tar
        .entries()
        .map_err(|e| ModuleError::unpack(archive, e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ModuleError::unpack(archive, e.to_string()))?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| ModuleError::unpack(archive, e.to_string()))?
            .into_owned();
        if path.file_name().and_then(|n| n.to_str()) != Some(filename) {
            continue;
        }

        let mut contents = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry
            .read_to_end(&mut contents)
            .map_err(|e| ModuleError::unpack(archive, e.to_string()))?;

        debug!(
            archive,
            entry = %path.display(),
            bytes = contents.len(),
            "Module extracted from archive"
        );
        return Ok(contents);
    }

    Err(ModuleError::missing_entry(archive, filename))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Build a `.tgz` holding the given `(path, bytes)` entries.
    pub(crate) fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_extracts_nested_entry() {
        let bytes = tarball(&[
            ("package/package.json", b"{}"),
            ("package/tsgo.wasm", b"\0asm\x01\0\0\0"),
        ]);

        let module = extract_entry(&bytes, "pkg.tgz", "tsgo.wasm").unwrap();
        assert_eq!(module, b"\0asm\x01\0\0\0");
    }

    #[test]
    fn test_missing_entry() {
        let bytes = tarball(&[("package/README.md", b"hi")]);

        let err = extract_entry(&bytes, "pkg.tgz", "tsgo.wasm").unwrap_err();
        assert_eq!(err, ModuleError::missing_entry("pkg.tgz", "tsgo.wasm"));
    }

    #[test]
    fn test_name_match_is_exact() {
        let bytes = tarball(&[("package/tsgo.wasm.map", b"{}")]);

        let err = extract_entry(&bytes, "pkg.tgz", "tsgo.wasm").unwrap_err();
        assert!(matches!(err, ModuleError::Unpack { .. }));
    }

    #[test]
    fn test_not_gzip() {
        let err = extract_entry(b"plain text", "pkg.tgz", "tsgo.wasm").unwrap_err();
        assert!(matches!(err, ModuleError::Unpack { .. }));
    }
}
