//! Filesystem layer archives.
//!
//! A layer is a tar archive of a root filesystem, optionally gzip-compressed.
//! Compression is detected from the archive's leading bytes, since image
//! archives are always named `<image>.tar`.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use hutch_common::error::{HutchError, Result};

/// Magic bytes that open every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Summary of an unpacked layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    /// Size of the archive in bytes.
    pub size_bytes: u64,
    /// Whether the archive was gzip-compressed.
    pub compressed: bool,
}

/// Extracts a tar archive (plain or gzip) into the target directory.
///
/// The target directory is created if it does not exist.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened or unpacked.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<Layer> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting layer"
    );

    let compressed = is_gzip_archive(archive_path)?;
    let file = File::open(archive_path).map_err(|e| HutchError::io(archive_path, e))?;
    let size_bytes = file
        .metadata()
        .map_err(|e| HutchError::io(archive_path, e))?
        .len();

    std::fs::create_dir_all(target).map_err(|e| HutchError::io(target, e))?;

    let reader = BufReader::new(file);
    let unpacked = if compressed {
        unpack(tar::Archive::new(GzDecoder::new(reader)), target)
    } else {
        unpack(tar::Archive::new(reader), target)
    };
    unpacked.map_err(|e| HutchError::io(target, e))?;

    tracing::info!(size = size_bytes, compressed, "layer extracted");
    Ok(Layer {
        size_bytes,
        compressed,
    })
}

/// Packs the contents of `source` into a gzip-compressed tar at `archive_path`.
///
/// Entries are stored relative to `source`, so extracting the archive
/// recreates the directory's contents at the extraction root. Symlinks are
/// stored as links.
///
/// # Errors
///
/// Returns an error if the archive cannot be created or a file cannot be read.
pub fn pack_layer(source: &Path, archive_path: &Path) -> Result<()> {
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HutchError::io(parent, e))?;
    }
    let file = File::create(archive_path).map_err(|e| HutchError::io(archive_path, e))?;

    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder
        .append_dir_all(".", source)
        .map_err(|e| HutchError::io(source, e))?;
    let encoder = builder
        .into_inner()
        .map_err(|e| HutchError::io(archive_path, e))?;
    let _ = encoder
        .finish()
        .map_err(|e| HutchError::io(archive_path, e))?;

    tracing::info!(
        source = %source.display(),
        archive = %archive_path.display(),
        "layer packed"
    );
    Ok(())
}

fn unpack<R: Read>(mut archive: tar::Archive<R>, target: &Path) -> std::io::Result<()> {
    archive.set_preserve_permissions(true);
    archive.unpack(target)
}

/// Determines whether the archive is gzip-compressed from its magic bytes.
fn is_gzip_archive(path: &Path) -> Result<bool> {
    let mut file = File::open(path).map_err(|e| HutchError::io(path, e))?;
    let mut magic = [0_u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(HutchError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn append_file<W: std::io::Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, data)
            .expect("failed to append data");
    }

    fn create_test_tar(dir: &Path) -> PathBuf {
        let tar_path = dir.join("busybox.tar");
        let file = File::create(&tar_path).expect("failed to create tar file");
        let mut builder = tar::Builder::new(file);
        append_file(&mut builder, "hello.txt", b"hello from layer");
        builder.finish().expect("failed to finish tar");
        tar_path
    }

    fn create_test_tar_gz(dir: &Path) -> PathBuf {
        // Named .tar on purpose: compression must be sniffed, not guessed.
        let tar_gz_path = dir.join("zipped.tar");
        let file = File::create(&tar_gz_path).expect("failed to create tar.gz");
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        append_file(&mut builder, "gzhello.txt", b"hello from gzipped layer");
        let encoder = builder.into_inner().expect("failed to finish encoder");
        let _ = encoder.finish().expect("failed to finish gzip");
        tar_gz_path
    }

    #[test]
    fn extract_plain_tar_creates_expected_files() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let tar_path = create_test_tar(dir.path());
        let target = dir.path().join("lower");

        let layer = extract_layer(&tar_path, &target).expect("extract failed");
        assert!(!layer.compressed);
        assert!(layer.size_bytes > 0);

        let content = std::fs::read_to_string(target.join("hello.txt")).expect("read failed");
        assert_eq!(content, "hello from layer");
    }

    #[test]
    fn extract_gzip_tar_is_detected_by_content() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let tar_gz_path = create_test_tar_gz(dir.path());
        let target = dir.path().join("lower_gz");

        let layer = extract_layer(&tar_gz_path, &target).expect("extract failed");
        assert!(layer.compressed);
        let content = std::fs::read_to_string(target.join("gzhello.txt")).expect("read failed");
        assert_eq!(content, "hello from gzipped layer");
    }

    #[test]
    fn extract_nonexistent_archive_returns_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let result = extract_layer(&dir.path().join("missing.tar"), &dir.path().join("out"));
        assert!(matches!(result, Err(HutchError::Io { .. })));
    }

    #[test]
    fn packed_directory_extracts_to_same_contents() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let merged = dir.path().join("merged");
        std::fs::create_dir_all(merged.join("etc")).expect("mkdir");
        std::fs::write(merged.join("etc/hostname"), "box").expect("write");

        let archive = dir.path().join("image/snapshot.tar");
        pack_layer(&merged, &archive).expect("pack failed");

        let out = dir.path().join("out");
        let layer = extract_layer(&archive, &out).expect("extract failed");
        assert!(layer.compressed);
        assert_eq!(
            std::fs::read_to_string(out.join("etc/hostname")).expect("read"),
            "box"
        );
    }
}
