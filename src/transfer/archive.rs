//! 前処理ストアのZIP化
//!
//! 上限サイズを超えた場合はアーカイブを削除してエラーにする。
//! 部分的なアップロードは行わない。

use crate::error::{DeployError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// ストア以下の全ファイルをZIPにまとめる
///
/// 返り値の一時ファイルはドロップ時に削除される。
pub fn package_store(store_root: &Path, scratch_dir: &Path, max_bytes: u64) -> Result<NamedTempFile> {
    let archive = tempfile::Builder::new()
        .suffix("_upload.zip")
        .tempfile_in(scratch_dir)?;

    {
        let mut zip = ZipWriter::new(BufWriter::new(archive.as_file()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9));

        for entry in WalkDir::new(store_root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let relative = entry.path().strip_prefix(store_root).unwrap_or(entry.path());
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");

            zip.start_file(name, options)?;
            let mut file = File::open(entry.path())?;
            std::io::copy(&mut file, &mut zip)?;
        }

        let mut writer = zip.finish()?;
        writer.flush()?;
    }

    let size = archive.as_file().metadata()?.len();
    if size > max_bytes {
        archive.close()?;
        return Err(DeployError::ArchiveTooLarge { size, limit: max_bytes });
    }

    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use zip::ZipArchive;

    #[test]
    fn test_archive_uses_store_relative_names() {
        let store = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        fs::create_dir_all(store.path().join("aaaa1111/bbbb2222")).unwrap();
        fs::write(store.path().join("aaaa1111/study_metadata.json"), b"[]").unwrap();
        fs::write(store.path().join("aaaa1111/bbbb2222/frame_0.npy"), b"npy").unwrap();

        let archive = package_store(store.path(), scratch.path(), u64::MAX).unwrap();
        assert!(archive.path().to_string_lossy().ends_with("_upload.zip"));

        let mut zip = ZipArchive::new(File::open(archive.path()).unwrap()).unwrap();
        let mut names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["aaaa1111/bbbb2222/frame_0.npy", "aaaa1111/study_metadata.json"]
        );
    }

    #[test]
    fn test_archive_removed_when_dropped() {
        let store = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        fs::write(store.path().join("x.json"), b"[]").unwrap();

        let archive = package_store(store.path(), scratch.path(), u64::MAX).unwrap();
        let path = archive.path().to_path_buf();
        assert!(path.exists());
        drop(archive);
        assert!(!path.exists());
    }
}
