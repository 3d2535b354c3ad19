//! 前処理ストア
//!
//! `<root>/<study_token>/study_metadata.json`
//! `<root>/<study_token>/<image_token>/frame_<n>.npy`

use crate::error::Result;
use mammo_deploy_common::{ImageMetadata, Token};
use ndarray::{Array3, Axis};
use ndarray_npy::write_npy;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

pub const METADATA_FILE_NAME: &str = "study_metadata.json";

#[derive(Debug, Clone)]
pub struct FrameStore {
    root: PathBuf,
}

impl FrameStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn study_dir(&self, study: &Token) -> PathBuf {
        self.root.join(study.as_str())
    }

    pub fn image_dir(&self, study: &Token, image: &Token) -> PathBuf {
        self.study_dir(study).join(image.as_str())
    }

    pub fn frame_path(&self, study: &Token, image: &Token, frame: usize) -> PathBuf {
        self.image_dir(study, image).join(format!("frame_{}.npy", frame))
    }

    /// 各フレームを単独の .npy として保存
    pub fn write_frames(&self, study: &Token, image: &Token, frames: &Array3<f32>) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(self.image_dir(study, image))?;

        let mut written = Vec::with_capacity(frames.len_of(Axis(0)));
        for (n, frame) in frames.outer_iter().enumerate() {
            let path = self.frame_path(study, image, n);
            write_npy(&path, &frame)?;
            written.push(path);
        }
        Ok(written)
    }

    /// スタディのメタデータ表を保存（空でも作成する）
    pub fn write_metadata(&self, study: &Token, rows: &[ImageMetadata]) -> Result<PathBuf> {
        let dir = self.study_dir(study);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(METADATA_FILE_NAME);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, rows)?;
        Ok(path)
    }

    pub fn read_metadata(&self, study: &Token) -> Result<Vec<ImageMetadata>> {
        let path = self.study_dir(study).join(METADATA_FILE_NAME);
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_frames_layout() {
        let dir = tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let study = Token::of("/in/s1");
        let image = Token::of("/in/s1/a.dcm");

        let frames = Array3::<f32>::zeros((3, 4, 5));
        let written = store.write_frames(&study, &image, &frames).unwrap();

        assert_eq!(written.len(), 3);
        for (n, path) in written.iter().enumerate() {
            assert!(path.exists());
            assert_eq!(path, &dir.path().join(study.as_str()).join(image.as_str()).join(format!("frame_{}.npy", n)));
        }
    }

    #[test]
    fn test_empty_metadata_table_is_written() {
        let dir = tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let study = Token::of("/in/s1");

        let path = store.write_metadata(&study, &[]).unwrap();
        assert!(path.ends_with(METADATA_FILE_NAME));
        assert!(store.read_metadata(&study).unwrap().is_empty());
    }
}
