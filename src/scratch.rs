//! 一時ファイルの管理
//!
//! 前処理フォルダと送信用ZIPは成功・失敗・中断のいずれでも削除する。
//! 利用者が前処理フォルダを指定した場合のみ残す。

use crate::error::{DeployError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Ctrl+C で削除すべきパスの登録簿
#[derive(Debug, Clone, Default)]
pub struct ScratchRegistry {
    paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScratchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: &Path) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.push(path.to_path_buf());
        }
    }

    pub fn unregister(&self, path: &Path) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.retain(|p| p != path);
        }
    }

    pub fn registered(&self) -> Vec<PathBuf> {
        self.paths.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// 登録済みのパスをすべて削除
    pub fn purge(&self) {
        let paths = match self.paths.lock() {
            Ok(mut paths) => std::mem::take(&mut *paths),
            Err(_) => return,
        };
        for path in paths {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => debug!("削除: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("一時ファイルを削除できませんでした {}: {}", path.display(), e),
            }
        }
    }
}

/// 前処理フォルダ
pub struct PreprocessDir {
    path: PathBuf,
    temp: Option<TempDir>,
    registry: ScratchRegistry,
}

impl PreprocessDir {
    /// 指定があればそのフォルダ（新規または空）を使い、なければ一時フォルダを作る
    pub fn create(requested: Option<&Path>, registry: &ScratchRegistry) -> Result<Self> {
        match requested {
            Some(dir) => {
                if dir.exists() {
                    let is_empty = dir.is_dir() && std::fs::read_dir(dir)?.next().is_none();
                    if !is_empty {
                        return Err(DeployError::PreprocessDirNotEmpty(dir.display().to_string()));
                    }
                } else {
                    std::fs::create_dir_all(dir)?;
                }
                Ok(Self {
                    path: dir.to_path_buf(),
                    temp: None,
                    registry: registry.clone(),
                })
            }
            None => {
                let temp = tempfile::Builder::new().prefix("preprocessed_").tempdir()?;
                let path = temp.path().to_path_buf();
                registry.register(&path);
                Ok(Self {
                    path,
                    temp: Some(temp),
                    registry: registry.clone(),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 実行後も残すか
    pub fn is_kept(&self) -> bool {
        self.temp.is_none()
    }
}

impl Drop for PreprocessDir {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            self.registry.unregister(temp.path());
            if let Err(e) = temp.close() {
                warn!("前処理フォルダを削除できませんでした {}: {}", self.path.display(), e);
            }
        }
    }
}
