//! 入力パスの走査
//!
//! 単一ファイルならその親フォルダをスタディとし、フォルダなら
//! 「ファイルのみを含むフォルダ」をスタディとして列挙する。

use crate::error::{DeployError, Result};
use mammo_deploy_common::{detect_studies, DirListing, IdentityMap, InputLayout};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 入力パスを解析
///
/// パスは実パス（シンボリックリンク解決済み）に正規化される。
/// トークンはこの正規化後の文字列から計算される。
pub fn scan_input(input: &Path) -> Result<InputLayout> {
    if !input.exists() {
        return Err(DeployError::InputNotFound(input.display().to_string()));
    }
    let input = input.canonicalize()?;

    if input.is_file() {
        let study = input
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| DeployError::InputNotFound(input.display().to_string()))?;
        return Ok(InputLayout::SingleFile { study, file: input });
    }

    let listings = list_directories(&input)?;
    Ok(InputLayout::Tree {
        studies: detect_studies(listings),
    })
}

/// 入力パスから対応表を作り直す
pub fn build_identity_map(input: &Path) -> Result<IdentityMap> {
    let layout = scan_input(input)?;
    Ok(IdentityMap::from_layout(&layout)?)
}

/// フォルダごとの直下一覧（名前順）
fn list_directories(root: &Path) -> Result<Vec<DirListing>> {
    let mut listings = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        let mut subdirs = 0;
        let mut files: Vec<PathBuf> = Vec::new();

        for child in std::fs::read_dir(entry.path())? {
            let child = child?;
            let path = child.path();
            if path.is_dir() {
                subdirs += 1;
            } else if path.is_file() {
                files.push(path);
            }
        }

        listings.push(DirListing {
            path: entry.path().to_path_buf(),
            subdirs,
            files,
        });
    }

    Ok(listings)
}
