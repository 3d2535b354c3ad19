//! 入力ツリーとスタディ判定
//!
//! 「サブフォルダを持たずファイルだけを含むフォルダ」を1スタディとみなす。
//! ファイルシステムに触れず、フォルダ一覧の抽象に対して判定する。

use std::path::PathBuf;

/// 1フォルダ分の一覧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub path: PathBuf,
    /// 直下のサブフォルダ数
    pub subdirs: usize,
    /// 直下のファイル
    pub files: Vec<PathBuf>,
}

/// スタディフォルダ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyDir {
    pub path: PathBuf,
    /// ファイル名順
    pub files: Vec<PathBuf>,
}

/// 入力パスの構成
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLayout {
    /// 単一ファイル（親フォルダをスタディとして扱う）
    SingleFile { study: PathBuf, file: PathBuf },
    /// スタディを含むフォルダツリー
    Tree { studies: Vec<StudyDir> },
}

impl InputLayout {
    /// スタディ数
    pub fn study_count(&self) -> usize {
        match self {
            InputLayout::SingleFile { .. } => 1,
            InputLayout::Tree { studies } => studies.len(),
        }
    }
}

pub fn is_study(listing: &DirListing) -> bool {
    listing.subdirs == 0 && !listing.files.is_empty()
}

/// フォルダ一覧からスタディを抽出（入力順を保つ）
pub fn detect_studies<I>(listings: I) -> Vec<StudyDir>
where
    I: IntoIterator<Item = DirListing>,
{
    listings
        .into_iter()
        .filter(is_study)
        .map(|listing| {
            let mut files = listing.files;
            files.sort();
            StudyDir {
                path: listing.path,
                files,
            }
        })
        .collect()
}
