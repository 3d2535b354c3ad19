//! トークン→元パスの対応表
//!
//! 結果を元のパスに戻すためにクライアント側だけで保持する。
//! 実行ごとに入力ツリーから作り直し、永続化しない。

use crate::error::{Error, Result};
use crate::token::Token;
use crate::tree::InputLayout;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    entries: BTreeMap<Token, PathBuf>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入力構成から対応表を構築
    ///
    /// 取り込みで実際に処理できたかどうかには依存しない。
    pub fn from_layout(layout: &InputLayout) -> Result<Self> {
        let mut map = Self::new();
        match layout {
            InputLayout::SingleFile { study, file } => {
                map.insert(study)?;
                map.insert(file)?;
            }
            InputLayout::Tree { studies } => {
                for study in studies {
                    map.insert(&study.path)?;
                    for file in &study.files {
                        map.insert(file)?;
                    }
                }
            }
        }
        Ok(map)
    }

    /// パスを登録してトークンを返す
    ///
    /// 別のパスが同じトークンを持つ場合は衝突としてエラー
    pub fn insert(&mut self, path: &Path) -> Result<Token> {
        let token = Token::of_path(path);
        if let Some(existing) = self.entries.get(&token) {
            if existing != path {
                return Err(Error::TokenCollision {
                    token: token.to_string(),
                    first: existing.display().to_string(),
                    second: path.display().to_string(),
                });
            }
            return Ok(token);
        }
        self.entries.insert(token.clone(), path.to_path_buf());
        Ok(token)
    }

    /// トークンから元パスを取得（見つからなければ整合性エラー）
    pub fn resolve(&self, token: &str) -> Result<&Path> {
        self.entries
            .get(token)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::UnknownToken(token.to_string()))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
