//! パス仮名化トークン
//!
//! ファイル・フォルダのパス文字列から SHA-256 を計算し、
//! 先頭8文字の16進表記をサーバーに見せる唯一の識別子として使う。

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::fmt;
use std::path::Path;

/// トークン長（16進文字数）
pub const TOKEN_LEN: usize = 8;

/// パスから導出した不透明な識別子
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// 文字列のトークンを計算
    ///
    /// # Examples
    /// ```
    /// use mammo_deploy_common::Token;
    ///
    /// let token = Token::of("/data/study1");
    /// assert_eq!(token.as_str().len(), 8);
    /// assert_eq!(token, Token::of("/data/study1"));
    /// ```
    pub fn of(value: &str) -> Self {
        let digest = Sha256::digest(value.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(TOKEN_LEN);
        Token(hex)
    }

    /// パスのトークンを計算（非UTF-8部分は置換文字になる）
    pub fn of_path(path: &Path) -> Self {
        Self::of(&path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;

    #[test]
    fn test_token_known_value() {
        // sha256("abc") = ba7816bf...
        assert_eq!(Token::of("abc").as_str(), "ba7816bf");
    }

    #[test]
    fn test_token_is_lowercase_hex() {
        let token = Token::of("/mnt/data/patient/1.dcm");
        assert_eq!(token.as_str().len(), TOKEN_LEN);
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_token_of_path_matches_string() {
        let path = Path::new("/mnt/data/study");
        assert_eq!(Token::of_path(path), Token::of("/mnt/data/study"));
    }

    #[test]
    fn test_token_serializes_as_plain_string() {
        let token = Token::of("abc");
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"ba7816bf\"");
    }

    /// 数千件の現実的なパスで衝突しないこと（固定シード）
    #[test]
    fn test_no_collisions_for_plausible_paths() {
        let mut rng = StdRng::seed_from_u64(20240611);
        let mut seen: HashMap<Token, String> = HashMap::new();

        for i in 0..3000 {
            let site: u32 = rng.gen_range(0..20);
            let patient: u32 = rng.gen_range(0..100_000);
            let path = format!(
                "/mnt/pacs/site_{}/patient_{:06}/study_{}/IMG{:05}.dcm",
                site, patient, i, rng.gen_range(0..99_999)
            );
            let token = Token::of(&path);
            if let Some(previous) = seen.get(&token) {
                assert_eq!(
                    previous, &path,
                    "token {} collides; TOKEN_LEN={} is too short",
                    token, TOKEN_LEN
                );
            }
            seen.insert(token, path);
        }
    }

    proptest! {
        #[test]
        fn test_token_is_deterministic(value in ".*") {
            prop_assert_eq!(Token::of(&value), Token::of(&value.clone()));
        }
    }
}
