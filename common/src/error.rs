//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Value not found: {0}")]
    Lookup(String),

    #[error("SOPClassUID incorrect ({0}). Allowed values: {allowed}", allowed = crate::metadata::ALLOWED_SOP_CLASSES.join(", "))]
    UnsupportedSopClass(String),

    #[error("BurnedInAnnotation not found or != \"NO\"")]
    BurnedInAnnotation,

    #[error("Could not find view code match for {0}")]
    UnknownViewPosition(String),

    #[error("The NumberOfFrames dicom metadata field ({declared}) and the pixel data shape ({decoded} frames) are inconsistent")]
    FrameCountMismatch { declared: u32, decoded: usize },

    #[error("Token {token} maps to both {first} and {second}")]
    TokenCollision {
        token: String,
        first: String,
        second: String,
    },

    #[error("Token {0} is not part of the identity map; the uploaded input and the reconciled input differ")]
    UnknownToken(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
