//! mammo-deploy Common Library
//!
//! パス仮名化・スタディ判定・メタデータ抽出・結果突き合わせなど、
//! ファイルシステムや通信に依存しない処理をまとめる

pub mod error;
pub mod identity;
pub mod metadata;
pub mod record;
pub mod results;
pub mod token;
pub mod tree;
pub mod windowing;

pub use error::{Error, Result};
pub use identity::IdentityMap;
pub use metadata::{extract_metadata, ImageMetadata, Manufacturer, SopClass};
pub use record::{AccessPath, Element, Record, Step, Tag};
pub use results::{ImageOutcome, ImageResultRow, StudyOutcome, StudyResultRow};
pub use token::Token;
pub use tree::{detect_studies, is_study, DirListing, InputLayout, StudyDir};
pub use windowing::Window;
