//! 評価結果の突き合わせ
//!
//! サーバーから返るトークンキーの行を、対応表で元のパスへ戻す。
//! 1件でも引けないトークンがあれば全体を失敗させる。

use crate::error::Result;
use crate::identity::IdentityMap;
use serde::{Deserialize, Serialize};

/// スタディ単位の結果行（サーバー出力）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyResultRow {
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: String,
    pub score: Option<f64>,
}

/// 画像単位の結果行（サーバー出力）
///
/// 所見がない画像は座標とスコアが空になる
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResultRow {
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: String,
    #[serde(rename = "SOPInstanceUID")]
    pub sop_instance_uid: String,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
    pub slice: Option<f64>,
    pub score: Option<f64>,
}

/// スタディ単位の最終結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyOutcome {
    pub study_path: String,
    pub score: Option<f64>,
}

/// 画像単位の最終結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageOutcome {
    pub file_path: String,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
    pub slice: Option<f64>,
    pub score: Option<f64>,
}

impl ImageOutcome {
    /// 描画可能なボックスを持つか
    pub fn has_box(&self) -> bool {
        self.x1.is_some()
            && self.y1.is_some()
            && self.x2.is_some()
            && self.y2.is_some()
            && self.slice.is_some()
            && self.score.is_some()
    }
}

pub fn reconcile_studies(rows: &[StudyResultRow], map: &IdentityMap) -> Result<Vec<StudyOutcome>> {
    rows.iter()
        .map(|row| {
            let path = map.resolve(row.study_instance_uid.trim())?;
            Ok(StudyOutcome {
                study_path: path.display().to_string(),
                score: row.score,
            })
        })
        .collect()
}

pub fn reconcile_images(rows: &[ImageResultRow], map: &IdentityMap) -> Result<Vec<ImageOutcome>> {
    rows.iter()
        .map(|row| {
            // スタディ列も出力はしないが整合性は検査する
            map.resolve(row.study_instance_uid.trim())?;
            let path = map.resolve(row.sop_instance_uid.trim())?;
            Ok(ImageOutcome {
                file_path: path.display().to_string(),
                x1: row.x1,
                y1: row.y1,
                x2: row.x2,
                y2: row.y2,
                slice: row.slice,
                score: row.score,
            })
        })
        .collect()
}
