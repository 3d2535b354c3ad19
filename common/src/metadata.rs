//! 画像メタデータの抽出
//!
//! 受け付けるのは2Dマンモグラフィとトモシンセシス(DBT)の2種類のみ。
//! DBTでは一部の項目がフラットな属性に存在しないため、
//! 宣言的なテーブルで入れ子パスを引く。

use crate::error::{Error, Result};
use crate::record::{resolve_text, AccessPath, Record, Step, Tag};
use crate::token::Token;
use serde::{Deserialize, Serialize};

/// 使用するDICOMタグ
pub mod tags {
    use crate::record::Tag;

    pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
    pub const MANUFACTURER: Tag = Tag(0x0008, 0x0070);
    pub const CODE_MEANING: Tag = Tag(0x0008, 0x0104);
    pub const MANUFACTURER_MODEL_NAME: Tag = Tag(0x0008, 0x1090);
    pub const VIEW_POSITION: Tag = Tag(0x0018, 0x5101);
    pub const PRIVATE_LATERALITY_SEQUENCE: Tag = Tag(0x0019, 0x108A);
    pub const PRIVATE_LATERALITY: Tag = Tag(0x0019, 0x1087);
    pub const PATIENT_ORIENTATION: Tag = Tag(0x0020, 0x0020);
    pub const IMAGE_LATERALITY: Tag = Tag(0x0020, 0x0062);
    pub const NUMBER_OF_FRAMES: Tag = Tag(0x0028, 0x0008);
    pub const ROWS: Tag = Tag(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag(0x0028, 0x0011);
    pub const BITS_ALLOCATED: Tag = Tag(0x0028, 0x0100);
    pub const BITS_STORED: Tag = Tag(0x0028, 0x0101);
    pub const HIGH_BIT: Tag = Tag(0x0028, 0x0102);
    pub const BURNED_IN_ANNOTATION: Tag = Tag(0x0028, 0x0301);
    pub const WINDOW_CENTER: Tag = Tag(0x0028, 0x1050);
    pub const WINDOW_WIDTH: Tag = Tag(0x0028, 0x1051);
    pub const WINDOW_CENTER_WIDTH_EXPLANATION: Tag = Tag(0x0028, 0x1055);
    pub const FRAME_VOI_LUT_SEQUENCE: Tag = Tag(0x0028, 0x9132);
    pub const VIEW_CODE_SEQUENCE: Tag = Tag(0x0054, 0x0220);
    pub const SHARED_FUNCTIONAL_GROUPS_SEQUENCE: Tag = Tag(0x5200, 0x9229);
}

/// 2Dデジタルマンモグラフィ (For Presentation)
pub const DIGITAL_MAMMOGRAPHY_UID: &str = "1.2.840.10008.5.1.4.1.1.1.2";
/// ブレストトモシンセシス
pub const BREAST_TOMOSYNTHESIS_UID: &str = "1.2.840.10008.5.1.4.1.1.13.1.3";

pub const ALLOWED_SOP_CLASSES: [&str; 2] = [DIGITAL_MAMMOGRAPHY_UID, BREAST_TOMOSYNTHESIS_UID];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SopClass {
    DigitalMammography,
    BreastTomosynthesis,
}

impl SopClass {
    pub fn from_uid(uid: &str) -> Result<Self> {
        match uid.trim_end_matches(['\0', ' ']) {
            DIGITAL_MAMMOGRAPHY_UID => Ok(SopClass::DigitalMammography),
            BREAST_TOMOSYNTHESIS_UID => Ok(SopClass::BreastTomosynthesis),
            other => Err(Error::UnsupportedSopClass(other.to_string())),
        }
    }

    pub fn of_record(record: &Record) -> Result<Self> {
        Self::from_uid(record.text(tags::SOP_CLASS_UID).unwrap_or_default())
    }

    pub fn uid(&self) -> &'static str {
        match self {
            SopClass::DigitalMammography => DIGITAL_MAMMOGRAPHY_UID,
            SopClass::BreastTomosynthesis => BREAST_TOMOSYNTHESIS_UID,
        }
    }

    pub fn is_tomosynthesis(&self) -> bool {
        matches!(self, SopClass::BreastTomosynthesis)
    }
}

/// 焼き込み注釈（PHIを含みうる）がないことを確認
pub fn check_burned_in_annotation(record: &Record) -> Result<()> {
    match record.text(tags::BURNED_IN_ANNOTATION) {
        Some(flag) if flag.trim().eq_ignore_ascii_case("NO") => Ok(()),
        _ => Err(Error::BurnedInAnnotation),
    }
}

/// 撮影方向の語彙（CID 4014）を略号へ変換
pub fn view_position_code(value: &str) -> Result<&'static str> {
    const CODE_TO_ACRONYM: [(&str, &str); 12] = [
        ("medio-lateral", "ML"),
        ("medio-lateral oblique", "MLO"),
        ("latero-medial", "LM"),
        ("latero-medial oblique", "LMO"),
        ("cranio-caudal", "CC"),
        ("caudo-cranial (from below)", "FB"),
        ("superolateral to inferomedial oblique", "SIO"),
        ("inferomedial to superolateral oblique", "ISO"),
        // 現在は未使用
        ("exaggerated cranio-caudal", "XCC"),
        ("cranio-caudal exaggerated laterally", "XCCL"),
        ("cranio-caudal exaggerated medially", "XCCM"),
        ("tissue specimen from breast", "SPECIMEN"),
    ];

    if let Some((_, code)) = CODE_TO_ACRONYM.iter().find(|(phrase, _)| *phrase == value) {
        return Ok(*code);
    }

    // 表記ゆれは次の2語のみ許容
    match value.trim().to_lowercase().as_str() {
        "mediolateral oblique" => Ok("MLO"),
        "craniocaudal" => Ok("CC"),
        _ => Err(Error::UnknownViewPosition(value.to_string())),
    }
}

/// メーカー分類（ウィンドウ処理の要否を決める）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manufacturer {
    Hologic,
    Ge,
    Other(String),
}

impl Manufacturer {
    pub fn classify(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("hologic") || lower.contains("lorad") {
            Manufacturer::Hologic
        } else if lower.replace(' ', "").contains("gemedicalsystems") {
            Manufacturer::Ge
        } else {
            Manufacturer::Other(name.to_string())
        }
    }

    /// Hologic / GE は生の画素値をそのまま使う
    pub fn applies_voi_lut(&self) -> bool {
        matches!(self, Manufacturer::Other(_))
    }
}

/// メタデータ項目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ViewPosition,
    ImageLaterality,
    WindowWidth,
    WindowCenter,
}

/// 項目の取得元
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    Flat(Tag),
    Nested(AccessPath),
}

/// (SOPクラス, 項目) → 取得元
pub fn field_source(sop_class: SopClass, field: Field) -> FieldSource {
    use tags::*;

    match (sop_class, field) {
        (SopClass::BreastTomosynthesis, Field::ViewPosition) => FieldSource::Nested(AccessPath::new(vec![
            Step::Tag(VIEW_CODE_SEQUENCE),
            Step::Item(0),
            Step::Tag(CODE_MEANING),
        ])),
        (SopClass::BreastTomosynthesis, Field::ImageLaterality) => FieldSource::Nested(AccessPath::new(vec![
            Step::Tag(PRIVATE_LATERALITY_SEQUENCE),
            Step::Item(0),
            Step::Tag(PRIVATE_LATERALITY),
        ])),
        (SopClass::BreastTomosynthesis, Field::WindowWidth) => FieldSource::Nested(voi_path(WINDOW_WIDTH)),
        (SopClass::BreastTomosynthesis, Field::WindowCenter) => FieldSource::Nested(voi_path(WINDOW_CENTER)),
        (SopClass::DigitalMammography, Field::ViewPosition) => FieldSource::Flat(VIEW_POSITION),
        (SopClass::DigitalMammography, Field::ImageLaterality) => FieldSource::Flat(IMAGE_LATERALITY),
        (SopClass::DigitalMammography, Field::WindowWidth) => FieldSource::Flat(WINDOW_WIDTH),
        (SopClass::DigitalMammography, Field::WindowCenter) => FieldSource::Flat(WINDOW_CENTER),
    }
}

fn voi_path(leaf: Tag) -> AccessPath {
    AccessPath::new(vec![
        Step::Tag(tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE),
        Step::Item(0),
        Step::Tag(tags::FRAME_VOI_LUT_SEQUENCE),
        Step::Item(0),
        Step::Tag(leaf),
    ])
}

/// 項目値を解決
///
/// 入れ子パスが引けない場合は `None`（空値）。撮影方向の語彙に
/// 一致しない場合のみエラーになる。
pub fn resolve_field(record: &Record, sop_class: SopClass, field: Field) -> Result<Option<String>> {
    let path = match field_source(sop_class, field) {
        FieldSource::Flat(tag) => return Ok(record.text(tag).map(str::to_string)),
        FieldSource::Nested(path) => path,
    };

    let raw = match resolve_text(record, &path) {
        Ok(value) => value,
        Err(Error::Lookup(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    let value = match field {
        Field::ViewPosition => Some(view_position_code(raw)?.to_string()),
        Field::ImageLaterality => raw.trim().chars().next().map(String::from),
        Field::WindowWidth | Field::WindowCenter => raw
            .trim()
            .parse::<f64>()
            .ok()
            .map(|v| (v.trunc() as i64).to_string()),
    };
    Ok(value)
}

/// 1画像分のメタデータ行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(rename = "SOPClassUID")]
    pub sop_class_uid: String,
    #[serde(rename = "ViewPosition")]
    pub view_position: Option<String>,
    #[serde(rename = "ImageLaterality")]
    pub image_laterality: Option<String>,
    #[serde(rename = "Rows")]
    pub rows: Option<u32>,
    #[serde(rename = "Columns")]
    pub columns: Option<u32>,
    #[serde(rename = "Manufacturer")]
    pub manufacturer: Option<String>,
    #[serde(rename = "ManufacturerModelName")]
    pub manufacturer_model_name: Option<String>,
    #[serde(rename = "NumberOfFrames")]
    pub number_of_frames: Option<u32>,
    #[serde(rename = "PatientOrientation")]
    pub patient_orientation: Option<String>,
    #[serde(rename = "BitsAllocated")]
    pub bits_allocated: Option<u16>,
    #[serde(rename = "WindowWidth")]
    pub window_width: Option<String>,
    #[serde(rename = "WindowCenter")]
    pub window_center: Option<String>,
    #[serde(rename = "WindowCenterWidthExplanation")]
    pub window_center_width_explanation: Option<String>,
    #[serde(rename = "HighBit")]
    pub high_bit: Option<u16>,
    /// ウィンドウ出力レンジ用（メタデータ表には出力しない）
    #[serde(rename = "BitsStored", default, skip_serializing)]
    pub bits_stored: Option<u16>,
    pub dcm_path: Token,
    pub np_paths: String,
    #[serde(rename = "SOPInstanceUID")]
    pub sop_instance_uid: Token,
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: Token,
}

impl ImageMetadata {
    pub fn sop_class(&self) -> Result<SopClass> {
        SopClass::from_uid(&self.sop_class_uid)
    }

    pub fn manufacturer_class(&self) -> Manufacturer {
        Manufacturer::classify(self.manufacturer.as_deref().unwrap_or_default())
    }

    /// 宣言フレーム数（未設定なら `None`）
    pub fn declared_frames(&self) -> Option<u32> {
        self.number_of_frames
    }
}

/// レコードからメタデータ行を作る
///
/// SOPクラスと焼き込み注釈の検査は画素データに触れる前にここで行う。
/// 外部に見える識別子はトークンで置き換える。
pub fn extract_metadata(record: &Record, study_token: &Token, image_token: &Token) -> Result<ImageMetadata> {
    let sop_class = SopClass::of_record(record)?;
    check_burned_in_annotation(record)?;

    let text = |tag: Tag| record.text(tag).map(|v| v.trim().to_string());
    let number = |tag: Tag| record.text(tag).and_then(|v| v.trim().parse().ok());
    let number_u16 = |tag: Tag| record.text(tag).and_then(|v| v.trim().parse::<u16>().ok());

    Ok(ImageMetadata {
        sop_class_uid: sop_class.uid().to_string(),
        view_position: resolve_field(record, sop_class, Field::ViewPosition)?,
        image_laterality: resolve_field(record, sop_class, Field::ImageLaterality)?,
        rows: number(tags::ROWS),
        columns: number(tags::COLUMNS),
        manufacturer: text(tags::MANUFACTURER),
        manufacturer_model_name: text(tags::MANUFACTURER_MODEL_NAME),
        number_of_frames: number(tags::NUMBER_OF_FRAMES),
        patient_orientation: text(tags::PATIENT_ORIENTATION),
        bits_allocated: number_u16(tags::BITS_ALLOCATED),
        window_width: resolve_field(record, sop_class, Field::WindowWidth)?,
        window_center: resolve_field(record, sop_class, Field::WindowCenter)?,
        window_center_width_explanation: text(tags::WINDOW_CENTER_WIDTH_EXPLANATION),
        high_bit: number_u16(tags::HIGH_BIT),
        bits_stored: number_u16(tags::BITS_STORED),
        dcm_path: image_token.clone(),
        np_paths: format!("{}/{}", study_token, image_token),
        sop_instance_uid: image_token.clone(),
        study_instance_uid: study_token.clone(),
    })
}

/// 宣言フレーム数とデコード結果のフレーム数が一致するか
pub fn check_frame_count(declared: u32, decoded: usize) -> Result<()> {
    if declared as usize != decoded {
        return Err(Error::FrameCountMismatch { declared, decoded });
    }
    Ok(())
}
