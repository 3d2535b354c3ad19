//! DICOMファイルの読み込み
//!
//! ヘッダ（半構造化レコード）の取得と画素データのデコードを分け、
//! 安全性チェックが済むまで画素データに触れないようにする。

use crate::error::{DeployError, Result};
use dicom_core::value::Value as DicomValue;
use dicom_object::{open_file, DefaultDicomObject, InMemDicomObject};
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use mammo_deploy_common::{Element, Record, Tag};
use ndarray::{Array3, Axis};
use std::path::Path;

const PIXEL_DATA_GROUP: u16 = 0x7FE0;

/// 読み込んだ画像
pub trait SourceImage {
    fn record(&self) -> &Record;

    /// 画素データを (frame, row, column) の配列にデコード
    fn decode_frames(&self) -> Result<Array3<f32>>;
}

/// 画像ファイルのリーダー
pub trait ImageReader {
    type Image: SourceImage;

    fn open(&self, path: &Path) -> Result<Self::Image>;
}

/// dicom-rs によるリーダー
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomFileReader;

pub struct DicomFile {
    object: DefaultDicomObject,
    record: Record,
}

impl ImageReader for DicomFileReader {
    type Image = DicomFile;

    fn open(&self, path: &Path) -> Result<DicomFile> {
        let object = open_file(path).map_err(|e| DeployError::Dicom(e.to_string()))?;
        let record = to_record(&object);
        Ok(DicomFile { object, record })
    }
}

impl SourceImage for DicomFile {
    fn record(&self) -> &Record {
        &self.record
    }

    fn decode_frames(&self) -> Result<Array3<f32>> {
        let decoded = self
            .object
            .decode_pixel_data()
            .map_err(|e| DeployError::Dicom(e.to_string()))?;
        // (frames, rows, columns, samples)
        let pixels = decoded
            .to_ndarray_with_options::<f32>(&raw_pixel_options())
            .map_err(|e| DeployError::Dicom(e.to_string()))?;
        Ok(pixels.index_axis(Axis(3), 0).to_owned())
    }
}

/// 格納値のまま取り出す（Rescale Slope/Intercept は適用しない）
fn raw_pixel_options() -> ConvertOptions {
    ConvertOptions::new().with_modality_lut(ModalityLutOption::None)
}

/// データセットをレコードへ変換（画素データは除く）
fn to_record(dataset: &InMemDicomObject) -> Record {
    let mut record = Record::new();

    for element in dataset.iter() {
        let tag = element.header().tag;
        if tag.0 == PIXEL_DATA_GROUP {
            continue;
        }
        let value = match element.value() {
            DicomValue::Primitive(primitive) => Element::Text(
                primitive
                    .to_str()
                    .trim_end_matches(['\0', ' '])
                    .to_string(),
            ),
            DicomValue::Sequence(sequence) => {
                Element::Items(sequence.items().iter().map(to_record).collect())
            }
            _ => continue,
        };
        record.insert(Tag(tag.0, tag.1), value);
    }

    record
}
