//! スタディ取り込みパイプライン
//!
//! 1画像ごとに検証 → メタデータ抽出 → デコード → ウィンドウ処理 → 保存を行う。
//! 画像単位のエラーは警告してスキップし、スタディ・実行全体は継続する。

pub mod dicom;
pub mod store;

pub use dicom::{DicomFileReader, ImageReader, SourceImage};
pub use store::FrameStore;

use crate::error::Result;
use indicatif::{ProgressBar, ProgressStyle};
use mammo_deploy_common::metadata::check_frame_count;
use mammo_deploy_common::windowing::{apply_window, output_bits};
use mammo_deploy_common::{extract_metadata, ImageMetadata, InputLayout, Token, Window};
use ndarray::Axis;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 実行全体の上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestLimits {
    pub max_studies: usize,
    pub max_images: usize,
}

/// 1スタディの取り込み結果
#[derive(Debug, Clone)]
pub struct IngestedStudy {
    pub token: Token,
    pub rows: Vec<ImageMetadata>,
    pub skipped: usize,
}

/// 取り込み全体の結果
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub studies: Vec<IngestedStudy>,
    pub images: usize,
    pub skipped: usize,
    /// 上限により途中で打ち切った
    pub truncated: bool,
}

impl IngestSummary {
    pub fn is_empty(&self) -> bool {
        self.images == 0
    }

    fn push(&mut self, study: IngestedStudy) {
        self.images += study.rows.len();
        self.skipped += study.skipped;
        self.studies.push(study);
    }
}

/// 入力全体を取り込む
pub fn ingest_input<R: ImageReader>(
    layout: &InputLayout,
    store: &FrameStore,
    reader: &R,
    limits: &IngestLimits,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    match layout {
        InputLayout::SingleFile { study, file } => {
            let ingested = ingest_study(study, std::slice::from_ref(file), store, reader)?;
            summary.push(ingested);
        }
        InputLayout::Tree { studies } => {
            let progress = ProgressBar::new(studies.len() as u64);
            progress.set_style(ProgressStyle::default_bar());

            for (index, study) in studies.iter().enumerate() {
                if index + 1 > limits.max_studies || summary.images + study.files.len() > limits.max_images {
                    warn!(
                        "評価上限（{}スタディ / {}画像）に達したため以降のスタディは処理しません",
                        limits.max_studies, limits.max_images
                    );
                    summary.truncated = true;
                    break;
                }

                let ingested = ingest_study(&study.path, &study.files, store, reader)?;
                summary.push(ingested);
                info!("処理済み画像: {}枚", summary.images);
                progress.inc(1);
            }
            progress.finish_and_clear();
        }
    }

    Ok(summary)
}

/// 1スタディを取り込み、メタデータ表を保存する
pub fn ingest_study<R: ImageReader>(
    study_path: &Path,
    files: &[PathBuf],
    store: &FrameStore,
    reader: &R,
) -> Result<IngestedStudy> {
    let token = Token::of_path(study_path);
    let mut rows = Vec::new();
    let mut skipped = 0;

    for file in files {
        match ingest_image(file, &token, store, reader) {
            Ok(row) => {
                debug!("{} -> {}", file.display(), row.sop_instance_uid);
                rows.push(row);
            }
            Err(e) => {
                warn!(
                    "ファイル {} はDICOMとして正しく処理できませんでした ({})（スキップ）",
                    file.display(),
                    e
                );
                skipped += 1;
                // 途中まで書いたフレームは送らない
                let partial = store.image_dir(&token, &Token::of_path(file));
                if partial.exists() {
                    std::fs::remove_dir_all(&partial)?;
                }
            }
        }
    }

    store.write_metadata(&token, &rows)?;
    Ok(IngestedStudy { token, rows, skipped })
}

/// 1画像を検証・デコードしてフレームを保存する
pub fn ingest_image<R: ImageReader>(
    path: &Path,
    study_token: &Token,
    store: &FrameStore,
    reader: &R,
) -> Result<ImageMetadata> {
    let image_token = Token::of_path(path);
    let image = reader.open(path)?;

    // SOPクラスと焼き込み注釈はここで検査される（画素データより前）
    let metadata = extract_metadata(image.record(), study_token, &image_token)?;

    let mut frames = image.decode_frames()?;
    // 宣言がない場合はデコード結果のフレーム数をそのまま使う
    if let Some(declared) = metadata.declared_frames() {
        check_frame_count(declared, frames.len_of(Axis(0)))?;
    }

    if metadata.manufacturer_class().applies_voi_lut() {
        if let Some(window) = Window::from_metadata(&metadata) {
            if frames.as_slice_mut().is_none() {
                frames = frames.as_standard_layout().into_owned();
            }
            if let Some(values) = frames.as_slice_mut() {
                apply_window(values, &window, output_bits(&metadata));
            }
        }
    }

    store.write_frames(study_token, &image_token, &frames)?;
    Ok(metadata)
}
