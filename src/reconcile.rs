//! 評価結果の復元
//!
//! 結果ZIPの表はトークンで書かれている。入力フォルダから対応表を作り直し、
//! 元のパスに戻したCSVを `<output>/<session_id>/csv/` に保存する。

use crate::error::{DeployError, Result};
use crate::scanner;
use crate::transfer::SessionId;
use mammo_deploy_common::results::{reconcile_images, reconcile_studies};
use mammo_deploy_common::{ImageOutcome, ImageResultRow, StudyOutcome, StudyResultRow};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// 復元済みの結果
#[derive(Debug, Clone)]
pub struct ReconciledResults {
    pub session_id: SessionId,
    pub studies: Vec<StudyOutcome>,
    pub images: Vec<ImageOutcome>,
    pub study_csv: PathBuf,
    pub image_csv: PathBuf,
}

pub fn study_table_name(session: &SessionId) -> String {
    format!("{}_study.csv", session)
}

pub fn image_table_name(session: &SessionId) -> String {
    format!("{}_dicom.csv", session)
}

/// 結果ZIPのトークンを元のパスに戻して保存する
///
/// 1件でも対応しないトークンがあれば何も書き出さずにエラーを返す。
pub fn unhash_results(results_zip: &Path, input: &Path, output_dir: &Path) -> Result<ReconciledResults> {
    let stem = results_zip
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem.is_empty() {
        return Err(DeployError::InvalidResultsUrl(results_zip.display().to_string()));
    }
    let session_id = SessionId::new(stem);

    std::fs::create_dir_all(output_dir)?;
    let staging = tempfile::Builder::new()
        .prefix(".results_")
        .tempdir_in(output_dir)?;

    let mut archive = ZipArchive::new(File::open(results_zip)?)?;
    archive.extract(staging.path())?;
    debug!("結果を展開: {}", staging.path().display());

    let study_rows: Vec<StudyResultRow> = read_table(staging.path(), &study_table_name(&session_id))?;
    let image_rows: Vec<ImageResultRow> = read_table(staging.path(), &image_table_name(&session_id))?;

    let map = scanner::build_identity_map(input)?;
    let studies = reconcile_studies(&study_rows, &map)?;
    let images = reconcile_images(&image_rows, &map)?;

    let csv_dir = output_dir.join(session_id.as_str()).join("csv");
    std::fs::create_dir_all(&csv_dir)?;
    let study_csv = csv_dir.join(study_table_name(&session_id));
    let image_csv = csv_dir.join(image_table_name(&session_id));
    write_table(&study_csv, &studies)?;
    write_table(&image_csv, &images)?;

    info!(
        "結果を復元: {}スタディ / {}画像 -> {}",
        studies.len(),
        images.len(),
        csv_dir.display()
    );

    Ok(ReconciledResults {
        session_id,
        studies,
        images,
        study_csv,
        image_csv,
    })
}

/// 復元済みの画像単位CSVを読み込む
pub fn read_image_outcomes(path: &Path) -> Result<Vec<ImageOutcome>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// 展開先からファイル名で表を探して読む
fn read_table<T: DeserializeOwned>(root: &Path, name: &str) -> Result<Vec<T>> {
    let path = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name().to_string_lossy() == name)
        .map(|e| e.into_path())
        .ok_or_else(|| DeployError::MissingResultTable(name.to_string()))?;

    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(rows)
}

fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
