//! 所見ボックスの描画
//!
//! 画像ごとに最もスコアの高い所見を元のDICOMに重ねてPNGで保存する。

use crate::error::{DeployError, Result};
use crate::ingest::{ImageReader, SourceImage};
use image::{Luma, Rgb, RgbImage};
use indicatif::ProgressBar;
use mammo_deploy_common::windowing::{apply_window, bytescale, output_bits};
use mammo_deploy_common::{extract_metadata, ImageOutcome, Token, Window};
use ndarray::{Array2, Axis};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 3;

/// 描画する所見
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub file_path: PathBuf,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub slice: i64,
    pub score: f64,
}

impl Finding {
    /// 座標とスコアが揃い、値域も正しい場合のみ変換
    pub fn from_outcome(outcome: &ImageOutcome) -> Result<Option<Self>> {
        if !outcome.has_box() {
            return Ok(None);
        }
        let (Some(x1), Some(y1), Some(x2), Some(y2), Some(slice), Some(score)) = (
            outcome.x1,
            outcome.y1,
            outcome.x2,
            outcome.y2,
            outcome.slice,
            outcome.score,
        ) else {
            return Ok(None);
        };

        if !(0.0..=1.0).contains(&score) {
            return Err(DeployError::Plot(format!("スコアが範囲外です: {}", score)));
        }
        if x1 >= x2 || y1 >= y2 {
            return Err(DeployError::Plot(format!(
                "ボックスの座標が不正です: ({}, {}) - ({}, {})",
                x1, y1, x2, y2
            )));
        }

        Ok(Some(Finding {
            file_path: PathBuf::from(&outcome.file_path),
            x1,
            y1,
            x2,
            y2,
            slice: slice as i64,
            score,
        }))
    }
}

/// ファイルごとに最高スコアの所見を選ぶ
pub fn select_findings(outcomes: &[ImageOutcome]) -> Vec<Finding> {
    let mut best: BTreeMap<String, Finding> = BTreeMap::new();

    for outcome in outcomes {
        let finding = match Finding::from_outcome(outcome) {
            Ok(Some(finding)) => finding,
            Ok(None) => continue,
            Err(e) => {
                warn!("{} の所見を描画できません: {}（スキップ）", outcome.file_path, e);
                continue;
            }
        };
        match best.get(&outcome.file_path) {
            Some(current) if current.score >= finding.score => {}
            _ => {
                best.insert(outcome.file_path.clone(), finding);
            }
        }
    }

    best.into_values().collect()
}

/// 出力先: `<output>/<親フォルダ名>/<ファイル名>_plot.png`
pub fn plot_path(output_dir: &Path, source: &Path) -> PathBuf {
    let parent = source
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(parent).join(format!("{}_plot.png", name))
}

/// 所見を描画して保存したファイル一覧を返す
pub fn plot_results<R: ImageReader>(outcomes: &[ImageOutcome], output_dir: &Path, reader: &R) -> Result<Vec<PathBuf>> {
    let findings = select_findings(outcomes);
    let progress = ProgressBar::new(findings.len() as u64);
    let mut written = Vec::new();

    for finding in &findings {
        match plot_finding(finding, output_dir, reader) {
            Ok(path) => {
                debug!("描画: {} (score={:.3})", path.display(), finding.score);
                written.push(path);
            }
            Err(e) => warn!("{} を描画できませんでした: {}（スキップ）", finding.file_path.display(), e),
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    info!("描画した画像: {}枚", written.len());
    Ok(written)
}

fn plot_finding<R: ImageReader>(finding: &Finding, output_dir: &Path, reader: &R) -> Result<PathBuf> {
    let image = reader.open(&finding.file_path)?;
    let study_token = finding
        .file_path
        .parent()
        .map(Token::of_path)
        .unwrap_or_else(|| Token::of(""));
    let metadata = extract_metadata(image.record(), &study_token, &Token::of_path(&finding.file_path))?;
    let is_tomosynthesis = metadata.sop_class()?.is_tomosynthesis();

    let frames = image.decode_frames()?;
    let count = frames.len_of(Axis(0));
    let index = frame_index(finding.slice, count, is_tomosynthesis)
        .ok_or_else(|| DeployError::Plot(format!("スライス {} は存在しません（{}フレーム）", finding.slice, count)))?;

    let mut frame: Array2<f32> = frames.index_axis(Axis(0), index).as_standard_layout().into_owned();
    if let (Some(window), Some(values)) = (Window::from_metadata(&metadata), frame.as_slice_mut()) {
        apply_window(values, &window, output_bits(&metadata));
    }

    let (rows, columns) = frame.dim();
    let pixels = bytescale(frame.as_slice().unwrap_or_default());
    let gray = image::ImageBuffer::<Luma<u8>, _>::from_raw(columns as u32, rows as u32, pixels)
        .ok_or_else(|| DeployError::Plot("画素数が画像サイズと一致しません".to_string()))?;
    let mut canvas: RgbImage = image::DynamicImage::ImageLuma8(gray).to_rgb8();
    draw_box(&mut canvas, finding);

    let path = plot_path(output_dir, &finding.file_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    canvas.save(&path)?;
    Ok(path)
}

/// 描画するフレーム番号
///
/// トモシンセシスで `slice == -1` のときは中央のフレーム。
pub fn frame_index(slice: i64, frame_count: usize, is_tomosynthesis: bool) -> Option<usize> {
    if frame_count == 0 {
        return None;
    }
    if !is_tomosynthesis {
        return Some(0);
    }
    if slice == -1 {
        return Some(frame_count / 2);
    }
    usize::try_from(slice).ok().filter(|&i| i < frame_count)
}

/// 枠線を描く（画像外ははみ出さない）
pub fn draw_box(canvas: &mut RgbImage, finding: &Finding) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let clamp_x = |v: f64| (v.max(0.0) as u32).min(width - 1);
    let clamp_y = |v: f64| (v.max(0.0) as u32).min(height - 1);
    let (x1, x2) = (clamp_x(finding.x1), clamp_x(finding.x2));
    let (y1, y2) = (clamp_y(finding.y1), clamp_y(finding.y2));

    for t in 0..BOX_THICKNESS {
        for x in x1..=x2 {
            put(canvas, x, y1.saturating_add(t));
            put(canvas, x, y2.saturating_sub(t));
        }
        for y in y1..=y2 {
            put(canvas, x1.saturating_add(t), y);
            put(canvas, x2.saturating_sub(t), y);
        }
    }
}

fn put(canvas: &mut RgbImage, x: u32, y: u32) {
    if x < canvas.width() && y < canvas.height() {
        canvas.put_pixel(x, y, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(path: &str, score: Option<f64>) -> ImageOutcome {
        ImageOutcome {
            file_path: path.to_string(),
            x1: Some(2.0),
            y1: Some(2.0),
            x2: Some(8.0),
            y2: Some(6.0),
            slice: Some(-1.0),
            score,
        }
    }

    #[test]
    fn test_select_keeps_highest_score_per_file() {
        let outcomes = vec![
            outcome("/in/s1/a.dcm", Some(0.3)),
            outcome("/in/s1/a.dcm", Some(0.9)),
            outcome("/in/s1/b.dcm", Some(0.5)),
            outcome("/in/s1/c.dcm", None),
        ];
        let findings = select_findings(&outcomes);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].file_path, PathBuf::from("/in/s1/a.dcm"));
        assert_eq!(findings[0].score, 0.9);
        assert_eq!(findings[1].score, 0.5);
    }

    #[test]
    fn test_invalid_rows_are_skipped() {
        let mut inverted = outcome("/in/s1/a.dcm", Some(0.5));
        inverted.x1 = Some(9.0);
        let outcomes = vec![inverted, outcome("/in/s1/b.dcm", Some(1.5))];
        assert!(select_findings(&outcomes).is_empty());
    }

    #[test]
    fn test_frame_index() {
        assert_eq!(frame_index(-1, 1, false), Some(0));
        assert_eq!(frame_index(-1, 9, true), Some(4));
        assert_eq!(frame_index(3, 9, true), Some(3));
        assert_eq!(frame_index(9, 9, true), None);
        assert_eq!(frame_index(0, 0, true), None);
    }

    #[test]
    fn test_plot_path() {
        let path = plot_path(Path::new("/out/abc"), Path::new("/in/patient1/img.dcm"));
        assert_eq!(path, PathBuf::from("/out/abc/patient1/img.dcm_plot.png"));
    }

    #[test]
    fn test_draw_box_paints_edges_only() {
        let mut canvas = RgbImage::new(20, 20);
        let finding = Finding {
            file_path: PathBuf::from("/in/a.dcm"),
            x1: 2.0,
            y1: 2.0,
            x2: 15.0,
            y2: 15.0,
            slice: 0,
            score: 0.5,
        };
        draw_box(&mut canvas, &finding);
        assert_eq!(*canvas.get_pixel(2, 2), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(15, 10), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(4, 4), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(8, 8), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_box_clamps_to_canvas() {
        let mut canvas = RgbImage::new(10, 10);
        let finding = Finding {
            file_path: PathBuf::from("/in/a.dcm"),
            x1: -5.0,
            y1: 0.0,
            x2: 50.0,
            y2: 50.0,
            slice: 0,
            score: 0.5,
        };
        draw_box(&mut canvas, &finding);
        assert_eq!(*canvas.get_pixel(9, 9), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(0, 5), BOX_COLOR);
    }
}
