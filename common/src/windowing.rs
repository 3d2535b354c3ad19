//! VOI LUT（線形ウィンドウ）処理
//!
//! DICOM PS3.3 C.11.2.1.2 の線形関数で画素値を表示レンジへ写す。

use crate::metadata::ImageMetadata;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub center: f64,
    pub width: f64,
}

impl Window {
    /// メタデータのWindowCenter/WindowWidthから作る（多値は先頭を使う）
    pub fn from_metadata(meta: &ImageMetadata) -> Option<Self> {
        let center = first_value(meta.window_center.as_deref()?)?;
        let width = first_value(meta.window_width.as_deref()?)?;
        if width < 1.0 {
            return None;
        }
        Some(Window { center, width })
    }
}

fn first_value(raw: &str) -> Option<f64> {
    raw.split('\\').next()?.trim().parse().ok()
}

/// 出力レンジのビット数（BitsStored → HighBit + 1 → BitsAllocated の順）
pub fn output_bits(meta: &ImageMetadata) -> u16 {
    meta.bits_stored
        .or(meta.high_bit.map(|h| h + 1))
        .or(meta.bits_allocated)
        .unwrap_or(16)
        .clamp(1, 32)
}

/// 線形ウィンドウをその場で適用
pub fn apply_window(values: &mut [f32], window: &Window, bits: u16) {
    let y_min = 0.0_f64;
    let y_max = 2f64.powi(bits as i32) - 1.0;
    let c = window.center - 0.5;
    let w = window.width - 1.0;
    let lower = c - w / 2.0;
    let upper = c + w / 2.0;

    for value in values.iter_mut() {
        let x = *value as f64;
        let y = if x <= lower {
            y_min
        } else if x > upper {
            y_max
        } else if w <= 0.0 {
            // 幅1はしきい値処理になる
            y_max
        } else {
            ((x - c) / w + 0.5) * (y_max - y_min) + y_min
        };
        *value = y as f32;
    }
}

/// 最小値〜最大値を0〜255へ線形に写す
pub fn bytescale(values: &[f32]) -> Vec<u8> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if values.is_empty() {
        return Vec::new();
    }

    let mut scale = max - min;
    if scale <= 0.0 {
        scale = 1.0;
    }
    values
        .iter()
        .map(|&v| ((v - min) * 255.0 / scale + 0.4999).clamp(0.0, 255.0) as u8)
        .collect()
}
