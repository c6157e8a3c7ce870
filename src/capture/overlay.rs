//! Frame annotation - labelled boxes around barcodes and the badge photo,
//! plus a status header in the top-left corner

use image::{Rgb, RgbImage};

use super::font::{self, ADVANCE, GLYPH_HEIGHT};
use super::Rect;
use crate::session::{LastScanView, ScanOutcome, UNKNOWN_STUDENT};

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const ORANGE: Rgb<u8> = Rgb([255, 165, 0]);
const MAGENTA: Rgb<u8> = Rgb([255, 0, 255]);
const CYAN: Rgb<u8> = Rgb([0, 255, 255]);

const THICKNESS: u32 = 2;
const LINE_HEIGHT: i64 = GLYPH_HEIGHT as i64 + 3;
const HUD_MARGIN: i64 = 10;

/// One box to draw on the outgoing frame, with its label lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mark {
    pub rect: Rect,
    pub color: Rgb<u8>,
    pub lines: Vec<String>,
}

impl Mark {
    /// Green for new reads, orange for anything held back
    pub fn for_outcome(rect: Rect, barcode_id: &str, outcome: &ScanOutcome) -> Self {
        let id_line = format!("ID: {}", barcode_id);
        let (color, headline) = match outcome {
            ScanOutcome::Accepted(record) => (GREEN, record.student_name.clone()),
            ScanOutcome::Pending { reads, threshold } => {
                (ORANGE, format!("Reading... ({}/{})", reads, threshold))
            }
            ScanOutcome::Duplicate { name } => (ORANGE, format!("{} (ALREADY SCANNED)", name)),
            ScanOutcome::ProvisionalCollision { .. } => {
                (ORANGE, format!("{} (ALREADY SCANNED)", UNKNOWN_STUDENT))
            }
            ScanOutcome::CooldownSuppressed { name } => (ORANGE, format!("{} (COOLDOWN)", name)),
        };
        Self {
            rect,
            color,
            lines: vec![headline, id_line],
        }
    }

    pub fn photo(rect: Rect) -> Self {
        Self {
            rect,
            color: MAGENTA,
            lines: vec!["Photo".to_string()],
        }
    }
}

/// Session summary printed in the corner of every annotated frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hud {
    pub last_scan: Option<LastScanView>,
    pub unique_students: usize,
}

impl Hud {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(3);
        if let Some(last) = &self.last_scan {
            lines.push(format!("Last scanned: {}", last.name));
            lines.push(format!("ID: {}", last.id));
        }
        lines.push(format!("Unique students: {}", self.unique_students));
        lines
    }
}

/// Draw every mark (outline and label), then the header
pub fn draw(image: &mut RgbImage, marks: &[Mark], hud: Option<&Hud>) {
    for mark in marks {
        draw_outline(image, mark.rect, mark.color);
        draw_mark_label(image, mark);
    }
    if let Some(hud) = hud {
        for (row, line) in hud.lines().iter().enumerate() {
            let y = HUD_MARGIN + row as i64 * LINE_HEIGHT;
            draw_label(image, HUD_MARGIN, y, line, CYAN);
        }
    }
}

/// Labels sit above the box, or below it when the box touches the top edge
fn draw_mark_label(image: &mut RgbImage, mark: &Mark) {
    let count = mark.lines.len() as i64;
    let top = mark.rect.y as i64 - count * LINE_HEIGHT;
    let first = if top >= 0 {
        top
    } else {
        (mark.rect.y + mark.rect.height) as i64 + THICKNESS as i64
    };

    for (row, line) in mark.lines.iter().enumerate() {
        let y = first + row as i64 * LINE_HEIGHT;
        draw_label(image, mark.rect.x as i64, y, line, mark.color);
    }
}

/// Draw `text` with its top-left corner at (`x`, `y`), clipped to the image
pub fn draw_label(image: &mut RgbImage, x: i64, y: i64, text: &str, color: Rgb<u8>) {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let mut pen = x;

    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(rows) = font::glyph(ch) {
            for (row, bits) in rows.into_iter().enumerate() {
                let py = y + row as i64;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..font::GLYPH_WIDTH as i64 {
                    let px = pen + col;
                    if (bits >> (4 - col)) & 1 == 1 && px >= 0 && px < width {
                        image.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
        pen += ADVANCE as i64;
        if pen >= width {
            break;
        }
    }
}

/// 2px outline painted as four edge strips
fn draw_outline(image: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
    let Some(rect) = rect.clamp_to(image.width(), image.height()) else {
        return;
    };

    let right = rect.x + rect.width - 1;
    let bottom = rect.y + rect.height - 1;
    let thickness = THICKNESS.min(rect.width).min(rect.height);

    for t in 0..thickness {
        for x in rect.x..=right {
            image.put_pixel(x, rect.y + t, color);
            image.put_pixel(x, bottom - t, color);
        }
        for y in rect.y..=bottom {
            image.put_pixel(rect.x + t, y, color);
            image.put_pixel(right - t, y, color);
        }
    }
}
