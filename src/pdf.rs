//! PDF rendering surface.
//!
//! Pages are collected as content streams and assembled into the document
//! on `finish()`. Text uses the base-14 Helvetica pair with WinAnsi
//! encoding, so nothing is embedded; logos travel as JPEG XObjects with
//! `DCTDecode` passthrough.

use miniz_oxide::deflate::compress_to_vec_zlib;
use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref, Str};

use crate::layout::{Color, PageMetrics, Surface, TextStyle};

const MM_TO_PT: f64 = 72.0 / 25.4;

struct PlacedImage {
    name: String,
    data: Vec<u8>,
    width_px: i32,
    height_px: i32,
}

pub struct PdfSurface {
    width_mm: f64,
    height_mm: f64,
    pages: Vec<Content>,
    images: Vec<PlacedImage>,
}

impl PdfSurface {
    pub fn new(metrics: &PageMetrics) -> Self {
        Self {
            width_mm: metrics.width,
            height_mm: metrics.height,
            pages: vec![Content::new()],
            images: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn x_pt(&self, x: f64) -> f32 {
        (x * MM_TO_PT) as f32
    }

    /// Flips from top-left mm to PDF's bottom-left pt origin.
    fn y_pt(&self, y: f64) -> f32 {
        ((self.height_mm - y) * MM_TO_PT) as f32
    }

    fn content(&mut self) -> &mut Content {
        if self.pages.is_empty() {
            self.pages.push(Content::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn set_fill(content: &mut Content, color: Color) {
        match color {
            Color::Gray(g) => content.set_fill_gray(g as f32),
            Color::Rgb(r, g, b) => content.set_fill_rgb(
                r as f32 / 255.0,
                g as f32 / 255.0,
                b as f32 / 255.0,
            ),
        };
    }

    fn set_stroke(content: &mut Content, color: Color) {
        match color {
            Color::Gray(g) => content.set_stroke_gray(g as f32),
            Color::Rgb(r, g, b) => content.set_stroke_rgb(
                r as f32 / 255.0,
                g as f32 / 255.0,
                b as f32 / 255.0,
            ),
        };
    }

    /// Serializes the collected pages into a finished PDF.
    pub fn finish(self) -> Vec<u8> {
        let mut pdf = Pdf::new();
        let mut next = 1;
        let mut alloc = || {
            let r = Ref::new(next);
            next += 1;
            r
        };

        let catalog_id = alloc();
        let pages_id = alloc();
        let font_regular_id = alloc();
        let font_bold_id = alloc();

        pdf.type1_font(font_regular_id)
            .base_font(Name(b"Helvetica"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));
        pdf.type1_font(font_bold_id)
            .base_font(Name(b"Helvetica-Bold"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));

        let image_refs: Vec<Ref> = self
            .images
            .iter()
            .map(|img| {
                let id = alloc();
                let mut xobj = pdf.image_xobject(id, &img.data);
                xobj.filter(Filter::DctDecode);
                xobj.width(img.width_px)
                    .height(img.height_px)
                    .bits_per_component(8);
                xobj.color_space().device_rgb();
                id
            })
            .collect();

        let n = self.pages.len();
        let page_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();
        let content_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();

        for (i, content) in self.pages.into_iter().enumerate() {
            let raw = content.finish();
            let compressed = compress_to_vec_zlib(&raw, 6);
            pdf.stream(content_ids[i], &compressed)
                .filter(Filter::FlateDecode);
        }

        pdf.catalog(catalog_id).pages(pages_id);
        pdf.pages(pages_id)
            .kids(page_ids.iter().copied())
            .count(n as i32);

        let media = Rect::new(
            0.0,
            0.0,
            (self.width_mm * MM_TO_PT) as f32,
            (self.height_mm * MM_TO_PT) as f32,
        );
        for i in 0..n {
            let mut page = pdf.page(page_ids[i]);
            page.media_box(media).parent(pages_id).contents(content_ids[i]);
            let mut resources = page.resources();
            {
                let mut fonts = resources.fonts();
                fonts.pair(Name(b"F1"), font_regular_id);
                fonts.pair(Name(b"F2"), font_bold_id);
            }
            if !self.images.is_empty() {
                let mut xobjects = resources.x_objects();
                for (img, id) in self.images.iter().zip(&image_refs) {
                    xobjects.pair(Name(img.name.as_bytes()), *id);
                }
            }
        }

        pdf.finish()
    }
}

impl Surface for PdfSurface {
    fn add_page(&mut self) {
        self.pages.push(Content::new());
    }

    fn text(&mut self, x: f64, y: f64, text: &str, style: &TextStyle) {
        let bytes = win_ansi_bytes(text);
        let font = if style.bold { b"F2".as_slice() } else { b"F1".as_slice() };
        let size = style.size as f32;
        let (tx, ty) = (self.x_pt(x), self.y_pt(y));
        let color = style.color;
        let content = self.content();
        Self::set_fill(content, color);
        content
            .begin_text()
            .set_font(Name(font), size)
            .next_line(tx, ty)
            .show(Str(&bytes))
            .end_text();
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, width: f64, color: Color) {
        let (ax, ay) = (self.x_pt(x1), self.y_pt(y1));
        let (bx, by) = (self.x_pt(x2), self.y_pt(y2));
        let w = (width * MM_TO_PT) as f32;
        let content = self.content();
        Self::set_stroke(content, color);
        content
            .set_line_width(w)
            .move_to(ax, ay)
            .line_to(bx, by)
            .stroke();
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color) {
        let px = self.x_pt(x);
        // Rect origin is the bottom-left corner.
        let py = self.y_pt(y + h);
        let (pw, ph) = ((w * MM_TO_PT) as f32, (h * MM_TO_PT) as f32);
        let content = self.content();
        Self::set_fill(content, color);
        content.rect(px, py, pw, ph).fill_nonzero();
    }

    fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64, width: f64, color: Color) {
        let px = self.x_pt(x);
        let py = self.y_pt(y + h);
        let (pw, ph) = ((w * MM_TO_PT) as f32, (h * MM_TO_PT) as f32);
        let lw = (width * MM_TO_PT) as f32;
        let content = self.content();
        Self::set_stroke(content, color);
        content.set_line_width(lw).rect(px, py, pw, ph).stroke();
    }

    fn image_jpeg(&mut self, data: &[u8], x: f64, y: f64, w: f64, h: f64) {
        let Some((width_px, height_px)) = jpeg_dimensions(data) else {
            return;
        };
        let name = format!("Im{}", self.images.len() + 1);
        self.images.push(PlacedImage {
            name: name.clone(),
            data: data.to_vec(),
            width_px,
            height_px,
        });
        let px = self.x_pt(x);
        let py = self.y_pt(y + h);
        let (pw, ph) = ((w * MM_TO_PT) as f32, (h * MM_TO_PT) as f32);
        let content = self.content();
        content
            .save_state()
            .transform([pw, 0.0, 0.0, ph, px, py])
            .x_object(Name(name.as_bytes()))
            .restore_state();
    }

    fn text_width(&self, text: &str, style: &TextStyle) -> f64 {
        let widths: &[u16; 95] = if style.bold {
            &HELVETICA_BOLD_WIDTHS
        } else {
            &HELVETICA_WIDTHS
        };
        let default = if style.bold { 611 } else { 556 };
        let units: u32 = text
            .chars()
            .map(|c| {
                let c = fold_accent(c);
                let code = c as u32;
                if (0x20..0x7f).contains(&code) {
                    widths[(code - 0x20) as usize] as u32
                } else {
                    default
                }
            })
            .sum();
        units as f64 / 1000.0 * style.size * crate::layout::PT_TO_MM
    }
}

/// Accented Latin-1 letters share the advance of their base glyph in
/// Helvetica, so width lookup folds them first.
fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'Á' | 'À' | 'Ä' | 'Â' => 'A',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'Ñ' => 'N',
        'Ç' => 'C',
        _ => c,
    }
}

fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if code <= 0xff {
                code as u8
            } else {
                match c {
                    '€' => 0x80,
                    '\u{2018}' => 0x91,
                    '\u{2019}' => 0x92,
                    '\u{201c}' => 0x93,
                    '\u{201d}' => 0x94,
                    '•' => 0x95,
                    '\u{2013}' => 0x96,
                    '\u{2014}' => 0x97,
                    '…' => 0x85,
                    _ => b'?',
                }
            }
        })
        .collect()
}

/// Extracts pixel dimensions from a JPEG SOF marker.
fn jpeg_dimensions(data: &[u8]) -> Option<(i32, i32)> {
    if data.len() < 4 || data[0] != 0xff || data[1] != 0xd8 {
        return None;
    }
    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xff {
            return None;
        }
        let marker = data[i + 1];
        // Standalone markers carry no length field.
        if (0xd0..=0xd9).contains(&marker) {
            i += 2;
            continue;
        }
        let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        if len < 2 {
            return None;
        }
        if matches!(marker, 0xc0 | 0xc1 | 0xc2) {
            if i + 9 > data.len() {
                return None;
            }
            let height = u16::from_be_bytes([data[i + 5], data[i + 6]]) as i32;
            let width = u16::from_be_bytes([data[i + 7], data[i + 8]]) as i32;
            return Some((width, height));
        }
        i += 2 + len;
    }
    None
}

// Helvetica AFM advance widths for codes 0x20..0x7f, in 1/1000 em.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333,
    278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278,
    584, 584, 584, 556, 1015, 667, 667, 722, 722, 667, 611, 778, 722, 278,
    500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556,
    278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500,
    278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333,
    278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333,
    584, 584, 584, 611, 975, 722, 722, 722, 722, 667, 611, 778, 722, 278,
    556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556,
    333, 611, 611, 278, 278, 556, 278, 889, 611, 611, 611, 611, 389, 556,
    333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];
