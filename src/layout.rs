//! Page layout over an abstract drawing surface.
//!
//! Coordinates are millimeters with the origin at the top-left corner of the
//! page, matching the geometry the composer procedures were written against.
//! The engine owns the vertical cursor and the page-break decision; what a
//! "block" looks like is entirely the caller's business.

/// 1 pt in mm.
pub const PT_TO_MM: f64 = 0.352_778;

const TOP_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Color {
    Gray(f64),
    Rgb(u8, u8, u8),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// Font size in points.
    pub size: f64,
    pub bold: bool,
    pub color: Color,
}

impl TextStyle {
    pub fn body(size: f64) -> Self {
        Self {
            size,
            bold: false,
            color: Color::Gray(0.0),
        }
    }

    pub fn bold(size: f64) -> Self {
        Self {
            size,
            bold: true,
            color: Color::Gray(0.0),
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Line advance in mm for this size.
    pub fn line_height(&self) -> f64 {
        self.size * PT_TO_MM * 1.3
    }
}

/// Drawing backend. The PDF surface implements this for real output; tests
/// use a recording fake with fixed metrics.
pub trait Surface {
    fn add_page(&mut self);
    /// `y` is the text baseline.
    fn text(&mut self, x: f64, y: f64, text: &str, style: &TextStyle);
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, width: f64, color: Color);
    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color);
    fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64, width: f64, color: Color);
    /// Best-effort: non-JPEG payloads are ignored.
    fn image_jpeg(&mut self, data: &[u8], x: f64, y: f64, w: f64, h: f64);
    fn text_width(&self, text: &str, style: &TextStyle) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMetrics {
    pub width: f64,
    pub height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
}

impl PageMetrics {
    /// A4 portrait with the report chrome's margins: content starts below
    /// the 32 mm header band and stops above the footer rule.
    pub fn a4_portrait() -> Self {
        Self {
            width: 210.0,
            height: 297.0,
            margin_top: 36.0,
            margin_bottom: 20.0,
            margin_left: 15.0,
            margin_right: 15.0,
        }
    }

    pub fn a4_landscape() -> Self {
        Self {
            width: 297.0,
            height: 210.0,
            margin_top: 36.0,
            margin_bottom: 20.0,
            margin_left: 15.0,
            margin_right: 15.0,
        }
    }

    pub fn content_width(&self) -> f64 {
        self.width - self.margin_left - self.margin_right
    }

    /// Lowest y a block may reach.
    pub fn limit_y(&self) -> f64 {
        self.height - self.margin_bottom
    }
}

/// Running header/footer drawn around the content on every page.
pub trait PageChrome<S: Surface + ?Sized> {
    fn draw_header(&self, surface: &mut S, page_number: u32);
    fn draw_footer(&self, surface: &mut S, page_number: u32);
}

/// Chrome that draws nothing; used by tests and bare fragments.
pub struct NoChrome;

impl<S: Surface + ?Sized> PageChrome<S> for NoChrome {
    fn draw_header(&self, _surface: &mut S, _page_number: u32) {}
    fn draw_footer(&self, _surface: &mut S, _page_number: u32) {}
}

/// Vertical cursor state machine for one document. Each composition owns
/// exactly one engine; nothing is shared across documents.
pub struct LayoutEngine<'a, S: Surface, C: PageChrome<S>> {
    surface: &'a mut S,
    metrics: PageMetrics,
    chrome: &'a C,
    cursor_y: f64,
    page_number: u32,
}

impl<'a, S: Surface, C: PageChrome<S>> LayoutEngine<'a, S, C> {
    /// Opens page 1 and draws its header.
    pub fn new(surface: &'a mut S, metrics: PageMetrics, chrome: &'a C) -> Self {
        chrome.draw_header(surface, 1);
        Self {
            surface,
            metrics,
            chrome,
            cursor_y: metrics.margin_top,
            page_number: 1,
        }
    }

    pub fn metrics(&self) -> &PageMetrics {
        &self.metrics
    }

    pub fn cursor(&self) -> f64 {
        self.cursor_y
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn at_page_top(&self) -> bool {
        (self.cursor_y - self.metrics.margin_top).abs() < TOP_EPSILON
    }

    /// Whether a block of this height fits on the current page.
    pub fn fits(&self, height: f64) -> bool {
        self.cursor_y + height <= self.metrics.limit_y()
    }

    pub fn advance(&mut self, dy: f64) {
        self.cursor_y += dy;
    }

    /// Footer, fresh page, header, cursor back to the top margin.
    pub fn page_break(&mut self) {
        self.chrome.draw_footer(self.surface, self.page_number);
        self.surface.add_page();
        self.page_number += 1;
        self.chrome.draw_header(self.surface, self.page_number);
        self.cursor_y = self.metrics.margin_top;
    }

    /// Breaks first if the estimated height would cross the bottom margin,
    /// then hands the surface and the block's top `y` to the draw closure.
    /// The cursor advances by the height the closure actually reports, not
    /// by the estimate, so estimation drift never compounds.
    ///
    /// A block taller than a whole page is still drawn, at the top of a
    /// fresh page, and simply overflows; the next placement breaks again.
    pub fn place<F>(&mut self, est_height: f64, draw: F) -> f64
    where
        F: FnOnce(&mut S, f64) -> f64,
    {
        if !self.fits(est_height) && !self.at_page_top() {
            self.page_break();
        }
        let y = self.cursor_y;
        let actual = draw(self.surface, y);
        self.cursor_y += actual;
        y
    }

    pub fn surface(&mut self) -> &mut S {
        self.surface
    }

    /// Flushes the footer of the last page and reports the page count.
    pub fn finish(self) -> u32 {
        self.chrome.draw_footer(self.surface, self.page_number);
        self.page_number
    }
}

/// Greedy word wrap against the surface's text metrics. Words wider than a
/// whole line are hard-broken by character.
pub fn wrap_text<S: Surface + ?Sized>(
    surface: &S,
    text: &str,
    style: &TextStyle,
    max_width: f64,
) -> Vec<String> {
    let mut lines = Vec::new();
    for raw_line in text.split('\n') {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if surface.text_width(&candidate, style) <= max_width || current.is_empty() {
                current = candidate;
                while surface.text_width(&current, style) > max_width && current.chars().count() > 1
                {
                    // Largest prefix that fits, but always at least one char.
                    let mut split_at = current.chars().next().map(char::len_utf8).unwrap_or(1);
                    for (i, _) in current.char_indices().skip(1) {
                        if surface.text_width(&current[..i], style) <= max_width {
                            split_at = i;
                        } else {
                            break;
                        }
                    }
                    let rest = current.split_off(split_at);
                    lines.push(std::mem::take(&mut current));
                    current = rest;
                }
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

// --- Table helper ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub header: String,
    pub width: f64,
    pub align: Align,
}

impl Column {
    pub fn new(header: impl Into<String>, width: f64) -> Self {
        Self {
            header: header.into(),
            width,
            align: Align::Left,
        }
    }

    pub fn aligned(mut self, align: Align) -> Self {
        self.align = align;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableTheme {
    /// Every cell stroked.
    Grid,
    /// Alternating row fill, no inner strokes.
    Striped,
}

#[derive(Debug, Clone)]
pub struct TableStyle {
    pub theme: TableTheme,
    pub head_fill: Color,
    pub head_text: Color,
    pub font_size: f64,
    pub cell_padding: f64,
}

impl TableStyle {
    pub fn grid(head_fill: Color) -> Self {
        Self {
            theme: TableTheme::Grid,
            head_fill,
            head_text: Color::Gray(1.0),
            font_size: 9.0,
            cell_padding: 1.5,
        }
    }

    pub fn striped(head_fill: Color) -> Self {
        Self {
            theme: TableTheme::Striped,
            ..Self::grid(head_fill)
        }
    }

    pub fn sized(mut self, font_size: f64) -> Self {
        self.font_size = font_size;
        self
    }
}

fn cell_lines<S: Surface>(
    surface: &S,
    text: &str,
    style: &TextStyle,
    column: &Column,
    padding: f64,
) -> Vec<String> {
    wrap_text(surface, text, style, (column.width - 2.0 * padding).max(1.0))
}

fn row_height(line_counts: usize, line_h: f64, padding: f64) -> f64 {
    line_counts.max(1) as f64 * line_h + 2.0 * padding
}

fn draw_cells<S: Surface>(
    surface: &mut S,
    x0: f64,
    y: f64,
    height: f64,
    columns: &[Column],
    cells: &[Vec<String>],
    style: &TextStyle,
    padding: f64,
) {
    let line_h = style.line_height();
    let mut x = x0;
    for (column, lines) in columns.iter().zip(cells) {
        for (i, line) in lines.iter().enumerate() {
            let baseline = y + padding + line_h * (i as f64 + 0.8);
            if baseline > y + height {
                break;
            }
            let tx = match column.align {
                Align::Left => x + padding,
                Align::Center => x + (column.width - surface.text_width(line, style)) / 2.0,
                Align::Right => x + column.width - padding - surface.text_width(line, style),
            };
            surface.text(tx, baseline, line, style);
        }
        x += column.width;
    }
}

/// Places a table through the engine row by row, re-drawing the styled
/// header row after every page break, in the manner of jspdf-autotable.
pub fn draw_table<S: Surface, C: PageChrome<S>>(
    engine: &mut LayoutEngine<'_, S, C>,
    columns: &[Column],
    rows: &[Vec<String>],
    style: &TableStyle,
) {
    let x0 = engine.metrics().margin_left;
    let total_width: f64 = columns.iter().map(|c| c.width).sum();
    let head_style = TextStyle {
        size: style.font_size,
        bold: true,
        color: style.head_text,
    };
    let body_style = TextStyle::body(style.font_size);
    let padding = style.cell_padding;
    let line_h = body_style.line_height();

    let draw_head = |engine: &mut LayoutEngine<'_, S, C>| {
        let cells: Vec<Vec<String>> = columns
            .iter()
            .map(|c| cell_lines(engine.surface(), &c.header, &head_style, c, padding))
            .collect();
        let height = row_height(
            cells.iter().map(Vec::len).max().unwrap_or(1),
            head_style.line_height(),
            padding,
        );
        engine.place(height, |surface, y| {
            surface.fill_rect(x0, y, total_width, height, style.head_fill);
            draw_cells(surface, x0, y, height, columns, &cells, &head_style, padding);
            height
        });
    };

    draw_head(engine);

    for (row_index, row) in rows.iter().enumerate() {
        let cells: Vec<Vec<String>> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let text = row.get(i).map(String::as_str).unwrap_or("");
                cell_lines(engine.surface(), text, &body_style, c, padding)
            })
            .collect();
        let height = row_height(
            cells.iter().map(Vec::len).max().unwrap_or(1),
            line_h,
            padding,
        );

        if !engine.fits(height) && !engine.at_page_top() {
            engine.page_break();
            draw_head(engine);
        }

        let theme = style.theme;
        engine.place(height, |surface, y| {
            if theme == TableTheme::Striped && row_index % 2 == 1 {
                surface.fill_rect(x0, y, total_width, height, Color::Gray(0.94));
            }
            draw_cells(surface, x0, y, height, columns, &cells, &body_style, padding);
            if theme == TableTheme::Grid {
                let mut x = x0;
                for column in columns {
                    surface.stroke_rect(x, y, column.width, height, 0.2, Color::Gray(0.5));
                    x += column.width;
                }
            } else {
                surface.line(x0, y + height, x0 + total_width, y + height, 0.1, Color::Gray(0.8));
            }
            height
        });
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{small_metrics, FakeSurface, Op};
    use super::*;
    use std::cell::RefCell;

    struct CountingChrome {
        headers: RefCell<Vec<u32>>,
        footers: RefCell<Vec<u32>>,
    }

    impl CountingChrome {
        fn new() -> Self {
            Self {
                headers: RefCell::new(Vec::new()),
                footers: RefCell::new(Vec::new()),
            }
        }
    }

    impl PageChrome<FakeSurface> for CountingChrome {
        fn draw_header(&self, _s: &mut FakeSurface, page: u32) {
            self.headers.borrow_mut().push(page);
        }
        fn draw_footer(&self, _s: &mut FakeSurface, page: u32) {
            self.footers.borrow_mut().push(page);
        }
    }

    #[test]
    fn blocks_flow_and_break_at_the_bottom_margin() {
        let mut surface = FakeSurface::new();
        let chrome = CountingChrome::new();
        let mut engine = LayoutEngine::new(&mut surface, small_metrics(), &chrome);

        // Limit is y=90, so two 30 mm blocks fit per page; the third and
        // fourth open page 2 at the top margin.
        let mut tops = Vec::new();
        for _ in 0..4 {
            tops.push(engine.place(30.0, |_, _| 30.0));
        }
        assert_eq!(tops, vec![10.0, 40.0, 10.0, 40.0]);
        assert_eq!(engine.page_number(), 2);

        let pages = engine.finish();
        assert_eq!(pages, 2);
        assert_eq!(*chrome.headers.borrow(), vec![1, 2]);
        assert_eq!(*chrome.footers.borrow(), vec![1, 2]);
    }

    #[test]
    fn page_count_is_minimal_and_blocks_stay_inside_margins() {
        let mut surface = FakeSurface::new();
        let metrics = small_metrics();
        let mut engine = LayoutEngine::new(&mut surface, metrics, &NoChrome);

        let heights = [25.0, 25.0, 25.0, 25.0, 25.0, 25.0, 25.0];
        let mut placed = Vec::new();
        for h in heights {
            let y = engine.place(h, |_, _| h);
            placed.push((engine.page_number(), y, h));
        }
        // 80 mm usable per page, 25 mm blocks -> 3 per page, 7 blocks -> 3 pages.
        let pages = engine.finish();
        assert_eq!(pages, 3);
        for (_, y, h) in &placed {
            assert!(*y >= metrics.margin_top - 1e-9);
            assert!(y + h <= metrics.limit_y() + 1e-9);
        }
    }

    #[test]
    fn oversized_block_overflows_gracefully() {
        let mut surface = FakeSurface::new();
        let mut engine = LayoutEngine::new(&mut surface, small_metrics(), &NoChrome);

        engine.place(20.0, |_, _| 20.0);
        // Taller than a whole page: breaks once, draws at the fresh top, and
        // is allowed to run past the limit.
        let y = engine.place(200.0, |_, _| 200.0);
        assert_eq!(y, 10.0);
        assert_eq!(engine.page_number(), 2);
        // The next block breaks again instead of stacking on the overflow.
        engine.place(20.0, |_, _| 20.0);
        assert_eq!(engine.page_number(), 3);
        assert_eq!(engine.finish(), 3);
    }

    #[test]
    fn cursor_advances_by_actual_height_not_estimate() {
        let mut surface = FakeSurface::new();
        let mut engine = LayoutEngine::new(&mut surface, small_metrics(), &NoChrome);
        engine.place(10.0, |_, _| 17.5);
        assert!((engine.cursor() - 27.5).abs() < 1e-9);
    }

    #[test]
    fn wrap_text_splits_on_width_and_newlines() {
        let surface = FakeSurface::new();
        let style = TextStyle::body(10.0);
        // 0.5 * 10pt * PT_TO_MM per char ≈ 1.76 mm; 20 mm fits ~11 chars.
        let lines = wrap_text(&surface, "uno dos tres cuatro", &style, 20.0);
        assert!(lines.len() >= 2);
        assert_eq!(lines.join(" "), "uno dos tres cuatro");

        let lines = wrap_text(&surface, "línea\notra", &style, 50.0);
        assert_eq!(lines, vec!["línea".to_string(), "otra".to_string()]);
    }

    #[test]
    fn table_redraws_header_after_break() {
        let mut surface = FakeSurface::new();
        let chrome = NoChrome;
        let mut engine = LayoutEngine::new(&mut surface, small_metrics(), &chrome);

        let columns = vec![Column::new("Alumno", 40.0), Column::new("Nota", 20.0)];
        let rows: Vec<Vec<String>> = (0..30)
            .map(|i| vec![format!("Fila {i}"), format!("{i}")])
            .collect();
        draw_table(
            &mut engine,
            &columns,
            &rows,
            &TableStyle::grid(Color::Rgb(41, 128, 185)),
        );
        let pages = engine.finish();
        assert!(pages > 1, "30 rows cannot fit one 80 mm page");

        // One header per page: the head fill is the only full-width fill in
        // a grid table.
        let head_fills = surface
            .ops
            .iter()
            .filter(|op| matches!(op, Op::FillRect { .. }))
            .count();
        assert_eq!(head_fills as u32, pages);
        for page in 1..=pages as usize {
            assert!(surface.texts_on_page(page).contains(&"Alumno"));
        }
    }
}
