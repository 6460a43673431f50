/// PDF serialization of laid out catalog blocks
///
/// Geometry comes from [`LayoutSettings`] in points; printpdf works in
/// millimetres, so every coordinate goes through [`mm`]. The y axis runs
/// upwards from the page bottom.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder};
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, ColorBits, ColorSpace, Image, ImageFilter, ImageTransform, ImageXObject,
    IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Point,
    Polygon, Px, Rgb,
};

use super::layout::{Block, Cell, GridBlock, HeaderBand, TocEntry};
use crate::catalog::settings::LayoutSettings;
use crate::color::Swatch;
use crate::error::{CatalogError, CatalogResult};

const PT_TO_MM: f32 = 25.4 / 72.0;

/// Space around content inside a cell
const CELL_PADDING: f32 = 3.0;
/// Most lines a wrapped name may take
const NAME_LINES: usize = 3;

const WHITE: Swatch = Swatch::rgb(0xFF, 0xFF, 0xFF);
const BLACK: Swatch = Swatch::rgb(0x00, 0x00, 0x00);
const GREY: Swatch = Swatch::rgb(0x80, 0x80, 0x80);
const DARK_GREY: Swatch = Swatch::rgb(0xA9, 0xA9, 0xA9);
const RED: Swatch = Swatch::rgb(0xFF, 0x00, 0x00);
const BORDER: Swatch = Swatch::rgb(0xD3, 0xD3, 0xD3);

/// Font size, weight and fill of one kind of text line
#[derive(Debug, Clone, Copy)]
struct TextStyle {
    size: f32,
    bold: bool,
    color: Swatch,
}

impl TextStyle {
    const fn new(size: f32, bold: bool, color: Swatch) -> Self {
        Self { size, bold, color }
    }

    fn width(&self, text: &str) -> f32 {
        text_width(text, self.size, self.bold)
    }

    /// Same font, different fill
    const fn with_color(self, color: Swatch) -> Self {
        Self { color, ..self }
    }
}

const TITLE: TextStyle = TextStyle::new(24.0, true, BLACK);
const HEADING: TextStyle = TextStyle::new(14.0, true, BLACK);
const TOC: TextStyle = TextStyle::new(10.0, false, BLACK);
const SECTION: TextStyle = TextStyle::new(16.0, true, BLACK);
const HEADER: TextStyle = TextStyle::new(9.0, true, WHITE);
const NAME: TextStyle = TextStyle::new(7.0, true, BLACK);
const DETAIL: TextStyle = TextStyle::new(6.0, false, GREY);

fn mm(points: f32) -> Mm {
    Mm(points * PT_TO_MM)
}

fn pdf_color(swatch: Swatch) -> Color {
    let (r, g, b) = swatch.to_unit();
    Color::Rgb(Rgb::new(r, g, b, None))
}

/// Rough Helvetica advance width; good enough for centering and wrapping
pub fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    let per_glyph = if bold { 0.56 } else { 0.5 };
    text.chars().count() as f32 * size * per_glyph
}

/// Greedy word wrap into at most `max_lines` lines of `max_width` points
pub fn wrap_text(text: &str, size: f32, bold: bool, max_width: f32, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if current.is_empty() || text_width(&candidate, size, bold) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.truncate(max_lines);
    lines
}

/// A cached JPEG, read once per document and embedded as-is (DCTDecode)
struct Embedded {
    width: u32,
    height: u32,
    color_space: ColorSpace,
    jpeg: Vec<u8>,
}

impl Embedded {
    fn read(path: &Path) -> CatalogResult<Self> {
        let jpeg = std::fs::read(path)?;
        let decoder = JpegDecoder::new(Cursor::new(jpeg.as_slice()))?;
        let (width, height) = decoder.dimensions();
        let color_space = match decoder.color_type() {
            ColorType::Rgb8 => ColorSpace::Rgb,
            ColorType::L8 => ColorSpace::Greyscale,
            other => {
                return Err(CatalogError::Render(format!(
                    "{}: unsupported JPEG color type {:?}",
                    path.display(),
                    other
                )))
            }
        };
        Ok(Self {
            width,
            height,
            color_space,
            jpeg,
        })
    }
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// Drawing state while walking the block list
struct PageWriter<'a> {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    layout: &'a LayoutSettings,
    fonts: Fonts,
    images: HashMap<PathBuf, Rc<Embedded>>,
    /// Top of the free area, in points from the page bottom
    y: f32,
    pages: usize,
    /// Whether anything was drawn on the current page
    dirty: bool,
}

impl<'a> PageWriter<'a> {
    fn new(title: &str, layout: &'a LayoutSettings) -> CatalogResult<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, mm(layout.page_width), mm(layout.page_height), "Layer 1");
        let fonts = Fonts {
            regular: doc
                .add_builtin_font(BuiltinFont::Helvetica)
                .map_err(|e| CatalogError::Render(e.to_string()))?,
            bold: doc
                .add_builtin_font(BuiltinFont::HelveticaBold)
                .map_err(|e| CatalogError::Render(e.to_string()))?,
        };
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            layout,
            fonts,
            images: HashMap::new(),
            y: layout.page_height - layout.margin_top,
            pages: 1,
            dirty: false,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(
            mm(self.layout.page_width),
            mm(self.layout.page_height),
            "Layer 1",
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = self.layout.page_height - self.layout.margin_top;
        self.pages += 1;
        self.dirty = false;
    }

    /// Start a new page unless `height` points still fit on this one
    fn ensure(&mut self, height: f32) {
        if self.dirty && self.y - height < self.layout.margin_bottom {
            self.new_page();
        }
    }

    fn content_width(&self) -> f32 {
        self.layout.page_width - self.layout.margin_left - self.layout.margin_right
    }

    fn font(&self, bold: bool) -> &IndirectFontRef {
        if bold {
            &self.fonts.bold
        } else {
            &self.fonts.regular
        }
    }

    fn text(&self, text: &str, style: TextStyle, x: f32, baseline: f32) {
        self.layer.set_fill_color(pdf_color(style.color));
        self.layer
            .use_text(text, style.size, mm(x), mm(baseline), self.font(style.bold));
    }

    /// Center `text` horizontally in the span starting at `left`
    fn centered_text(&self, text: &str, style: TextStyle, (left, width): (f32, f32), baseline: f32) {
        let x = left + ((width - style.width(text)) / 2.0).max(0.0);
        self.text(text, style, x, baseline);
    }

    fn rect_points(x: f32, y: f32, w: f32, h: f32) -> Vec<(Point, bool)> {
        vec![
            (Point::new(mm(x), mm(y)), false),
            (Point::new(mm(x + w), mm(y)), false),
            (Point::new(mm(x + w), mm(y + h)), false),
            (Point::new(mm(x), mm(y + h)), false),
        ]
    }

    fn fill_rect(&self, x: f32, y: f32, w: f32, h: f32, color: Swatch) {
        self.layer.set_fill_color(pdf_color(color));
        self.layer.add_polygon(Polygon {
            rings: vec![Self::rect_points(x, y, w, h)],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        });
    }

    fn stroke_rect(&self, x: f32, y: f32, w: f32, h: f32, color: Swatch) {
        self.layer.set_outline_color(pdf_color(color));
        self.layer.set_outline_thickness(0.5);
        self.layer.add_line(Line {
            points: Self::rect_points(x, y, w, h),
            is_closed: true,
        });
    }

    fn embedded(&mut self, path: &Path) -> CatalogResult<Rc<Embedded>> {
        if let Some(embedded) = self.images.get(path) {
            return Ok(embedded.clone());
        }
        let embedded = Rc::new(Embedded::read(path)?);
        self.images.insert(path.to_path_buf(), embedded.clone());
        Ok(embedded)
    }

    /// Place an image so it fills `width` points, bottom-left at (x, y)
    fn image(&mut self, path: &Path, x: f32, y: f32, width: f32) -> CatalogResult<()> {
        let embedded = self.embedded(path)?;
        let image = Image::from(ImageXObject {
            width: Px(embedded.width as usize),
            height: Px(embedded.height as usize),
            color_space: embedded.color_space,
            bits_per_component: ColorBits::Bit8,
            interpolate: true,
            image_data: embedded.jpeg.clone(),
            image_filter: Some(ImageFilter::DCT),
            clipping_bbox: None,
            smask: None,
        });
        // Pixels per inch that make the image exactly `width` points wide
        let dpi = embedded.width as f32 / (width / 72.0);
        image.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(mm(x)),
                translate_y: Some(mm(y)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        Ok(())
    }

    fn write_block(&mut self, block: &Block) -> CatalogResult<()> {
        match block {
            Block::Title(title) => {
                self.ensure(TITLE.size * 1.5);
                self.y -= TITLE.size * 1.2;
                let span = (self.layout.margin_left, self.content_width());
                self.centered_text(title, TITLE, span, self.y);
                self.dirty = true;
            }
            Block::Spacer(height) => {
                if self.y - height < self.layout.margin_bottom {
                    self.new_page();
                } else {
                    self.y -= height;
                }
            }
            Block::Heading(heading) => {
                self.ensure(HEADING.size * 2.0);
                self.y -= HEADING.size * 1.4;
                self.text(heading, HEADING, self.layout.margin_left, self.y);
                self.y -= HEADING.size * 0.4;
                self.dirty = true;
            }
            Block::TocEntry(TocEntry { label, count }) => {
                self.ensure(TOC.size * 1.4);
                self.y -= TOC.size * 1.4;
                let line = format!("- {} ({} items)", label, count);
                self.text(&line, TOC, self.layout.margin_left + 10.0, self.y);
                self.dirty = true;
            }
            Block::SectionTitle(title) => {
                // Keep the title with the header and first row that follow it
                let layout = self.layout;
                self.ensure(SECTION.size * 1.4 + layout.header_height + layout.cell_height);
                self.y -= SECTION.size * 1.4;
                let span = (layout.margin_left, self.content_width());
                self.centered_text(title, SECTION, span, self.y);
                self.dirty = true;
            }
            Block::Grid(grid) => self.write_grid(grid)?,
            Block::PageBreak => {
                if self.dirty {
                    self.new_page();
                }
            }
        }
        Ok(())
    }

    fn grid_left(&self) -> f32 {
        let grid_width = self.layout.columns as f32 * self.layout.cell_width;
        self.layout.margin_left + ((self.content_width() - grid_width) / 2.0).max(0.0)
    }

    fn header_band(&mut self, header: &HeaderBand) {
        let layout = self.layout;
        let left = self.grid_left();
        let width = layout.columns as f32 * layout.cell_width;
        let bottom = self.y - layout.header_height;
        self.fill_rect(left, bottom, width, layout.header_height, header.color);

        let label_width = HEADER.width(&header.label);
        let x = (left + width - CELL_PADDING * 2.0 - label_width).max(left);
        let baseline = bottom + (layout.header_height - HEADER.size * 0.7) / 2.0;
        self.text(&header.label, HEADER, x, baseline);
        self.y = bottom;
        self.dirty = true;
    }

    fn write_grid(&mut self, grid: &GridBlock) -> CatalogResult<()> {
        let layout = self.layout;
        self.ensure(layout.header_height + layout.cell_height);
        self.header_band(&grid.header);

        for (index, page) in grid.pages.iter().enumerate() {
            if index > 0 {
                self.new_page();
                self.header_band(&grid.header);
            }
            for row in &page.rows {
                if self.y - layout.cell_height < layout.margin_bottom {
                    self.new_page();
                    self.header_band(&grid.header);
                }
                let top = self.y;
                let mut left = self.grid_left();
                for cell in row {
                    self.stroke_rect(left, top - layout.cell_height, layout.cell_width, layout.cell_height, BORDER);
                    if let Some(cell) = cell {
                        self.write_cell(cell, left, top)?;
                    }
                    left += layout.cell_width;
                }
                self.y = top - layout.cell_height;
            }
        }
        Ok(())
    }

    fn write_cell(&mut self, cell: &Cell, left: f32, top: f32) -> CatalogResult<()> {
        let layout = self.layout;
        let image_left = left + ((layout.cell_width - layout.image_width) / 2.0).max(0.0);
        let image_bottom = top - CELL_PADDING - layout.image_height;
        self.image(&cell.image, image_left, image_bottom, layout.image_width)?;

        let span = (left, layout.cell_width);
        let text_width_max = layout.cell_width - CELL_PADDING * 2.0;
        let mut baseline = image_bottom - NAME.size - 1.0;
        for line in wrap_text(&cell.name, NAME.size, NAME.bold, text_width_max, NAME_LINES) {
            self.centered_text(&line, NAME, span, baseline);
            baseline -= NAME.size + 1.0;
        }

        let mut details = vec![(cell.code_line.as_str(), DETAIL)];
        if let Some(author) = &cell.author_line {
            details.push((author.as_str(), DETAIL.with_color(DARK_GREY)));
        }
        details.push((cell.price_line.as_str(), DETAIL.with_color(RED)));
        for (line, style) in details {
            self.centered_text(line, style, span, baseline);
            baseline -= style.size + 1.0;
        }
        Ok(())
    }

    fn save(self, output: &Path) -> CatalogResult<usize> {
        let pages = self.pages;
        let mut writer = BufWriter::new(File::create(output)?);
        let saved = self
            .doc
            .save(&mut writer)
            .map_err(|e| CatalogError::Render(e.to_string()))
            .and_then(|()| writer.flush().map_err(CatalogError::from));
        if let Err(err) = saved {
            drop(writer);
            // Never leave a truncated document behind
            let _ = std::fs::remove_file(output);
            return Err(err);
        }
        Ok(pages)
    }
}

/// Serialize `blocks` to a PDF at `output`; returns the page count
///
/// Synchronous and CPU-bound. Callers run it off the async executor.
pub fn render_document(
    title: &str,
    blocks: &[Block],
    layout: &LayoutSettings,
    output: &Path,
) -> CatalogResult<usize> {
    let mut writer = PageWriter::new(title, layout)?;
    for block in blocks {
        writer.write_block(block)?;
    }
    let pages = writer.save(output)?;
    tracing::info!(pages, path = %output.display(), "document written");
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::normalize::{write_placeholder, ImageSpec};
    use crate::render::layout::{paginate, GridPage};

    fn placeholder(dir: &Path) -> PathBuf {
        let path = dir.join("placeholder.jpg");
        let spec = ImageSpec { width: 14, height: 17, quality: 90 };
        write_placeholder(spec, Swatch::rgb(0xF0, 0xF0, 0xF0), &path).unwrap();
        path
    }

    fn cells(image: &Path, count: usize) -> Vec<Cell> {
        (0..count)
            .map(|i| Cell {
                image: image.to_path_buf(),
                name: format!("Product number {}", i),
                code_line: format!("ISBN: P{:03}", i),
                author_line: Some("Someone".into()),
                price_line: "Rs. 10 /=".into(),
            })
            .collect()
    }

    fn grid(label: &str, pages: Vec<GridPage>) -> Block {
        Block::Grid(GridBlock {
            header: HeaderBand {
                label: label.into(),
                color: Swatch::rgb(0x4E, 0x79, 0xA7),
            },
            pages,
        })
    }

    #[test]
    fn test_wrap_text() {
        let lines = wrap_text("Sample Mystery Book", NAME.size, true, 40.0, 3);
        assert!(lines.len() > 1);
        assert_eq!(lines.join(" "), "Sample Mystery Book");
        assert!(wrap_text("", NAME.size, true, 40.0, 3).is_empty());
        assert_eq!(wrap_text("a b c d e f", 10.0, false, 1.0, 2), vec!["a", "b"]);
    }

    #[test]
    fn test_render_counts_pages() {
        let dir = tempfile::tempdir().unwrap();
        let image = placeholder(dir.path());
        let output = dir.path().join("catalog.pdf");
        let layout = LayoutSettings::default();

        let blocks = vec![
            Block::Title("PRODUCT CATALOG".into()),
            Block::Spacer(20.0),
            Block::Heading("Categories (2 groups)".into()),
            Block::TocEntry(TocEntry { label: "Cooking".into(), count: 7 }),
            Block::TocEntry(TocEntry { label: "Fiction > Mystery".into(), count: 31 }),
            Block::PageBreak,
            Block::SectionTitle("COOKING".into()),
            grid("COOKING", paginate(cells(&image, 7), &layout)),
            Block::PageBreak,
            Block::SectionTitle("FICTION".into()),
            grid("FICTION > MYSTERY", paginate(cells(&image, 31), &layout)),
        ];

        let pages = render_document("PRODUCT CATALOG", &blocks, &layout, &output).unwrap();

        assert_eq!(pages, 4);
        let bytes = std::fs::read(&output).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_render_grid_without_cells() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("empty.pdf");
        let blocks = vec![Block::PageBreak, grid("NOTHING", Vec::new())];

        let pages = render_document("x", &blocks, &LayoutSettings::default(), &output).unwrap();

        // A break on an untouched page does not add a blank one
        assert_eq!(pages, 1);
        assert!(output.exists());
    }

    #[test]
    fn test_render_fails_on_unwritable_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missing").join("catalog.pdf");
        let result = render_document("x", &[Block::Title("T".into())], &LayoutSettings::default(), &output);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_fails_on_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("catalog.pdf");
        let blocks = vec![grid("X", paginate(cells(&dir.path().join("gone.jpg"), 1), &LayoutSettings::default()))];
        let result = render_document("x", &blocks, &LayoutSettings::default(), &output);
        assert!(matches!(result, Err(CatalogError::Io(_))));
    }

    #[test]
    fn test_render_fails_on_corrupt_image() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.jpg");
        std::fs::write(&broken, b"not a jpeg").unwrap();
        let output = dir.path().join("catalog.pdf");
        let blocks = vec![grid("X", paginate(cells(&broken, 1), &LayoutSettings::default()))];
        let result = render_document("x", &blocks, &LayoutSettings::default(), &output);
        assert!(matches!(result, Err(CatalogError::Image(_))));
    }

    #[test]
    fn test_full_page_of_shared_placeholder_stays_small() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("placeholder.jpg");
        let spec = ImageSpec { width: 560, height: 680, quality: 95 };
        write_placeholder(spec, Swatch::rgb(0xF0, 0xF0, 0xF0), &image).unwrap();
        let jpeg_len = std::fs::metadata(&image).unwrap().len();
        let output = dir.path().join("catalog.pdf");

        let blocks = vec![grid("ALL", paginate(cells(&image, 30), &LayoutSettings::default()))];
        render_document("x", &blocks, &LayoutSettings::default(), &output).unwrap();

        let size = std::fs::metadata(&output).unwrap().len();
        let raw_rgb = 30 * 560 * 680 * 3;
        // Every placement carries the cached JPEG, never decoded pixels
        assert!(size < 30 * jpeg_len + 200_000, "pdf is {} bytes", size);
        assert!(size < raw_rgb / 10, "pdf is {} bytes", size);
        let bytes = std::fs::read(&output).unwrap();
        assert!(bytes.windows(9).any(|w| w == b"DCTDecode"));
    }
}
