//! Generated cover image.
//!
//! A 1200×1800 grayscale PNG: a deterministic background seeded from the
//! book title, a white band with the wrapped title and article count, and a
//! small "deckle" label. Text uses the embedded-graphics mono fonts, drawn
//! through [`Canvas`], which scales every font pixel up to a square block.

use std::convert::Infallible;
use std::io::Cursor;

use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoFont, MonoTextStyle},
    pixelcolor::{Gray8, GrayColor},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use crate::config::CoverStyle;
use crate::error::DeckleError;
use crate::output::Article;

pub const COVER_WIDTH: u32 = 1200;
pub const COVER_HEIGHT: u32 = 1800;

const BAND_TOP: i32 = 650;
const BAND_BOTTOM: i32 = 1150;
const PAD_X: i32 = 80;

const TITLE_SCALE: i32 = 4;
const META_SCALE: i32 = 2;
const MAX_TITLE_LINES: usize = 4;

/// Render the cover PNG, or `None` for [`CoverStyle::None`].
pub fn generate_cover(
    title: &str,
    articles: &[Article],
    style: CoverStyle,
) -> Result<Option<Vec<u8>>, DeckleError> {
    if style == CoverStyle::None {
        return Ok(None);
    }

    let seed = sha1_smol::Sha1::from(title).digest().bytes();
    let mut img = GrayImage::from_pixel(COVER_WIDTH, COVER_HEIGHT, Luma([0xFF]));

    match style {
        CoverStyle::Pattern => draw_pattern(&mut img, &seed),
        CoverStyle::Collage => draw_collage(&mut img, &seed, articles),
        CoverStyle::None => {}
    }
    draw_title_block(&mut img, title, articles.len());

    let label = "deckle";
    let label_w = text_width(label, &FONT_10X20, META_SCALE);
    let label_h = FONT_10X20.character_size.height as i32 * META_SCALE;
    draw_text(
        &mut img,
        label,
        &FONT_10X20,
        META_SCALE,
        Point::new(COVER_WIDTH as i32 - 40 - label_w, COVER_HEIGHT as i32 - 40 - label_h),
    );

    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| DeckleError::EncodeFailure {
            reason: format!("cover PNG encode failed: {e}"),
        })?;
    Ok(Some(buf))
}

// ── Drawing surface ──────────────────────────────────────────────────────

/// A [`DrawTarget`] over a gray buffer that maps each logical pixel to a
/// `scale`×`scale` block at `offset`. Out-of-bounds pixels are clipped.
struct Canvas<'a> {
    img: &'a mut GrayImage,
    offset: Point,
    scale: i32,
}

impl<'a> Canvas<'a> {
    fn new(img: &'a mut GrayImage) -> Self {
        Self::scaled(img, Point::zero(), 1)
    }

    fn scaled(img: &'a mut GrayImage, offset: Point, scale: i32) -> Self {
        Self {
            img,
            offset,
            scale: scale.max(1),
        }
    }
}

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        let s = self.scale as u32;
        Size::new(self.img.width() / s, self.img.height() / s)
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Gray8;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (w, h) = (self.img.width() as i32, self.img.height() as i32);
        for Pixel(p, color) in pixels {
            let x0 = self.offset.x + p.x * self.scale;
            let y0 = self.offset.y + p.y * self.scale;
            for y in y0.max(0)..(y0 + self.scale).min(h) {
                for x in x0.max(0)..(x0 + self.scale).min(w) {
                    self.img.put_pixel(x as u32, y as u32, Luma([color.luma()]));
                }
            }
        }
        Ok(())
    }
}

// ── Backgrounds ──────────────────────────────────────────────────────────

/// 12×18 grid of circles, shade and radius taken from the seed; the rows
/// behind the title band stay empty.
fn draw_pattern(img: &mut GrayImage, seed: &[u8; 20]) {
    const COLS: usize = 12;
    const ROWS: usize = 18;
    let cell_w = (COVER_WIDTH as usize / COLS) as i32;
    let cell_h = (COVER_HEIGHT as usize / ROWS) as i32;

    let mut canvas = Canvas::new(img);
    for row in 0..ROWS {
        if (7..=11).contains(&row) {
            continue;
        }
        for col in 0..COLS {
            let idx = (row * COLS + col) % seed.len();
            let b = seed[idx] ^ ((row * 17 + col * 31) as u8);
            let shade = 0x30 + (b as u32 * (0xD0 - 0x30) / 255) as u8;

            let b2 = seed[(idx + 7) % seed.len()] ^ ((row * 13 + col * 41) as u8);
            let max_r = cell_w as f64 / 2.2;
            let min_r = max_r * 0.25;
            let radius = min_r + (max_r - min_r) * b2 as f64 / 255.0;

            let center = Point::new(
                col as i32 * cell_w + cell_w / 2,
                row as i32 * cell_h + cell_h / 2,
            );
            let _ = Circle::with_center(center, (radius * 2.0).round() as u32)
                .into_styled(PrimitiveStyle::with_fill(Gray8::new(shade)))
                .draw(&mut canvas);
        }
    }
}

/// Tiles above and below the title band, one article per tile.
fn draw_collage(img: &mut GrayImage, seed: &[u8; 20], articles: &[Article]) {
    let tiles = collage_tiles();

    for (t, rect) in tiles.iter().enumerate() {
        let shade = 0xC0 + seed[(t * 3) % seed.len()] % 0x30;
        fill_rect(img, *rect, Gray8::new(shade));
    }

    for (i, article) in articles.iter().enumerate() {
        let rect = tiles[i % tiles.len()];
        let shade = 0xC0 + seed[(i * 3 + 1) % seed.len()] % 0x30;
        fill_rect(img, rect, Gray8::new(shade));

        let pad = 24;
        let inner_w = rect.size.width as i32 - 2 * pad;
        let mut y = rect.top_left.y + pad;
        let line_h = FONT_10X20.character_size.height as i32 * META_SCALE + 6;

        for line in wrap_text(&article.title, &FONT_10X20, META_SCALE, inner_w, 4) {
            draw_text(img, &line, &FONT_10X20, META_SCALE, Point::new(rect.top_left.x + pad, y));
            y += line_h;
        }
        if let Some(site) = article.source.site_name.as_deref() {
            y += 8;
            for line in wrap_text(site, &FONT_10X20, 1, inner_w, 1) {
                draw_text(img, &line, &FONT_10X20, 1, Point::new(rect.top_left.x + pad, y));
            }
        }
    }
}

/// 2×2 tiles in the top band, 2×2 in the bottom band.
fn collage_tiles() -> Vec<Rectangle> {
    let gap = 12;
    let tile_w = (COVER_WIDTH as i32 - 3 * gap) / 2;
    let mut tiles = Vec::with_capacity(8);
    for (top, bottom) in [(0, BAND_TOP), (BAND_BOTTOM, COVER_HEIGHT as i32)] {
        let tile_h = (bottom - top - 3 * gap) / 2;
        for row in 0..2 {
            for col in 0..2 {
                tiles.push(Rectangle::new(
                    Point::new(gap + col * (tile_w + gap), top + gap + row * (tile_h + gap)),
                    Size::new(tile_w as u32, tile_h as u32),
                ));
            }
        }
    }
    tiles
}

fn fill_rect(img: &mut GrayImage, rect: Rectangle, color: Gray8) {
    let _ = rect
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(&mut Canvas::new(img));
}

// ── Title band ───────────────────────────────────────────────────────────

fn draw_title_block(img: &mut GrayImage, title: &str, article_count: usize) {
    let width = COVER_WIDTH as i32;
    fill_rect(
        img,
        Rectangle::new(
            Point::new(0, BAND_TOP),
            Size::new(COVER_WIDTH, (BAND_BOTTOM - BAND_TOP) as u32),
        ),
        Gray8::WHITE,
    );

    {
        let mut canvas = Canvas::new(img);
        let rule = PrimitiveStyle::with_stroke(Gray8::new(0x99), 1);
        for y in [BAND_TOP + 20, BAND_BOTTOM - 20] {
            let _ = Line::new(Point::new(PAD_X, y), Point::new(width - PAD_X - 1, y))
                .into_styled(rule)
                .draw(&mut canvas);
        }
    }

    let font = &FONT_10X20;
    let lines = wrap_text(title, font, TITLE_SCALE, width - 2 * PAD_X, MAX_TITLE_LINES);
    let line_h = font.character_size.height as i32 * TITLE_SCALE + 8;
    let meta_h = font.character_size.height as i32 * META_SCALE + 16;
    let total = lines.len() as i32 * line_h + meta_h;
    let mut y = BAND_TOP + (BAND_BOTTOM - BAND_TOP - total) / 2;

    for line in &lines {
        let x = (width - text_width(line, font, TITLE_SCALE)) / 2;
        draw_text(img, line, font, TITLE_SCALE, Point::new(x, y));
        y += line_h;
    }

    y += 16;
    let meta = if article_count == 1 {
        "1 article".to_string()
    } else {
        format!("{article_count} articles")
    };
    let x = (width - text_width(&meta, font, META_SCALE)) / 2;
    draw_text(img, &meta, font, META_SCALE, Point::new(x, y));
}

// ── Text ─────────────────────────────────────────────────────────────────

/// Draw black text with its top-left corner at `at`.
fn draw_text(img: &mut GrayImage, text: &str, font: &MonoFont<'_>, scale: i32, at: Point) {
    let style = MonoTextStyle::new(font, Gray8::BLACK);
    let mut canvas = Canvas::scaled(img, at, scale);
    let _ = Text::with_baseline(text, Point::zero(), style, Baseline::Top).draw(&mut canvas);
}

fn text_width(text: &str, font: &MonoFont<'_>, scale: i32) -> i32 {
    let advance = (font.character_size.width + font.character_spacing) as i32;
    text.chars().count() as i32 * advance * scale
}

/// Greedy word wrap by character count. Long words are split; lines past
/// `max_lines` are dropped and the last kept line ends in "...".
fn wrap_text(
    text: &str,
    font: &MonoFont<'_>,
    scale: i32,
    max_width: i32,
    max_lines: usize,
) -> Vec<String> {
    let advance = (font.character_size.width + font.character_spacing) as i32 * scale;
    let max_chars = (max_width / advance.max(1)).max(4) as usize;

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in ascii_fold(text).split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..max_chars).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }
        if current.is_empty() {
            current = word;
        } else if current.chars().count() + 1 + word.chars().count() <= max_chars {
            current.push(' ');
            current.push_str(&word);
        } else {
            lines.push(std::mem::replace(&mut current, word));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            let keep = max_chars.saturating_sub(3);
            if last.chars().count() > keep {
                *last = last.chars().take(keep).collect();
            }
            last.push_str("...");
        }
    }
    lines
}

/// Replace common typographic characters with ASCII the mono fonts can draw.
fn ascii_fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{2032}' => out.push('\''),
            '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{2033}' => out.push('"'),
            '\u{2010}'..='\u{2015}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{a0}' => out.push(' '),
            c if c.is_ascii() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}
