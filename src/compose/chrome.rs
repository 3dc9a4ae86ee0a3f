use printpdf::{
    Color, IndirectFontRef, Line, Mm, PdfLayerReference, Point, Polygon, PolygonMode, Rgb,
    WindingOrder,
};

use crate::theme::{self, Color3};

pub(crate) const PT_TO_MM: f32 = 0.352_778;

/// Average Helvetica advance in em; close enough for deterministic wrapping
/// and right alignment of the built-in font.
const AVG_ADVANCE_EM: f32 = 0.5;

pub(crate) fn pdf_color(color: Color3) -> Color {
    Color::Rgb(Rgb::new(color.r, color.g, color.b, None))
}

/// Cursor coordinates are measured from the top edge; printpdf's origin is
/// the bottom-left corner.
pub(crate) fn from_top(y_mm: f32) -> Mm {
    Mm(theme::PAGE_HEIGHT_MM - y_mm)
}

fn rect_points(x: f32, y_top: f32, width: f32, height: f32) -> Vec<(Point, bool)> {
    vec![
        (Point::new(Mm(x), from_top(y_top)), false),
        (Point::new(Mm(x + width), from_top(y_top)), false),
        (Point::new(Mm(x + width), from_top(y_top + height)), false),
        (Point::new(Mm(x), from_top(y_top + height)), false),
    ]
}

pub(crate) fn filled_rect(
    layer: &PdfLayerReference,
    x: f32,
    y_top: f32,
    width: f32,
    height: f32,
    color: Color3,
) {
    layer.set_fill_color(pdf_color(color));
    layer.add_polygon(Polygon {
        rings: vec![rect_points(x, y_top, width, height)],
        mode: PolygonMode::Fill,
        winding_order: WindingOrder::NonZero,
    });
}

pub(crate) fn stroked_rect(
    layer: &PdfLayerReference,
    x: f32,
    y_top: f32,
    width: f32,
    height: f32,
    color: Color3,
    thickness_pt: f32,
) {
    layer.set_outline_color(pdf_color(color));
    layer.set_outline_thickness(thickness_pt);
    layer.add_line(Line {
        points: rect_points(x, y_top, width, height),
        is_closed: true,
    });
}

pub(crate) fn hline(
    layer: &PdfLayerReference,
    x: f32,
    y_top: f32,
    width: f32,
    color: Color3,
    thickness_pt: f32,
) {
    layer.set_outline_color(pdf_color(color));
    layer.set_outline_thickness(thickness_pt);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(x), from_top(y_top)), false),
            (Point::new(Mm(x + width), from_top(y_top)), false),
        ],
        is_closed: false,
    });
}

/// `y_top` is the text baseline, measured from the top edge.
pub(crate) fn text(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    size_pt: f32,
    x: f32,
    y_top: f32,
    color: Color3,
    content: &str,
) {
    layer.set_fill_color(pdf_color(color));
    layer.use_text(content, size_pt, Mm(x), from_top(y_top), font);
}

pub(crate) fn text_right(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    size_pt: f32,
    right_x: f32,
    y_top: f32,
    color: Color3,
    content: &str,
) {
    let x = right_x - approx_text_width_mm(content, size_pt);
    text(layer, font, size_pt, x, y_top, color, content);
}

pub(crate) const SECTION_HEADER_MM: f32 = 12.0;

/// Colored tab + bold caption + rule; the primitive every named section opens
/// with. Advancing the cursor is the caller's job.
pub(crate) fn section_header(
    layer: &PdfLayerReference,
    bold: &IndirectFontRef,
    y_top: f32,
    caption: &str,
) {
    filled_rect(layer, theme::MARGIN_LEFT_MM, y_top + 0.5, 2.6, 7.0, theme::ACCENT);
    text(
        layer,
        bold,
        12.5,
        theme::MARGIN_LEFT_MM + 4.5,
        y_top + 5.8,
        theme::INK,
        caption,
    );
    hline(
        layer,
        theme::MARGIN_LEFT_MM,
        y_top + 9.2,
        theme::content_width_mm(),
        theme::RULE,
        0.4,
    );
}

pub(crate) fn approx_text_width_mm(content: &str, size_pt: f32) -> f32 {
    content.chars().count() as f32 * size_pt * AVG_ADVANCE_EM * PT_TO_MM
}

/// Greedy word wrap against the approximated Helvetica advance. A word longer
/// than the line is placed alone rather than split.
pub(crate) fn wrap_text(content: &str, size_pt: f32, max_width_mm: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in content.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if approx_text_width_mm(&candidate, size_pt) <= max_width_mm || current.is_empty() {
                current = candidate;
            } else {
                lines.push(current);
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}
