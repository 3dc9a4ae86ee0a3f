use anyhow::{Context, Result, anyhow};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerIndex, PdfLayerReference, PdfPageIndex,
};
use tracing::warn;

use crate::capture::{CaptureBridge, CaptureRequest, MapWidgetFactory, WidgetKind};
use crate::data::{DocumentAsset, EncodedBitmap, ExportOptions, ImageAsset, ProjectSnapshot};
use crate::export::StatusSink;
use crate::normalize::{self, ImageLoader};
use crate::theme;

mod annex;
mod chrome;

const BODY_SIZE_PT: f32 = 10.0;
const LINE_MM: f32 = 4.6;
const BLOCK_GAP_MM: f32 = 5.0;
const COVER_BAND_MM: f32 = 12.0;
const PLAN_PREVIEW_WIDTH_MM: f32 = 120.0;

/// Local map first, then global; fixed, never interleaved.
const MAP_ORDER: [WidgetKind; 2] = [WidgetKind::Local, WidgetKind::Global];

/// Running vertical write position (mm from the page top) and page index.
#[derive(Debug, Clone, Copy)]
pub struct PageCursor {
    pub y: f32,
    pub page: usize,
}

pub struct ComposedDocument {
    pub bytes: Vec<u8>,
    pub outline: Vec<String>,
    pub page_count: usize,
}

/// Owns the page/cursor state machine and draws every section in canonical
/// order. Map bitmaps come from the capture bridge, photo/plan bitmaps from
/// the normalizer; either may be absent, in which case the section is omitted
/// whole.
pub struct Compositor<'a> {
    doc: PdfDocumentReference,
    pages: Vec<(PdfPageIndex, PdfLayerIndex)>,
    cursor: PageCursor,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    outline: Vec<String>,
    loader: &'a dyn ImageLoader,
    bridge: &'a CaptureBridge,
    widgets: &'a dyn MapWidgetFactory,
}

impl<'a> Compositor<'a> {
    pub fn new(
        title: &str,
        loader: &'a dyn ImageLoader,
        bridge: &'a CaptureBridge,
        widgets: &'a dyn MapWidgetFactory,
    ) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(
            title,
            Mm(theme::PAGE_WIDTH_MM),
            Mm(theme::PAGE_HEIGHT_MM),
            "content",
        );
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .with_context(|| "failed to register the body font")?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .with_context(|| "failed to register the heading font")?;
        Ok(Self {
            doc,
            pages: vec![(page, layer)],
            cursor: PageCursor {
                y: theme::MARGIN_TOP_MM,
                page: 0,
            },
            regular,
            bold,
            outline: Vec::new(),
            loader,
            bridge,
            widgets,
        })
    }

    pub async fn compose(
        mut self,
        project: &ProjectSnapshot,
        options: &ExportOptions,
        images: &[ImageAsset],
        documents: &[DocumentAsset],
        status: &dyn StatusSink,
    ) -> Result<ComposedDocument> {
        if !project.location.lat.is_finite() || !project.location.lon.is_finite() {
            return Err(anyhow!(
                "project '{}' has malformed coordinates",
                project.name
            ));
        }
        self.draw_cover_band(project);
        self.draw_title(project);
        self.draw_info_card(project);
        if options.cover_photo {
            self.draw_cover_photo(images).await?;
        }
        if options.local_map || options.global_map {
            status.update("preparing maps");
        }
        for kind in MAP_ORDER {
            let enabled = match kind {
                WidgetKind::Local => options.local_map,
                WidgetKind::Global => options.global_map,
            };
            if enabled {
                status.update(&format!("capturing {} view", kind.as_str()));
                self.draw_map(kind, project).await?;
            }
        }
        if options.description {
            self.draw_description(project);
        }
        if options.progress_chart {
            self.draw_progress(project);
        }
        if options.document_annex {
            self.draw_annex(images, documents).await?;
        }
        status.update("finalizing");
        self.draw_footers(project);

        let page_count = self.pages.len();
        let outline = std::mem::take(&mut self.outline);
        let bytes = self.save()?;
        Ok(ComposedDocument {
            bytes,
            outline,
            page_count,
        })
    }

    fn layer(&self) -> PdfLayerReference {
        let (page, layer) = self.pages[self.cursor.page];
        self.doc.get_page(page).get_layer(layer)
    }

    /// Page-break rule: a block that would cross the bottom margin moves to
    /// the top of a fresh page. Blocks are never split.
    fn ensure_room(&mut self, block_height_mm: f32) {
        if self.cursor.y + block_height_mm > theme::PAGE_HEIGHT_MM - theme::MARGIN_BOTTOM_MM {
            let (page, layer) = self.doc.add_page(
                Mm(theme::PAGE_WIDTH_MM),
                Mm(theme::PAGE_HEIGHT_MM),
                "content",
            );
            self.pages.push((page, layer));
            self.cursor.page = self.pages.len() - 1;
            self.cursor.y = theme::MARGIN_TOP_MM;
        }
    }

    fn section_header(&mut self, caption: &str) {
        let layer = self.layer();
        chrome::section_header(&layer, &self.bold, self.cursor.y, caption);
        self.cursor.y += chrome::SECTION_HEADER_MM;
    }

    /// Embeds an already-reserved bitmap at the left margin. Callers reserve
    /// room (including the trailing gap) before drawing.
    fn place_bitmap(&mut self, bitmap: &EncodedBitmap, width_mm: f32) -> Result<()> {
        let decoded = printpdf::image_crate::load_from_memory(&bitmap.bytes)
            .with_context(|| "failed to decode bitmap for embedding")?;
        let height_mm = width_mm * bitmap.height_px as f32 / bitmap.width_px as f32;
        let dpi = bitmap.width_px as f32 * 25.4 / width_mm;
        let image = Image::from_dynamic_image(&decoded);
        image.add_to_layer(
            self.layer(),
            ImageTransform {
                translate_x: Some(Mm(theme::MARGIN_LEFT_MM)),
                translate_y: Some(Mm(
                    theme::PAGE_HEIGHT_MM - self.cursor.y - height_mm,
                )),
                rotate: None,
                scale_x: Some(1.0),
                scale_y: Some(1.0),
                dpi: Some(dpi),
            },
        );
        self.cursor.y += height_mm + BLOCK_GAP_MM;
        Ok(())
    }

    fn draw_cover_band(&mut self, project: &ProjectSnapshot) {
        let layer = self.layer();
        chrome::filled_rect(&layer, 0.0, 0.0, theme::PAGE_WIDTH_MM, COVER_BAND_MM, theme::ACCENT);
        chrome::text_right(
            &layer,
            &self.bold,
            9.0,
            theme::PAGE_WIDTH_MM - theme::MARGIN_RIGHT_MM,
            7.5,
            theme::WHITE,
            &format!("Technical report, {}", project.status.label().to_lowercase()),
        );
        self.outline.push("cover-band".to_string());
    }

    fn draw_title(&mut self, project: &ProjectSnapshot) {
        self.ensure_room(18.0);
        let layer = self.layer();
        chrome::text(
            &layer,
            &self.bold,
            19.0,
            theme::MARGIN_LEFT_MM,
            self.cursor.y + 7.0,
            theme::INK,
            &project.name,
        );
        chrome::text(
            &layer,
            &self.regular,
            11.0,
            theme::MARGIN_LEFT_MM,
            self.cursor.y + 13.5,
            theme::MUTED,
            &format!("{}, {}", project.structure_type, project.country),
        );
        self.cursor.y += 18.0;
        self.outline.push("title".to_string());
    }

    fn draw_info_card(&mut self, project: &ProjectSnapshot) {
        const ROW_MM: f32 = 7.0;
        let rows = [
            ("Country", project.country.clone()),
            ("Structure", project.structure_type.clone()),
            ("Status", project.status.label().to_string()),
            (
                "Coordinates",
                format!("{:.5}, {:.5}", project.location.lat, project.location.lon),
            ),
        ];
        let card_height = ROW_MM * rows.len() as f32 + 5.0;
        self.ensure_room(card_height + BLOCK_GAP_MM);
        let layer = self.layer();
        let width = theme::content_width_mm();
        chrome::filled_rect(
            &layer,
            theme::MARGIN_LEFT_MM,
            self.cursor.y,
            width,
            card_height,
            theme::CARD_FILL,
        );
        chrome::stroked_rect(
            &layer,
            theme::MARGIN_LEFT_MM,
            self.cursor.y,
            width,
            card_height,
            theme::RULE,
            0.6,
        );
        for (index, (label, value)) in rows.iter().enumerate() {
            let baseline = self.cursor.y + 7.5 + ROW_MM * index as f32;
            chrome::text(
                &layer,
                &self.bold,
                9.5,
                theme::MARGIN_LEFT_MM + 4.0,
                baseline,
                theme::MUTED,
                label,
            );
            chrome::text(
                &layer,
                &self.regular,
                BODY_SIZE_PT,
                theme::MARGIN_LEFT_MM + 42.0,
                baseline,
                theme::INK,
                value,
            );
        }
        self.cursor.y += card_height + BLOCK_GAP_MM;
        self.outline.push("info-card".to_string());
    }

    /// The "last photo" of the project is the cover art. A missing or
    /// unloadable photo drops the whole block and the export continues.
    async fn draw_cover_photo(&mut self, images: &[ImageAsset]) -> Result<()> {
        let Some(asset) = images.last() else {
            self.outline.push("cover-photo: omitted (no photo)".to_string());
            return Ok(());
        };
        match normalize::normalize(
            self.loader,
            &asset.url,
            normalize::COVER_ASPECT,
            normalize::CORNER_RADIUS_PX,
        )
        .await
        {
            Ok(bitmap) => {
                let width = theme::content_width_mm();
                let height = width * bitmap.height_px as f32 / bitmap.width_px as f32;
                self.ensure_room(height + BLOCK_GAP_MM);
                self.place_bitmap(&bitmap, width)?;
                self.outline.push("cover-photo: placed".to_string());
            }
            Err(err) => {
                warn!("cover photo '{}' skipped: {err:#}", asset.name);
                self.outline
                    .push("cover-photo: omitted (load failed)".to_string());
            }
        }
        Ok(())
    }

    async fn draw_map(&mut self, kind: WidgetKind, project: &ProjectSnapshot) -> Result<()> {
        let caption = match kind {
            WidgetKind::Local => "Project location",
            WidgetKind::Global => "Overview map",
        };
        let request = CaptureRequest::new(kind, project.location);
        let widget = self.widgets.create(&request);
        match self.bridge.capture(&request, widget).await {
            Some(bitmap) => {
                let width = theme::content_width_mm();
                let height = width * bitmap.height_px as f32 / bitmap.width_px as f32;
                self.ensure_room(chrome::SECTION_HEADER_MM + height + BLOCK_GAP_MM);
                self.section_header(caption);
                self.place_bitmap(&bitmap, width)?;
                self.outline.push(format!("map-{}: placed", kind.as_str()));
            }
            None => {
                self.outline
                    .push(format!("map-{}: omitted (capture failed)", kind.as_str()));
            }
        }
        Ok(())
    }

    fn draw_description(&mut self, project: &ProjectSnapshot) {
        self.ensure_room(chrome::SECTION_HEADER_MM + 2.0 * LINE_MM);
        self.section_header("Description");
        let lines = chrome::wrap_text(
            &project.description,
            BODY_SIZE_PT,
            theme::content_width_mm(),
        );
        for line in lines {
            self.ensure_room(LINE_MM);
            let layer = self.layer();
            chrome::text(
                &layer,
                &self.regular,
                BODY_SIZE_PT,
                theme::MARGIN_LEFT_MM,
                self.cursor.y + 3.6,
                theme::INK,
                &line,
            );
            self.cursor.y += LINE_MM;
        }
        self.cursor.y += BLOCK_GAP_MM;
        self.outline.push("description".to_string());
    }

    fn draw_progress(&mut self, project: &ProjectSnapshot) {
        const ROW_MM: f32 = 8.0;
        let rows = project.progress.rows();
        self.ensure_room(chrome::SECTION_HEADER_MM + ROW_MM * rows.len() as f32 + BLOCK_GAP_MM);
        self.section_header("Progress");
        let track_x = theme::MARGIN_LEFT_MM + 38.0;
        for (label, value) in rows {
            let layer = self.layer();
            let baseline = self.cursor.y + 4.4;
            chrome::text(
                &layer,
                &self.regular,
                9.5,
                theme::MARGIN_LEFT_MM,
                baseline,
                theme::INK,
                label,
            );
            chrome::filled_rect(
                &layer,
                track_x,
                self.cursor.y + 1.2,
                theme::PROGRESS_TRACK_MM,
                4.2,
                theme::TRACK_FILL,
            );
            let fill = theme::progress_fill_mm(value, theme::PROGRESS_TRACK_MM);
            if fill > 0.0 {
                chrome::filled_rect(
                    &layer,
                    track_x,
                    self.cursor.y + 1.2,
                    fill,
                    4.2,
                    theme::progress_tier(value).color(),
                );
            }
            chrome::text(
                &layer,
                &self.bold,
                9.5,
                track_x + theme::PROGRESS_TRACK_MM + 4.0,
                baseline,
                theme::INK,
                &format!("{} %", value),
            );
            self.cursor.y += ROW_MM;
        }
        self.cursor.y += BLOCK_GAP_MM;
        self.outline.push("progress-chart".to_string());
    }

    async fn draw_annex(&mut self, images: &[ImageAsset], documents: &[DocumentAsset]) -> Result<()> {
        let partition = annex::partition(documents);
        if partition.plans.is_empty() && partition.others.is_empty() {
            self.outline.push("annex: empty".to_string());
            return Ok(());
        }
        self.ensure_room(chrome::SECTION_HEADER_MM + LINE_MM);
        self.section_header("Documents");

        for document in partition.plans {
            let Some(illustration) = annex::match_plan_image(document, images) else {
                self.annex_line(&document.name);
                self.outline.push(format!("annex: {} (line)", document.name));
                continue;
            };
            match normalize::normalize(
                self.loader,
                &illustration.url,
                normalize::PLAN_ASPECT,
                normalize::CORNER_RADIUS_PX,
            )
            .await
            {
                Ok(bitmap) => {
                    let height = PLAN_PREVIEW_WIDTH_MM * bitmap.height_px as f32
                        / bitmap.width_px as f32;
                    self.ensure_room(6.5 + height + BLOCK_GAP_MM);
                    let layer = self.layer();
                    chrome::text(
                        &layer,
                        &self.bold,
                        10.5,
                        theme::MARGIN_LEFT_MM,
                        self.cursor.y + 4.2,
                        theme::INK,
                        &document.name,
                    );
                    self.cursor.y += 6.5;
                    self.place_bitmap(&bitmap, PLAN_PREVIEW_WIDTH_MM)?;
                    self.outline
                        .push(format!("annex: {} (preview)", document.name));
                }
                Err(err) => {
                    warn!(
                        "plan illustration '{}' skipped: {err:#}",
                        illustration.name
                    );
                    self.annex_line(&document.name);
                    self.outline.push(format!("annex: {} (line)", document.name));
                }
            }
        }
        for document in partition.others {
            self.annex_line(&document.name);
            self.outline.push(format!("annex: {} (line)", document.name));
        }
        self.cursor.y += BLOCK_GAP_MM;
        Ok(())
    }

    fn annex_line(&mut self, name: &str) {
        self.ensure_room(LINE_MM);
        let layer = self.layer();
        chrome::text(
            &layer,
            &self.regular,
            BODY_SIZE_PT,
            theme::MARGIN_LEFT_MM + 2.0,
            self.cursor.y + 3.6,
            theme::INK,
            &format!("- {}", name),
        );
        self.cursor.y += LINE_MM;
    }

    /// Needs the final page count, so it runs as a distinct pass after all
    /// content is drawn.
    fn draw_footers(&mut self, project: &ProjectSnapshot) {
        let total = self.pages.len();
        for (index, (page, layer)) in self.pages.iter().enumerate() {
            let layer = self.doc.get_page(*page).get_layer(*layer);
            chrome::hline(
                &layer,
                theme::MARGIN_LEFT_MM,
                theme::PAGE_HEIGHT_MM - 12.0,
                theme::content_width_mm(),
                theme::RULE,
                0.3,
            );
            chrome::text(
                &layer,
                &self.regular,
                8.0,
                theme::MARGIN_LEFT_MM,
                theme::PAGE_HEIGHT_MM - 7.5,
                theme::MUTED,
                &format!("{}, confidential", project.name),
            );
            chrome::text_right(
                &layer,
                &self.regular,
                8.0,
                theme::PAGE_WIDTH_MM - theme::MARGIN_RIGHT_MM,
                theme::PAGE_HEIGHT_MM - 7.5,
                theme::MUTED,
                &format!("page {} / {}", index + 1, total),
            );
        }
        self.outline.push(format!("footer x {}", total));
    }

    fn save(self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        {
            let mut writer = std::io::BufWriter::new(&mut bytes);
            self.doc
                .save(&mut writer)
                .with_context(|| "failed to write pdf")?;
        }
        Ok(bytes)
    }
}
