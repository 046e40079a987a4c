//! Per-operation conversion pipelines.
//!
//! Each operation builds its tool command line through a pure constructor
//! (unit-tested without running anything) and executes it inside the caller's
//! scratch directory through [`ToolInvocation`].

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::tools::ToolInvocation;
use super::ConversionError;
use crate::config::ToolConfig;

const PAGE_WIDTH_POINTS: u32 = 612;
const PAGE_HEIGHT_POINTS: u32 = 792;

/// Placement for text stamped onto a page. Coordinates are PDF points from
/// the bottom-left corner.
#[derive(Debug, Clone)]
pub struct TextPlacement {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    /// 1-based page the stamp lands on; `None` stamps every page.
    pub page: Option<u32>,
}

/// Region replaced by [`Converter::edit_text`]: the rectangle is painted
/// over before the new text is drawn inside it.
#[derive(Debug, Clone)]
pub struct TextEdit {
    pub new_text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    pub page: u32,
}

#[derive(Clone)]
pub struct Converter {
    tools: ToolConfig,
    timeout: Duration,
}

impl Converter {
    pub fn new(tools: ToolConfig, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    pub async fn merge_pdfs(
        &self,
        inputs: &[PathBuf],
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        if inputs.len() < 2 {
            return Err(ConversionError::InvalidParameters(
                "merge requires at least two documents".to_string(),
            ));
        }
        let output = scratch.join("merged.pdf");
        merge_invocation(&self.tools.qpdf, inputs, &output)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    pub async fn compress_pdf(
        &self,
        input: &Path,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let output = scratch.join("compressed.pdf");
        compress_invocation(&self.tools.ghostscript, input, &output)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    /// Stamp a diagonal gray watermark across every page. The overlay page is
    /// rendered once with ghostscript, then repeated over the whole document
    /// with qpdf.
    pub async fn watermark_pdf(
        &self,
        input: &Path,
        text: &str,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let overlay = self.render_overlay(&watermark_ps(text), scratch).await?;

        let output = scratch.join("watermarked.pdf");
        overlay_invocation(&self.tools.qpdf, input, &overlay, &output, None)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    pub async fn add_text(
        &self,
        input: &Path,
        placement: &TextPlacement,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let overlay = self
            .render_overlay(&stamp_ps(placement, TextColor::Black), scratch)
            .await?;

        let output = scratch.join("stamped.pdf");
        overlay_invocation(&self.tools.qpdf, input, &overlay, &output, placement.page)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    /// Annotations are the same overlay pipeline as [`Self::add_text`] drawn
    /// in red so they read as markup rather than content.
    pub async fn annotate(
        &self,
        input: &Path,
        placement: &TextPlacement,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let overlay = self
            .render_overlay(&stamp_ps(placement, TextColor::Red), scratch)
            .await?;

        let output = scratch.join("annotated.pdf");
        overlay_invocation(&self.tools.qpdf, input, &overlay, &output, placement.page)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    /// Whites out a rectangle and draws replacement text inside it on one
    /// page. This is a visual patch, not a content-stream rewrite; the
    /// original text remains in the file underneath.
    pub async fn edit_text(
        &self,
        input: &Path,
        edit: &TextEdit,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let overlay = self.render_overlay(&edit_ps(edit), scratch).await?;

        let output = scratch.join("edited.pdf");
        overlay_invocation(&self.tools.qpdf, input, &overlay, &output, Some(edit.page))
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    pub async fn remove_images(
        &self,
        input: &Path,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let output = scratch.join("no_images.pdf");
        remove_images_invocation(&self.tools.ghostscript, input, &output)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    pub async fn reorder_pages(
        &self,
        input: &Path,
        order: &[u32],
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let spec = page_list_spec(order)?;
        let output = scratch.join("reordered.pdf");
        reorder_invocation(&self.tools.qpdf, input, &spec, &output)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    /// Extract a contiguous page range into a new document.
    pub async fn split_pdf(
        &self,
        input: &Path,
        start_page: u32,
        end_page: u32,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let spec = page_range_spec(start_page, end_page)?;
        let output = scratch.join("split.pdf");
        reorder_invocation(&self.tools.qpdf, input, &spec, &output)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    pub async fn rotate_pages(
        &self,
        input: &Path,
        degrees: i32,
        pages: Option<&[u32]>,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let rotation = rotation_spec(degrees, pages)?;
        let output = scratch.join("rotated.pdf");
        rotate_invocation(&self.tools.qpdf, input, &rotation, &output)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    /// Render every page to a JPEG and bundle the pages into one zip so the
    /// result is a single derived document.
    pub async fn pdf_to_jpg_zip(
        &self,
        input: &Path,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let prefix = scratch.join("page");
        pdftoppm_invocation(&self.tools.pdftoppm, input, &prefix)
            .run(self.timeout)
            .await?;

        let mut pages: Vec<PathBuf> = std::fs::read_dir(scratch)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension().is_some_and(|ext| ext == "jpg")
                    && path
                        .file_name()
                        .is_some_and(|name| name.to_string_lossy().starts_with("page-"))
            })
            .collect();
        if pages.is_empty() {
            return Err(ConversionError::MissingOutput {
                tool: self.tools.pdftoppm.clone(),
            });
        }
        // pdftoppm zero-pads page numbers, so the lexical order is page order
        pages.sort();

        let output = scratch.join("pages.zip");
        zip_files(&pages, &output)?;
        Ok(output)
    }

    pub async fn extract_text(&self, input: &Path, scratch: &Path) -> Result<String, ConversionError> {
        let output = scratch.join("extracted.txt");
        pdftotext_invocation(&self.tools.pdftotext, input, &output)
            .run(self.timeout)
            .await?;

        // an empty text layer is a legitimate result for scanned documents
        Ok(tokio::fs::read_to_string(&output).await.unwrap_or_default())
    }

    pub async fn images_to_pdf(
        &self,
        inputs: &[PathBuf],
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        if inputs.is_empty() {
            return Err(ConversionError::InvalidParameters(
                "image-to-pdf requires at least one image".to_string(),
            ));
        }
        let output = scratch.join("images.pdf");
        img2pdf_invocation(&self.tools.img2pdf, inputs, &output)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    pub async fn pdf_to_epub(&self, input: &Path, scratch: &Path) -> Result<PathBuf, ConversionError> {
        self.ebook_convert(input, scratch.join("converted.epub")).await
    }

    pub async fn pdf_to_docx(&self, input: &Path, scratch: &Path) -> Result<PathBuf, ConversionError> {
        self.ebook_convert(input, scratch.join("converted.docx")).await
    }

    pub async fn office_to_pdf(
        &self,
        input: &Path,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        libreoffice_invocation(&self.tools.libreoffice, input, scratch)
            .run(self.timeout)
            .await?;

        // libreoffice names the output after the input stem
        let stem = input
            .file_stem()
            .ok_or_else(|| {
                ConversionError::InvalidParameters("input file has no name".to_string())
            })?
            .to_string_lossy();
        let output = scratch.join(format!("{}.pdf", stem));
        let metadata =
            tokio::fs::metadata(&output)
                .await
                .map_err(|_| ConversionError::MissingOutput {
                    tool: self.tools.libreoffice.clone(),
                })?;
        if metadata.len() == 0 {
            return Err(ConversionError::EmptyOutput {
                tool: self.tools.libreoffice.clone(),
            });
        }
        Ok(output)
    }

    async fn ebook_convert(
        &self,
        input: &Path,
        output: PathBuf,
    ) -> Result<PathBuf, ConversionError> {
        ebook_convert_invocation(&self.tools.ebook_convert, input, &output)
            .run_expecting(self.timeout, &output)
            .await?;
        Ok(output)
    }

    /// Render a one-page PostScript program to a PDF overlay page.
    async fn render_overlay(
        &self,
        program: &str,
        scratch: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let ps_path = scratch.join("overlay.ps");
        tokio::fs::write(&ps_path, program).await?;

        let overlay = scratch.join("overlay.pdf");
        ps_to_pdf_invocation(&self.tools.ghostscript, &ps_path, &overlay)
            .run_expecting(self.timeout, &overlay)
            .await?;
        Ok(overlay)
    }
}

enum TextColor {
    Black,
    Red,
}

fn merge_invocation(qpdf: &str, inputs: &[PathBuf], output: &Path) -> ToolInvocation {
    let mut invocation = ToolInvocation::new(qpdf).arg("--empty").arg("--pages");
    for input in inputs {
        invocation = invocation.path_arg(input);
    }
    invocation.arg("--").path_arg(output)
}

fn compress_invocation(gs: &str, input: &Path, output: &Path) -> ToolInvocation {
    ToolInvocation::new(gs)
        .arg("-sDEVICE=pdfwrite")
        .arg("-dCompatibilityLevel=1.4")
        .arg("-dPDFSETTINGS=/ebook")
        .arg("-dNOPAUSE")
        .arg("-dQUIET")
        .arg("-dBATCH")
        .arg(format!("-sOutputFile={}", output.display()))
        .path_arg(input)
}

fn ps_to_pdf_invocation(gs: &str, ps: &Path, output: &Path) -> ToolInvocation {
    ToolInvocation::new(gs)
        .arg("-q")
        .arg("-dBATCH")
        .arg("-dNOPAUSE")
        .arg("-sDEVICE=pdfwrite")
        .arg(format!("-dDEVICEWIDTHPOINTS={}", PAGE_WIDTH_POINTS))
        .arg(format!("-dDEVICEHEIGHTPOINTS={}", PAGE_HEIGHT_POINTS))
        .arg(format!("-sOutputFile={}", output.display()))
        .path_arg(ps)
}

/// Lay the one-page overlay over the input. `page` limits the overlay to a
/// single target page; otherwise the overlay page repeats over the whole
/// document.
fn overlay_invocation(
    qpdf: &str,
    input: &Path,
    overlay: &Path,
    output: &Path,
    page: Option<u32>,
) -> ToolInvocation {
    let mut invocation = ToolInvocation::new(qpdf)
        .path_arg(input)
        .arg("--overlay")
        .path_arg(overlay);
    invocation = match page {
        Some(page) => invocation.arg(format!("--to={}", page)),
        None => invocation.arg("--repeat=1-z"),
    };
    invocation.arg("--").path_arg(output)
}

fn remove_images_invocation(gs: &str, input: &Path, output: &Path) -> ToolInvocation {
    ToolInvocation::new(gs)
        .arg("-sDEVICE=pdfwrite")
        .arg("-dFILTERIMAGE")
        .arg("-dNOPAUSE")
        .arg("-dQUIET")
        .arg("-dBATCH")
        .arg(format!("-sOutputFile={}", output.display()))
        .path_arg(input)
}

fn reorder_invocation(qpdf: &str, input: &Path, spec: &str, output: &Path) -> ToolInvocation {
    ToolInvocation::new(qpdf)
        .arg("--empty")
        .arg("--pages")
        .path_arg(input)
        .arg(spec)
        .arg("--")
        .path_arg(output)
}

fn rotate_invocation(qpdf: &str, input: &Path, rotation: &str, output: &Path) -> ToolInvocation {
    ToolInvocation::new(qpdf)
        .path_arg(input)
        .path_arg(output)
        .arg(format!("--rotate={}", rotation))
}

fn pdftoppm_invocation(pdftoppm: &str, input: &Path, prefix: &Path) -> ToolInvocation {
    ToolInvocation::new(pdftoppm)
        .arg("-jpeg")
        .arg("-r")
        .arg("150")
        .path_arg(input)
        .path_arg(prefix)
}

fn pdftotext_invocation(pdftotext: &str, input: &Path, output: &Path) -> ToolInvocation {
    ToolInvocation::new(pdftotext)
        .arg("-layout")
        .path_arg(input)
        .path_arg(output)
}

fn img2pdf_invocation(img2pdf: &str, inputs: &[PathBuf], output: &Path) -> ToolInvocation {
    let mut invocation = ToolInvocation::new(img2pdf).arg("-o").path_arg(output);
    for input in inputs {
        invocation = invocation.path_arg(input);
    }
    invocation
}

fn ebook_convert_invocation(ebook_convert: &str, input: &Path, output: &Path) -> ToolInvocation {
    ToolInvocation::new(ebook_convert)
        .path_arg(input)
        .path_arg(output)
}

fn libreoffice_invocation(libreoffice: &str, input: &Path, out_dir: &Path) -> ToolInvocation {
    ToolInvocation::new(libreoffice)
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .path_arg(out_dir)
        .path_arg(input)
}

/// qpdf page list for reordering, e.g. `3,1,2`. Pages are 1-based.
fn page_list_spec(order: &[u32]) -> Result<String, ConversionError> {
    if order.is_empty() {
        return Err(ConversionError::InvalidParameters(
            "page order must not be empty".to_string(),
        ));
    }
    if order.contains(&0) {
        return Err(ConversionError::InvalidParameters(
            "page numbers are 1-based".to_string(),
        ));
    }
    Ok(order
        .iter()
        .map(|page| page.to_string())
        .collect::<Vec<_>>()
        .join(","))
}

/// qpdf contiguous range, e.g. `2-5`. Pages are 1-based and inclusive.
fn page_range_spec(start: u32, end: u32) -> Result<String, ConversionError> {
    if start == 0 {
        return Err(ConversionError::InvalidParameters(
            "page numbers are 1-based".to_string(),
        ));
    }
    if end < start {
        return Err(ConversionError::InvalidParameters(format!(
            "page range end {} is before start {}",
            end, start
        )));
    }
    Ok(format!("{}-{}", start, end))
}

/// qpdf rotation spec, e.g. `+90:1,3` or `+180` for all pages. Only right
/// angles are representable in PDF page rotation.
fn rotation_spec(degrees: i32, pages: Option<&[u32]>) -> Result<String, ConversionError> {
    let normalized = degrees.rem_euclid(360);
    if normalized == 0 || normalized % 90 != 0 {
        return Err(ConversionError::InvalidParameters(format!(
            "rotation must be a multiple of 90 degrees, got {}",
            degrees
        )));
    }

    match pages {
        Some(pages) => {
            let list = page_list_spec(pages)?;
            Ok(format!("+{}:{}", normalized, list))
        }
        None => Ok(format!("+{}", normalized)),
    }
}

/// PostScript strings delimit with parentheses; parens and backslashes in
/// user text must be escaped or the program breaks.
fn ps_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn watermark_ps(text: &str) -> String {
    format!(
        "%!PS\n\
         /Helvetica findfont 60 scalefont setfont\n\
         0.6 setgray\n\
         {cx} {cy} translate\n\
         45 rotate\n\
         ({text}) dup stringwidth pop 2 div neg 0 moveto show\n\
         showpage\n",
        cx = PAGE_WIDTH_POINTS / 2,
        cy = PAGE_HEIGHT_POINTS / 2,
        text = ps_escape(text),
    )
}

fn stamp_ps(placement: &TextPlacement, color: TextColor) -> String {
    let color_op = match color {
        TextColor::Black => "0 setgray",
        TextColor::Red => "1 0 0 setrgbcolor",
    };
    format!(
        "%!PS\n\
         /Helvetica findfont {size} scalefont setfont\n\
         {color_op}\n\
         {x} {y} moveto\n\
         ({text}) show\n\
         showpage\n",
        size = placement.font_size,
        x = placement.x,
        y = placement.y,
        text = ps_escape(&placement.text),
    )
}

fn edit_ps(edit: &TextEdit) -> String {
    format!(
        "%!PS\n\
         1 setgray\n\
         {x} {y} {w} {h} rectfill\n\
         0 setgray\n\
         /Helvetica findfont {size} scalefont setfont\n\
         {tx} {ty} moveto\n\
         ({text}) show\n\
         showpage\n",
        x = edit.x,
        y = edit.y,
        w = edit.width,
        h = edit.height,
        size = edit.font_size,
        tx = edit.x + 2.0,
        ty = edit.y + 2.0,
        text = ps_escape(&edit.new_text),
    )
}

fn zip_files(paths: &[PathBuf], output: &Path) -> Result<(), ConversionError> {
    let file = File::create(output)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "page.jpg".to_string());
        writer.start_file(name, options)?;
        let bytes = std::fs::read(path)?;
        writer.write_all(&bytes)?;
    }

    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_builds_qpdf_empty_pages_command() {
        let inputs = vec![PathBuf::from("/tmp/a.pdf"), PathBuf::from("/tmp/b.pdf")];
        let invocation = merge_invocation("qpdf", &inputs, Path::new("/tmp/out.pdf"));

        assert_eq!(invocation.program, "qpdf");
        assert_eq!(
            invocation.args,
            vec![
                "--empty",
                "--pages",
                "/tmp/a.pdf",
                "/tmp/b.pdf",
                "--",
                "/tmp/out.pdf"
            ]
        );
    }

    #[test]
    fn watermark_overlay_repeats_over_all_pages() {
        let invocation = overlay_invocation(
            "qpdf",
            Path::new("/tmp/in.pdf"),
            Path::new("/tmp/ov.pdf"),
            Path::new("/tmp/out.pdf"),
            None,
        );
        assert!(invocation.args.contains(&"--repeat=1-z".to_string()));
    }

    #[test]
    fn page_targeted_overlay_uses_to_range() {
        let invocation = overlay_invocation(
            "qpdf",
            Path::new("/tmp/in.pdf"),
            Path::new("/tmp/ov.pdf"),
            Path::new("/tmp/out.pdf"),
            Some(3),
        );
        assert!(invocation.args.contains(&"--to=3".to_string()));
        assert!(!invocation.args.iter().any(|a| a.starts_with("--repeat")));
    }

    #[test]
    fn rotation_spec_normalizes_angles() {
        assert_eq!(rotation_spec(90, None).unwrap(), "+90");
        assert_eq!(rotation_spec(-90, None).unwrap(), "+270");
        assert_eq!(rotation_spec(450, None).unwrap(), "+90");
        assert_eq!(rotation_spec(180, Some(&[1, 4])).unwrap(), "+180:1,4");
    }

    #[test]
    fn rotation_spec_rejects_non_right_angles() {
        assert!(rotation_spec(45, None).is_err());
        assert!(rotation_spec(0, None).is_err());
        assert!(rotation_spec(360, None).is_err());
    }

    #[test]
    fn page_list_spec_rejects_empty_and_zero_pages() {
        assert!(page_list_spec(&[]).is_err());
        assert!(page_list_spec(&[1, 0, 2]).is_err());
        assert_eq!(page_list_spec(&[3, 1, 2]).unwrap(), "3,1,2");
    }

    #[test]
    fn page_range_spec_is_inclusive_and_one_based() {
        assert_eq!(page_range_spec(2, 5).unwrap(), "2-5");
        assert_eq!(page_range_spec(3, 3).unwrap(), "3-3");
        assert!(page_range_spec(0, 4).is_err());
        assert!(page_range_spec(5, 2).is_err());
    }

    #[test]
    fn ps_escape_guards_string_delimiters() {
        assert_eq!(ps_escape("plain"), "plain");
        assert_eq!(ps_escape("a(b)c"), "a\\(b\\)c");
        assert_eq!(ps_escape("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn watermark_program_centers_and_rotates() {
        let program = watermark_ps("CONFIDENTIAL");
        assert!(program.contains("45 rotate"));
        assert!(program.contains("(CONFIDENTIAL)"));
        assert!(program.contains("306 396 translate"));
    }

    #[test]
    fn edit_program_paints_over_the_region_first() {
        let edit = TextEdit {
            new_text: "revised".to_string(),
            x: 100.0,
            y: 500.0,
            width: 200.0,
            height: 20.0,
            font_size: 12.0,
            page: 1,
        };
        let program = edit_ps(&edit);
        let fill = program.find("rectfill").unwrap();
        let text = program.find("(revised)").unwrap();
        assert!(fill < text);
    }

    #[test]
    fn zip_bundle_contains_every_page() {
        let scratch = tempfile::tempdir().unwrap();
        let mut pages = Vec::new();
        for i in 1..=3 {
            let path = scratch.path().join(format!("page-{}.jpg", i));
            std::fs::write(&path, format!("jpeg {}", i)).unwrap();
            pages.push(path);
        }
        let output = scratch.path().join("pages.zip");

        zip_files(&pages, &output).unwrap();

        let archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);
        let names: Vec<_> = archive.file_names().collect();
        assert!(names.contains(&"page-1.jpg"));
        assert!(names.contains(&"page-3.jpg"));
    }
}
