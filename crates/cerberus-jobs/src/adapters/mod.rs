//! Extractor implementations.

pub mod archive;
pub mod email;
pub mod ocr;
pub mod pdf;
pub mod spreadsheet;
pub mod text;

pub use archive::{member_media_type, ZipExtractor};
pub use email::EmailExtractor;
pub use ocr::OcrExtractor;
pub use pdf::{PdfExtractor, PdfPageSource, PopplerPageSource};
pub use spreadsheet::{CalamineReader, Sheet, SpreadsheetExtractor, WorkbookReader};
pub use text::TextExtractor;
