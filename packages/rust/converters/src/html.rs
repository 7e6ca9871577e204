//! HTML files go through the same normalizer as fetched webpages.

use async_trait::async_trait;
use encoding_rs::Encoding;

use contentplan_markdown::{ConvertOptions, convert_html, declared_charset, decode_html};
use contentplan_shared::Result;

use crate::converter::{Converted, FormatConverter, SourceFile, extension_list};
use crate::plain_text::decode_text;

pub struct HtmlConverter {
    extensions: Vec<String>,
}

impl HtmlConverter {
    pub fn new() -> Self {
        Self {
            extensions: extension_list(&["html", "htm", "xhtml"]),
        }
    }
}

impl Default for HtmlConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormatConverter for HtmlConverter {
    fn id(&self) -> &str {
        "html"
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn weight(&self) -> i32 {
        0
    }

    async fn process(&self, file: &SourceFile) -> Result<Converted> {
        let html = decode_saved_page(&file.bytes);
        let converted = convert_html(&html, &ConvertOptions::new(&file.filename))?;
        Ok(Converted {
            markdown: converted.markdown,
            metadata: converted.metadata,
        })
    }
}

/// A BOM wins, then an in-band `<meta>`/XML declaration, then plain-text detection.
fn decode_saved_page(bytes: &[u8]) -> String {
    if Encoding::for_bom(bytes).is_none() && declared_charset(None, bytes).is_some() {
        return decode_html(None, bytes);
    }
    decode_text(bytes).0
}
