//! Document format converters and the registry that selects between them.
//!
//! This crate provides:
//! - [`FormatConverter`]: extension-matched, weighted converters
//! - [`ConverterRegistry`]: picks the lowest-weight converter whose requirements are met
//! - Built-ins for plain text, Markdown (with frontmatter) and HTML files
//! - [`ExternalConverter`]: `pdftotext`, `pandoc`, `markitdown` and user-declared binaries,
//!   run through the [`ProcessRunner`] capability

pub mod converter;
pub mod external;
pub mod html;
pub mod language;
pub mod markdown;
pub mod plain_text;
pub mod process;
pub mod registry;

pub use converter::{Converted, FormatConverter, SourceFile};
pub use external::{ExternalConverter, MetadataCommand, builtin_converters};
pub use html::HtmlConverter;
pub use markdown::MarkdownConverter;
pub use plain_text::PlainTextConverter;
pub use process::{ProcessError, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use registry::ConverterRegistry;
