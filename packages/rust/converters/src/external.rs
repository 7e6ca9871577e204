//! Converters that shell out to an external binary.
//!
//! The file is written to a temporary path carrying its original extension;
//! `{input}` in the argument list is replaced with that path (or the path is
//! appended when no placeholder is present). Stdout is the Markdown.

use std::io::Write;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use contentplan_markdown::{extract_atx_headings, infer_title, normalize_whitespace};
use contentplan_shared::{ContentPlanError, DocumentMetadata, ExternalConverterConfig, Result};

use crate::converter::{Converted, FormatConverter, SourceFile, extension_list};
use crate::plain_text::normalize_line_endings;
use crate::process::ProcessRunner;

/// Placeholder replaced with the temporary input path.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Secondary command whose stdout is parsed into metadata.
#[derive(Clone)]
pub struct MetadataCommand {
    pub binary: String,
    pub args: Vec<String>,
    pub parse: fn(&str) -> DocumentMetadata,
}

pub struct ExternalConverter {
    id: String,
    binary: String,
    args: Vec<String>,
    extensions: Vec<String>,
    weight: i32,
    metadata_command: Option<MetadataCommand>,
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
    available: OnceLock<bool>,
}

impl ExternalConverter {
    pub fn new(
        id: impl Into<String>,
        binary: impl Into<String>,
        args: Vec<String>,
        extensions: Vec<String>,
        weight: i32,
        runner: Arc<dyn ProcessRunner>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            binary: binary.into(),
            args,
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            weight,
            metadata_command: None,
            runner,
            timeout,
            available: OnceLock::new(),
        }
    }

    pub fn from_config(
        config: &ExternalConverterConfig,
        runner: Arc<dyn ProcessRunner>,
        timeout: Duration,
    ) -> Self {
        Self::new(
            &config.id,
            &config.binary,
            config.args.clone(),
            config.extensions.clone(),
            config.weight,
            runner,
            timeout,
        )
    }

    pub fn with_metadata_command(mut self, command: MetadataCommand) -> Self {
        self.metadata_command = Some(command);
        self
    }

    fn failed(&self, file: &SourceFile, reason: impl Into<String>) -> ContentPlanError {
        ContentPlanError::processing_failed(&self.id, &file.filename, reason)
    }

    /// Write `file` to a temporary path ending in its extension.
    fn stage(&self, file: &SourceFile) -> Result<tempfile::NamedTempFile> {
        let suffix = match file.extension() {
            ext if ext.is_empty() => String::new(),
            ext => format!(".{ext}"),
        };
        let mut staged = tempfile::Builder::new()
            .prefix("contentplan-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| self.failed(file, format!("cannot create temporary file: {e}")))?;
        staged
            .write_all(&file.bytes)
            .and_then(|()| staged.flush())
            .map_err(|e| self.failed(file, format!("cannot write temporary file: {e}")))?;
        Ok(staged)
    }

    async fn run(
        &self,
        file: &SourceFile,
        binary: &str,
        args: &[String],
        input: &str,
    ) -> Result<String> {
        let args = substitute_input(args, input);
        let output = self
            .runner
            .run(binary, &args, self.timeout)
            .await
            .map_err(|e| self.failed(file, e.to_string()))?;

        if !output.success() {
            let code = output
                .exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let tail = output.stderr_tail();
            let reason = if tail.is_empty() {
                format!("{binary} exited with {code}")
            } else {
                format!("{binary} exited with {code}: {tail}")
            };
            return Err(self.failed(file, reason));
        }

        Ok(output.stdout_lossy())
    }

    async fn command_metadata(
        &self,
        file: &SourceFile,
        input: &str,
    ) -> Option<DocumentMetadata> {
        let command = self.metadata_command.as_ref()?;
        if !self.runner.is_available(&command.binary) {
            debug!(binary = %command.binary, "metadata command unavailable");
            return None;
        }
        match self.run(file, &command.binary, &command.args, input).await {
            Ok(stdout) => Some((command.parse)(&stdout)),
            Err(e) => {
                warn!(error = %e, "metadata extraction failed, continuing without it");
                None
            }
        }
    }
}

#[async_trait]
impl FormatConverter for ExternalConverter {
    fn id(&self) -> &str {
        &self.id
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn weight(&self) -> i32 {
        self.weight
    }

    fn requirements_met(&self) -> bool {
        *self
            .available
            .get_or_init(|| self.runner.is_available(&self.binary))
    }

    #[instrument(skip_all, fields(converter = %self.id, file = %file.filename))]
    async fn process(&self, file: &SourceFile) -> Result<Converted> {
        let staged = self.stage(file)?;
        let input = staged.path().to_string_lossy().into_owned();

        let stdout = self.run(file, &self.binary, &self.args, &input).await?;
        // pdftotext separates pages with form feeds
        let markdown = normalize_whitespace(&normalize_line_endings(&stdout).replace('\u{c}', "\n\n"));

        let headings = extract_atx_headings(&markdown);
        let mut metadata = DocumentMetadata {
            title: infer_title(&headings).or_else(|| first_line(&markdown)),
            headings,
            ..DocumentMetadata::default()
        };
        if let Some(extra) = self.command_metadata(file, &input).await {
            merge_metadata(&mut metadata, extra);
        }
        metadata.record_counts(&markdown);

        debug!(markdown_len = markdown.len(), "external conversion complete");
        Ok(Converted { markdown, metadata })
    }

    async fn extract_metadata(&self, file: &SourceFile) -> Result<DocumentMetadata> {
        if self.metadata_command.is_none() {
            return Ok(self.process(file).await?.metadata);
        }
        let staged = self.stage(file)?;
        let input = staged.path().to_string_lossy().into_owned();
        Ok(self
            .command_metadata(file, &input)
            .await
            .unwrap_or_default())
    }
}

fn substitute_input(args: &[String], input: &str) -> Vec<String> {
    if args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
        args.iter()
            .map(|a| a.replace(INPUT_PLACEHOLDER, input))
            .collect()
    } else {
        let mut args = args.to_vec();
        args.push(input.to_string());
        args
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Fields present in `extra` win; headings are kept from the conversion.
fn merge_metadata(base: &mut DocumentMetadata, extra: DocumentMetadata) {
    if extra.title.is_some() {
        base.title = extra.title;
    }
    if extra.author.is_some() {
        base.author = extra.author;
    }
    if extra.created_date.is_some() {
        base.created_date = extra.created_date;
    }
    if extra.language.is_some() {
        base.language = extra.language;
    }
    base.custom_properties.extend(extra.custom_properties);
}

// ---------------------------------------------------------------------------
// Built-in converters
// ---------------------------------------------------------------------------

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| a.to_string()).collect()
}

/// Parse `pdfinfo` output (`Key:   value` lines).
pub fn parse_pdfinfo(stdout: &str) -> DocumentMetadata {
    let mut metadata = DocumentMetadata::default();
    for line in stdout.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "Title" => metadata.title = Some(value.to_string()),
            "Author" => metadata.author = Some(value.to_string()),
            "CreationDate" => metadata.created_date = Some(value.to_string()),
            "Pages" => {
                metadata
                    .custom_properties
                    .insert("page_count".into(), value.to_string());
            }
            "Producer" => {
                metadata
                    .custom_properties
                    .insert("producer".into(), value.to_string());
            }
            _ => {}
        }
    }
    metadata
}

/// `pdftotext` (with `pdfinfo` metadata), `pandoc` and `markitdown`.
pub fn builtin_converters(runner: &Arc<dyn ProcessRunner>, timeout: Duration) -> Vec<ExternalConverter> {
    vec![
        ExternalConverter::new(
            "pdftotext",
            "pdftotext",
            args(&["-layout", "-enc", "UTF-8", INPUT_PLACEHOLDER, "-"]),
            extension_list(&["pdf"]),
            0,
            Arc::clone(runner),
            timeout,
        )
        .with_metadata_command(MetadataCommand {
            binary: "pdfinfo".into(),
            args: args(&[INPUT_PLACEHOLDER]),
            parse: parse_pdfinfo,
        }),
        ExternalConverter::new(
            "pandoc",
            "pandoc",
            args(&[INPUT_PLACEHOLDER, "--to", "gfm", "--wrap=none"]),
            extension_list(&["docx", "odt", "rtf", "epub"]),
            10,
            Arc::clone(runner),
            timeout,
        ),
        ExternalConverter::new(
            "markitdown",
            "markitdown",
            args(&[INPUT_PLACEHOLDER]),
            extension_list(&["pdf", "docx", "pptx", "xlsx"]),
            20,
            Arc::clone(runner),
            timeout,
        ),
    ]
}
