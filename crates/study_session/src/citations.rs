//! Citation rendering - turns annotated assistant text into footnoted text
//!
//! Each annotation marks a literal substring of the assistant's answer. The
//! substring is replaced by a numbered marker (`[1]`, `[2]`, ...) and a
//! matching footnote naming the source document is collected.

use std::collections::HashMap;

use study_client::{Annotation, ThreadMessage};
use study_core::DocumentHandle;

use crate::error::{Result, SessionError};

/// Maps service file ids to human-readable names.
pub trait FileRegistry {
    fn display_name(&self, file_id: &str) -> Option<String>;
}

/// In-memory registry, seeded from the session's documents and extended with
/// names looked up from the service.
#[derive(Debug, Clone, Default)]
pub struct FileNames {
    names: HashMap<String, String>,
}

impl FileNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a DocumentHandle>) -> Self {
        let mut names = Self::new();
        for document in documents {
            names.insert(document.id.clone(), document.display_name.clone());
        }
        names
    }

    pub fn insert(&mut self, file_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(file_id.into(), name.into());
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.names.contains_key(file_id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FileRegistry for FileNames {
    fn display_name(&self, file_id: &str) -> Option<String> {
        self.names.get(file_id).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanKind {
    /// A quote taken from a document.
    FileCitation { quote: Option<String> },
    /// A file produced by the assistant that can be downloaded.
    FilePath,
}

/// One citation ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSpan {
    pub matched_text: String,
    pub kind: SpanKind,
    pub source_file_name: String,
}

impl AnnotationSpan {
    pub fn file_citation(
        matched_text: impl Into<String>,
        quote: Option<&str>,
        source_file_name: impl Into<String>,
    ) -> Self {
        Self {
            matched_text: matched_text.into(),
            kind: SpanKind::FileCitation {
                quote: quote.map(str::to_string),
            },
            source_file_name: source_file_name.into(),
        }
    }

    pub fn file_path(matched_text: impl Into<String>, source_file_name: impl Into<String>) -> Self {
        Self {
            matched_text: matched_text.into(),
            kind: SpanKind::FilePath,
            source_file_name: source_file_name.into(),
        }
    }

    /// Footnote line for this span at 1-based position `index`.
    pub fn footnote(&self, index: usize) -> String {
        match &self.kind {
            SpanKind::FileCitation { quote: Some(quote) } if !quote.trim().is_empty() => {
                format!("[{index}] {quote} from {}", self.source_file_name)
            }
            SpanKind::FileCitation { .. } => format!("[{index}] from {}", self.source_file_name),
            SpanKind::FilePath => {
                format!("[{index}] Click here to download {}", self.source_file_name)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedMessage {
    pub rendered_text: String,
    pub footnotes: Vec<String>,
}

impl ResolvedMessage {
    /// Rendered text, a blank line, then one footnote per line.
    pub fn display(&self) -> String {
        format!("{}\n\n{}", self.rendered_text, self.footnotes.join("\n"))
    }
}

/// Replace each span's text with its marker and collect footnotes.
///
/// Spans are handled in the given order, and each replaces the first
/// remaining occurrence of its text. Repeated identical substrings are
/// therefore numbered by occurrence, not by their true position.
pub fn resolve(text: &str, spans: &[AnnotationSpan]) -> ResolvedMessage {
    let mut rendered_text = text.to_string();
    let mut footnotes = Vec::with_capacity(spans.len());

    for (offset, span) in spans.iter().enumerate() {
        let index = offset + 1;
        if !span.matched_text.is_empty() {
            rendered_text = rendered_text.replacen(&span.matched_text, &format!("[{index}]"), 1);
        }
        footnotes.push(span.footnote(index));
    }

    ResolvedMessage {
        rendered_text,
        footnotes,
    }
}

/// File ids referenced by the message's well-formed annotations, in order.
pub fn referenced_file_ids(message: &ThreadMessage) -> Vec<String> {
    message
        .text_parts()
        .flat_map(|text| text.annotations.iter())
        .filter_map(|annotation| match annotation {
            Annotation::FileCitation {
                file_citation: Some(citation),
                ..
            } => Some(citation.file_id.clone()),
            Annotation::FilePath {
                file_path: Some(file),
                ..
            } => Some(file.file_id.clone()),
            _ => None,
        })
        .collect()
}

pub struct CitationResolver<'a, R: FileRegistry + ?Sized> {
    registry: &'a R,
}

impl<'a, R: FileRegistry + ?Sized> CitationResolver<'a, R> {
    pub fn new(registry: &'a R) -> Self {
        Self { registry }
    }

    fn name_for(&self, file_id: &str) -> String {
        self.registry.display_name(file_id).unwrap_or_else(|| {
            log::warn!("No display name for cited file {}; showing its id", file_id);
            file_id.to_string()
        })
    }

    /// Convert one wire annotation. Unknown kinds yield `None`.
    pub fn span(&self, annotation: &Annotation) -> Result<Option<AnnotationSpan>> {
        match annotation {
            Annotation::FileCitation {
                text,
                file_citation,
                ..
            } => {
                let citation = file_citation.as_ref().ok_or_else(|| {
                    SessionError::CitationResolution(format!(
                        "file_citation annotation {text:?} has no file_citation data"
                    ))
                })?;
                require_text(text, "file_citation")?;
                Ok(Some(AnnotationSpan::file_citation(
                    text.clone(),
                    citation.quote.as_deref(),
                    self.name_for(&citation.file_id),
                )))
            }
            Annotation::FilePath {
                text, file_path, ..
            } => {
                let file = file_path.as_ref().ok_or_else(|| {
                    SessionError::CitationResolution(format!(
                        "file_path annotation {text:?} has no file_path data"
                    ))
                })?;
                require_text(text, "file_path")?;
                Ok(Some(AnnotationSpan::file_path(
                    text.clone(),
                    self.name_for(&file.file_id),
                )))
            }
            Annotation::Unknown => {
                log::debug!("Skipping annotation of unsupported type");
                Ok(None)
            }
        }
    }

    pub fn spans<'b>(
        &self,
        annotations: impl IntoIterator<Item = &'b Annotation>,
    ) -> Result<Vec<AnnotationSpan>> {
        let mut spans = Vec::new();
        for annotation in annotations {
            if let Some(span) = self.span(annotation)? {
                spans.push(span);
            }
        }
        Ok(spans)
    }

    /// Resolve all text parts of a message, numbering citations across parts.
    pub fn resolve_message(&self, message: &ThreadMessage) -> Result<ResolvedMessage> {
        let text = message
            .text_parts()
            .map(|part| part.value.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let spans = self.spans(
            message
                .text_parts()
                .flat_map(|part| part.annotations.iter()),
        )?;
        Ok(resolve(&text, &spans))
    }
}

fn require_text(text: &str, kind: &str) -> Result<()> {
    if text.is_empty() {
        return Err(SessionError::CitationResolution(format!(
            "{kind} annotation has empty text"
        )));
    }
    Ok(())
}
