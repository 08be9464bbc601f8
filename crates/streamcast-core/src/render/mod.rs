//! Response renderer
//!
//! Pure function from the current display text and task cards to the
//! platform-neutral body that gets posted or edited. Knows nothing about
//! message identity; the session calls it once per flush.

pub mod text;

use serde::{Deserialize, Serialize};

use crate::config::StreamConfig;
use crate::session::{TaskCard, TaskStatus};

pub use text::{char_len, truncate, TRUNCATION_MARKER};

/// Some platforms reject empty field values and descriptions
pub const EMPTY_PLACEHOLDER: &str = "\u{200b}";

/// Discord's ceiling for an embed field name
const FIELD_NAME_LIMIT: usize = 256;

/// Discord's ceiling for an embed field value
const FIELD_VALUE_LIMIT: usize = 1024;

/// Visual state of a message, mapped to an embed color or similar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Streaming,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedBody {
    pub text: String,
    pub tone: Tone,
    pub fields: Vec<RenderedField>,
}

impl RenderedBody {
    /// Body with no fields
    pub fn text_only(text: impl Into<String>, tone: Tone) -> Self {
        Self {
            text: text.into(),
            tone,
            fields: Vec::new(),
        }
    }
}

/// Builds message bodies within the platform limits
#[derive(Debug, Clone)]
pub struct ResponseRenderer {
    body_limit: usize,
    plain_limit: usize,
    max_fields: usize,
    field_output_cap: usize,
}

impl ResponseRenderer {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            body_limit: config.body_limit,
            plain_limit: config.plain_limit,
            max_fields: config.max_fields,
            field_output_cap: config.field_output_cap,
        }
    }

    /// Render a rich body.
    ///
    /// `footer` is kept whole (up to the body limit) and the text is truncated
    /// around it. Tasks past `max_fields` are not rendered.
    pub fn render<'a>(
        &self,
        display_text: &str,
        tasks: impl IntoIterator<Item = &'a TaskCard>,
        tone: Tone,
        footer: Option<&str>,
    ) -> RenderedBody {
        RenderedBody {
            text: self.render_text(display_text, footer),
            tone,
            fields: tasks
                .into_iter()
                .take(self.max_fields)
                .map(|task| self.render_field(task))
                .collect(),
        }
    }

    /// Render a plain-content message, used when no rich message exists
    pub fn render_plain(&self, text: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            return EMPTY_PLACEHOLDER.to_string();
        }
        truncate(text, self.plain_limit).into_owned()
    }

    fn render_text(&self, display_text: &str, footer: Option<&str>) -> String {
        let footer = footer.filter(|f| !f.is_empty());
        let body = match footer {
            None => truncate(display_text, self.body_limit).into_owned(),
            Some(footer) if display_text.is_empty() => {
                truncate(footer, self.body_limit).into_owned()
            }
            Some(footer) => {
                let footer = truncate(footer, self.body_limit / 2);
                let block = format!("\n\n{}", footer);
                let available = self.body_limit.saturating_sub(char_len(&block));
                format!("{}{}", truncate(display_text, available), block)
            }
        };

        if body.is_empty() {
            EMPTY_PLACEHOLDER.to_string()
        } else {
            body
        }
    }

    fn render_field(&self, task: &TaskCard) -> RenderedField {
        let name = format!("{} {}", status_glyph(task.status), task.title);

        let block = task.output.as_deref().filter(|o| !o.is_empty()).map(|output| {
            let output = truncate(output, self.field_output_cap);
            format!("```\n{}\n```", output.replace("```", "``\u{200b}`"))
        });

        // Details give way so the output fence always closes
        let mut value = String::new();
        if let Some(details) = task.details.as_deref().filter(|d| !d.is_empty()) {
            let reserved = block.as_deref().map_or(0, |b| char_len(b) + 1);
            value.push_str(&truncate(details, FIELD_VALUE_LIMIT.saturating_sub(reserved)));
        }
        if let Some(block) = block {
            if !value.is_empty() {
                value.push('\n');
            }
            value.push_str(&block);
        }

        RenderedField {
            name: truncate(&name, FIELD_NAME_LIMIT).into_owned(),
            value: if value.is_empty() {
                EMPTY_PLACEHOLDER.to_string()
            } else {
                truncate(&value, FIELD_VALUE_LIMIT).into_owned()
            },
        }
    }
}

pub fn status_glyph(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "⏳",
        TaskStatus::InProgress => "🔄",
        TaskStatus::Complete => "✅",
        TaskStatus::Error => "❌",
    }
}
