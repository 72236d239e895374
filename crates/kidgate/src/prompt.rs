//! Block-structured prompt builder.
//!
//! [`PromptBuilder`] assembles the whitelist system prompt and every judge
//! and generator instruction in the crate. Blocks are joined with a blank
//! line; empty blocks are skipped, so optional context can be threaded
//! through without leaving stray separators.

/// Builder for multi-block prompts.
///
/// # Example
///
/// ```
/// use kidgate::prompt::PromptBuilder;
///
/// let prompt = PromptBuilder::new("You are a validator.")
///     .labeled("RULES", "Be kind.")
///     .labeled_opt("CONTEXT", None::<String>)
///     .numbered("Check whether the reply:", ["is polite", "is short"])
///     .build();
///
/// assert_eq!(
///     prompt,
///     "You are a validator.\n\nRULES:\nBe kind.\n\nCheck whether the reply:\n1. is polite\n2. is short"
/// );
/// ```
pub struct PromptBuilder {
    blocks: Vec<String>,
}

impl PromptBuilder {
    /// Start with a preamble block, included as-is.
    pub fn new(preamble: impl Into<String>) -> Self {
        let mut builder = Self { blocks: Vec::new() };
        builder.push(preamble.into());
        builder
    }

    fn push(&mut self, block: String) {
        if !block.is_empty() {
            self.blocks.push(block);
        }
    }

    /// Append a raw block. Skipped if empty.
    pub fn raw(mut self, content: impl Into<String>) -> Self {
        self.push(content.into());
        self
    }

    /// Append raw text only if the content is `Some`.
    pub fn raw_opt(self, content: Option<impl Into<String>>) -> Self {
        match content {
            Some(c) => self.raw(c),
            None => self,
        }
    }

    /// Append `LABEL:` followed by the content on the next line.
    ///
    /// Skipped if `content` is empty.
    pub fn labeled(mut self, label: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.blocks.push(format!("{label}:\n{content}"));
        }
        self
    }

    /// Append a labeled block only if the content is `Some`.
    pub fn labeled_opt(self, label: &str, content: Option<impl Into<String>>) -> Self {
        match content {
            Some(c) => self.labeled(label, c),
            None => self,
        }
    }

    /// Append an intro line followed by a `1.`-numbered list.
    ///
    /// Skipped entirely if `items` is empty.
    pub fn numbered<I, S>(mut self, intro: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = numbered_list(items);
        if !list.is_empty() {
            self.blocks.push(format!("{intro}\n{list}"));
        }
        self
    }

    /// Join all blocks with blank lines.
    pub fn build(self) -> String {
        self.blocks.join("\n\n")
    }
}

/// Render items as `1. a\n2. b\n...`.
pub fn numbered_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}
