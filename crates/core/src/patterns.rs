use crate::error::IngestError;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct TextPatterns {
    horizontal_space: Regex,
    excess_newlines: Regex,
    page_number_line: Regex,
    paragraph_break: Regex,
    chapter_heading: Regex,
    chinese_numeral_heading: Regex,
    ordinal_heading: Regex,
    uppercase_heading: Regex,
    bracketed_title: Regex,
    bullet_item: Regex,
    numbered_item: Regex,
    lettered_item: Regex,
}

impl TextPatterns {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            horizontal_space: Regex::new(r"[ \t]+")?,
            excess_newlines: Regex::new(r"\n{3,}")?,
            page_number_line: Regex::new(r"\n\s*\d+\s*\n")?,
            paragraph_break: Regex::new(r"\n{2,}")?,
            chapter_heading: Regex::new(r"^第[一二三四五六七八九十\d]+[章节篇]")?,
            chinese_numeral_heading: Regex::new(r"^[一二三四五六七八九十]+、")?,
            ordinal_heading: Regex::new(r"^\d+[.．]")?,
            uppercase_heading: Regex::new(r"^[A-Z][A-Z\s]+$")?,
            bracketed_title: Regex::new(r"^【.+】$")?,
            bullet_item: Regex::new(r"^\s*[•·\-]\s+")?,
            numbered_item: Regex::new(r"^\s*\d+[.)]\s+")?,
            lettered_item: Regex::new(r"^\s*[a-z][.)]\s+")?,
        })
    }

    /// Collapses spacing, strips carriage returns and page-number lines.
    pub fn normalize(&self, text: &str) -> String {
        let text = self.horizontal_space.replace_all(text, " ");
        let text = self.excess_newlines.replace_all(&text, "\n\n");
        let text = text.replace('\r', "");
        let text = self.page_number_line.replace_all(&text, "\n");
        text.trim().to_string()
    }

    pub fn paragraphs<'a>(&self, normalized: &'a str) -> Vec<&'a str> {
        self.paragraph_break.split(normalized).collect()
    }

    /// `第三章`, `第2节`, `第一篇`
    pub fn is_chapter_heading(&self, text: &str) -> bool {
        self.chapter_heading.is_match(text.trim())
    }

    /// `一、`, `十二、`
    pub fn is_chinese_numeral_heading(&self, text: &str) -> bool {
        self.chinese_numeral_heading.is_match(text.trim())
    }

    /// `1.`, `12．`
    pub fn is_ordinal_heading(&self, text: &str) -> bool {
        self.ordinal_heading.is_match(text.trim())
    }

    pub fn is_uppercase_heading(&self, text: &str) -> bool {
        self.uppercase_heading.is_match(text.trim())
    }

    /// `【用法用量】`
    pub fn is_bracketed_title(&self, text: &str) -> bool {
        self.bracketed_title.is_match(text.trim())
    }

    pub fn is_heading(&self, text: &str) -> bool {
        self.is_chapter_heading(text)
            || self.is_chinese_numeral_heading(text)
            || self.is_ordinal_heading(text)
            || self.is_uppercase_heading(text)
            || self.is_bracketed_title(text)
    }

    pub fn is_bullet_item(&self, text: &str) -> bool {
        self.bullet_item.is_match(text.trim())
    }

    pub fn is_numbered_item(&self, text: &str) -> bool {
        self.numbered_item.is_match(text.trim())
    }

    pub fn is_lettered_item(&self, text: &str) -> bool {
        self.lettered_item.is_match(text.trim())
    }

    pub fn is_list_item(&self, text: &str) -> bool {
        self.is_bullet_item(text) || self.is_numbered_item(text) || self.is_lettered_item(text)
    }
}

/// Greedy span from the first `{` to the last `}` after it, newlines included.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
