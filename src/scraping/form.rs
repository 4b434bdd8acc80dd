//! Rename-form discovery.
//!
//! Parses the fetched page with `scraper` (html5ever), picks the form that
//! carries the rename field, and collects its fields plus any anti-forgery
//! tokens the POST needs.
//!
//! # Selection policy
//!
//! [`FieldPolicy::rename_fields`] is a priority list.  For each name in order,
//! the first form (document order) that has an `input`/`textarea` with that
//! name wins.  A form carrying a higher-priority field beats an earlier form
//! carrying a lower-priority one.
//!
//! Tokens listed in [`FieldPolicy::token_fields`] that the chosen form lacks
//! are looked up page-wide: first any `<input>` outside the form, then a regex
//! scan of the raw page (tokens are often inlined in scripts).

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

pub const DEFAULT_RENAME_FIELDS: &[&str] =
    &["thread_name", "title", "name", "group_name", "subject"];
pub const DEFAULT_TOKEN_FIELDS: &[&str] = &["fb_dtsg", "jazoest"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("no form found on page")]
    NoForm,
    #[error("{forms} form(s) found but none has a rename field (token form seen: {token_form_seen})")]
    NoNameField { forms: usize, token_form_seen: bool },
    #[error("invalid form action '{0}'")]
    BadAction(String),
}

#[derive(Debug, Clone)]
pub struct FieldPolicy {
    pub rename_fields: Vec<String>,
    pub token_fields: Vec<String>,
}

impl Default for FieldPolicy {
    fn default() -> Self {
        Self {
            rename_fields: DEFAULT_RENAME_FIELDS.iter().map(|s| s.to_string()).collect(),
            token_fields: DEFAULT_TOKEN_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedForm {
    pub action: Url,
    /// Field name that receives the desired name.
    pub rename_field: String,
    /// Form fields in document order, tokens appended when sourced page-wide.
    pub fields: Vec<(String, String)>,
}

impl ScrapedForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Overwrite (or add) `name` with `value`.
    pub fn set_field(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    /// Field map with the rename field set to `desired`, ready to POST.
    pub fn with_name(&self, desired: &str) -> Vec<(String, String)> {
        let mut form = self.clone();
        form.set_field(&self.rename_field, desired);
        form.fields
    }
}

pub fn scrape_form(html: &str, base_url: &Url, policy: &FieldPolicy) -> Result<ScrapedForm, ScrapeError> {
    let document = Html::parse_document(html);
    let form_sel = Selector::parse("form").unwrap();
    let forms: Vec<ElementRef> = document.select(&form_sel).collect();
    if forms.is_empty() {
        return Err(ScrapeError::NoForm);
    }

    let field_sel = Selector::parse("input[name], textarea[name], select[name]").unwrap();
    let names_of = |form: &ElementRef| -> Vec<String> {
        form.select(&field_sel)
            .filter_map(|el| el.value().attr("name").map(str::to_string))
            .collect()
    };
    let form_names: Vec<Vec<String>> = forms.iter().map(names_of).collect();

    let chosen = policy.rename_fields.iter().find_map(|wanted| {
        form_names
            .iter()
            .position(|names| names.iter().any(|n| n == wanted))
            .map(|idx| (idx, wanted.clone()))
    });

    let Some((idx, rename_field)) = chosen else {
        let token_form_seen = form_names
            .iter()
            .any(|names| names.iter().any(|n| policy.token_fields.contains(n)));
        return Err(ScrapeError::NoNameField {
            forms: forms.len(),
            token_form_seen,
        });
    };

    let form = forms[idx];
    let action_attr = form.value().attr("action").map(str::trim).unwrap_or("");
    let action = if action_attr.is_empty() {
        base_url.clone()
    } else {
        base_url
            .join(action_attr)
            .map_err(|_| ScrapeError::BadAction(action_attr.to_string()))?
    };

    let mut fields = collect_fields(&form, &field_sel);
    for token in &policy.token_fields {
        if fields.iter().any(|(k, _)| k == token) {
            continue;
        }
        if let Some(value) = find_token(&document, html, token) {
            fields.push((token.clone(), value));
        }
    }

    Ok(ScrapedForm {
        action,
        rename_field,
        fields,
    })
}

fn collect_fields(form: &ElementRef, field_sel: &Selector) -> Vec<(String, String)> {
    let option_sel = Selector::parse("option").unwrap();
    let mut fields = Vec::new();
    for el in form.select(field_sel) {
        let Some(name) = el.value().attr("name") else {
            continue;
        };
        let value = match el.value().name() {
            "textarea" => el.text().collect::<String>(),
            "select" => {
                let options: Vec<ElementRef> = el.select(&option_sel).collect();
                options
                    .iter()
                    .find(|o| o.value().attr("selected").is_some())
                    .or_else(|| options.first())
                    .map(|o| {
                        o.value()
                            .attr("value")
                            .map(str::to_string)
                            .unwrap_or_else(|| o.text().collect::<String>().trim().to_string())
                    })
                    .unwrap_or_default()
            }
            _ => {
                let kind = el.value().attr("type").unwrap_or("").to_ascii_lowercase();
                if (kind == "checkbox" || kind == "radio") && el.value().attr("checked").is_none() {
                    continue;
                }
                el.value().attr("value").unwrap_or("").to_string()
            }
        };
        fields.push((name.to_string(), value));
    }
    fields
}

/// Page-wide token lookup: parsed `<input>` first, then raw-text patterns.
pub fn find_token(document: &Html, raw: &str, token: &str) -> Option<String> {
    let input_sel = Selector::parse(&format!("input[name=\"{}\"]", token)).ok()?;
    if let Some(value) = document
        .select(&input_sel)
        .filter_map(|el| el.value().attr("value"))
        .find(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }

    let name = regex::escape(token);
    let patterns = [
        format!(r#"name=["']{name}["'][^>]*?value=["']([^"']+)["']"#),
        format!(r#"value=["']([^"']+)["'][^>]*?name=["']{name}["']"#),
        format!(r#"["']{name}["']\s*:\s*["']([^"']+)["']"#),
    ];
    patterns.iter().find_map(|p| {
        Regex::new(p)
            .ok()?
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}
