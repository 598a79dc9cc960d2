use std::sync::Arc;

use htmd::HtmlToMarkdown;
use scraper::{Html, Selector};
use serde_json::Value;
use sous_core::{AppError, CleanedPage, PageCleaner};

/// Upper bound on the page text handed to the completion API.
pub const MAX_CONTEXT_CHARS: usize = 12_000;

/// Reduces a recipe page to the parts worth sending to the model.
///
/// Pages that embed a schema.org `Recipe` in JSON-LD are read from that block
/// (title, ingredient lines, instruction steps). Anything else is converted to
/// Markdown with non-content elements stripped.
pub struct RecipePageCleaner {
    converter: Arc<HtmlToMarkdown>,
    max_chars: usize,
}

impl Clone for RecipePageCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
            max_chars: self.max_chars,
        }
    }
}

impl RecipePageCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
                "form", "button",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
            max_chars: MAX_CONTEXT_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

impl Default for RecipePageCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl PageCleaner for RecipePageCleaner {
    fn clean(&self, html: &str) -> Result<CleanedPage, AppError> {
        let document = Html::parse_document(html);

        let page = match find_json_ld_recipe(&document)? {
            Some(recipe) if !recipe.text.is_empty() => {
                tracing::debug!(steps_chars = recipe.text.len(), "Using JSON-LD recipe block");
                recipe
            }
            partial => {
                let markdown = self.converter.convert(html).map_err(|e| {
                    AppError::MalformedUpstreamOutput(format!("page could not be converted: {e}"))
                })?;
                let partial = partial.unwrap_or_default();
                CleanedPage {
                    title: partial.title.or_else(|| page_title(&document)),
                    ingredients: partial.ingredients,
                    text: markdown.trim().to_string(),
                }
            }
        };

        if page.text.trim().is_empty() {
            return Err(AppError::NotFound("page has no usable recipe text".into()));
        }

        Ok(CleanedPage {
            text: truncate_chars(&page.text, self.max_chars).to_string(),
            ..page
        })
    }
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::ConfigError(format!("bad selector '{css}': {e}")))
}

fn page_title(document: &Html) -> Option<String> {
    let og = selector(r#"meta[property="og:title"]"#).ok()?;
    if let Some(content) = document
        .select(&og)
        .find_map(|el| el.value().attr("content"))
        .map(collapse)
        .filter(|t| !t.is_empty())
    {
        return Some(content);
    }
    let title = selector("title").ok()?;
    document
        .select(&title)
        .map(|el| collapse(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

/// First schema.org `Recipe` in any JSON-LD block, with its instructions
/// rendered as one step per line.
fn find_json_ld_recipe(document: &Html) -> Result<Option<CleanedPage>, AppError> {
    let scripts = selector(r#"script[type="application/ld+json"]"#)?;
    for script in document.select(&scripts) {
        let raw: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        if let Some(recipe) = find_recipe_node(&value) {
            let mut steps = Vec::new();
            if let Some(instructions) = recipe.get("recipeInstructions") {
                collect_steps(instructions, &mut steps);
            }
            return Ok(Some(CleanedPage {
                title: recipe.get("name").and_then(Value::as_str).map(collapse),
                ingredients: string_list(recipe.get("recipeIngredient")),
                text: steps.join("\n"),
            }));
        }
    }
    Ok(None)
}

fn find_recipe_node(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_recipe_node),
        Value::Object(map) => {
            if is_type(value, "Recipe") {
                return Some(value);
            }
            map.get("@graph").and_then(find_recipe_node)
        }
        _ => None,
    }
}

fn is_type(value: &Value, name: &str) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == name,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(name)),
        _ => false,
    }
}

/// Flatten `recipeInstructions`: a string, a list of strings, `HowToStep`s, or
/// `HowToSection`s containing any of those.
fn collect_steps(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(
            s.lines()
                .map(collapse)
                .filter(|line| !line.is_empty()),
        ),
        Value::Array(items) => items.iter().for_each(|item| collect_steps(item, out)),
        Value::Object(_) if is_type(value, "HowToSection") => {
            if let Some(name) = value.get("name").and_then(Value::as_str) {
                out.push(format!("{}:", collapse(name)));
            }
            if let Some(items) = value.get("itemListElement") {
                collect_steps(items, out);
            }
        }
        Value::Object(_) => {
            let text = value
                .get("text")
                .or_else(|| value.get("name"))
                .and_then(Value::as_str)
                .map(collapse);
            if let Some(text) = text.filter(|t| !t.is_empty()) {
                out.push(text);
            }
        }
        _ => {}
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(collapse)
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => vec![collapse(s)],
        _ => Vec::new(),
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
