use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use tera::{Context, Tera};

use crate::catalog::CatalogSnapshot;
use crate::domain::product::Product;
use crate::errors::DomainError;

/// Values available to FAQ answer templates: every shop setting plus `shop_name`,
/// `promo_one_line`, `products_top3` (alias `list_products_top3`), and the nested
/// `promo` and `product` maps.
pub fn answer_values(snapshot: &CatalogSnapshot, today: NaiveDate, product: Option<&Product>) -> Value {
    let mut values: Map<String, Value> = snapshot
        .settings
        .entries()
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    let active = snapshot.active_promotions(today);
    let top3 =
        snapshot.products.iter().take(3).map(|product| product.name.as_str()).collect::<Vec<_>>().join(", ");

    values.insert("shop_name".to_owned(), json!(snapshot.settings.shop_name().unwrap_or_default()));
    values.insert(
        "promo_one_line".to_owned(),
        json!(active.iter().map(|promotion| promotion.one_line()).collect::<Vec<_>>().join(" / ")),
    );
    values.insert("products_top3".to_owned(), json!(top3));
    values.insert("list_products_top3".to_owned(), json!(top3));
    values.insert(
        "promo".to_owned(),
        active.first().map_or_else(
            || json!({}),
            |promotion| {
                json!({
                    "id": promotion.id.0,
                    "title": promotion.title,
                    "description": promotion.description,
                    "one_line": promotion.one_line(),
                })
            },
        ),
    );
    values.insert(
        "product".to_owned(),
        product.map_or_else(
            || json!({}),
            |product| {
                json!({
                    "code": product.code.0,
                    "name": product.name,
                    "category": product.category,
                    "price": product.unit_price,
                    "variants": product.variants.join(", "),
                    "aliases": product.aliases.join(", "),
                })
            },
        ),
    );
    Value::Object(values)
}

fn lookup<'a>(values: &'a Value, path: &str) -> Option<&'a Value> {
    values.get(path).or_else(|| path.split('.').try_fold(values, |current, part| current.get(part.trim())))
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn compile(pattern: &str) -> Result<Regex, DomainError> {
    Regex::new(pattern).map_err(|error| DomainError::Template(error.to_string()))
}

/// Plain `{{ path }}` tags are resolved here, so Thai keys work and a missing
/// path renders empty. Each resolved value is bound to a slot variable; anything
/// else (filters, blocks) is left for tera.
pub fn try_render(template: &str, values: &Value) -> Result<String, DomainError> {
    let tag = compile(r"\{\{\s*([^{}]*?)\s*\}\}")?;
    let plain_path = compile(r"^[\p{L}\p{M}\p{N}_. ]+$")?;

    let mut context = Context::new();
    if let Value::Object(entries) = values {
        for (key, value) in entries {
            context.insert(key.as_str(), value);
        }
    }

    let mut slots = 0usize;
    let rewritten = tag
        .replace_all(template, |captures: &Captures<'_>| {
            let path = &captures[1];
            let value = match lookup(values, path) {
                Some(value) => display(value),
                None if plain_path.is_match(path) => String::new(),
                None => return captures[0].to_owned(),
            };
            let slot = format!("__slot{slots}");
            slots += 1;
            context.insert(slot.as_str(), &value);
            format!("{{{{ {slot} }}}}")
        })
        .into_owned();

    Tera::one_off(&rewritten, &context, false)
        .map(|rendered| rendered.trim().to_owned())
        .map_err(|error| DomainError::Template(error.to_string()))
}

/// Renders the template, or returns it unchanged when rendering fails.
pub fn render_or_literal(template: &str, values: &Value) -> String {
    try_render(template, values).unwrap_or_else(|_| template.to_owned())
}
