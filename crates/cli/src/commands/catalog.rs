use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use chatcart_core::catalog::{CatalogSnapshot, CatalogView, FileCatalogSource, Resolution};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
pub struct CatalogSummary {
    pub revision: String,
    pub categories: Vec<String>,
    pub alias_keys: usize,
    pub products: Vec<ProductSummary>,
    pub promotions: Vec<PromotionSummary>,
    pub faqs: Vec<FaqSummary>,
    pub payment_methods: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductSummary {
    pub code: String,
    pub name: String,
    pub category: String,
    pub unit_price: u64,
    pub aliases: Vec<String>,
    pub variants: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PromotionSummary {
    pub id: String,
    pub kind: &'static str,
    pub summary: String,
    pub combinable: bool,
    pub active_today: bool,
}

#[derive(Debug, Serialize)]
pub struct FaqSummary {
    pub id: String,
    pub priority: u32,
    pub keywords: Vec<String>,
}

pub fn run(path: &Path) -> CommandResult {
    match summarize(path) {
        Ok(summary) => {
            let message = format!(
                "catalog {} is valid: {} products, {} promotions, {} faq rules",
                path.display(),
                summary.products.len(),
                summary.promotions.len(),
                summary.faqs.len()
            );
            CommandResult::success_with("catalog", message, Some(summary))
        }
        Err((error_class, message)) => CommandResult::failure("catalog", error_class, message, 2),
    }
}

pub fn summarize(path: &Path) -> Result<CatalogSummary, (&'static str, String)> {
    let raw = fs::read_to_string(path)
        .map_err(|error| ("catalog_read", format!("could not read {}: {error}", path.display())))?;
    let rows = FileCatalogSource::new(path)
        .parse(&raw)
        .map_err(|error| ("catalog_parse", error.to_string()))?;
    let now = Utc::now();
    let snapshot =
        CatalogSnapshot::from_rows(&rows, now).map_err(|error| ("catalog_invalid", error.to_string()))?;
    let view = CatalogView::build(snapshot).map_err(|error| ("catalog_invalid", error.to_string()))?;

    let today = now.date_naive();
    let snapshot = view.snapshot();
    Ok(CatalogSummary {
        revision: view.revision().to_owned(),
        categories: snapshot.categories(),
        alias_keys: view.index().len(),
        products: snapshot
            .products
            .iter()
            .map(|product| ProductSummary {
                code: product.code.0.clone(),
                name: product.name.clone(),
                category: product.category.clone(),
                unit_price: product.unit_price,
                aliases: product.aliases.clone(),
                variants: product.variants.clone(),
            })
            .collect(),
        promotions: snapshot
            .promotions
            .iter()
            .map(|promotion| PromotionSummary {
                id: promotion.id.0.clone(),
                kind: promotion.kind.label(),
                summary: promotion.one_line(),
                combinable: promotion.combinable,
                active_today: promotion.is_active_on(today),
            })
            .collect(),
        faqs: snapshot
            .faqs
            .iter()
            .map(|faq| FaqSummary {
                id: faq.id.clone(),
                priority: faq.priority,
                keywords: faq.keywords.clone(),
            })
            .collect(),
        payment_methods: snapshot.payment_methods.len(),
        warnings: warnings(&view),
    })
}

/// Product names that customers could type but that do not resolve to the product itself.
fn warnings(view: &CatalogView) -> Vec<String> {
    view.snapshot()
        .products
        .iter()
        .filter_map(|product| match view.resolve(&product.name) {
            Resolution::Unique(found) if found.code == product.code => None,
            Resolution::Unique(found) => Some(format!(
                "typing `{}` selects {} instead of {}",
                product.name, found.code, product.code
            )),
            Resolution::Ambiguous(candidates) => Some(format!(
                "typing `{}` is ambiguous between {} products",
                product.name,
                candidates.len()
            )),
            Resolution::Unknown => Some(format!("typing `{}` does not match any product", product.name)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{run, summarize};

    fn demo_catalog() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/catalog.toml")
    }

    #[test]
    fn demo_catalog_summary_lists_every_table() {
        let summary = summarize(&demo_catalog()).expect("demo catalog is valid");

        assert_eq!(summary.products.len(), 3);
        assert_eq!(summary.promotions[0].kind, "quantity_threshold_free_item");
        assert_eq!(summary.faqs[0].id, "shipping");
        assert_eq!(summary.categories, vec!["น้ำพริก", "ของทานเล่น"]);
        assert!(summary.warnings.is_empty(), "unexpected warnings: {:?}", summary.warnings);
    }

    #[test]
    fn invalid_catalog_reports_the_failing_row() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[[products]]\ncode = \"A1\"\nname = \"x\"\nprice = -1\n").expect("write");

        let result = run(&path);

        assert_eq!(result.exit_code, 2);
        let payload: serde_json::Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["error_class"], "catalog_invalid");
    }
}
