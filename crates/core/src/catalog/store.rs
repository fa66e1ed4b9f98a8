use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::catalog::alias::{AliasIndex, Resolution};
use crate::catalog::source::CatalogSource;
use crate::catalog::{CatalogError, CatalogSnapshot};
use crate::domain::product::Product;
use crate::intent::IntentClassifier;

/// A snapshot together with everything derived from it. Readers always hold a
/// complete view, never a mix of two refresh cycles.
#[derive(Clone, Debug)]
pub struct CatalogView {
    snapshot: CatalogSnapshot,
    index: AliasIndex,
    classifier: IntentClassifier,
}

impl CatalogView {
    pub fn build(snapshot: CatalogSnapshot) -> Result<Self, CatalogError> {
        let index = AliasIndex::build(&snapshot.products);
        let classifier = IntentClassifier::new(&snapshot.faqs, &snapshot.categories())?;
        Ok(Self { snapshot, index, classifier })
    }

    pub fn empty(now: DateTime<Utc>) -> Result<Self, CatalogError> {
        Self::build(CatalogSnapshot::empty(now))
    }

    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn index(&self) -> &AliasIndex {
        &self.index
    }

    pub fn resolve(&self, text: &str) -> Resolution<'_> {
        self.index.resolve(&self.snapshot.products, text)
    }

    pub fn candidates(&self, text: &str) -> Vec<&Product> {
        self.index.candidates(&self.snapshot.products, text)
    }

    pub fn revision(&self) -> &str {
        &self.snapshot.revision
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Replaced { previous_revision: String, revision: String, products: usize },
    Unchanged { revision: String },
}

pub struct CatalogStore {
    current: RwLock<Arc<CatalogView>>,
}

impl CatalogStore {
    pub fn new(view: CatalogView) -> Self {
        Self { current: RwLock::new(Arc::new(view)) }
    }

    /// The view in effect right now. Holding the `Arc` keeps it alive across a refresh.
    pub fn current(&self) -> Arc<CatalogView> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, view: CatalogView) -> Arc<CatalogView> {
        let next = Arc::new(view);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }

    pub fn is_loaded(&self) -> bool {
        !self.current().snapshot().is_empty()
    }

    /// Pulls rows from `source` and swaps the view in one step. On any error the
    /// current view stays in place; an identical revision skips the swap.
    pub async fn refresh(&self, source: &dyn CatalogSource) -> Result<RefreshOutcome, CatalogError> {
        let rows = source.fetch().await?;
        let revision = rows.revision();
        let previous_revision = self.current().revision().to_owned();
        if revision == previous_revision {
            return Ok(RefreshOutcome::Unchanged { revision });
        }

        let snapshot = CatalogSnapshot::from_rows(&rows, Utc::now())?;
        let products = snapshot.products.len();
        self.replace(CatalogView::build(snapshot)?);
        Ok(RefreshOutcome::Replaced { previous_revision, revision, products })
    }
}
