use std::collections::BTreeSet;

use crate::domain::product::Product;
use crate::text::normalize_key;

/// Keys shorter than this are too noisy for substring matching.
const MIN_KEY_CHARS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum MatchTier {
    Code,
    Name,
    Alias,
}

const TIERS: [MatchTier; 3] = [MatchTier::Code, MatchTier::Name, MatchTier::Alias];

#[derive(Clone, Debug)]
struct IndexEntry {
    key: String,
    product: usize,
    tier: MatchTier,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution<'a> {
    Unknown,
    Unique(&'a Product),
    /// Candidates in catalog order.
    Ambiguous(Vec<&'a Product>),
}

/// Normalized lookup keys for every product code, name and alias.
#[derive(Clone, Debug, Default)]
pub struct AliasIndex {
    entries: Vec<IndexEntry>,
}

impl AliasIndex {
    pub fn build(products: &[Product]) -> Self {
        let mut entries = Vec::new();
        for (position, product) in products.iter().enumerate() {
            let keys = std::iter::once((MatchTier::Code, product.code.0.as_str()))
                .chain(std::iter::once((MatchTier::Name, product.name.as_str())))
                .chain(product.aliases.iter().map(|alias| (MatchTier::Alias, alias.as_str())));
            for (tier, raw) in keys {
                let key = normalize_key(raw);
                if key.chars().count() >= MIN_KEY_CHARS {
                    entries.push(IndexEntry { key, product: position, tier });
                }
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Matches codes first, then full names, then aliases; the first tier with any
    /// hit decides. Inside a tier, a key is dropped when every occurrence of it lies
    /// inside an occurrence of a longer matched key, so "น้ำพริกเห็ด" beats a product
    /// named "น้ำพริก" unless "น้ำพริก" also appears on its own.
    pub fn resolve<'a>(&self, products: &'a [Product], text: &str) -> Resolution<'a> {
        let candidates = self.candidates(products, text);
        match candidates.len() {
            0 => Resolution::Unknown,
            1 => Resolution::Unique(candidates[0]),
            _ => Resolution::Ambiguous(candidates),
        }
    }

    pub fn candidates<'a>(&self, products: &'a [Product], text: &str) -> Vec<&'a Product> {
        let haystack = normalize_key(text);
        if haystack.is_empty() {
            return Vec::new();
        }

        for tier in TIERS {
            let hits: Vec<&IndexEntry> = self
                .entries
                .iter()
                .filter(|entry| entry.tier == tier && haystack.contains(&entry.key))
                .collect();
            if hits.is_empty() {
                continue;
            }

            let spans: Vec<Vec<(usize, usize)>> =
                hits.iter().map(|hit| occurrences(&haystack, &hit.key)).collect();
            let positions: BTreeSet<usize> = hits
                .iter()
                .zip(&spans)
                .filter(|(hit, own)| {
                    !own.iter().all(|&(start, end)| {
                        hits.iter().zip(&spans).any(|(other, covering)| {
                            other.key.len() > hit.key.len()
                                && covering.iter().any(|&(outer_start, outer_end)| {
                                    outer_start <= start && end <= outer_end
                                })
                        })
                    })
                })
                .map(|(hit, _)| hit.product)
                .collect();
            return positions.into_iter().filter_map(|position| products.get(position)).collect();
        }

        Vec::new()
    }
}

/// Byte spans of every occurrence of `key`, overlapping ones included.
fn occurrences(haystack: &str, key: &str) -> Vec<(usize, usize)> {
    haystack
        .char_indices()
        .filter(|(start, _)| haystack[*start..].starts_with(key))
        .map(|(start, _)| (start, start + key.len()))
        .collect()
}
