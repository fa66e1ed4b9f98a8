use serde::{Deserialize, Serialize};

use crate::domain::product::{Product, ProductCode};

/// A cart line. Name, category and price are snapshots taken when the item was added.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_code: ProductCode,
    pub name: String,
    pub category: String,
    pub variant: Option<String>,
    pub unit_price: u64,
    pub quantity: u32,
}

impl CartItem {
    pub fn from_product(product: &Product, variant: Option<String>, quantity: u32) -> Self {
        Self {
            product_code: product.code.clone(),
            name: product.name.clone(),
            category: product.category.clone(),
            variant,
            unit_price: product.unit_price,
            quantity,
        }
    }

    pub fn line_total(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }

    pub fn display_name(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{} ({variant})", self.name),
            None => self.name.clone(),
        }
    }

    fn same_identity(&self, other: &CartItem) -> bool {
        self.product_code == other.product_code && self.variant == other.variant
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Appends the item, or sums quantities into the existing line with the same
    /// product code and variant. The existing line keeps its original price snapshot.
    pub fn add(&mut self, item: CartItem) -> &CartItem {
        let position = self.items.iter().position(|existing| existing.same_identity(&item));
        let index = match position {
            Some(index) => {
                let existing = &mut self.items[index];
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                index
            }
            None => {
                self.items.push(item);
                self.items.len() - 1
            }
        };
        &self.items[index]
    }

    /// Quantity already on the line for this product and variant, zero when absent.
    pub fn quantity_of(&self, code: &ProductCode, variant: Option<&str>) -> u32 {
        self.items
            .iter()
            .find(|item| &item.product_code == code && item.variant.as_deref() == variant)
            .map_or(0, |item| item.quantity)
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn subtotal(&self) -> u64 {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{Cart, CartItem};
    use crate::domain::product::{Product, ProductCode};

    fn product(price: u64) -> Product {
        Product {
            code: ProductCode("NP01".to_string()),
            name: "น้ำพริกเห็ด".to_string(),
            category: "น้ำพริก".to_string(),
            unit_price: price,
            aliases: Vec::new(),
            variants: vec!["เผ็ดน้อย".to_string(), "เผ็ดมาก".to_string()],
        }
    }

    #[test]
    fn same_product_and_variant_merges_into_one_line() {
        let mut cart = Cart::default();
        cart.add(CartItem::from_product(&product(60), Some("เผ็ดมาก".to_string()), 2));
        let merged = cart.add(CartItem::from_product(&product(60), Some("เผ็ดมาก".to_string()), 3));

        assert_eq!(merged.quantity, 5);
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn different_variants_stay_on_separate_lines() {
        let mut cart = Cart::default();
        cart.add(CartItem::from_product(&product(60), Some("เผ็ดมาก".to_string()), 1));
        cart.add(CartItem::from_product(&product(60), Some("เผ็ดน้อย".to_string()), 1));

        assert_eq!(cart.len(), 2);
        assert_eq!(cart.total_quantity(), 2);
    }

    #[test]
    fn quantity_of_reads_the_matching_line() {
        let mut cart = Cart::default();
        cart.add(CartItem::from_product(&product(60), Some("เผ็ดมาก".to_string()), 4));
        let code = ProductCode("NP01".to_string());

        assert_eq!(cart.quantity_of(&code, Some("เผ็ดมาก")), 4);
        assert_eq!(cart.quantity_of(&code, Some("เผ็ดน้อย")), 0);
        assert_eq!(cart.quantity_of(&code, None), 0);
    }

    #[test]
    fn merge_keeps_the_original_price_snapshot() {
        let mut cart = Cart::default();
        cart.add(CartItem::from_product(&product(60), None, 1));
        cart.add(CartItem::from_product(&product(75), None, 1));

        assert_eq!(cart.items()[0].unit_price, 60);
        assert_eq!(cart.subtotal(), 120);
    }

    #[test]
    fn clear_leaves_an_empty_cart() {
        let mut cart = Cart::default();
        cart.add(CartItem::from_product(&product(60), None, 1));
        cart.clear();

        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), 0);
    }
}
