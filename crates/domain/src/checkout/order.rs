//! Cart snapshots and priced orders.

use serde::{Deserialize, Serialize};

use super::money::{CurrencyCode, Money};
use super::value_objects::ProductId;
use crate::error::DomainError;

/// One (product, quantity) line read from the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// The cart contents as read at saga start.
///
/// Preserves the order the cart returned. Never empty and never holds a zero
/// quantity line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    items: Vec<CartItem>,
}

impl CartSnapshot {
    pub fn new(items: Vec<CartItem>) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::EmptyCart);
        }
        if let Some(item) = items.iter().find(|item| item.quantity == 0) {
            return Err(DomainError::InvalidQuantity {
                product_id: item.product_id.to_string(),
                quantity: item.quantity,
            });
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    pub fn unit_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}

/// A cart line with its unit price converted to the order currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl PricedLine {
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.unit_price.multiply(self.quantity)
    }
}

/// A fully priced order in the shopper's currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedOrder {
    currency: CurrencyCode,
    items: Vec<PricedLine>,
    shipping_cost: Money,
    total: Money,
}

impl PricedOrder {
    /// Combines priced lines and a shipping cost into an order.
    ///
    /// Every amount must already be in `currency`.
    pub fn new(
        currency: CurrencyCode,
        items: Vec<PricedLine>,
        shipping_cost: Money,
    ) -> Result<Self, DomainError> {
        let mut total = Money::zero(currency.clone());
        for line in &items {
            total = total.checked_add(&line.line_total()?)?;
        }
        total = total.checked_add(&shipping_cost)?;

        Ok(Self {
            currency,
            items,
            shipping_cost,
            total,
        })
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn items(&self) -> &[PricedLine] {
        &self.items
    }

    pub fn shipping_cost(&self) -> &Money {
        &self.shipping_cost
    }

    /// Sum of every line total plus shipping.
    pub fn total(&self) -> &Money {
        &self.total
    }

    /// Sum of the line totals without shipping.
    pub fn items_total(&self) -> Result<Money, DomainError> {
        let mut sum = Money::zero(self.currency.clone());
        for line in &self.items {
            sum = sum.checked_add(&line.line_total()?)?;
        }
        Ok(sum)
    }

    /// The (product, quantity) pairs, as sent to shipping.
    pub fn cart_items(&self) -> Vec<CartItem> {
        self.items
            .iter()
            .map(|line| CartItem::new(line.product_id.clone(), line.quantity))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    #[test]
    fn test_empty_cart_rejected() {
        assert_eq!(CartSnapshot::new(vec![]), Err(DomainError::EmptyCart));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let result = CartSnapshot::new(vec![CartItem::new("A", 1), CartItem::new("B", 0)]);
        assert!(matches!(
            result,
            Err(DomainError::InvalidQuantity { ref product_id, quantity: 0 }) if product_id == "B"
        ));
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let cart = CartSnapshot::new(vec![CartItem::new("B", 1), CartItem::new("A", 3)]).unwrap();
        assert_eq!(cart.items()[0].product_id.as_str(), "B");
        assert_eq!(cart.unit_count(), 4);
    }

    #[test]
    fn test_priced_order_total() {
        let order = PricedOrder::new(
            usd(),
            vec![
                PricedLine {
                    product_id: ProductId::new("A"),
                    quantity: 2,
                    unit_price: Money::from_cents(usd(), 1999),
                },
                PricedLine {
                    product_id: ProductId::new("B"),
                    quantity: 1,
                    unit_price: Money::from_cents(usd(), 350),
                },
            ],
            Money::from_units(usd(), 5),
        )
        .unwrap();

        assert_eq!(order.items_total().unwrap(), Money::from_cents(usd(), 4348));
        assert_eq!(order.total(), &Money::from_cents(usd(), 4848));
        assert_eq!(order.cart_items().len(), 2);
    }

    #[test]
    fn test_priced_order_rejects_mixed_currency() {
        let eur = CurrencyCode::new("EUR").unwrap();
        let result = PricedOrder::new(
            usd(),
            vec![PricedLine {
                product_id: ProductId::new("A"),
                quantity: 1,
                unit_price: Money::from_units(eur, 10),
            }],
            Money::from_units(usd(), 5),
        );
        assert!(matches!(result, Err(DomainError::CurrencyMismatch { .. })));
    }
}
