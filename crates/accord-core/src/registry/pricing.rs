use std::collections::HashMap;

use crate::models::{Amount, CoreError, CoreErrorKind};

pub type PricingResult<T> = Result<T, CoreError>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceBook {
    default_unit_price: Option<Amount>,
    variant_prices: HashMap<String, Amount>,
}

impl PriceBook {
    pub fn new(default_unit_price: Option<Amount>) -> Self {
        Self {
            default_unit_price,
            variant_prices: HashMap::new(),
        }
    }

    pub fn with_variant_price(mut self, variant: impl Into<String>, unit_price: Amount) -> Self {
        self.variant_prices.insert(variant.into(), unit_price);
        self
    }

    /// Variant price when one is configured, else the default unit price.
    pub fn unit_price(&self, variant: Option<&str>) -> PricingResult<Amount> {
        if let Some(variant) = variant
            && let Some(unit_price) = self.variant_prices.get(variant)
        {
            return Ok(*unit_price);
        }
        self.default_unit_price
            .ok_or_else(|| missing_price(variant))
    }

    pub fn total_price(&self, unit_price: Amount, redundancy: u32) -> PricingResult<Amount> {
        unit_price
            .checked_mul_count(redundancy)
            .ok_or_else(|| price_overflow(unit_price, redundancy))
    }
}

fn missing_price(variant: Option<&str>) -> CoreError {
    CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::Validation,
        message: match variant {
            Some(variant) => format!("no price configured for variant '{variant}' and no default unit price"),
            None => "no default unit price configured".to_string(),
        },
    }
}

fn price_overflow(unit_price: Amount, redundancy: u32) -> CoreError {
    CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::Internal,
        message: format!("total price overflow for unit price {unit_price} x {redundancy}"),
    }
}
