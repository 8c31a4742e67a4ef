// libs/cart-cell/src/services/pricing.rs
use catalog_cell::models::CatalogSnapshot;

use crate::models::{CartItemPayload, PriceBreakdown};

/// Computes the pricing triple for one cart item from a catalog snapshot.
///
/// Base price depends on the item type: sum of test prices, package price,
/// or consultation fee. Discounts stack additively: the package's flat
/// discount plus the center's percentage discount on the base. The final
/// price is floored at zero. Missing catalog references contribute nothing,
/// so a stale item prices down instead of failing the whole cart read.
pub fn compute_price(payload: &CartItemPayload, snapshot: &CatalogSnapshot) -> PriceBreakdown {
    let base = base_price(payload, snapshot);
    let discount = flat_discount(payload, snapshot) + center_discount(base, snapshot);
    PriceBreakdown {
        price: base,
        discount_amount: discount,
        final_price: (base - discount).max(0.0),
    }
}

fn base_price(payload: &CartItemPayload, snapshot: &CatalogSnapshot) -> f64 {
    match payload {
        CartItemPayload::Test { test_ids, .. } => test_ids
            .iter()
            .filter_map(|id| snapshot.tests.iter().find(|t| t.id == *id))
            .map(|t| t.price)
            .sum(),
        CartItemPayload::HealthPackage { .. } => {
            snapshot.package.as_ref().map(|p| p.price).unwrap_or(0.0)
        }
        CartItemPayload::SponsoredPackage { .. } => snapshot
            .sponsored_package
            .as_ref()
            .map(|p| p.price)
            .unwrap_or(0.0),
        CartItemPayload::DoctorAppointment { .. } => snapshot
            .doctor
            .as_ref()
            .map(|d| d.consultation_fee)
            .unwrap_or(0.0),
    }
}

fn flat_discount(payload: &CartItemPayload, snapshot: &CatalogSnapshot) -> f64 {
    match payload {
        CartItemPayload::HealthPackage { .. } => snapshot
            .package
            .as_ref()
            .map(|p| p.discount_amount)
            .unwrap_or(0.0),
        CartItemPayload::SponsoredPackage { .. } => snapshot
            .sponsored_package
            .as_ref()
            .map(|p| p.discount_amount)
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

fn center_discount(base: f64, snapshot: &CatalogSnapshot) -> f64 {
    match snapshot.center.as_ref() {
        Some(center) if center.discount_percent > 0.0 => base * center.discount_percent / 100.0,
        _ => 0.0,
    }
}
