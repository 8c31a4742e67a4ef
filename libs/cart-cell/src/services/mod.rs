pub mod cart;
pub mod pricing;
