pub mod identifiers;
pub mod keyed;
