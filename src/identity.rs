//! Deterministic vector-store identity derivation.

use uuid::Uuid;

/// Derives the vector-store point id for a supplier product identifier.
///
/// Name-based UUIDv5 over the OID namespace, so the same `product_id` maps to
/// the same point across runs, processes, and suppliers with no external
/// state. Reruns therefore upsert the existing point instead of creating a
/// duplicate.
pub fn point_id(product_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, product_id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_calls_are_stable() {
        assert_eq!(point_id("PC54"), point_id("PC54"));
    }

    #[test]
    fn distinct_ids_produce_distinct_points() {
        assert_ne!(point_id("x"), point_id("y"));
    }

    #[test]
    fn matches_rfc4122_v5_over_the_oid_namespace() {
        // Reference values from an independent UUIDv5 implementation.
        assert_eq!(
            point_id("PC54").to_string(),
            "84244e1d-a732-5673-bd99-7f66031486cf"
        );
        assert_eq!(
            point_id("2000").to_string(),
            "7920a3ee-8171-5279-b023-a1ff03706594"
        );
    }
}
