//! Well-known SNOMED CT concept identifiers and name dictionaries.

use std::collections::HashMap;

pub const ROOT_CONCEPT: &str = "138875005";
pub const ISA: &str = "116680003";
pub const CORE_MODULE: &str = "900000000000207008";

pub const FULLY_DEFINED: &str = "900000000000073002";
pub const PRIMITIVE: &str = "900000000000074008";

pub const STATED_RELATIONSHIP: &str = "900000000000010007";
pub const INFERRED_RELATIONSHIP: &str = "900000000000011006";
pub const ADDITIONAL_RELATIONSHIP: &str = "900000000000227009";

pub const EXISTENTIAL_MODIFIER: &str = "900000000000451002";
pub const ROLE_GROUP: &str = "609096000";

pub const FSN: &str = "900000000000003001";
pub const SYNONYM: &str = "900000000000013009";
pub const CASE_INSENSITIVE: &str = "900000000000448009";
pub const ENTIRE_TERM_CASE_SENSITIVE: &str = "900000000000017005";
pub const INITIAL_CHARACTER_CASE_INSENSITIVE: &str = "900000000000020002";

pub const PREFERRED: &str = "900000000000548007";
pub const ACCEPTABLE: &str = "900000000000549004";

pub const US_EN_LANGUAGE_REFERENCE_SET: &str = "900000000000509007";
pub const GB_EN_LANGUAGE_REFERENCE_SET: &str = "900000000000508004";

pub const OWL_AXIOM_REFERENCE_SET: &str = "733073007";
pub const CONCEPT_INACTIVATION_INDICATOR_REFERENCE_SET: &str = "900000000000489007";
pub const DESCRIPTION_INACTIVATION_INDICATOR_REFERENCE_SET: &str = "900000000000490003";

/// Acceptability id keyed by name, as authored in acceptability maps.
pub fn acceptability_ids() -> HashMap<&'static str, &'static str> {
    HashMap::from([("PREFERRED", PREFERRED), ("ACCEPTABLE", ACCEPTABLE)])
}

/// Inactivation indicator valueId keyed by indicator name.
pub fn inactivation_indicator_ids() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("DUPLICATE", "900000000000482003"),
        ("OUTDATED", "900000000000483008"),
        ("AMBIGUOUS", "900000000000484002"),
        ("ERRONEOUS", "900000000000485001"),
        ("LIMITED", "900000000000486000"),
        ("MOVED_ELSEWHERE", "900000000000487005"),
        ("PENDING_MOVE", "900000000000492006"),
        ("INAPPROPRIATE", "900000000000494007"),
        ("CONCEPT_NON_CURRENT", "900000000000495008"),
        ("NONCONFORMANCE_TO_EDITORIAL_POLICY", "723277005"),
    ])
}

/// Historical association refsetId keyed by association name.
pub fn historical_association_ids() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("POSSIBLY_EQUIVALENT_TO", "900000000000523009"),
        ("MOVED_TO", "900000000000524003"),
        ("MOVED_FROM", "900000000000525002"),
        ("REPLACED_BY", "900000000000526001"),
        ("SAME_AS", "900000000000527005"),
        ("WAS_A", "900000000000528000"),
        ("SIMILAR_TO", "900000000000529008"),
        ("ALTERNATIVE", "900000000000530003"),
        ("REFERS_TO", "900000000000531004"),
    ])
}

pub fn case_significance_ids() -> [&'static str; 3] {
    [
        CASE_INSENSITIVE,
        ENTIRE_TERM_CASE_SENSITIVE,
        INITIAL_CHARACTER_CASE_INSENSITIVE,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_dictionaries_are_inverse_consistent() {
        let ids = inactivation_indicator_ids();
        assert_eq!(ids["AMBIGUOUS"], "900000000000484002");
        assert_eq!(acceptability_ids()["PREFERRED"], PREFERRED);
        assert_eq!(
            historical_association_ids()["POSSIBLY_EQUIVALENT_TO"],
            "900000000000523009"
        );
    }
}
