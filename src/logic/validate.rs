//! Pure per-entity validators, run at the head of the update pipeline.

use crate::error::{Result, TerminologyError};
use crate::model::constants;
use crate::model::{Concept, Description, Relationship};

pub fn validate_concepts(concepts: &[Concept]) -> Result<()> {
    for concept in concepts {
        validate_concept(concept)?;
        for description in &concept.descriptions {
            validate_description(description)?;
        }
        for relationship in &concept.relationships {
            validate_relationship(relationship)?;
        }
    }
    Ok(())
}

pub fn validate_concept(concept: &Concept) -> Result<()> {
    if concept.module_id.is_empty() {
        return Err(TerminologyError::InvalidArgument(
            "Concept moduleId is required".to_string(),
        ));
    }
    if concept.definition_status_id != constants::FULLY_DEFINED
        && concept.definition_status_id != constants::PRIMITIVE
    {
        return Err(TerminologyError::InvalidArgument(format!(
            "Definition status not recognised '{}'",
            concept.definition_status_id
        )));
    }
    Ok(())
}

pub fn validate_description(description: &Description) -> Result<()> {
    if description.term.is_empty() {
        return Err(TerminologyError::InvalidArgument(
            "Description term is required".to_string(),
        ));
    }
    if description.module_id.is_empty() {
        return Err(TerminologyError::InvalidArgument(
            "Description moduleId is required".to_string(),
        ));
    }
    if description.language_code.len() != 2
        || !description
            .language_code
            .chars()
            .all(|c| c.is_ascii_lowercase())
    {
        return Err(TerminologyError::InvalidArgument(format!(
            "Language code not recognised '{}'",
            description.language_code
        )));
    }
    if description.type_id.is_empty() {
        return Err(TerminologyError::InvalidArgument(
            "Description typeId is required".to_string(),
        ));
    }
    if !constants::case_significance_ids().contains(&description.case_significance_id.as_str()) {
        return Err(TerminologyError::InvalidArgument(format!(
            "Case significance not recognised '{}'",
            description.case_significance_id
        )));
    }
    let recognized = constants::acceptability_ids();
    for acceptability in description.acceptability_map.values() {
        if !recognized.contains_key(acceptability.as_str()) {
            return Err(TerminologyError::InvalidArgument(format!(
                "Acceptability value not recognised '{}'",
                acceptability
            )));
        }
    }
    Ok(())
}

pub fn validate_relationship(relationship: &Relationship) -> Result<()> {
    if relationship.type_id.is_empty() || relationship.destination_id.is_empty() {
        return Err(TerminologyError::InvalidArgument(
            "Relationship typeId and destinationId are required".to_string(),
        ));
    }
    if relationship.module_id.is_empty() {
        return Err(TerminologyError::InvalidArgument(
            "Relationship moduleId is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_acceptability() {
        let concept = Concept::primitive("100").with_description(
            Description::synonym("Heart")
                .with_acceptability(constants::US_EN_LANGUAGE_REFERENCE_SET, "FAVOURITE"),
        );
        let err = validate_concepts(&[concept]).unwrap_err();
        assert!(matches!(err, TerminologyError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_bad_language_code() {
        let mut description = Description::synonym("Heart");
        description.language_code = "EN".to_string();
        assert!(validate_description(&description).is_err());
    }

    #[test]
    fn accepts_well_formed_concept() {
        let concept = Concept::primitive("100").with_description(
            Description::synonym("Heart").preferred_in(constants::US_EN_LANGUAGE_REFERENCE_SET),
        );
        assert!(validate_concepts(&[concept]).is_ok());
    }
}
