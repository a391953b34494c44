//! Axiom conversion: projects authored class/GCI axioms into OWL-axiom
//! reference set members for storage and into stated relationships for the
//! semantic index, and reads stored `owlExpression` strings back into
//! axioms. Deterministic for a given axiom set.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::map,
    multi::separated_list1,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::error::{Result, TerminologyError};
use crate::model::concept::Axiom;
use crate::model::constants;
use crate::model::refset::{fields, ReferenceSetMember};
use crate::model::{Concept, Relationship, SnomedComponent};

/// Render an axiom as an OWL functional-syntax expression.
pub fn to_owl_expression(concept_id: &str, axiom: &Axiom) -> String {
    let keyword = if axiom.definition_status_id == constants::FULLY_DEFINED {
        "EquivalentClasses"
    } else {
        "SubClassOf"
    };

    let mut operands: Vec<String> = Vec::new();
    for relationship in axiom.relationships.iter().filter(|r| r.is_isa()) {
        operands.push(format!(":{}", relationship.destination_id));
    }
    let mut groups: std::collections::BTreeMap<i32, Vec<&Relationship>> =
        std::collections::BTreeMap::new();
    for relationship in axiom.relationships.iter().filter(|r| !r.is_isa()) {
        groups.entry(relationship.group).or_default().push(relationship);
    }
    for attributes in groups.values() {
        let rendered: Vec<String> = attributes
            .iter()
            .map(|r| format!("ObjectSomeValuesFrom(:{} :{})", r.type_id, r.destination_id))
            .collect();
        let inner = if rendered.len() == 1 {
            rendered.into_iter().next().unwrap_or_default()
        } else {
            format!("ObjectIntersectionOf({})", rendered.join(" "))
        };
        operands.push(format!(
            "ObjectSomeValuesFrom(:{} {})",
            constants::ROLE_GROUP,
            inner
        ));
    }

    let body = if operands.len() == 1 {
        operands.into_iter().next().unwrap_or_default()
    } else {
        format!("ObjectIntersectionOf({})", operands.join(" "))
    };
    format!("{}(:{} {} )", keyword, concept_id, body)
}

#[derive(Debug, Clone, PartialEq)]
enum OwlExpr {
    Named(String),
    Intersection(Vec<OwlExpr>),
    SomeValues(String, Box<OwlExpr>),
}

fn named(input: &str) -> IResult<&str, OwlExpr> {
    map(preceded(char(':'), digit1), |id: &str| {
        OwlExpr::Named(id.to_string())
    })(input)
}

fn some_values(input: &str) -> IResult<&str, OwlExpr> {
    map(
        preceded(
            tag("ObjectSomeValuesFrom"),
            delimited(
                char('('),
                tuple((
                    multispace0,
                    preceded(char(':'), digit1),
                    multispace1,
                    owl_expr,
                    multispace0,
                )),
                char(')'),
            ),
        ),
        |(_, property, _, filler, _)| OwlExpr::SomeValues(property.to_string(), Box::new(filler)),
    )(input)
}

fn intersection(input: &str) -> IResult<&str, OwlExpr> {
    map(
        preceded(
            tag("ObjectIntersectionOf"),
            delimited(
                char('('),
                delimited(
                    multispace0,
                    separated_list1(multispace1, owl_expr),
                    multispace0,
                ),
                char(')'),
            ),
        ),
        OwlExpr::Intersection,
    )(input)
}

fn owl_expr(input: &str) -> IResult<&str, OwlExpr> {
    alt((some_values, intersection, named))(input)
}

fn owl_axiom(input: &str) -> IResult<&str, (&str, OwlExpr, OwlExpr)> {
    map(
        tuple((
            alt((tag("EquivalentClasses"), tag("SubClassOf"))),
            delimited(
                char('('),
                tuple((multispace0, owl_expr, multispace1, owl_expr, multispace0)),
                char(')'),
            ),
        )),
        |(keyword, (_, left, _, right, _))| (keyword, left, right),
    )(input)
}

/// A parsed axiom: the named concept it defines plus its relationship view.
#[derive(Debug, Clone)]
pub struct ParsedAxiom {
    pub referenced_concept_id: String,
    pub definition_status_id: String,
    pub relationships: Vec<Relationship>,
    pub gci: bool,
}

/// Parse a stored `owlExpression` back into an axiom.
pub fn from_owl_expression(expression: &str) -> Result<ParsedAxiom> {
    let (rest, (keyword, left, right)) = owl_axiom(expression.trim()).map_err(|_| {
        TerminologyError::InvalidArgument(format!("Malformed OWL expression '{}'", expression))
    })?;
    if !rest.trim().is_empty() {
        return Err(TerminologyError::InvalidArgument(format!(
            "Trailing content in OWL expression '{}'",
            expression
        )));
    }

    let definition_status_id = if keyword == "EquivalentClasses" {
        constants::FULLY_DEFINED
    } else {
        constants::PRIMITIVE
    };

    let (named_side, expression_side, gci) = match (&left, &right) {
        (OwlExpr::Named(id), _) => (id.clone(), right, false),
        (_, OwlExpr::Named(id)) => (id.clone(), left, true),
        _ => {
            return Err(TerminologyError::InvalidArgument(format!(
                "OWL expression names no class: '{}'",
                expression
            )))
        }
    };

    let relationships = expression_to_relationships(&named_side, &expression_side)?;
    Ok(ParsedAxiom {
        referenced_concept_id: named_side,
        definition_status_id: definition_status_id.to_string(),
        relationships,
        gci,
    })
}

fn expression_to_relationships(source_id: &str, expr: &OwlExpr) -> Result<Vec<Relationship>> {
    let operands: Vec<&OwlExpr> = match expr {
        OwlExpr::Intersection(children) => children.iter().collect(),
        other => vec![other],
    };
    let mut relationships = Vec::new();
    let mut next_group = 1;
    for operand in operands {
        match operand {
            OwlExpr::Named(destination) => {
                let mut relationship = Relationship::isa(destination).stated();
                relationship.source_id = source_id.to_string();
                relationships.push(relationship);
            }
            OwlExpr::SomeValues(property, filler) if property == constants::ROLE_GROUP => {
                let group = next_group;
                next_group += 1;
                for (type_id, destination) in flatten_attributes(filler)? {
                    let mut relationship =
                        Relationship::new(&type_id, &destination).stated().in_group(group);
                    relationship.source_id = source_id.to_string();
                    relationships.push(relationship);
                }
            }
            OwlExpr::SomeValues(property, filler) => {
                let destination = named_filler(filler)?;
                let mut relationship = Relationship::new(property, &destination).stated();
                relationship.source_id = source_id.to_string();
                relationships.push(relationship);
            }
            OwlExpr::Intersection(_) => {
                return Err(TerminologyError::InvalidArgument(
                    "Nested intersection outside a role group".to_string(),
                ))
            }
        }
    }
    Ok(relationships)
}

fn flatten_attributes(filler: &OwlExpr) -> Result<Vec<(String, String)>> {
    match filler {
        OwlExpr::SomeValues(property, inner) => {
            Ok(vec![(property.clone(), named_filler(inner)?)])
        }
        OwlExpr::Intersection(children) => {
            let mut attributes = Vec::new();
            for child in children {
                attributes.extend(flatten_attributes(child)?);
            }
            Ok(attributes)
        }
        OwlExpr::Named(_) => Err(TerminologyError::InvalidArgument(
            "Role group contains a bare class".to_string(),
        )),
    }
}

fn named_filler(expr: &OwlExpr) -> Result<String> {
    match expr {
        OwlExpr::Named(id) => Ok(id.clone()),
        _ => Err(TerminologyError::InvalidArgument(
            "Attribute value is not a named class".to_string(),
        )),
    }
}

/// Build or refresh the OWL-axiom refset members held on each concept's
/// axioms, ahead of persistence.
pub fn populate_axiom_members(concepts: &mut [Concept]) {
    for concept in concepts.iter_mut() {
        let concept_id = concept.concept_id.clone();
        for axiom in concept
            .class_axioms
            .iter_mut()
            .chain(concept.gci_axioms.iter_mut())
        {
            let expression = to_owl_expression(&concept_id, axiom);
            let mut member = match &axiom.axiom_id {
                Some(existing_id) => {
                    let mut member = ReferenceSetMember::new(
                        &axiom.module_id,
                        constants::OWL_AXIOM_REFERENCE_SET,
                        &concept_id,
                    );
                    member.member_id = existing_id.clone();
                    member
                }
                None => ReferenceSetMember::new(
                    &axiom.module_id,
                    constants::OWL_AXIOM_REFERENCE_SET,
                    &concept_id,
                ),
            };
            member.set_additional_field(fields::OWL_EXPRESSION, &expression);
            member.concept_id = Some(concept_id.clone());
            member.active = axiom.active;
            member.mark_changed();
            axiom.axiom_id = Some(member.member_id.clone());
            axiom.member = Some(member);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_axiom_round_trips_through_owl() {
        let axiom = Axiom::new(
            constants::FULLY_DEFINED,
            vec![
                Relationship::isa("10000100"),
                Relationship::new("10000200", "10000300"),
            ],
        );
        let expression = to_owl_expression("50960005", &axiom);
        assert_eq!(
            expression,
            "EquivalentClasses(:50960005 ObjectIntersectionOf(:10000100 \
             ObjectSomeValuesFrom(:609096000 ObjectSomeValuesFrom(:10000200 :10000300))) )"
        );

        let parsed = from_owl_expression(&expression).unwrap();
        assert_eq!(parsed.referenced_concept_id, "50960005");
        assert_eq!(parsed.definition_status_id, constants::FULLY_DEFINED);
        assert!(!parsed.gci);
        assert_eq!(parsed.relationships.len(), 2);
        let isa = parsed.relationships.iter().find(|r| r.is_isa()).unwrap();
        assert_eq!(isa.destination_id, "10000100");
        let attribute = parsed.relationships.iter().find(|r| !r.is_isa()).unwrap();
        assert_eq!(attribute.type_id, "10000200");
        assert_eq!(attribute.destination_id, "10000300");
        assert_eq!(attribute.group, 1);
    }

    #[test]
    fn sub_class_axiom_parses_as_primitive() {
        let expression = "SubClassOf(:100 :200 )";
        let parsed = from_owl_expression(expression).unwrap();
        assert_eq!(parsed.definition_status_id, constants::PRIMITIVE);
        assert_eq!(parsed.relationships.len(), 1);
        assert!(parsed.relationships[0].is_isa());
    }

    #[test]
    fn single_parent_axiom_has_no_intersection() {
        let axiom = Axiom::new(constants::PRIMITIVE, vec![Relationship::isa("200")]);
        assert_eq!(to_owl_expression("100", &axiom), "SubClassOf(:100 :200 )");
    }

    #[test]
    fn gci_names_the_right_hand_class() {
        let expression =
            "SubClassOf(ObjectIntersectionOf(:300 ObjectSomeValuesFrom(:609096000 \
             ObjectSomeValuesFrom(:400 :500))) :100 )";
        let parsed = from_owl_expression(expression).unwrap();
        assert!(parsed.gci);
        assert_eq!(parsed.referenced_concept_id, "100");
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(from_owl_expression("EquivalentClasses(:100)").is_err());
        assert!(from_owl_expression("DisjointClasses(:100 :200)").is_err());
    }

    #[test]
    fn shared_group_renders_one_role_group() {
        let axiom = Axiom::new(
            constants::FULLY_DEFINED,
            vec![
                Relationship::isa("10"),
                Relationship::new("20", "30").in_group(1),
                Relationship::new("40", "50").in_group(1),
            ],
        );
        let expression = to_owl_expression("1", &axiom);
        assert_eq!(expression.matches(":609096000").count(), 1);
        let parsed = from_owl_expression(&expression).unwrap();
        assert_eq!(parsed.relationships.len(), 3);
        assert!(parsed
            .relationships
            .iter()
            .filter(|r| !r.is_isa())
            .all(|r| r.group == 1));
    }
}
