//! ECL subset parser. Accepted grammar:
//!
//! ```text
//! expressionconstraint := sub [':' attribute]
//! sub                  := [op] ['^'] focus
//! op                   := '<<' | '<' | '>>' | '>'
//! focus                := sctid | '*'
//! attribute            := sub '=' sub
//! ```
//!
//! Every other ECL production is rejected with `Unsupported`, naming the
//! construct.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0},
    combinator::{map, opt},
    sequence::{preceded, tuple},
    IResult,
};

use crate::ecl::ast::{
    EclAttribute, ExpressionConstraint, FocusConcept, Operator, SubExpressionConstraint,
};
use crate::error::{Result, TerminologyError};

fn operator(input: &str) -> IResult<&str, Operator> {
    alt((
        map(tag("<<"), |_| Operator::DescendantOrSelfOf),
        map(tag("<"), |_| Operator::DescendantOf),
        map(tag(">>"), |_| Operator::AncestorOrSelfOf),
        map(tag(">"), |_| Operator::AncestorOf),
    ))(input)
}

fn focus(input: &str) -> IResult<&str, FocusConcept> {
    alt((
        map(char('*'), |_| FocusConcept::Wildcard),
        map(digit1, |id: &str| FocusConcept::Id(id.to_string())),
    ))(input)
}

fn sub_expression(input: &str) -> IResult<&str, SubExpressionConstraint> {
    map(
        tuple((
            preceded(multispace0, opt(operator)),
            preceded(multispace0, opt(char('^'))),
            preceded(multispace0, focus),
        )),
        |(operator, member_of, focus)| SubExpressionConstraint {
            operator,
            member_of: member_of.is_some(),
            focus,
        },
    )(input)
}

fn attribute(input: &str) -> IResult<&str, EclAttribute> {
    map(
        tuple((
            sub_expression,
            preceded(multispace0, char('=')),
            sub_expression,
        )),
        |(name, _, value)| EclAttribute { name, value },
    )(input)
}

/// Point at the ECL construct outside the subset, mirroring the constructs
/// the full grammar would have produced.
fn unsupported_construct(rest: &str) -> Option<&'static str> {
    let rest = rest.trim_start();
    if rest.starts_with("AND") || rest.starts_with("and") {
        Some("ConjunctionExpressionConstraint")
    } else if rest.starts_with("OR") || rest.starts_with("or") {
        Some("DisjunctionExpressionConstraint")
    } else if rest.starts_with("MINUS") || rest.starts_with("minus") {
        Some("ExclusionExpressionConstraint")
    } else if rest.starts_with('.') {
        Some("DottedExpressionConstraint")
    } else if rest.starts_with(',') {
        Some("ConjunctionRefinementSet")
    } else if rest.starts_with('{') {
        Some("EclAttributeGroup")
    } else if rest.starts_with('[') {
        Some("Cardinality")
    } else if rest.starts_with('(') {
        Some("Nested expression constraint")
    } else if rest.starts_with('|') {
        Some("Concept term")
    } else {
        None
    }
}

pub fn parse(ecl: &str) -> Result<ExpressionConstraint> {
    let trimmed = ecl.trim();
    if trimmed.is_empty() {
        return Err(TerminologyError::InvalidArgument(
            "Empty ECL expression".to_string(),
        ));
    }
    if let Some(construct) = unsupported_construct(trimmed) {
        return Err(TerminologyError::Unsupported(format!(
            "{} is not supported.",
            construct
        )));
    }
    if trimmed.starts_with('R') {
        return Err(TerminologyError::Unsupported(
            "The reverse flag is not supported.".to_string(),
        ));
    }

    let (rest, sub) = sub_expression(trimmed).map_err(|_| {
        TerminologyError::InvalidArgument(format!("Failed to parse ECL '{}'", ecl))
    })?;
    let rest_trimmed = rest.trim_start();

    if rest_trimmed.is_empty() {
        return Ok(ExpressionConstraint::Sub(sub));
    }

    if let Some(refinement_rest) = rest_trimmed.strip_prefix(':') {
        if let Some(construct) = unsupported_construct(refinement_rest) {
            return Err(TerminologyError::Unsupported(format!(
                "{} is not supported.",
                construct
            )));
        }
        if refinement_rest.trim_start().starts_with("R ") {
            return Err(TerminologyError::Unsupported(
                "The reverse flag is not supported.".to_string(),
            ));
        }
        let value_side = refinement_rest
            .split_once('=')
            .map(|(_, value)| value.trim_start());
        match value_side {
            Some(value) if value.starts_with('#') => {
                return Err(TerminologyError::Unsupported(
                    "Only the expressionComparisonOperator is supported, not the \
                     numericComparisonOperator."
                        .to_string(),
                ))
            }
            Some(value) if value.starts_with('"') => {
                return Err(TerminologyError::Unsupported(
                    "Only the expressionComparisonOperator is supported, not the \
                     stringComparisonOperator."
                        .to_string(),
                ))
            }
            Some(value) if value.starts_with('(') => {
                return Err(TerminologyError::Unsupported(
                    "Nested expression constraint is not supported.".to_string(),
                ))
            }
            _ => {}
        }
        let (attribute_rest, attribute) = attribute(refinement_rest).map_err(|_| {
            TerminologyError::InvalidArgument(format!("Failed to parse ECL refinement '{}'", ecl))
        })?;
        let leftover = attribute_rest.trim();
        if !leftover.is_empty() {
            if let Some(construct) = unsupported_construct(leftover) {
                return Err(TerminologyError::Unsupported(format!(
                    "{} is not supported.",
                    construct
                )));
            }
            return Err(TerminologyError::InvalidArgument(format!(
                "Unexpected trailing ECL content '{}'",
                leftover
            )));
        }
        return Ok(ExpressionConstraint::Refined { sub, attribute });
    }

    if let Some(construct) = unsupported_construct(rest_trimmed) {
        return Err(TerminologyError::Unsupported(format!(
            "{} is not supported.",
            construct
        )));
    }
    Err(TerminologyError::InvalidArgument(format!(
        "Unexpected trailing ECL content '{}'",
        rest_trimmed
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operators_and_focus() {
        let parsed = parse("<< 404684003").unwrap();
        match parsed {
            ExpressionConstraint::Sub(sub) => {
                assert_eq!(sub.operator, Some(Operator::DescendantOrSelfOf));
                assert_eq!(sub.focus, FocusConcept::Id("404684003".to_string()));
            }
            _ => panic!("expected sub expression"),
        }

        assert!(matches!(
            parse("*").unwrap(),
            ExpressionConstraint::Sub(SubExpressionConstraint {
                operator: None,
                member_of: false,
                focus: FocusConcept::Wildcard,
            })
        ));
    }

    #[test]
    fn parses_member_of() {
        match parse("^ 700043003").unwrap() {
            ExpressionConstraint::Sub(sub) => {
                assert!(sub.member_of);
                assert_eq!(sub.focus, FocusConcept::Id("700043003".to_string()));
            }
            _ => panic!("expected sub expression"),
        }
    }

    #[test]
    fn parses_single_attribute_refinement() {
        match parse("<< 404684003 : 363698007 = 39057004").unwrap() {
            ExpressionConstraint::Refined { sub, attribute } => {
                assert_eq!(sub.operator, Some(Operator::DescendantOrSelfOf));
                assert_eq!(
                    attribute.name.focus,
                    FocusConcept::Id("363698007".to_string())
                );
                assert_eq!(
                    attribute.value.focus,
                    FocusConcept::Id("39057004".to_string())
                );
            }
            _ => panic!("expected refinement"),
        }
    }

    #[test]
    fn rejects_unsupported_constructs() {
        for (ecl, fragment) in [
            ("100 AND 200", "Conjunction"),
            ("100 OR 200", "Disjunction"),
            ("100 MINUS 200", "Exclusion"),
            ("100 . 363698007", "Dotted"),
            ("100 : 1 = 2, 3 = 4", "ConjunctionRefinementSet"),
            ("100 : { 1 = 2 }", "EclAttributeGroup"),
            ("100 : [1..2] 3 = 4", "Cardinality"),
            ("100 : 1 = #5", "numericComparisonOperator"),
            ("100 : 1 = \"text\"", "stringComparisonOperator"),
            ("100 : 1 = (2 AND 3)", "Nested"),
            ("(100 AND 200) : 1 = 2", "Nested"),
        ] {
            let err = parse(ecl).unwrap_err();
            match err {
                TerminologyError::Unsupported(message) => {
                    assert!(
                        message.contains(fragment),
                        "'{}' should mention {}, got '{}'",
                        ecl,
                        fragment,
                        message
                    );
                }
                other => panic!("'{}' should be Unsupported, got {:?}", ecl, other),
            }
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            parse(""),
            Err(TerminologyError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse("abc"),
            Err(TerminologyError::InvalidArgument(_))
        ));
    }
}
