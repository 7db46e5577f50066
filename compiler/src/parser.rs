use crate::{
    error::SheetError,
    types::{FieldType, Primitive, TypeExpr},
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Splits 'list(Item)["~", "#"]' into the type part and the optional
    // trailing delimiter bracket.
    static ref UNIFIED_SYNTAX: Regex = Regex::new(r"^(.*?)\s*(\[.*\])?$").unwrap();
    static ref LIST_WRAPPER:   Regex = Regex::new(r"^list\((.*)\)$").unwrap();
    static ref IDENTIFIER:     Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

fn syntax_error(text: &str, detail: &str) -> SheetError {
    SheetError::Syntax {
        text: text.to_owned(),
        detail: detail.to_owned(),
    }
}

/// Parses the unified type syntax `TypeName["d0","d1",...]` into a
/// [`FieldType`]: the expression tree plus the optional delimiter list,
/// outer level first.
///
/// The expression grammar is `Type := primitive | Identifier |
/// "list(" Type ")"`; identifiers are left unresolved for the registry.
/// Malformed input fails with [`SheetError::Syntax`] carrying the offending
/// text.
pub fn parse_field_type(text: &str) -> Result<FieldType, SheetError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(syntax_error(text, "empty type string"));
    }

    let caps = UNIFIED_SYNTAX
        .captures(trimmed)
        .ok_or_else(|| syntax_error(text, "unrecognized type syntax"))?;
    let main = caps.get(1).map_or("", |m| m.as_str()).trim();
    if main.is_empty() {
        return Err(syntax_error(text, "missing type before delimiter bracket"));
    }

    let delimiters = match caps.get(2) {
        Some(bracket) => {
            let list: Vec<String> = serde_json::from_str(bracket.as_str())
                .map_err(|e| syntax_error(text, &format!("invalid delimiter list: {}", e)))?;
            // An empty bracket means the same thing as no bracket.
            if list.is_empty() {
                None
            } else {
                Some(list)
            }
        }
        None => None,
    };

    Ok(FieldType {
        expr: parse_expr(main, text)?,
        delimiters,
    })
}

fn parse_expr(part: &str, whole: &str) -> Result<TypeExpr, SheetError> {
    let part = part.trim();
    if let Some(caps) = LIST_WRAPPER.captures(part) {
        let inner = parse_expr(caps.get(1).map_or("", |m| m.as_str()), whole)?;
        return Ok(TypeExpr::List(Box::new(inner)));
    }
    if let Some(primitive) = Primitive::from_keyword(part) {
        return Ok(TypeExpr::Primitive(primitive));
    }
    if IDENTIFIER.is_match(part) {
        return Ok(TypeExpr::Reference(part.to_owned()));
    }
    Err(syntax_error(
        whole,
        &format!("expected a primitive, identifier or list(...) but found {:?}", part),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitives() {
        for (word, expected) in [
            ("int", Primitive::Int),
            ("long", Primitive::Long),
            ("float", Primitive::Float),
            ("bool", Primitive::Bool),
            ("string", Primitive::Str),
        ] {
            let parsed = parse_field_type(word).unwrap();
            assert_eq!(parsed.expr, TypeExpr::Primitive(expected));
            assert_eq!(parsed.delimiters, None);
        }
    }

    #[test]
    fn parses_identifier_as_reference() {
        let parsed = parse_field_type("ItemInfo").unwrap();
        assert_eq!(parsed.expr, TypeExpr::Reference("ItemInfo".to_owned()));
    }

    #[test]
    fn parses_nested_lists_with_delimiters() {
        let parsed = parse_field_type(r##"list(list(int))["~", "#"]"##).unwrap();
        assert_eq!(
            parsed.expr,
            TypeExpr::List(Box::new(TypeExpr::List(Box::new(TypeExpr::Primitive(
                Primitive::Int
            )))))
        );
        assert_eq!(
            parsed.delimiters,
            Some(vec!["~".to_owned(), "#".to_owned()])
        );
        assert_eq!(parsed.expr.collection_depth(), 2);
    }

    #[test]
    fn parses_list_of_reference() {
        let parsed = parse_field_type(r#"list(Item)["~"]"#).unwrap();
        assert_eq!(
            parsed.expr,
            TypeExpr::List(Box::new(TypeExpr::Reference("Item".to_owned())))
        );
        assert_eq!(parsed.delimiters, Some(vec!["~".to_owned()]));
    }

    #[test]
    fn missing_bracket_means_json_source() {
        let parsed = parse_field_type("list(list(string))").unwrap();
        assert_eq!(parsed.delimiters, None);
        assert_eq!(parsed.expr.collection_depth(), 2);
    }

    #[test]
    fn empty_bracket_normalizes_to_none() {
        let parsed = parse_field_type("list(int)[]").unwrap();
        assert_eq!(parsed.delimiters, None);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            parse_field_type(""),
            Err(SheetError::Syntax { .. })
        ));
        assert!(matches!(
            parse_field_type("list(int"),
            Err(SheetError::Syntax { .. })
        ));
        assert!(matches!(
            parse_field_type("list(int)[1, 2]"),
            Err(SheetError::Syntax { .. })
        ));
        assert!(matches!(
            parse_field_type(r#"list(int)["~""#),
            Err(SheetError::Syntax { .. })
        ));
        assert!(matches!(
            parse_field_type("my type"),
            Err(SheetError::Syntax { .. })
        ));
    }

    #[test]
    fn keeps_whitespace_tolerance() {
        let parsed = parse_field_type(r#"  list( int ) ["~"]  "#).unwrap();
        assert_eq!(
            parsed.expr,
            TypeExpr::List(Box::new(TypeExpr::Primitive(Primitive::Int)))
        );
        assert_eq!(parsed.delimiters, Some(vec!["~".to_owned()]));
    }
}
