//! TOML loading with a 0.5.0 compatibility gate.

use crate::Error;

/// Parse a `pyproject.toml` document into a raw value tree.
///
/// The tree is checked against TOML 0.5.0 before deserialization: arrays with elements of
/// more than one type require TOML 1.0.0 semantics and are rejected with the dotted path of
/// the offending array.
pub(crate) fn parse(contents: &str) -> Result<toml::Value, Error> {
    let value: toml::Value = toml::from_str(contents)?;
    check_toml_0_5(&value, &mut Vec::new())?;
    Ok(value)
}

/// The TOML type name used in value comparisons, one per syntactic kind.
fn type_name(value: &toml::Value) -> &'static str {
    match value {
        toml::Value::String(_) => "string",
        toml::Value::Integer(_) => "integer",
        toml::Value::Float(_) => "float",
        toml::Value::Boolean(_) => "boolean",
        toml::Value::Datetime(_) => "datetime",
        toml::Value::Array(_) => "array",
        toml::Value::Table(_) => "table",
    }
}

fn check_toml_0_5(value: &toml::Value, path: &mut Vec<String>) -> Result<(), Error> {
    match value {
        toml::Value::Array(array) => {
            let mut kinds = array.iter().map(type_name);
            if let Some(first) = kinds.next() {
                if kinds.any(|kind| kind != first) {
                    return Err(Error::TomlCompat {
                        path: path.join("."),
                    });
                }
            }
            for (index, element) in array.iter().enumerate() {
                path.push(format!("[{index}]"));
                check_toml_0_5(element, path)?;
                path.pop();
            }
        }
        toml::Value::Table(table) => {
            for (key, element) in table {
                path.push(key.clone());
                check_toml_0_5(element, path)?;
                path.pop();
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn homogeneous_arrays() {
        let contents = indoc! {r#"
            [project]
            name = "spam"
            version = "1.0"
            keywords = ["a", "b"]
        "#};
        parse(contents).unwrap();
    }

    #[test]
    fn mixed_type_array() {
        let contents = indoc! {r#"
            [tool.whey]
            python-versions = ["3.8", 3.9]
        "#};
        let err = parse(contents).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"TOML constructs newer than 0.5.0 are not supported: mixed-type array at `tool.whey.python-versions`. Use elements of a single type."
        );
    }
}
