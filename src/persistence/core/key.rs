use std::fmt;

// ============================================================================
// Entity Identity - Canonical Keys
// ============================================================================
//
// An entity id is an ordered list of named primitive attributes. The
// canonical key joins the string form of each value with KEY_SEPARATOR in
// declared order. Values may not be empty and may not contain the
// separator, so two distinct attribute tuples can never produce the same key.
//
// ============================================================================

/// Reserved separator between attribute values in a canonical key
pub const KEY_SEPARATOR: char = '#';

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KeyError {
    #[error("Malformed key: attribute '{attribute}' is empty or null")]
    EmptyAttribute { attribute: &'static str },

    #[error("Malformed key: attribute '{attribute}' contains the reserved separator '#'")]
    ReservedSeparator { attribute: &'static str },

    #[error("Malformed key: attribute '{attribute}' is not a finite number")]
    NonFiniteNumber { attribute: &'static str },

    #[error("Malformed key: no attributes declared")]
    NoAttributes,
}

/// Primitive value allowed inside a key
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Str(String),
    Int(i64),
    Float(f64),
    /// Named enum member, rendered by its name
    Enum(&'static str),
    Null,
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Str(value) => f.write_str(value),
            KeyValue::Int(value) => write!(f, "{}", value),
            KeyValue::Float(value) => write!(f, "{}", value),
            KeyValue::Enum(name) => f.write_str(name),
            KeyValue::Null => f.write_str(""),
        }
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::Str(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Str(value.to_string())
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Int(value)
    }
}

impl From<i32> for KeyValue {
    fn from(value: i32) -> Self {
        KeyValue::Int(value.into())
    }
}

impl From<f64> for KeyValue {
    fn from(value: f64) -> Self {
        KeyValue::Float(value)
    }
}

impl<T: Into<KeyValue>> From<Option<T>> for KeyValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(KeyValue::Null)
    }
}

/// One named attribute of an entity id
#[derive(Debug, Clone, PartialEq)]
pub struct KeyAttribute {
    pub name: &'static str,
    pub value: KeyValue,
}

impl KeyAttribute {
    pub fn new(name: &'static str, value: impl Into<KeyValue>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }

    fn render(&self) -> Result<String, KeyError> {
        let rendered = match &self.value {
            KeyValue::Null => return Err(KeyError::EmptyAttribute { attribute: self.name }),
            KeyValue::Float(value) if !value.is_finite() => {
                return Err(KeyError::NonFiniteNumber { attribute: self.name })
            }
            other => other.to_string(),
        };

        if rendered.is_empty() {
            return Err(KeyError::EmptyAttribute { attribute: self.name });
        }
        if rendered.contains(KEY_SEPARATOR) {
            return Err(KeyError::ReservedSeparator { attribute: self.name });
        }
        Ok(rendered)
    }
}

/// Build the canonical key for an ordered attribute list.
///
/// Fails on the first malformed attribute; a key is never partially built.
pub fn canonical_key(attributes: &[KeyAttribute]) -> Result<String, KeyError> {
    if attributes.is_empty() {
        return Err(KeyError::NoAttributes);
    }

    let parts = attributes
        .iter()
        .map(KeyAttribute::render)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(parts.join(&KEY_SEPARATOR.to_string()))
}

/// Identity of a root entity
pub trait EntityId: Clone + Send + Sync {
    /// Identifying attributes in declared order
    fn key_attributes(&self) -> Vec<KeyAttribute>;

    fn key(&self) -> Result<String, KeyError> {
        canonical_key(&self.key_attributes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct SeatId {
        hall: String,
        row: i64,
        zone: Option<&'static str>,
    }

    impl EntityId for SeatId {
        fn key_attributes(&self) -> Vec<KeyAttribute> {
            vec![
                KeyAttribute::new("hall", self.hall.clone()),
                KeyAttribute::new("row", self.row),
                KeyAttribute::new("zone", self.zone.map(KeyValue::Enum)),
            ]
        }
    }

    #[test]
    fn test_key_joins_values_in_declared_order() {
        let id = SeatId { hall: "main".into(), row: 12, zone: Some("VIP") };
        assert_eq!(id.key().unwrap(), "main#12#VIP");
    }

    #[test]
    fn test_key_is_deterministic() {
        let id = SeatId { hall: "main".into(), row: 0, zone: Some("LOW") };
        let first = id.key().unwrap();
        for _ in 0..10 {
            assert_eq!(id.key().unwrap(), first);
        }
    }

    #[test]
    fn test_empty_string_is_malformed() {
        let id = SeatId { hall: String::new(), row: 1, zone: Some("VIP") };
        assert_eq!(id.key(), Err(KeyError::EmptyAttribute { attribute: "hall" }));
    }

    #[test]
    fn test_null_value_is_malformed() {
        let id = SeatId { hall: "main".into(), row: 1, zone: None };
        assert_eq!(id.key(), Err(KeyError::EmptyAttribute { attribute: "zone" }));
    }

    #[test]
    fn test_separator_inside_value_is_rejected() {
        let id = SeatId { hall: "a#b".into(), row: 1, zone: Some("VIP") };
        assert_eq!(id.key(), Err(KeyError::ReservedSeparator { attribute: "hall" }));
    }

    #[test]
    fn test_non_finite_float_is_rejected() {
        let attributes = [KeyAttribute::new("ratio", f64::NAN)];
        assert_eq!(
            canonical_key(&attributes),
            Err(KeyError::NonFiniteNumber { attribute: "ratio" })
        );
    }

    #[test]
    fn test_float_and_enum_values() {
        let attributes = [
            KeyAttribute::new("ratio", 1.5),
            KeyAttribute::new("kind", KeyValue::Enum("USA")),
        ];
        assert_eq!(canonical_key(&attributes).unwrap(), "1.5#USA");
    }

    #[test]
    fn test_no_attributes_is_malformed() {
        assert_eq!(canonical_key(&[]), Err(KeyError::NoAttributes));
    }
}
