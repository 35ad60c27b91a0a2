//! Patch value types for precise partial-update semantics
//!
//! Task updates must distinguish "set the field", "clear the field" and
//! "leave the field alone". Collapsing the last two into one `Option`
//! loses the distinction that drives job reconciliation, so patches carry
//! an explicit three-case value per nullable field.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A three-state update for one nullable field
///
/// - `Set(T)`: set the field to the given value
/// - `Clear`: set the field to null / remove the value
/// - `Keep`: do not touch the field (field absent from the patch)
///
/// # Examples
///
/// ```rust
/// use taskline_core::models::Patch;
///
/// let due_update = Patch::Set("2026-09-01T08:00:00Z".to_string());
/// let clear_due = Patch::<String>::Clear;
/// let untouched = Patch::<String>::Keep;
/// assert!(untouched.is_keep());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Patch<T> {
    /// Set the field to the specified value
    Set(T),
    /// Clear the field (explicit null)
    Clear,
    /// Do not modify the field
    #[default]
    Keep,
}

impl<T> Patch<T> {
    pub fn set(value: T) -> Self {
        Patch::Set(value)
    }

    pub fn clear() -> Self {
        Patch::Clear
    }

    pub fn keep() -> Self {
        Patch::Keep
    }

    /// Whether applying this patch changes anything
    pub fn is_change(&self) -> bool {
        !matches!(self, Patch::Keep)
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Patch::Clear)
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// The value if this is a Set operation
    pub fn value(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            _ => None,
        }
    }

    /// Apply this patch to the current value of the field
    pub fn apply_to(self, existing: Option<T>) -> Option<T> {
        match self {
            Patch::Set(value) => Some(value),
            Patch::Clear => None,
            Patch::Keep => existing,
        }
    }

    /// Map the inner value if this is a Set operation
    pub fn map<U, F>(self, f: F) -> Patch<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Patch::Set(value) => Patch::Set(f(value)),
            Patch::Clear => Patch::Clear,
            Patch::Keep => Patch::Keep,
        }
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Patch::Set(value) => Patch::Set(value),
            Patch::Clear => Patch::Clear,
            Patch::Keep => Patch::Keep,
        }
    }
}

// Wire mapping: a present value deserializes to Set, an explicit JSON null
// to Clear. An absent field never reaches the deserializer, so struct
// fields rely on #[serde(default)] producing Keep.
impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let opt_value = Option::<T>::deserialize(deserializer)?;
        match opt_value {
            Some(value) => Ok(Patch::Set(value)),
            None => Ok(Patch::Clear),
        }
    }
}

impl<T> fmt::Display for Patch<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::Set(value) => write!(f, "Set({value})"),
            Patch::Clear => write!(f, "Clear"),
            Patch::Keep => write!(f, "Keep"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_set() {
        let patch = Patch::Set("value".to_string());
        assert!(patch.is_change());
        assert!(!patch.is_clear());
        assert_eq!(patch.value(), Some(&"value".to_string()));
    }

    #[test]
    fn test_patch_clear() {
        let patch = Patch::<String>::Clear;
        assert!(patch.is_change());
        assert!(patch.is_clear());
        assert_eq!(patch.value(), None);
    }

    #[test]
    fn test_patch_keep() {
        let patch = Patch::<String>::Keep;
        assert!(!patch.is_change());
        assert!(!patch.is_clear());
        assert_eq!(patch.value(), None);
    }

    #[test]
    fn test_apply_to() {
        let existing = Some("old".to_string());
        assert_eq!(
            Patch::Set("new".to_string()).apply_to(existing.clone()),
            Some("new".to_string())
        );
        assert_eq!(Patch::Clear.apply_to(existing.clone()), None);
        assert_eq!(Patch::Keep.apply_to(existing.clone()), existing);
    }

    #[test]
    fn test_default_is_keep() {
        assert_eq!(Patch::<i32>::default(), Patch::Keep);
    }

    #[test]
    fn test_deserialize_value_and_null() {
        #[derive(Deserialize, Default)]
        struct Body {
            #[serde(default)]
            due_to: Patch<String>,
        }

        let body: Body = serde_json::from_str(r#"{"due_to": "soon"}"#).unwrap();
        assert_eq!(body.due_to, Patch::Set("soon".to_string()));

        let body: Body = serde_json::from_str(r#"{"due_to": null}"#).unwrap();
        assert_eq!(body.due_to, Patch::Clear);

        let body: Body = serde_json::from_str("{}").unwrap();
        assert_eq!(body.due_to, Patch::Keep);
    }

    #[test]
    fn test_display() {
        assert_eq!(Patch::Set(5).to_string(), "Set(5)");
        assert_eq!(Patch::<i32>::Clear.to_string(), "Clear");
        assert_eq!(Patch::<i32>::Keep.to_string(), "Keep");
    }
}
