use serde::{Deserialize, Serialize};

/// Exactly one or many items — never empty. Used where an operation always
/// yields at least one result (e.g. a partially filled order yields at least
/// one fill event) but may yield more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_or_many_is_never_empty() {
        assert_eq!(OneOrMany::One(1).len(), 1);
        assert_eq!(OneOrMany::Many(vec![1, 2, 3]).len(), 3);
        assert!(!OneOrMany::<i32>::Many(vec![]).is_empty());
    }

    #[test]
    fn into_vec_flattens_both_variants() {
        assert_eq!(OneOrMany::One(1).into_vec(), vec![1]);
        assert_eq!(OneOrMany::Many(vec![1, 2]).into_vec(), vec![1, 2]);
    }
}
