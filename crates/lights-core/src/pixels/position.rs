//! Pixel addressing.

use crate::{LightsError, Result};
use serde::{Deserialize, Serialize};

/// Which pixels a `set` applies to.
///
/// On the wire this is an externally tagged object:
/// `{"single": 3}`, `{"range": {"start": 5, "end": 2}}` or `{"list": [3, 3, 1]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Single(usize),
    /// Inclusive on both ends; descends when `start > end`.
    Range { start: usize, end: usize },
    /// Applied in order, duplicates included.
    List(Vec<usize>),
}

impl Position {
    /// Indices in application order.
    pub fn indices(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match self {
            Position::Single(index) => Box::new(std::iter::once(*index)),
            Position::Range { start, end } if start <= end => Box::new(*start..=*end),
            Position::Range { start, end } => Box::new((*end..=*start).rev()),
            Position::List(indices) => Box::new(indices.iter().copied()),
        }
    }

    /// Reject positions that address pixels past the end of a strip of `len`.
    pub fn check_bounds(&self, len: usize) -> Result<()> {
        let largest = match self {
            Position::Single(index) => Some(*index),
            Position::Range { start, end } => Some(*start.max(end)),
            Position::List(indices) => indices.iter().copied().max(),
        };
        match largest {
            Some(index) if index >= len => Err(LightsError::IndexOutOfRange { index, len }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single() {
        let indices: Vec<_> = Position::Single(4).indices().collect();
        assert_eq!(indices, vec![4]);
    }

    #[test]
    fn test_range_ascending_inclusive() {
        let indices: Vec<_> = Position::Range { start: 2, end: 5 }.indices().collect();
        assert_eq!(indices, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_range_descending_inclusive() {
        let indices: Vec<_> = Position::Range { start: 5, end: 2 }.indices().collect();
        assert_eq!(indices, vec![5, 4, 3, 2]);
    }

    #[test]
    fn test_range_single_element() {
        let indices: Vec<_> = Position::Range { start: 3, end: 3 }.indices().collect();
        assert_eq!(indices, vec![3]);
    }

    #[test]
    fn test_list_keeps_order_and_duplicates() {
        let indices: Vec<_> = Position::List(vec![3, 3, 1]).indices().collect();
        assert_eq!(indices, vec![3, 3, 1]);
    }

    #[test]
    fn test_check_bounds() {
        assert!(Position::Single(9).check_bounds(10).is_ok());
        assert!(Position::List(vec![]).check_bounds(0).is_ok());

        let err = Position::Range { start: 12, end: 0 }.check_bounds(10).unwrap_err();
        assert!(matches!(
            err,
            LightsError::IndexOutOfRange { index: 12, len: 10 }
        ));
    }

    #[test]
    fn test_wire_format() {
        let single: Position = serde_json::from_str(r#"{"single": 7}"#).unwrap();
        assert_eq!(single, Position::Single(7));

        let range: Position = serde_json::from_str(r#"{"range": {"start": 5, "end": 2}}"#).unwrap();
        assert_eq!(range, Position::Range { start: 5, end: 2 });

        let list: Position = serde_json::from_str(r#"{"list": [3, 3, 1]}"#).unwrap();
        assert_eq!(list, Position::List(vec![3, 3, 1]));

        assert!(serde_json::from_str::<Position>(r#"{"single": -1}"#).is_err());
    }
}
