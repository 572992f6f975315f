//! Equality used to decide whether a write is a change.

use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;

/// How a cell or computed compares its old and new value.
///
/// An unchanged value sends no notification and wakes no reaction.
pub enum Comparer<T> {
    /// `PartialEq`.
    Default,
    /// The structural comparer configured for `T` on the runtime, falling
    /// back to `PartialEq` when none is installed.
    Structural,
    /// A per-cell function. Returns `true` when the values are equal.
    Custom(Rc<dyn Fn(&T, &T) -> bool>),
}

impl<T> Comparer<T> {
    pub fn custom(equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Comparer::Custom(Rc::new(equals))
    }
}

impl<T: PartialEq + 'static> Comparer<T> {
    pub(crate) fn equals(&self, runtime: &Runtime, a: &T, b: &T) -> bool {
        match self {
            Comparer::Default => a == b,
            Comparer::Structural => {
                let structural = runtime.config().structural_comparer::<T>();
                match structural {
                    Some(equals) => equals(a, b),
                    None => a == b,
                }
            }
            Comparer::Custom(equals) => equals(a, b),
        }
    }
}

impl<T> Default for Comparer<T> {
    fn default() -> Self {
        Comparer::Default
    }
}

impl<T> Clone for Comparer<T> {
    fn clone(&self) -> Self {
        match self {
            Comparer::Default => Comparer::Default,
            Comparer::Structural => Comparer::Structural,
            Comparer::Custom(equals) => Comparer::Custom(Rc::clone(equals)),
        }
    }
}

impl<T> fmt::Debug for Comparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparer::Default => f.write_str("Default"),
            Comparer::Structural => f.write_str("Structural"),
            Comparer::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOptions;

    #[test]
    fn default_uses_partial_eq() {
        let runtime = Runtime::new();
        assert!(Comparer::Default.equals(&runtime, &1, &1));
        assert!(!Comparer::Default.equals(&runtime, &1, &2));
    }

    #[test]
    fn structural_uses_the_configured_comparer() {
        let runtime = Runtime::new();
        let a = vec![1, 2];
        let b = vec![2, 1];
        assert!(!Comparer::Structural.equals(&runtime, &a, &b));

        runtime.configure(ConfigOptions::new().with_structural_comparer(|a: &Vec<i32>, b: &Vec<i32>| {
            let mut a = a.clone();
            let mut b = b.clone();
            a.sort_unstable();
            b.sort_unstable();
            a == b
        }));
        assert!(Comparer::Structural.equals(&runtime, &a, &b));
    }

    #[test]
    fn custom_wins() {
        let runtime = Runtime::new();
        let within_ten = Comparer::custom(|a: &i32, b: &i32| (a - b).abs() < 10);
        assert!(within_ten.equals(&runtime, &1, &5));
        assert!(!within_ten.equals(&runtime, &1, &50));
    }
}
