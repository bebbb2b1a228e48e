//! `ComponentSet`: the variadic "parameter pack of component types" a
//! `System` is generic over, realised as macro-generated impls over
//! tuples rather than genuine variadics (REDESIGN FLAGS: "template-heavy
//! container library and variadic system component packs").

use cadence_ecs::{DenseTable, Entity};

/// A tuple of component value types, each backed by its own
/// [`DenseTable`]. Implemented for tuples of arity 1 through 8 by the
/// `impl_component_set!` macro below; add another arm if a system ever
/// needs more component types than that.
pub trait ComponentSet: Sized {
    type Tables: Default;

    fn add_all(tables: &mut Self::Tables, e: Entity, values: Self);
    fn try_add_all(tables: &mut Self::Tables, e: Entity, values: Self);
    fn remove_all(tables: &mut Self::Tables, e: Entity);
    fn contains_all(tables: &Self::Tables, e: Entity) -> bool;
}

macro_rules! impl_component_set {
    ($($T:ident : $idx:tt),+) => {
        impl<$($T),+> ComponentSet for ($($T,)+) {
            type Tables = ($(DenseTable<$T>,)+);

            fn add_all(tables: &mut Self::Tables, e: Entity, values: Self) {
                $( tables.$idx.add(e, values.$idx); )+
            }

            fn try_add_all(tables: &mut Self::Tables, e: Entity, values: Self) {
                $( tables.$idx.try_add(e, values.$idx); )+
            }

            fn remove_all(tables: &mut Self::Tables, e: Entity) {
                $( tables.$idx.try_remove(e); )+
            }

            fn contains_all(tables: &Self::Tables, e: Entity) -> bool {
                true $( && tables.$idx.contains(e) )+
            }
        }
    };
}

impl_component_set!(A: 0);
impl_component_set!(A: 0, B: 1);
impl_component_set!(A: 0, B: 1, C: 2);
impl_component_set!(A: 0, B: 1, C: 2, D: 3);
impl_component_set!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_component_set!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_component_set!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_component_set!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_set_adds_and_removes_both_tables() {
        let mut tables: <(u32, &'static str) as ComponentSet>::Tables = Default::default();
        let e = Entity(0);
        <(u32, &'static str)>::add_all(&mut tables, e, (7, "seven"));
        assert!(<(u32, &'static str)>::contains_all(&tables, e));
        assert_eq!(tables.0.get(e), Some(&7));
        assert_eq!(tables.1.get(e), Some(&"seven"));
        <(u32, &'static str)>::remove_all(&mut tables, e);
        assert!(!<(u32, &'static str)>::contains_all(&tables, e));
    }
}
