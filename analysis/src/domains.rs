use core::fmt::{Debug, Display};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::ops::{Deref, DerefMut};

use fixedbitset::FixedBitSet;
use itertools::Itertools;
use paste::paste;

///////////////////////////
/// Traits for domains. ///
///////////////////////////

/// The partial order of the lattice is the `PartialOrd` of the type,
/// equality of lattice elements is `Eq`. Some lattices need auxiliary
/// information beyond the element itself (e.g., the size of the
/// universe for a bitset); such information lives in the
/// `LatticeContext` and is passed to every operation.
pub trait JoinSemiLattice: Eq + PartialOrd + Clone + Debug {
    type LatticeContext;

    /// Required to be the smallest element according to the ordering.
    fn bottom(ctx: &Self::LatticeContext) -> Self;

    /// Requirements:
    /// * a.join(a) == a
    /// * a.join(b) == b.join(a)
    /// * a.join(b) >= a
    /// * a.join(b) >= b
    /// * bottom.join(b) == b
    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Self;

    /// Accelerates increasing chains to guarantee termination of the
    /// fixpoint iteration. The default is exact for finite-height
    /// lattices; tall lattices override it to jump further up.
    ///
    /// Requirements:
    /// * bottom.widen(a, _) == a
    /// * a.widen(a, _) == a
    /// * a.widen(b, _) >= a.join(b)
    fn widen(&self, previous: &Self, ctx: &Self::LatticeContext, _iteration: usize) -> Self {
        self.join(previous, ctx)
    }
}

pub trait Lattice: JoinSemiLattice {
    /// Required to be the greatest element according to the ordering.
    fn top(ctx: &Self::LatticeContext) -> Self;

    /// Requirements:
    /// * a.meet(a) == a
    /// * a.meet(b) == b.meet(a)
    /// * a.meet(b) <= a
    /// * a.meet(b) <= b
    /// * top.meet(b) == b
    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Self;

    /// Dual of [`JoinSemiLattice::widen`], recovers precision on
    /// decreasing chains. The default is exact for finite-height
    /// lattices.
    fn narrow(&self, previous: &Self, ctx: &Self::LatticeContext, _iteration: usize) -> Self {
        self.meet(previous, ctx)
    }
}

///////////////////////////////////////
/// Concrete domain implementations ///
///////////////////////////////////////

/// The lattice of the constants of a certain type, also called the
/// flat or three-level lattice. All values are pairwise incomparable:
/// joining two different values gives top, meeting them gives bottom.
/// This is the domain underlying constant propagation.
///
/// ```txt
///       Top
///     /  |  \
/// ... c1 c2 c3 ...
///     \  |  /
///      Bottom
/// ```
///
/// The carrier type only needs value equality.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub enum Constant<C: Eq + Clone + Debug> {
    Top,
    Value(C),
    Bottom,
}

impl<C: Eq + Clone + Debug> Default for Constant<C> {
    /// A freshly created element is unconstrained.
    fn default() -> Self {
        Constant::Top
    }
}

impl<C: Eq + Clone + Debug> From<C> for Constant<C> {
    fn from(constant: C) -> Self {
        Constant::Value(constant)
    }
}

impl<C: Eq + Clone + Debug> Constant<C> {
    pub fn is_top(&self) -> bool {
        matches!(self, Constant::Top)
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Constant::Bottom)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Constant::Value(_))
    }

    /// The contained constant, present if and only if the element
    /// is a single value.
    pub fn get_constant(&self) -> Option<&C> {
        match self {
            Constant::Value(c) => Some(c),
            _ => None,
        }
    }
}

impl<C: Eq + Clone + Debug> PartialOrd for Constant<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        if *self == Constant::Top || *other == Constant::Bottom {
            return Some(Ordering::Greater);
        }
        if *self == Constant::Bottom || *other == Constant::Top {
            return Some(Ordering::Less);
        }
        None
    }
}

impl<C: Eq + Clone + Debug> JoinSemiLattice for Constant<C> {
    type LatticeContext = ();

    fn bottom(_ctx: &Self::LatticeContext) -> Self {
        Constant::Bottom
    }

    fn join(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        match (self, other) {
            (_, &Constant::Bottom) => self.clone(),
            (&Constant::Bottom, _) => other.clone(),
            (_, _) if self == other => other.clone(),
            _ => Constant::Top,
        }
    }
}

impl<C: Eq + Clone + Debug> Lattice for Constant<C> {
    fn top(_ctx: &Self::LatticeContext) -> Self {
        Constant::Top
    }

    fn meet(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        match (self, other) {
            (_, &Constant::Top) => self.clone(),
            (&Constant::Top, _) => other.clone(),
            (_, _) if self == other => other.clone(),
            _ => Constant::Bottom,
        }
    }
}

impl<C: Eq + Clone + Debug + Display> Display for Constant<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Constant::Bottom => write!(f, "_|_"),
            Constant::Top => write!(f, "T"),
            Constant::Value(c) => write!(f, "{c}"),
        }
    }
}

/// The powerset lattice over the universe `{0, .., n-1}`, encoded as
/// bitsets. The universe size comes from the context.
#[derive(PartialEq, Eq, Clone, Hash)]
pub struct BitSetDomain(pub FixedBitSet);

pub struct BitSetTop(pub usize);

impl BitSetDomain {
    pub fn from(ctx: &BitSetTop, elements: &[usize]) -> Self {
        let mut result = FixedBitSet::with_capacity(ctx.0);
        for &element in elements {
            result.insert(element);
        }
        BitSetDomain(result)
    }
}

impl Debug for BitSetDomain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.0.ones().map(|element| element.to_string()).join(", ")
        )
    }
}

impl PartialOrd for BitSetDomain {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        if self.0.is_superset(&other.0) {
            return Some(Ordering::Greater);
        }
        if self.0.is_subset(&other.0) {
            return Some(Ordering::Less);
        }
        None
    }
}

impl JoinSemiLattice for BitSetDomain {
    type LatticeContext = BitSetTop;

    fn bottom(ctx: &Self::LatticeContext) -> Self {
        BitSetDomain(FixedBitSet::with_capacity(ctx.0))
    }

    fn join(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        let mut result = self.0.clone();
        result.union_with(&other.0);
        BitSetDomain(result)
    }
}

impl Lattice for BitSetDomain {
    fn top(ctx: &Self::LatticeContext) -> Self {
        let mut result = FixedBitSet::with_capacity(ctx.0);
        result.toggle_range(..);
        BitSetDomain(result)
    }

    fn meet(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        let mut result = self.0.clone();
        result.intersect_with(&other.0);
        BitSetDomain(result)
    }
}

/// Flip a lattice by swapping the join and meet operations, and the
/// top and bottom elements. Useful to run must-analyses through a
/// join-based solver.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct Flipped<T: Lattice>(pub T);

impl<T: Lattice> Deref for Flipped<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Lattice> DerefMut for Flipped<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: Lattice> PartialOrd for Flipped<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0).map(Ordering::reverse)
    }
}

impl<T: Lattice> JoinSemiLattice for Flipped<T> {
    type LatticeContext = T::LatticeContext;

    fn bottom(ctx: &Self::LatticeContext) -> Self {
        Self(T::top(ctx))
    }

    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Self {
        Self(self.0.meet(&other.0, ctx))
    }

    fn widen(&self, previous: &Self, ctx: &Self::LatticeContext, iteration: usize) -> Self {
        Self(self.0.narrow(&previous.0, ctx, iteration))
    }
}

impl<T: Lattice> Lattice for Flipped<T> {
    fn top(ctx: &Self::LatticeContext) -> Self {
        Self(T::bottom(ctx))
    }

    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Self {
        Self(self.0.join(&other.0, ctx))
    }

    fn narrow(&self, previous: &Self, ctx: &Self::LatticeContext, iteration: usize) -> Self {
        Self(self.0.widen(&previous.0, ctx, iteration))
    }
}

/// The map lattice is often used to track information about multiple
/// entities of the program like the analysis variables. The keys are
/// the unique names of the entities, the values the tracked lattice
/// elements (e.g., [`Constant`]).
///
/// Warning: a map without the key K compares less than a map with
/// K => Bottom. If this is undesired, populate all keys.
#[derive(PartialEq, Eq, Clone)]
pub struct Map<K: Eq + Clone + Hash + Debug, V: JoinSemiLattice>(pub HashMap<K, V>);

/// Contains all the keys for the top value; can be left empty for
/// join semi-lattices.
pub struct MapCtx<K: Eq + Clone + Hash + Debug, V: JoinSemiLattice>(
    pub HashSet<K>,
    pub V::LatticeContext,
);

impl<K: Eq + Clone + Hash + Debug, V: JoinSemiLattice> Default for Map<K, V> {
    fn default() -> Self {
        Map(HashMap::default())
    }
}

impl<K: Eq + Clone + Hash + Debug, V: JoinSemiLattice> Map<K, V> {
    pub fn get_or_bottom(&self, k: &K, ctx: &MapCtx<K, V>) -> V {
        self.get(k).unwrap_or(&V::bottom(&ctx.1)).clone()
    }
}

impl<K: Eq + Clone + Hash + Debug, V: Lattice> Map<K, V> {
    pub fn get_or_top(&self, k: &K, ctx: &MapCtx<K, V>) -> V {
        self.get(k).unwrap_or(&V::top(&ctx.1)).clone()
    }
}

impl<K: Eq + Clone + Hash + Debug, V: JoinSemiLattice> Deref for Map<K, V> {
    type Target = HashMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<K: Eq + Clone + Hash + Debug, V: JoinSemiLattice> DerefMut for Map<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K: Eq + Clone + Hash + Debug, V: JoinSemiLattice> Debug for Map<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut elements: Vec<String> = self.iter().map(|x| format!("{x:?}")).collect();
        elements.sort_unstable();
        write!(f, "Map({})", elements.join(", "))
    }
}

impl<K: Eq + Clone + Hash + Debug, V: JoinSemiLattice> PartialOrd for Map<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        let mut candidate = None;
        for (k, v) in &self.0 {
            if let Some(other_v) = other.get(k) {
                match (candidate, v.partial_cmp(other_v)) {
                    // Not comparable at a point, the maps are also not
                    // comparable.
                    (_, None) => return None,
                    // Equal elements do not influence the result.
                    (_, Some(Ordering::Equal)) => continue,
                    // This element agrees with the ordering of the others.
                    (Some(o1), Some(o2)) if o1 == o2 => continue,
                    // Contradiction found, the maps are not comparable.
                    (Some(_), Some(_)) => return None,
                    // First non-equal element, set the candidate ordering.
                    (None, cmp_result) => candidate = cmp_result,
                };
            } else if candidate.is_none() {
                // A key missing from the other map compares smaller
                // than bottom.
                candidate = Some(Ordering::Greater);
            } else if candidate != Some(Ordering::Greater) {
                return None;
            }
        }
        for k in other.keys() {
            if self.contains_key(k) {
                continue;
            }
            if candidate.is_none() || candidate == Some(Ordering::Less) {
                return Some(Ordering::Less);
            }
            return None;
        }
        candidate
    }
}

impl<K: Eq + Clone + Hash + Debug, V: JoinSemiLattice> JoinSemiLattice for Map<K, V> {
    type LatticeContext = MapCtx<K, V>;

    fn bottom(_ctx: &Self::LatticeContext) -> Self {
        Self(HashMap::new())
    }

    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Self {
        let mut result = HashMap::new();
        for (k, v) in &self.0 {
            if let Some(other_v) = other.get(k) {
                result.insert(k.clone(), v.join(other_v, &ctx.1));
            } else {
                result.insert(k.clone(), v.clone());
            }
        }
        for (k, v) in &other.0 {
            if self.contains_key(k) {
                continue;
            }
            result.insert(k.clone(), v.clone());
        }
        Self(result)
    }

    fn widen(&self, previous: &Self, ctx: &Self::LatticeContext, iteration: usize) -> Self {
        if *previous == Self::bottom(ctx) {
            return self.clone();
        }
        let mut result = HashMap::new();
        for (k, v) in &self.0 {
            if let Some(prev_v) = previous.get(k) {
                result.insert(k.clone(), v.widen(prev_v, &ctx.1, iteration));
            }
            // Keys added since the previous iteration are left out to
            // avoid unbounded growth.
        }
        Self(result)
    }
}

impl<K: Eq + Clone + Hash + Debug, V: Lattice> Lattice for Map<K, V> {
    fn top(ctx: &Self::LatticeContext) -> Self {
        let mut result = HashMap::new();
        for k in &ctx.0 {
            result.insert(k.clone(), V::top(&ctx.1));
        }
        Self(result)
    }

    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Self {
        let mut result = HashMap::new();
        for (k, v) in &self.0 {
            if let Some(other_v) = other.get(k) {
                result.insert(k.clone(), v.meet(other_v, &ctx.1));
            }
        }
        Self(result)
    }

    fn narrow(&self, previous: &Self, ctx: &Self::LatticeContext, iteration: usize) -> Self {
        let mut result = HashMap::new();
        for (k, v) in &self.0 {
            if let Some(prev_v) = previous.get(k) {
                result.insert(k.clone(), v.narrow(prev_v, &ctx.1, iteration));
            }
        }
        Self(result)
    }
}

///////////////////////////////////////
// Product lattices up to 5 elements //
///////////////////////////////////////

macro_rules! tuple_lattice {
    ( $prod:ident $( $name:ident )+ ) => {
        paste! {
            /// Product lattice with point-wise ordering.
            #[derive(Clone, PartialEq, Eq, Debug, Hash)]
            pub struct $prod<$($name: JoinSemiLattice),+>($(pub $name,)+);

            impl<$($name: JoinSemiLattice),+> PartialOrd for $prod<$($name),+> {
                fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                    if self == other {
                        return Some(Ordering::Equal);
                    }
                    let $prod($([<$name:lower 1>],)+) = self;
                    let $prod($([<$name:lower 2>],)+) = other;
                    if $([<$name:lower 1>] <= [<$name:lower 2>] && )* true {
                        return Some(Ordering::Less);
                    }
                    if $([<$name:lower 1>] >= [<$name:lower 2>] && )* true {
                        return Some(Ordering::Greater);
                    }
                    None
                }
            }

            impl<$($name: JoinSemiLattice),+> JoinSemiLattice for $prod<$($name,)+>
            {
                type LatticeContext = ($($name::LatticeContext,)+);

                fn bottom(ctx: &Self::LatticeContext) -> Self {
                    let ($([<$name:lower 1>],)+) = ctx;
                    $prod($($name::bottom([<$name:lower 1>]),)+)
                }

                fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Self {
                    let $prod($([<$name:lower 1>],)+) = self;
                    let $prod($([<$name:lower 2>],)+) = other;
                    let ($([<$name:lower 3>],)+) = ctx;
                    $prod($([<$name:lower 1>].join([<$name:lower 2>], [<$name:lower 3>]),)*)
                }

                fn widen(&self, previous: &Self, ctx: &Self::LatticeContext, iteration: usize) -> Self {
                    let $prod($([<$name:lower 1>],)+) = self;
                    let $prod($([<$name:lower 2>],)+) = previous;
                    let ($([<$name:lower 3>],)+) = ctx;
                    $prod(
                    $([<$name:lower 1>].widen([<$name:lower 2>], [<$name:lower 3>], iteration),)*
                    )
                }
            }

            impl<$($name: Lattice),+> Lattice for $prod<$($name,)+>
            {
                fn top(ctx: &Self::LatticeContext) -> Self {
                    let ($([<$name:lower 1>],)+) = ctx;
                    $prod($($name::top([<$name:lower 1>]),)+)
                }

                fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Self {
                    let $prod($([<$name:lower 1>],)+) = self;
                    let $prod($([<$name:lower 2>],)+) = other;
                    let ($([<$name:lower 3>],)+) = ctx;
                    $prod($([<$name:lower 1>].meet([<$name:lower 2>], [<$name:lower 3>]),)*)
                }

                fn narrow(&self, previous: &Self, ctx: &Self::LatticeContext, iteration: usize) -> Self {
                    let $prod($([<$name:lower 1>],)+) = self;
                    let $prod($([<$name:lower 2>],)+) = previous;
                    let ($([<$name:lower 3>],)+) = ctx;
                    $prod(
                    $([<$name:lower 1>].narrow([<$name:lower 2>], [<$name:lower 3>], iteration),)*
                    )
                }
            }
        }
    };
}

tuple_lattice!(Prod1 D1);
tuple_lattice!(Prod2 D1 D2);
tuple_lattice!(Prod3 D1 D2 D3);
tuple_lattice!(Prod4 D1 D2 D3 D4);
tuple_lattice!(Prod5 D1 D2 D3 D4 D5);

#[cfg(test)]
mod domains_tests;
