use crate::domains::*;
use itertools::Itertools;
use std::collections::HashSet;

/// Checks the lattice laws on a finite set of elements:
/// idempotence, commutativity, associativity, absorption, the
/// identity elements, and the consistency of the operations with the
/// partial order.
fn finite_domain_properties<T: Lattice>(all: &[T], ctx: &T::LatticeContext) {
    assert!(T::top(ctx) > T::bottom(ctx));
    for x in all {
        assert!(*x <= T::top(ctx));
        assert!(*x >= T::bottom(ctx));

        assert!(*x == *x);
        assert!(*x <= *x);
        assert!(*x >= *x);
        assert!(!(*x < *x));
        assert!(!(*x > *x));

        assert_eq!(x.join(x, ctx), *x);
        assert_eq!(x.meet(x, ctx), *x);

        assert_eq!(x.join(&T::bottom(ctx), ctx), *x);
        assert_eq!(x.meet(&T::top(ctx), ctx), *x);
    }

    for (x, y) in all.iter().cartesian_product(all) {
        assert!(x.join(y, ctx) >= *x);
        assert!(x.join(y, ctx) >= *y);
        assert!(x.meet(y, ctx) <= *x);
        assert!(x.meet(y, ctx) <= *y);

        assert!(x.meet(y, ctx) <= x.join(y, ctx));

        assert_eq!(x.join(y, ctx), y.join(x, ctx));
        assert_eq!(x.meet(y, ctx), y.meet(x, ctx));

        assert_eq!(x.join(&x.meet(y, ctx), ctx), *x);
        assert_eq!(x.meet(&x.join(y, ctx), ctx), *x);

        assert_eq!(*x <= *y, x.join(y, ctx) == *y);
        assert_eq!(*x <= *y, x.meet(y, ctx) == *x);
    }

    for ((x, y), z) in all.iter().cartesian_product(all).cartesian_product(all) {
        assert_eq!(x.join(y, ctx).join(z, ctx), x.join(&y.join(z, ctx), ctx));
        assert_eq!(x.meet(y, ctx).meet(z, ctx), x.meet(&y.meet(z, ctx), ctx));
    }
}

#[test]
fn constant_domain_tests() {
    let of = Constant::<i64>::from;
    let top = Constant::<i64>::top(&());
    let bottom = Constant::<i64>::bottom(&());

    // Join, meet
    assert_eq!(top.join(&bottom, &()), top);
    assert_eq!(top.meet(&bottom, &()), bottom);
    assert_eq!(of(5).join(&of(5), &()), of(5));
    assert_eq!(of(5).join(&of(6), &()), top);
    assert_eq!(of(5).meet(&of(5), &()), of(5));
    assert_eq!(of(5).meet(&of(6), &()), bottom);

    // Observers
    assert!(top.is_top() && !top.is_bottom() && !top.is_value());
    assert!(bottom.is_bottom());
    assert!(of(5).is_value());
    assert_eq!(of(5).get_constant(), Some(&5));
    assert_eq!(top.get_constant(), None);
    assert_eq!(bottom.get_constant(), None);

    // A fresh element is unconstrained.
    assert_eq!(Constant::<i64>::default(), top);

    // Properties
    let all = [bottom.clone(), top.clone(), of(5), of(6), of(-7)];
    finite_domain_properties(&all, &());

    // The height of the lattice is three, widening and narrowing
    // degenerate to join and meet.
    for (x, y) in all.iter().cartesian_product(&all) {
        assert_eq!(x.widen(y, &(), 1), x.join(y, &()));
        assert_eq!(x.narrow(y, &(), 1), x.meet(y, &()));
    }

    // Pretty printing
    assert_eq!(format!("{top}"), "T");
    assert_eq!(format!("{bottom}"), "_|_");
    assert_eq!(format!("{}", of(5)), "5");

    // The carrier only needs value equality.
    let name = |s: &str| Constant::Value(s.to_owned());
    let words = [
        Constant::Bottom,
        Constant::Top,
        name("self"),
        name("other"),
    ];
    finite_domain_properties(&words, &());
    assert_eq!(name("self").join(&name("other"), &()), Constant::Top);
}

#[test]
fn bitset_domain_tests() {
    let ctx = BitSetTop(3);
    let from = |elements: &[usize]| BitSetDomain::from(&ctx, elements);

    assert_eq!(BitSetDomain::bottom(&ctx), from(&[]));
    assert_eq!(BitSetDomain::top(&ctx), from(&[0, 1, 2]));
    assert_eq!(from(&[0]).join(&from(&[2]), &ctx), from(&[0, 2]));
    assert_eq!(from(&[0, 1]).meet(&from(&[1, 2]), &ctx), from(&[1]));

    assert!(from(&[0]) < from(&[0, 1]));
    assert!(from(&[0]).partial_cmp(&from(&[1])).is_none());

    // The whole powerset of a small universe.
    let all: Vec<_> = (0..3)
        .powerset()
        .map(|elements| BitSetDomain::from(&ctx, &elements))
        .collect();
    assert_eq!(all.len(), 8);
    finite_domain_properties(&all, &ctx);

    // Pretty printing
    assert_eq!(format!("{:?}", from(&[0, 2])), "{0, 2}");
    assert_eq!(format!("{:?}", from(&[])), "{}");
}

#[test]
fn flipped_domain_tests() {
    let of = |c: i64| Flipped(Constant::Value(c));

    // Top and bottom change places, join and meet change roles.
    assert_eq!(Flipped::<Constant<i64>>::top(&()), Flipped(Constant::Bottom));
    assert_eq!(
        Flipped::<Constant<i64>>::bottom(&()),
        Flipped(Constant::Top)
    );
    assert_eq!(of(5).join(&of(6), &()), Flipped(Constant::Bottom));
    assert_eq!(of(5).meet(&of(6), &()), Flipped(Constant::Top));
    assert!(Flipped(Constant::<i64>::Bottom) > Flipped(Constant::<i64>::Top));

    let all = [
        Flipped(Constant::Bottom),
        Flipped(Constant::Top),
        of(5),
        of(6),
    ];
    finite_domain_properties(&all, &());
}

#[test]
fn map_domain_tests() {
    let of = Constant::<i64>::from;
    let ctx: MapCtx<&'static str, Constant<i64>> = MapCtx(HashSet::from(["a", "b"]), ());

    let mut a1 = Map::default();
    a1.insert("a", of(1));
    let mut a1b2 = Map::default();
    a1b2.insert("a", of(1));
    a1b2.insert("b", of(2));
    let mut a2 = Map::default();
    a2.insert("a", of(2));

    // Pointwise operations; missing keys behave like bottom in join
    // and disappear in meet.
    assert_eq!(a1.join(&a1b2, &ctx), a1b2);
    assert_eq!(a1.meet(&a1b2, &ctx), a1);
    assert_eq!(a1.join(&a2, &ctx).get("a"), Some(&Constant::Top));
    assert_eq!(a1.meet(&a2, &ctx).get("a"), Some(&Constant::Bottom));

    // Pointwise ordering.
    assert!(a1 < a1b2);
    assert!(Map::bottom(&ctx) < a1);
    assert!(a1.partial_cmp(&a2).is_none());
    assert!(a1b2 < Map::top(&ctx));
    assert_eq!(Map::top(&ctx).get("b"), Some(&Constant::Top));

    // Observers used by the transfer functions.
    assert_eq!(a1.get_or_bottom(&"b", &ctx), Constant::Bottom);
    assert_eq!(a1.get_or_top(&"b", &ctx), Constant::Top);
    assert_eq!(a1.get_or_bottom(&"a", &ctx), of(1));

    // Pretty printing is order independent.
    assert_eq!(
        format!("{a1b2:?}"),
        "Map((\"a\", Value(1)), (\"b\", Value(2)))"
    );
}

#[test]
fn prod_domain_tests() {
    let ctx = ((), BitSetTop(2));
    let constants = [
        Constant::Bottom,
        Constant::Top,
        Constant::Value(1_i64),
        Constant::Value(2_i64),
    ];
    let sets: Vec<_> = (0..2)
        .powerset()
        .map(|elements| BitSetDomain::from(&ctx.1, &elements))
        .collect();

    let all: Vec<_> = constants
        .iter()
        .cartesian_product(&sets)
        .map(|(c, s)| Prod2(c.clone(), s.clone()))
        .collect();
    finite_domain_properties(&all, &ctx);

    // The ordering is pointwise; mixed directions are incomparable.
    let lower = Prod2(Constant::<i64>::Bottom, BitSetDomain::from(&ctx.1, &[0]));
    let higher = Prod2(Constant::<i64>::Top, BitSetDomain::from(&ctx.1, &[0, 1]));
    let mixed = Prod2(Constant::<i64>::Top, BitSetDomain::from(&ctx.1, &[]));
    assert!(lower < higher);
    assert!(lower.partial_cmp(&mixed).is_none());
}
