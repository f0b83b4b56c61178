// Selection of the cheapest and shortest offers. Pure, order-stable and
// associative, so concurrent fetch completion order cannot change the result.

use std::cmp::Ordering;

use crate::model::NormalizedOffer;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub cheapest: Option<NormalizedOffer>,
    pub shortest: Option<NormalizedOffer>,
}

// Price first, ties broken by shorter duration, then earlier departure.
fn by_price(a: &NormalizedOffer, b: &NormalizedOffer) -> Ordering {
    a.price
        .amount
        .total_cmp(&b.price.amount)
        .then_with(|| a.duration_minutes.cmp(&b.duration_minutes))
        .then_with(|| a.departure_date.cmp(&b.departure_date))
}

// Duration first, ties broken by lower price, then earlier departure.
fn by_duration(a: &NormalizedOffer, b: &NormalizedOffer) -> Ordering {
    a.duration_minutes
        .cmp(&b.duration_minutes)
        .then_with(|| a.price.amount.total_cmp(&b.price.amount))
        .then_with(|| a.departure_date.cmp(&b.departure_date))
}

// Replace only on strictly-less, keeping the first-encountered offer on full
// ties. This is what makes the fold stable and `merge` associative.
fn min_stable(
    current: Option<NormalizedOffer>,
    candidate: &NormalizedOffer,
    cmp: fn(&NormalizedOffer, &NormalizedOffer) -> Ordering,
) -> Option<NormalizedOffer> {
    match current {
        Some(best) if cmp(candidate, &best) == Ordering::Less => Some(candidate.clone()),
        Some(best) => Some(best),
        None => Some(candidate.clone()),
    }
}

// Reduces a collection of offers to its cheapest and shortest members.
// An empty input yields an empty selection, not an error.
pub fn reduce(offers: &[NormalizedOffer]) -> Selection {
    let mut selection = Selection::default();
    for offer in offers {
        selection.cheapest = min_stable(selection.cheapest.take(), offer, by_price);
        selection.shortest = min_stable(selection.shortest.take(), offer, by_duration);
    }
    selection
}

// Merges selections computed over disjoint slices, preferring `first` on
// ties. `merge(reduce(a), reduce(b)) == reduce(a ++ b)` for slices in order.
pub fn merge(first: Selection, second: Selection) -> Selection {
    let mut merged = first;
    if let Some(candidate) = &second.cheapest {
        merged.cheapest = min_stable(merged.cheapest.take(), candidate, by_price);
    }
    if let Some(candidate) = &second.shortest {
        merged.shortest = min_stable(merged.shortest.take(), candidate, by_duration);
    }
    merged
}
