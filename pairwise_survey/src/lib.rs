pub mod builder;
mod config;
pub mod manual;
mod store;
mod survey;

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;

use std::collections::HashSet;

pub use crate::builder::{CatalogBuilder, OutletCatalog};
pub use crate::config::*;
pub use crate::store::ResponseStore;
pub use crate::survey::*;

/// How many times a repeated pair is redrawn before it is accepted anyway.
pub const MAX_REPEAT_ATTEMPTS: usize = 64;

// Pairs before they are attached to a section.
type RawPair<'a> = (&'a Outlet, &'a Outlet);

/// Builds the full sequence of comparisons for a survey.
///
/// Each section contributes `comparisons_per_section` pairs, in section order, as long as
/// the catalog has enough outlets for it. A section with fewer than two usable outlets
/// contributes nothing: it is logged and the other sections are still generated.
///
/// Arguments:
/// * `catalog` the outlets to draw from
/// * `config` the sections, the number of comparisons per section and the mainstream outlets
/// * `rng` the source of randomness. A seeded generator gives a reproducible sequence.
pub fn generate_pairs<R: Rng + ?Sized>(
    catalog: &OutletCatalog,
    config: &SurveyConfig,
    rng: &mut R,
) -> Vec<Pair> {
    let count = config.comparisons_per_section;
    info!(
        "generate_pairs: {} outlets, {} sections, {} comparisons per section",
        catalog.len(),
        config.sections.len(),
        count
    );
    let mainstream = config.mainstream_set();
    let mut all_pairs: Vec<Pair> = Vec::with_capacity(config.total_comparisons());
    for section in config.sections.iter() {
        let raw_pairs: Vec<RawPair> = match section.kind {
            MediaType::Mixed => mixed_section_pairs(catalog.outlets(), &mainstream, count, rng),
            kind => section_pairs(&catalog.of_type(kind), count, rng),
        };
        if raw_pairs.len() < count {
            warn!(
                "generate_pairs: section {} ({}) only has {} of {} comparisons: not enough outlets",
                section.id,
                section.kind,
                raw_pairs.len(),
                count
            );
        }
        debug!(
            "generate_pairs: section {}: {:?}",
            section.id,
            raw_pairs
                .iter()
                .map(|(l, r)| format!("{}/{}", l.codename, r.codename))
                .collect::<Vec<String>>()
        );
        all_pairs.extend(
            raw_pairs
                .into_iter()
                .enumerate()
                .map(|(idx, (left, right))| Pair {
                    left: left.clone(),
                    right: right.clone(),
                    section_id: section.id,
                    section_type: section.kind,
                    section_name: section.name.clone(),
                    comparison_index: idx,
                    comparison_id: format!("{}-{}", section.id, idx + 1),
                }),
        );
    }
    all_pairs
}

fn already_paired(pairs: &[RawPair], a: &Outlet, b: &Outlet) -> bool {
    pairs.iter().any(|(l, r)| {
        (l.codename == a.codename && r.codename == b.codename)
            || (l.codename == b.codename && r.codename == a.codename)
    })
}

// Pairs within a single outlet type.
//
// The first pass walks a random permutation two by two, so that no outlet appears twice.
// If that is not enough, pairs are drawn from fresh permutations, avoiding the pairs that
// were already produced for a bounded number of draws.
fn section_pairs<'a, R: Rng + ?Sized>(
    outlets: &[&'a Outlet],
    count: usize,
    rng: &mut R,
) -> Vec<RawPair<'a>> {
    if outlets.len() < 2 {
        return Vec::new();
    }

    let mut shuffled: Vec<&Outlet> = outlets.to_vec();
    shuffled.shuffle(rng);
    let mut pairs: Vec<RawPair> = shuffled
        .chunks_exact(2)
        .take(count)
        .map(|c| (c[0], c[1]))
        .collect();
    debug!(
        "section_pairs: {} distinct pairs out of {} outlets",
        pairs.len(),
        outlets.len()
    );

    let mut attempts = 0;
    while pairs.len() < count {
        let mut candidates: Vec<&Outlet> = outlets.to_vec();
        candidates.shuffle(rng);
        let left = candidates[0];
        let right = match candidates
            .iter()
            .skip(1)
            .find(|o| o.codename != left.codename)
        {
            Some(o) => *o,
            // Only copies of the same outlet: nothing can be compared.
            None => break,
        };
        if already_paired(&pairs, left, right) && attempts < MAX_REPEAT_ATTEMPTS {
            attempts += 1;
            continue;
        }
        if attempts >= MAX_REPEAT_ATTEMPTS {
            debug!(
                "section_pairs: accepting repeated pair {}/{}",
                left.codename, right.codename
            );
        }
        attempts = 0;
        pairs.push((left, right));
    }
    pairs.truncate(count);
    pairs
}

// Pairs confronting one mainstream outlet with one outlet outside the mainstream set.
fn mixed_section_pairs<'a, R: Rng + ?Sized>(
    outlets: &'a [Outlet],
    mainstream: &HashSet<&str>,
    count: usize,
    rng: &mut R,
) -> Vec<RawPair<'a>> {
    let mut anchors: Vec<&Outlet> = outlets
        .iter()
        .filter(|o| mainstream.contains(o.codename.as_str()))
        .collect();
    let others: Vec<&Outlet> = outlets
        .iter()
        .filter(|o| !mainstream.contains(o.codename.as_str()))
        .collect();
    if anchors.is_empty() || others.is_empty() {
        warn!(
            "mixed_section_pairs: {} mainstream and {} other outlets in the catalog, cannot pair them",
            anchors.len(),
            others.len()
        );
        return Vec::new();
    }
    anchors.shuffle(rng);

    let mut pairs: Vec<RawPair> = Vec::with_capacity(count);
    for idx in 0..count {
        // Cycle through the anchors when there are fewer of them than comparisons.
        let anchor = anchors[idx % anchors.len()];
        let mut pool = others.clone();
        pool.shuffle(rng);
        let other = match pool
            .iter()
            .find(|o| o.kind != anchor.kind)
            .or_else(|| pool.first())
        {
            Some(o) => *o,
            None => break,
        };
        if rng.gen_bool(0.5) {
            pairs.push((anchor, other));
        } else {
            pairs.push((other, anchor));
        }
    }
    pairs
}

#[cfg(test)]
pub(crate) fn test_catalog(config: &SurveyConfig) -> OutletCatalog {
    let rows: &[(&str, MediaType)] = &[
        ("tg1", MediaType::Tg),
        ("tg5", MediaType::Tg),
        ("tgla7", MediaType::Tg),
        ("tg2", MediaType::Tg),
        ("skytg24", MediaType::Tg),
        ("portaaporta", MediaType::Talk),
        ("ottoemezzo", MediaType::Talk),
        ("report", MediaType::Talk),
        ("piazzapulita", MediaType::Talk),
        ("corriere", MediaType::Press),
        ("repubblica", MediaType::Press),
        ("ilfatto", MediaType::Press),
        ("lastampa", MediaType::Press),
        ("ilgiornale", MediaType::Press),
        ("avvenire", MediaType::Press),
        ("radio24", MediaType::Radio),
        ("radio1", MediaType::Radio),
        ("radiopopolare", MediaType::Radio),
    ];
    let mut builder = CatalogBuilder::new(config);
    for (codename, kind) in rows {
        builder.add_outlet_simple(codename, &codename.to_uppercase(), *kind);
    }
    builder.build().unwrap()
}
