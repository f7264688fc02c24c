//! Change detection: is the target fact already the authoritative one?

use crate::{
  config::Vocabulary,
  fact::{Fact, NewFact, Rank},
};

/// Whether stating `target` on an entity holding `existing` requires a write.
///
/// No write is required only when some existing fact on the target property
/// is `preferred`, has a value numerically equal to the target's, and carries
/// exactly the target's point-in-time qualifier. A target without a
/// point-in-time qualifier always requires a write.
pub fn is_write_required(
  existing: &[Fact],
  target: &NewFact,
  vocab: &Vocabulary,
) -> bool {
  let Some(point_in_time) = target.qualifier(vocab.point_in_time) else {
    return true;
  };

  !existing.iter().any(|f| {
    f.property == target.property
      && f.rank == Rank::Preferred
      && f.value.numerically_eq(&target.value)
      && f.qualifiers.contains(point_in_time)
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::EntityKind,
    entity::PropertyId,
    fact::{Quantity, Snak, Value},
    test_helpers::{config, population_fact, record},
  };

  fn target(population: u64) -> NewFact {
    config(EntityKind::Commune).target_fact(&record("01053", population, 2021))
  }

  fn vocab() -> Vocabulary { Vocabulary::default() }

  #[test]
  fn no_existing_fact_requires_write() {
    assert!(is_write_required(&[], &target(100), &vocab()));
  }

  #[test]
  fn identical_preferred_fact_needs_no_write() {
    // Scenario D.
    let existing = [population_fact(100, 2021, Rank::Preferred)];
    assert!(!is_write_required(&existing, &target(100), &vocab()));
  }

  #[test]
  fn identical_value_at_normal_rank_requires_write() {
    let existing = [population_fact(100, 2021, Rank::Normal)];
    assert!(is_write_required(&existing, &target(100), &vocab()));
  }

  #[test]
  fn different_value_requires_write() {
    let existing = [population_fact(99, 2021, Rank::Preferred)];
    assert!(is_write_required(&existing, &target(100), &vocab()));
  }

  #[test]
  fn different_point_in_time_requires_write() {
    let existing = [population_fact(100, 2020, Rank::Preferred)];
    assert!(is_write_required(&existing, &target(100), &vocab()));
  }

  #[test]
  fn missing_point_in_time_requires_write() {
    let mut fact = population_fact(100, 2021, Rank::Preferred);
    fact.qualifiers.clear();
    assert!(is_write_required(&[fact], &target(100), &vocab()));
  }

  #[test]
  fn amount_equality_is_numeric() {
    let mut fact = population_fact(100, 2021, Rank::Preferred);
    fact.value = Value::Quantity(Quantity::exact("100.00".parse().unwrap()));
    assert!(!is_write_required(&[fact], &target(100), &vocab()));
  }

  #[test]
  fn facts_on_other_properties_are_ignored() {
    let mut fact = population_fact(100, 2021, Rank::Preferred);
    fact.property = PropertyId::new(1539);
    assert!(is_write_required(&[fact], &target(100), &vocab()));
  }

  #[test]
  fn extra_qualifiers_on_the_existing_fact_do_not_matter() {
    let mut fact = population_fact(100, 2021, Rank::Preferred);
    fact
      .qualifiers
      .push(Snak::new(PropertyId::new(1539), Value::Quantity(Quantity::count(52))));
    assert!(!is_write_required(&[fact], &target(100), &vocab()));
  }

  #[test]
  fn one_matching_fact_among_many_suffices() {
    let existing = [
      population_fact(90, 2015, Rank::Normal),
      population_fact(100, 2021, Rank::Preferred),
      population_fact(95, 2018, Rank::Normal),
    ];
    assert!(!is_write_required(&existing, &target(100), &vocab()));
  }
}
