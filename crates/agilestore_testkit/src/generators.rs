//! Data generators.
//!
//! [`fake_people`] and [`populate`] produce the same records for the same
//! seed. The proptest strategies keep the invariants the `people` store
//! needs: usernames are valid keys and dates sort as text.

use crate::fixtures::Person;
use agilestore_core::{CoreResult, Store};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const FIRST_NAMES: &[&str] = &[
    "ada", "alan", "barbara", "claude", "donald", "edsger", "frances", "grace", "john", "ken",
    "leslie", "linus", "margaret", "niklaus", "radia", "tony",
];

const LAST_NAMES: &[&str] = &[
    "backus", "dijkstra", "hamilton", "hopper", "knuth", "lamport", "liskov", "lovelace",
    "perlman", "ritchie", "shannon", "thompson", "torvalds", "turing", "wirth",
];

fn date(year: u32, month: u32, day: u32) -> String {
    format!("{year:04}-{month:02}-{day:02}")
}

/// Generates `n` people with unique usernames from `seed`.
pub fn fake_people(n: usize, seed: u64) -> Vec<Person> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let first = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("user");
            let last = LAST_NAMES.choose(&mut rng).copied().unwrap_or("anon");
            Person {
                username: format!("{first}.{last}.{i}"),
                age: rng.gen_range(16..=90),
                registration_date: date(
                    rng.gen_range(2015..=2024),
                    rng.gen_range(1..=12),
                    rng.gen_range(1..=28),
                ),
                verified: rng.gen_bool(0.7),
            }
        })
        .collect()
}

/// Adds `n` generated people to `store` in one bulk insert.
///
/// Returns the generated records.
pub async fn populate(store: &Store<Person>, n: usize, seed: u64) -> CoreResult<Vec<Person>> {
    let people = fake_people(n, seed);
    store.add_many(&people, false).await?;
    Ok(people)
}

/// Strategy for generating valid usernames.
pub fn username_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for generating registration dates.
pub fn date_strategy() -> impl Strategy<Value = String> {
    (2015u32..=2024, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| date(y, m, d))
}

/// Strategy for generating one person.
pub fn person_strategy() -> impl Strategy<Value = Person> {
    (username_strategy(), 0u32..120, date_strategy(), any::<bool>()).prop_map(
        |(username, age, registration_date, verified)| Person {
            username,
            age,
            registration_date,
            verified,
        },
    )
}

/// Strategy for generating people with distinct usernames.
pub fn unique_people_strategy(max: usize) -> impl Strategy<Value = Vec<Person>> {
    prop::collection::btree_map(username_strategy(), person_strategy(), 0..=max).prop_map(|people| {
        people
            .into_iter()
            .map(|(username, person)| Person { username, ..person })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn fake_people_are_deterministic() {
        assert_eq!(fake_people(20, 42), fake_people(20, 42));
        assert_ne!(fake_people(20, 42), fake_people(20, 43));
    }

    #[test]
    fn fake_usernames_are_unique() {
        let people = fake_people(500, 1);
        let names: HashSet<_> = people.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names.len(), 500);
    }

    proptest! {
        #[test]
        fn generated_dates_are_iso_days(date in date_strategy()) {
            let parts: Vec<u32> = date.split('-').map(|p| p.parse().unwrap()).collect();
            prop_assert_eq!(date.len(), 10);
            prop_assert!((2015..=2024).contains(&parts[0]));
            prop_assert!((1..=12).contains(&parts[1]));
            prop_assert!((1..=28).contains(&parts[2]));
        }

        #[test]
        fn unique_people_have_distinct_names(people in unique_people_strategy(16)) {
            let names: HashSet<_> = people.iter().map(|p| p.username.clone()).collect();
            prop_assert_eq!(names.len(), people.len());
        }
    }
}
