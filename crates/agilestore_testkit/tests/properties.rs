//! Store properties over generated people.

use agilestore_core::{CoreError, KeyRange, Store};
use agilestore_testkit::prelude::*;
use proptest::prelude::*;
use serde::Serialize;
use std::future::Future;

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

async fn stocked(people: &[Person]) -> Store<Person> {
    let store = open_people().await;
    assert_eq!(store.add_many(people, false).await.unwrap(), people.len());
    store
}

#[derive(Serialize)]
struct AgePatch {
    age: u32,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn added_records_read_back(people in unique_people_strategy(12)) {
        block_on(async {
            let store = stocked(&people).await;
            for person in &people {
                let found = store.get_one("username", person.username.as_str()).await.unwrap();
                assert_eq!(found.as_ref(), Some(person));
            }
            assert_eq!(store.get_one("username", "~missing").await.unwrap(), None);
        });
    }

    #[test]
    fn one_duplicate_in_a_bulk_add(people in unique_people_strategy(12), pick in any::<prop::sample::Index>()) {
        prop_assume!(!people.is_empty());
        let mut batch = people.clone();
        batch.push(pick.get(&people).clone());

        block_on(async {
            let store = open_people().await;
            assert!(store.add_many(&batch, false).await.is_err());
            assert_eq!(store.count().await.unwrap(), 0);
            assert_eq!(store.add_many(&batch, true).await.unwrap(), people.len());
            assert_eq!(store.count().await.unwrap(), people.len() as u64);
        });
    }

    #[test]
    fn filter_respects_limit(people in unique_people_strategy(16), limit in 0usize..20, threshold in 0u32..120) {
        block_on(async {
            let store = stocked(&people).await;
            let mut matches: Vec<Person> = people.iter().filter(|p| p.age >= threshold).cloned().collect();
            matches.sort_by(|a, b| a.username.cmp(&b.username));

            let found = store.filter(move |p: &Person| p.age >= threshold, Some(limit)).await.unwrap();
            assert_eq!(found.len(), limit.min(matches.len()));
            assert_eq!(found[..], matches[..found.len()]);
        });
    }

    #[test]
    fn delete_by_index_removes_every_match(people in unique_people_strategy(16), pick in any::<prop::sample::Index>()) {
        prop_assume!(!people.is_empty());
        let day = pick.get(&people).registration_date.clone();
        let matching = people.iter().filter(|p| p.registration_date == day).count() as u64;

        block_on(async {
            let store = stocked(&people).await;
            let deleted = store
                .delete_many("registrationDate", &KeyRange::only(day.as_str()))
                .await
                .unwrap();
            assert_eq!(deleted, Some(matching));
            assert_eq!(store.count().await.unwrap(), people.len() as u64 - matching);
        });
    }

    #[test]
    fn update_changes_only_patched_fields(people in unique_people_strategy(8), pick in any::<prop::sample::Index>(), age in 0u32..120) {
        prop_assume!(!people.is_empty());
        let target = pick.get(&people).clone();

        block_on(async {
            let store = stocked(&people).await;
            store.update_one(target.username.as_str(), &AgePatch { age }).await.unwrap();
            let updated = store.get_one_by_key(target.username.as_str()).await.unwrap();
            assert_eq!(updated, Some(Person { age, ..target.clone() }));

            let err = store.update_one("~missing", &AgePatch { age }).await.unwrap_err();
            assert!(matches!(err, CoreError::RecordNotFound { .. }));
        });
    }

    #[test]
    fn put_round_trips_and_clear_empties(people in unique_people_strategy(8), replacement in person_strategy()) {
        block_on(async {
            let store = stocked(&people).await;
            store.put(&replacement).await.unwrap();
            let found = store.get_one_by_key(replacement.username.as_str()).await.unwrap();
            assert_eq!(found, Some(replacement.clone()));

            store.clear().await.unwrap();
            assert_eq!(store.count().await.unwrap(), 0);
        });
    }
}
