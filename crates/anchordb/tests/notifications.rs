//! Live collection and notification tests.

use anchordb::{
    ChangeSet, CollectionChange, Error, LiveCollection, Model, Move, Notification,
    NotificationToken, ObjectRef, Predicate, RowKey, Session, SortDescriptor,
};
use anchordb_testkit::prelude::*;
use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Initial,
    Changed(ChangeSet),
    Error,
}

type Log = Rc<RefCell<Vec<Seen>>>;

fn record(collection: &LiveCollection) -> (Log, NotificationToken) {
    let log: Log = Rc::default();
    let sink = Rc::clone(&log);
    let token = collection
        .subscribe(move |_, notification| {
            sink.borrow_mut().push(match notification {
                Notification::Initial => Seen::Initial,
                Notification::Changed(changes) => Seen::Changed(changes.clone()),
                Notification::Error(_) => Seen::Error,
            });
        })
        .unwrap();
    (log, token)
}

fn last_changes(log: &Log) -> ChangeSet {
    match log.borrow().last() {
        Some(Seen::Changed(changes)) => changes.clone(),
        other => panic!("expected a change, got {other:?}"),
    }
}

/// A person with dogs named `names`, returning the person and the list.
fn kennel(session: &Session, names: &[&str]) -> (ObjectRef, LiveCollection) {
    session
        .write(|s| -> anchordb::Result<_> {
            let owner = s.add(&Person::new(1, "Ann", 30))?;
            let dogs = owner.list("dogs")?;
            for (age, name) in names.iter().enumerate() {
                let dog = s.add(&Dog::new(name, age as i64))?;
                dogs.push(&dog)?;
            }
            Ok((owner, dogs))
        })
        .unwrap()
}

fn names(collection: &LiveCollection) -> Vec<String> {
    collection
        .to_vec()
        .unwrap()
        .iter()
        .map(|dog| dog.get_text("name").unwrap().unwrap_or_default())
        .collect()
}

#[test]
fn first_delivery_is_initial() {
    with_session(|session| {
        let people = session.all(Person::TABLE).unwrap();
        let (log, _token) = record(&people);
        assert!(log.borrow().is_empty());

        session.process_notifications().unwrap();
        assert_eq!(*log.borrow(), vec![Seen::Initial]);

        session.process_notifications().unwrap();
        assert_eq!(log.borrow().len(), 1);
    });
}

#[test]
fn commit_delivers_insertions() {
    with_session(|session| {
        let people = session.all(Person::TABLE).unwrap();
        let (log, _token) = record(&people);
        session.process_notifications().unwrap();

        session.write(|s| s.add(&Person::new(1, "Ann", 30))).unwrap();
        let changes = last_changes(&log);
        assert_eq!(changes.insertions(), &[0]);
        assert!(changes.deletions().is_empty());
        assert_eq!(people.len().unwrap(), 1);
    });
}

#[test]
fn initial_is_delivered_on_the_next_commit_if_pending() {
    with_session(|session| {
        let people = session.all(Person::TABLE).unwrap();
        let (log, _token) = record(&people);
        session.write(|s| s.add(&Person::new(1, "Ann", 30))).unwrap();
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(log.borrow()[0], Seen::Initial);
        assert_eq!(last_changes(&log).insertions(), &[0]);
    });
}

#[test]
fn unrelated_commits_deliver_nothing() {
    with_session(|session| {
        let dogs = session.all(Dog::TABLE).unwrap();
        let (log, _token) = record(&dogs);
        session.process_notifications().unwrap();

        session.write(|s| s.add(&Person::new(1, "Ann", 30))).unwrap();
        assert_eq!(log.borrow().len(), 1);
    });
}

#[test]
fn other_sessions_commits_arrive_on_refresh() {
    let store = TestStore::memory();
    let a = store.open();
    let b = store.open();

    let people = b.all(Person::TABLE).unwrap();
    let (log, _token) = record(&people);
    b.process_notifications().unwrap();

    a.write(|s| s.add(&Person::new(1, "Ann", 30))).unwrap();
    assert_eq!(log.borrow().len(), 1);

    b.refresh().unwrap();
    assert_eq!(last_changes(&log).insertions(), &[0]);
}

#[test]
fn modifications_report_new_positions() {
    with_session(|session| {
        let (_owner, dogs) = kennel(session, &["a", "b", "c"]);
        let (log, _token) = record(&dogs);
        session.process_notifications().unwrap();

        let b = dogs.get(1).unwrap();
        session.write(|_| b.set("age", 10i64)).unwrap();

        let changes = last_changes(&log);
        assert_eq!(changes.modifications(), &[1]);
        assert_eq!(changes.old_modifications(), &[1]);
        assert!(changes.moves().is_empty());
    });
}

#[test]
fn single_move_is_one_pair() {
    with_session(|session| {
        let (_owner, dogs) = kennel(session, &["a", "b", "c", "d", "e"]);
        let (log, _token) = record(&dogs);
        session.process_notifications().unwrap();

        session.write(|_| dogs.move_item(0, 3)).unwrap();

        let changes = last_changes(&log);
        assert_eq!(changes.moves(), &[Move { from: 0, to: 3 }]);
        assert!(changes.insertions().is_empty());
        assert!(changes.deletions().is_empty());
        assert_eq!(names(&dogs), ["b", "c", "d", "a", "e"]);
        assert_eq!(
            CollectionChange::from_changes(&changes),
            vec![CollectionChange::Moved { from: 0, to: 3 }]
        );
    });
}

#[test]
fn add_and_remove_in_one_write_resets() {
    with_session(|session| {
        session
            .write(|s| -> anchordb::Result<()> {
                s.add(&Person::new(1, "Ann", 30))?;
                s.add(&Person::new(2, "Bo", 52))?;
                Ok(())
            })
            .unwrap();
        let adults = session
            .filter(Person::TABLE, Predicate::at_least("age", 18i64))
            .unwrap();

        let events: Rc<RefCell<Vec<Vec<CollectionChange>>>> = Rc::default();
        let sink = Rc::clone(&events);
        let _token = adults
            .subscribe(move |_, notification| {
                sink.borrow_mut()
                    .push(CollectionChange::from_notification(&notification));
            })
            .unwrap();
        session.process_notifications().unwrap();

        session
            .write(|s| -> anchordb::Result<()> {
                s.find(Person::TABLE, 1i64)?.unwrap().remove()?;
                s.add(&Person::new(3, "Cy", 40))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(
            *events.borrow(),
            vec![vec![CollectionChange::Reset], vec![CollectionChange::Reset]]
        );
    });
}

#[test]
fn removals_only_come_back_as_runs() {
    with_session(|session| {
        let (_owner, dogs) = kennel(session, &["a", "b", "c", "d"]);
        let (log, _token) = record(&dogs);
        session.process_notifications().unwrap();

        session
            .write(|_| -> anchordb::Result<()> {
                dogs.remove_at(3)?;
                dogs.remove_at(1)?;
                Ok(())
            })
            .unwrap();

        let changes = last_changes(&log);
        assert_eq!(changes.deletions(), &[1, 3]);
        assert_eq!(
            CollectionChange::from_changes(&changes),
            vec![
                CollectionChange::Removed { index: 3, count: 1 },
                CollectionChange::Removed { index: 1, count: 1 },
            ]
        );
    });
}

#[test]
fn changes_replay_onto_the_old_sequence() {
    with_session(|session| {
        let (_owner, dogs) = kennel(session, &["a", "b", "c", "d", "e"]);
        let (log, _token) = record(&dogs);
        session.process_notifications().unwrap();
        let before = dogs.keys().unwrap();

        session
            .write(|s| -> anchordb::Result<()> {
                dogs.remove_at(1)?;
                dogs.move_item(2, 0)?;
                let f = s.add(&Dog::new("f", 9))?;
                dogs.insert(2, &f)?;
                Ok(())
            })
            .unwrap();

        let after = dogs.keys().unwrap();
        assert_eq!(last_changes(&log).apply(&before, &after), after);
    });
}

#[test]
fn index_out_of_range_on_empty_and_full() {
    with_session(|session| {
        let (_owner, dogs) = kennel(session, &[]);
        for index in [-1, 0] {
            assert!(matches!(
                dogs.get(index),
                Err(Error::IndexOutOfRange { len: 0, .. })
            ));
        }

        let everyone = session.all(Dog::TABLE).unwrap();
        assert!(matches!(
            everyone.get(-1),
            Err(Error::IndexOutOfRange { .. })
        ));
    });

    with_session(|session| {
        let (_owner, dogs) = kennel(session, &["a", "b", "c", "d", "e"]);
        assert_eq!(dogs.len().unwrap(), 5);
        for index in [-1, 5] {
            assert!(matches!(
                dogs.get(index),
                Err(Error::IndexOutOfRange { index: i, len: 5 }) if i == index
            ));
        }
        assert!(dogs.get(4).is_ok());
    });
}

#[test]
fn disposing_inside_own_callback_stops_only_that_subscriber() {
    with_session(|session| {
        let people = session.all(Person::TABLE).unwrap();

        let first_calls = Rc::new(RefCell::new(0));
        let slot: Rc<RefCell<Option<NotificationToken>>> = Rc::default();
        let first = {
            let calls = Rc::clone(&first_calls);
            let slot = Rc::clone(&slot);
            people
                .subscribe(move |_, _| {
                    *calls.borrow_mut() += 1;
                    if let Some(token) = slot.borrow().as_ref() {
                        token.dispose();
                        token.dispose();
                    }
                })
                .unwrap()
        };
        *slot.borrow_mut() = Some(first);
        let (log, _second) = record(&people);

        session.process_notifications().unwrap();
        session.write(|s| s.add(&Person::new(1, "Ann", 30))).unwrap();
        session.write(|s| s.add(&Person::new(2, "Bo", 52))).unwrap();

        assert_eq!(*first_calls.borrow(), 1);
        assert_eq!(log.borrow().len(), 3);
        assert!(!slot.borrow().as_ref().unwrap().is_active());
    });
}

#[test]
fn dropping_the_token_unsubscribes() {
    with_session(|session| {
        let people = session.all(Person::TABLE).unwrap();
        let (log, token) = record(&people);
        session.process_notifications().unwrap();
        drop(token);

        session.write(|s| s.add(&Person::new(1, "Ann", 30))).unwrap();
        assert_eq!(*log.borrow(), vec![Seen::Initial]);
    });
}

#[test]
fn subscriptions_outlive_the_collection_handle() {
    with_session(|session| {
        let (log, _token) = record(&session.all(Person::TABLE).unwrap());
        session.process_notifications().unwrap();
        session.write(|s| s.add(&Person::new(1, "Ann", 30))).unwrap();
        assert_eq!(log.borrow().len(), 2);
    });
}

#[test]
fn every_collection_sees_the_new_version_before_callbacks() {
    with_session(|session| {
        let people = session.all(Person::TABLE).unwrap();
        let adults = session
            .filter(Person::TABLE, Predicate::at_least("age", 18i64))
            .unwrap();

        let seen: Rc<RefCell<Vec<(usize, usize)>>> = Rc::default();
        let tokens: Vec<_> = [&people, &adults]
            .into_iter()
            .map(|collection| {
                let seen = Rc::clone(&seen);
                let people = people.clone();
                let adults = adults.clone();
                collection
                    .subscribe(move |_, _| {
                        seen.borrow_mut()
                            .push((people.len().unwrap(), adults.len().unwrap()));
                    })
                    .unwrap()
            })
            .collect();
        session.process_notifications().unwrap();
        seen.borrow_mut().clear();

        session.write(|s| s.add(&Person::new(1, "Ann", 30))).unwrap();
        assert_eq!(*seen.borrow(), vec![(1, 1), (1, 1)]);
        drop(tokens);
    });
}

#[test]
fn callbacks_cannot_write_or_refresh() {
    with_session(|session| {
        let people = session.all(Person::TABLE).unwrap();
        let outcomes: Rc<RefCell<Vec<bool>>> = Rc::default();
        let sink = Rc::clone(&outcomes);
        let _token = people
            .subscribe(move |collection, _| {
                let s = collection.session();
                sink.borrow_mut().push(matches!(
                    s.begin_write(),
                    Err(Error::InvalidTransaction { .. })
                ));
                sink.borrow_mut()
                    .push(matches!(s.refresh(), Err(Error::InvalidState { .. })));
            })
            .unwrap();

        session.process_notifications().unwrap();
        assert_eq!(*outcomes.borrow(), vec![true, true]);
    });
}

#[test]
fn subscribing_inside_a_write_is_rejected() {
    with_session(|session| {
        let people = session.all(Person::TABLE).unwrap();
        let _scope = session.begin_write().unwrap();
        let err = people.subscribe(|_, _| {}).unwrap_err();
        assert!(matches!(err, Error::InvalidTransaction { .. }));
    });
}

#[test]
fn removed_parent_invalidates_the_list_once() {
    with_session(|session| {
        let (owner, dogs) = kennel(session, &["a", "b"]);
        let (log, _token) = record(&dogs);
        session.process_notifications().unwrap();

        session.write(|_| owner.remove()).unwrap();
        assert!(!dogs.is_valid());
        assert!(matches!(dogs.len(), Err(Error::InvalidObject { .. })));

        session.write(|s| s.add(&Dog::new("z", 1))).unwrap();
        assert_eq!(*log.borrow(), vec![Seen::Initial, Seen::Error]);

        assert!(matches!(
            dogs.subscribe(|_, _| {}),
            Err(Error::InvalidObject { .. })
        ));
    });
}

#[test]
fn query_collections_cannot_be_edited() {
    with_session(|session| {
        let (_owner, dogs) = kennel(session, &["a"]);
        let everyone = session.all(Dog::TABLE).unwrap();
        let sorted = dogs.sorted_by(vec![SortDescriptor::descending("name")]).unwrap();
        let _scope = session.begin_write().unwrap();
        assert!(matches!(everyone.remove_at(0), Err(Error::NotSupported { .. })));
        assert!(matches!(sorted.clear(), Err(Error::NotSupported { .. })));
        assert!(matches!(dogs.remove_at(4), Err(Error::IndexOutOfRange { .. })));
    });
}

#[test]
fn filtered_and_sorted_views_follow_their_source() {
    with_session(|session| {
        let (_owner, dogs) = kennel(session, &["c", "a", "d", "b"]);
        let young = dogs.filter(Predicate::less_than("age", 3i64)).unwrap();
        let by_name = young
            .sorted_by(vec![SortDescriptor::ascending("name")])
            .unwrap();
        assert_eq!(names(&young), ["c", "a", "d"]);
        assert_eq!(names(&by_name), ["a", "c", "d"]);

        let (log, _token) = record(&by_name);
        session.process_notifications().unwrap();
        let b = dogs.get(3).unwrap();
        session.write(|_| b.set("age", 0i64)).unwrap();

        assert_eq!(names(&by_name), ["a", "b", "c", "d"]);
        assert_eq!(last_changes(&log).insertions(), &[1]);
    });
}

#[test]
fn closing_inside_a_callback_stops_delivery() {
    with_session(|session| {
        let people = session.all(Person::TABLE).unwrap();
        let _closer = people.subscribe(|collection, _| collection.session().close()).unwrap();
        let (log, _token) = record(&people);

        session.process_notifications().unwrap();
        assert!(session.is_closed());
        assert!(log.borrow().is_empty());
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn list_edits_replay(edits in list_edits_strategy(12)) {
        with_session(|session| {
            let (_owner, dogs) = kennel(session, &["a", "b", "c", "d", "e", "f"]);
            let (log, _token) = record(&dogs);
            session.process_notifications().unwrap();
            let before = dogs.keys().unwrap();

            session.write(|s| -> anchordb::Result<()> {
                for edit in &edits {
                    let len = dogs.len()?;
                    match *edit {
                        ListEdit::Push => dogs.push(&s.add(&Dog::new("new", 1))?)?,
                        ListEdit::Remove(i) if len > 0 => dogs.remove_at(i % len)?,
                        ListEdit::Move(a, b) if len > 0 => dogs.move_item(a % len, b % len)?,
                        ListEdit::Touch(i) if len > 0 => dogs.get((i % len) as i64)?.set("age", 99i64)?,
                        _ => {}
                    }
                }
                Ok(())
            }).unwrap();

            let after = dogs.keys().unwrap();
            match log.borrow().last() {
                Some(Seen::Changed(changes)) => prop_assert_eq!(changes.apply(&before, &after), after),
                _ => prop_assert_eq!(before, after),
            }
            Ok(())
        })?;
    }

    #[test]
    fn unrelated_orderings_diff_cleanly(
        old in distinct_keys_strategy(24),
        new in distinct_keys_strategy(24),
    ) {
        let old: Vec<RowKey> = old.into_iter().map(RowKey).collect();
        let new: Vec<RowKey> = new.into_iter().map(RowKey).collect();
        let changes = ChangeSet::compute(&old, &new, |_| false);

        prop_assert_eq!(changes.apply(&old, &new), new.clone());
        prop_assert!(changes.moves().iter().all(|m| m.from != m.to));
        if !changes.insertions().is_empty() && !changes.deletions().is_empty() {
            prop_assert_eq!(
                CollectionChange::from_changes(&changes),
                vec![CollectionChange::Reset]
            );
        }
    }
}
