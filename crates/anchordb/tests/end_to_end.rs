//! End-to-end scenarios across threads and workers.

use anchordb::{
    run_on_worker, Error, LiveCollection, Model, ObjectGraph, Session, ThreadSafeReference,
};
use anchordb_testkit::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::thread;

fn names(collection: &LiveCollection) -> Vec<String> {
    collection
        .to_vec()
        .unwrap()
        .iter()
        .map(|dog| dog.get_text("name").unwrap().unwrap_or_default())
        .collect()
}

#[test]
fn second_thread_sees_the_object_and_its_list() {
    let store = TestStore::file();
    let a = store.open();
    let ann = a
        .write(|s| -> anchordb::Result<_> {
            let ann = s.add(&Person::new(1, "Ann", 30))?;
            let dogs = ann.list("dogs")?;
            for name in ["Rex", "Fido", "Spot"] {
                dogs.push(&s.add(&Dog::new(name, 2))?)?;
            }
            Ok(ann)
        })
        .unwrap();
    let dogs = ann.list("dogs").unwrap();
    let package = ThreadSafeReference::new(&dogs).unwrap();
    let expected = names(&dogs);

    let config = store.config();
    let (name, seen) = thread::spawn(move || {
        let b = Session::open(config).unwrap();
        let found = b.find(Person::TABLE, 1i64).unwrap().unwrap();
        assert!(found.is_valid());
        let dogs: LiveCollection = b.resolve(&package).unwrap().unwrap();
        (found.get_text("name").unwrap(), names(&dogs))
    })
    .join()
    .unwrap();

    assert_eq!(name.as_deref(), Some("Ann"));
    assert_eq!(seen, expected);
    assert_eq!(expected, ["Rex", "Fido", "Spot"]);
}

#[test]
fn worker_results_come_back_as_packages() {
    let store = TestStore::memory();
    let session = store.open();

    let package = run_on_worker(store.config(), |worker| {
        let bo = worker
            .write(|s| s.add(&Person::new(2, "Bo", 52)))
            .map_err(anchordb::WriteError::flatten)?;
        ThreadSafeReference::new(&bo)
    })
    .wait()
    .unwrap();

    let bo = session.resolve(&package).unwrap().unwrap();
    assert_eq!(bo.to_model::<Person>().unwrap(), Person::new(2, "Bo", 52));
}

#[test]
fn worker_failures_surface_to_the_caller() {
    let store = TestStore::memory();
    let _keep = store.open();
    let err = run_on_worker(store.config(), |worker| {
        worker.find(Dog::TABLE, "Rex").map(|_| ())
    })
    .wait()
    .unwrap_err();
    assert!(matches!(err, Error::NotSupported { .. }));
}

#[tokio::test]
async fn worker_writes_refresh_the_caller() {
    let store = TestStore::memory();
    let session = store.open();
    let people = session.all(Person::TABLE).unwrap();

    let log: Rc<RefCell<Vec<usize>>> = Rc::default();
    let sink = Rc::clone(&log);
    let _token = people
        .subscribe(move |people, _| sink.borrow_mut().push(people.len().unwrap()))
        .unwrap();
    session.process_notifications().unwrap();

    let id = session
        .write_on_worker(|worker| {
            worker.add(&Person::new(3, "Cy", 40))?;
            Ok(3i64)
        })
        .await
        .unwrap();

    assert!(session.find(Person::TABLE, id).unwrap().is_some());
    assert_eq!(*log.borrow(), vec![0, 1]);
}

#[tokio::test]
async fn worker_writes_are_refused_while_holding_a_write() {
    let store = TestStore::memory();
    let session = store.open();
    let scope = session.begin_write().unwrap();
    let err = session
        .write_on_worker(|_| Ok(()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransaction { .. }));
    scope.rollback();
}

#[test]
fn cyclic_graphs_attach_each_node_once() {
    with_session(|session| {
        let mut graph = ObjectGraph::new();
        let ann = graph.node(Person::TABLE);
        let rex = graph.node(Dog::TABLE);
        let fido = graph.node(Dog::TABLE);
        graph
            .set(ann, "id", 1i64)
            .set(ann, "name", "Ann")
            .set(rex, "name", "Rex")
            .set(fido, "name", "Fido")
            .push(ann, "dogs", rex)
            .push(ann, "dogs", fido)
            .link(rex, "owner", ann)
            .link(fido, "owner", ann);

        let attached = session.write(|s| s.add_graph(&graph, rex)).unwrap();
        assert_eq!(attached.len(), 3);
        assert_eq!(session.all(Person::TABLE).unwrap().len().unwrap(), 1);
        assert_eq!(session.all(Dog::TABLE).unwrap().len().unwrap(), 2);

        let owner = attached.root().get_link("owner").unwrap().unwrap();
        assert_eq!(Some(&owner), attached.get(ann));
        assert_eq!(names(&owner.list("dogs").unwrap()), ["Rex", "Fido"]);
    });
}

#[test]
fn graphs_can_link_to_managed_objects() {
    with_session(|session| {
        let ann = session.write(|s| s.add(&Person::new(1, "Ann", 30))).unwrap();

        let mut graph = ObjectGraph::new();
        let rex = graph.node(Dog::TABLE);
        graph.set(rex, "name", "Rex").link_existing(rex, "owner", &ann);
        let attached = session.write(|s| s.add_graph(&graph, rex)).unwrap();

        assert_eq!(attached.root().get_link("owner").unwrap(), Some(ann));
    });
}

#[test]
fn graph_errors_leave_the_write_to_the_caller() {
    with_session(|session| {
        let mut graph = ObjectGraph::new();
        let first = graph.node(Person::TABLE);
        let dog = graph.node(Dog::TABLE);
        let second = graph.node(Person::TABLE);
        graph
            .set(first, "id", 1i64)
            .set(second, "id", 1i64)
            .push(first, "dogs", dog)
            .link(dog, "owner", second);

        let result = session.write(|s| s.add_graph(&graph, first));
        assert!(result.is_err());
        assert!(session.find(Person::TABLE, 1i64).unwrap().is_none());
    });
}
