//! Integration Tests for Observable Collections
//!
//! Arrays are checked against a reference implementation of native splice
//! and slice index rules; maps against native key equality.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cascade_core::{
    Annotation, Enhancement, Error, ObservableArray, PlainObject, Prototype, Reaction,
    ReactionOptions, Runtime, Value,
};

/// Native `relative index` resolution.
fn relative(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        (index as usize).min(len)
    }
}

/// Native `Array.prototype.splice`, written against a plain `Vec`.
fn native_splice(
    values: &mut Vec<i32>,
    start: isize,
    delete_count: Option<isize>,
    items: &[i32],
) -> Vec<i32> {
    let len = values.len();
    let start = relative(start, len);
    let delete_count = match delete_count {
        None => len - start,
        Some(count) if count < 0 => 0,
        Some(count) => (count as usize).min(len - start),
    };
    values
        .splice(start..start + delete_count, items.iter().copied())
        .collect()
}

/// Native `Array.prototype.slice`.
fn native_slice(values: &[i32], start: isize, end: Option<isize>) -> Vec<i32> {
    let len = values.len();
    let start = relative(start, len);
    let end = end.map_or(len, |end| relative(end, len));
    if start >= end {
        Vec::new()
    } else {
        values[start..end].to_vec()
    }
}

const STARTS: [isize; 9] = [-2000, -1001, -1, 0, 1, 500, 999, 1000, 5000];
const COUNTS: [Option<isize>; 6] = [None, Some(-5), Some(0), Some(1), Some(3), Some(10_000)];

fn filled(runtime: &Runtime, len: usize) -> (ObservableArray<i32>, Vec<i32>) {
    let values: Vec<i32> = (0..len as i32).collect();
    (runtime.observable_array(values.clone()), values)
}

mod array_parity {
    use super::*;

    #[test]
    fn splice_matches_native() {
        let runtime = Runtime::new();
        for len in [0, 1, 1000] {
            for start in STARTS {
                for count in COUNTS {
                    let (array, mut native) = filled(&runtime, len);
                    let removed = array.splice(start, count, vec![-7, -8]);
                    let expected = native_splice(&mut native, start, count, &[-7, -8]);

                    assert_eq!(
                        removed, expected,
                        "removed for len={len} start={start} count={count:?}"
                    );
                    assert_eq!(
                        array.to_vec(),
                        native,
                        "contents for len={len} start={start} count={count:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn slice_matches_native() {
        let runtime = Runtime::new();
        let ends = [None, Some(-1), Some(0), Some(2), Some(999), Some(4000)];
        for len in [0, 1, 1000] {
            let (array, native) = filled(&runtime, len);
            for start in STARTS {
                for end in ends {
                    assert_eq!(
                        array.slice(start, end),
                        native_slice(&native, start, end),
                        "len={len} start={start} end={end:?}"
                    );
                }
            }
        }
    }

    /// Results recorded from a JavaScript engine, independent of the index
    /// resolution used by the reference functions above.
    #[test]
    fn splice_and_slice_match_recorded_results() {
        let runtime = Runtime::new();
        // (start, deleteCount, items) -> (removed, remaining) on [0, 1, 2, 3, 4]
        let splices: [(isize, Option<isize>, &[i32], &[i32], &[i32]); 6] = [
            (-2, Some(10), &[9], &[3, 4], &[0, 1, 2, 9]),
            (1, Some(2), &[], &[1, 2], &[0, 3, 4]),
            (-7, Some(1), &[8], &[0], &[8, 1, 2, 3, 4]),
            (5, Some(1), &[5, 6], &[], &[0, 1, 2, 3, 4, 5, 6]),
            (2, None, &[], &[2, 3, 4], &[0, 1]),
            (3, Some(-1), &[7], &[], &[0, 1, 2, 7, 3, 4]),
        ];
        for (start, count, items, removed, remaining) in splices {
            let array = runtime.observable_array(vec![0, 1, 2, 3, 4]);
            assert_eq!(array.splice(start, count, items.to_vec()), removed);
            assert_eq!(array.to_vec(), remaining, "splice({start}, {count:?})");
        }

        let array = runtime.observable_array(vec![0, 1, 2, 3, 4]);
        assert_eq!(array.slice(1, Some(-1)), vec![1, 2, 3]);
        assert_eq!(array.slice(-2, None), vec![3, 4]);
        assert_eq!(array.slice(-9, Some(2)), vec![0, 1]);
        assert_eq!(array.slice(3, Some(1)), Vec::<i32>::new());
        assert_eq!(array.slice(4, Some(-6)), Vec::<i32>::new());
    }

    #[test]
    fn push_unshift_and_length_match_native() {
        let runtime = Runtime::new();
        for len in [0, 1, 1000] {
            let (array, mut native) = filled(&runtime, len);

            native.push(5);
            assert_eq!(array.push(5), native.len());

            native.splice(0..0, [1, 2]);
            assert_eq!(array.unshift(vec![1, 2]), native.len());

            native.truncate(2);
            array.set_length(2);
            assert_eq!(array.to_vec(), native);

            native.resize(4, 0);
            array.set_length(4);
            assert_eq!(array.to_vec(), native);

            assert_eq!(array.pop(), native.pop());
            assert_eq!(array.shift(), Some(native.remove(0)));
            assert_eq!(array.to_vec(), native);
        }
    }

    #[test]
    fn large_splice() {
        let runtime = Runtime::new();
        let array = runtime.observable_array(Vec::<i32>::new());
        let runs = Rc::new(Cell::new(0));

        let (reader, counter) = (array.clone(), runs.clone());
        let _autorun = runtime.autorun(move || {
            reader.len();
            counter.set(counter.get() + 1);
        });

        runtime.run_in_action(|| array.splice(0, Some(0), (0..50_000).collect()));
        assert_eq!(array.len(), 50_000);
        assert_eq!(array.get(49_999), Some(49_999));

        let removed = runtime.run_in_action(|| array.splice(-25_000, None, Vec::new()));
        assert_eq!(removed.len(), 25_000);
        assert_eq!(removed[0], 25_000);
        assert_eq!(runs.get(), 3);
    }
}

mod array_reactions {
    use super::*;

    /// `reaction(() => arr.slice(), spy)` then `push(4)` calls the spy once
    /// with the new and previous copies.
    #[test]
    fn slice_reaction_sees_new_and_old_copies() {
        let runtime = Runtime::new();
        let array = runtime.observable_array(vec![1, 2, 3]);
        let calls = Rc::new(RefCell::new(Vec::new()));

        let (reader, sink) = (array.clone(), calls.clone());
        let _reaction = runtime.reaction(
            move || reader.slice(0, None),
            move |new: &Vec<i32>, old: Option<&Vec<i32>>, _: &Reaction| {
                sink.borrow_mut().push((new.clone(), old.cloned()));
            },
            ReactionOptions::default(),
        );

        runtime.run_in_action(|| array.push(4));
        assert_eq!(
            *calls.borrow(),
            vec![(vec![1, 2, 3, 4], Some(vec![1, 2, 3]))]
        );
    }

    #[test]
    fn sorting_inside_a_reaction_fails() {
        let runtime = Runtime::new();
        let array = runtime.observable_array(vec![3, 1, 2]);
        let outcome = Rc::new(RefCell::new(None));

        let (target, sink) = (array.clone(), outcome.clone());
        let _autorun = runtime.autorun(move || {
            *sink.borrow_mut() = Some(target.sort());
        });

        let result = outcome.borrow_mut().take();
        match result {
            Some(Err(Error::MutationInDerivation { method, .. })) => assert_eq!(method, "sort"),
            other => panic!("expected an in-place mutation error, got {other:?}"),
        }
        assert_eq!(array.to_vec(), vec![3, 1, 2]);
        assert_eq!(array.to_sorted(), vec![1, 2, 3]);

        array.sort().unwrap();
        assert_eq!(array.to_vec(), vec![1, 2, 3]);
    }
}

mod map_keys {
    use super::*;

    #[test]
    fn nan_and_zero_keys_behave_like_native() {
        let runtime = Runtime::new();
        let map = runtime.observable_map(Vec::<(Value, Value)>::new());

        map.set(Value::from(f64::NAN), Value::from("nan"));
        map.set(Value::from(f64::NAN), Value::from("nan again"));
        map.set(Value::from(0.0), Value::from("zero"));
        map.set(Value::from(-0.0), Value::from("negative zero"));

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&Value::from(f64::NAN)), Some(Value::from("nan again")));
        assert_eq!(map.get(&Value::from(0.0)), Some(Value::from("negative zero")));
        assert!(map.has(&Value::from(-0.0)));
        assert!(map.delete(&Value::from(-0.0)));
        assert!(!map.has(&Value::from(0.0)));
    }

    #[test]
    fn readers_of_a_missing_key_wake_when_it_is_added() {
        let runtime = Runtime::new();
        let map = runtime.observable_map([("a", 1)]);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (reader, sink) = (map.clone(), seen.clone());
        let _autorun = runtime.autorun(move || sink.borrow_mut().push(reader.get(&"b")));

        runtime.run_in_action(|| map.set("a", 2));
        runtime.run_in_action(|| map.set("b", 3));
        assert_eq!(*seen.borrow(), vec![None, Some(3)]);
    }
}

mod objects {
    use super::*;

    /// A derived prototype annotating its parent's members again keeps the
    /// parent's cells connected.
    #[test]
    fn subclass_annotations_are_idempotent() {
        let runtime = Runtime::new();
        let parent = Rc::new(Prototype::new("Animal").with_method("rename", |this, args| {
            this.set("name", args[0].clone()).ok();
            Value::Undefined
        }));
        let child = Rc::new(Prototype::new("Dog").with_parent(&parent));

        let dog = runtime.object(
            PlainObject::new()
                .with("name", "Rex")
                .with("tricks", Value::array([]))
                .with_prototype(&child),
        );
        // Parent constructor
        dog.make_observable([
            ("name", Annotation::Observable(Enhancement::Deep)),
            ("rename", Annotation::Action),
        ])
        .unwrap();
        let names = Rc::new(RefCell::new(Vec::new()));
        let (reader, sink) = (dog.clone(), names.clone());
        let _autorun = runtime.autorun(move || sink.borrow_mut().push(reader.get("name")));

        // Child constructor
        dog.make_observable([
            ("name", Annotation::Observable(Enhancement::Deep)),
            ("rename", Annotation::Action),
            ("tricks", Annotation::Observable(Enhancement::Shallow)),
        ])
        .unwrap();

        dog.call("rename", &[Value::from("Max")]);
        assert_eq!(*names.borrow(), vec![Value::from("Rex"), Value::from("Max")]);
        assert!(dog.get("tricks").is_observable_array());
        assert!(dog.is_action("rename"));
    }
}
