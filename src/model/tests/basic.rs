use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use pretty_assertions::assert_eq;

use super::{counted_sum, runs, sum};
use crate::{Error, Formula, Member, Model, Node, Owner, Value};

// Emulate this spreadsheet:
//      A
// 1 [ =x ]
// 2 [ =A1 + 1 ]
// 3 [ =A2 + A1 ]
fn spreadsheet() -> (Model, [crate::CellId; 3], crate::RefId) {
    let mut model = Model::new("Model1").unwrap();
    let space = model.new_space(Owner::Model, "Sheet").unwrap();
    let x = model.set_ref(space, "x", 20).unwrap();
    let a1 = model.new_cell(space, "a1", sum(&["x"])).unwrap();
    let a2 = model
        .new_cell(space, "a2", Formula::nullary(|scope| Ok(Value::Int(scope.get("a1")?.as_int()? + 1))))
        .unwrap();
    let a3 = model.new_cell(space, "a3", sum(&["a2", "a1"])).unwrap();
    (model, [a1, a2, a3], x)
}

#[test]
fn basic() {
    let (mut model, [a1, a2, a3], x) = spreadsheet();
    assert_eq!(model.call(a3, &[]).unwrap(), Value::Int(41));

    assert_eq!(model.precedents(&Node::cell(a3, Vec::<Value>::new())), vec![
        Node::cell(a2, Vec::<Value>::new()),
        Node::cell(a1, Vec::<Value>::new()),
    ]);
    assert_eq!(model.precedents(&Node::cell(a1, Vec::<Value>::new())), vec![Node::Ref(x)]);
    model.check_consistency();
}

#[test]
fn no_recompute_basic() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut model = Model::new("Model1").unwrap();
    let space = model.new_space(Owner::Model, "Space1").unwrap();
    model.set_ref(space, "x", 1).unwrap();
    let total = model.new_cell(space, "total", counted_sum(&counter, &["x", "x"])).unwrap();

    assert_eq!(model.call(total, &[]).unwrap(), Value::Int(2));
    assert_eq!(model.call(total, &[]).unwrap(), Value::Int(2));
    assert_eq!(runs(&counter), 1);
}

#[test]
fn updating_a_reference_clears_only_its_dependents() {
    let (mut model, [a1, a2, a3], _) = spreadsheet();
    let space = model.cell_space(a1).unwrap();
    model.set_ref(space, "y", 5).unwrap();
    let other = model.new_cell(space, "other", sum(&["y"])).unwrap();

    model.call(a3, &[]).unwrap();
    model.call(other, &[]).unwrap();

    model.set_ref(space, "x", 1).unwrap();
    assert!(!model.is_cached(a1, &[]));
    assert!(!model.is_cached(a2, &[]));
    assert!(!model.is_cached(a3, &[]));
    assert!(model.is_cached(other, &[]));

    assert_eq!(model.call(a3, &[]).unwrap(), Value::Int(3));
    model.check_consistency();
}

#[test]
fn precedents_are_deduplicated_in_first_read_order() {
    let mut model = Model::new("Model1").unwrap();
    let space = model.new_space(Owner::Model, "Space1").unwrap();
    let x = model.set_ref(space, "x", 1).unwrap();
    let y = model.set_ref(space, "y", 2).unwrap();
    let cell = model.new_cell(space, "cell", sum(&["y", "x", "y"])).unwrap();

    assert_eq!(model.call(cell, &[]).unwrap(), Value::Int(5));
    assert_eq!(model.precedents(&Node::cell(cell, Vec::<Value>::new())), vec![Node::Ref(y), Node::Ref(x)]);
}

#[test]
fn parameterized_cells_cache_each_argument_tuple() {
    let mut model = Model::new("Model1").unwrap();
    let space = model.new_space(Owner::Model, "Space1").unwrap();
    let double = model
        .new_cell(space, "double", Formula::new(["x"], |scope| Ok(Value::Int(scope.arg("x")?.as_int()? * 2))))
        .unwrap();

    assert_eq!(model.call(double, &[Value::Int(3)]).unwrap(), Value::Int(6));
    assert_eq!(model.call(double, &[Value::Int(4)]).unwrap(), Value::Int(8));
    assert!(model.is_cached(double, &[Value::Int(3)]));
    assert!(!model.is_cached(double, &[Value::Float(3.0)]));
    assert_eq!(model.graph().len(), 2);
}

#[test]
fn assigned_values_act_as_inputs() {
    let mut model = Model::new("Model1").unwrap();
    let space = model.new_space(Owner::Model, "Space1").unwrap();
    let input = model.new_cell(space, "input", Formula::new(["i"], |_| Ok(Value::None))).unwrap();
    let uses = model
        .new_cell(space, "uses", Formula::nullary(|scope| {
            Ok(Value::Int(scope.call("input", &[Value::Int(1)])?.as_int()? + 1))
        }))
        .unwrap();

    model.set_value(input, &[Value::Int(1)], Value::Int(10)).unwrap();
    assert_eq!(model.call(uses, &[]).unwrap(), Value::Int(11));

    model.set_value(input, &[Value::Int(1)], Value::Int(20)).unwrap();
    assert!(!model.is_cached(uses, &[]));
    assert_eq!(model.call(uses, &[]).unwrap(), Value::Int(21));

    let err = model.set_value(input, &[], Value::Int(0)).unwrap_err();
    assert!(matches!(err, Error::ArgumentCount { expected: 1, found: 0, .. }));
    model.check_consistency();
}

#[test]
fn redefining_a_cell_keeps_its_identity() {
    let (mut model, [a1, a2, a3], _) = spreadsheet();
    let space = model.cell_space(a1).unwrap();
    model.call(a3, &[]).unwrap();

    let redefined = model.new_cell(space, "a1", Formula::constant(100)).unwrap();
    assert_eq!(redefined, a1);
    assert!(!model.is_cached(a2, &[]));
    assert!(!model.is_cached(a3, &[]));
    assert_eq!(model.call(a3, &[]).unwrap(), Value::Int(201));
}

#[test]
fn deleting_a_cell_clears_its_dependents() {
    let (mut model, [a1, a2, a3], _) = spreadsheet();
    let space = model.cell_space(a1).unwrap();
    model.call(a3, &[]).unwrap();

    model.delete(space, "a1").unwrap();
    assert!(!model.is_cached(a2, &[]));
    assert!(!model.is_cached(a3, &[]));
    assert!(matches!(model.call(a1, &[]), Err(Error::Deleted(_))));
    assert_eq!(
        model.call(a3, &[]).unwrap_err(),
        Error::NameResolution {
            name: "a1".to_string(),
            scope: "space 'Sheet'".to_string(),
        }
    );
    model.check_consistency();
}

#[test]
fn names_resolve_through_enclosing_spaces_and_globals() {
    let mut model = Model::new("Model1").unwrap();
    let outer = model.new_space(Owner::Model, "Outer").unwrap();
    let inner = model.new_space(outer, "Inner").unwrap();
    model.set_ref(Owner::Model, "rate", 3).unwrap();
    model.set_ref(outer, "x", 4).unwrap();
    let product = model
        .new_cell(inner, "product", Formula::nullary(|scope| {
            Ok(Value::Int(scope.get("x")?.as_int()? * scope.get("rate")?.as_int()?))
        }))
        .unwrap();

    assert_eq!(model.call(product, &[]).unwrap(), Value::Int(12));

    // A closer definition shadows the outer one from now on.
    model.set_ref(inner, "x", 10).unwrap();
    assert!(!model.is_cached(product, &[]));
    assert_eq!(model.call(product, &[]).unwrap(), Value::Int(30));

    model.set_ref(Owner::Model, "rate", 1).unwrap();
    assert_eq!(model.call(product, &[]).unwrap(), Value::Int(10));
    model.check_consistency();
}

#[test]
fn objects_are_found_by_dotted_path() {
    let mut model = Model::new("Model1").unwrap();
    let outer = model.new_space(Owner::Model, "Outer").unwrap();
    let inner = model.new_space(outer, "Inner").unwrap();
    let x = model.set_ref(inner, "x", 4).unwrap();
    let cell = model.new_cell(inner, "cell", sum(&["x"])).unwrap();

    assert_eq!(model.get_object("Outer.Inner").unwrap(), Member::Space(inner));
    assert_eq!(model.get_object("Outer.Inner.x").unwrap(), Member::Ref(x));
    assert_eq!(model.qualified_name(Member::Cell(cell)).unwrap(), "Outer.Inner.cell");
    assert_eq!(model.value("Outer.Inner.cell").unwrap(), Value::Int(4));
    assert_eq!(model.describe(&Node::cell(cell, [1, 2])), "Outer.Inner.cell(1, 2)");
}

#[test]
fn anonymous_spaces_take_the_first_free_name() {
    let mut model = Model::new("Model1").unwrap();
    let first = model.new_anonymous_space(Owner::Model).unwrap();
    model.new_space(Owner::Model, "Space2").unwrap();
    let third = model.new_anonymous_space(Owner::Model).unwrap();

    assert_eq!(model.space_name(first).unwrap(), "Space1");
    assert_eq!(model.space_name(third).unwrap(), "Space3");
    let names: Vec<&str> = model.spaces().map(|(name, _)| name).collect();
    assert_eq!(names, ["Space1", "Space2", "Space3"]);
}

#[test]
fn unresolved_symbols_are_reported() {
    let mut model = Model::new("Model1").unwrap();
    let space = model.new_space(Owner::Model, "Space1").unwrap();
    model.set_ref(space, "x", 1).unwrap();
    let cell = model
        .new_cell(space, "cell", Formula::new(["i"], |_| Ok(Value::None)).with_symbols(["i", "x", "y", "Space1.x"]))
        .unwrap();

    assert_eq!(model.unresolved_symbols(cell).unwrap(), ["y"]);
}
