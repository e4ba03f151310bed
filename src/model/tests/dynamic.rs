use pretty_assertions::assert_eq;

use crate::{ChildSpec, DerivingRule, Error, Formula, Member, Model, Owner, SpaceId, Value};

/// `Policy` derives `PolicyN` instances inheriting from `Term`, whose
/// `premium` reads the instance's `id` and the archetype's `rate`.
fn policies() -> (Model, SpaceId, SpaceId) {
    let mut model = Model::new("Model1").unwrap();
    let term = model.new_space(Owner::Model, "Term").unwrap();
    let policy = model.new_space(Owner::Model, "Policy").unwrap();
    model
        .new_cell(term, "premium", Formula::nullary(|scope| {
            Ok(Value::Int(scope.get("id")?.as_int()? * scope.get("rate")?.as_int()?))
        }))
        .unwrap();
    model.set_ref(policy, "rate", 10).unwrap();
    model
        .set_rule(
            policy,
            Some(DerivingRule::new(["id"], move |scope| {
                let id = scope.arg("id")?.as_int()?;
                Ok(ChildSpec::new(format!("Policy{id}"), [term]))
            })),
        )
        .unwrap();
    (model, term, policy)
}

#[test]
fn instances_are_created_once_per_argument_tuple() {
    let (mut model, term, policy) = policies();
    let first = model.item(policy, &[Value::Int(1)]).unwrap();

    assert_eq!(model.item(policy, &[Value::Int(1)]).unwrap(), first);
    assert_ne!(model.item(policy, &[Value::Int(2)]).unwrap(), first);
    assert_eq!(model.space_name(first).unwrap(), "Policy1");
    assert_eq!(model.parent(first).unwrap(), Some(policy));
    assert_eq!(model.bases(first).unwrap(), [term]);
    assert_eq!(model.instance_args(first).unwrap(), Some(&[Value::Int(1)][..]));
    assert_eq!(model.instance_args(policy).unwrap(), None);
    assert_eq!(model.get_object("Policy.Policy1").unwrap(), Member::Space(first));
    assert_eq!(model.value("Policy.Policy1.id").unwrap(), Value::Int(1));
}

#[test]
fn instances_see_their_arguments_and_the_archetype() {
    let (mut model, _, policy) = policies();
    let second = model.item(policy, &[Value::Int(2)]).unwrap();

    assert_eq!(model.value("Policy.Policy2.premium").unwrap(), Value::Int(20));
    let Member::Cell(premium) = model.get(second, "premium").unwrap() else {
        panic!("premium should be a cell");
    };
    assert!(model.is_derived(premium).unwrap());

    model.set_ref(policy, "rate", 3).unwrap();
    assert!(!model.is_cached(premium, &[]));
    assert_eq!(model.call(premium, &[]).unwrap(), Value::Int(6));
    model.check_consistency();
}

#[test]
fn formulas_can_create_and_read_instances() {
    let (mut model, _, policy) = policies();
    let portfolio = model.new_space(Owner::Model, "Portfolio").unwrap();
    let total = model
        .new_cell(portfolio, "total", Formula::new(["n"], |scope| {
            let n = scope.arg("n")?.as_int()?;
            let mut total = 0;
            for id in 1..=n {
                let policy = scope.item("Policy", &[Value::Int(id)])?;
                total += scope.get_in(policy, "premium")?.as_int()?;
            }
            Ok(Value::Int(total))
        }))
        .unwrap();

    assert_eq!(model.call(total, &[Value::Int(3)]).unwrap(), Value::Int(60));

    model.set_ref(policy, "rate", 1).unwrap();
    assert!(!model.is_cached(total, &[Value::Int(3)]));
    assert_eq!(model.call(total, &[Value::Int(3)]).unwrap(), Value::Int(6));
    model.check_consistency();
}

#[test]
fn instance_names_are_reserved_on_the_archetype() {
    let (mut model, _, policy) = policies();
    let first = model.item(policy, &[Value::Int(1)]).unwrap();
    let taken = Error::DuplicateName {
        name: "Policy1".to_string(),
        scope: "space 'Policy'".to_string(),
    };

    assert_eq!(model.new_space(policy, "Policy1").unwrap_err(), taken);
    assert_eq!(model.new_cell(policy, "Policy1", Formula::constant(0)).unwrap_err(), taken);
    assert_eq!(model.set_ref(policy, "Policy1", 0).unwrap_err(), taken);
    assert_eq!(model.get_object("Policy.Policy1").unwrap(), Member::Space(first));

    // Other names are still free.
    model.new_space(policy, "Policy2").unwrap();
    assert!(matches!(model.item(policy, &[Value::Int(2)]), Err(Error::DuplicateName { .. })));
}

#[test]
fn replacing_the_rule_deletes_instances() {
    let (mut model, _, policy) = policies();
    let first = model.item(policy, &[Value::Int(1)]).unwrap();
    model.value("Policy.Policy1.premium").unwrap();

    model.set_rule(policy, None).unwrap();
    assert!(matches!(model.space_name(first), Err(Error::Deleted(_))));
    assert!(matches!(model.get_object("Policy.Policy1"), Err(Error::NameResolution { .. })));
    assert!(matches!(model.item(policy, &[Value::Int(1)]), Err(Error::NoDerivingRule { .. })));
    model.check_consistency();
}

#[test]
fn rule_errors() {
    let (mut model, _, policy) = policies();
    assert!(matches!(model.item(policy, &[]), Err(Error::ArgumentCount { expected: 1, found: 0, .. })));

    model
        .set_rule(policy, Some(DerivingRule::new(["id"], |_| Ok(ChildSpec::new("Same", [])))))
        .unwrap();
    model.item(policy, &[Value::Int(1)]).unwrap();
    assert_eq!(
        model.item(policy, &[Value::Int(2)]).unwrap_err(),
        Error::DuplicateName {
            name: "Same".to_string(),
            scope: "space 'Policy'".to_string(),
        }
    );

    model
        .set_rule(policy, Some(DerivingRule::new(["id"], |_| Ok(ChildSpec::new("rate", [])))))
        .unwrap();
    assert!(matches!(model.item(policy, &[Value::Int(1)]), Err(Error::DuplicateName { .. })));
}
