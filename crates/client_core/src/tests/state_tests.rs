use super::*;

#[test]
fn fetch_state_phases_follow_flags() {
    let mut state = FetchState::<u32>::default();
    assert_eq!(state.phase(), FetchPhase::Idle);

    state.begin();
    assert_eq!(state.phase(), FetchPhase::Loading);

    state.succeed(7);
    assert_eq!(state.phase(), FetchPhase::Success);
    assert_eq!(state.data, Some(7));

    state.begin();
    state.fail("boom".into());
    assert_eq!(state.phase(), FetchPhase::Failure);
    assert_eq!(state.data, Some(7), "failure keeps stale data");
}

#[test]
fn begin_clears_previous_error() {
    let mut state = FetchState::<u32>::initial(false);
    state.fail("first".into());
    state.begin();
    assert!(state.loading);
    assert_eq!(state.error, None);
}

#[test]
fn page_state_receive_replaces_or_appends() {
    let mut state = PageState::new(1);
    assert!(state.has_more);

    state.begin();
    state.receive(vec![1, 2, 3], 3, false);
    assert_eq!(state.items, vec![1, 2, 3]);
    assert!(state.has_more);
    assert!(!state.loading);

    state.receive(vec![4], 3, true);
    assert_eq!(state.items, vec![1, 2, 3, 4]);
    assert!(!state.has_more, "short page ends paging");

    state.receive(vec![9, 9, 9], 3, false);
    assert_eq!(state.items, vec![9, 9, 9]);
}

#[test]
fn dependencies_compare_by_position_and_length() {
    let a = vec![Dependency::from(1), Dependency::from("x")];
    let b = vec![Dependency::from(1), Dependency::from("x")];
    assert!(!dependencies_changed(&a, &b));

    let c = vec![Dependency::from("x"), Dependency::from(1)];
    assert!(dependencies_changed(&a, &c));

    let d = vec![Dependency::from(1)];
    assert!(dependencies_changed(&a, &d));
    assert!(dependencies_changed(&[], &d));
    assert!(!dependencies_changed(&[], &[]));
}

#[test]
fn dependency_equality_is_type_strict() {
    assert_ne!(Dependency::from(1), Dependency::from(1.0));
    assert_ne!(Dependency::from("1"), Dependency::from(1));
    assert_eq!(Dependency::from(None::<i64>), Dependency::Null);
    assert_eq!(Dependency::from(Some(true)), Dependency::Bool(true));
    assert_eq!(Dependency::from(f64::NAN), Dependency::from(f64::NAN));
}

#[test]
fn dependency_serializes_as_bare_scalar() {
    let deps = vec![
        Dependency::Null,
        Dependency::from(true),
        Dependency::from(3),
        Dependency::from("seoul"),
    ];
    let json = serde_json::to_string(&deps).expect("serialize");
    assert_eq!(json, r#"[null,true,3,"seoul"]"#);
}
