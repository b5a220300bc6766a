//! End-to-end namespace reading scenarios.

mod common;

use common::{TestNamespace, find, read_err, read_ok, read_with};
use dsdl_parser::{
    BitLengthSet, CompositeKind, ErrorKind, PrintEvent, ReadOptions, ResolvedType, Version,
};
use pretty_assertions::assert_eq;

#[test]
fn two_field_structure_has_24_bits() {
    let ns = TestNamespace::new("ns");
    ns.add(
        "Example.1.0.dsdl",
        "saturated uint8 a\nsaturated uint16 b\n@sealed\n",
    );
    let types = read_ok(&ns);
    assert_eq!(types.len(), 1);
    let message = types[0].as_message().expect("expected a message");
    assert_eq!(message.full_name(), "ns.Example");
    assert_eq!(*message.bit_length_set(), BitLengthSet::singleton(24));
}

#[test]
fn variable_array_bit_lengths() {
    let ns = TestNamespace::new("ns");
    ns.add("Blob.1.0.dsdl", "saturated uint8[<=3] data\n@sealed\n");
    let types = read_ok(&ns);
    let message = types[0].as_message().unwrap();
    assert_eq!(
        *message.bit_length_set(),
        BitLengthSet::from_lengths([2, 10, 18, 26])
    );
}

#[test]
fn constant_expression_folding() {
    let ns = TestNamespace::new("ns");
    ns.add("C.1.0.dsdl", "saturated uint8 X = 1 + 2 * 3\n@sealed\n");
    let types = read_ok(&ns);
    let message = types[0].as_message().unwrap();
    let value = message.constant_value("X").expect("constant exists");
    assert_eq!(value.as_integer().map(|v| v.to_string()), Some("7".into()));
}

#[test]
fn out_of_range_constant_is_invalid_operand() {
    let ns = TestNamespace::new("ns");
    ns.add("C.1.0.dsdl", "saturated uint8 X = 256\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::InvalidOperand);
    assert_eq!(error.line(), Some(1));
    let rendered = error.to_string();
    assert!(
        rendered.contains("C.1.0.dsdl:1: "),
        "unexpected rendering: {rendered}"
    );
}

#[test]
fn cross_reference_within_namespace() {
    let ns = TestNamespace::new("ns");
    ns.add("Point.1.0.dsdl", "float32 x\nfloat32 y\n@sealed\n");
    ns.add("Segment.1.0.dsdl", "Point.1.0 a\nPoint.1.0 b\n@sealed\n");
    let types = read_ok(&ns);
    let segment = find(&types, "ns.Segment").as_message().unwrap();
    assert_eq!(*segment.bit_length_set(), BitLengthSet::singleton(128));

    let (ty, _) = segment.fields().next().unwrap();
    let ResolvedType::Composite(point) = ty else {
        panic!("expected composite field");
    };
    assert_eq!(point.full_name(), "ns.Point");
}

#[test]
fn unversioned_reference_selects_newest() {
    let ns = TestNamespace::new("ns");
    ns.add("Item.1.0.dsdl", "saturated uint8 v\n@sealed\n");
    ns.add("Item.1.1.dsdl", "saturated uint8 v\n@sealed\n");
    ns.add("Holder.1.0.dsdl", "Item item\n@sealed\n");
    let types = read_ok(&ns);
    let holder = find(&types, "ns.Holder").as_message().unwrap();
    let (ty, _) = holder.fields().next().unwrap();
    let ResolvedType::Composite(item) = ty else {
        panic!("expected composite field");
    };
    assert_eq!(item.version(), Version { major: 1, minor: 1 });
}

#[test]
fn lookup_directories_supply_references() {
    let ns = TestNamespace::new("vehicle");
    ns.add(
        "Pose.1.0.dsdl",
        "shared.Point.1.0 position\n@sealed\n",
    );
    let shared = ns.sibling_root("shared");
    ns.add_to(&shared, "Point.1.0.dsdl", "float64 x\nfloat64 y\n@sealed\n");

    let types = read_with(&ns, &[shared], ReadOptions::default()).expect("read failed");
    // Lookup-only types are built but not returned.
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].full_name(), "vehicle.Pose");
    let pose = types[0].as_message().unwrap();
    assert_eq!(*pose.bit_length_set(), BitLengthSet::singleton(128));
}

#[test]
fn ambiguous_definition_across_roots() {
    let ns = TestNamespace::new("ns");
    ns.add("T.1.0.dsdl", "bool x\n@sealed\n");
    let other = ns.sibling_root("other/ns");
    ns.add_to(&other, "T.1.0.dsdl", "bool x\n@sealed\n");

    let error = read_with(&ns, &[other], ReadOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Naming);
    assert!(error.message().contains("ambiguous"));
}

#[test]
fn undefined_reference() {
    let ns = TestNamespace::new("ns");
    ns.add("Holder.1.0.dsdl", "Missing.1.0 m\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::UndefinedType);
    assert_eq!(error.line(), Some(1));
}

#[test]
fn bit_compatibility_across_minor_versions() {
    let ns = TestNamespace::new("ns");
    ns.add("T.1.0.dsdl", "saturated uint8 a\n@sealed\n");
    ns.add("T.1.1.dsdl", "saturated uint16 a\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::BitCompatibility);
}

#[test]
fn compatible_minor_versions_pass() {
    let ns = TestNamespace::new("ns");
    ns.add("T.1.0.dsdl", "saturated uint16 a\n@sealed\n");
    ns.add("T.1.1.dsdl", "saturated uint8 a\nsaturated uint8 b\n@sealed\n");
    ns.add("T.2.0.dsdl", "saturated uint64 a\n@sealed\n");
    let types = read_ok(&ns);
    assert_eq!(types.len(), 3);
}

#[test]
fn unregulated_port_id_needs_the_flag() {
    let ns = TestNamespace::new("ns");
    ns.add("125.P.1.0.dsdl", "bool x\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::PortId);

    let options = ReadOptions {
        allow_unregulated_fixed_port_id: true,
        ..Default::default()
    };
    let types = read_with(&ns, &[], options).expect("read failed");
    assert_eq!(types[0].fixed_port_id(), Some(125));
}

#[test]
fn regulated_port_id_is_accepted() {
    let ns = TestNamespace::new("ns");
    ns.add("7509.Heartbeat.1.0.dsdl", "saturated uint32 uptime\n@sealed\n");
    let types = read_ok(&ns);
    assert_eq!(types[0].fixed_port_id(), Some(7509));
}

#[test]
fn port_id_collision_between_names() {
    let ns = TestNamespace::new("ns");
    ns.add("7509.A.1.0.dsdl", "bool x\n@sealed\n");
    ns.add("7509.B.1.0.dsdl", "bool x\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::PortId);
    assert!(error.message().contains("used by both"));
}

#[test]
fn same_major_versions_must_agree_on_port_id() {
    let ns = TestNamespace::new("ns");
    ns.add("7509.T.1.0.dsdl", "bool x\n@sealed\n");
    ns.add("T.1.1.dsdl", "bool x\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::Version);
}

#[test]
fn dependency_cycle_terminates_with_an_error() {
    let ns = TestNamespace::new("ns");
    ns.add("A.1.0.dsdl", "B.1.0 b\n@sealed\n");
    ns.add("B.1.0.dsdl", "A.1.0 a\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::CyclicDependency);
    assert!(error.message().contains("cycle"));
}

#[test]
fn self_reference_is_a_cycle() {
    let ns = TestNamespace::new("ns");
    ns.add("A.1.0.dsdl", "A.1.0 a\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::CyclicDependency);
}

#[test]
fn service_definition() {
    let ns = TestNamespace::new("ns");
    ns.add(
        "300.GetStatus.1.0.dsdl",
        "saturated uint8 subsystem\n@sealed\n---\nbool healthy\nsaturated uint32 uptime\n@sealed\n",
    );
    let types = read_ok(&ns);
    let service = types[0].as_service().expect("expected a service");
    assert_eq!(service.full_name(), "ns.GetStatus");
    assert_eq!(service.fixed_port_id(), Some(300));
    assert_eq!(
        *service.request().bit_length_set(),
        BitLengthSet::singleton(8)
    );
    assert_eq!(
        *service.response().bit_length_set(),
        BitLengthSet::singleton(33)
    );
}

#[test]
fn service_cannot_be_a_field_type() {
    let ns = TestNamespace::new("ns");
    ns.add("300.Svc.1.0.dsdl", "bool q\n@sealed\n---\nbool r\n@sealed\n");
    ns.add("User.1.0.dsdl", "Svc.1.0 s\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::Semantic);
    assert!(error.message().contains("service"));
}

#[test]
fn union_end_to_end() {
    let ns = TestNamespace::new("ns");
    ns.add(
        "Either.1.0.dsdl",
        "@union\nsaturated uint8 small\nsaturated uint32 large\n@sealed\n",
    );
    let types = read_ok(&ns);
    let message = types[0].as_message().unwrap();
    assert_eq!(message.kind(), CompositeKind::Union);
    assert_eq!(
        *message.bit_length_set(),
        BitLengthSet::from_lengths([9, 33])
    );
}

#[test]
fn print_directive_reaches_the_handler() {
    let ns = TestNamespace::new("ns");
    ns.add("P.1.0.dsdl", "@print 6 * 7\n@sealed\n");

    let mut events: Vec<(String, usize)> = Vec::new();
    let mut handler = |event: PrintEvent<'_>| {
        assert!(event.path.ends_with("P.1.0.dsdl"));
        events.push((event.text.to_string(), event.line));
    };
    let options = ReadOptions {
        print_handler: Some(&mut handler),
        ..Default::default()
    };
    read_with(&ns, &[], options).expect("read failed");
    assert_eq!(events, vec![("42".to_string(), 1)]);
}

#[test]
fn deprecation_warning_is_routed_not_fatal() {
    let ns = TestNamespace::new("ns");
    ns.add("Old.1.0.dsdl", "@deprecated\nbool x\n@sealed\n");
    ns.add("User.1.0.dsdl", "Old.1.0 old\n@sealed\n");

    let mut warnings = Vec::new();
    let mut handler = |event: PrintEvent<'_>| warnings.push(event.text.to_string());
    let options = ReadOptions {
        print_handler: Some(&mut handler),
        ..Default::default()
    };
    let types = read_with(&ns, &[], options).expect("read failed");
    assert_eq!(types.len(), 2);
    assert!(find(&types, "ns.Old").is_deprecated());
    assert!(!find(&types, "ns.User").is_deprecated());
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("deprecated"));
}

#[test]
fn deprecated_type_referencing_deprecated_is_quiet() {
    let ns = TestNamespace::new("ns");
    ns.add("Old.1.0.dsdl", "@deprecated\nbool x\n@sealed\n");
    ns.add("AlsoOld.1.0.dsdl", "@deprecated\nOld.1.0 old\n@sealed\n");

    let mut warnings = Vec::new();
    let mut handler = |event: PrintEvent<'_>| warnings.push(event.text.to_string());
    let options = ReadOptions {
        print_handler: Some(&mut handler),
        ..Default::default()
    };
    read_with(&ns, &[], options).expect("read failed");
    assert!(warnings.is_empty());
}

#[test]
fn elevated_deprecation_warning_aborts() {
    let ns = TestNamespace::new("ns");
    ns.add("Old.1.0.dsdl", "@deprecated\nbool x\n@sealed\n");
    ns.add("User.1.0.dsdl", "Old.1.0 old\n@sealed\n");

    let options = ReadOptions {
        elevate_deprecation_warnings: true,
        ..Default::default()
    };
    let error = read_with(&ns, &[], options).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::DeprecationWarningElevated);
}

#[test]
fn nested_namespace_directories_extend_the_name() {
    let ns = TestNamespace::new("vehicle");
    ns.add("geo/Point.1.0.dsdl", "float32 x\nfloat32 y\n@sealed\n");
    let types = read_ok(&ns);
    assert_eq!(types[0].full_name(), "vehicle.geo.Point");
}

#[test]
fn hidden_and_underscored_entries_are_ignored() {
    let ns = TestNamespace::new("ns");
    ns.add("T.1.0.dsdl", "bool x\n@sealed\n");
    ns.add(".hidden/Bad.1.0.dsdl", "this is not DSDL\n");
    ns.add("_draft/Bad.1.0.dsdl", "this is not DSDL either\n");
    ns.add(".Hidden.1.0.dsdl", "nor this\n");
    ns.add("notes.txt", "free-form notes");
    let types = read_ok(&ns);
    assert_eq!(types.len(), 1);
}

#[test]
fn empty_namespace_is_permitted() {
    let ns = TestNamespace::new("ns");
    let types = read_ok(&ns);
    assert!(types.is_empty());
}

#[test]
fn parse_error_carries_path_and_line() {
    let ns = TestNamespace::new("ns");
    ns.add("T.1.0.dsdl", "bool ok\nsaturated uint8 a b\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::Parse);
    assert_eq!(error.line(), Some(2));
    assert!(error.path().unwrap().ends_with("T.1.0.dsdl"));
}

#[test]
fn error_from_referenced_definition_keeps_its_location() {
    let ns = TestNamespace::new("ns");
    ns.add("Broken.1.0.dsdl", "bool ok\nsaturated uint8 X = 999\n@sealed\n");
    ns.add("User.1.0.dsdl", "Broken.1.0 b\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::InvalidOperand);
    assert!(error.path().unwrap().ends_with("Broken.1.0.dsdl"));
    assert_eq!(error.line(), Some(2));
}

#[test]
fn delimited_composite_contributes_its_envelope() {
    let ns = TestNamespace::new("ns");
    ns.add("Inner.1.0.dsdl", "saturated uint8 v\n@extent 16\n");
    ns.add("Outer.1.0.dsdl", "Inner.1.0 inner\n@sealed\n");
    let types = read_ok(&ns);
    let outer = find(&types, "ns.Outer").as_message().unwrap();
    // 32-bit delimiter header plus 0, 8, or 16 bits of payload.
    assert_eq!(
        *outer.bit_length_set(),
        BitLengthSet::from_lengths([32, 40, 48])
    );
}

#[test]
fn misaligned_composite_field_is_rejected() {
    let ns = TestNamespace::new("ns");
    ns.add("Inner.1.0.dsdl", "bool flag\n@sealed\n");
    ns.add("Outer.1.0.dsdl", "bool leading\nInner.1.0 inner\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::Semantic);
    assert!(error.message().contains("byte-aligned"));
    assert_eq!(error.line(), Some(2));

    // Padding restores alignment.
    let ns = TestNamespace::new("ns");
    ns.add("Inner.1.0.dsdl", "bool flag\n@sealed\n");
    ns.add(
        "Outer.1.0.dsdl",
        "bool leading\nvoid7\nInner.1.0 inner\n@sealed\n",
    );
    read_ok(&ns);
}

#[test]
fn duplicate_definition_in_one_root() {
    let ns = TestNamespace::new("ns");
    ns.add("T.1.0.dsdl", "bool x\n@sealed\n");
    ns.add("T.1.0.uavcan", "bool x\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::Naming);
    assert!(error.message().contains("more than once"));
}

#[test]
fn output_is_sorted_by_name_and_version() {
    let ns = TestNamespace::new("ns");
    ns.add("Zeta.1.0.dsdl", "bool x\n@sealed\n");
    ns.add("Alpha.1.1.dsdl", "bool x\n@sealed\n");
    ns.add("Alpha.1.0.dsdl", "bool x\n@sealed\n");
    let types = read_ok(&ns);
    let names: Vec<String> = types
        .iter()
        .map(|t| format!("{}.{}", t.full_name(), t.version()))
        .collect();
    assert_eq!(names, vec!["ns.Alpha.1.0", "ns.Alpha.1.1", "ns.Zeta.1.0"]);
}

#[test]
fn version_zero_zero_is_rejected() {
    let ns = TestNamespace::new("ns");
    ns.add("T.0.0.dsdl", "bool x\n@sealed\n");
    let error = read_err(&ns);
    assert_eq!(error.kind(), ErrorKind::Version);
}

#[test]
fn invariants_hold_for_every_built_type() {
    let ns = TestNamespace::new("ns");
    ns.add("Point.1.0.dsdl", "float32 x\nfloat32 y\n@sealed\n");
    ns.add("Blob.1.0.dsdl", "saturated uint8[<=5] data\n@sealed\n");
    ns.add(
        "Choice.1.0.dsdl",
        "@union\nPoint.1.0 point\nBlob.1.0 blob\n@sealed\n",
    );
    let types = read_ok(&ns);
    for definition in &types {
        let message = definition.as_message().unwrap();
        let set = message.bit_length_set();
        assert!(set.min() <= set.max());
        assert!(message.extent() >= set.max());
    }
}

#[test]
fn type_display_round_trips_through_the_grammar() {
    // The rendered form of every field type is itself a valid reference
    // that resolves to an equal type.
    let sources = [
        "uint8",
        "saturated uint8",
        "truncated int64",
        "saturated float16",
        "bool",
        "byte",
        "utf8",
        "saturated uint8[<=3]",
        "truncated uint64[4]",
        "saturated float32[<100]",
    ];
    for source in sources {
        let ns = TestNamespace::new("ns");
        ns.add("T.1.0.dsdl", &format!("{source} x\n@sealed\n"));
        let types = read_ok(&ns);
        let message = types[0].as_message().unwrap();
        let (ty, _) = message.fields().next().unwrap();
        let rendered = ty.to_string();

        let ns2 = TestNamespace::new("ns");
        ns2.add("T.1.0.dsdl", &format!("{rendered} x\n@sealed\n"));
        let types2 = read_ok(&ns2);
        let message2 = types2[0].as_message().unwrap();
        let (ty2, _) = message2.fields().next().unwrap();
        assert_eq!(ty, ty2, "display form {rendered:?} did not round-trip");
    }
}
