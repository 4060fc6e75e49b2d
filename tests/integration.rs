// Integration tests for dfilter: end-to-end compilation and evaluation

use dfilter::*;
use proptest::prelude::*;
use std::sync::Arc;

fn make_schema() -> FilterSchema {
    FilterSchemaBuilder::new()
        .field("ip.addr", FieldType::Ipv4)
        .field("ipv6.addr", FieldType::Ipv6)
        .field("tcp.port", FieldType::UInt16)
        .field("tcp.flags", FieldType::UInt8)
        .field("tcp.seq", FieldType::UInt32)
        .field("frame", FieldType::Bytes)
        .field("frame.time", FieldType::AbsoluteTime)
        .field("frame.time_delta", FieldType::RelativeTime)
        .field("rtp.jitter", FieldType::Float)
        .field("eth.src", FieldType::Ether)
        .field("http.host", FieldType::String)
        .field("http.request", FieldType::Bool)
        .descriptor(FieldDescriptor::new("ip.proto", FieldType::UInt8).with_value_names([(6, "TCP"), (17, "UDP")]))
        .build()
}

fn ipv4(text: &str) -> FieldValue {
    FieldType::Ipv4.parse_value(text).expect("ipv4")
}

/// Packet A: two IPv4 addresses and one TCP port.
fn packet_a(schema: &FilterSchema) -> FilterContext {
    let mut ctx = FilterContext::new();
    ctx.set("ip.addr", ipv4("10.0.0.1"), Some(ByteRange::new(26, 4)), schema).unwrap();
    ctx.set("ip.addr", ipv4("10.0.0.2"), Some(ByteRange::new(30, 4)), schema).unwrap();
    ctx.set("tcp.port", FieldValue::UInt(443), Some(ByteRange::new(36, 2)), schema).unwrap();
    ctx
}

fn eval(text: &str, ctx: &FilterContext) -> bool {
    let schema = make_schema();
    compile(text, &schema)
        .unwrap_or_else(|e| panic!("{}", e.render(text)))
        .evaluate(ctx)
}

#[test]
fn test_packet_a_scenario() {
    let schema = make_schema();
    let ctx = packet_a(&schema);
    assert!(eval("ip.addr == 10.0.0.2 && tcp.port == 443", &ctx));
    assert!(!eval("ip.addr == 10.0.0.9", &ctx));
    assert!(eval("tcp.port == 80 || tcp.port == 443", &ctx));
}

#[test]
fn test_existential_semantics() {
    let schema = make_schema();
    let mut ctx = FilterContext::new();
    for port in [5, 10, 15] {
        ctx.set("tcp.port", FieldValue::UInt(port), None, &schema).unwrap();
    }
    assert!(eval("tcp.port == 10", &ctx));
    assert!(eval("tcp.port == 10 && tcp.port == 5", &ctx));
    assert!(!eval("tcp.port == 99", &ctx));
    assert!(eval("tcp.port != 10", &ctx));
    assert!(!eval("!(tcp.port == 10)", &ctx));
}

#[test]
fn test_unknown_field_span() {
    let schema = make_schema();
    let err = compile("nonexistent.field == 1", &schema).unwrap_err();
    assert!(matches!(err, CompileError::UnknownField { .. }));
    assert_eq!(err.location(), Location::new(0, 17));

    let err = compile("tcp.port == 1 && nonexistent.field", &schema).unwrap_err();
    assert_eq!(err.location(), Location::new(17, 17));
}

#[test]
fn test_quoted_literal_reparsed() {
    let schema = make_schema();
    let ctx = packet_a(&schema);
    let quoted = compile("tcp.port == \"443\"", &schema).unwrap();
    let plain = compile("tcp.port == 443", &schema).unwrap();
    assert_eq!(quoted.evaluate(&ctx), plain.evaluate(&ctx));
    assert_eq!(quoted.program().constants(), plain.program().constants());

    let err = compile("tcp.port == \"http\"", &schema).unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
    let err = compile("tcp.port == 70000", &schema).unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}

#[test]
fn test_negative_slice_from_end() {
    let schema = make_schema();
    let mut ctx = FilterContext::new();
    ctx.set("frame", FieldValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]), Some(ByteRange::new(0, 4)), &schema)
        .unwrap();
    assert!(compile("frame[0:-1]", &schema).is_ok());
    assert!(eval("frame[0:-1] == de:ad:be", &ctx));
    assert!(eval("frame[-2:] == be:ef", &ctx));
    assert!(eval("frame[1:+2] == ad:be", &ctx));
    assert!(eval("frame[0, 3] == de:ef", &ctx));
}

#[test]
fn test_negative_slice_rejected() {
    let schema = make_schema();
    let engine = FilterEngine::new(&schema)
        .with_options(CompileOptions::new().slice_indices(SliceIndexMode::Reject));
    let err = engine.compile("frame[0:-1]").unwrap_err();
    assert!(matches!(err, CompileError::Range { .. }));
    assert!(engine.compile("frame[0:3]").is_ok());

    // zero-length slices are rejected in both modes
    assert!(matches!(compile("frame[2:+0]", &schema), Err(CompileError::Range { .. })));
    assert!(matches!(compile("frame[3:1]", &schema), Err(CompileError::Range { .. })));
}

#[test]
fn test_slice_out_of_bounds_is_false() {
    let schema = make_schema();
    let mut ctx = FilterContext::new();
    ctx.set("frame", FieldValue::Bytes(vec![1, 2]), None, &schema).unwrap();
    ctx.set("frame", FieldValue::Bytes(vec![1, 2, 3, 4, 5]), None, &schema).unwrap();
    assert!(eval("frame[4] == 05", &ctx));
    assert!(!eval("frame[8] == 05", &ctx));
    assert!(!eval("frame[8]", &ctx));
}

#[test]
fn test_error_kinds() {
    let schema = make_schema();
    let cases = [
        ("tcp.port == $", "lexical"),
        ("tcp.port = 80", "lexical"),
        ("tcp.port ==", "syntax"),
        ("(tcp.port == 80", "syntax"),
        ("1 < tcp.port < 5", "syntax"),
        ("", "syntax"),
        ("frame < 01:02", "type"),
        ("http.host & 1", "type"),
        ("http.request contains 1", "type"),
        ("len(frame, frame) == 1", "arity"),
        ("abs(http.host) == 1", "arity"),
        ("tcp.port in {10..1}", "range"),
    ];
    for (text, kind) in cases {
        let err = compile(text, &schema).expect_err(text);
        let ok = match kind {
            "lexical" => matches!(err, CompileError::Lexical { .. }),
            "syntax" => matches!(err, CompileError::Syntax { .. }),
            "type" => matches!(err, CompileError::TypeMismatch { .. }),
            "arity" => matches!(err, CompileError::Arity { .. }),
            "range" => matches!(err, CompileError::Range { .. }),
            _ => unreachable!(),
        };
        assert!(ok, "{text}: expected {kind} error, got {err:?}");
    }
}

#[test]
fn test_error_render() {
    let schema = make_schema();
    let text = "tcp.port == 1 && bogus.field";
    let rendered = compile(text, &schema).unwrap_err().render(text);
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[1], text);
    assert_eq!(lines[2], format!("{}^{}", " ".repeat(17), "~".repeat(10)));
}

#[test]
fn test_value_kinds() {
    let schema = make_schema();
    let mut ctx = FilterContext::new();
    ctx.set("eth.src", FieldType::Ether.parse_value("00:1a:2b:3c:4d:5e").unwrap(), None, &schema)
        .unwrap();
    ctx.set("ipv6.addr", FieldType::Ipv6.parse_value("2001:db8::1").unwrap(), None, &schema)
        .unwrap();
    ctx.set("frame.time_delta", FieldType::RelativeTime.parse_value("0.25").unwrap(), None, &schema)
        .unwrap();
    ctx.set("http.request", FieldValue::Bool(true), None, &schema).unwrap();
    ctx.set("ip.proto", FieldValue::UInt(6), None, &schema).unwrap();

    assert!(eval("eth.src == 00-1a-2b-3c-4d-5e", &ctx));
    assert!(eval("eth.src == 001a.2b3c.4d5e", &ctx));
    assert!(eval("ipv6.addr == 2001:db8::/32", &ctx));
    assert!(eval("frame.time_delta > 0.1 && frame.time_delta < 1", &ctx));
    assert!(eval("http.request == true", &ctx));
    assert!(eval("ip.proto == TCP", &ctx));
    assert!(eval("ip.proto in {TCP UDP}", &ctx));
    assert!(!eval("ip.proto == udp", &ctx));
}

#[test]
fn test_oversized_time_literal_is_an_error() {
    let schema = make_schema();
    let huge = "9".repeat(33);
    for text in [
        format!("frame.time_delta == {huge}"),
        format!("frame.time_delta > -{huge}.5"),
        format!("frame.time == {huge}"),
    ] {
        match compile(&text, &schema) {
            Err(CompileError::TypeMismatch { .. }) => {}
            other => panic!("{text}: unexpected {other:?}"),
        }
    }
}

#[test]
fn test_float_exponents() {
    let schema = make_schema();
    let mut ctx = FilterContext::new();
    ctx.set("rtp.jitter", FieldValue::Float(150_000.0), None, &schema).unwrap();
    assert!(eval("rtp.jitter == 1.5e+5", &ctx));
    assert!(eval("rtp.jitter > 1e+3 && rtp.jitter < 2E+5", &ctx));
    assert!(eval("rtp.jitter in {1e-3..1.5e+5}", &ctx));
    assert!(!eval("rtp.jitter > -1.5e+6 && rtp.jitter > 1.5e+6", &ctx));
}

#[test]
fn test_empty_slices_from_end() {
    let schema = make_schema();
    let mut one = FilterContext::new();
    one.set("frame", FieldValue::Bytes(vec![0xaa]), None, &schema).unwrap();
    assert!(eval("frame[0:-1]", &one));
    assert!(eval("frame[0:-1] == \"\"", &one));
    assert!(eval("len(frame[0:-1]) == 0", &one));
    assert!(!eval("frame[0:-1] == aa", &one));
    assert!(eval("frame[1:] == \"\"", &one));
    assert!(eval("frame[-1:] == aa", &one));
    assert!(!eval("frame[2:]", &one));

    let mut empty = FilterContext::new();
    empty.set("frame", FieldValue::Bytes(Vec::new()), None, &schema).unwrap();
    assert!(eval("frame[0:]", &empty));
    assert!(!eval("frame[-1:]", &empty));
    assert!(!eval("frame[0:-1]", &empty));
}

#[test]
fn test_subnet_match() {
    let schema = make_schema();
    let ctx = packet_a(&schema);
    assert!(eval("ip.addr == 10.0.0.0/8", &ctx));
    assert!(eval("ip.addr in {192.168.0.0/16 10.0.0.0/30}", &ctx));
    assert!(!eval("ip.addr == 192.168.0.0/16", &ctx));
}

#[test]
fn test_strings_and_functions() {
    let schema = make_schema();
    let mut ctx = FilterContext::new();
    ctx.set("http.host", FieldValue::String("www.Example.com".into()), None, &schema).unwrap();
    ctx.set("tcp.flags", FieldValue::UInt(0x12), None, &schema).unwrap();
    assert!(eval("http.host contains \"Example\"", &ctx));
    assert!(!eval("http.host contains \"example\"", &ctx));
    assert!(eval("lower(http.host) contains \"example\"", &ctx));
    assert!(eval("len(http.host) == 15", &ctx));
    assert!(eval("count(http.host) == 1", &ctx));
    assert!(eval("http.host[0:3] == \"www\"", &ctx));
    assert!(eval("tcp.flags & 0x02", &ctx));
    assert!(eval("(tcp.flags & 0x12) == 0x12", &ctx));
    assert!(eval("tcp.flags not in {0x01 0x02}", &ctx));
}

#[cfg(feature = "regex")]
#[test]
fn test_matches() {
    let schema = make_schema();
    let mut ctx = FilterContext::new();
    ctx.set("http.host", FieldValue::String("www.Example.com".into()), None, &schema).unwrap();
    assert!(eval(r#"http.host matches "example\\.com$""#, &ctx));
    assert!(eval(r#"http.host ~ "^www""#, &ctx));
    assert!(!eval(r#"http.host matches "\\.org$""#, &ctx));

    let strict = FilterEngine::new(&schema)
        .with_options(CompileOptions::new().matches_case_insensitive(false))
        .compile(r#"http.host matches "example""#)
        .unwrap();
    assert!(!strict.evaluate(&ctx));
}

#[test]
fn test_absent_fields_are_data() {
    let ctx = FilterContext::new();
    assert!(!eval("tcp.port == 80", &ctx));
    assert!(!eval("tcp.port != 80", &ctx));
    assert!(!eval("tcp.port", &ctx));
    assert!(eval("!tcp.port", &ctx));
    assert!(!eval("len(frame) >= 0", &ctx));
}

#[test]
fn test_optimized_and_unoptimized_agree() {
    let schema = make_schema();
    let ctx = packet_a(&schema);
    let plain = FilterEngine::new(&schema).with_options(CompileOptions::new().optimize(false));
    let optimized = FilterEngine::new(&schema);
    for text in [
        "false && tcp.port == 443",
        "true || ip.addr == 1.2.3.4",
        "1 == 2 || tcp.port == 443",
        "!!(ip.addr == 10.0.0.1) && (true && tcp.port in {400..500})",
        "!(ip.addr == 10.0.0.1 || false) || frame",
        "\"a\" contains \"b\" && ip.addr",
    ] {
        let a = plain.compile(text).unwrap();
        let b = optimized.compile(text).unwrap();
        assert_eq!(a.evaluate(&ctx), b.evaluate(&ctx), "{text}");
        assert!(b.program().len() <= a.program().len(), "{text}");
    }
}

#[test]
fn test_optimizer_idempotent() {
    let schema = make_schema();
    let engine = FilterEngine::new(&schema);
    for text in [
        "tcp.port == 1 && (tcp.port == 2 && (true || frame))",
        "!!!(ip.addr == 10.0.0.1) || (false && frame)",
    ] {
        let once = engine.parse(text).unwrap();
        let mut optimizer = Optimizer::new();
        let twice = optimizer.optimize(once.clone());
        assert_eq!(once, twice);
        assert!(!optimizer.was_simplified());
    }
}

#[test]
fn test_matched_ranges_and_fields() {
    let schema = make_schema();
    let ctx = packet_a(&schema);
    let filter = compile("ip.addr == 10.0.0.2 && tcp.port == 443", &schema).unwrap();
    assert_eq!(
        filter.matched_ranges(&ctx).into_iter().collect::<Vec<_>>(),
        vec![ByteRange::new(30, 4), ByteRange::new(36, 2)]
    );
    assert_eq!(filter.referenced_fields().into_iter().collect::<Vec<_>>(), vec!["ip.addr", "tcp.port"]);

    let filter = compile("ip.addr == 10.0.0.0/8", &schema).unwrap();
    assert_eq!(filter.matched_ranges(&ctx).len(), 2);

    let filter = compile("ip.addr == 10.0.0.9", &schema).unwrap();
    assert!(filter.matched_ranges(&ctx).is_empty());
}

#[test]
fn test_context_rejects_wrong_kind() {
    let schema = make_schema();
    let mut ctx = FilterContext::new();
    let err = ctx.set("tcp.port", FieldValue::UInt(70000), None, &schema).unwrap_err();
    assert!(matches!(err, ContextError::TypeMismatch { .. }));
    let err = ctx.set("no.such", FieldValue::UInt(1), None, &schema).unwrap_err();
    assert!(matches!(err, ContextError::UnknownField(_)));
}

#[test]
fn test_shared_across_threads() {
    let schema = make_schema();
    let filter = Arc::new(compile("ip.addr == 10.0.0.2 && tcp.port == 443", &schema).unwrap());
    std::thread::scope(|s| {
        for i in 0..4u64 {
            let filter = Arc::clone(&filter);
            let schema = &schema;
            s.spawn(move || {
                let mut ctx = packet_a(schema);
                assert!(filter.evaluate(&ctx));
                ctx.clear();
                ctx.set("tcp.port", FieldValue::UInt(i), None, schema).unwrap();
                assert!(!filter.evaluate(&ctx));
            });
        }
    });
}

struct Dissection {
    ports: Vec<FieldOccurrence>,
}

impl FieldSource for Dissection {
    fn occurrences(&self, field: &str) -> &[FieldOccurrence] {
        match field {
            "tcp.port" => self.ports.as_slice(),
            _ => &[],
        }
    }
}

#[test]
fn test_foreign_field_source() {
    let schema = make_schema();
    let tree = Dissection {
        ports: vec![FieldOccurrence::new(FieldValue::UInt(8080), None)],
    };
    assert!(compile("tcp.port == 8080", &schema).unwrap().evaluate(&tree));
    assert!(!compile("ip.addr", &schema).unwrap().evaluate(&tree));
}

/// Random `&&`/`||`/`!` trees over port and address tests.
fn filter_tree() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0u64..6).prop_map(|p| format!("tcp.port == {p}")),
        (0u64..6).prop_map(|p| format!("tcp.port > {p}")),
        (0u8..4).prop_map(|o| format!("ip.addr == 10.0.0.{o}")),
        (0u8..4).prop_map(|o| format!("ip.addr != 10.0.0.{o}")),
        Just("tcp.port".to_string()),
        Just("ip.addr".to_string()),
        Just("true".to_string()),
        Just("false".to_string()),
        Just("1 == 2".to_string()),
        Just("tcp.port in {1 3..4}".to_string()),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(|v| format!("({})", v.join(" && "))),
            prop::collection::vec(inner.clone(), 2..4).prop_map(|v| format!("({})", v.join(" || "))),
            inner.prop_map(|e| format!("!({e})")),
        ]
    })
}

proptest! {
    #[test]
    fn optimizer_preserves_result(
        text in filter_tree(),
        ports in prop::collection::vec(0u64..6, 0..3),
        hosts in prop::collection::vec(0u8..4, 0..3),
    ) {
        let schema = make_schema();
        let mut ctx = FilterContext::new();
        for port in &ports {
            ctx.set("tcp.port", FieldValue::UInt(*port), None, &schema).unwrap();
        }
        for host in &hosts {
            ctx.set("ip.addr", ipv4(&format!("10.0.0.{host}")), None, &schema).unwrap();
        }
        let plain = FilterEngine::new(&schema)
            .with_options(CompileOptions::new().optimize(false))
            .compile(&text)
            .unwrap();
        let optimized = FilterEngine::new(&schema).compile(&text).unwrap();
        prop_assert_eq!(plain.evaluate(&ctx), optimized.evaluate(&ctx), "{}", text);
    }

    #[test]
    fn string_display_roundtrip(chars in prop::collection::vec(any::<char>(), 0..16)) {
        let schema = make_schema();
        let value = FieldValue::String(chars.into_iter().collect());
        let text = format!("http.host == {value}");
        let filter = compile(&text, &schema).unwrap();
        prop_assert_eq!(filter.program().constants(), [value]);
    }

    #[test]
    fn parser_does_not_panic_on_random_input(s in ".{0,256}") {
        let schema = make_schema();
        let _ = compile(&s, &schema);
    }

    #[test]
    fn parser_does_not_panic_on_filter_like_input(
        s in "[a-z.!&|=<>(){}\\[\\]:0-9 \"]{0,64}"
    ) {
        let schema = make_schema();
        if let Ok(filter) = compile(&s, &schema) {
            let _ = filter.evaluate(&packet_a(&schema));
        }
    }

    #[test]
    fn integer_display_roundtrip(val in 0u64..=65535) {
        let value = FieldValue::UInt(val);
        prop_assert_eq!(FieldType::UInt16.parse_value(&value.to_string()), Ok(value));
    }

    #[test]
    fn ipv4_display_roundtrip(octets in any::<[u8; 4]>(), prefix in 0u8..=32) {
        let text = format!("{}.{}.{}.{}/{}", octets[0], octets[1], octets[2], octets[3], prefix);
        let value = FieldType::Ipv4.parse_value(&text).unwrap();
        let again = FieldType::Ipv4.parse_value(&value.to_string()).unwrap();
        prop_assert!(value.identical(&again));
    }

    #[test]
    fn existential_equality(ports in prop::collection::vec(0u64..100, 0..8), needle in 0u64..100) {
        let schema = make_schema();
        let mut ctx = FilterContext::new();
        for port in &ports {
            ctx.set("tcp.port", FieldValue::UInt(*port), None, &schema).unwrap();
        }
        let filter = compile(&format!("tcp.port == {needle}"), &schema).unwrap();
        prop_assert_eq!(filter.evaluate(&ctx), ports.contains(&needle));
    }
}
