use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dfilter::*;

fn schema() -> FilterSchema {
    FilterSchemaBuilder::new()
        .field("ip.addr", FieldType::Ipv4)
        .field("tcp.port", FieldType::UInt16)
        .field("frame", FieldType::Bytes)
        .field("http.host", FieldType::String)
        .build()
}

fn packet(schema: &FilterSchema) -> FilterContext {
    let mut ctx = FilterContext::new();
    for addr in ["10.0.0.1", "10.0.0.2"] {
        let value = FieldType::Ipv4.parse_value(addr).unwrap();
        ctx.set("ip.addr", value, None, schema).unwrap();
    }
    for port in [51234, 443] {
        ctx.set("tcp.port", FieldValue::UInt(port), None, schema).unwrap();
    }
    ctx.set("frame", FieldValue::Bytes(vec![0x45; 64]), None, schema).unwrap();
    ctx.set("http.host", FieldValue::String("www.example.com".into()), None, schema)
        .unwrap();
    ctx
}

fn bench_compile_evaluate(c: &mut Criterion) {
    let schema = schema();
    let ctx = packet(&schema);
    let expr_str = "ip.addr == 10.0.0.0/8 && tcp.port in {80 443 8080} && frame[0:2] == 45:45 \
                    && http.host contains \"example\"";
    let engine = FilterEngine::new(&schema);

    c.bench_function("parse", |b| {
        b.iter(|| {
            let _ = engine.parse(black_box(expr_str));
        })
    });
    c.bench_function("compile", |b| {
        b.iter(|| {
            let _ = engine.compile(black_box(expr_str));
        })
    });
    let compiled = engine.compile(expr_str).unwrap();
    c.bench_function("evaluate", |b| {
        b.iter(|| black_box(compiled.evaluate(black_box(&ctx))))
    });
    c.bench_function("matched_ranges", |b| {
        b.iter(|| black_box(compiled.matched_ranges(black_box(&ctx))))
    });
}

criterion_group!(benches, bench_compile_evaluate);
criterion_main!(benches);
