use dfilter::*;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // 1. Define the field registry
    let schema = FilterSchemaBuilder::new()
        .field("ip.addr", FieldType::Ipv4)
        .field("tcp.port", FieldType::UInt16)
        .field("http.host", FieldType::String)
        .descriptor(FieldDescriptor::new("ip.proto", FieldType::UInt8).with_value_names([(6, "TCP"), (17, "UDP")]))
        .build();

    // 2. Compile a filter
    let filter_str = r#"ip.addr == 10.0.0.0/8 && ip.proto == TCP && tcp.port in {80 443} && http.host contains "example""#;
    let filter = compile(filter_str, &schema)?;
    println!("Filter: {}", filter.expr());
    println!("Program:\n{}", filter.program());
    println!("Fields: {:?}", filter.referenced_fields());

    // 3. Populate the fields dissected from one packet
    let mut ctx = FilterContext::new();
    ctx.set("ip.addr", FieldType::Ipv4.parse_value("192.168.1.7")?, Some(ByteRange::new(26, 4)), &schema)?;
    ctx.set("ip.addr", FieldType::Ipv4.parse_value("10.1.2.3")?, Some(ByteRange::new(30, 4)), &schema)?;
    ctx.set("ip.proto", FieldValue::UInt(6), Some(ByteRange::new(23, 1)), &schema)?;
    ctx.set("tcp.port", FieldValue::UInt(443), Some(ByteRange::new(36, 2)), &schema)?;
    ctx.set("http.host", FieldValue::String("www.example.com".into()), Some(ByteRange::new(80, 15)), &schema)?;

    // 4. Evaluate
    println!("Filter matches: {}", filter.evaluate(&ctx));
    println!("Matched ranges: {:?}", filter.matched_ranges(&ctx));

    // 5. Compile errors carry a location
    let bad = "tcp.port == 80 && tcp.prot == 1";
    if let Err(e) = compile(bad, &schema) {
        println!("{}", e.render(bad));
    }
    Ok(())
}
