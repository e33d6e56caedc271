//! Tests for line-protocol point parsing and rendering

use super::*;

#[test]
fn test_parse_simple_point() {
    let point = Point::parse("cpu idle=1 1000000000").unwrap();
    assert_eq!(point.measurement(), "cpu");
    assert!(point.tags().is_empty());
    assert_eq!(point.fields().get("idle"), Some(&FieldValue::Float(1.0)));
    assert_eq!(point.timestamp(), Some(1_000_000_000));
}

#[test]
fn test_parse_tags_and_field_types() {
    let point = Point::parse(
        r#"weather,station=k2,region=north temp=-3.5,gusts=42i,ok=true,note="windy" 1465839830100400200"#,
    )
    .unwrap();

    assert_eq!(point.measurement(), "weather");
    assert_eq!(point.tags().get("station").map(String::as_str), Some("k2"));
    assert_eq!(point.tags().get("region").map(String::as_str), Some("north"));
    assert_eq!(point.fields().get("temp"), Some(&FieldValue::Float(-3.5)));
    assert_eq!(point.fields().get("gusts"), Some(&FieldValue::Integer(42)));
    assert_eq!(point.fields().get("ok"), Some(&FieldValue::Boolean(true)));
    assert_eq!(
        point.fields().get("note"),
        Some(&FieldValue::String("windy".into()))
    );
    assert_eq!(point.timestamp(), Some(1_465_839_830_100_400_200));
}

#[test]
fn test_parse_without_timestamp() {
    let point = Point::parse("cpu,host=web01 usage=0.5").unwrap();
    assert_eq!(point.timestamp(), None);
}

#[test]
fn test_parse_escaped_names() {
    let point = Point::parse(r"disk\ io,mount=\/data,kind=a\,b free=10i").unwrap();
    assert_eq!(point.measurement(), "disk io");
    assert_eq!(point.tags().get("mount").map(String::as_str), Some("/data"));
    assert_eq!(point.tags().get("kind").map(String::as_str), Some("a,b"));
}

#[test]
fn test_parse_string_field_with_spaces_and_escapes() {
    let point = Point::parse(r#"events msg="hello, \"world\" = ok",n=1i"#).unwrap();
    assert_eq!(
        point.fields().get("msg"),
        Some(&FieldValue::String(r#"hello, "world" = ok"#.into()))
    );
    assert_eq!(point.fields().get("n"), Some(&FieldValue::Integer(1)));
}

#[test]
fn test_parse_rejects_missing_fields() {
    assert!(matches!(
        Point::parse("cpu,host=web01"),
        Err(ProtocolError::MissingFields)
    ));
    assert!(matches!(
        Point::parse("cpu "),
        Err(ProtocolError::MissingFields)
    ));
}

#[test]
fn test_parse_rejects_empty_measurement() {
    assert!(matches!(
        Point::parse(",host=a v=1"),
        Err(ProtocolError::EmptyMeasurement)
    ));
}

#[test]
fn test_parse_rejects_bad_field_value() {
    assert!(matches!(
        Point::parse("cpu v=notanumber"),
        Err(ProtocolError::InvalidFieldValue { .. })
    ));
}

#[test]
fn test_parse_rejects_bad_timestamp() {
    assert!(matches!(
        Point::parse("cpu v=1 soon"),
        Err(ProtocolError::InvalidTimestamp { .. })
    ));
}

#[test]
fn test_parse_rejects_unterminated_string() {
    assert!(Point::parse(r#"cpu v="open"#).is_err());
}

#[test]
fn test_render_round_trip() {
    let original = Point::new("net traffic")
        .with_tag("iface", "eth0")
        .with_tag("direction", "in,out")
        .with_field("bytes", FieldValue::Integer(1024))
        .with_field("rate", FieldValue::Float(2.5))
        .with_field("up", FieldValue::Boolean(true))
        .with_field("label", FieldValue::String("a \"b\" c".into()))
        .with_timestamp(42);

    let reparsed = Point::parse(&original.to_string()).unwrap();
    assert_eq!(original, reparsed);
}

#[test]
fn test_render_is_deterministic() {
    let point = Point::new("cpu")
        .with_tag("b", "2")
        .with_tag("a", "1")
        .with_field("y", FieldValue::Float(1.0))
        .with_field("x", FieldValue::Integer(2));

    // BTreeMap ordering: tags and fields come out sorted by key.
    assert_eq!(point.to_string(), "cpu,a=1,b=2 x=2i,y=1");
}

#[test]
fn test_integer_suffix_required_for_integers() {
    let point = Point::parse("cpu v=10").unwrap();
    assert_eq!(point.fields().get("v"), Some(&FieldValue::Float(10.0)));

    let point = Point::parse("cpu v=10i").unwrap();
    assert_eq!(point.fields().get("v"), Some(&FieldValue::Integer(10)));
}
